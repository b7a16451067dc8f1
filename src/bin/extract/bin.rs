#[macro_use]
extern crate clap;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::time::Instant;

use clap::App;
use csv::QuoteStyle;
use dialoguer::console::{Emoji, style};
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::warn;

use bot_detection_pipeline::cli::{self, CliError};
use bot_detection_pipeline::feature_extraction::{extract_feature_vectors, KeywordTopicSimilarity, RecencyIntensity, Signals, TopicSet};
use bot_detection_pipeline::shared_interface::User;

static LOADING: Emoji<'_, '_> = Emoji("⏳ ", "");
static WORKING: Emoji<'_, '_> = Emoji("🛠️ ", "");
static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub struct Opts {
    pub in_users: File,
    pub in_topics: Option<File>,
    pub out_features: File,
    quiet: bool,
}

fn parse_opts() -> Result<Opts, CliError> {
    let yml = load_yaml!("cli_args.yaml");
    let m = App::from_yaml(yml).get_matches();

    let quiet = m.is_present("quiet");

    Ok(Opts {
        in_users: cli::required_input_file(m.value_of("in_users"), "in_users")?,
        in_topics: match m.value_of("topics") {
            Some(path) => Some(cli::parse_input_file(path)?),
            None => None,
        },
        out_features: match m.value_of("out_features") {
            Some(path) => cli::parse_output_file(path, quiet)?,
            None => return Err(CliError::MissingInputArg("out_features".to_string())),
        },
        quiet,
    })
}

fn consume_input(opts: &mut Opts) -> Result<(Vec<User>, Option<TopicSet>), CliError> {
    cli::print_output(format!("\n{}   {}Loading users...\n", style("[1/2]").bold().dim(), LOADING), opts.quiet);

    let n_lines = cli::count_lines(&mut opts.in_users, "in_users")?;
    let pb = cli::make_progress_bar(n_lines, opts.quiet);
    let users = cli::read_users(BufReader::new(&opts.in_users), &pb)?;

    let topics = match &opts.in_topics {
        Some(file) => Some(TopicSet::from_reader(BufReader::new(file))?),
        None => None,
    };
    if topics.as_ref().map_or(false, TopicSet::is_empty) {
        warn!("Topic set is empty, every topic similarity will be zero");
    }

    Ok((users, topics))
}

fn extract_features(opts: &Opts, users: &[User], topics: Option<&TopicSet>) -> Result<usize, CliError> {
    cli::print_output(format!("\n{}   {}Extracting features...\n", style("[2/2]").bold().dim(), WORKING), opts.quiet);

    let signals = match topics {
        Some(topics) => Signals::Topical { topics, similarity: &KeywordTopicSimilarity, intensity: &RecencyIntensity },
        None => Signals::Base,
    };
    let features = extract_feature_vectors(users, &signals)?;

    let gz_writer = GzEncoder::new(BufWriter::new(&opts.out_features), Compression::fast());
    let mut csv_writer = csv::WriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .from_writer(gz_writer);

    let write_err = |e: csv::Error| CliError::IO("out_features".to_string(), e.into());
    for fv in features.iter() {
        csv_writer.serialize(fv).map_err(write_err)?;
    }

    let gz_writer = csv_writer.into_inner().map_err(|e| CliError::IO("out_features".to_string(), e.into_error()))?;
    gz_writer.finish().map_err(|e| CliError::IO("out_features".to_string(), e))?;

    Ok(features.len())
}

fn main() {
    cli::init_logging();
    let mut opts = parse_opts().unwrap_or_else(|e| cli::exit_with_error(&e));

    let start = Instant::now();
    let result = consume_input(&mut opts)
        .and_then(|(users, topics)| extract_features(&opts, &users, topics.as_ref()));

    match result {
        Ok(n_users) => cli::print_output(format!("\n        {}Extracted features of {} users in {:.1?}\n",
                                                 SPARKLE, n_users, start.elapsed()), opts.quiet),
        Err(e) => cli::exit_with_error(&e),
    }
}
