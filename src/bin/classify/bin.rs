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
use num_format::{Locale, ToFormattedString};
use serde::Serialize;
use tracing::{info, warn};

use bot_detection_pipeline::cli::{self, CliError};
use bot_detection_pipeline::feature_extraction::{FeatureSet, TopicSet};
use bot_detection_pipeline::model::{BOT, BotClassifier, Checkpoint, HUMAN, TopicalSignal};
use bot_detection_pipeline::shared_interface::User;
use bot_detection_pipeline::text::WordEmbeddings;

static LOADING: Emoji<'_, '_> = Emoji("⏳ ", "");
static WORKING: Emoji<'_, '_> = Emoji("🛠️ ", "");
static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

const DEFAULT_BATCH_SIZE: usize = 256;

pub struct Opts {
    pub in_model: File,
    pub in_embeddings: File,
    pub in_users: File,
    pub in_topics: Option<File>,
    pub out_predictions: File,
    pub batch_size: usize,
    quiet: bool,
}

#[derive(Debug, Serialize)]
struct Prediction {
    user_id: u64,
    p_human: f32,
    p_bot: f32,
    label: &'static str,
}

impl Prediction {
    fn new(user: &User, p_human: f32, p_bot: f32) -> Self {
        Prediction { user_id: user.id, p_human, p_bot, label: if p_bot > p_human { "bot" } else { "human" } }
    }
}

fn parse_opts() -> Result<Opts, CliError> {
    let yml = load_yaml!("cli_args.yaml");
    let m = App::from_yaml(yml).get_matches();

    let quiet = m.is_present("quiet");

    let batch_size = cli::parse_arg(m.value_of("batch_size"), "batch-size", DEFAULT_BATCH_SIZE)?;
    if batch_size == 0 {
        return Err(CliError::InvalidArg("batch-size".to_string(), "0".to_string()));
    }

    Ok(Opts {
        in_model: cli::required_input_file(m.value_of("in_model"), "in_model")?,
        in_embeddings: cli::required_input_file(m.value_of("in_embeddings"), "in_embeddings")?,
        in_users: cli::required_input_file(m.value_of("in_users"), "in_users")?,
        in_topics: match m.value_of("topics") {
            Some(path) => Some(cli::parse_input_file(path)?),
            None => None,
        },
        out_predictions: match m.value_of("out_predictions") {
            Some(path) => cli::parse_output_file(path, quiet)?,
            None => return Err(CliError::MissingInputArg("out_predictions".to_string())),
        },
        batch_size,
        quiet,
    })
}

fn load_model(opts: &Opts) -> Result<(BotClassifier, Option<TopicSet>), CliError> {
    cli::print_output(format!("\n{}   {}Loading model...\n", style("[1/3]").bold().dim(), LOADING), opts.quiet);

    let checkpoint = Checkpoint::load(BufReader::new(&opts.in_model))?;
    let embeddings = WordEmbeddings::from_reader(&opts.in_embeddings)?;

    let topical = match checkpoint.config.feature_set {
        FeatureSet::Topical => Some(TopicalSignal::keyword()),
        FeatureSet::Base => None,
    };
    let topics = match (&opts.in_topics, &topical) {
        (Some(file), Some(_)) => {
            let topics = TopicSet::from_reader(BufReader::new(file))?;
            if topics.is_empty() { warn!("Topic set is empty, every topic similarity will be zero"); }
            Some(topics)
        }
        (None, Some(_)) => return Err(CliError::MissingInputArg("topics (the model uses topic similarity)".to_string())),
        (_, None) => None,
    };

    Ok((BotClassifier::from_checkpoint(checkpoint, embeddings, topical)?, topics))
}

fn consume_input(opts: &mut Opts) -> Result<Vec<User>, CliError> {
    cli::print_output(format!("\n{}   {}Loading users...\n", style("[2/3]").bold().dim(), LOADING), opts.quiet);

    let n_lines = cli::count_lines(&mut opts.in_users, "in_users")?;
    let pb = cli::make_progress_bar(n_lines, opts.quiet);
    cli::read_users(BufReader::new(&opts.in_users), &pb)
}

/// Returns the number of users classified as human and as bot.
fn classify(opts: &Opts, classifier: &BotClassifier, users: &[User], topics: Option<&TopicSet>) -> Result<(usize, usize), CliError> {
    cli::print_output(format!("\n{}   {}Classifying users...\n", style("[3/3]").bold().dim(), WORKING), opts.quiet);

    let pb = cli::make_progress_bar(users.len() as u64, opts.quiet);

    let gz_writer = GzEncoder::new(BufWriter::new(&opts.out_predictions), Compression::fast());
    let mut csv_writer = csv::WriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .from_writer(gz_writer);
    let write_err = |e: csv::Error| CliError::IO("out_predictions".to_string(), e.into());

    let (mut n_human, mut n_bot) = (0, 0);
    for batch in users.chunks(opts.batch_size) {
        let probs = classifier.classify(batch, topics)?;

        for (user, row) in batch.iter().zip(probs.rows()) {
            let prediction = Prediction::new(user, row[HUMAN], row[BOT]);
            if prediction.label == "bot" { n_bot += 1; } else { n_human += 1; }
            csv_writer.serialize(&prediction).map_err(write_err)?;
        }

        if let Some(pb) = &pb { pb.inc(batch.len() as u64); }
        info!(users = batch.len(), "Classified batch");
    }
    if let Some(pb) = &pb { pb.finish(); }

    let gz_writer = csv_writer.into_inner().map_err(|e| CliError::IO("out_predictions".to_string(), e.into_error()))?;
    gz_writer.finish().map_err(|e| CliError::IO("out_predictions".to_string(), e))?;

    Ok((n_human, n_bot))
}

fn main() {
    cli::init_logging();
    let mut opts = parse_opts().unwrap_or_else(|e| cli::exit_with_error(&e));

    let start = Instant::now();
    let result = load_model(&opts)
        .and_then(|(classifier, topics)| {
            let users = consume_input(&mut opts)?;
            classify(&opts, &classifier, &users, topics.as_ref())
        });

    match result {
        Ok((n_human, n_bot)) => cli::print_output(format!(
            "\n        {}Classified {} users ({} human, {} bot) in {:.1?}\n",
            SPARKLE,
            (n_human + n_bot).to_formatted_string(&Locale::en),
            n_human.to_formatted_string(&Locale::en),
            n_bot.to_formatted_string(&Locale::en),
            start.elapsed(),
        ), opts.quiet),
        Err(e) => cli::exit_with_error(&e),
    }
}
