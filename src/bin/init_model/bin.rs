#[macro_use]
extern crate clap;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

use clap::App;
use dialoguer::console::{Emoji, style};

use bot_detection_pipeline::cli::{self, CliError};
use bot_detection_pipeline::feature_extraction::FeatureSet;
use bot_detection_pipeline::model::{BackboneKind, Checkpoint, ClassifierConfig};

static WORKING: Emoji<'_, '_> = Emoji("🛠️ ", "");
static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub struct Opts {
    pub config: ClassifierConfig,
    pub seed: u64,
    pub out_model: File,
    quiet: bool,
}

fn parse_opts() -> Result<Opts, CliError> {
    let yml = load_yaml!("cli_args.yaml");
    let m = App::from_yaml(yml).get_matches();

    let quiet = m.is_present("quiet");

    let mut config = ClassifierConfig::new(
        value_t_or_exit!(m, "embedding_dim", usize),
        value_t_or_exit!(m, "rec_hidden_dim", usize),
        value_t_or_exit!(m, "tweet_features_dim", usize),
        value_t_or_exit!(m, "hidden_dim", usize),
    );
    config.num_rec_layers = cli::parse_arg(m.value_of("num_rec_layers"), "layers", config.num_rec_layers)?;
    config.rec_dropout = cli::parse_arg(m.value_of("rec_dropout"), "dropout", config.rec_dropout)?;
    config.effective_history = cli::parse_arg(m.value_of("effective_history"), "effective-history", config.effective_history)?;
    if m.is_present("topics") { config.feature_set = FeatureSet::Topical; }
    if m.is_present("tcn") { config.backbone = BackboneKind::TemporalConv; }

    let out_model = match m.value_of("out_model") {
        Some(path) => cli::parse_output_file(path, quiet)?,
        None => return Err(CliError::MissingInputArg("out_model".to_string())),
    };

    Ok(Opts {
        config,
        seed: cli::parse_arg(m.value_of("seed"), "seed", 0)?,
        out_model,
        quiet,
    })
}

fn run(opts: Opts) -> Result<(), CliError> {
    cli::print_output(format!("\n{}   {}Initializing model...\n", style("[1/1]").bold().dim(), WORKING), opts.quiet);

    let checkpoint = Checkpoint::initialize(opts.config, opts.seed)?;

    let mut writer = BufWriter::new(&opts.out_model);
    checkpoint.save(&mut writer)?;
    writer.flush().map_err(|e| CliError::IO("out_model".to_string(), e))?;

    cli::print_output(format!("        {:?} features, {:?} backbone, seed {}\n",
                              checkpoint.config.feature_set, checkpoint.config.backbone, opts.seed), opts.quiet);
    Ok(())
}

fn main() {
    cli::init_logging();
    let opts = parse_opts().unwrap_or_else(|e| cli::exit_with_error(&e));
    let quiet = opts.quiet;

    let start = Instant::now();
    if let Err(e) = run(opts) {
        cli::exit_with_error(&e);
    }

    cli::print_output(format!("\n        {}Finished in {:.1?}\n", SPARKLE, start.elapsed()), quiet);
}
