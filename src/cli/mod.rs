use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::PathBuf;

use dialoguer::Confirm;
use dialoguer::console::style;
use dialoguer::theme::ColorfulTheme;
use indicatif::{ProgressBar, ProgressStyle};
use linereader::LineReader;
use thiserror::Error;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::error::ClassifierError;
use crate::shared_interface::User;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Missing input argument: {0}.")]
    MissingInputArg(String),
    #[error("Could not find file \"{0}\".")]
    FileNotFound(String),
    #[error("Provided file \"{0}\" is a directory.")]
    FileIsDirectory(String),
    #[error("File \"{0}\" already exists.")]
    FileExists(String),
    #[error("Invalid value for {0}: {1}.")]
    InvalidArg(String, String),
    #[error("I/O error for {0}: {1}.")]
    IO(String, std::io::Error),
    #[error("Could not parse user on line {0}: {1}.")]
    Parse(usize, serde_json::Error),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Open `input` for writing. An existing file is only truncated after the user agrees,
/// which never happens in quiet mode.
pub fn parse_output_file(input: &str, quiet: bool) -> Result<File, CliError> {
    let path = regular_file_path(input)?;

    if path.exists() && !confirm_overwrite(input, quiet)? {
        return Err(CliError::FileExists(input.to_string()));
    }

    OpenOptions::new().write(true).create(true).truncate(true).open(&path)
        .map_err(|e| CliError::IO(input.to_string(), e))
}

pub fn parse_input_file(input: &str) -> Result<File, CliError> {
    let path = regular_file_path(input)?;
    if !path.exists() {
        return Err(CliError::FileNotFound(input.to_string()));
    }

    File::open(&path).map_err(|e| CliError::IO(input.to_string(), e))
}

fn regular_file_path(input: &str) -> Result<PathBuf, CliError> {
    let path = PathBuf::from(input);
    if path.is_dir() { Err(CliError::FileIsDirectory(input.to_string())) } else { Ok(path) }
}

fn confirm_overwrite(input: &str, quiet: bool) -> Result<bool, CliError> {
    if quiet { return Ok(false); }

    let answer = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("File \"{}\" exists, overwrite?", input))
        .default(false)
        .wait_for_newline(true)
        .interact_opt()
        .map_err(|e| CliError::IO(input.to_string(), e))?;
    Ok(answer == Some(true))
}

/// Required argument, opened as input file.
pub fn required_input_file(value: Option<&str>, name: &str) -> Result<File, CliError> {
    match value {
        Some(path) => parse_input_file(path),
        None => Err(CliError::MissingInputArg(name.to_string())),
    }
}

/// Parse a numeric argument, falling back to `default` when absent.
pub fn parse_arg<T: std::str::FromStr>(value: Option<&str>, name: &str, default: T) -> Result<T, CliError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| CliError::InvalidArg(name.to_string(), raw.to_string())),
    }
}

/// Count the lines of an input file and rewind it.
pub fn count_lines(file: &mut File, name: &str) -> Result<u64, CliError> {
    let n_lines = linecount::count_lines(BufReader::new(&*file)).map_err(|e| CliError::IO(name.to_string(), e))?;
    file.seek(SeekFrom::Start(0)).map_err(|e| CliError::IO(name.to_string(), e))?;
    Ok(n_lines as u64)
}

/// Read one JSON user per line. Blank lines are skipped, so are users without tweets.
pub fn read_users<R: Read>(reader: R, pb: &Option<ProgressBar>) -> Result<Vec<User>, CliError> {
    let mut reader = LineReader::new(reader);
    let mut users = Vec::new();
    let mut line_no: usize = 0;

    while let Some(line) = reader.next_line() {
        line_no += 1;
        let line = line.map_err(|e| CliError::IO(format!("line {}", line_no), e))?;
        if let Some(pb) = pb { pb.inc(1); }

        if line.iter().all(|c| c.is_ascii_whitespace()) { continue; }

        let user: User = serde_json::from_slice(line).map_err(|e| CliError::Parse(line_no, e))?;
        if user.tweets.is_empty() {
            warn!(user = user.id, line = line_no, "Skipping user without tweets");
            continue;
        }
        users.push(user);
    }

    if let Some(pb) = pb { pb.finish(); }
    Ok(users)
}

pub fn print_output(msg: String, quiet: bool) {
    if !quiet { eprint!("{}", msg); }
}

pub fn make_progress_bar(len: u64, quiet: bool) -> Option<ProgressBar> {
    if quiet { return None; }

    let pb = ProgressBar::new(len);
    pb.set_style(ProgressStyle::default_bar()
        .template("        [{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} ({eta})")
        .progress_chars("##-"));
    Some(pb)
}

/// Structured logs go to stderr, `RUST_LOG` overrides the default `warn` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Print `e` with its chain of causes and exit with status 1.
pub fn exit_with_error(e: &dyn std::error::Error) -> ! {
    eprintln!("{} {}", style("Error:").red().bold(), e);

    let mut source = e.source();
    while let Some(cause) = source {
        eprintln!("       {} {}", style("caused by:").dim(), cause);
        source = cause.source();
    }
    std::process::exit(1)
}
