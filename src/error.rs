use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Shape mismatch in {stage}: expected {expected}, got {actual}.")]
    ShapeMismatch { stage: &'static str, expected: usize, actual: usize },

    #[error("User {user} has no tweets, cannot compute the tweet gap statistic.")]
    EmptyHistory { user: usize },

    #[error("Missing auxiliary input: {0}.")]
    MissingAuxiliaryInput(&'static str),

    #[error("Invalid batch: {0}.")]
    InvalidBatch(String),

    #[error("Invalid configuration: {0}.")]
    InvalidConfig(String),

    #[error("Invalid embedding file at line {line}: {reason}.")]
    Embedding { line: usize, reason: String },

    #[error("I/O error: {0}.")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint error: {0}.")]
    Checkpoint(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, ClassifierError>;

/// Fail with `ShapeMismatch` unless `actual == expected`.
pub(crate) fn expect_width(stage: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ClassifierError::ShapeMismatch { stage, expected, actual })
    }
}
