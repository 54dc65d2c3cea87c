use thiserror::Error;

/// Configuration problems, reported before the mailbox is ever contacted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid parameters format '{0}' - use \"ParameterName:Value\"")]
    InvalidToken(String),

    #[error("Missing parameters: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("{name} is invalid: '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error("Unable to load configuration: {0}")]
    Source(#[from] config::ConfigError),
}

/// Per-message failures. The scanner logs them and moves on to the next
/// older message without touching the current one.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandlingError {
    #[error("No expected attachment '{0}' found")]
    AttachmentNotFound(&'static str),

    #[error("Message subject fits the pattern but is not usable: '{0}'")]
    SubjectIncorrect(String),
}

/// CSV parse fault, kept separate so it can be reported by every sink that needed the rows.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ExtractError {
    pub line: usize,
    pub message: String,
}

/// Per-sink failures. A failed sink never blocks its sibling.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Can't replace existing file {0}, it is locked by another process")]
    Locked(String),

    #[error("File write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed CSV attachment: {0}")]
    Parse(#[from] ExtractError),

    #[error("Database error: {0:#}")]
    Database(anyhow::Error),
}
