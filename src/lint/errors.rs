use thiserror::Error;

/// Lint configuration errors
#[derive(Error, Debug)]
pub enum LintError {
    #[error("Invalid rule filter: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Unknown lint rule: {0}")]
    UnknownRule(String),

    #[error("Failed to read rule filter: {0}")]
    Io(#[from] std::io::Error),
}

pub type LintResult<T> = Result<T, LintError>;
