//! CLI error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    /// Path resolution error
    #[error("Path error: {0}")]
    Path(String),

    /// Invalid command-line input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CliResult<T> = Result<T, CliError>;
