use std::path::PathBuf;
use thiserror::Error;

/// Core error type for modserve operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("File watch error: {0}")]
    Watch(String),
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Self::Watch(err.to_string())
    }
}

/// A module source that is not syntactically valid.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}:{line}:{column}: {message}", .path.display())]
pub struct ParseError {
    /// File that failed to parse.
    pub path: PathBuf,
    /// Parser message.
    pub message: String,
    /// 1-indexed line of the error.
    pub line: usize,
    /// 0-indexed column of the error.
    pub column: usize,
}

/// Failure to produce a servable module.
///
/// Cloneable so a single failed load can be handed to every request that
/// was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Module not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {message}", .path.display())]
    Read { path: PathBuf, message: String },

    #[error(transparent)]
    Parse(#[from] ParseError),
}
