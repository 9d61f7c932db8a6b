use serde::Serialize;
use std::io;
use std::path::PathBuf;

/// Non-fatal issues encountered while reading transcripts.
#[derive(Debug, Clone, Serialize)]
pub struct IngestIssue {
    pub file_path: String,
    pub message: String,
}

impl IngestIssue {
    pub fn new(file_path: impl Into<String>, message: impl ToString) -> Self {
        Self {
            file_path: file_path.into(),
            message: message.to_string(),
        }
    }
}

/// Errors emitted while reading transcripts.
#[derive(Debug)]
pub enum IngestError {
    Io(io::Error),
    MissingDirectory(PathBuf),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::MissingDirectory(path) => {
                write!(f, "transcript directory not found: {}", path.display())
            }
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::MissingDirectory(_) => None,
        }
    }
}

impl From<io::Error> for IngestError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
