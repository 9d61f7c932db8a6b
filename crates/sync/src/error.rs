use std::io;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{table} returned {status}: {body}")]
    Status {
        table: String,
        status: StatusCode,
        body: String,
    },
    #[error("local store error: {0}")]
    Db(#[from] collector_db::DbError),
    #[error("transcript error: {0}")]
    Ingest(#[from] ingest::IngestError),
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Transport failures, throttling and server errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
