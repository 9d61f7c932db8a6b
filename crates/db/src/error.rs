#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("value out of range for column {column}: {value}")]
    OutOfRange { column: &'static str, value: u64 },
}

pub type Result<T> = std::result::Result<T, DbError>;
