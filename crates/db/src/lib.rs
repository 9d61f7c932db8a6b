use std::path::Path;

use rusqlite::Connection;

mod error;
mod migrations;
mod summaries;
mod usage_events;
mod watermarks;

pub use error::{DbError, Result};

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "busy_timeout", 5_000)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }
}

pub(crate) fn to_sql_int(column: &'static str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| DbError::OutOfRange { column, value })
}
