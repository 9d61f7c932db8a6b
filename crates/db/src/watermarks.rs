use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use crate::Db;
use crate::error::Result;

impl Db {
    pub fn get_watermark(&self, session_id: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT last_timestamp FROM usage_watermark WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Stores the watermark for a session. The last write wins.
    pub fn set_watermark(&mut self, session_id: &str, last_timestamp: i64) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO usage_watermark (session_id, last_timestamp, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(session_id) DO UPDATE SET
              last_timestamp = excluded.last_timestamp,
              updated_at = excluded.updated_at
            "#,
            params![session_id, last_timestamp, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
