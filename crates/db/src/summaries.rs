use chrono::Utc;
use collector_core::{
    CostBreakdown, SessionKey, SessionKind, SessionStatus, SessionSummary, TokenBreakdown,
};
use rusqlite::{OptionalExtension, Row, params};

use crate::error::Result;
use crate::{Db, to_sql_int};

const SUMMARY_COLUMNS: &str = r#"
    session_key, session_key_source, session_id, kind, label, display_name, channel,
    last_model, input_tokens, output_tokens, cache_read_tokens, cache_write_tokens,
    total_tokens, input_cost, output_cost, cache_read_cost, cache_write_cost, total_cost,
    message_count, last_message, status, started_at, last_active_at, duration_ms
"#;

impl Db {
    /// Upserts summaries keyed by session key. Every column of an existing
    /// row is replaced, so resubmitting a batch leaves the table unchanged.
    pub fn upsert_session_summaries(&mut self, summaries: &[SessionSummary]) -> Result<usize> {
        if summaries.is_empty() {
            return Ok(0);
        }
        let updated_at = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut written = 0usize;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO session_summary (
                  session_key, session_key_source, session_id, kind, label, display_name,
                  channel, last_model, input_tokens, output_tokens, cache_read_tokens,
                  cache_write_tokens, total_tokens, input_cost, output_cost, cache_read_cost,
                  cache_write_cost, total_cost, message_count, last_message, status,
                  started_at, last_active_at, duration_ms, updated_at
                ) VALUES (
                  ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                  ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25
                )
                ON CONFLICT(session_key) DO UPDATE SET
                  session_key_source = excluded.session_key_source,
                  session_id = excluded.session_id,
                  kind = excluded.kind,
                  label = excluded.label,
                  display_name = excluded.display_name,
                  channel = excluded.channel,
                  last_model = excluded.last_model,
                  input_tokens = excluded.input_tokens,
                  output_tokens = excluded.output_tokens,
                  cache_read_tokens = excluded.cache_read_tokens,
                  cache_write_tokens = excluded.cache_write_tokens,
                  total_tokens = excluded.total_tokens,
                  input_cost = excluded.input_cost,
                  output_cost = excluded.output_cost,
                  cache_read_cost = excluded.cache_read_cost,
                  cache_write_cost = excluded.cache_write_cost,
                  total_cost = excluded.total_cost,
                  message_count = excluded.message_count,
                  last_message = excluded.last_message,
                  status = excluded.status,
                  started_at = excluded.started_at,
                  last_active_at = excluded.last_active_at,
                  duration_ms = excluded.duration_ms,
                  updated_at = excluded.updated_at
                "#,
            )?;
            for summary in summaries {
                let key_source = match summary.session_key {
                    SessionKey::Declared(_) => "declared",
                    SessionKey::Fallback(_) => "fallback",
                };
                written += stmt.execute(params![
                    summary.session_key.as_str(),
                    key_source,
                    summary.session_id,
                    summary.kind.as_str(),
                    summary.label,
                    summary.display_name,
                    summary.channel,
                    summary.last_model,
                    to_sql_int("input_tokens", summary.tokens.input)?,
                    to_sql_int("output_tokens", summary.tokens.output)?,
                    to_sql_int("cache_read_tokens", summary.tokens.cache_read)?,
                    to_sql_int("cache_write_tokens", summary.tokens.cache_write)?,
                    to_sql_int("total_tokens", summary.tokens.total)?,
                    summary.cost.input,
                    summary.cost.output,
                    summary.cost.cache_read,
                    summary.cost.cache_write,
                    summary.cost.total,
                    to_sql_int("message_count", summary.message_count)?,
                    summary.last_message,
                    summary.status.as_str(),
                    summary.started_at,
                    summary.last_active_at,
                    summary.duration_ms,
                    updated_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    pub fn get_session_summary(&self, session_key: &str) -> Result<Option<SessionSummary>> {
        let sql = format!(
            "SELECT {} FROM session_summary WHERE session_key = ?1",
            SUMMARY_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![session_key], summary_from_row)
            .optional()?)
    }

    pub fn list_session_summaries(&self) -> Result<Vec<SessionSummary>> {
        let sql = format!(
            "SELECT {} FROM session_summary ORDER BY last_active_at DESC, session_key ASC",
            SUMMARY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], summary_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn count_session_summaries(&self) -> Result<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM session_summary", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<SessionSummary> {
    let key: String = row.get(0)?;
    let key_source: String = row.get(1)?;
    let session_key = if key_source == "declared" {
        SessionKey::Declared(key)
    } else {
        SessionKey::Fallback(key)
    };
    let kind: String = row.get(3)?;
    let status: String = row.get(20)?;
    Ok(SessionSummary {
        session_key,
        session_id: row.get(2)?,
        kind: SessionKind::parse(&kind),
        label: row.get(4)?,
        display_name: row.get(5)?,
        channel: row.get(6)?,
        last_model: row.get(7)?,
        tokens: TokenBreakdown {
            input: row.get::<_, i64>(8)?.max(0) as u64,
            output: row.get::<_, i64>(9)?.max(0) as u64,
            cache_read: row.get::<_, i64>(10)?.max(0) as u64,
            cache_write: row.get::<_, i64>(11)?.max(0) as u64,
            total: row.get::<_, i64>(12)?.max(0) as u64,
        },
        cost: CostBreakdown {
            input: row.get(13)?,
            output: row.get(14)?,
            cache_read: row.get(15)?,
            cache_write: row.get(16)?,
            total: row.get(17)?,
        },
        message_count: row.get::<_, i64>(18)?.max(0) as u64,
        last_message: row.get(19)?,
        status: if status == "active" {
            SessionStatus::Active
        } else {
            SessionStatus::Completed
        },
        started_at: row.get(21)?,
        last_active_at: row.get(22)?,
        duration_ms: row.get(23)?,
    })
}
