use collector_core::{CostBreakdown, SessionKind, TokenBreakdown, UsageEvent};
use rusqlite::{Row, params};

use crate::error::Result;
use crate::{Db, to_sql_int};

impl Db {
    /// Inserts usage events, ignoring any whose `event_key` is already stored.
    ///
    /// Returns the number of newly inserted rows.
    pub fn upsert_usage_events(&mut self, events: &[UsageEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO usage_event (
                  event_key, session_id, session_key, session_kind, provider, model,
                  input_tokens, output_tokens, cache_read_tokens, cache_write_tokens,
                  total_tokens, input_cost, output_cost, cache_read_cost, cache_write_cost,
                  total_cost, stop_reason, recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
                ON CONFLICT(event_key) DO NOTHING
                "#,
            )?;
            for event in events {
                inserted += stmt.execute(params![
                    event.event_key,
                    event.session_id,
                    event.session_key,
                    event.session_kind.as_str(),
                    event.provider,
                    event.model,
                    to_sql_int("input_tokens", event.tokens.input)?,
                    to_sql_int("output_tokens", event.tokens.output)?,
                    to_sql_int("cache_read_tokens", event.tokens.cache_read)?,
                    to_sql_int("cache_write_tokens", event.tokens.cache_write)?,
                    to_sql_int("total_tokens", event.tokens.total)?,
                    event.cost.input,
                    event.cost.output,
                    event.cost.cache_read,
                    event.cost.cache_write,
                    event.cost.total,
                    event.stop_reason,
                    event.recorded_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn count_usage_events(&self, session_id: Option<&str>) -> Result<u64> {
        let count: i64 = match session_id {
            Some(session_id) => self.conn.query_row(
                "SELECT COUNT(*) FROM usage_event WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM usage_event", [], |row| row.get(0))?,
        };
        Ok(count.max(0) as u64)
    }

    /// Events of one session in recording order.
    pub fn list_usage_events(&self, session_id: &str) -> Result<Vec<UsageEvent>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT event_key, session_id, session_key, session_kind, provider, model,
                   input_tokens, output_tokens, cache_read_tokens, cache_write_tokens,
                   total_tokens, input_cost, output_cost, cache_read_cost, cache_write_cost,
                   total_cost, stop_reason, recorded_at
            FROM usage_event
            WHERE session_id = ?1
            ORDER BY recorded_at ASC, event_key ASC
            "#,
        )?;
        let rows = stmt.query_map(params![session_id], event_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<UsageEvent> {
    let kind: String = row.get(3)?;
    Ok(UsageEvent {
        event_key: row.get(0)?,
        session_id: row.get(1)?,
        session_key: row.get(2)?,
        session_kind: SessionKind::parse(&kind),
        provider: row.get(4)?,
        model: row.get(5)?,
        tokens: TokenBreakdown {
            input: row.get::<_, i64>(6)?.max(0) as u64,
            output: row.get::<_, i64>(7)?.max(0) as u64,
            cache_read: row.get::<_, i64>(8)?.max(0) as u64,
            cache_write: row.get::<_, i64>(9)?.max(0) as u64,
            total: row.get::<_, i64>(10)?.max(0) as u64,
        },
        cost: CostBreakdown {
            input: row.get(11)?,
            output: row.get(12)?,
            cache_read: row.get(13)?,
            cache_write: row.get(14)?,
            total: row.get(15)?,
        },
        stop_reason: row.get(16)?,
        recorded_at: row.get(17)?,
    })
}
