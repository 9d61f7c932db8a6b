use async_trait::async_trait;
use collector_core::{SessionSummary, UsageEvent};

use crate::error::Result;

/// Destination for summaries, usage events and per-session watermarks.
///
/// Every write is a keyed upsert: summaries on session key, usage events on
/// event key, watermarks on session id. Resubmitting a batch must leave the
/// target in the same state.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    async fn upsert_summaries(&self, summaries: &[SessionSummary]) -> Result<()>;

    async fn upsert_usage_events(&self, events: &[UsageEvent]) -> Result<()>;

    async fn get_watermark(&self, session_id: &str) -> Result<Option<i64>>;

    async fn set_watermark(&self, session_id: &str, last_timestamp: i64) -> Result<()>;

    /// Short name used in log lines.
    fn name(&self) -> &'static str;
}
