use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use collector_core::{SessionSummary, UsageEvent};
use collector_db::Db;

use crate::error::{Result, SyncError};
use crate::target::SyncTarget;

/// SQLite-backed target with the same keyed-upsert contracts as the remote
/// store. Calls are short and run inline on the caller's task.
pub struct SqliteStore {
    db: Mutex<Db>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut db = Db::open(path)?;
        db.migrate()?;
        Ok(Self { db: Mutex::new(db) })
    }

    pub fn in_memory() -> Result<Self> {
        let mut db = Db::open_in_memory()?;
        db.migrate()?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Db>> {
        self.db
            .lock()
            .map_err(|_| SyncError::Other("sqlite store lock poisoned".to_string()))
    }

    pub fn count_usage_events(&self, session_id: Option<&str>) -> Result<u64> {
        Ok(self.lock()?.count_usage_events(session_id)?)
    }

    pub fn list_summaries(&self) -> Result<Vec<SessionSummary>> {
        Ok(self.lock()?.list_session_summaries()?)
    }
}

#[async_trait]
impl SyncTarget for SqliteStore {
    async fn upsert_summaries(&self, summaries: &[SessionSummary]) -> Result<()> {
        self.lock()?.upsert_session_summaries(summaries)?;
        Ok(())
    }

    async fn upsert_usage_events(&self, events: &[UsageEvent]) -> Result<()> {
        self.lock()?.upsert_usage_events(events)?;
        Ok(())
    }

    async fn get_watermark(&self, session_id: &str) -> Result<Option<i64>> {
        Ok(self.lock()?.get_watermark(session_id)?)
    }

    async fn set_watermark(&self, session_id: &str, last_timestamp: i64) -> Result<()> {
        self.lock()?.set_watermark(session_id, last_timestamp)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn watermark_roundtrip_through_trait() {
        let store = SqliteStore::in_memory().expect("store");
        let target: &dyn SyncTarget = &store;
        assert_eq!(target.get_watermark("s").await.expect("get"), None);
        target.set_watermark("s", 42).await.expect("set");
        assert_eq!(target.get_watermark("s").await.expect("get"), Some(42));
    }
}
