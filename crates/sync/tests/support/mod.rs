#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use collector_core::{SessionSummary, UsageEvent};
use collector_sync::{Result, SyncError, SyncTarget};

/// In-memory target with switches for injecting failures.
#[derive(Default)]
pub struct MemoryTarget {
    pub summaries: Mutex<BTreeMap<String, SessionSummary>>,
    pub events: Mutex<BTreeMap<String, UsageEvent>>,
    pub watermarks: Mutex<HashMap<String, i64>>,
    pub summary_calls: AtomicUsize,
    pub event_rows_submitted: AtomicUsize,
    /// Number of upcoming summary upserts that fail.
    pub fail_summaries: AtomicUsize,
    pub fail_events: AtomicBool,
    pub fail_set_watermark: AtomicBool,
}

impl MemoryTarget {
    pub fn summary(&self, key: &str) -> Option<SessionSummary> {
        self.summaries.lock().expect("lock").get(key).cloned()
    }

    pub fn summary_count(&self) -> usize {
        self.summaries.lock().expect("lock").len()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().expect("lock").len()
    }

    pub fn watermark(&self, session_id: &str) -> Option<i64> {
        self.watermarks.lock().expect("lock").get(session_id).copied()
    }
}

fn injected() -> SyncError {
    SyncError::Other("injected failure".to_string())
}

#[async_trait]
impl SyncTarget for MemoryTarget {
    async fn upsert_summaries(&self, summaries: &[SessionSummary]) -> Result<()> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_summaries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(injected());
        }
        let mut stored = self.summaries.lock().expect("lock");
        for summary in summaries {
            stored.insert(summary.session_key.as_str().to_string(), summary.clone());
        }
        Ok(())
    }

    async fn upsert_usage_events(&self, events: &[UsageEvent]) -> Result<()> {
        if self.fail_events.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.event_rows_submitted
            .fetch_add(events.len(), Ordering::SeqCst);
        let mut stored = self.events.lock().expect("lock");
        for event in events {
            stored.insert(event.event_key.clone(), event.clone());
        }
        Ok(())
    }

    async fn get_watermark(&self, session_id: &str) -> Result<Option<i64>> {
        Ok(self.watermark(session_id))
    }

    async fn set_watermark(&self, session_id: &str, last_timestamp: i64) -> Result<()> {
        if self.fail_set_watermark.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.watermarks
            .lock()
            .expect("lock")
            .insert(session_id.to_string(), last_timestamp);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

pub fn header(key: &str, ts: i64) -> String {
    format!(r#"{{"type":"session","key":"{key}","timestamp":{ts}}}"#)
}

pub fn assistant(ts: i64, provider: &str, cost: f64) -> String {
    format!(
        r#"{{"type":"message","timestamp":{ts},"message":{{"role":"assistant","provider":"{provider}","model":"m1","timestamp":{ts},"content":[{{"type":"text","text":"reply {ts}"}}],"usage":{{"input":10,"output":5,"totalTokens":15,"cost":{{"total":{cost}}}}}}}}}"#
    )
}

pub fn user(ts: i64, text: &str) -> String {
    format!(
        r#"{{"type":"message","timestamp":{ts},"message":{{"role":"user","content":"{text}","timestamp":{ts}}}}}"#
    )
}

pub fn write_transcript(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut contents = lines.join("\n");
    contents.push('\n');
    fs::write(&path, contents).expect("write transcript");
    path
}

/// Polls `check` until it holds or the timeout elapses.
pub async fn wait_for(mut check: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
