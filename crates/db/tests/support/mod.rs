#![allow(dead_code)]

use std::path::PathBuf;

use collector_core::{
    CostBreakdown, SessionKey, SessionKind, SessionStatus, SessionSummary, TokenBreakdown,
    UsageEvent,
};
use collector_db::Db;
use tempfile::TempDir;

pub struct TestDb {
    pub _dir: TempDir,
    pub db: Db,
    pub path: PathBuf,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.sqlite");
    let mut db = Db::open(&path).expect("open db");
    db.migrate().expect("migrate db");
    TestDb {
        _dir: dir,
        db,
        path,
    }
}

pub fn tokens(input: u64, output: u64) -> TokenBreakdown {
    TokenBreakdown {
        input,
        output,
        cache_read: 0,
        cache_write: 0,
        total: input + output,
    }
}

pub fn cost(total: f64) -> CostBreakdown {
    CostBreakdown {
        total,
        ..CostBreakdown::default()
    }
}

pub fn make_summary(session_id: &str, key: SessionKey, last_active_at: i64) -> SessionSummary {
    SessionSummary {
        session_id: session_id.to_string(),
        session_key: key,
        kind: SessionKind::Main,
        label: Some("label".to_string()),
        display_name: None,
        channel: Some("telegram".to_string()),
        last_model: Some("claude".to_string()),
        tokens: tokens(10, 20),
        cost: cost(0.05),
        message_count: 4,
        last_message: Some("hello".to_string()),
        status: SessionStatus::Completed,
        started_at: 1_000,
        last_active_at,
        duration_ms: (last_active_at > 1_000).then_some(last_active_at - 1_000),
    }
}

pub fn make_event(event_key: &str, session_id: &str, recorded_at: i64) -> UsageEvent {
    UsageEvent {
        event_key: event_key.to_string(),
        session_id: session_id.to_string(),
        session_key: format!("agent:main:{session_id}"),
        session_kind: SessionKind::Subagent,
        provider: "anthropic".to_string(),
        model: Some("claude".to_string()),
        tokens: tokens(1, 2),
        cost: cost(0.01),
        stop_reason: Some("stop".to_string()),
        recorded_at,
    }
}
