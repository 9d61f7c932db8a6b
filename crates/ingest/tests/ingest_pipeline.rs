use std::fs::{self, OpenOptions};
use std::io::Write;

use collector_core::{FRESHNESS_WINDOW_MS, SessionKind, session_id_from_source};
use ingest::{classify, extract_usage_events, list_transcripts, read_transcript, summarize};
use tempfile::tempdir;

const HEADER: &str = r#"{"type":"session","id":"6f1c","timestamp":"2025-01-01T00:00:00Z"}"#;

fn assistant_line(ts: i64, provider: &str, cost: f64) -> String {
    format!(
        r#"{{"type":"message","timestamp":{ts},"message":{{"role":"assistant","provider":"{provider}","model":"m","timestamp":{ts},"content":[{{"type":"text","text":"reply at {ts}"}}],"usage":{{"input":10,"output":20,"cacheRead":0,"cacheWrite":0,"totalTokens":30,"cost":{{"input":0,"output":0,"cacheRead":0,"cacheWrite":0,"total":{cost}}}}}}}}}"#
    )
}

#[test]
fn reads_growing_transcript_with_partial_tail() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("6f1c.jsonl");
    let first = assistant_line(1_735_689_601_000, "anthropic", 0.01);
    fs::write(&path, format!("{HEADER}\n{first}\n{{\"type\":\"mess")).expect("write");

    let records = read_transcript(&path).expect("read");
    assert_eq!(records.len(), 2);
    let session_id = session_id_from_source(&path.to_string_lossy());
    assert_eq!(session_id, "6f1c");

    let extraction = extract_usage_events(&session_id, &records, None);
    assert_eq!(extraction.events.len(), 1);
    let watermark = extraction.watermark;
    assert_eq!(watermark, Some(1_735_689_601_000));

    // Writer finishes the torn line and appends another billed reply.
    let mut file = OpenOptions::new().append(true).open(&path).expect("open");
    let second = assistant_line(1_735_689_602_000, "anthropic", 0.02);
    writeln!(file, "age\",\"message\":{{\"role\":\"user\",\"content\":\"hi\"}}}}").expect("append");
    writeln!(file, "{second}").expect("append");

    let records = read_transcript(&path).expect("read again");
    assert_eq!(records.len(), 4);
    let extraction = extract_usage_events(&session_id, &records, watermark);
    assert_eq!(extraction.events.len(), 1);
    assert_eq!(extraction.events[0].recorded_at, 1_735_689_602_000);

    let summary = summarize(&session_id, &records, 1_735_689_602_000, FRESHNESS_WINDOW_MS)
        .expect("summary");
    assert!((summary.cost.total - 0.03).abs() < 1e-9);
    assert_eq!(summary.tokens.total, 60);
    assert_eq!(summary.last_message.as_deref(), Some("reply at 1735689602000"));
    assert_eq!(summary.started_at, 1_735_689_600_000);
    assert_eq!(summary.duration_ms, Some(2_000));
}

#[test]
fn mirror_cost_never_reaches_totals() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("s.jsonl");
    let lines = [
        assistant_line(1_000, "anthropic", 0.01),
        assistant_line(2_000, "anthropic", 0.02),
        assistant_line(3_000, "openclaw", 100.0),
    ];
    fs::write(&path, lines.join("\n")).expect("write");

    let records = read_transcript(&path).expect("read");
    let summary = summarize("s", &records, 3_000, FRESHNESS_WINDOW_MS).expect("summary");
    assert!((summary.cost.total - 0.03).abs() < 1e-9);
    assert_eq!(classify(&records), SessionKind::Main);

    let extraction = extract_usage_events("s", &records, None);
    assert_eq!(extraction.events.len(), 2);
    assert!(extraction.events.iter().all(|event| event.provider == "anthropic"));
    assert_eq!(extraction.watermark, Some(3_000));
}

#[test]
fn garbage_only_transcript_is_harmless() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("junk.jsonl");
    fs::write(&path, "not json\n{broken\n\n").expect("write");

    let records = read_transcript(&path).expect("read");
    assert!(records.is_empty());
    assert!(summarize("junk", &records, 0, FRESHNESS_WINDOW_MS).is_none());
    let extraction = extract_usage_events("junk", &records, Some(10));
    assert!(extraction.events.is_empty());
    assert_eq!(extraction.watermark, None);
}

#[test]
fn listing_skips_soft_deleted_transcripts() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("live.jsonl"), HEADER).expect("write");
    fs::write(
        dir.path().join("gone.jsonl.deleted.2025-01-01T00-00-00Z"),
        HEADER,
    )
    .expect("write");
    let paths = list_transcripts(dir.path()).expect("list");
    assert_eq!(paths, vec![dir.path().join("live.jsonl")]);
}
