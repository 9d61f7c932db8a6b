mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use collector_sync::{ChangeScheduler, Collector, CollectorConfig, SchedulerCommand, SchedulerConfig};
use support::{MemoryTarget, assistant, header, wait_for, write_transcript};
use tempfile::tempdir;
use tokio::sync::mpsc;

fn config(debounce_ms: u64) -> SchedulerConfig {
    SchedulerConfig {
        debounce: Duration::from_millis(debounce_ms),
        full_sync_interval: Duration::from_secs(3_600),
        backoff_cap: Duration::from_millis(200),
        state_file: None,
    }
}

#[tokio::test]
async fn debounced_change_is_flushed() {
    let dir = tempdir().expect("tempdir");
    let target = Arc::new(MemoryTarget::default());
    let collector = Arc::new(Collector::new(target.clone(), CollectorConfig::new(dir.path())));
    let (event_tx, event_rx) = mpsc::channel(16);
    let (command_tx, command_rx) = mpsc::channel(4);
    let handle = tokio::spawn(ChangeScheduler::new(collector, config(50)).run(event_rx, command_rx));

    let path = write_transcript(
        dir.path(),
        "s.jsonl",
        &[header("agent:main:main", 1_000), assistant(2_000, "anthropic", 0.1)],
    );
    event_tx.send(path.clone()).await.expect("send");
    event_tx.send(path).await.expect("send again");

    assert!(wait_for(|| target.summary_count() == 1, Duration::from_secs(5)).await);
    assert!(wait_for(|| target.watermark("s") == Some(2_000), Duration::from_secs(5)).await);

    command_tx.send(SchedulerCommand::Shutdown).await.expect("shutdown");
    handle.await.expect("join");
}

#[tokio::test]
async fn shutdown_flushes_pending_changes() {
    let dir = tempdir().expect("tempdir");
    let target = Arc::new(MemoryTarget::default());
    let collector = Arc::new(Collector::new(target.clone(), CollectorConfig::new(dir.path())));
    let (event_tx, event_rx) = mpsc::channel(16);
    let (command_tx, command_rx) = mpsc::channel(4);
    let handle =
        tokio::spawn(ChangeScheduler::new(collector, config(3_600_000)).run(event_rx, command_rx));

    // Let the startup reconciliation run over the empty directory first.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let path = write_transcript(dir.path(), "late.jsonl", &[assistant(5_000, "anthropic", 0.2)]);
    event_tx.send(path).await.expect("send");
    command_tx.send(SchedulerCommand::Shutdown).await.expect("shutdown");
    handle.await.expect("join");

    assert!(target.summary("late").is_some());
    assert_eq!(target.event_count(), 1);
}

#[tokio::test]
async fn failed_batch_is_requeued_and_retried() {
    let dir = tempdir().expect("tempdir");
    let target = Arc::new(MemoryTarget::default());
    target.fail_summaries.store(2, Ordering::SeqCst);
    let collector = Arc::new(Collector::new(target.clone(), CollectorConfig::new(dir.path())));
    let state_file = dir.path().join("state").join("scheduler-state.json");
    let mut config = config(20);
    config.state_file = Some(state_file.clone());
    let (event_tx, event_rx) = mpsc::channel(16);
    let (command_tx, command_rx) = mpsc::channel(4);
    let handle = tokio::spawn(ChangeScheduler::new(collector, config).run(event_rx, command_rx));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let path = write_transcript(dir.path(), "flaky.jsonl", &[assistant(1_000, "anthropic", 0.1)]);
    event_tx.send(path).await.expect("send");

    assert!(wait_for(|| target.summary_count() == 1, Duration::from_secs(5)).await);
    assert!(target.summary_calls.load(Ordering::SeqCst) >= 3);

    command_tx.send(SchedulerCommand::Shutdown).await.expect("shutdown");
    handle.await.expect("join");
    let state: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&state_file).expect("state")).expect("json");
    assert_eq!(state["consecutive_failures"], 0);
    assert!(state["last_error"].is_null());
}

#[tokio::test]
async fn full_sync_command_picks_up_unnotified_files() {
    let dir = tempdir().expect("tempdir");
    let target = Arc::new(MemoryTarget::default());
    let collector = Arc::new(Collector::new(target.clone(), CollectorConfig::new(dir.path())));
    let (_event_tx, event_rx) = mpsc::channel::<std::path::PathBuf>(16);
    let (command_tx, command_rx) = mpsc::channel(4);
    let handle =
        tokio::spawn(ChangeScheduler::new(collector, config(3_600_000)).run(event_rx, command_rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    write_transcript(dir.path(), "quiet.jsonl", &[assistant(1_000, "anthropic", 0.1)]);
    command_tx.send(SchedulerCommand::FullSync).await.expect("full sync");

    assert!(wait_for(|| target.summary("quiet").is_some(), Duration::from_secs(5)).await);
    drop(command_tx);
    handle.await.expect("join");
}

#[cfg_attr(
    not(target_os = "linux"),
    ignore = "watcher delivery is only reliable on Linux"
)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watcher_forwards_only_live_transcripts() {
    if std::env::var("SKIP_WATCH_FLOW").is_ok() {
        eprintln!("skipping watcher flow due to SKIP_WATCH_FLOW");
        return;
    }
    let dir = tempdir().expect("tempdir");
    let target = Arc::new(MemoryTarget::default());
    let collector = Arc::new(Collector::new(target.clone(), CollectorConfig::new(dir.path())));
    let (command_tx, command_rx) = mpsc::channel(4);
    let handle = tokio::spawn(ChangeScheduler::new(collector, config(100)).watch(command_rx));

    tokio::time::sleep(Duration::from_millis(250)).await;
    if handle.is_finished() {
        match handle.await.expect("join") {
            Err(err) => {
                eprintln!("skipping watcher flow: watcher unavailable: {err}");
                return;
            }
            Ok(()) => panic!("scheduler exited before shutdown"),
        }
    }

    write_transcript(
        dir.path(),
        "gone.jsonl.deleted.2025-01-01T00-00-00Z",
        &[assistant(1_000, "anthropic", 9.0)],
    );
    write_transcript(dir.path(), "notes.txt", &[assistant(1_000, "anthropic", 9.0)]);
    write_transcript(dir.path(), "live.jsonl", &[assistant(2_000, "anthropic", 0.1)]);

    assert!(
        wait_for(|| target.summary("live").is_some(), Duration::from_secs(5)).await,
        "live transcript never reached the target"
    );
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(target.summary_count(), 1);
    assert_eq!(target.event_count(), 1);

    command_tx.send(SchedulerCommand::Shutdown).await.expect("shutdown");
    handle.await.expect("join").expect("watch");
}
