use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use collector_core::now_ms;
use ingest::is_transcript_path;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::pipeline::Collector;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Quiet period after the last change before dirty files are flushed.
    pub debounce: Duration,
    /// Period of the full reconciliation pass.
    pub full_sync_interval: Duration,
    /// Upper bound on the retry delay after failed cycles.
    pub backoff_cap: Duration,
    pub state_file: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(5),
            full_sync_interval: Duration::from_secs(120),
            backoff_cap: Duration::from_secs(300),
            state_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    FullSync,
    Shutdown,
}

/// Transcripts waiting for the next flush, in path order.
#[derive(Debug, Default)]
pub struct DirtySet {
    paths: BTreeSet<PathBuf>,
}

impl DirtySet {
    pub fn insert(&mut self, path: PathBuf) -> bool {
        self.paths.insert(path)
    }

    pub fn extend(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        self.paths.extend(paths);
    }

    pub fn take(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.paths).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn snapshot(&self) -> Vec<PathBuf> {
        self.paths.iter().cloned().collect()
    }
}

/// Debounce delay that doubles with each consecutive failure, up to a cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
            failures: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        let factor = 1u32.checked_shl(self.failures).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Informational mirror of the scheduler, rewritten after every cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerState {
    pub dirty: Vec<PathBuf>,
    pub last_full_sync_at: Option<i64>,
    pub last_flush_at: Option<i64>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// Single worker that owns the dirty set and both timers.
pub struct ChangeScheduler {
    collector: Arc<Collector>,
    config: SchedulerConfig,
}

impl ChangeScheduler {
    pub fn new(collector: Arc<Collector>, config: SchedulerConfig) -> Self {
        Self { collector, config }
    }

    /// Watches the transcript directory and runs until a shutdown command
    /// arrives or the command channel closes.
    pub async fn watch(self, commands: mpsc::Receiver<SchedulerCommand>) -> Result<()> {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let _watcher = create_fs_watcher(self.collector.transcripts_dir(), event_tx)?;
        info!(dir = %self.collector.transcripts_dir().display(), "watching transcripts");
        self.run(event_rx, commands).await;
        Ok(())
    }

    /// Event loop over changed paths, commands, the debounce deadline and
    /// the periodic full sync. Pending changes are flushed before returning.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<PathBuf>,
        mut commands: mpsc::Receiver<SchedulerCommand>,
    ) {
        let mut dirty = DirtySet::default();
        let mut backoff = Backoff::new(self.config.debounce, self.config.backoff_cap);
        let mut state = SchedulerState::default();
        let mut deadline: Option<Instant> = None;
        let mut events_open = true;
        let mut full_sync = time::interval(self.config.full_sync_interval);
        full_sync.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = events.recv(), if events_open => {
                    match event {
                        Some(path) => {
                            if dirty.insert(path) {
                                debug!(pending = dirty.len(), "transcript changed");
                            }
                            deadline = Some(Instant::now() + backoff.delay());
                        }
                        None => events_open = false,
                    }
                }
                command = commands.recv() => {
                    match command {
                        Some(SchedulerCommand::FullSync) => {
                            self.full_cycle(&mut dirty, &mut backoff, &mut state).await;
                            deadline = retry_deadline(&dirty, &backoff);
                        }
                        Some(SchedulerCommand::Shutdown) | None => break,
                    }
                }
                () = async {
                    if let Some(deadline) = deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if deadline.is_some() => {
                    self.flush(&mut dirty, &mut backoff, &mut state).await;
                    deadline = retry_deadline(&dirty, &backoff);
                }
                _ = full_sync.tick() => {
                    self.full_cycle(&mut dirty, &mut backoff, &mut state).await;
                    deadline = retry_deadline(&dirty, &backoff);
                }
            }
        }

        while let Ok(path) = events.try_recv() {
            dirty.insert(path);
        }
        if !dirty.is_empty() {
            info!(pending = dirty.len(), "flushing before shutdown");
            self.flush(&mut dirty, &mut backoff, &mut state).await;
        }
    }

    async fn full_cycle(
        &self,
        dirty: &mut DirtySet,
        backoff: &mut Backoff,
        state: &mut SchedulerState,
    ) {
        match self.collector.list_transcripts() {
            Ok(paths) => {
                debug!(files = paths.len(), "full reconciliation");
                dirty.extend(paths);
                state.last_full_sync_at = Some(now_ms());
                self.flush(dirty, backoff, state).await;
            }
            Err(err) => {
                warn!(error = %err, "failed to list transcripts");
                backoff.record_failure();
                state.consecutive_failures = backoff.failures();
                state.last_error = Some(err.to_string());
                self.persist_state(state);
            }
        }
    }

    async fn flush(&self, dirty: &mut DirtySet, backoff: &mut Backoff, state: &mut SchedulerState) {
        let paths = dirty.take();
        if paths.is_empty() {
            return;
        }
        let now = now_ms();
        let sessions = self.collector.sync_sessions(&paths, now).await;
        let usage = self.collector.extract_usage(&paths).await;

        let last_error = sessions
            .issues
            .iter()
            .chain(usage.issues.iter())
            .last()
            .map(|issue| format!("{}: {}", issue.file_path, issue.message));
        let mut retry = sessions.failed;
        retry.extend(usage.failed);

        if retry.is_empty() {
            backoff.reset();
            state.last_error = None;
        } else {
            backoff.record_failure();
            warn!(
                files = retry.len(),
                failures = backoff.failures(),
                retry_in_ms = backoff.delay().as_millis() as u64,
                "sync cycle incomplete, requeueing"
            );
            state.last_error = last_error;
            dirty.extend(retry);
        }
        state.last_flush_at = Some(now);
        state.consecutive_failures = backoff.failures();
        state.dirty = dirty.snapshot();
        self.persist_state(state);
    }

    fn persist_state(&self, state: &SchedulerState) {
        let Some(path) = &self.config.state_file else {
            return;
        };
        if let Err(err) = write_state_file(path, state) {
            warn!(path = %path.display(), error = %err, "failed to write scheduler state");
        }
    }
}

fn retry_deadline(dirty: &DirtySet, backoff: &Backoff) -> Option<Instant> {
    (!dirty.is_empty()).then(|| Instant::now() + backoff.delay())
}

fn write_state_file(path: &Path, state: &SchedulerState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn create_fs_watcher(dir: &Path, sender: mpsc::Sender<PathBuf>) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                for path in event.paths {
                    if is_transcript_path(&path) {
                        let _ = sender.blocking_send(path);
                    }
                }
            }
            Err(err) => warn!(error = %err, "watch event error"),
        },
        NotifyConfig::default(),
    )?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
