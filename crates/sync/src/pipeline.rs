use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use collector_core::{FRESHNESS_WINDOW_MS, SessionSummary, session_id_from_source};
use ingest::{
    IngestError, IngestIssue, Record, extract_usage_events, list_transcripts, read_transcript,
    summarize,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backup::BackupLog;
use crate::error::Result;
use crate::target::SyncTarget;

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub transcripts_dir: PathBuf,
    pub batch_size: usize,
    pub freshness_ms: i64,
}

impl CollectorConfig {
    pub fn new(transcripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            transcripts_dir: transcripts_dir.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            freshness_ms: FRESHNESS_WINDOW_MS,
        }
    }
}

/// Outcome of one summary sync pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub summaries_written: usize,
    /// Files whose summaries were not applied and must be retried.
    pub failed: Vec<PathBuf>,
    pub issues: Vec<IngestIssue>,
}

/// Outcome of one usage extraction pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageReport {
    pub files_scanned: usize,
    pub events_written: usize,
    pub watermarks_advanced: usize,
    pub failed: Vec<PathBuf>,
    pub issues: Vec<IngestIssue>,
}

/// Reads transcripts and ships their summaries and usage events to a target.
///
/// Files are processed one at a time and every remote write is awaited
/// before the next one starts.
pub struct Collector {
    target: Arc<dyn SyncTarget>,
    backup: Option<BackupLog>,
    config: CollectorConfig,
}

impl Collector {
    pub fn new(target: Arc<dyn SyncTarget>, config: CollectorConfig) -> Self {
        Self {
            target,
            backup: None,
            config,
        }
    }

    pub fn with_backup(mut self, backup: BackupLog) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn transcripts_dir(&self) -> &Path {
        &self.config.transcripts_dir
    }

    pub fn list_transcripts(&self) -> Result<Vec<PathBuf>> {
        Ok(list_transcripts(&self.config.transcripts_dir)?)
    }

    /// Summarizes `paths` and upserts the summaries in bounded batches.
    pub async fn sync_sessions(&self, paths: &[PathBuf], now_ms: i64) -> SyncReport {
        let started = Instant::now();
        let mut report = SyncReport::default();
        // session key -> (winning summary, every file that produced that key)
        let mut by_key: HashMap<String, (SessionSummary, Vec<PathBuf>)> = HashMap::new();

        for path in paths {
            let Some(records) = read_or_skip(path, &mut report.issues, &mut report.failed) else {
                report.files_skipped += 1;
                continue;
            };
            report.files_scanned += 1;
            let session_id = session_id_for(path);
            let Some(summary) =
                summarize(&session_id, &records, now_ms, self.config.freshness_ms)
            else {
                debug!(path = %path.display(), "transcript has no timestamps yet");
                report.files_skipped += 1;
                continue;
            };
            let key = summary.session_key.as_str().to_string();
            match by_key.get_mut(&key) {
                Some((current, sources)) => {
                    if summary.last_active_at >= current.last_active_at {
                        *current = summary;
                    }
                    sources.push(path.clone());
                }
                None => {
                    by_key.insert(key, (summary, vec![path.clone()]));
                }
            }
        }

        let mut pending: Vec<(SessionSummary, Vec<PathBuf>)> = by_key.into_values().collect();
        pending.sort_by(|a, b| a.0.session_key.as_str().cmp(b.0.session_key.as_str()));

        for chunk in pending.chunks(self.config.batch_size.max(1)) {
            let batch: Vec<SessionSummary> =
                chunk.iter().map(|(summary, _)| summary.clone()).collect();
            match self.target.upsert_summaries(&batch).await {
                Ok(()) => report.summaries_written += batch.len(),
                Err(err) => {
                    warn!(
                        target_store = self.target.name(),
                        batch = batch.len(),
                        error = %err,
                        "summary batch failed"
                    );
                    for (_, sources) in chunk {
                        for source in sources {
                            report
                                .issues
                                .push(IngestIssue::new(source.display().to_string(), &err));
                            report.failed.push(source.clone());
                        }
                    }
                }
            }
        }

        info!(
            scanned = report.files_scanned,
            written = report.summaries_written,
            failed = report.failed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "session sync finished"
        );
        report
    }

    /// Extracts usage events newer than each session's watermark and ships
    /// them. A watermark only moves after every event batch of its file has
    /// been applied.
    pub async fn extract_usage(&self, paths: &[PathBuf]) -> UsageReport {
        let mut report = UsageReport::default();
        for path in paths {
            let Some(records) = read_or_skip(path, &mut report.issues, &mut report.failed) else {
                continue;
            };
            report.files_scanned += 1;
            match self.extract_file(path, &records).await {
                Ok((written, advanced)) => {
                    report.events_written += written;
                    if advanced {
                        report.watermarks_advanced += 1;
                    }
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        target_store = self.target.name(),
                        error = %err,
                        "usage extraction failed"
                    );
                    report
                        .issues
                        .push(IngestIssue::new(path.display().to_string(), &err));
                    report.failed.push(path.clone());
                }
            }
        }
        if report.events_written > 0 || !report.failed.is_empty() {
            info!(
                scanned = report.files_scanned,
                events = report.events_written,
                watermarks = report.watermarks_advanced,
                failed = report.failed.len(),
                "usage extraction finished"
            );
        }
        report
    }

    async fn extract_file(&self, path: &Path, records: &[Record]) -> Result<(usize, bool)> {
        let session_id = session_id_for(path);
        let watermark = self.target.get_watermark(&session_id).await?;
        let extraction = extract_usage_events(&session_id, records, watermark);

        if !extraction.events.is_empty()
            && let Some(backup) = &self.backup
            && let Err(err) = backup.append(&extraction.events)
        {
            warn!(path = %backup.path().display(), error = %err, "backup write failed");
        }

        for batch in extraction.events.chunks(self.config.batch_size.max(1)) {
            self.target.upsert_usage_events(batch).await?;
        }

        let advanced = match extraction.watermark {
            Some(next) if extraction.advances(watermark) => {
                self.target.set_watermark(&session_id, next).await?;
                true
            }
            _ => false,
        };
        Ok((extraction.events.len(), advanced))
    }

    /// Reconciles every transcript in the directory.
    pub async fn full_sync(&self, now_ms: i64) -> Result<(SyncReport, UsageReport)> {
        let paths = self.list_transcripts()?;
        let sessions = self.sync_sessions(&paths, now_ms).await;
        let usage = self.extract_usage(&paths).await;
        Ok((sessions, usage))
    }
}

fn session_id_for(path: &Path) -> String {
    session_id_from_source(&path.to_string_lossy())
}

/// Reads a transcript. Vanished files are dropped quietly; other read errors
/// are recorded and the file is queued for retry.
fn read_or_skip(
    path: &Path,
    issues: &mut Vec<IngestIssue>,
    failed: &mut Vec<PathBuf>,
) -> Option<Vec<Record>> {
    match read_transcript(path) {
        Ok(records) => Some(records),
        Err(IngestError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "transcript vanished before read");
            None
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read transcript");
            issues.push(IngestIssue::new(path.display().to_string(), &err));
            failed.push(path.to_path_buf());
            None
        }
    }
}
