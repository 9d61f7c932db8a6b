use std::path::{Path, PathBuf};

use collector_core::is_soft_deleted;
use walkdir::WalkDir;

use crate::types::{IngestError, Result};

pub fn default_transcripts_dir() -> PathBuf {
    if let Ok(path) = std::env::var("SESSION_TRANSCRIPTS_DIR") {
        return PathBuf::from(path);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".openclaw")
            .join("agents")
            .join("main")
            .join("sessions");
    }
    PathBuf::from("sessions")
}

/// True for live transcript files; soft-deleted and lock files are ignored.
pub fn is_transcript_path(path: &Path) -> bool {
    if is_soft_deleted(path) {
        return false;
    }
    matches!(
        path.extension().and_then(|value| value.to_str()),
        Some("jsonl") | Some("ndjson") | Some("log")
    )
}

/// Lists the transcripts directly inside `dir`, sorted by path.
pub fn list_transcripts(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IngestError::MissingDirectory(dir.to_path_buf()));
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
    {
        let entry = entry.map_err(|err| {
            IngestError::Io(
                err.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("walkdir loop detected")),
            )
        })?;
        if entry.file_type().is_file() && is_transcript_path(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}
