use std::fs;
use std::path::Path;
use std::time::Instant;

use serde_json::Value;
use tracing::debug;

use crate::types::Result;

/// One parsed transcript line.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Zero-based line index in the file, counting malformed lines too.
    pub line: usize,
    pub value: Value,
}

/// Reads the current contents of a transcript as a single snapshot.
///
/// Lines that are not JSON objects are dropped, including a final line that
/// is still being written. A file without any parseable line yields an empty
/// list.
pub fn read_transcript(path: &Path) -> Result<Vec<Record>> {
    let start = Instant::now();
    let bytes = fs::read(path)?;
    let records = parse_records(&bytes);
    debug!(
        file = %path.display(),
        bytes = bytes.len(),
        records = records.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "read transcript"
    );
    Ok(records)
}

pub fn parse_records(bytes: &[u8]) -> Vec<Record> {
    bytes
        .split(|byte| *byte == b'\n')
        .enumerate()
        .filter_map(|(line, raw)| {
            let value = parse_json_line(raw)?;
            Some(Record { line, value })
        })
        .collect()
}

fn parse_json_line(raw: &[u8]) -> Option<Value> {
    let text = std::str::from_utf8(raw).ok()?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}
