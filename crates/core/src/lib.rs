use std::fmt;
use std::ops::AddAssign;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A session counts as `active` while its latest event is younger than this.
pub const FRESHNESS_WINDOW_MS: i64 = 10 * 60 * 1000;

/// Upper bound on the stored `last_message` text, in characters.
pub const LAST_MESSAGE_MAX_CHARS: usize = 500;

/// Provider name used by the agent runtime for delivery-mirror echoes.
pub const INTERNAL_PROVIDER: &str = "openclaw";

/// Model name carried by delivery-mirror echoes.
pub const DELIVERY_MIRROR_MODEL: &str = "delivery-mirror";

const TRANSCRIPT_EXTENSIONS: &[&str] = &[".jsonl", ".ndjson", ".log"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Main,
    Subagent,
    Group,
    Other,
    Unknown,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Subagent => "subagent",
            Self::Group => "group",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "main" => Self::Main,
            "subagent" => Self::Subagent,
            "group" => Self::Group,
            "other" => Self::Other,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    /// `Active` iff `now - last_active` is strictly below the window.
    pub fn at(last_active_ms: i64, now_ms: i64, window_ms: i64) -> Self {
        if now_ms.saturating_sub(last_active_ms) < window_ms {
            Self::Active
        } else {
            Self::Completed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

/// Natural identity of a session.
///
/// A key declared in the transcript header always takes precedence over the
/// id derived from the file name; the fallback is only used when the header
/// declares nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum SessionKey {
    Declared(String),
    Fallback(String),
}

impl SessionKey {
    pub fn resolve(declared: Option<&str>, session_id: &str) -> Self {
        match declared.map(str::trim) {
            Some(key) if !key.is_empty() => Self::Declared(key.to_string()),
            _ => Self::Fallback(session_id.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Declared(key) | Self::Fallback(key) => key,
        }
    }

    pub fn declared(&self) -> Option<&str> {
        match self {
            Self::Declared(key) => Some(key),
            Self::Fallback(_) => None,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBreakdown {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    pub total: u64,
}

impl AddAssign for TokenBreakdown {
    fn add_assign(&mut self, other: Self) {
        self.input = self.input.saturating_add(other.input);
        self.output = self.output.saturating_add(other.output);
        self.cache_read = self.cache_read.saturating_add(other.cache_read);
        self.cache_write = self.cache_write.saturating_add(other.cache_write);
        self.total = self.total.saturating_add(other.total);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
    pub total: f64,
}

impl AddAssign for CostBreakdown {
    fn add_assign(&mut self, other: Self) {
        self.input += other.input;
        self.output += other.output;
        self.cache_read += other.cache_read;
        self.cache_write += other.cache_write;
        self.total += other.total;
    }
}

/// Current state of one transcript, recomputed from scratch on every sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub session_key: SessionKey,
    pub kind: SessionKind,
    pub label: Option<String>,
    pub display_name: Option<String>,
    pub channel: Option<String>,
    pub last_model: Option<String>,
    pub tokens: TokenBreakdown,
    pub cost: CostBreakdown,
    pub message_count: u64,
    pub last_message: Option<String>,
    pub status: SessionStatus,
    pub started_at: i64,
    pub last_active_at: i64,
    pub duration_ms: Option<i64>,
}

/// One billed assistant message. Never mutated after extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub event_key: String,
    pub session_id: String,
    pub session_key: String,
    pub session_kind: SessionKind,
    pub provider: String,
    pub model: Option<String>,
    pub tokens: TokenBreakdown,
    pub cost: CostBreakdown,
    pub stop_reason: Option<String>,
    pub recorded_at: i64,
}

/// Derives the session id from a transcript path: the file name without its
/// transcript extension.
pub fn session_id_from_source(source: &str) -> String {
    let Some(file_name) = Path::new(source).file_name().and_then(|name| name.to_str()) else {
        return source.to_string();
    };
    for ext in TRANSCRIPT_EXTENSIONS {
        if let Some(stem) = file_name.strip_suffix(ext)
            && !stem.is_empty()
        {
            return stem.to_string();
        }
    }
    Path::new(file_name)
        .file_stem()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| source.to_string())
}

/// Soft-deleted transcripts keep a `.deleted` marker in their name.
pub fn is_soft_deleted(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains(".deleted"))
}

pub fn is_internal_provider(provider: Option<&str>, model: Option<&str>) -> bool {
    provider.is_some_and(|value| value.eq_ignore_ascii_case(INTERNAL_PROVIDER))
        || model.is_some_and(|value| value.eq_ignore_ascii_case(DELIVERY_MIRROR_MODEL))
}

pub fn ms_to_rfc3339(ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
