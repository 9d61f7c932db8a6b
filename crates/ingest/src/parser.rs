use std::fmt::Write;

use chrono::{DateTime, Utc};
use collector_core::{CostBreakdown, TokenBreakdown, is_internal_provider};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::reader::Record;

/// Borrowed view of the message carried by a record, if any.
#[derive(Debug, Clone)]
pub(crate) struct MessageView<'a> {
    pub role: Option<&'a str>,
    pub provider: Option<&'a str>,
    pub model: Option<&'a str>,
    pub stop_reason: Option<&'a str>,
    pub timestamp: Option<i64>,
    pub session_key: Option<&'a str>,
    body: &'a Value,
}

impl<'a> MessageView<'a> {
    pub fn text(&self) -> Option<String> {
        extract_text(self.body.get("content")?)
    }

    pub fn is_internal(&self) -> bool {
        is_internal_provider(self.provider, self.model)
    }

    /// Token and cost breakdown, present only when the usage carries a cost.
    pub fn billed_usage(&self) -> Option<(TokenBreakdown, CostBreakdown)> {
        let usage = self.body.get("usage")?;
        let cost = parse_cost(usage.get("cost")?)?;
        Some((parse_tokens(usage), cost))
    }

    /// Assistant message with a cost, produced by a real external provider.
    pub fn billable(&self) -> Option<(TokenBreakdown, CostBreakdown)> {
        if self.role != Some("assistant") || self.is_internal() {
            return None;
        }
        if self.provider.is_none_or(|provider| provider.trim().is_empty()) {
            return None;
        }
        self.billed_usage()
    }
}

pub(crate) fn is_header(record: &Record) -> bool {
    record.value.get("type").and_then(Value::as_str) == Some("session")
}

pub(crate) fn message_view(record: &Record) -> Option<MessageView<'_>> {
    let value = &record.value;
    let body = match value.get("message") {
        Some(message) if message.is_object() => message,
        _ if value.get("role").is_some() => value,
        _ => return None,
    };
    Some(MessageView {
        role: body.get("role").and_then(Value::as_str),
        provider: find_string(body, &[&["provider"]]).or_else(|| find_string(value, &[&["provider"]])),
        model: find_string(body, &[&["model"]]).or_else(|| find_string(value, &[&["model"]])),
        stop_reason: find_string(body, &[&["stopReason"], &["stop_reason"]]),
        timestamp: body
            .get("timestamp")
            .and_then(normalize_timestamp)
            .or_else(|| value.get("timestamp").and_then(normalize_timestamp)),
        session_key: record_session_key(value),
        body,
    })
}

/// Key declared by a session header.
pub(crate) fn header_key(record: &Record) -> Option<&str> {
    if !is_header(record) {
        return None;
    }
    record_session_key(&record.value)
}

fn record_session_key(value: &Value) -> Option<&str> {
    find_string(
        value,
        &[
            &["key"],
            &["sessionKey"],
            &["session_key"],
            &["message", "sessionKey"],
        ],
    )
    .filter(|key| !key.trim().is_empty())
}

pub(crate) fn record_label(record: &Record) -> Option<&str> {
    find_string(
        &record.value,
        &[&["label"], &["origin", "label"], &["message", "label"]],
    )
}

pub(crate) fn record_display_name(record: &Record) -> Option<&str> {
    find_string(
        &record.value,
        &[
            &["displayName"],
            &["display_name"],
            &["origin", "displayName"],
        ],
    )
}

pub(crate) fn record_channel(record: &Record) -> Option<&str> {
    find_string(
        &record.value,
        &[
            &["channel"],
            &["deliveryContext", "channel"],
            &["origin", "channel"],
            &["message", "channel"],
        ],
    )
}

/// Every timestamp on a record: its envelope and its message.
pub(crate) fn record_timestamps(record: &Record) -> impl Iterator<Item = i64> + '_ {
    let envelope = record.value.get("timestamp").and_then(normalize_timestamp);
    let message = record
        .value
        .get("message")
        .and_then(|message| message.get("timestamp"))
        .and_then(normalize_timestamp);
    envelope.into_iter().chain(message)
}

fn find_string<'a>(value: &'a Value, paths: &[&[&str]]) -> Option<&'a str> {
    for path in paths {
        let mut current = value;
        let mut ok = true;
        for key in *path {
            if let Some(next) = current.get(*key) {
                current = next;
            } else {
                ok = false;
                break;
            }
        }
        if ok && let Some(found) = current.as_str() {
            return Some(found);
        }
    }
    None
}

fn extract_text(content: &Value) -> Option<String> {
    let text = match content {
        Value::String(text) => text.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => return None,
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Normalizes a timestamp to epoch milliseconds.
///
/// Numbers are taken as milliseconds. Digit-only strings are milliseconds,
/// or seconds when they have ten digits or fewer. Values outside the range a
/// UTC datetime can hold are rejected.
pub(crate) fn normalize_timestamp(value: &Value) -> Option<i64> {
    let millis = match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|value| value.is_finite() && value.abs() < i64::MAX as f64)
                .map(|value| value as i64)
        }),
        Value::String(raw) => normalize_timestamp_str(raw.trim()),
        _ => None,
    }?;
    DateTime::<Utc>::from_timestamp_millis(millis).map(|_| millis)
}

fn normalize_timestamp_str(raw: &str) -> Option<i64> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc).timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc().timestamp_millis());
        }
    }
    if raw.chars().all(|ch| ch.is_ascii_digit())
        && let Ok(value) = raw.parse::<i64>()
    {
        return Some(if raw.len() > 10 {
            value
        } else {
            value.saturating_mul(1000)
        });
    }
    None
}

fn value_to_f64(value: &Value) -> Option<f64> {
    if let Some(value) = value.as_f64() {
        return Some(value);
    }
    if let Some(value) = value.as_str() {
        return value.trim().parse::<f64>().ok();
    }
    None
}

fn value_to_u64(value: &Value) -> Option<u64> {
    if let Some(value) = value.as_u64() {
        return Some(value);
    }
    value_to_f64(value)
        .filter(|value| *value >= 0.0)
        .map(|value| value as u64)
}

fn first_u64(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| value.get(*key).and_then(value_to_u64))
}

fn first_f64(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| value.get(*key).and_then(value_to_f64))
}

fn parse_tokens(usage: &Value) -> TokenBreakdown {
    let input = first_u64(usage, &["input", "input_tokens", "inputTokens"]).unwrap_or(0);
    let output = first_u64(usage, &["output", "output_tokens", "outputTokens"]).unwrap_or(0);
    let cache_read = first_u64(
        usage,
        &["cacheRead", "cache_read", "cache_read_input_tokens"],
    )
    .unwrap_or(0);
    let cache_write = first_u64(
        usage,
        &["cacheWrite", "cache_write", "cache_creation_input_tokens"],
    )
    .unwrap_or(0);
    let total = first_u64(usage, &["totalTokens", "total_tokens", "total"])
        .unwrap_or_else(|| input + output + cache_read + cache_write);
    TokenBreakdown {
        input,
        output,
        cache_read,
        cache_write,
        total,
    }
}

fn parse_cost(cost: &Value) -> Option<CostBreakdown> {
    if let Some(total) = value_to_f64(cost) {
        return Some(CostBreakdown {
            total,
            ..CostBreakdown::default()
        });
    }
    if !cost.is_object() {
        return None;
    }
    let input = first_f64(cost, &["input"]).unwrap_or(0.0);
    let output = first_f64(cost, &["output"]).unwrap_or(0.0);
    let cache_read = first_f64(cost, &["cacheRead", "cache_read"]).unwrap_or(0.0);
    let cache_write = first_f64(cost, &["cacheWrite", "cache_write"]).unwrap_or(0.0);
    let total = first_f64(cost, &["total", "total_cost"])
        .unwrap_or(input + output + cache_read + cache_write);
    Some(CostBreakdown {
        input,
        output,
        cache_read,
        cache_write,
        total,
    })
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut out, "{:02x}", byte);
    }
    out
}

/// Stable identity for a usage event: session, timestamp and line position.
pub(crate) fn event_key(session_id: &str, timestamp: i64, line: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update(b":");
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(line.to_string().as_bytes());
    hex_digest(&hasher.finalize())
}
