use collector_core::{SessionKey, UsageEvent};

use crate::classify::{classify, classify_key};
use crate::parser::{event_key, header_key, message_view, record_timestamps};
use crate::reader::Record;

/// Usage events newer than a watermark, plus the watermark to store once
/// those events are durably written.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub events: Vec<UsageEvent>,
    /// Highest timestamp seen above the previous watermark, qualifying or
    /// not. `None` when nothing newer was found.
    pub watermark: Option<i64>,
}

impl Extraction {
    /// True when the stored watermark has to move forward.
    pub fn advances(&self, previous: Option<i64>) -> bool {
        match (self.watermark, previous) {
            (Some(next), Some(previous)) => next > previous,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// Extracts billed assistant messages strictly newer than `watermark`.
///
/// Messages at exactly the watermark are never re-emitted. The returned
/// watermark also covers non-qualifying traffic so those lines are not
/// rescanned.
pub fn extract_usage_events(
    session_id: &str,
    records: &[Record],
    watermark: Option<i64>,
) -> Extraction {
    let declared = records.iter().find_map(header_key);
    let session_key = SessionKey::resolve(declared, session_id);
    let transcript_kind = classify(records);
    let is_new = |ts: i64| watermark.is_none_or(|mark| ts > mark);

    let mut events = Vec::new();
    let mut next_watermark: Option<i64> = None;
    for record in records {
        for ts in record_timestamps(record).filter(|ts| is_new(*ts)) {
            next_watermark = Some(next_watermark.map_or(ts, |current| current.max(ts)));
        }
        let Some(view) = message_view(record) else {
            continue;
        };
        let Some(ts) = view.timestamp.filter(|ts| is_new(*ts)) else {
            continue;
        };
        let Some((tokens, cost)) = view.billable() else {
            continue;
        };
        let session_kind = view
            .session_key
            .and_then(classify_key)
            .or_else(|| session_key.declared().and_then(classify_key))
            .unwrap_or(transcript_kind);
        events.push(UsageEvent {
            event_key: event_key(session_id, ts, record.line),
            session_id: session_id.to_string(),
            session_key: session_key.as_str().to_string(),
            session_kind,
            provider: view.provider.unwrap_or_default().to_string(),
            model: view.model.map(str::to_string),
            tokens,
            cost,
            stop_reason: view.stop_reason.map(str::to_string),
            recorded_at: ts,
        });
    }

    Extraction {
        events,
        watermark: next_watermark,
    }
}
