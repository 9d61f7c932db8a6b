use collector_core::{
    CostBreakdown, LAST_MESSAGE_MAX_CHARS, SessionKey, SessionStatus, SessionSummary,
    TokenBreakdown,
};

use crate::classify::classify;
use crate::parser::{
    header_key, message_view, record_channel, record_display_name, record_label,
    record_timestamps,
};
use crate::reader::Record;

/// Folds a transcript into its current summary.
///
/// Returns `None` when the transcript carries no timestamp at all. The result
/// depends only on `records`, except for `status`, which compares the last
/// activity with `now_ms`.
pub fn summarize(
    session_id: &str,
    records: &[Record],
    now_ms: i64,
    freshness_ms: i64,
) -> Option<SessionSummary> {
    let mut started_at: Option<i64> = None;
    let mut last_active_at: Option<i64> = None;
    for ts in records.iter().flat_map(record_timestamps) {
        started_at = Some(started_at.map_or(ts, |current| current.min(ts)));
        last_active_at = Some(last_active_at.map_or(ts, |current| current.max(ts)));
    }
    let (started_at, last_active_at) = (started_at?, last_active_at?);

    let declared = records.iter().find_map(header_key);
    let session_key = SessionKey::resolve(declared, session_id);

    let mut tokens = TokenBreakdown::default();
    let mut cost = CostBreakdown::default();
    let mut message_count = 0u64;
    let mut last_model = None;
    let mut last_message = None;
    let mut label = None;
    let mut display_name = None;
    let mut channel = None;

    for record in records {
        if label.is_none() {
            label = record_label(record).map(str::to_string);
        }
        if display_name.is_none() {
            display_name = record_display_name(record).map(str::to_string);
        }
        if channel.is_none() {
            channel = record_channel(record).map(str::to_string);
        }
        let Some(view) = message_view(record) else {
            continue;
        };
        message_count += 1;
        let Some((message_tokens, message_cost)) = view.billable() else {
            continue;
        };
        tokens += message_tokens;
        cost += message_cost;
        if let Some(model) = view.model {
            last_model = Some(model.to_string());
        }
        if let Some(text) = view.text() {
            last_message = Some(truncate_chars(&text, LAST_MESSAGE_MAX_CHARS));
        }
    }

    Some(SessionSummary {
        session_id: session_id.to_string(),
        session_key,
        kind: classify(records),
        label,
        display_name,
        channel,
        last_model,
        tokens,
        cost,
        message_count,
        last_message,
        status: SessionStatus::at(last_active_at, now_ms, freshness_ms),
        started_at,
        last_active_at,
        duration_ms: last_active_at
            .checked_sub(started_at)
            .filter(|duration| *duration > 0),
    })
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}
