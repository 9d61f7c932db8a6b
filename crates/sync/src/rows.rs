use collector_core::{SessionSummary, UsageEvent, ms_to_rfc3339};
use serde::Serialize;

/// Remote row for the sessions table. Times are RFC 3339 strings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SummaryRow<'a> {
    pub session_key: &'a str,
    pub session_key_source: &'static str,
    pub session_id: &'a str,
    pub kind: &'static str,
    pub label: Option<&'a str>,
    pub display_name: Option<&'a str>,
    pub channel: Option<&'a str>,
    pub last_model: Option<&'a str>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub cache_read_cost: f64,
    pub cache_write_cost: f64,
    pub total_cost: f64,
    pub message_count: u64,
    pub last_message: Option<&'a str>,
    pub status: &'static str,
    pub started_at: Option<String>,
    pub last_active_at: Option<String>,
    pub duration_ms: Option<i64>,
}

impl<'a> From<&'a SessionSummary> for SummaryRow<'a> {
    fn from(summary: &'a SessionSummary) -> Self {
        Self {
            session_key: summary.session_key.as_str(),
            session_key_source: if summary.session_key.declared().is_some() {
                "declared"
            } else {
                "fallback"
            },
            session_id: &summary.session_id,
            kind: summary.kind.as_str(),
            label: summary.label.as_deref(),
            display_name: summary.display_name.as_deref(),
            channel: summary.channel.as_deref(),
            last_model: summary.last_model.as_deref(),
            input_tokens: summary.tokens.input,
            output_tokens: summary.tokens.output,
            cache_read_tokens: summary.tokens.cache_read,
            cache_write_tokens: summary.tokens.cache_write,
            total_tokens: summary.tokens.total,
            input_cost: summary.cost.input,
            output_cost: summary.cost.output,
            cache_read_cost: summary.cost.cache_read,
            cache_write_cost: summary.cost.cache_write,
            total_cost: summary.cost.total,
            message_count: summary.message_count,
            last_message: summary.last_message.as_deref(),
            status: summary.status.as_str(),
            started_at: ms_to_rfc3339(summary.started_at),
            last_active_at: ms_to_rfc3339(summary.last_active_at),
            duration_ms: summary.duration_ms,
        }
    }
}

/// Remote row for the usage table.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageEventRow<'a> {
    pub event_key: &'a str,
    pub session_id: &'a str,
    pub session_key: &'a str,
    pub session_kind: &'static str,
    pub provider: &'a str,
    pub model: Option<&'a str>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub cache_read_cost: f64,
    pub cache_write_cost: f64,
    pub total_cost: f64,
    pub stop_reason: Option<&'a str>,
    pub recorded_at: Option<String>,
}

impl<'a> From<&'a UsageEvent> for UsageEventRow<'a> {
    fn from(event: &'a UsageEvent) -> Self {
        Self {
            event_key: &event.event_key,
            session_id: &event.session_id,
            session_key: &event.session_key,
            session_kind: event.session_kind.as_str(),
            provider: &event.provider,
            model: event.model.as_deref(),
            input_tokens: event.tokens.input,
            output_tokens: event.tokens.output,
            cache_read_tokens: event.tokens.cache_read,
            cache_write_tokens: event.tokens.cache_write,
            total_tokens: event.tokens.total,
            input_cost: event.cost.input,
            output_cost: event.cost.output,
            cache_read_cost: event.cost.cache_read,
            cache_write_cost: event.cost.cache_write,
            total_cost: event.cost.total,
            stop_reason: event.stop_reason.as_deref(),
            recorded_at: ms_to_rfc3339(event.recorded_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WatermarkRow<'a> {
    pub session_id: &'a str,
    pub last_timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use collector_core::{
        CostBreakdown, SessionKey, SessionKind, SessionStatus, TokenBreakdown,
    };

    #[test]
    fn summary_row_uses_rfc3339_and_key_source() {
        let summary = SessionSummary {
            session_id: "abc".to_string(),
            session_key: SessionKey::Declared("agent:main:main".to_string()),
            kind: SessionKind::Main,
            label: None,
            display_name: None,
            channel: None,
            last_model: Some("claude".to_string()),
            tokens: TokenBreakdown::default(),
            cost: CostBreakdown::default(),
            message_count: 2,
            last_message: None,
            status: SessionStatus::Active,
            started_at: 1_735_689_600_000,
            last_active_at: 1_735_689_601_500,
            duration_ms: Some(1_500),
        };
        let row = SummaryRow::from(&summary);
        assert_eq!(row.session_key, "agent:main:main");
        assert_eq!(row.session_key_source, "declared");
        assert_eq!(row.kind, "main");
        assert_eq!(row.status, "active");
        let json = serde_json::to_value(&row).expect("json");
        assert_eq!(json["started_at"], "2025-01-01T00:00:00.000Z");
        assert_eq!(json["last_active_at"], "2025-01-01T00:00:01.500Z");
    }
}
