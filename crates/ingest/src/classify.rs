use std::sync::OnceLock;

use collector_core::SessionKind;
use regex::Regex;

use crate::parser::{header_key, message_view, record_label};
use crate::reader::Record;

const MAIN_SESSION_KEY: &str = "agent:main:main";
const GROUP_CHAT_TAG: &str = r"^\s*\[(?:[^\]]*\s)?id:-\d+(?:\s[^\]]*)?\]";

/// Classifies a session key by its well-known substrings.
///
/// Returns `None` when the key carries no recognizable marker.
pub fn classify_key(key: &str) -> Option<SessionKind> {
    let key = key.trim().to_ascii_lowercase();
    if key.contains("subagent") {
        return Some(SessionKind::Subagent);
    }
    if key == MAIN_SESSION_KEY || key.ends_with(":main") {
        return Some(SessionKind::Main);
    }
    if key.contains(":group:")
        || key.starts_with("group:")
        || key.starts_with("telegram:group")
        || key.starts_with("telegram:-")
    {
        return Some(SessionKind::Group);
    }
    if key.contains("cron") {
        return Some(SessionKind::Other);
    }
    None
}

/// Chooses the kind of a whole transcript.
///
/// A recognizable header key decides immediately. Otherwise content signals
/// are ranked: group chat tag, then delivery mirror, then cron label, and a
/// transcript with none of them is a sub-agent run.
pub fn classify(records: &[Record]) -> SessionKind {
    if let Some(kind) = records
        .iter()
        .find_map(header_key)
        .and_then(classify_key)
    {
        return kind;
    }

    let mut delivery_mirror = false;
    let mut group_tag = false;
    let mut cron_label = false;
    for record in records {
        if record_label(record).is_some_and(|label| label.to_ascii_lowercase().contains("cron")) {
            cron_label = true;
        }
        let Some(view) = message_view(record) else {
            continue;
        };
        if view.is_internal() {
            delivery_mirror = true;
        }
        if view.role == Some("user") && view.text().is_some_and(|text| has_group_chat_tag(&text))
        {
            group_tag = true;
        }
    }

    if group_tag {
        SessionKind::Group
    } else if delivery_mirror {
        SessionKind::Main
    } else if cron_label {
        SessionKind::Other
    } else {
        SessionKind::Subagent
    }
}

/// Matches a leading channel tag with a negative chat id, such as
/// `[Telegram TeamChat id:-10023]`.
pub fn has_group_chat_tag(text: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(GROUP_CHAT_TAG).ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(text))
}
