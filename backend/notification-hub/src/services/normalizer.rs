//! Collapses both `chat.message_posted` encodings into one [`Notification`].
//!
//! Each output field is resolved on its own: the canonical value wins when it is
//! populated, otherwise the legacy value is used. An empty string counts as not
//! populated, as does the zero instant for timestamps. With neither timestamp
//! populated the notification carries the zero instant itself.

use crate::models::{MessagePostedEvent, Notification};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};

/// Prefix of ids synthesized for events without a `message_id`
pub const GENERATED_ID_PREFIX: &str = "gen-";

/// Decode a raw event payload
pub fn decode_event(payload: &[u8]) -> Result<MessagePostedEvent, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Resolve canonical and legacy fields into the wire notification
pub fn normalize(event: &MessagePostedEvent) -> Notification {
    let sender = first_populated(&event.author_id, &event.sender);
    let msg = first_populated(&event.content, &event.text);
    let ts = populated_time(event.timestamp)
        .or_else(|| populated_time(event.ts))
        .unwrap_or_else(zero_instant);

    let id = match non_empty(&event.message_id) {
        Some(id) => id.to_string(),
        None => format!("{}{}", GENERATED_ID_PREFIX, sender),
    };

    Notification {
        id,
        msg,
        sender,
        ts,
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn first_populated(canonical: &Option<String>, legacy: &Option<String>) -> String {
    non_empty(canonical)
        .or_else(|| non_empty(legacy))
        .unwrap_or_default()
        .to_string()
}

fn populated_time(ts: Option<DateTime<FixedOffset>>) -> Option<DateTime<FixedOffset>> {
    ts.filter(|ts| *ts != zero_instant())
}

/// `0001-01-01T00:00:00Z`, the unset time producers emit
pub fn zero_instant() -> DateTime<FixedOffset> {
    Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0)
        .single()
        .map(|zero| zero.fixed_offset())
        .unwrap_or_default()
}
