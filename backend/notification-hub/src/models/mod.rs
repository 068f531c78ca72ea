use chrono::{DateTime, FixedOffset, SecondsFormat};
use opentelemetry_config::KafkaHeaders;
use serde::{Deserialize, Serialize, Serializer};

/// A message read from the event log, detached from the client that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub topic: String,
    pub key: String,
    pub value: Vec<u8>,
    /// Headers in wire order; keys may repeat
    pub headers: KafkaHeaders,
    pub partition: i32,
    pub offset: i64,
}

/// `chat.message_posted` as written by either producer generation
///
/// The current writer fills the canonical group; the older writer fills the
/// legacy group. Any field may be missing or `null`. Timestamps keep the
/// producer's UTC offset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MessagePostedEvent {
    // Canonical
    pub message_id: Option<String>,
    pub content: Option<String>,
    pub author_id: Option<String>,
    pub timestamp: Option<DateTime<FixedOffset>>,

    // Legacy
    pub sender: Option<String>,
    pub text: Option<String>,
    pub ts: Option<DateTime<FixedOffset>>,
}

/// Wire shape pushed to every subscriber, one text frame each
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: String,
    pub msg: String,
    pub sender: String,
    /// Zero instant when the event carried no timestamp
    #[serde(serialize_with = "serialize_rfc3339")]
    pub ts: DateTime<FixedOffset>,
}

impl Notification {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// RFC 3339, `Z` for UTC, fractional seconds only when present
fn serialize_rfc3339<S>(ts: &DateTime<FixedOffset>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(rfc3339: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap()
    }

    fn notification(ts: &str) -> Notification {
        Notification {
            id: "m1".to_string(),
            msg: "hi".to_string(),
            sender: "bob".to_string(),
            ts: at(ts),
        }
    }

    #[test]
    fn test_notification_wire_format() {
        assert_eq!(
            notification("2024-01-01T00:00:00Z").to_json().unwrap(),
            r#"{"id":"m1","msg":"hi","sender":"bob","ts":"2024-01-01T00:00:00Z"}"#
        );
    }

    #[test]
    fn test_notification_keeps_subsecond_precision() {
        let value: serde_json::Value =
            serde_json::from_str(&notification("2024-05-06T07:08:09.12Z").to_json().unwrap())
                .unwrap();
        assert_eq!(value["ts"], json!("2024-05-06T07:08:09.120Z"));
    }

    #[test]
    fn test_zero_instant_serializes_as_timestamp() {
        let value: serde_json::Value =
            serde_json::from_str(&notification("0001-01-01T00:00:00Z").to_json().unwrap())
                .unwrap();
        assert_eq!(value["ts"], json!("0001-01-01T00:00:00Z"));
    }

    #[test]
    fn test_producer_offset_is_kept_on_the_wire() {
        let value: serde_json::Value =
            serde_json::from_str(&notification("2024-01-01T03:00:00+03:00").to_json().unwrap())
                .unwrap();
        assert_eq!(value["ts"], json!("2024-01-01T03:00:00+03:00"));
    }

    #[test]
    fn test_event_accepts_nulls_and_unknown_fields() {
        let event: MessagePostedEvent = serde_json::from_value(json!({
            "message_id": null,
            "sender": "alice",
            "room": "general"
        }))
        .unwrap();

        assert_eq!(event.message_id, None);
        assert_eq!(event.timestamp, None);
        assert_eq!(event.sender.as_deref(), Some("alice"));
    }

    #[test]
    fn test_event_timestamp_keeps_offset() {
        let event: MessagePostedEvent = serde_json::from_value(json!({
            "timestamp": "2024-01-01T03:00:00+03:00"
        }))
        .unwrap();

        let ts = event.timestamp.unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 3 * 3600);
        assert_eq!(ts, at("2024-01-01T00:00:00Z"));
    }
}
