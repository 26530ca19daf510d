use serde::{Deserialize, Serialize};

/// Media kind of a recurring broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Photo,
    Video,
}

/// One `label -> url` inline button attached to a broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlButton {
    pub label: String,
    pub url: String,
}

/// One scheduled recurring promotional message.
///
/// The serde field names are the persisted wire contract; do not rename them
/// without a migration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BroadcastSpec {
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ref: Option<String>,
    #[serde(default)]
    pub buttons: Vec<UrlButton>,
    pub interval_seconds: i64,
    #[serde(default)]
    pub last_sent: i64,
}

impl BroadcastSpec {
    /// Due once the elapsed time since `last_sent` meets or exceeds the interval.
    pub fn is_due(&self, now: i64) -> bool {
        now - self.last_sent >= self.interval_seconds
    }
}

fn default_true() -> bool {
    true
}

/// Persisted per-chat moderation + broadcast settings (`_id` = chat id).
///
/// Created lazily with defaults on the first inbound event from a chat and
/// never deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(rename = "_id")]
    pub chat_id: i64,
    #[serde(default = "default_true")]
    pub anti_link: bool,
    #[serde(default = "default_true")]
    pub anti_mention: bool,
    /// Lowercase-normalized, deduplicated.
    #[serde(default)]
    pub banned_words: Vec<String>,
    /// Insertion order; carries no scheduling significance.
    #[serde(default)]
    pub recurring_broadcasts: Vec<BroadcastSpec>,
}

impl ChatConfig {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            anti_link: true,
            anti_mention: true,
            banned_words: Vec::new(),
            recurring_broadcasts: Vec::new(),
        }
    }
}

/// Unix timestamp in seconds, the clock used for `last_sent` bookkeeping.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_spec(interval: i64, last_sent: i64) -> BroadcastSpec {
        BroadcastSpec {
            kind: ContentKind::Text,
            text: "ad".to_string(),
            file_ref: None,
            buttons: Vec::new(),
            interval_seconds: interval,
            last_sent,
        }
    }

    #[test]
    fn due_at_or_past_the_interval_boundary() {
        let now = 1_000_000;
        assert!(text_spec(60, now - 61).is_due(now));
        assert!(text_spec(60, now - 60).is_due(now));
        assert!(!text_spec(60, now - 59).is_due(now));
    }

    #[test]
    fn never_sent_broadcast_is_due_immediately() {
        assert!(text_spec(3600, 0).is_due(unix_now()));
    }

    #[test]
    fn broadcast_wire_contract_field_names() {
        let spec = BroadcastSpec {
            kind: ContentKind::Photo,
            text: "caption".to_string(),
            file_ref: Some("AgAC123".to_string()),
            buttons: vec![UrlButton {
                label: "Shop".to_string(),
                url: "https://shop.test".to_string(),
            }],
            interval_seconds: 300,
            last_sent: 0,
        };

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "photo");
        assert_eq!(json["text"], "caption");
        assert_eq!(json["file_ref"], "AgAC123");
        assert_eq!(json["buttons"][0]["label"], "Shop");
        assert_eq!(json["interval_seconds"], 300);
        assert_eq!(json["last_sent"], 0);
    }

    #[test]
    fn chat_config_defaults_fill_missing_fields_on_read() {
        let cfg: ChatConfig = serde_json::from_str(r#"{"_id": -100123}"#).unwrap();
        assert_eq!(cfg.chat_id, -100123);
        assert!(cfg.anti_link);
        assert!(cfg.anti_mention);
        assert!(cfg.banned_words.is_empty());
        assert!(cfg.recurring_broadcasts.is_empty());
    }
}
