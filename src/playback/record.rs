//! Message records: The units rendered by the chat view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Who a message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    #[default]
    Assistant,
}

impl Role {
    /// Parse an authored role. Anything but `"user"` is the assistant.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("user") {
            Self::User
        } else {
            Self::Assistant
        }
    }
}

/// Kind of a step or message record.
///
/// Kinds the interpreter treats specially have their own variant; every other
/// authored kind is carried through as an opaque `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    Text,
    Table,
    Chart,
    Skeleton,
    Thinking,
    FeaturePreview,
    Other(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Table => "table",
            Self::Chart => "chart",
            Self::Skeleton => "skeleton",
            Self::Thinking => "thinking",
            Self::FeaturePreview => "feature_preview",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for MessageKind {
    fn from(s: &str) -> Self {
        match s {
            "text" => Self::Text,
            "table" => Self::Table,
            "chart" => Self::Chart,
            "skeleton" => Self::Skeleton,
            "thinking" => Self::Thinking,
            "feature_preview" => Self::FeaturePreview,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for MessageKind {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in the message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub role: Role,
    pub kind: MessageKind,
    /// Text for `text` records, structured payload for everything else.
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Set when this record replaced a skeleton placeholder.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub revealed: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn new(role: Role, kind: MessageKind, content: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            kind,
            content,
            metadata: Map::new(),
            revealed: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn revealed(mut self) -> Self {
        self.revealed = true;
        self
    }

    /// Text content, or `""` for non-text payloads.
    pub fn text(&self) -> &str {
        self.content.as_str().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrips_known_and_unknown_names() {
        for name in ["text", "table", "chart", "skeleton", "thinking", "feature_preview"] {
            let kind = MessageKind::from(name);
            assert!(!matches!(kind, MessageKind::Other(_)), "{name} should be known");
            assert_eq!(kind.as_str(), name);
        }
        let other = MessageKind::from("community_card");
        assert_eq!(other, MessageKind::Other("community_card".into()));
        assert_eq!(other.to_string(), "community_card");
    }

    #[test]
    fn kind_serializes_as_plain_string() {
        let json = serde_json::to_string(&MessageKind::FeaturePreview).unwrap();
        assert_eq!(json, "\"feature_preview\"");
        let parsed: MessageKind = serde_json::from_str("\"bento_grid\"").unwrap();
        assert_eq!(parsed, MessageKind::Other("bento_grid".into()));
    }

    #[test]
    fn role_parse_defaults_to_assistant() {
        assert_eq!(Role::parse("user"), Role::User);
        assert_eq!(Role::parse("USER"), Role::User);
        assert_eq!(Role::parse("assistant"), Role::Assistant);
        assert_eq!(Role::parse("narrator"), Role::Assistant);
    }

    #[test]
    fn revealed_flag_omitted_until_set() {
        let record = MessageRecord::new(Role::Assistant, MessageKind::Table, serde_json::json!([]));
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("revealed").is_none());

        let json = serde_json::to_value(record.revealed()).unwrap();
        assert_eq!(json["revealed"], true);
    }
}
