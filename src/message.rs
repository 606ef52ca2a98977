use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking for an identification
    User,
    /// The Gemini model's reply
    Model,
}

/// A single turn of conversation.
///
/// Messages are append-only within a conversation; the only in-place
/// mutations are growing `text` while a reply streams in and flipping
/// `is_streaming` off when the stream ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    /// Inline image as a data URL (`data:<mime>;base64,<payload>`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    /// Set on the most recently appended model message while its reply
    /// is still arriving
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_streaming: Option<bool>,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl Message {
    /// Create a user message carrying the submitted text and optional image.
    pub fn user(text: impl Into<String>, image_data: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            text: text.into(),
            image_data,
            is_streaming: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Create the empty placeholder a streamed reply accumulates into.
    pub fn streaming_placeholder() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Model,
            text: String::new(),
            image_data: None,
            is_streaming: Some(true),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_unique_for_rapid_creation() {
        let a = Message::user("one", None);
        let b = Message::user("two", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_serde_round_trip_preserves_fields() {
        let msg = Message::user("what is this?", Some("data:image/png;base64,AAAA".to_string()));
        let json = serde_json::to_string(&msg).expect("serialize");
        let back: Message = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(back.id, msg.id);
        assert_eq!(back.role, Role::User);
        assert_eq!(back.text, msg.text);
        assert_eq!(back.image_data, msg.image_data);
        assert_eq!(back.is_streaming, None);
        assert_eq!(back.timestamp, msg.timestamp);
    }

    #[test]
    fn test_absent_optionals_stay_absent() {
        let msg = Message::user("text only", None);
        let json = serde_json::to_string(&msg).expect("serialize");
        assert!(!json.contains("image_data"));
        assert!(!json.contains("is_streaming"));
    }

    #[test]
    fn test_placeholder_starts_empty_and_streaming() {
        let msg = Message::streaming_placeholder();
        assert_eq!(msg.role, Role::Model);
        assert!(msg.text.is_empty());
        assert!(msg.is_streaming());
    }
}
