//! Maps conversation history into the Gemini `contents` request shape.
//!
//! The mapping is rebuilt from the live message list on every request and
//! has no side effects, so mapper changes always see the current shape.

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// One role-tagged turn of the outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

/// One atomic content unit within a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    InlineData(InlineData),
}

/// Inline image bytes with their declared mime type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// Result of parsing a `data:<mime>;base64,<payload>` string.
///
/// Parsing is deliberately best-effort: a malformed prefix never fails,
/// it falls back to treating the whole string as JPEG payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    /// The prefix declared a usable mime type
    Parsed { mime_type: String, data: String },
    /// No recognizable prefix; assume JPEG and take the string verbatim
    Fallback { data: String },
}

const FALLBACK_MIME: &str = "image/jpeg";

impl ImagePayload {
    /// Parse an inline-image payload string.
    ///
    /// The encoded bytes are whatever follows the first comma; when there
    /// is no comma, or nothing follows it, the whole string is the payload.
    /// The mime type comes from the `data:<mime>;` prefix and defaults to
    /// `image/jpeg` when absent or malformed.
    pub fn parse(raw: &str) -> Self {
        let data = match raw.split_once(',') {
            Some((_, payload)) if !payload.is_empty() => payload.to_string(),
            _ => raw.to_string(),
        };

        if let Some(mime_type) = declared_mime(raw) {
            Self::Parsed { mime_type, data }
        } else {
            Self::Fallback { data }
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            Self::Parsed { mime_type, .. } => mime_type,
            Self::Fallback { .. } => FALLBACK_MIME,
        }
    }

    pub fn data(&self) -> &str {
        match self {
            Self::Parsed { data, .. } | Self::Fallback { data } => data,
        }
    }

    /// Convert into the wire-level inline-data part.
    pub fn into_part(self) -> Part {
        Part::InlineData(InlineData {
            mime_type: self.mime_type().to_string(),
            data: match self {
                Self::Parsed { data, .. } | Self::Fallback { data } => data,
            },
        })
    }
}

/// Extract the mime type declared by a `data:<type>/<subtype>...,` prefix.
fn declared_mime(raw: &str) -> Option<String> {
    let rest = raw.strip_prefix("data:")?;
    // The declared type ends at the first ';' (encoding marker) or ','
    let end = rest.find([';', ','])?;
    let mime = &rest[..end];

    // Require a type/subtype pair so garbage like "data:,x" falls back
    let (ty, subtype) = mime.split_once('/')?;
    let valid = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '+'))
    };
    if valid(ty) && valid(subtype) && raw.contains(',') {
        Some(mime.to_string())
    } else {
        None
    }
}

/// Build one request turn from a stored message: image part first (when
/// present), then text (when non-empty). A message with neither produces
/// an empty-parts turn, which Gemini treats as inert.
pub fn map_message(msg: &Message) -> Content {
    let mut parts = Vec::new();

    if let Some(image) = &msg.image_data {
        parts.push(ImagePayload::parse(image).into_part());
    }
    if !msg.text.is_empty() {
        parts.push(Part::Text(msg.text.clone()));
    }

    Content {
        role: match msg.role {
            Role::User => "user".to_string(),
            Role::Model => "model".to_string(),
        },
        parts,
    }
}

/// Map an ordered history into request turns, preserving order.
pub fn map_history(history: &[Message]) -> Vec<Content> {
    history.iter().map(map_message).collect()
}

/// Build the new user turn. The image part, when supplied, precedes the
/// text part: provider convention puts visual context before the
/// instruction referring to it.
pub fn new_user_turn(text: &str, image: Option<&str>) -> Content {
    let mut parts = vec![Part::Text(text.to_string())];

    if let Some(image) = image {
        parts.insert(0, ImagePayload::parse(image).into_part());
    }

    Content {
        role: "user".to_string(),
        parts,
    }
}

/// Full request context: mapped history plus the new turn appended last.
pub fn build_contents(history: &[Message], text: &str, image: Option<&str>) -> Vec<Content> {
    let mut contents = map_history(history);
    contents.push(new_user_turn(text, image));
    contents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn test_parse_data_url() {
        let payload = ImagePayload::parse("data:image/png;base64,AAAA");
        assert_eq!(
            payload,
            ImagePayload::Parsed {
                mime_type: "image/png".to_string(),
                data: "AAAA".to_string()
            }
        );
    }

    #[test]
    fn test_parse_preserves_mime_verbatim() {
        let payload = ImagePayload::parse("data:image/svg+xml;base64,PHN2Zz4=");
        assert_eq!(payload.mime_type(), "image/svg+xml");
        assert_eq!(payload.data(), "PHN2Zz4=");
    }

    #[test]
    fn test_parse_falls_back_on_garbage() {
        let payload = ImagePayload::parse("not-a-data-url");
        assert_eq!(
            payload,
            ImagePayload::Fallback {
                data: "not-a-data-url".to_string()
            }
        );
        assert_eq!(payload.mime_type(), "image/jpeg");
    }

    #[test]
    fn test_parse_trailing_comma_takes_whole_string() {
        // Nothing follows the comma, so the whole string is the payload
        let payload = ImagePayload::parse("data:image/png;base64,");
        assert_eq!(payload.data(), "data:image/png;base64,");
    }

    #[test]
    fn test_parse_comma_without_prefix() {
        let payload = ImagePayload::parse("whatever,QUFB");
        assert_eq!(payload.mime_type(), "image/jpeg");
        assert_eq!(payload.data(), "QUFB");
    }

    #[test]
    fn test_map_message_image_before_text() {
        let msg = Message::user("a fox?", Some("data:image/jpeg;base64,QQ==".to_string()));
        let content = map_message(&msg);

        assert_eq!(content.role, "user");
        assert_eq!(content.parts.len(), 2);
        assert!(matches!(content.parts[0], Part::InlineData(_)));
        assert_eq!(content.parts[1], Part::Text("a fox?".to_string()));
    }

    #[test]
    fn test_map_message_image_only() {
        let msg = Message::user("", Some("data:image/png;base64,AAAA".to_string()));
        let content = map_message(&msg);
        assert_eq!(content.parts.len(), 1);
        assert!(matches!(content.parts[0], Part::InlineData(_)));
    }

    #[test]
    fn test_map_message_empty_turn_permitted() {
        let msg = Message::user("", None);
        assert!(map_message(&msg).parts.is_empty());
    }

    #[test]
    fn test_new_turn_image_precedes_text() {
        let turn = new_user_turn("what is this?", Some("data:image/png;base64,AAAA"));
        assert!(matches!(turn.parts[0], Part::InlineData(_)));
        assert_eq!(turn.parts[1], Part::Text("what is this?".to_string()));
    }

    #[test]
    fn test_empty_history_maps_to_single_text_turn() {
        let contents = build_contents(&[], "What is this?", None);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].role, "user");
        assert_eq!(contents[0].parts, vec![Part::Text("What is this?".to_string())]);
    }

    #[test]
    fn test_mapping_is_idempotent() {
        let history = vec![
            Message::user("look", Some("data:image/png;base64,AAAA".to_string())),
            Message::streaming_placeholder(),
        ];
        assert_eq!(map_history(&history), map_history(&history));
    }

    #[test]
    fn test_wire_serialization_shape() {
        let turn = new_user_turn("id this", Some("data:image/png;base64,AAAA"));
        let json = serde_json::to_value(&turn).expect("serialize");

        assert_eq!(json["role"], "user");
        assert_eq!(json["parts"][0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(json["parts"][0]["inlineData"]["data"], "AAAA");
        assert_eq!(json["parts"][1]["text"], "id this");
    }
}
