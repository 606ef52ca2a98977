//! Poe bot-platform adapter: converts the platform's turn list into one
//! non-streaming identification call.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::content;
use crate::llm::AnalysisProvider;
use crate::prompts::{BOT_APOLOGY, BOT_ASK_PHOTO, SYSTEM_INSTRUCTION, TEMPERATURE};

/// Incoming Poe request: an ordered turn list where the latest turn may
/// carry attachment references.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoeRequest {
    #[serde(default)]
    pub messages: Vec<PoeMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoeMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<PoeAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoeAttachment {
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Fixed-shape Poe response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoeResponse {
    pub bot_response: BotResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotResponse {
    pub response_type: String,
    pub text: String,
}

impl PoeResponse {
    fn text(text: impl Into<String>) -> Self {
        Self {
            bot_response: BotResponse {
                response_type: "text".to_string(),
                text: text.into(),
            },
        }
    }
}

/// Handles one Poe request against the shared provider.
pub struct BotAdapter {
    provider: Arc<dyn AnalysisProvider>,
    http: reqwest::Client,
}

impl BotAdapter {
    pub fn new(provider: Arc<dyn AnalysisProvider>) -> Self {
        Self {
            provider,
            http: reqwest::Client::new(),
        }
    }

    /// Answer one request. Never fails: any internal error maps to the
    /// static apology so the platform caller only ever sees a well-formed
    /// text response.
    pub async fn handle(&self, request: &PoeRequest) -> PoeResponse {
        let Some(last) = request.messages.last() else {
            return PoeResponse::text(BOT_ASK_PHOTO);
        };

        let Some(attachment) = last.attachments.first() else {
            return PoeResponse::text(BOT_ASK_PHOTO);
        };

        match self.identify(attachment, &last.content).await {
            Ok(reply) => PoeResponse::text(reply),
            Err(e) => {
                log::error!("bot identification failed: {e:#}");
                PoeResponse::text(BOT_APOLOGY)
            }
        }
    }

    /// Download the attached photo, inline it as base64, and run a single
    /// identification turn. Shares the streaming path's system instruction
    /// and temperature so both surfaces answer identically.
    async fn identify(&self, attachment: &PoeAttachment, text: &str) -> anyhow::Result<String> {
        let response = self.http.get(&attachment.url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("attachment fetch failed with status {}", response.status());
        }

        let mime = attachment
            .content_type
            .clone()
            .or_else(|| {
                response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.to_string())
            })
            .unwrap_or_else(|| "image/jpeg".to_string());

        let bytes = response.bytes().await?;
        let image = format!("data:{};base64,{}", mime, BASE64.encode(&bytes));

        let prompt = if text.trim().is_empty() {
            "請辨識這張照片中的物種。"
        } else {
            text
        };

        let contents = content::build_contents(&[], prompt, Some(&image));
        self.provider
            .generate(contents, SYSTEM_INSTRUCTION, TEMPERATURE)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockProvider;

    #[tokio::test]
    async fn test_empty_request_asks_for_photo() {
        let adapter = BotAdapter::new(Arc::new(MockProvider::with_chunks(&["unused"])));
        let response = adapter.handle(&PoeRequest::default()).await;
        assert_eq!(response.bot_response.text, BOT_ASK_PHOTO);
    }

    #[tokio::test]
    async fn test_text_only_turn_asks_for_photo() {
        let adapter = BotAdapter::new(Arc::new(MockProvider::with_chunks(&["unused"])));
        let request = PoeRequest {
            messages: vec![PoeMessage {
                content: "這是什麼?".to_string(),
                attachments: Vec::new(),
            }],
        };

        let response = adapter.handle(&request).await;
        assert_eq!(response.bot_response.text, BOT_ASK_PHOTO);
        assert_eq!(response.bot_response.response_type, "text");
    }

    #[tokio::test]
    async fn test_internal_failure_maps_to_apology() {
        let adapter = BotAdapter::new(Arc::new(MockProvider::with_chunks(&["unused"])));
        let request = PoeRequest {
            messages: vec![PoeMessage {
                content: String::new(),
                // Nothing listens here, so the fetch fails immediately
                attachments: vec![PoeAttachment {
                    url: "http://127.0.0.1:1/x.jpg".to_string(),
                    content_type: None,
                }],
            }],
        };

        let response = adapter.handle(&request).await;
        assert_eq!(response.bot_response.text, BOT_APOLOGY);
    }

    #[test]
    fn test_request_parses_platform_schema() {
        let json = r#"{
            "messages": [
                {"content": "hi", "attachments": []},
                {"content": "id this", "attachments": [{"url": "https://p.example/x.jpg", "content_type": "image/jpeg"}]}
            ]
        }"#;
        let request: PoeRequest = serde_json::from_str(json).expect("parse");

        assert_eq!(request.messages.len(), 2);
        let last = request.messages.last().expect("last");
        assert_eq!(last.attachments[0].url, "https://p.example/x.jpg");
    }

    #[test]
    fn test_response_shape_is_fixed() {
        let response = PoeResponse::text("**赤狐**");
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["bot_response"]["response_type"], "text");
        assert_eq!(json["bot_response"]["text"], "**赤狐**");
    }
}
