//! Gemini API client: streaming and single-shot generation.

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::config::Config;
use crate::content::Content;

/// Events emitted during a streaming generation call
#[derive(Debug, Clone)]
pub enum LlmEvent {
    /// Text delta from the streaming response
    TextDelta(String),
    /// Stream completed
    StreamComplete,
    /// Error occurred; carries a human-readable description
    Error(String),
}

/// Fixed per-request generation settings
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
}

/// Request body for the Gemini `generateContent` family of endpoints
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    system_instruction: SystemInstruction,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
struct SystemInstruction {
    parts: Vec<serde_json::Value>,
}

impl GenerateRequest {
    fn new(contents: Vec<Content>, system_instruction: &str, temperature: f32) -> Self {
        Self {
            contents,
            system_instruction: SystemInstruction {
                parts: vec![serde_json::json!({ "text": system_instruction })],
            },
            generation_config: GenerationConfig { temperature },
        }
    }
}

/// Seam between the analysis layers and the hosted model, so tests can
/// inject a scripted provider instead of the real API.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Stream a generation; events arrive in provider order and the
    /// channel closes after `StreamComplete` or `Error`.
    async fn stream_generate(
        &self,
        contents: Vec<Content>,
        system_instruction: &str,
        temperature: f32,
    ) -> Result<mpsc::Receiver<LlmEvent>>;

    /// Single-shot generation returning the full reply text.
    async fn generate(
        &self,
        contents: Vec<Content>,
        system_instruction: &str,
        temperature: f32,
    ) -> Result<String>;
}

/// Gemini client owned by the service layer; constructed explicitly so
/// its lifecycle and configuration are visible at the call site.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            anyhow::anyhow!("No API key configured. Set GEMINI_API_KEY or add one to config.toml.")
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn endpoint(&self, method: &str, query: &str) -> String {
        format!(
            "{}/models/{}:{}?{}key={}",
            self.base_url, self.model, method, query, self.api_key
        )
    }

    /// Read an SSE response body, forwarding one `TextDelta` per decoded
    /// frame. Frames are `data: {json}` lines; partial lines are buffered
    /// across network chunks.
    async fn process_sse_stream(
        response: reqwest::Response,
        tx: mpsc::Sender<LlmEvent>,
    ) -> Result<()> {
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline_pos) = buffer.find('\n') {
                let line = buffer[..newline_pos].trim().to_string();
                buffer = buffer[newline_pos + 1..].to_string();

                if let Some(text) = parse_sse_line(&line) {
                    let _ = tx.send(LlmEvent::TextDelta(text)).await;
                }
            }
        }

        // Flush a final frame that arrived without a trailing newline
        if let Some(text) = parse_sse_line(buffer.trim()) {
            let _ = tx.send(LlmEvent::TextDelta(text)).await;
        }

        let _ = tx.send(LlmEvent::StreamComplete).await;
        Ok(())
    }
}

/// Decode one SSE line into its text fragment, if it carries one.
fn parse_sse_line(line: &str) -> Option<String> {
    let data = line.strip_prefix("data: ")?;
    if data == "[DONE]" {
        return None;
    }

    let frame: serde_json::Value = serde_json::from_str(data).ok()?;
    candidate_text(&frame)
}

/// Concatenated text of the first candidate's parts, if any.
fn candidate_text(body: &serde_json::Value) -> Option<String> {
    let parts = body
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() { None } else { Some(text) }
}

#[async_trait]
impl AnalysisProvider for GeminiClient {
    async fn stream_generate(
        &self,
        contents: Vec<Content>,
        system_instruction: &str,
        temperature: f32,
    ) -> Result<mpsc::Receiver<LlmEvent>> {
        let (tx, rx) = mpsc::channel(1000);

        let url = self.endpoint("streamGenerateContent", "alt=sse&");
        let payload = GenerateRequest::new(contents, system_instruction, temperature);
        let client = self.client.clone();

        let tx_err = tx.clone();
        tokio::spawn(async move {
            let result: Result<()> = async {
                let response = client.post(&url).json(&payload).send().await?;

                if !response.status().is_success() {
                    let status = response.status();
                    let error_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("Gemini API error ({}): {}", status, error_text);
                }

                Self::process_sse_stream(response, tx).await
            }
            .await;

            if let Err(e) = result {
                log::error!("streaming generation failed: {e:#}");
                let _ = tx_err.send(LlmEvent::Error(e.to_string())).await;
            }
        });

        Ok(rx)
    }

    async fn generate(
        &self,
        contents: Vec<Content>,
        system_instruction: &str,
        temperature: f32,
    ) -> Result<String> {
        let url = self.endpoint("generateContent", "");
        let payload = GenerateRequest::new(contents, system_instruction, temperature);

        let response = self.client.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error ({}): {}", status, error_text);
        }

        let body: serde_json::Value = response.json().await?;
        candidate_text(&body)
            .ok_or_else(|| anyhow::anyhow!("Gemini response contained no text candidates"))
    }
}

/// Scripted provider for tests: emits a fixed chunk sequence, or a
/// terminal error, without touching the network.
#[cfg(test)]
pub struct MockProvider {
    chunks: Vec<String>,
    fail: bool,
    requests: std::sync::Mutex<Vec<Vec<Content>>>,
}

#[cfg(test)]
impl MockProvider {
    pub fn with_chunks(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|s| s.to_string()).collect(),
            fail: false,
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            chunks: Vec::new(),
            fail: true,
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Contents of every request this provider has received.
    pub fn requests(&self) -> Vec<Vec<Content>> {
        self.requests.lock().expect("lock").clone()
    }
}

#[cfg(test)]
#[async_trait]
impl AnalysisProvider for MockProvider {
    async fn stream_generate(
        &self,
        contents: Vec<Content>,
        _system_instruction: &str,
        _temperature: f32,
    ) -> Result<mpsc::Receiver<LlmEvent>> {
        self.requests.lock().expect("lock").push(contents);
        let (tx, rx) = mpsc::channel(1000);
        let chunks = self.chunks.clone();
        let fail = self.fail;

        tokio::spawn(async move {
            if fail {
                let _ = tx.send(LlmEvent::Error("scripted failure".to_string())).await;
                return;
            }
            for chunk in chunks {
                let _ = tx.send(LlmEvent::TextDelta(chunk)).await;
            }
            let _ = tx.send(LlmEvent::StreamComplete).await;
        });

        Ok(rx)
    }

    async fn generate(
        &self,
        _contents: Vec<Content>,
        _system_instruction: &str,
        _temperature: f32,
    ) -> Result<String> {
        if self.fail {
            anyhow::bail!("scripted failure");
        }
        Ok(self.chunks.concat())
    }
}
