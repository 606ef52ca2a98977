//! Streaming species analysis: one request round-trip per invocation.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::content;
use crate::llm::{AnalysisProvider, LlmEvent};
use crate::message::Message;
use crate::prompts::{STREAM_APOLOGY, SYSTEM_INSTRUCTION, TEMPERATURE};

/// Builds the full multimodal request from history plus the new turn,
/// invokes the provider's streaming call, and exposes the reply as an
/// ordered sequence of text chunks.
///
/// Failures never propagate out of the chunk stream: the caller sees the
/// apology text as a final chunk and then a clean end. The underlying
/// error stays observable through the provider's `LlmEvent::Error` and
/// the log.
#[derive(Clone)]
pub struct AnalysisService {
    provider: Arc<dyn AnalysisProvider>,
}

impl AnalysisService {
    pub fn new(provider: Arc<dyn AnalysisProvider>) -> Self {
        Self { provider }
    }

    /// Start one streaming identification round-trip.
    ///
    /// `history` is the conversation *before* the new input; the new text
    /// and optional inline image become the final turn of the request
    /// (image part ahead of the text part). Chunks arrive in provider
    /// order; concatenating them yields the full reply.
    pub async fn stream_species_analysis(
        &self,
        history: &[Message],
        new_text: &str,
        new_image: Option<&str>,
    ) -> mpsc::UnboundedReceiver<String> {
        let contents = content::build_contents(history, new_text, new_image);
        let (tx, rx) = mpsc::unbounded_channel();

        let stream = self
            .provider
            .stream_generate(contents, SYSTEM_INSTRUCTION, TEMPERATURE)
            .await;

        let mut event_rx = match stream {
            Ok(event_rx) => event_rx,
            Err(e) => {
                log::error!("failed to start analysis stream: {e:#}");
                let _ = tx.send(STREAM_APOLOGY.to_string());
                return rx;
            }
        };

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match event {
                    LlmEvent::TextDelta(chunk) => {
                        if tx.send(chunk).is_err() {
                            break;
                        }
                    }
                    LlmEvent::StreamComplete => break,
                    LlmEvent::Error(error) => {
                        log::error!("analysis stream failed: {error}");
                        let _ = tx.send(STREAM_APOLOGY.to_string());
                        break;
                    }
                }
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockProvider;

    async fn collect(mut rx: mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn test_chunks_arrive_in_order() {
        let service = AnalysisService::new(Arc::new(MockProvider::with_chunks(&[
            "**赤", "狐**", "...",
        ])));

        let rx = service.stream_species_analysis(&[], "identify", None).await;
        assert_eq!(collect(rx).await, vec!["**赤", "狐**", "..."]);
    }

    #[tokio::test]
    async fn test_failure_becomes_apology_chunk() {
        let service = AnalysisService::new(Arc::new(MockProvider::failing()));

        let rx = service.stream_species_analysis(&[], "identify", None).await;
        let chunks = collect(rx).await;
        assert_eq!(chunks, vec![STREAM_APOLOGY.to_string()]);
    }

    #[tokio::test]
    async fn test_restart_yields_fresh_stream() {
        let service = AnalysisService::new(Arc::new(MockProvider::with_chunks(&["again"])));

        let first = collect(service.stream_species_analysis(&[], "id", None).await).await;
        let second = collect(service.stream_species_analysis(&[], "id", None).await).await;
        assert_eq!(first, second);
    }
}
