//! Conversation controller: owns the live message list and drives one
//! streamed identification turn at a time.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::analysis::AnalysisService;
use crate::content::ImagePayload;
use crate::message::Message;

/// Largest accepted image, measured in decoded bytes.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Synchronous rejections from `submit`, surfaced before any state changes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("a reply is already streaming; wait for it to finish")]
    Busy,
    #[error("image is too large ({size} bytes, limit {MAX_IMAGE_BYTES})")]
    ImageTooLarge { size: usize },
}

/// Conversation phase; re-entrant submits are rejected while Submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Submitting,
}

/// The reply currently streaming into its placeholder message.
struct ActiveStream {
    rx: mpsc::UnboundedReceiver<String>,
    placeholder_id: String,
    buffer: String,
}

/// Owns the ordered message list and the busy phase for one conversation.
///
/// `submit` appends the user turn plus an empty streaming placeholder and
/// starts the provider round-trip; chunks are then folded into the
/// placeholder either from a UI frame loop (`pump`) or by awaiting the
/// whole reply (`run_to_completion`). Both paths share the same apply and
/// finish steps, so the final text is always the in-order concatenation
/// of the applied chunks.
pub struct ChatController {
    service: AnalysisService,
    messages: Vec<Message>,
    phase: Phase,
    stream: Option<ActiveStream>,
}

impl ChatController {
    pub fn new(service: AnalysisService) -> Self {
        Self {
            service,
            messages: Vec::new(),
            phase: Phase::Idle,
            stream: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Submitting
    }

    /// Submit a new user turn and start streaming the reply.
    ///
    /// Validation happens before any message is appended, so a rejected
    /// submit leaves the conversation untouched. The history sent to the
    /// service is the list *before* this turn; the new text and image go
    /// as the final turn of the request instead.
    pub async fn submit(
        &mut self,
        text: &str,
        image: Option<String>,
    ) -> Result<(), SubmitError> {
        if self.phase == Phase::Submitting {
            return Err(SubmitError::Busy);
        }
        if let Some(image) = &image {
            let size = decoded_image_size(image);
            if size > MAX_IMAGE_BYTES {
                return Err(SubmitError::ImageTooLarge { size });
            }
        }

        let history: Vec<Message> = self.messages.clone();
        self.phase = Phase::Submitting;

        self.messages.push(Message::user(text, image.clone()));

        let placeholder = Message::streaming_placeholder();
        let placeholder_id = placeholder.id.clone();
        self.messages.push(placeholder);

        let rx = self
            .service
            .stream_species_analysis(&history, text, image.as_deref())
            .await;

        self.stream = Some(ActiveStream {
            rx,
            placeholder_id,
            buffer: String::new(),
        });

        Ok(())
    }

    /// Drain whatever chunks have already arrived; called once per UI
    /// frame. Never blocks. Finalizes the placeholder when the stream has
    /// ended.
    pub fn pump(&mut self) {
        loop {
            let received = match self.stream.as_mut() {
                Some(active) => active.rx.try_recv(),
                None => return,
            };

            match received {
                Ok(chunk) => self.apply_chunk(&chunk),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.finish_stream();
                    return;
                }
            }
        }
    }

    /// Await and apply the next chunk. Returns `false` once the stream has
    /// ended and the placeholder is finalized.
    pub async fn step(&mut self) -> bool {
        let received = match self.stream.as_mut() {
            Some(active) => active.rx.recv().await,
            None => return false,
        };

        match received {
            Some(chunk) => {
                self.apply_chunk(&chunk);
                true
            }
            None => {
                self.finish_stream();
                false
            }
        }
    }

    /// Consume the active stream to its end.
    pub async fn run_to_completion(&mut self) {
        while self.step().await {}
    }

    /// Fold one chunk into the running buffer and replace the placeholder
    /// text wholesale, keeping each update idempotent and observable.
    fn apply_chunk(&mut self, chunk: &str) {
        let Self {
            messages, stream, ..
        } = self;
        if let Some(active) = stream.as_mut() {
            active.buffer.push_str(chunk);
            if let Some(msg) = messages.iter_mut().find(|m| m.id == active.placeholder_id) {
                msg.text = active.buffer.clone();
            }
        }
    }

    /// Drop all messages and any active stream; the conversation starts
    /// over from scratch.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.stream = None;
        self.phase = Phase::Idle;
    }

    /// Mark the placeholder final and return to Idle. Runs on every exit
    /// from a streaming turn, success or internal failure alike.
    fn finish_stream(&mut self) {
        if let Some(active) = self.stream.take() {
            if let Some(msg) = self
                .messages
                .iter_mut()
                .find(|m| m.id == active.placeholder_id)
            {
                msg.is_streaming = Some(false);
            }
        }
        self.phase = Phase::Idle;
    }
}

/// Decoded size of an inline image, estimated from its base64 payload.
fn decoded_image_size(image: &str) -> usize {
    ImagePayload::parse(image).data().len() / 4 * 3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockProvider;
    use crate::message::Role;
    use crate::prompts::STREAM_APOLOGY;
    use std::sync::Arc;

    fn controller_with(provider: Arc<MockProvider>) -> ChatController {
        ChatController::new(AnalysisService::new(provider))
    }

    #[tokio::test]
    async fn test_placeholder_progression_and_finalization() {
        let provider = Arc::new(MockProvider::with_chunks(&["**赤", "狐**", "..."]));
        let mut controller = controller_with(provider);

        controller
            .submit("identify", Some("data:image/jpeg;base64,/9j/4AAQ".to_string()))
            .await
            .expect("submit");

        assert!(controller.is_loading());
        assert_eq!(controller.messages().len(), 2);
        assert_eq!(controller.messages()[0].role, Role::User);
        assert!(controller.messages()[1].is_streaming());

        let expected = ["**赤", "**赤狐**", "**赤狐**..."];
        for text in expected {
            assert!(controller.step().await);
            assert_eq!(controller.messages()[1].text, text);
        }

        assert!(!controller.step().await);
        assert!(!controller.messages()[1].is_streaming());
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn test_chunk_concatenation_equals_final_text() {
        let chunks = ["An ", "Atlantic ", "puffin", ", *Fratercula arctica*."];
        let provider = Arc::new(MockProvider::with_chunks(&chunks));
        let mut controller = controller_with(provider);

        controller.submit("what bird?", None).await.expect("submit");
        controller.run_to_completion().await;

        assert_eq!(controller.messages()[1].text, chunks.concat());
    }

    #[tokio::test]
    async fn test_reentrant_submit_rejected_while_busy() {
        let provider = Arc::new(MockProvider::with_chunks(&["reply"]));
        let mut controller = controller_with(provider);

        controller.submit("first", None).await.expect("submit");
        let second = controller.submit("second", None).await;

        assert_eq!(second, Err(SubmitError::Busy));
        // The rejected call must not have appended a second placeholder
        assert_eq!(controller.messages().len(), 2);

        controller.run_to_completion().await;
        assert!(!controller.is_loading());
        assert_eq!(controller.messages()[1].text, "reply");
    }

    #[tokio::test]
    async fn test_oversized_image_rejected_without_state_change() {
        let provider = Arc::new(MockProvider::with_chunks(&["unused"]));
        let mut controller = controller_with(provider);

        // ~7.5 MiB decoded, over the 5 MiB limit
        let image = format!("data:image/jpeg;base64,{}", "A".repeat(10 * 1024 * 1024));
        let result = controller.submit("too big", Some(image)).await;

        assert!(matches!(result, Err(SubmitError::ImageTooLarge { .. })));
        assert!(controller.messages().is_empty());
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn test_internal_failure_ends_with_apology() {
        let provider = Arc::new(MockProvider::failing());
        let mut controller = controller_with(provider);

        controller.submit("identify", None).await.expect("submit");
        controller.run_to_completion().await;

        assert_eq!(controller.messages()[1].text, STREAM_APOLOGY);
        assert!(!controller.messages()[1].is_streaming());
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn test_history_passed_is_pre_submission() {
        let provider = Arc::new(MockProvider::with_chunks(&["**赤狐**"]));
        let mut controller = controller_with(Arc::clone(&provider));

        controller.submit("first", None).await.expect("submit");
        controller.run_to_completion().await;
        controller.submit("second", None).await.expect("submit");
        controller.run_to_completion().await;

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        // First request: no history, just the new turn
        assert_eq!(requests[0].len(), 1);
        // Second request: prior user turn + model reply as history, then
        // the new turn appended last
        assert_eq!(requests[1].len(), 3);
        assert_eq!(requests[1][0].role, "user");
        assert_eq!(requests[1][1].role, "model");
        assert_eq!(requests[1][2].role, "user");
    }

    #[tokio::test]
    async fn test_pump_drains_without_blocking() {
        let provider = Arc::new(MockProvider::with_chunks(&["a", "b", "c"]));
        let mut controller = controller_with(provider);

        controller.submit("id", None).await.expect("submit");

        // Give the forwarding task a moment to run, then drain
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        controller.pump();

        assert_eq!(controller.messages()[1].text, "abc");
        assert!(!controller.is_loading());
    }
}
