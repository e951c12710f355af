//! Fixed-response double for tests and the `soul-cli` demo runner.
//! Mirrors `loom::llm::MockLlm`'s "queue of canned responses" shape.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::message::Message;
use crate::wire::WireSoulSide;

use super::{ChatProvider, ChatProviderError, ChatRequest, ChatResponse, ChatUsage};

/// Replays a fixed queue of responses, one per `step` call. Panics (via
/// `expect`) if exhausted — tests should provide exactly as many responses
/// as steps they expect to run.
pub struct MockChatProvider {
    responses: Mutex<std::collections::VecDeque<ChatResponse>>,
    image_in: bool,
    thinking: bool,
}

impl MockChatProvider {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        MockChatProvider {
            responses: Mutex::new(responses.into_iter().collect()),
            image_in: false,
            thinking: false,
        }
    }

    /// A provider that always answers with plain text and no tool calls.
    pub fn fixed_text(text: impl Into<String>) -> Self {
        Self::new(vec![ChatResponse {
            message: Message::assistant(vec![crate::message::ContentPart::text(text)]),
            usage: ChatUsage::default(),
        }])
    }

    pub fn with_capabilities(mut self, image_in: bool, thinking: bool) -> Self {
        self.image_in = image_in;
        self.thinking = thinking;
        self
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    fn image_in(&self) -> bool {
        self.image_in
    }
    fn thinking(&self) -> bool {
        self.thinking
    }

    async fn step(
        &self,
        _request: ChatRequest,
        _wire: &WireSoulSide,
    ) -> Result<ChatResponse, ChatProviderError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ChatProviderError::Other("MockChatProvider exhausted".into()))
    }
}
