//! ChatProvider: the consumed LLM interface (spec §6).
//!
//! Grounded on `loom::llm::LlmClient` (`examples/hi-youichi-loom/loom/src/llm/mod.rs`):
//! a single async trait method plus capability flags, a `MockLlm`-style
//! fixed-response double for tests, and a real provider gated behind a
//! Cargo feature so the core never forces an HTTP client on callers that
//! don't need one.

mod mock;
#[cfg(feature = "openai")]
mod openai;

pub use mock::MockChatProvider;
#[cfg(feature = "openai")]
pub use openai::ChatOpenAiProvider;

use async_trait::async_trait;
use thiserror::Error;

use crate::message::{Message, ToolCall};
use crate::tools::ToolSpec;
use crate::wire::WireSoulSide;

/// Everything the provider needs for one model call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub tool_schemas: Vec<ToolSpec>,
    pub history: Vec<Message>,
    pub thinking_effort: bool,
    /// Session id, passed through for server-side prompt-cache reuse.
    pub prompt_cache_key: Option<String>,
}

/// Token usage for one call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// The provider's final answer for one `step`.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: Message,
    pub usage: ChatUsage,
}

impl ChatResponse {
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.message.tool_calls()
    }
}

/// Errors a provider call can raise. `is_retryable` drives the Soul's
/// backoff policy (spec §4.1 "Retry policy").
#[derive(Debug, Error)]
pub enum ChatProviderError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("request timed out")]
    Timeout,
    #[error("provider returned an empty response")]
    EmptyResponse,
    #[error("provider returned HTTP {status}")]
    Http { status: u16 },
    #[error("provider error: {0}")]
    Other(String),
}

impl ChatProviderError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatProviderError::Connection(_) => true,
            ChatProviderError::Timeout => true,
            ChatProviderError::EmptyResponse => true,
            ChatProviderError::Http { status } => {
                matches!(status, 429 | 500 | 502 | 503)
            }
            ChatProviderError::Other(_) => false,
        }
    }
}

/// A bound LLM. Streams content as it arrives onto `wire`, then returns the
/// assembled final response.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// True if the model accepts `ImageUrl` content parts.
    fn image_in(&self) -> bool {
        false
    }
    /// True if the model accepts a `thinking_effort` request.
    fn thinking(&self) -> bool {
        false
    }

    async fn step(
        &self,
        request: ChatRequest,
        wire: &WireSoulSide,
    ) -> Result<ChatResponse, ChatProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_http_statuses_match_spec_list() {
        for status in [429, 500, 502, 503] {
            assert!(ChatProviderError::Http { status }.is_retryable());
        }
        assert!(!ChatProviderError::Http { status: 404 }.is_retryable());
    }

    #[test]
    fn connection_timeout_and_empty_response_are_retryable() {
        assert!(ChatProviderError::Connection("refused".into()).is_retryable());
        assert!(ChatProviderError::Timeout.is_retryable());
        assert!(ChatProviderError::EmptyResponse.is_retryable());
    }

    #[test]
    fn other_errors_are_not_retryable() {
        assert!(!ChatProviderError::Other("malformed".into()).is_retryable());
    }
}
