//! Compaction Engine: LLM-assisted summarization of a context prefix when
//! the window nears its limit (spec §4.7).
//!
//! `CompactionConfig` is ported/generalized from `loom::compress::config::CompactionConfig`
//! (`examples/hi-youichi-loom/loom/src/compress/config.rs`), renamed to the
//! field vocabulary spec.md uses elsewhere (`max_preserved_messages`,
//! `reserved_tokens`, `max_context_size`).

mod partition;
mod prompt;

pub use partition::partition;

use tracing::{debug, info};

use crate::context::Context;
use crate::llm::{ChatProvider, ChatProviderError, ChatRequest};
use crate::message::Message;
use crate::retry::RetryPolicy;
use crate::wire::{WireEvent, WireSoulSide};

/// Knobs governing when and how compaction runs.
#[derive(Debug, Clone, Copy)]
pub struct CompactionConfig {
    pub max_preserved_messages: usize,
    pub reserved_tokens: u64,
    pub max_context_size: u64,
}

impl CompactionConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        CompactionConfig {
            max_preserved_messages: config.max_preserved_messages_on_compact,
            reserved_tokens: config.reserved_tokens,
            max_context_size: config.max_context_size,
        }
    }

    /// True when the next step would exceed the context budget (spec §4.7 "Trigger").
    pub fn should_compact(&self, token_count: u64) -> bool {
        token_count + self.reserved_tokens >= self.max_context_size
    }
}

/// System prompt used for the summarization call. Kept separate from the
/// agent's own system prompt so compaction is not influenced by
/// task-specific instructions.
const COMPACTION_SYSTEM_PROMPT: &str = "You are compacting a coding agent's conversation history into \
a single, dense summary. Preserve everything a continuation of the task would need and discard the rest.";

/// A fixed preamble marking the injected summary message so the model
/// recognises it as a compaction artifact, not an ordinary user turn.
const SUMMARY_PREAMBLE: &str = "[Context compacted. The following is a summary of the earlier conversation.]\n\n";

#[derive(Debug, thiserror::Error)]
pub enum CompactionError {
    #[error("compaction LLM call failed: {0}")]
    Provider(#[from] ChatProviderError),
    #[error(transparent)]
    Context(#[from] crate::context::ContextError),
}

/// Runs one compaction pass against `context`, replacing its prefix with an
/// LLM-generated summary while preserving the most recent messages
/// verbatim. Returns the number of messages that were summarized away.
pub async fn compact(
    context: &mut Context,
    provider: &dyn ChatProvider,
    config: CompactionConfig,
    retry: RetryPolicy,
    wire: &WireSoulSide,
) -> Result<usize, CompactionError> {
    wire.send(WireEvent::CompactionBegin);
    let history = context.history();
    let (to_compact, to_preserve) = partition(history, config.max_preserved_messages);

    if to_compact.is_empty() {
        debug!("compaction: nothing to compact, history already within preserved window");
        context.checkpoint(false).await?;
        wire.send(WireEvent::CompactionEnd);
        return Ok(0);
    }

    let summary_request_message = prompt::build_summary_message(&to_compact);
    let request = ChatRequest {
        system_prompt: COMPACTION_SYSTEM_PROMPT.to_string(),
        tool_schemas: Vec::new(),
        history: vec![summary_request_message],
        thinking_effort: false,
        prompt_cache_key: None,
    };

    let summary_text = call_with_retry(provider, request, retry, wire).await?;

    context.clear().await?;
    context.checkpoint(false).await?;
    let preamble = Message::user(format!("{SUMMARY_PREAMBLE}{summary_text}"));
    let mut replacement = vec![preamble];
    replacement.extend(to_preserve);
    context.append(replacement).await?;

    info!(compacted = to_compact.len(), "compaction complete");
    wire.send(WireEvent::CompactionEnd);
    Ok(to_compact.len())
}

async fn call_with_retry(
    provider: &dyn ChatProvider,
    request: ChatRequest,
    retry: RetryPolicy,
    wire: &WireSoulSide,
) -> Result<String, ChatProviderError> {
    let mut attempt = 0;
    loop {
        match provider.step(request.clone(), wire).await {
            Ok(response) => return Ok(response.message.text()),
            Err(err) if err.is_retryable() && retry.should_retry(attempt) => {
                tokio::time::sleep(retry.delay(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_compact_matches_reserved_tokens_threshold() {
        let config = CompactionConfig {
            max_preserved_messages: 2,
            reserved_tokens: 50_000,
            max_context_size: 128_000,
        };
        assert!(!config.should_compact(70_000));
        assert!(config.should_compact(78_000));
        assert!(config.should_compact(200_000));
    }
}
