//! Error taxonomy for the agent execution core.
//!
//! Mirrors the propagation rule from the design: recover locally whenever
//! the recovery is bounded (retries, tool-error-as-feedback); surface to the
//! turn boundary otherwise.

use thiserror::Error;

use crate::context::ContextError;
use crate::tools::ToolDispatchError;

/// Capability a request needed that the bound LLM does not advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ImageIn,
    AudioIn,
    VideoIn,
    Thinking,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Capability::ImageIn => "image_in",
            Capability::AudioIn => "audio_in",
            Capability::VideoIn => "video_in",
            Capability::Thinking => "thinking",
        };
        write!(f, "{s}")
    }
}

/// Top-level error type for the core. Every terminal-for-the-turn condition
/// from the error handling design has a variant here.
#[derive(Debug, Error)]
pub enum SoulError {
    /// No model configured on the runtime.
    #[error("no LLM configured")]
    LlmNotSet,

    /// The request needed capabilities the bound LLM lacks.
    #[error("LLM does not support: {missing:?}")]
    LlmNotSupported { missing: Vec<Capability> },

    /// The chat provider failed after exhausting retries.
    #[error("chat provider failed after retries: {0}")]
    ProviderExhausted(String),

    /// The chat provider returned a non-retryable error.
    #[error("chat provider error: {0}")]
    Provider(String),

    /// `max_steps_per_turn` was reached without the turn finishing.
    #[error("max steps per turn reached")]
    MaxStepsReached,

    /// Compaction itself failed after retries.
    #[error("compaction failed: {0}")]
    CompactionFailed(String),

    /// The turn was cancelled (e.g. user pressed Ctrl-C).
    #[error("run cancelled")]
    RunCancelled,

    /// An assistant message had a `ToolCall` with no matching result and was
    /// not the last message (truncated mid-tool, and not repairable by the
    /// chosen recovery policy).
    #[error("dangling tool call with no result: {0}")]
    DanglingToolCall(String),

    /// Context store I/O or invariant violation.
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// Tool dispatch failure that escaped the "never terminal" rule (should
    /// not normally happen — tool errors are caught and returned in-band).
    #[error("tool dispatch error: {0}")]
    ToolDispatch(#[from] ToolDispatchError),

    /// Agent-spec loading/validation error. Fatal at startup.
    #[error("agent spec error: {0}")]
    AgentSpec(String),

    /// Unknown slash-command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}
