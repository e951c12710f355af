//! # Soul
//!
//! Agent execution core: a durable step loop around a chat-completion model,
//! JSON-lines context storage with checkpoint/revert, concurrent tool
//! dispatch behind an approval gate, sub-agent delegation, and a D-Mail
//! time-travel primitive for steering a run from its own future.
//!
//! ## Design principles
//!
//! - **One step, one outcome**: each turn of [`soul::Soul`] runs a bounded
//!   step loop; control flow between steps (finish, continue, rewind) is an
//!   explicit return value, never an exception.
//! - **Context owns durability**: [`context::Context`] is the only writer of
//!   a session's on-disk history; checkpoints are markers inside that
//!   history, not separate snapshots.
//! - **Capability-checked providers**: [`llm::ChatProvider`] declares what it
//!   can do (images, thinking) and callers check before asking for it,
//!   rather than discovering a failure mid-turn.
//! - **Tools see only what they need**: [`tools::ToolCallContext`] is handed
//!   explicitly to every invocation instead of living in task-local state.
//!
//! ## Main modules
//!
//! - [`soul`]: [`soul::Soul`], [`soul::UserInput`], [`soul::SoulStatus`] — the
//!   turn-taking step loop.
//! - [`context`]: [`context::Context`], [`context::Session`],
//!   [`context::SessionTable`] — durable JSON-lines history with
//!   checkpoint/revert.
//! - [`tools`]: [`tools::Tool`], [`tools::ToolRegistry`],
//!   [`tools::ToolCallContext`], [`tools::dispatch_step`] — the tool
//!   contract and concurrent dispatcher.
//! - [`llm`]: [`llm::ChatProvider`], [`llm::ChatRequest`],
//!   [`llm::ChatResponse`], [`llm::MockChatProvider`]; [`llm::openai`]
//!   behind the `openai` feature.
//! - [`message`]: [`message::Message`], [`message::Role`],
//!   [`message::ContentPart`], [`message::ToolCall`], [`message::ReturnValue`].
//! - [`wire`]: [`wire::Wire`], [`wire::WireSoulSide`], [`wire::WireUiSide`],
//!   [`wire::WireEvent`] — the soul-to-UI event bus.
//! - [`approval`]: [`approval::ApprovalGate`], [`approval::ApprovalVerdict`] —
//!   human-in-the-loop gating for sensitive tool calls.
//! - [`dmail`]: [`dmail::DMail`], [`dmail::DenwaRenji`],
//!   [`dmail::SendDmailTool`] — send a message back to an earlier checkpoint.
//! - [`labor_market`]: [`labor_market::LaborMarket`],
//!   [`labor_market::SubagentSpawner`], [`labor_market::TaskTool`],
//!   [`labor_market::CreateSubagentTool`] — sub-agent registry and
//!   delegation.
//! - [`agent_spec`]: [`agent_spec::ResolvedAgentSpec`],
//!   [`agent_spec::load_and_resolve`] — YAML agent definitions with
//!   `extend` inheritance.
//! - [`prompts`]: [`prompts::render`], [`prompts::builtin_vars`] — `${VAR}`
//!   system-prompt templating.
//! - [`compress`]: [`compress::compact`], [`compress::CompactionConfig`] —
//!   history summarization when a session's token budget runs low.
//! - [`retry`]: [`retry::RetryPolicy`] — exponential backoff with jitter for
//!   transient provider errors.
//! - [`runtime`]: [`runtime::Runtime`] — the per-agent collaboration record
//!   threaded through a `Soul` and its sub-agents.
//! - [`config`]: [`config::Config`] — tunables with `Default` impls matching
//!   the turn loop's built-in limits.
//! - [`error`]: [`error::SoulError`], [`error::Capability`].
//!
//! Key types are re-exported at crate root: `use soul::{Soul, UserInput, Runtime};`.

pub mod agent_spec;
pub mod approval;
pub mod compress;
pub mod config;
pub mod context;
pub mod dmail;
pub mod error;
pub mod labor_market;
pub mod llm;
pub mod message;
pub mod prompts;
pub mod retry;
pub mod runtime;
pub mod soul;
pub mod tools;
pub mod wire;

pub use config::Config;
pub use context::Context;
pub use error::{Capability, SoulError};
pub use message::{ContentPart, Message, ReturnValue, Role, ToolCall};
pub use runtime::Runtime;
pub use soul::{Soul, SoulStatus, UserInput};
pub use tools::{Tool, ToolCallContext, ToolRegistry};
pub use wire::{Wire, WireEvent, WireSoulSide, WireUiSide};
