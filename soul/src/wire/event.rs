//! Typed event variants carried on the [`Wire`](super::Wire).

use uuid::Uuid;

use crate::approval::ApprovalRequest;
use crate::message::{ContentPart, ToolCall, ToolResult};

/// A UI's verdict on an [`ApprovalRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalVerdict {
    Approve,
    ApproveForSession,
    Reject,
}

/// One event on the Wire.
#[derive(Debug, Clone)]
pub enum WireEvent {
    TurnBegin { user_input: String },
    StepBegin { n: u32 },
    StepInterrupted,
    CompactionBegin,
    CompactionEnd,
    StatusUpdate { token_usage: u64, max_context_size: u64 },
    /// A content part streamed or finalized by the model.
    Content(ContentPart),
    ToolCall(ToolCall),
    /// A streaming fragment of a tool call's arguments.
    ToolCallPart { id: String, arguments_delta: String },
    ToolResult(ToolResult),
    /// An inner event from a sub-agent, tagged with the delegating `Task`
    /// call's id so a UI can demultiplex nested runs.
    SubagentEvent {
        task_tool_call_id: String,
        inner: Box<WireEvent>,
    },
    ApprovalRequest(ApprovalRequest),
    ApprovalRequestResolved { id: Uuid, verdict: ApprovalVerdict },
}

impl WireEvent {
    /// True for events the merge policy may coalesce with a like-kind
    /// neighbor (runs of `Content(Text)`, or a `ToolCall` followed by its
    /// `ToolCallPart` fragments).
    pub(super) fn merge_key(&self) -> Option<&'static str> {
        match self {
            WireEvent::Content(ContentPart::Text { .. }) => Some("text"),
            WireEvent::Content(ContentPart::Think { .. }) => Some("think"),
            WireEvent::ToolCall(_) | WireEvent::ToolCallPart { .. } => Some("tool_call"),
            _ => None,
        }
    }
}
