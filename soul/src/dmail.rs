//! D-Mail (time-travel): `DenwaRenji`, the per-Soul single-slot buffer that
//! holds a pending fold-the-context request between the tool that raised it
//! and the step loop that applies it (spec §4.6).

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::message::Message;
use crate::tools::{Tool, ToolCallContext, ToolInvokeError, ToolOutput};

/// A pending D-Mail: rewind to `checkpoint_id`, then inject a synthetic
/// user message carrying `message` (what the "future self" learned).
#[derive(Debug, Clone)]
pub struct DMail {
    pub checkpoint_id: u32,
    pub message: String,
}

/// Fixed preamble prepended to the injected message, per spec §4.6 — tells
/// the model this is an internal mechanism, not something to surface.
pub const DMAIL_PREAMBLE: &str =
    "You just got a D-Mail from your future self. Do not mention this mechanism to the user; \
     simply continue as though you always knew the following:\n\n";

impl DMail {
    /// Renders the synthetic message the step loop appends after rewinding.
    pub fn to_injected_message(&self) -> Message {
        Message::user(format!("{DMAIL_PREAMBLE}{}", self.message))
    }
}

/// Single-slot buffer named after *Steins;Gate*'s microwave-turned-time-machine.
/// Capacity is exactly one: a second `SendDMail` within the same step is an
/// error raised by the tool, not silently dropped or queued.
#[derive(Default)]
pub struct DenwaRenji {
    slot: Mutex<Option<DMail>>,
}

impl DenwaRenji {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to place a D-Mail in the buffer. Fails if one is already
    /// pending (capacity-1 enforcement).
    pub async fn send(&self, dmail: DMail) -> Result<(), DMailAlreadyPending> {
        let mut slot = self.slot.lock().await;
        if slot.is_some() {
            return Err(DMailAlreadyPending);
        }
        *slot = Some(dmail);
        Ok(())
    }

    /// Takes the pending D-Mail, if any, leaving the buffer empty. Called by
    /// the step loop once per step, after all tool results are in.
    pub async fn take(&self) -> Option<DMail> {
        self.slot.lock().await.take()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("a D-Mail is already pending for this step")]
pub struct DMailAlreadyPending;

#[derive(serde::Deserialize)]
struct SendDmailArgs {
    message: String,
    checkpoint_id: u32,
}

/// The `SendDMail` tool: lets the model fold context back to `checkpoint_id`,
/// carrying `message` forward as what the "future self" learned.
pub struct SendDmailTool;

#[async_trait]
impl Tool for SendDmailTool {
    fn name(&self) -> &str {
        "SendDMail"
    }

    fn description(&self) -> &str {
        "Rewind the conversation to an earlier checkpoint, carrying forward a short note \
         of what was learned since, to free up context space."
    }

    fn params_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {"type": "string"},
                "checkpoint_id": {"type": "integer", "minimum": 0},
            },
            "required": ["message", "checkpoint_id"],
        })
    }

    async fn invoke(
        &self,
        params: serde_json::Value,
        ctx: &ToolCallContext,
    ) -> Result<ToolOutput, ToolInvokeError> {
        let args: SendDmailArgs = serde_json::from_value(params)
            .map_err(|e| ToolInvokeError::Failed(format!("invalid arguments: {e}")))?;
        if args.checkpoint_id >= ctx.n_checkpoints {
            return Err(ToolInvokeError::Failed(format!(
                "checkpoint_id {} out of range [0, {})",
                args.checkpoint_id, ctx.n_checkpoints
            )));
        }
        ctx.denwa_renji
            .send(DMail {
                checkpoint_id: args.checkpoint_id,
                message: args.message,
            })
            .await
            .map_err(|e| ToolInvokeError::Failed(e.to_string()))?;
        Ok(ToolOutput::text("D-Mail queued"))
    }
}
