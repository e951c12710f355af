//! Tool Dispatch: the `Tool` contract consumed from agents, and the
//! dispatcher that validates arguments, invokes tools, and reassembles
//! results in call order.

pub mod dispatch;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::approval::{ApprovalGate, ToolRejected};
use crate::config::Config;
use crate::dmail::DenwaRenji;
use crate::labor_market::SubagentSpawner;
use crate::wire::WireSoulSide;

pub use dispatch::{dispatch_step, ToolDispatchError};

/// Description + JSON schema for one tool, as handed to the chat provider.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params_schema: serde_json::Value,
}

/// Successful tool output, before being wrapped into `ReturnValue::Ok`.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub output: String,
    pub message: Option<String>,
    pub display: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn text(output: impl Into<String>) -> Self {
        ToolOutput {
            output: output.into(),
            message: None,
            display: None,
        }
    }
}

/// Error a `Tool::invoke` may return. `Rejected` is produced when a tool
/// raises [`ToolRejected`] after a denied approval request; `Failed`
/// becomes `ReturnValue::Error`.
#[derive(Debug, Error)]
pub enum ToolInvokeError {
    #[error("rejected")]
    Rejected,
    #[error("{0}")]
    Failed(String),
}

impl From<ToolRejected> for ToolInvokeError {
    fn from(_: ToolRejected) -> Self {
        ToolInvokeError::Rejected
    }
}

/// Bounded capability set exposed to a tool during one invocation. Passed
/// explicitly (not as a thread/task-local) so approval requests correlate
/// to the right call without hidden state — see the design notes' redesign
/// flag on "global context variables for current tool call".
#[derive(Clone)]
pub struct ToolCallContext {
    pub tool_call_id: String,
    pub approval: Arc<ApprovalGate>,
    pub wire: WireSoulSide,
    pub work_dir: PathBuf,
    pub environment: Arc<HashMap<String, String>>,
    /// Present only for the `Task` / `CreateSubagent` tools.
    pub labor_market: Option<Arc<SubagentSpawner>>,
    pub config: Arc<Config>,
    pub denwa_renji: Arc<DenwaRenji>,
    /// Snapshot of `Context::n_checkpoints` at dispatch time, for `SendDMail`'s
    /// range validation. Tools never touch the Context directly (the Soul is
    /// its sole writer); this is the one read-only fact they need from it.
    pub n_checkpoints: u32,
}

/// A named, schemaed callable the model may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn params_schema(&self) -> serde_json::Value;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            params_schema: self.params_schema(),
        }
    }

    async fn invoke(
        &self,
        params: serde_json::Value,
        ctx: &ToolCallContext,
    ) -> Result<ToolOutput, ToolInvokeError>;
}

/// Registry of tools available to one agent, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|e| e.clone())
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|e| e.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
