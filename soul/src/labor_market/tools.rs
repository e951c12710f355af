//! `Task` / `CreateSubagent`: the two tools through which a running agent
//! delegates work to another agent, and the spawner machinery backing them.
//!
//! Grounded generally on `loom::agent::react::runner::AgentOptions`'s
//! collaboration-record pattern (`examples/hi-youichi-loom/loom/src/agent/react/runner.rs`)
//! — no repo in the pack implements sub-agent delegation directly, so the
//! wire-forwarding loop below is a fresh design built from `Wire`'s own
//! producer/consumer split rather than copied from an existing file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::agent_spec::ResolvedAgentSpec;
use crate::context::Context;
use crate::error::SoulError;
use crate::runtime::Runtime;
use crate::soul::{Soul, UserInput};
use crate::tools::{Tool, ToolCallContext, ToolInvokeError, ToolOutput, ToolRegistry};
use crate::wire::{Wire, WireEvent};

use super::LaborMarket;

/// Owns the machinery a `Task`/`CreateSubagent` call needs: the labor
/// market to look sub-agents up in, the tool registry they share with
/// their parent, and the parent's own `Runtime` to derive a child from.
pub struct SubagentSpawner {
    pub labor_market: Arc<LaborMarket>,
    pub tools: Arc<ToolRegistry>,
    parent_runtime: Runtime,
}

impl SubagentSpawner {
    pub fn new(labor_market: Arc<LaborMarket>, tools: Arc<ToolRegistry>, parent_runtime: Runtime) -> Self {
        SubagentSpawner {
            labor_market,
            tools,
            parent_runtime,
        }
    }

    /// Runs `spec` as a sub-agent on `prompt` to completion and returns its
    /// final assistant text, per the five-step delegation algorithm: fresh
    /// context, fresh wire forwarded under `task_tool_call_id`, a `Runtime`
    /// scoped fixed-vs-dynamic, a full turn, then teardown.
    pub async fn run_subagent(
        &self,
        spec: Arc<ResolvedAgentSpec>,
        is_dynamic: bool,
        prompt: String,
        parent_wire: crate::wire::WireSoulSide,
        task_tool_call_id: String,
    ) -> Result<String, SoulError> {
        let context_path = self.parent_runtime.session.new_subagent_context_path().await?;
        let context = Context::open(&context_path).await?;

        let (child_wire, mut child_ui) = Wire::split();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = child_ui.receive(false).await {
                let forwarded = match event {
                    WireEvent::ApprovalRequest(_) | WireEvent::ApprovalRequestResolved { .. } => event,
                    other => WireEvent::SubagentEvent {
                        task_tool_call_id: task_tool_call_id.clone(),
                        inner: Box::new(other),
                    },
                };
                parent_wire.send(forwarded);
            }
        });

        let child_runtime = if is_dynamic {
            self.parent_runtime.copy_for_dynamic_subagent()
        } else {
            self.parent_runtime.copy_for_fixed_subagent()
        };

        let mut child = Soul::new(spec, child_runtime, context, child_wire, self.tools.clone()).await?;
        let run_result = child
            .run(UserInput::Text(prompt), CancellationToken::new())
            .await;
        let output = child.last_assistant_text();
        drop(child);

        if forwarder.await.is_err() {
            warn!("sub-agent event forwarder task panicked");
        }
        run_result?;
        Ok(output)
    }
}

#[derive(Deserialize)]
struct TaskArgs {
    #[allow(dead_code)]
    description: String,
    subagent_name: String,
    prompt: String,
}

/// Delegates a prompt to a named sub-agent drawn from the combined
/// fixed-or-dynamic labor market and returns its final answer.
pub struct TaskTool;

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "Task"
    }

    fn description(&self) -> &str {
        "Delegates a task to a named sub-agent and returns its final answer."
    }

    fn params_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "description": {"type": "string"},
                "subagent_name": {"type": "string"},
                "prompt": {"type": "string"},
            },
            "required": ["description", "subagent_name", "prompt"],
        })
    }

    async fn invoke(
        &self,
        params: serde_json::Value,
        ctx: &ToolCallContext,
    ) -> Result<ToolOutput, ToolInvokeError> {
        let args: TaskArgs = serde_json::from_value(params)
            .map_err(|e| ToolInvokeError::Failed(format!("invalid arguments: {e}")))?;
        let spawner = ctx
            .labor_market
            .as_ref()
            .ok_or_else(|| ToolInvokeError::Failed("no labor market available for this agent".into()))?;

        let spec = spawner
            .labor_market
            .lookup(&args.subagent_name)
            .ok_or_else(|| ToolInvokeError::Failed(format!("unknown sub-agent: {}", args.subagent_name)))?;
        let is_dynamic = spawner.labor_market.is_dynamic(&args.subagent_name);

        let output = spawner
            .run_subagent(
                spec,
                is_dynamic,
                args.prompt,
                ctx.wire.clone(),
                ctx.tool_call_id.clone(),
            )
            .await
            .map_err(|e| ToolInvokeError::Failed(e.to_string()))?;
        Ok(ToolOutput::text(output))
    }
}

#[derive(Deserialize)]
struct CreateSubagentArgs {
    name: String,
    system_prompt: String,
    #[serde(default)]
    tools: Vec<String>,
}

/// Registers a new, runtime-defined sub-agent into the dynamic pool, usable
/// by a subsequent `Task` call from this agent or any of its siblings.
pub struct CreateSubagentTool;

#[async_trait]
impl Tool for CreateSubagentTool {
    fn name(&self) -> &str {
        "CreateSubagent"
    }

    fn description(&self) -> &str {
        "Defines a new sub-agent at runtime, available to Task by name."
    }

    fn params_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "system_prompt": {"type": "string"},
                "tools": {"type": "array", "items": {"type": "string"}},
            },
            "required": ["name", "system_prompt"],
        })
    }

    async fn invoke(
        &self,
        params: serde_json::Value,
        ctx: &ToolCallContext,
    ) -> Result<ToolOutput, ToolInvokeError> {
        let args: CreateSubagentArgs = serde_json::from_value(params)
            .map_err(|e| ToolInvokeError::Failed(format!("invalid arguments: {e}")))?;
        let spawner = ctx
            .labor_market
            .as_ref()
            .ok_or_else(|| ToolInvokeError::Failed("no labor market available for this agent".into()))?;

        for tool_name in &args.tools {
            if spawner.tools.get(tool_name).is_none() {
                return Err(ToolInvokeError::Failed(format!("unknown tool: {tool_name}")));
            }
        }

        let spec = Arc::new(ResolvedAgentSpec {
            name: args.name.clone(),
            system_prompt_template: args.system_prompt,
            system_prompt_args: HashMap::new(),
            tool_keys: args.tools,
            subagent_paths: Vec::<PathBuf>::new(),
        });
        spawner.labor_market.register_dynamic(spec);
        Ok(ToolOutput::text(format!("sub-agent '{}' created", args.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalGate;
    use crate::config::Config;
    use crate::context::Session;
    use crate::dmail::DenwaRenji;
    use crate::llm::MockChatProvider;
    use std::path::Path;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn test_ctx(wire: crate::wire::WireSoulSide, labor_market: Option<Arc<SubagentSpawner>>) -> ToolCallContext {
        ToolCallContext {
            tool_call_id: "call_1".into(),
            approval: Arc::new(ApprovalGate::new(wire.clone(), true)),
            wire,
            work_dir: PathBuf::from("/tmp"),
            environment: Arc::new(HashMap::new()),
            labor_market,
            config: Arc::new(Config::default()),
            denwa_renji: Arc::new(DenwaRenji::new()),
            n_checkpoints: 0,
        }
    }

    fn test_spawner(dir: &Path) -> Arc<SubagentSpawner> {
        let (wire, _ui) = Wire::split();
        let session = Session {
            id: Uuid::new_v4(),
            work_dir: dir.to_path_buf(),
            context_file: dir.join("context.jsonl"),
            title: "t".into(),
            updated_at: chrono::Utc::now(),
        };
        let runtime = Runtime::new(
            Arc::new(Config::default()),
            Arc::new(MockChatProvider::fixed_text("sub-agent answer")),
            Arc::new(session),
            HashMap::new(),
            wire,
            HashMap::new(),
        );
        Arc::new(SubagentSpawner::new(
            runtime.labor_market.clone(),
            Arc::new(ToolRegistry::new()),
            runtime,
        ))
    }

    fn stub_spec(name: &str, prompt: &str) -> Arc<ResolvedAgentSpec> {
        Arc::new(ResolvedAgentSpec {
            name: name.to_string(),
            system_prompt_template: prompt.to_string(),
            system_prompt_args: HashMap::new(),
            tool_keys: Vec::new(),
            subagent_paths: Vec::<PathBuf>::new(),
        })
    }

    #[tokio::test]
    async fn task_tool_fails_on_unknown_subagent() {
        let dir = tempdir().unwrap();
        let spawner = test_spawner(dir.path());
        let (wire, _ui) = Wire::split();
        let ctx = test_ctx(wire, Some(spawner));

        let err = TaskTool
            .invoke(
                serde_json::json!({
                    "description": "d",
                    "subagent_name": "nope",
                    "prompt": "p",
                }),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolInvokeError::Failed(m) if m.contains("unknown sub-agent")));
    }

    #[tokio::test]
    async fn task_tool_without_a_labor_market_fails() {
        let (wire, _ui) = Wire::split();
        let ctx = test_ctx(wire, None);
        let err = TaskTool
            .invoke(
                serde_json::json!({"description": "d", "subagent_name": "x", "prompt": "p"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolInvokeError::Failed(_)));
    }

    #[tokio::test]
    async fn task_tool_runs_a_fixed_subagent_and_returns_its_answer() {
        let dir = tempdir().unwrap();
        let spawner = test_spawner(dir.path());
        spawner
            .labor_market
            .register_fixed(stub_spec("scout", "you scout things"));
        let (wire, _ui) = Wire::split();
        let ctx = test_ctx(wire, Some(spawner));

        let output = TaskTool
            .invoke(
                serde_json::json!({
                    "description": "scout the area",
                    "subagent_name": "scout",
                    "prompt": "go look",
                }),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(output.output, "sub-agent answer");
    }

    #[tokio::test]
    async fn create_subagent_registers_into_the_dynamic_pool() {
        let dir = tempdir().unwrap();
        let spawner = test_spawner(dir.path());
        let (wire, _ui) = Wire::split();
        let ctx = test_ctx(wire, Some(spawner.clone()));

        CreateSubagentTool
            .invoke(
                serde_json::json!({"name": "helper", "system_prompt": "be helpful"}),
                &ctx,
            )
            .await
            .unwrap();

        assert!(spawner.labor_market.is_dynamic("helper"));
        assert!(spawner.labor_market.lookup("helper").is_some());
    }

    #[tokio::test]
    async fn create_subagent_rejects_unknown_tool_names() {
        let dir = tempdir().unwrap();
        let spawner = test_spawner(dir.path());
        let (wire, _ui) = Wire::split();
        let ctx = test_ctx(wire, Some(spawner.clone()));

        let err = CreateSubagentTool
            .invoke(
                serde_json::json!({
                    "name": "helper",
                    "system_prompt": "be helpful",
                    "tools": ["does_not_exist"],
                }),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolInvokeError::Failed(m) if m.contains("unknown tool")));
        assert!(!spawner.labor_market.is_dynamic("helper"));
    }
}
