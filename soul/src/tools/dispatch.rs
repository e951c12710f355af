//! Tool Dispatch: runs every tool call from one assistant step concurrently,
//! then reassembles `tool`-role messages back in call order.
//!
//! Grounded on `graphweave`'s `ActNode` (`examples/hi-youichi-loom/graphweave/src/agent/react/act_node.rs`):
//! unknown tool names and invocation failures become `ReturnValue::Error`
//! rather than aborting the step, so one bad call can't take down the turn.

use futures::future::join_all;
use jsonschema::{Draft, JSONSchema};
use thiserror::Error;
use tracing::{debug, warn};

use crate::message::{Message, ReturnValue, ToolCall};
use crate::wire::{WireEvent, WireSoulSide};

use super::{Tool, ToolCallContext, ToolInvokeError, ToolRegistry};

/// Errors the dispatcher itself can raise, distinct from a single tool's
/// `ReturnValue::Error` (which is a normal, recoverable outcome the model
/// sees and can react to).
#[derive(Debug, Error)]
pub enum ToolDispatchError {
    #[error("no tool calls to dispatch")]
    Empty,
}

/// Runs every call in `tool_calls` concurrently against `registry`, in the
/// capability context `ctx`, and returns one `tool`-role [`Message`] per
/// call, in the same order the model emitted them — concurrency affects
/// when calls finish, never the order results rejoin the transcript.
pub async fn dispatch_step(
    tool_calls: &[ToolCall],
    registry: &ToolRegistry,
    ctx: &ToolCallContext,
    wire: &WireSoulSide,
) -> Result<Vec<Message>, ToolDispatchError> {
    if tool_calls.is_empty() {
        return Err(ToolDispatchError::Empty);
    }

    let futures = tool_calls.iter().map(|call| dispatch_one(call, registry, ctx));
    let results = join_all(futures).await;

    let mut messages = Vec::with_capacity(results.len());
    for (call, return_value) in tool_calls.iter().zip(results) {
        wire.send(WireEvent::ToolResult(crate::message::ToolResult {
            tool_call_id: call.id.clone(),
            return_value: return_value.clone(),
        }));
        messages.push(Message::tool_result(call.id.clone(), return_value));
    }
    Ok(messages)
}

async fn dispatch_one(
    call: &ToolCall,
    registry: &ToolRegistry,
    ctx: &ToolCallContext,
) -> ReturnValue {
    let Some(tool) = registry.get(&call.name) else {
        warn!(tool = %call.name, "dispatch: unknown tool");
        return ReturnValue::error(format!("unknown tool: {}", call.name));
    };

    if let Err(details) = validate_arguments(&tool.params_schema(), &call.arguments) {
        warn!(tool = %call.name, call_id = %call.id, %details, "dispatch: invalid arguments");
        return ReturnValue::Error {
            message: "Invalid arguments".to_string(),
            details: Some(details),
        };
    }

    let call_ctx = ToolCallContext {
        tool_call_id: call.id.clone(),
        ..ctx.clone()
    };
    debug!(tool = %call.name, call_id = %call.id, "dispatch: invoking");
    match invoke(&*tool, call, &call_ctx).await {
        Ok(output) => ReturnValue::Ok {
            output: output.output,
            message: output.message,
            display: output.display,
        },
        Err(ToolInvokeError::Rejected) => ReturnValue::Rejected,
        Err(ToolInvokeError::Failed(message)) => ReturnValue::error(message),
    }
}

/// Validates `arguments` against a tool's `params_schema`, joining any
/// validation failures into one message. A schema that fails to compile is
/// treated as a validation failure too, rather than silently let through.
fn validate_arguments(schema: &serde_json::Value, arguments: &serde_json::Value) -> Result<(), String> {
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| format!("tool schema is invalid: {e}"))?;

    if let Err(errors) = compiled.validate(arguments) {
        let messages: Vec<String> = errors.map(|e| format!("{}: {}", e.instance_path, e)).collect();
        return Err(messages.join("; "));
    }
    Ok(())
}

async fn invoke(
    tool: &dyn Tool,
    call: &ToolCall,
    ctx: &ToolCallContext,
) -> Result<super::ToolOutput, ToolInvokeError> {
    tool.invoke(call.arguments.clone(), ctx).await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::approval::ApprovalGate;
    use crate::config::Config;
    use crate::dmail::DenwaRenji;
    use crate::tools::ToolOutput;
    use crate::wire::Wire;

    struct SlowEcho(u64);
    struct AlwaysFails;
    struct AlwaysRejects;

    #[async_trait]
    impl Tool for SlowEcho {
        fn name(&self) -> &str {
            "slow_echo"
        }
        fn description(&self) -> &str {
            "echoes after a delay proportional to its argument"
        }
        fn params_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn invoke(
            &self,
            params: serde_json::Value,
            _ctx: &ToolCallContext,
        ) -> Result<ToolOutput, ToolInvokeError> {
            tokio::time::sleep(std::time::Duration::from_millis(self.0)).await;
            Ok(ToolOutput::text(params.to_string()))
        }
    }

    #[async_trait]
    impl Tool for AlwaysFails {
        fn name(&self) -> &str {
            "always_fails"
        }
        fn description(&self) -> &str {
            "always returns an error"
        }
        fn params_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn invoke(
            &self,
            _params: serde_json::Value,
            _ctx: &ToolCallContext,
        ) -> Result<ToolOutput, ToolInvokeError> {
            Err(ToolInvokeError::Failed("boom".into()))
        }
    }

    #[async_trait]
    impl Tool for AlwaysRejects {
        fn name(&self) -> &str {
            "always_rejects"
        }
        fn description(&self) -> &str {
            "always rejected by the user"
        }
        fn params_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn invoke(
            &self,
            _params: serde_json::Value,
            _ctx: &ToolCallContext,
        ) -> Result<ToolOutput, ToolInvokeError> {
            Err(ToolInvokeError::Rejected)
        }
    }

    struct RequiresName;

    #[async_trait]
    impl Tool for RequiresName {
        fn name(&self) -> &str {
            "requires_name"
        }
        fn description(&self) -> &str {
            "requires a string `name` argument"
        }
        fn params_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"],
            })
        }
        async fn invoke(
            &self,
            params: serde_json::Value,
            _ctx: &ToolCallContext,
        ) -> Result<ToolOutput, ToolInvokeError> {
            Ok(ToolOutput::text(params["name"].to_string()))
        }
    }

    fn test_ctx(wire: WireSoulSide) -> ToolCallContext {
        ToolCallContext {
            tool_call_id: String::new(),
            approval: Arc::new(ApprovalGate::new(wire.clone(), true)),
            wire,
            work_dir: PathBuf::from("/tmp"),
            environment: Arc::new(HashMap::new()),
            labor_market: None,
            config: Arc::new(Config::default()),
            denwa_renji: Arc::new(DenwaRenji::new()),
            n_checkpoints: 0,
        }
    }

    #[tokio::test]
    async fn results_rejoin_in_call_order_despite_uneven_latency() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(SlowEcho(30)));
        let (wire, _ui) = Wire::split();
        let ctx = test_ctx(wire.clone());

        let calls = vec![
            ToolCall {
                id: "1".into(),
                name: "slow_echo".into(),
                arguments: serde_json::json!({"n": 1}),
            },
            ToolCall {
                id: "2".into(),
                name: "slow_echo".into(),
                arguments: serde_json::json!({"n": 2}),
            },
        ];
        let messages = dispatch_step(&calls, &registry, &ctx, &wire).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].tool_result.as_ref().unwrap().tool_call_id, "1");
        assert_eq!(messages[1].tool_result.as_ref().unwrap().tool_call_id, "2");
    }

    #[tokio::test]
    async fn unknown_tool_becomes_an_error_return_value_not_a_panic() {
        let registry = ToolRegistry::new();
        let (wire, _ui) = Wire::split();
        let ctx = test_ctx(wire.clone());
        let calls = vec![ToolCall {
            id: "1".into(),
            name: "does_not_exist".into(),
            arguments: serde_json::json!({}),
        }];
        let messages = dispatch_step(&calls, &registry, &ctx, &wire).await.unwrap();
        match &messages[0].tool_result.as_ref().unwrap().return_value {
            ReturnValue::Error { message, .. } => assert!(message.contains("unknown tool")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_and_rejection_map_to_distinct_return_values() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(AlwaysFails));
        registry.register(Arc::new(AlwaysRejects));
        let (wire, _ui) = Wire::split();
        let ctx = test_ctx(wire.clone());
        let calls = vec![
            ToolCall {
                id: "1".into(),
                name: "always_fails".into(),
                arguments: serde_json::json!({}),
            },
            ToolCall {
                id: "2".into(),
                name: "always_rejects".into(),
                arguments: serde_json::json!({}),
            },
        ];
        let messages = dispatch_step(&calls, &registry, &ctx, &wire).await.unwrap();
        assert!(matches!(
            messages[0].tool_result.as_ref().unwrap().return_value,
            ReturnValue::Error { .. }
        ));
        assert!(messages[1].tool_result.as_ref().unwrap().return_value.is_rejected());
    }

    #[tokio::test]
    async fn empty_call_list_is_rejected_up_front() {
        let registry = ToolRegistry::new();
        let (wire, _ui) = Wire::split();
        let ctx = test_ctx(wire.clone());
        let err = dispatch_step(&[], &registry, &ctx, &wire).await.unwrap_err();
        assert!(matches!(err, ToolDispatchError::Empty));
    }

    #[tokio::test]
    async fn arguments_failing_the_tool_schema_never_reach_invoke() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(RequiresName));
        let (wire, _ui) = Wire::split();
        let ctx = test_ctx(wire.clone());
        let calls = vec![ToolCall {
            id: "1".into(),
            name: "requires_name".into(),
            arguments: serde_json::json!({}),
        }];
        let messages = dispatch_step(&calls, &registry, &ctx, &wire).await.unwrap();
        match &messages[0].tool_result.as_ref().unwrap().return_value {
            ReturnValue::Error { message, details } => {
                assert_eq!(message, "Invalid arguments");
                assert!(details.as_ref().unwrap().contains("name"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn arguments_matching_the_tool_schema_reach_invoke() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(RequiresName));
        let (wire, _ui) = Wire::split();
        let ctx = test_ctx(wire.clone());
        let calls = vec![ToolCall {
            id: "1".into(),
            name: "requires_name".into(),
            arguments: serde_json::json!({"name": "otto"}),
        }];
        let messages = dispatch_step(&calls, &registry, &ctx, &wire).await.unwrap();
        match &messages[0].tool_result.as_ref().unwrap().return_value {
            ReturnValue::Ok { output, .. } => assert_eq!(output, "\"otto\""),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
