//! The Soul: the step-loop driver that executes one agent's turn.
//!
//! Grounded on `loom::agent::react::runner::Runner::run` (`examples/hi-youichi-loom/loom/src/agent/react/runner.rs`)
//! for the overall shape of a model-call/tool-dispatch loop, but the
//! control-flow carrier is a tagged [`StepOutcome`] return value rather than
//! an exception, per the redesign flag on "exception-for-control-flow."

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent_spec::{self, ResolvedAgentSpec};
use crate::compress::{self, CompactionConfig};
use crate::context::{Context, ContextError};
use crate::error::{Capability, SoulError};
use crate::labor_market::SubagentSpawner;
use crate::llm::ChatRequest;
use crate::message::{ContentPart, Message, ReturnValue, Role, ToolCall};
use crate::prompts;
use crate::retry::RetryPolicy;
use crate::runtime::Runtime;
use crate::tools::{dispatch_step, ToolCallContext, ToolRegistry};
use crate::wire::{WireEvent, WireSoulSide};

/// Text or structured content the caller hands to [`Soul::run`] as one
/// turn's user input.
#[derive(Debug, Clone)]
pub enum UserInput {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl UserInput {
    fn into_message(self) -> Message {
        match self {
            UserInput::Text(text) => Message::user(text),
            UserInput::Parts(parts) => Message::user_parts(parts),
        }
    }

    fn parts(&self) -> &[ContentPart] {
        match self {
            UserInput::Text(_) => &[],
            UserInput::Parts(parts) => parts,
        }
    }

    fn display_text(&self) -> String {
        match self {
            UserInput::Text(text) => text.clone(),
            UserInput::Parts(parts) => parts
                .iter()
                .filter_map(ContentPart::as_text)
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// Cheap UI-facing snapshot of a Soul's context pressure.
#[derive(Debug, Clone, Copy)]
pub struct SoulStatus {
    pub context_usage: f32,
}

/// The tagged result of one `run_one_step` call, replacing the
/// exception-for-control-flow `BackToTheFuture` the core's source used.
#[derive(Debug)]
enum StepOutcome {
    Finished,
    Continue,
    Rewind { target: u32, messages: Vec<Message> },
}

/// Drives one agent's turns: model calls, tool dispatch, context growth,
/// compaction, and D-Mail rewinds. At most one `run` call may be in flight
/// at a time (single-threaded cooperative scheduling, spec §5).
pub struct Soul {
    #[allow(dead_code)]
    agent: Arc<ResolvedAgentSpec>,
    runtime: Runtime,
    context: Context,
    wire: WireSoulSide,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    thinking: bool,
    spawner: Arc<SubagentSpawner>,
}

impl Soul {
    /// Builds a Soul bound to `agent`, opening its system prompt template
    /// against `runtime`'s environment and repairing any dangling tool call
    /// left by a prior interrupted run (open question in the design notes:
    /// we choose repair-on-open over detect-and-rewind).
    pub async fn new(
        agent: Arc<ResolvedAgentSpec>,
        runtime: Runtime,
        mut context: Context,
        wire: WireSoulSide,
        tools: Arc<ToolRegistry>,
    ) -> Result<Self, SoulError> {
        repair_dangling_tool_calls(&mut context).await?;
        load_fixed_subagents(&agent, &runtime, &tools).await?;

        let builtins = prompts::builtin_vars(&runtime.session.work_dir).await;
        let system_prompt = prompts::render(
            &agent.system_prompt_template,
            &builtins,
            &agent.system_prompt_args,
        );
        let spawner = Arc::new(SubagentSpawner::new(
            runtime.labor_market.clone(),
            tools.clone(),
            runtime.clone(),
        ));

        Ok(Soul {
            agent,
            runtime,
            context,
            wire,
            tools,
            system_prompt,
            thinking: false,
            spawner,
        })
    }

    /// Runs one turn to completion, interruption, or terminal error.
    pub async fn run(&mut self, input: UserInput, cancel: CancellationToken) -> Result<(), SoulError> {
        let missing = self.missing_capabilities(&input);
        if !missing.is_empty() {
            return Err(SoulError::LlmNotSupported { missing });
        }

        self.wire.send(WireEvent::TurnBegin {
            user_input: input.display_text(),
        });

        if let UserInput::Text(text) = &input {
            if let Some(cmd) = parse_slash_command(text) {
                return self.dispatch_slash_command(cmd).await;
            }
        }

        self.context.checkpoint(false).await?;
        self.context.append(vec![input.into_message()]).await?;

        let mut step_no: u32 = 0;
        loop {
            step_no += 1;
            if step_no > self.runtime.config.max_steps_per_turn {
                return Err(SoulError::MaxStepsReached);
            }
            self.wire.send(WireEvent::StepBegin { n: step_no });

            let compaction_config = CompactionConfig::from_config(&self.runtime.config);
            if compaction_config.should_compact(self.context.token_count()) {
                let retry = self.retry_policy();
                compress::compact(
                    &mut self.context,
                    self.runtime.llm_binding.as_ref(),
                    compaction_config,
                    retry,
                    &self.wire,
                )
                .await
                .map_err(|e| SoulError::CompactionFailed(e.to_string()))?;
            }

            self.context.checkpoint(false).await?;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(step = step_no, "turn cancelled");
                    self.wire.send(WireEvent::StepInterrupted);
                    self.runtime.approval.reject_all_pending();
                    return Err(SoulError::RunCancelled);
                }
                res = self.run_one_step(&cancel) => res?,
            };

            match outcome {
                StepOutcome::Finished => return Ok(()),
                StepOutcome::Continue => continue,
                StepOutcome::Rewind { target, messages } => {
                    debug!(target, "rewinding via D-Mail");
                    self.context.revert_to(target).await?;
                    self.context.checkpoint(false).await?;
                    self.context.append(messages).await?;
                    continue;
                }
            }
        }
    }

    /// Toggles the "thinking effort" flag. Rejected if the bound LLM does
    /// not advertise the `thinking` capability.
    pub fn set_thinking(&mut self, enabled: bool) -> Result<(), SoulError> {
        if enabled && !self.runtime.llm_binding.thinking() {
            return Err(SoulError::LlmNotSupported {
                missing: vec![Capability::Thinking],
            });
        }
        self.thinking = enabled;
        Ok(())
    }

    pub fn status(&self) -> SoulStatus {
        let max = self.runtime.config.max_context_size.max(1);
        SoulStatus {
            context_usage: self.context.token_count() as f32 / max as f32,
        }
    }

    /// Text of the most recent assistant message, or empty if none exists
    /// (used by `Task` to extract a sub-agent's final answer).
    pub fn last_assistant_text(&self) -> String {
        self.context
            .history()
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(Message::text)
            .unwrap_or_default()
    }

    fn missing_capabilities(&self, input: &UserInput) -> Vec<Capability> {
        let mut missing = Vec::new();
        for part in input.parts() {
            let needed = match part {
                ContentPart::ImageUrl { .. } if !self.runtime.llm_binding.image_in() => {
                    Some(Capability::ImageIn)
                }
                ContentPart::AudioUrl { .. } => Some(Capability::AudioIn),
                ContentPart::VideoUrl { .. } => Some(Capability::VideoIn),
                _ => None,
            };
            if let Some(cap) = needed {
                if !missing.contains(&cap) {
                    missing.push(cap);
                }
            }
        }
        missing
    }

    async fn dispatch_slash_command(&mut self, cmd: &str) -> Result<(), SoulError> {
        match cmd {
            "compact" => {
                let retry = self.retry_policy();
                let config = CompactionConfig::from_config(&self.runtime.config);
                compress::compact(
                    &mut self.context,
                    self.runtime.llm_binding.as_ref(),
                    config,
                    retry,
                    &self.wire,
                )
                .await
                .map_err(|e| SoulError::CompactionFailed(e.to_string()))?;
                Ok(())
            }
            "clear" => {
                self.context.clear().await?;
                Ok(())
            }
            "init" => {
                self.context.checkpoint(false).await?;
                self.wire.send(WireEvent::Content(ContentPart::text(
                    "Project initialization is performed by an external tool; \
                     the core only recorded a checkpoint for it.",
                )));
                Ok(())
            }
            other => Err(SoulError::UnknownCommand(other.to_string())),
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.runtime.config.max_retries_per_step as usize,
            self.runtime.config.retry_initial_backoff,
            self.runtime.config.retry_max_backoff,
            self.runtime.config.retry_jitter,
        )
    }

    fn tool_call_context(&self) -> ToolCallContext {
        ToolCallContext {
            tool_call_id: String::new(),
            approval: self.runtime.approval.clone(),
            wire: self.wire.clone(),
            work_dir: self.runtime.session.work_dir.clone(),
            environment: self.runtime.environment.clone(),
            labor_market: Some(self.spawner.clone()),
            config: self.runtime.config.clone(),
            denwa_renji: self.runtime.denwa_renji.clone(),
            n_checkpoints: self.context.n_checkpoints(),
        }
    }

    async fn run_one_step(&mut self, cancel: &CancellationToken) -> Result<StepOutcome, SoulError> {
        let request = ChatRequest {
            system_prompt: self.system_prompt.clone(),
            tool_schemas: self.tools.specs(),
            history: self.context.history().to_vec(),
            thinking_effort: self.thinking,
            prompt_cache_key: Some(self.runtime.session.id.to_string()),
        };
        let retry = self.retry_policy();
        let response = self.call_with_retry(request, retry, cancel).await?;
        self.context.update_usage(response.usage.total_tokens).await?;

        let tool_calls: Vec<ToolCall> = response.message.tool_calls().into_iter().cloned().collect();
        self.context.append(vec![response.message]).await?;

        if tool_calls.is_empty() {
            return Ok(StepOutcome::Finished);
        }

        let call_ctx = self.tool_call_context();
        let dispatch_fut = dispatch_step(&tool_calls, &self.tools, &call_ctx, &self.wire);
        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SoulError::RunCancelled),
            r = dispatch_fut => r?,
        };
        self.context.append(results.clone()).await?;

        let any_rejected = results.iter().any(|m| {
            m.tool_result
                .as_ref()
                .map(|r| r.return_value.is_rejected())
                .unwrap_or(false)
        });

        if let Some(dmail) = self.runtime.denwa_renji.take().await {
            if any_rejected {
                info!("D-Mail discarded: a tool result in this step was rejected");
                return Ok(StepOutcome::Finished);
            }
            return Ok(StepOutcome::Rewind {
                target: dmail.checkpoint_id,
                messages: vec![dmail.to_injected_message()],
            });
        }

        if any_rejected {
            return Ok(StepOutcome::Finished);
        }
        Ok(StepOutcome::Continue)
    }

    async fn call_with_retry(
        &self,
        request: ChatRequest,
        retry: RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<crate::llm::ChatResponse, SoulError> {
        let mut attempt = 0usize;
        loop {
            let step_fut = self.runtime.llm_binding.step(request.clone(), &self.wire);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SoulError::RunCancelled),
                r = step_fut => r,
            };
            match outcome {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && retry.should_retry(attempt) => {
                    debug!(attempt, error = %err, "retrying chat provider call");
                    tokio::time::sleep(retry.delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    return Err(SoulError::ProviderExhausted(err.to_string()))
                }
                Err(err) => return Err(SoulError::Provider(err.to_string())),
            }
        }
    }
}

fn parse_slash_command(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('/')?;
    Some(rest.split_whitespace().next().unwrap_or(rest))
}

/// After opening a context that may have been left by an interrupted run,
/// checks whether the last message is an assistant message with `ToolCall`s
/// that have no matching tool-result. If so, synthesizes `Error` results for
/// them (the design notes' open-question decision: repair on open, rather
/// than detect-and-rewind at the next step).
async fn repair_dangling_tool_calls(context: &mut Context) -> Result<(), ContextError> {
    let history = context.history();
    let Some(last) = history.last() else {
        return Ok(());
    };
    let calls = last.tool_calls();
    if calls.is_empty() {
        return Ok(());
    }
    let answered: std::collections::HashSet<&str> = history
        .iter()
        .filter_map(|m| m.tool_result.as_ref())
        .map(|r| r.tool_call_id.as_str())
        .collect();
    let repairs: Vec<Message> = calls
        .iter()
        .filter(|c| !answered.contains(c.id.as_str()))
        .map(|c| {
            Message::tool_result(
                c.id.clone(),
                ReturnValue::error("tool call interrupted before completion"),
            )
        })
        .collect();
    if !repairs.is_empty() {
        warn!(count = repairs.len(), "repairing dangling tool calls from interrupted run");
        context.append(repairs).await?;
    }
    Ok(())
}

/// Loads every sub-agent declared under `subagents:` in `agent`'s YAML spec
/// and registers it into `runtime.labor_market` as fixed, so it's reachable
/// via `Task` without a prior `CreateSubagent` call (spec §4.5, "loaded at
/// startup alongside the parent").
async fn load_fixed_subagents(
    agent: &ResolvedAgentSpec,
    runtime: &Runtime,
    tools: &ToolRegistry,
) -> Result<(), SoulError> {
    for path in &agent.subagent_paths {
        let resolved = agent_spec::load_and_resolve(path, tools)
            .await
            .map_err(|e| SoulError::AgentSpec(e.to_string()))?;
        debug!(name = %resolved.name, path = %path.display(), "registering fixed sub-agent");
        runtime.labor_market.register_fixed(Arc::new(resolved));
    }
    Ok(())
}
