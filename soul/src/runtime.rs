//! Runtime: the per-agent collaboration record threaded through a [`Soul`](crate::soul::Soul).
//!
//! Grounded on `loom::agent::react::runner::AgentOptions`
//! (`examples/hi-youichi-loom/loom/src/agent/react/runner.rs`): a bag of
//! shared collaborators an agent run needs, built once and cloned (cheaply,
//! via `Arc`) for sub-agents rather than threaded as separate parameters
//! everywhere.

use std::collections::HashMap;
use std::sync::Arc;

use crate::approval::ApprovalGate;
use crate::config::Config;
use crate::context::Session;
use crate::dmail::DenwaRenji;
use crate::labor_market::LaborMarket;
use crate::llm::ChatProvider;
use crate::wire::WireSoulSide;

/// A per-agent collaboration record (spec §3 Data Model, "Runtime").
///
/// Cloning a `Runtime` directly (`#[derive(Clone)]`) shares every field by
/// `Arc`/cheap-copy — used when a sub-agent should see the *same* session,
/// LLM binding, and approval gate as its parent. The two sub-agent
/// constructors below additionally replace `denwa_renji` (always, since
/// time-travel is per-agent) and optionally `labor_market` (per spec §4.5).
#[derive(Clone)]
pub struct Runtime {
    pub config: Arc<Config>,
    pub llm_binding: Arc<dyn ChatProvider>,
    pub session: Arc<Session>,
    pub builtin_prompt_args: Arc<HashMap<String, String>>,
    pub denwa_renji: Arc<DenwaRenji>,
    pub approval: Arc<ApprovalGate>,
    pub labor_market: Arc<LaborMarket>,
    pub environment: Arc<HashMap<String, String>>,
    pub yolo: bool,
}

impl Runtime {
    pub fn new(
        config: Arc<Config>,
        llm_binding: Arc<dyn ChatProvider>,
        session: Arc<Session>,
        builtin_prompt_args: HashMap<String, String>,
        wire: WireSoulSide,
        environment: HashMap<String, String>,
    ) -> Self {
        let yolo = config.yolo;
        Runtime {
            approval: Arc::new(ApprovalGate::new(wire, yolo)),
            config,
            llm_binding,
            session,
            builtin_prompt_args: Arc::new(builtin_prompt_args),
            denwa_renji: Arc::new(DenwaRenji::new()),
            labor_market: Arc::new(LaborMarket::new()),
            environment: Arc::new(environment),
            yolo,
        }
    }

    /// Runtime for a **fixed** sub-agent (declared under `subagents:` in the
    /// YAML spec): new DenwaRenji, new (empty) LaborMarket, same
    /// config/LLM/session/approval as the parent. Fixed sub-agents are
    /// leaves and cannot themselves delegate.
    pub fn copy_for_fixed_subagent(&self) -> Self {
        Runtime {
            config: self.config.clone(),
            llm_binding: self.llm_binding.clone(),
            session: self.session.clone(),
            builtin_prompt_args: self.builtin_prompt_args.clone(),
            denwa_renji: Arc::new(DenwaRenji::new()),
            approval: self.approval.clone(),
            labor_market: Arc::new(LaborMarket::new()),
            environment: self.environment.clone(),
            yolo: self.yolo,
        }
    }

    /// Runtime for a **dynamic** sub-agent (created by `CreateSubagent` at
    /// runtime): new DenwaRenji, same config/LLM/session/approval as the
    /// parent, and the LaborMarket is shared with the parent so dynamic
    /// sub-agents form a flat, mutually-visible pool.
    pub fn copy_for_dynamic_subagent(&self) -> Self {
        Runtime {
            config: self.config.clone(),
            llm_binding: self.llm_binding.clone(),
            session: self.session.clone(),
            builtin_prompt_args: self.builtin_prompt_args.clone(),
            denwa_renji: Arc::new(DenwaRenji::new()),
            approval: self.approval.clone(),
            labor_market: self.labor_market.clone(),
            environment: self.environment.clone(),
            yolo: self.yolo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_spec::ResolvedAgentSpec;
    use crate::llm::MockChatProvider;
    use crate::wire::Wire;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn test_runtime() -> Runtime {
        let (wire, _ui) = Wire::split();
        let session = Session {
            id: Uuid::new_v4(),
            work_dir: PathBuf::from("/tmp"),
            context_file: PathBuf::from("/tmp/context.jsonl"),
            title: "t".into(),
            updated_at: chrono::Utc::now(),
        };
        Runtime::new(
            Arc::new(Config::default()),
            Arc::new(MockChatProvider::fixed_text("hi")),
            Arc::new(session),
            HashMap::new(),
            wire,
            HashMap::new(),
        )
    }

    fn stub_spec(name: &str) -> Arc<ResolvedAgentSpec> {
        Arc::new(ResolvedAgentSpec {
            name: name.to_string(),
            system_prompt_template: String::new(),
            system_prompt_args: HashMap::new(),
            tool_keys: Vec::new(),
            subagent_paths: Vec::new(),
        })
    }

    #[test]
    fn fixed_subagent_gets_an_isolated_labor_market() {
        let parent = test_runtime();
        parent.labor_market.register_dynamic(stub_spec("scout"));
        let child = parent.copy_for_fixed_subagent();
        assert!(!Arc::ptr_eq(&parent.labor_market, &child.labor_market));
        assert!(!Arc::ptr_eq(&parent.denwa_renji, &child.denwa_renji));
        assert!(Arc::ptr_eq(&parent.approval, &child.approval));
    }

    #[test]
    fn dynamic_subagent_shares_the_parent_labor_market() {
        let parent = test_runtime();
        let child = parent.copy_for_dynamic_subagent();
        assert!(Arc::ptr_eq(&parent.labor_market, &child.labor_market));
        assert!(!Arc::ptr_eq(&parent.denwa_renji, &child.denwa_renji));
        assert!(Arc::ptr_eq(&parent.approval, &child.approval));
    }
}
