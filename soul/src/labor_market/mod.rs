//! LaborMarket: the registry of sub-agents visible to a Soul.
//!
//! Grounded on `dashmap`'s use as loom's tool/registry backing store
//! throughout `loom::tool_source` — a concurrent map is overkill under the
//! single-threaded cooperative model (spec §5), but keeps the same idiom
//! the rest of the crate uses for shared registries and gives dynamic
//! sub-agents, which can be created from concurrently-running tool tasks,
//! a safe `insert` without a separate lock.

mod tools;

pub use tools::{CreateSubagentTool, SubagentSpawner, TaskTool};

use std::sync::Arc;

use dashmap::DashMap;

use crate::agent_spec::ResolvedAgentSpec;

/// Registry of sub-agents available to one Soul: fixed (declared in the
/// parent's YAML spec) and dynamic (created at runtime by `CreateSubagent`).
/// Mutated only by `CreateSubagent`; lookups never block under cooperative
/// scheduling (spec §5 "Shared-resource policy").
#[derive(Default)]
pub struct LaborMarket {
    fixed: DashMap<String, Arc<ResolvedAgentSpec>>,
    dynamic: DashMap<String, Arc<ResolvedAgentSpec>>,
}

impl LaborMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_fixed(&self, spec: Arc<ResolvedAgentSpec>) {
        self.fixed.insert(spec.name.clone(), spec);
    }

    pub fn register_dynamic(&self, spec: Arc<ResolvedAgentSpec>) {
        self.dynamic.insert(spec.name.clone(), spec);
    }

    /// Looks up `name` in the combined fixed-then-dynamic pool (spec §4.5
    /// "combined (fixed ∪ dynamic) pool").
    pub fn lookup(&self, name: &str) -> Option<Arc<ResolvedAgentSpec>> {
        self.fixed
            .get(name)
            .map(|e| e.clone())
            .or_else(|| self.dynamic.get(name).map(|e| e.clone()))
    }

    pub fn is_dynamic(&self, name: &str) -> bool {
        self.dynamic.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fixed.len() + self.dynamic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixed.is_empty() && self.dynamic.is_empty()
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn stub_spec(name: &str) -> Arc<ResolvedAgentSpec> {
        Arc::new(ResolvedAgentSpec {
            name: name.to_string(),
            system_prompt_template: String::new(),
            system_prompt_args: HashMap::new(),
            tool_keys: Vec::new(),
            subagent_paths: Vec::<PathBuf>::new(),
        })
    }

    #[test]
    fn lookup_prefers_fixed_over_dynamic_on_name_collision() {
        let market = LaborMarket::new();
        let fixed = Arc::new(ResolvedAgentSpec {
            name: "coder".to_string(),
            system_prompt_template: "fixed version".to_string(),
            system_prompt_args: HashMap::new(),
            tool_keys: Vec::new(),
            subagent_paths: Vec::<PathBuf>::new(),
        });
        let dynamic = Arc::new(ResolvedAgentSpec {
            name: "coder".to_string(),
            system_prompt_template: "dynamic version".to_string(),
            system_prompt_args: HashMap::new(),
            tool_keys: Vec::new(),
            subagent_paths: Vec::<PathBuf>::new(),
        });
        market.register_fixed(fixed.clone());
        market.register_dynamic(dynamic);

        let found = market.lookup("coder").unwrap();
        assert!(Arc::ptr_eq(&found, &fixed));
        assert_eq!(found.system_prompt_template, "fixed version");
    }

    #[test]
    fn is_dynamic_only_true_for_runtime_created_subagents() {
        let market = LaborMarket::new();
        market.register_fixed(stub_spec("fixed_one"));
        market.register_dynamic(stub_spec("dynamic_one"));
        assert!(!market.is_dynamic("fixed_one"));
        assert!(market.is_dynamic("dynamic_one"));
        assert!(!market.is_dynamic("missing"));
    }

    #[test]
    fn empty_market_reports_empty() {
        let market = LaborMarket::new();
        assert!(market.is_empty());
        market.register_dynamic(stub_spec("x"));
        assert_eq!(market.len(), 1);
        assert!(!market.is_empty());
    }
}
