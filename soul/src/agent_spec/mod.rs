//! Agent-spec loader: YAML specs with single-parent `extend`, resolved into
//! an immutable [`ResolvedAgentSpec`].
//!
//! Grounded on the two-pass loader prescribed by the design notes (spec.md
//! §9, "Inheritance-via-YAML for agent specs"): (1) recursively load and
//! merge raw spec dicts using an explicit [`Inherit`] sentinel to tell
//! "not set" apart from "set to a falsy default", (2) validate and flatten
//! into a `ResolvedAgentSpec` with every tool reference checked against a
//! registry and every path made absolute. The `extend`/override merge
//! mechanics mirror the layered-config pattern in `loom::compress::config`
//! (`examples/hi-youichi-loom/loom/src/compress/config.rs`), generalized
//! from flat struct fields to a recursive YAML document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tokio::fs;

use crate::tools::ToolRegistry;

#[derive(Debug, Error)]
pub enum AgentSpecError {
    #[error("reading agent spec {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing agent spec {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("unsupported agent spec version {0} (expected 1)")]
    UnsupportedVersion(u32),
    #[error("agent spec {0} extends itself, directly or transitively")]
    ExtendCycle(PathBuf),
    #[error("agent spec {path} is missing required field `{field}`")]
    MissingField { path: PathBuf, field: &'static str },
    #[error("tool reference `{0}` is not `module_identifier:ClassName`")]
    MalformedToolRef(String),
    #[error("unknown tool `{0}` referenced by agent spec")]
    UnknownTool(String),
}

/// Sentinel distinguishing "field absent from this YAML document" (use the
/// parent's value) from "field present" (override, even with a falsy
/// value). A plain `Option<T>` can't make that distinction once serde's
/// `#[serde(default)]` is involved, since both resolve to `None`.
#[derive(Debug, Clone)]
pub enum Inherit<T> {
    Inherit,
    Set(T),
}

impl<T> Default for Inherit<T> {
    fn default() -> Self {
        Inherit::Inherit
    }
}

impl<T> Inherit<T> {
    fn or(self, parent: Inherit<T>) -> Inherit<T> {
        match self {
            Inherit::Set(v) => Inherit::Set(v),
            Inherit::Inherit => parent,
        }
    }

    fn resolve(self, default: T) -> T {
        match self {
            Inherit::Set(v) => v,
            Inherit::Inherit => default,
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Inherit<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Inherit::Set)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SpecFile {
    version: u32,
    agent: RawAgent,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawAgent {
    #[serde(default)]
    extend: Option<String>,
    #[serde(default)]
    name: Inherit<String>,
    #[serde(default)]
    system_prompt_path: Inherit<String>,
    #[serde(default)]
    system_prompt_args: Inherit<HashMap<String, String>>,
    /// Replaces (not appends) the inherited tool list when set.
    #[serde(default)]
    tools: Inherit<Vec<String>>,
    #[serde(default)]
    exclude_tools: Inherit<Vec<String>>,
    #[serde(default)]
    subagents: Inherit<Vec<String>>,
}

impl RawAgent {
    /// Applies `self` as an override on top of `parent` (the already-merged
    /// ancestor chain). `system_prompt_args` merges dict-wise; everything
    /// else is whole-value override-or-inherit.
    fn merge_onto(self, parent: RawAgent) -> RawAgent {
        let system_prompt_args = match (self.system_prompt_args, parent.system_prompt_args) {
            (Inherit::Set(mut child), Inherit::Set(base)) => {
                for (k, v) in base {
                    child.entry(k).or_insert(v);
                }
                Inherit::Set(child)
            }
            (child, parent) => child.or(parent),
        };
        RawAgent {
            extend: None,
            name: self.name.or(parent.name),
            system_prompt_path: self.system_prompt_path.or(parent.system_prompt_path),
            system_prompt_args,
            tools: self.tools.or(parent.tools),
            exclude_tools: self.exclude_tools.or(parent.exclude_tools),
            subagents: self.subagents.or(parent.subagents),
        }
    }
}

/// An agent spec with all `extend` inheritance flattened and all paths
/// resolved to absolute; the result of resolving a `Agent` (spec.md §3).
#[derive(Debug, Clone)]
pub struct ResolvedAgentSpec {
    pub name: String,
    /// Raw `${VAR}`-templated text, read from `system_prompt_path` but not
    /// yet rendered — rendering needs runtime-dependent builtins (see
    /// [`crate::prompts`]) so it happens at `Soul` construction.
    pub system_prompt_template: String,
    pub system_prompt_args: HashMap<String, String>,
    pub tool_keys: Vec<String>,
    /// Absolute paths to fixed sub-agent spec files (`subagents:` in YAML).
    pub subagent_paths: Vec<PathBuf>,
}

async fn load_chain(path: &Path, visited: &mut Vec<PathBuf>) -> Result<RawAgent, AgentSpecError> {
    let canonical = tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf());
    if visited.contains(&canonical) {
        return Err(AgentSpecError::ExtendCycle(canonical));
    }
    visited.push(canonical.clone());

    let text = fs::read_to_string(path)
        .await
        .map_err(|source| AgentSpecError::Io { path: path.to_path_buf(), source })?;
    let file: SpecFile = serde_yaml::from_str(&text)
        .map_err(|source| AgentSpecError::Yaml { path: path.to_path_buf(), source })?;
    if file.version != 1 {
        return Err(AgentSpecError::UnsupportedVersion(file.version));
    }

    match &file.agent.extend {
        None => Ok(file.agent),
        Some(parent_rel) => {
            let parent_path = path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(parent_rel);
            let parent = Box::pin(load_chain(&parent_path, visited)).await?;
            Ok(file.agent.merge_onto(parent))
        }
    }
}

fn resolve(raw: RawAgent, spec_path: &Path) -> Result<ResolvedAgentSpecBuilding, AgentSpecError> {
    let name = match raw.name {
        Inherit::Set(n) => n,
        Inherit::Inherit => {
            return Err(AgentSpecError::MissingField {
                path: spec_path.to_path_buf(),
                field: "name",
            })
        }
    };
    let system_prompt_path = match raw.system_prompt_path {
        Inherit::Set(p) => p,
        Inherit::Inherit => {
            return Err(AgentSpecError::MissingField {
                path: spec_path.to_path_buf(),
                field: "system_prompt_path",
            })
        }
    };
    let base_dir = spec_path.parent().unwrap_or_else(|| Path::new("."));
    let system_prompt_abs = base_dir.join(&system_prompt_path);
    let system_prompt_args = raw.system_prompt_args.resolve(HashMap::new());
    let tools = raw.tools.resolve(Vec::new());
    let exclude = raw.exclude_tools.resolve(Vec::new());
    let tool_keys: Vec<String> = tools.into_iter().filter(|t| !exclude.contains(t)).collect();
    let subagent_paths: Vec<PathBuf> = raw
        .subagents
        .resolve(Vec::new())
        .into_iter()
        .map(|rel| base_dir.join(rel))
        .collect();

    Ok(ResolvedAgentSpecBuilding {
        name,
        system_prompt_abs,
        system_prompt_args,
        tool_keys,
        subagent_paths,
    })
}

struct ResolvedAgentSpecBuilding {
    name: String,
    system_prompt_abs: PathBuf,
    system_prompt_args: HashMap<String, String>,
    tool_keys: Vec<String>,
    subagent_paths: Vec<PathBuf>,
}

async fn finish(building: ResolvedAgentSpecBuilding) -> Result<ResolvedAgentSpec, AgentSpecError> {
    let system_prompt_template = fs::read_to_string(&building.system_prompt_abs)
        .await
        .map_err(|source| AgentSpecError::Io {
            path: building.system_prompt_abs.clone(),
            source,
        })?;
    Ok(ResolvedAgentSpec {
        name: building.name,
        system_prompt_template,
        system_prompt_args: building.system_prompt_args,
        tool_keys: building.tool_keys,
        subagent_paths: building.subagent_paths,
    })
}

fn validate_tool_ref(key: &str) -> Result<(), AgentSpecError> {
    let parts: Vec<&str> = key.split(':').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(AgentSpecError::MalformedToolRef(key.to_string()));
    }
    Ok(())
}

/// Loads `path`, following its `extend` chain, validates every tool
/// reference against `registry`, and returns the fully resolved spec.
pub async fn load_and_resolve(
    path: impl AsRef<Path>,
    registry: &ToolRegistry,
) -> Result<ResolvedAgentSpec, AgentSpecError> {
    let path = path.as_ref();
    let mut visited = Vec::new();
    let merged = load_chain(path, &mut visited).await?;
    let building = resolve(merged, path)?;
    for key in &building.tool_keys {
        validate_tool_ref(key)?;
        if registry.get(key).is_none() {
            return Err(AgentSpecError::UnknownTool(key.clone()));
        }
    }
    finish(building).await
}
