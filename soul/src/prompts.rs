//! System-prompt templating: `${VAR}` substitution with a handful of
//! built-in variables plus an agent spec's own `system_prompt_args`.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use tokio::fs;

/// Names of the built-in template variables (spec §6 "System prompt templating").
pub const KIMI_NOW: &str = "KIMI_NOW";
pub const KIMI_WORK_DIR: &str = "KIMI_WORK_DIR";
pub const KIMI_WORK_DIR_LS: &str = "KIMI_WORK_DIR_LS";
pub const KIMI_AGENTS_MD: &str = "KIMI_AGENTS_MD";

/// Computes the built-in variables for `work_dir` at the current moment.
/// Called once per `Soul` construction (not per render) since `KIMI_NOW`
/// would otherwise drift across steps of a long turn.
pub async fn builtin_vars(work_dir: &Path) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert(KIMI_NOW.to_string(), Utc::now().to_rfc3339());
    vars.insert(KIMI_WORK_DIR.to_string(), work_dir.display().to_string());
    vars.insert(KIMI_WORK_DIR_LS.to_string(), shallow_listing(work_dir).await);
    vars.insert(
        KIMI_AGENTS_MD.to_string(),
        fs::read_to_string(work_dir.join("AGENTS.md"))
            .await
            .unwrap_or_default(),
    );
    vars
}

async fn shallow_listing(work_dir: &Path) -> String {
    let mut entries = match fs::read_dir(work_dir).await {
        Ok(rd) => rd,
        Err(_) => return String::new(),
    };
    let mut names = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    names.join("\n")
}

/// Substitutes every `${NAME}` occurrence in `template` using `builtins`
/// first, then `overrides` (an agent's own `system_prompt_args`, which take
/// precedence over a same-named builtin). Unknown variables are left
/// unsubstituted verbatim, so a typo surfaces in the rendered prompt rather
/// than failing silently.
pub fn render(template: &str, builtins: &HashMap<String, String>, overrides: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match overrides.get(name).or_else(|| builtins.get(name)) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_variables_from_both_maps() {
        let mut builtins = HashMap::new();
        builtins.insert("KIMI_WORK_DIR".to_string(), "/repo".to_string());
        let mut overrides = HashMap::new();
        overrides.insert("PROJECT".to_string(), "soul".to_string());
        let rendered = render("in ${KIMI_WORK_DIR} building ${PROJECT}", &builtins, &overrides);
        assert_eq!(rendered, "in /repo building soul");
    }

    #[test]
    fn override_wins_over_builtin_with_same_name() {
        let mut builtins = HashMap::new();
        builtins.insert("NAME".to_string(), "builtin".to_string());
        let mut overrides = HashMap::new();
        overrides.insert("NAME".to_string(), "override".to_string());
        assert_eq!(render("${NAME}", &builtins, &overrides), "override");
    }

    #[test]
    fn unknown_variable_is_left_verbatim() {
        assert_eq!(render("${NOPE}", &HashMap::new(), &HashMap::new()), "${NOPE}");
    }

    #[test]
    fn unterminated_placeholder_is_left_verbatim() {
        assert_eq!(render("hello ${oops", &HashMap::new(), &HashMap::new()), "hello ${oops");
    }

    #[tokio::test]
    async fn builtin_vars_includes_agents_md_when_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("AGENTS.md"), "be nice").unwrap();
        let vars = builtin_vars(dir.path()).await;
        assert_eq!(vars.get(KIMI_AGENTS_MD).unwrap(), "be nice");
    }

    #[tokio::test]
    async fn builtin_vars_agents_md_is_empty_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let vars = builtin_vars(dir.path()).await;
        assert_eq!(vars.get(KIMI_AGENTS_MD).unwrap(), "");
    }
}
