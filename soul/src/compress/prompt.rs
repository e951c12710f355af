//! Builds the summarization request message for a compaction pass
//! (spec §4.7 step 2).

use crate::message::{Message, ReturnValue};

/// Fixed compaction instruction appended after the enumerated history,
/// specifying priorities and the expected output shape. The core treats
/// the LLM's response as opaque text — see the design notes' open question
/// on whether to validate this structure; we chose not to (§9).
const COMPACTION_INSTRUCTION: &str = r#"
Summarize the conversation above into a dense brief for your own continuation. Priorities, in order:
1. Current focus: what task is in progress and its immediate next step.
2. Errors & resolutions: what failed and how it was fixed or worked around.
3. Code evolution: files touched and the net effect of changes made so far.
4. Environment: relevant paths, commands, versions, or constraints discovered.
5. Decisions: choices made and their rationale, so they aren't relitigated.
6. TODOs: anything explicitly deferred.

Respond with exactly this structure:
<summary>
  <focus>...</focus>
  <errors_and_resolutions>...</errors_and_resolutions>
  <code_evolution>...</code_evolution>
  <environment>...</environment>
  <decisions>...</decisions>
  <todos>...</todos>
</summary>
"#;

fn render_message(i: usize, msg: &Message) -> String {
    let content = if let Some(result) = &msg.tool_result {
        match &result.return_value {
            ReturnValue::Ok { output, .. } => output.clone(),
            ReturnValue::Error { message, .. } => format!("error: {message}"),
            ReturnValue::Rejected => "rejected by user".to_string(),
        }
    } else {
        msg.text()
    };
    format!(
        "## Message {i}\nRole: {:?}\nContent:\n{content}\n",
        msg.role
    )
}

/// Builds the single user-role message sent to the compaction LLM call:
/// every `to_compact` message enumerated, followed by the fixed
/// instruction block.
pub fn build_summary_message(to_compact: &[Message]) -> Message {
    let mut body = String::new();
    for (i, msg) in to_compact.iter().enumerate() {
        body.push_str(&render_message(i, msg));
        body.push('\n');
    }
    body.push_str(COMPACTION_INSTRUCTION);
    Message::user(body)
}
