//! Splits history into a summarizable prefix and a verbatim-preserved
//! suffix, keeping `ToolCall`/tool-result pairs intact (spec §4.7 step 1).

use crate::message::{Message, Role};

/// Walks `history` from the end backwards, keeping the last
/// `max_preserved_messages` user/assistant messages plus any tool messages
/// interleaved with them (so a preserved assistant `ToolCall` always keeps
/// its matching tool result). Returns `(to_compact, to_preserve)` in
/// original order.
pub fn partition(history: &[Message], max_preserved_messages: usize) -> (Vec<Message>, Vec<Message>) {
    if max_preserved_messages == 0 || history.is_empty() {
        return (history.to_vec(), Vec::new());
    }

    let mut conversational_seen = 0usize;
    let mut split_at = history.len();
    for (i, msg) in history.iter().enumerate().rev() {
        if matches!(msg.role, Role::User | Role::Assistant) {
            conversational_seen += 1;
        }
        split_at = i;
        if conversational_seen == max_preserved_messages {
            break;
        }
    }

    let to_compact = history[..split_at].to_vec();
    let to_preserve = history[split_at..].to_vec();
    (to_compact, to_preserve)
}
