//! One line of the context file: a [`Message`], or one of the two reserved
//! meta-records (`_checkpoint`, `_usage`).

use serde_json::{json, Value};

use crate::message::Message;

use super::ContextError;

/// One JSON-lines record in a context file.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextLine {
    Message(Message),
    Checkpoint { id: u32 },
    Usage { token_count: u64 },
}

impl ContextLine {
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            ContextLine::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn checkpoint_id(&self) -> Option<u32> {
        match self {
            ContextLine::Checkpoint { id } => Some(*id),
            _ => None,
        }
    }

    pub fn usage_tokens(&self) -> Option<u64> {
        match self {
            ContextLine::Usage { token_count } => Some(*token_count),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            ContextLine::Message(m) => {
                serde_json::to_value(m).expect("Message always serializes")
            }
            ContextLine::Checkpoint { id } => json!({"role": "_checkpoint", "id": id}),
            ContextLine::Usage { token_count } => {
                json!({"role": "_usage", "token_count": token_count})
            }
        }
    }

    /// Serializes this record as one LF-terminated JSON line.
    pub fn to_line(&self) -> String {
        let mut s = self.to_json().to_string();
        s.push('\n');
        s
    }

    pub fn from_json(value: Value) -> Result<Self, ContextError> {
        let role = value
            .get("role")
            .and_then(Value::as_str)
            .ok_or_else(|| ContextError::Malformed("line missing \"role\" field".into()))?;
        match role {
            "_checkpoint" => {
                let id = value
                    .get("id")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| ContextError::Malformed("_checkpoint missing id".into()))?;
                Ok(ContextLine::Checkpoint { id: id as u32 })
            }
            "_usage" => {
                let token_count = value.get("token_count").and_then(Value::as_u64).ok_or_else(
                    || ContextError::Malformed("_usage missing token_count".into()),
                )?;
                Ok(ContextLine::Usage { token_count })
            }
            _ => {
                let msg: Message = serde_json::from_value(value)
                    .map_err(|e| ContextError::Malformed(e.to_string()))?;
                Ok(ContextLine::Message(msg))
            }
        }
    }

    /// Parses one line (without its trailing newline requirement; trailing
    /// whitespace is trimmed). Blank lines are rejected by the caller, not
    /// here, so callers can skip them explicitly during restore.
    pub fn from_line(line: &str) -> Result<Self, ContextError> {
        let value: Value = serde_json::from_str(line.trim_end())
            .map_err(|e| ContextError::Malformed(e.to_string()))?;
        Self::from_json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ReturnValue;

    #[test]
    fn message_line_round_trips() {
        let line = ContextLine::Message(Message::user("hi"));
        let text = line.to_line();
        assert!(text.ends_with('\n'));
        let back = ContextLine::from_line(text.trim_end()).unwrap();
        assert_eq!(line, back);
    }

    #[test]
    fn checkpoint_line_round_trips() {
        let line = ContextLine::Checkpoint { id: 7 };
        let back = ContextLine::from_line(line.to_line().trim_end()).unwrap();
        assert_eq!(line, back);
        assert_eq!(back.checkpoint_id(), Some(7));
    }

    #[test]
    fn usage_line_round_trips() {
        let line = ContextLine::Usage { token_count: 4096 };
        let back = ContextLine::from_line(line.to_line().trim_end()).unwrap();
        assert_eq!(line, back);
        assert_eq!(back.usage_tokens(), Some(4096));
    }

    #[test]
    fn tool_result_message_is_not_confused_with_reserved_markers() {
        let line = ContextLine::Message(Message::tool_result("c1", ReturnValue::ok("x")));
        let back = ContextLine::from_line(line.to_line().trim_end()).unwrap();
        assert!(back.as_message().is_some());
    }

    #[test]
    fn missing_role_is_malformed() {
        let err = ContextLine::from_line("{}").unwrap_err();
        assert!(matches!(err, ContextError::Malformed(_)));
    }
}
