//! Message data model: role-tagged records with structured content parts.
//!
//! This is the unit the [`Context`](crate::context::Context) persists and
//! the [`Soul`](crate::soul::Soul) step loop grows turn by turn. Messages
//! are appended once and never mutated (see spec §3 Lifecycle).

use serde::{Deserialize, Serialize};

/// Role of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One element of a message's ordered content sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Model-internal reasoning, not necessarily shown to the user.
    Think { text: String },
    ImageUrl { url: String },
    AudioUrl { url: String },
    VideoUrl { url: String },
    /// A complete tool call emitted by the assistant.
    ToolCall(ToolCall),
    /// A streaming fragment of a tool call's arguments. Never persisted as
    /// the canonical form — the Wire merges these into a final `ToolCall`
    /// before the assistant message is appended to the Context.
    ToolCallPart {
        id: String,
        name: Option<String>,
        arguments_delta: String,
    },
}

impl ContentPart {
    pub fn text<S: Into<String>>(s: S) -> Self {
        ContentPart::Text { text: s.into() }
    }

    pub fn think<S: Into<String>>(s: S) -> Self {
        ContentPart::Think { text: s.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        match self {
            ContentPart::ToolCall(tc) => Some(tc),
            _ => None,
        }
    }
}

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Outcome of executing a [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReturnValue {
    Ok {
        output: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        display: Option<serde_json::Value>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    Rejected,
}

impl ReturnValue {
    pub fn is_rejected(&self) -> bool {
        matches!(self, ReturnValue::Rejected)
    }

    pub fn ok<S: Into<String>>(output: S) -> Self {
        ReturnValue::Ok {
            output: output.into(),
            message: None,
            display: None,
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        ReturnValue::Error {
            message: message.into(),
            details: None,
        }
    }
}

/// Result of one tool call, carried in a `tool`-role [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub return_value: ReturnValue,
}

/// A role-tagged record with structured content parts.
///
/// `tool`-role messages carry a single [`ToolResult`] instead of free-form
/// content parts, so the `tool_call_id` they answer is always explicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl Message {
    pub fn system<S: Into<String>>(text: S) -> Self {
        Message {
            role: Role::System,
            content: vec![ContentPart::text(text)],
            tool_result: None,
        }
    }

    pub fn user<S: Into<String>>(text: S) -> Self {
        Message {
            role: Role::User,
            content: vec![ContentPart::text(text)],
            tool_result: None,
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Message {
            role: Role::User,
            content: parts,
            tool_result: None,
        }
    }

    pub fn assistant(content: Vec<ContentPart>) -> Self {
        Message {
            role: Role::Assistant,
            content,
            tool_result: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, return_value: ReturnValue) -> Self {
        Message {
            role: Role::Tool,
            content: Vec::new(),
            tool_result: Some(ToolResult {
                tool_call_id: tool_call_id.into(),
                return_value,
            }),
        }
    }

    /// Tool calls present in this message's content, in emission order.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content.iter().filter_map(ContentPart::as_tool_call).collect()
    }

    /// Concatenated text of all `Text` parts, in order.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_round_trips_through_json() {
        let msg = Message::user("hi");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn tool_result_message_round_trips() {
        let msg = Message::tool_result("call-1", ReturnValue::ok("done"));
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn rejected_return_value_round_trips() {
        let v = ReturnValue::Rejected;
        let json = serde_json::to_string(&v).unwrap();
        let back: ReturnValue = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
        assert!(back.is_rejected());
    }

    #[test]
    fn tool_calls_extracts_in_order() {
        let msg = Message::assistant(vec![
            ContentPart::text("let me check"),
            ContentPart::ToolCall(ToolCall {
                id: "1".into(),
                name: "read_file".into(),
                arguments: serde_json::json!({"path": "a"}),
            }),
            ContentPart::ToolCall(ToolCall {
                id: "2".into(),
                name: "read_file".into(),
                arguments: serde_json::json!({"path": "b"}),
            }),
        ]);
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "1");
        assert_eq!(calls[1].id, "2");
    }

    #[test]
    fn text_concatenates_text_parts_only() {
        let msg = Message::assistant(vec![
            ContentPart::text("a"),
            ContentPart::think("hidden reasoning"),
            ContentPart::text("b"),
        ]);
        assert_eq!(msg.text(), "ab");
    }
}
