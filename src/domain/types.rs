use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// One message on the wire to a model provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

/// A single tool invocation requested by the model.
///
/// `invalid` carries the reason when the directive could not be parsed into a
/// well-formed call; such requests still get an answering tool turn, the
/// executor just answers them with an error result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// Outcome of executing one [`ToolCallRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub status: ToolStatus,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            status: ToolStatus::Success,
            payload: payload.into(),
            error_message: None,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            status: ToolStatus::Error,
            payload: String::new(),
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// One entry in the conversation transcript. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("tool turn references unknown tool call id '{0}'")]
    UnknownToolCallId(String),
    #[error("tool call '{0}' already has a result turn")]
    DuplicateToolResult(String),
}

/// Append-only transcript for one session.
///
/// Tool-call ids are allocated from a monotonic counter so that a replayed
/// session produces an identical transcript.
#[derive(Debug)]
pub struct Conversation {
    session_id: String,
    turns: Vec<Turn>,
    next_call: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            turns: Vec::new(),
            next_call: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn next_call_id(&mut self) -> String {
        self.next_call += 1;
        format!("call-{}", self.next_call)
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) {
        self.turns.push(Turn::assistant(content, tool_calls));
    }

    /// Appends a tool turn answering `tool_call_id`. The id must belong to a
    /// prior assistant turn and must not have been answered already.
    pub fn push_tool(
        &mut self,
        tool_call_id: &str,
        content: impl Into<String>,
    ) -> Result<(), ConversationError> {
        let requested = self
            .turns
            .iter()
            .filter(|turn| turn.role == TurnRole::Assistant)
            .flat_map(|turn| turn.tool_calls.iter())
            .any(|call| call.id == tool_call_id);
        if !requested {
            return Err(ConversationError::UnknownToolCallId(
                tool_call_id.to_string(),
            ));
        }

        let answered = self
            .turns
            .iter()
            .any(|turn| turn.tool_call_id.as_deref() == Some(tool_call_id));
        if answered {
            return Err(ConversationError::DuplicateToolResult(
                tool_call_id.to_string(),
            ));
        }

        self.turns.push(Turn::tool(tool_call_id, content));
        Ok(())
    }

    /// Tool calls that do not yet have an answering tool turn.
    pub fn pending_calls(&self) -> Vec<&ToolCallRequest> {
        self.turns
            .iter()
            .filter(|turn| turn.role == TurnRole::Assistant)
            .flat_map(|turn| turn.tool_calls.iter())
            .filter(|call| {
                !self
                    .turns
                    .iter()
                    .any(|turn| turn.tool_call_id.as_deref() == Some(call.id.as_str()))
            })
            .collect()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(conv: &mut Conversation, name: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: conv.next_call_id(),
            name: name.to_string(),
            arguments: json!({}),
            invalid: None,
        }
    }

    #[test]
    fn call_ids_are_monotonic() {
        let mut conv = Conversation::new();
        assert_eq!(conv.next_call_id(), "call-1");
        assert_eq!(conv.next_call_id(), "call-2");
        assert_eq!(conv.next_call_id(), "call-3");
    }

    #[test]
    fn tool_turn_requires_known_call_id() {
        let mut conv = Conversation::new();
        conv.push_user("hi");
        let err = conv.push_tool("call-9", "output").unwrap_err();
        assert!(matches!(err, ConversationError::UnknownToolCallId(_)));
    }

    #[test]
    fn tool_turn_answers_each_call_once() {
        let mut conv = Conversation::new();
        conv.push_user("hi");
        let request = call(&mut conv, "echo");
        let id = request.id.clone();
        conv.push_assistant("calling", vec![request]);

        assert_eq!(conv.pending_calls().len(), 1);
        conv.push_tool(&id, "done").expect("first result accepted");
        assert!(conv.pending_calls().is_empty());

        let err = conv.push_tool(&id, "again").unwrap_err();
        assert!(matches!(err, ConversationError::DuplicateToolResult(_)));
    }

    #[test]
    fn turns_keep_append_order() {
        let mut conv = Conversation::new();
        conv.push_user("question");
        let request = call(&mut conv, "echo");
        let id = request.id.clone();
        conv.push_assistant("thinking", vec![request]);
        conv.push_tool(&id, "result").expect("result accepted");
        conv.push_assistant("answer", Vec::new());

        let roles: Vec<TurnRole> = conv.turns().iter().map(|turn| turn.role).collect();
        assert_eq!(
            roles,
            vec![
                TurnRole::User,
                TurnRole::Assistant,
                TurnRole::Tool,
                TurnRole::Assistant
            ]
        );
    }
}
