use super::context::HostContext;
use super::errors::AgentError;
use super::extractor::DirectiveFormat;
use super::models::{AgentOptions, AgentReply, StepReport, Termination};
use crate::application::tooling::{ToolExecutor, ToolRegistry};
use crate::domain::types::{
    ChatMessage, Conversation, MessageRole, ToolCallRequest, Turn, TurnRole,
};
use crate::infrastructure::model::{ModelProvider, ModelRequest};
use std::sync::Arc;
use tracing::{debug, info, warn};

const BASE_SYSTEM_PROMPT: &str = "You are a capable assistant operating in a terminal session. \
Work step by step: inspect before you modify, and report what you did in plain language.";

/// Drives the conversation loop for one session: serialize the transcript,
/// call the model, extract directives, execute tools, feed results back, and
/// repeat until the model stops calling tools or the step budget runs out.
pub struct Agent<P: ModelProvider> {
    provider: P,
    model: String,
    registry: Arc<ToolRegistry>,
    executor: ToolExecutor,
    format: Arc<dyn DirectiveFormat>,
    options: AgentOptions,
    host: HostContext,
    conversation: Conversation,
}

impl<P: ModelProvider> Agent<P> {
    pub fn new(
        provider: P,
        model: impl Into<String>,
        registry: Arc<ToolRegistry>,
        executor: ToolExecutor,
        format: Arc<dyn DirectiveFormat>,
        options: AgentOptions,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            registry,
            executor,
            format,
            options,
            host: HostContext::capture(),
            conversation: Conversation::new(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Starts a fresh transcript under a new session id.
    pub fn reset(&mut self) {
        self.conversation = Conversation::new();
        info!(session_id = %self.conversation.session_id(), "Conversation reset");
    }

    /// Runs the loop for one user message.
    ///
    /// A model failure surfaces as an error before any assistant turn is
    /// appended, so the transcript stays at the user turn and the message can
    /// be retried. Hitting the step budget is not an error; the reply comes
    /// back flagged [`Termination::StepLimit`] with every issued call already
    /// answered.
    pub async fn send_user_message(&mut self, text: &str) -> Result<AgentReply, AgentError> {
        self.conversation.push_user(text);
        let mut steps = Vec::new();

        for step in 0..self.options.max_steps {
            let request = ModelRequest {
                model: self.model.clone(),
                messages: self.build_messages(),
            };
            debug!(
                step,
                session_id = %self.conversation.session_id(),
                message_count = request.messages.len(),
                "Invoking model"
            );
            let response = self.provider.chat(request).await?;

            let extraction = self.format.extract(&response.content);
            let calls: Vec<ToolCallRequest> = extraction
                .calls
                .into_iter()
                .map(|parsed| ToolCallRequest {
                    id: self.conversation.next_call_id(),
                    name: parsed.name,
                    arguments: parsed.arguments,
                    invalid: parsed.malformed,
                })
                .collect();
            self.conversation
                .push_assistant(extraction.plain_text.clone(), calls.clone());

            if calls.is_empty() {
                info!(
                    session_id = %self.conversation.session_id(),
                    steps = steps.len(),
                    "Turn completed"
                );
                return Ok(AgentReply {
                    text: extraction.plain_text,
                    termination: Termination::Completed,
                    steps,
                });
            }

            let results = self.executor.execute_all(&calls).await;
            for (call, result) in calls.iter().zip(&results) {
                steps.push(StepReport {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    success: result.is_success(),
                    payload: if result.is_success() {
                        result.payload.clone()
                    } else {
                        result.error_message.clone().unwrap_or_default()
                    },
                });
                self.conversation
                    .push_tool(&result.tool_call_id, self.format.render_tool_result(result))?;
            }
        }

        warn!(
            session_id = %self.conversation.session_id(),
            max_steps = self.options.max_steps,
            "Step budget exhausted while the model was still calling tools"
        );
        let text = self
            .conversation
            .turns()
            .iter()
            .rev()
            .find(|turn| turn.role == TurnRole::Assistant)
            .map(|turn| turn.content.clone())
            .unwrap_or_default();
        Ok(AgentReply {
            text,
            termination: Termination::StepLimit,
            steps,
        })
    }

    fn build_messages(&self) -> Vec<ChatMessage> {
        let mut messages = vec![self.system_message()];
        for turn in self.conversation.turns() {
            messages.push(self.render_turn(turn));
        }
        messages
    }

    fn system_message(&self) -> ChatMessage {
        let schemas = self.registry.schemas();
        let mut sections = vec![BASE_SYSTEM_PROMPT.to_string()];
        if let Some(extra) = &self.options.system_prompt {
            sections.push(extra.clone());
        }
        sections.push(self.host.render());
        sections.push(self.format.tool_guidance(&schemas));
        ChatMessage::new(MessageRole::System, sections.join("\n\n"))
    }

    fn render_turn(&self, turn: &Turn) -> ChatMessage {
        match turn.role {
            TurnRole::User => ChatMessage::new(MessageRole::User, turn.content.clone()),
            TurnRole::Assistant => {
                let mut content = turn.content.clone();
                for call in &turn.tool_calls {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str(&self.format.render_tool_call(call));
                }
                ChatMessage::new(MessageRole::Assistant, content)
            }
            // Providers without a native tool role see results as user input.
            TurnRole::Tool => ChatMessage::new(MessageRole::User, turn.content.clone()),
        }
    }
}
