use crate::config;

/// Tunables for a single agent instance.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Upper bound on model invocations per user message.
    pub max_steps: usize,
    /// Extra instructions prepended ahead of the tool guidance.
    pub system_prompt: Option<String>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_steps: config::DEFAULT_MAX_STEPS,
            system_prompt: None,
        }
    }
}

/// Why the loop stopped for this user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The model answered in plain text with no tool calls.
    Completed,
    /// The step budget ran out while the model was still calling tools.
    StepLimit,
}

/// One executed tool call, as reported back to the caller.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub call_id: String,
    pub tool: String,
    pub success: bool,
    pub payload: String,
}

/// Final outcome of one user message.
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// Plain text of the last assistant turn, directives stripped.
    pub text: String,
    pub termination: Termination,
    pub steps: Vec<StepReport>,
}
