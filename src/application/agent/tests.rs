use super::*;
use crate::application::tooling::{
    CapabilityError, ExecutionPolicy, ParamType, ToolCapability, ToolExecutor, ToolRegistry,
    ToolSchema,
};
use crate::domain::types::TurnRole;
use crate::infrastructure::model::{ModelError, ModelProvider, ModelRequest, ModelResponse};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays a fixed script of model outputs and records every request it
/// receives. Once the script runs out, the last reply repeats.
struct ScriptedProvider {
    replies: Vec<String>,
    cursor: Mutex<usize>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: replies.into_iter().map(String::from).collect(),
            cursor: Mutex::new(0),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn requests(&self) -> Arc<Mutex<Vec<ModelRequest>>> {
        self.requests.clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        self.requests.lock().unwrap().push(request);
        let mut cursor = self.cursor.lock().unwrap();
        let index = (*cursor).min(self.replies.len().saturating_sub(1));
        *cursor += 1;
        Ok(ModelResponse {
            content: self.replies[index].clone(),
        })
    }
}

struct FailingProvider;

#[async_trait]
impl ModelProvider for FailingProvider {
    fn id(&self) -> &str {
        "failing"
    }

    async fn chat(&self, _request: ModelRequest) -> Result<ModelResponse, ModelError> {
        Err(ModelError::invalid_response("failing", "scripted failure"))
    }
}

struct Echo;

#[async_trait]
impl ToolCapability for Echo {
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<String, CapabilityError> {
        let text = arguments
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(format!("echo: {text}"))
    }
}

struct Sleeper {
    millis: u64,
    label: &'static str,
}

#[async_trait]
impl ToolCapability for Sleeper {
    async fn invoke(&self, _arguments: Map<String, Value>) -> Result<String, CapabilityError> {
        tokio::time::sleep(Duration::from_millis(self.millis)).await;
        Ok(self.label.to_string())
    }
}

fn echo_registry() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry
        .register(
            ToolSchema::new("echo", "Echoes text back").required(
                "text",
                ParamType::String,
                "Text to echo",
            ),
            Arc::new(Echo),
        )
        .expect("register");
    Arc::new(registry)
}

fn agent_with<P: ModelProvider>(provider: P, registry: Arc<ToolRegistry>) -> Agent<P> {
    let executor = ToolExecutor::new(registry.clone(), ExecutionPolicy::default());
    Agent::new(
        provider,
        "test-model",
        registry,
        executor,
        Arc::new(JsonDirectiveFormat),
        AgentOptions::default(),
    )
}

fn echo_directive(text: &str) -> String {
    format!("{{\"tool_call\":{{\"name\":\"echo\",\"arguments\":{{\"text\":\"{text}\"}}}}}}")
}

#[tokio::test]
async fn plain_reply_completes_in_one_step() {
    let provider = ScriptedProvider::new(vec!["All set, nothing to run."]);
    let requests = provider.requests();
    let mut agent = agent_with(provider, echo_registry());

    let reply = agent
        .send_user_message("status?")
        .await
        .expect("turn succeeds");

    assert_eq!(reply.text, "All set, nothing to run.");
    assert_eq!(reply.termination, Termination::Completed);
    assert!(reply.steps.is_empty());
    assert_eq!(requests.lock().unwrap().len(), 1);

    let roles: Vec<TurnRole> = agent
        .conversation()
        .turns()
        .iter()
        .map(|turn| turn.role)
        .collect();
    assert_eq!(roles, vec![TurnRole::User, TurnRole::Assistant]);
}

#[tokio::test]
async fn tool_call_is_answered_before_the_next_request() {
    let script = echo_directive("ping");
    let provider = ScriptedProvider::new(vec![script.as_str(), "The tool said ping."]);
    let requests = provider.requests();
    let mut agent = agent_with(provider, echo_registry());

    let reply = agent
        .send_user_message("run echo")
        .await
        .expect("turn succeeds");

    assert_eq!(reply.termination, Termination::Completed);
    assert_eq!(reply.steps.len(), 1);
    assert!(reply.steps[0].success);
    assert_eq!(reply.steps[0].tool, "echo");
    assert_eq!(reply.steps[0].payload, "echo: ping");

    let recorded = requests.lock().unwrap();
    assert_eq!(recorded.len(), 2);
    let fed_back = recorded[1]
        .messages
        .iter()
        .any(|message| message.content.contains("echo: ping"));
    assert!(fed_back, "tool result must appear in the follow-up request");

    let roles: Vec<TurnRole> = agent
        .conversation()
        .turns()
        .iter()
        .map(|turn| turn.role)
        .collect();
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

#[tokio::test]
async fn unknown_tool_error_is_fed_back_to_the_model() {
    let script = "{\"tool_call\":{\"name\":\"bogus\",\"arguments\":{}}}";
    let provider = ScriptedProvider::new(vec![script, "Understood, that tool does not exist."]);
    let requests = provider.requests();
    let mut agent = agent_with(provider, echo_registry());

    let reply = agent
        .send_user_message("try something")
        .await
        .expect("turn succeeds");

    assert_eq!(reply.termination, Termination::Completed);
    assert_eq!(reply.steps.len(), 1);
    assert!(!reply.steps[0].success);

    let recorded = requests.lock().unwrap();
    let fed_back = recorded[1]
        .messages
        .iter()
        .any(|message| message.content.contains("unknown tool"));
    assert!(fed_back, "error result must appear in the follow-up request");
}

#[tokio::test]
async fn malformed_directive_is_answered_with_an_error_result() {
    let script = "{\"tool_call\":{\"arguments\":{\"text\":\"x\"}}}";
    let provider = ScriptedProvider::new(vec![script, "I will rewrite that call."]);
    let requests = provider.requests();
    let mut agent = agent_with(provider, echo_registry());

    let reply = agent
        .send_user_message("go")
        .await
        .expect("turn succeeds");

    assert_eq!(reply.steps.len(), 1);
    assert!(!reply.steps[0].success);
    assert!(reply.steps[0].payload.contains("malformed tool directive"));

    let recorded = requests.lock().unwrap();
    let fed_back = recorded[1]
        .messages
        .iter()
        .any(|message| message.content.contains("malformed tool directive"));
    assert!(fed_back);
    assert!(agent.conversation().pending_calls().is_empty());
}

#[tokio::test]
async fn step_budget_bounds_the_loop() {
    let script = echo_directive("again");
    let provider = ScriptedProvider::new(vec![script.as_str()]);
    let requests = provider.requests();

    let registry = echo_registry();
    let executor = ToolExecutor::new(registry.clone(), ExecutionPolicy::default());
    let mut agent = Agent::new(
        provider,
        "test-model",
        registry,
        executor,
        Arc::new(JsonDirectiveFormat),
        AgentOptions {
            max_steps: 3,
            system_prompt: None,
        },
    );

    let reply = agent.send_user_message("loop").await.expect("turn ends");

    assert_eq!(reply.termination, Termination::StepLimit);
    assert_eq!(reply.steps.len(), 3);
    assert_eq!(requests.lock().unwrap().len(), 3);
    assert!(
        agent.conversation().pending_calls().is_empty(),
        "every issued call must be answered even at the limit"
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_land_in_request_order() {
    let script = concat!(
        "{\"tool_call\":{\"name\":\"slow\",\"arguments\":{}}}\n",
        "{\"tool_call\":{\"name\":\"fast\",\"arguments\":{}}}",
    );
    let provider = ScriptedProvider::new(vec![script, "Both ran."]);
    let mut registry = ToolRegistry::new();
    registry
        .register(
            ToolSchema::new("slow", "Sleeps long"),
            Arc::new(Sleeper {
                millis: 50,
                label: "slow",
            }),
        )
        .expect("register");
    registry
        .register(
            ToolSchema::new("fast", "Sleeps briefly"),
            Arc::new(Sleeper {
                millis: 5,
                label: "fast",
            }),
        )
        .expect("register");
    let registry = Arc::new(registry);
    let mut agent = agent_with(provider, registry);

    let reply = agent
        .send_user_message("run both")
        .await
        .expect("turn succeeds");

    assert_eq!(reply.steps.len(), 2);
    assert_eq!(reply.steps[0].tool, "slow");
    assert_eq!(reply.steps[0].payload, "slow");
    assert_eq!(reply.steps[1].tool, "fast");
    assert_eq!(reply.steps[1].payload, "fast");

    let tool_turns: Vec<&str> = agent
        .conversation()
        .turns()
        .iter()
        .filter(|turn| turn.role == TurnRole::Tool)
        .filter_map(|turn| turn.tool_call_id.as_deref())
        .collect();
    assert_eq!(tool_turns, vec!["call-1", "call-2"]);
}

#[tokio::test]
async fn model_failure_leaves_the_transcript_at_the_user_turn() {
    let mut agent = agent_with(FailingProvider, echo_registry());

    let err = agent.send_user_message("hello").await.unwrap_err();
    assert!(matches!(err, AgentError::Model(_)));

    let turns = agent.conversation().turns();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].role, TurnRole::User);
}

#[tokio::test]
async fn system_prompt_carries_host_and_tool_guidance() {
    let provider = ScriptedProvider::new(vec!["ok"]);
    let requests = provider.requests();
    let mut agent = agent_with(provider, echo_registry());

    agent.send_user_message("hi").await.expect("turn succeeds");

    let recorded = requests.lock().unwrap();
    let system = &recorded[0].messages[0];
    assert!(system.content.contains("Host environment"));
    assert!(system.content.contains("echo"));
    assert!(system.content.contains("tool_call"));
}

#[tokio::test]
async fn reset_starts_a_new_session() {
    let provider = ScriptedProvider::new(vec!["ok"]);
    let mut agent = agent_with(provider, echo_registry());

    agent.send_user_message("hi").await.expect("turn succeeds");
    let old_session = agent.conversation().session_id().to_string();
    assert!(!agent.conversation().turns().is_empty());

    agent.reset();
    assert!(agent.conversation().turns().is_empty());
    assert_ne!(agent.conversation().session_id(), old_session);
}
