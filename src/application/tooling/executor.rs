use super::registry::ToolRegistry;
use crate::domain::types::{ToolCallRequest, ToolResult};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Bounds on a single capability run. The working directory and environment
/// of shell-running tools are part of the tool implementations themselves;
/// the executor only enforces the wall-clock budget.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionPolicy {
    pub timeout: Duration,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::config::DEFAULT_TOOL_TIMEOUT_SECS),
        }
    }
}

/// Turns [`ToolCallRequest`]s into [`ToolResult`]s. Every failure mode -
/// invalid directive, unknown tool, schema violation, capability error,
/// timeout - becomes an error result so the model always gets a reply to
/// every call it made.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    policy: ExecutionPolicy,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, policy: ExecutionPolicy) -> Self {
        Self { registry, policy }
    }

    pub async fn execute(&self, request: &ToolCallRequest) -> ToolResult {
        if let Some(reason) = &request.invalid {
            warn!(call_id = %request.id, %reason, "Skipping malformed tool directive");
            return ToolResult::error(
                &request.id,
                format!("malformed tool directive: {reason}"),
            );
        }

        let entry = match self.registry.lookup(&request.name) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(requested_tool = %request.name, "Unknown tool requested by model");
                return ToolResult::error(&request.id, err.to_string());
            }
        };

        if let Err(violation) = entry.schema.validate(&request.arguments) {
            warn!(tool = %entry.schema.name, %violation, "Tool arguments failed schema validation");
            return ToolResult::error(&request.id, violation.to_string());
        }

        let arguments = match &request.arguments {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };

        debug!(tool = %entry.schema.name, call_id = %request.id, "Invoking tool capability");
        match timeout(self.policy.timeout, entry.capability.invoke(arguments)).await {
            Ok(Ok(payload)) => {
                info!(tool = %entry.schema.name, call_id = %request.id, success = true, "Tool executed");
                ToolResult::success(&request.id, payload)
            }
            Ok(Err(source)) => {
                info!(tool = %entry.schema.name, call_id = %request.id, success = false, "Tool executed");
                ToolResult::error(
                    &request.id,
                    format!("tool '{}' failed: {source}", entry.schema.name),
                )
            }
            Err(_) => {
                warn!(tool = %entry.schema.name, call_id = %request.id, "Tool execution timed out");
                ToolResult::error(
                    &request.id,
                    format!(
                        "tool '{}' timed out after {}s",
                        entry.schema.name,
                        self.policy.timeout.as_secs()
                    ),
                )
            }
        }
    }

    /// Runs all calls of one assistant turn concurrently. `join_all` yields
    /// outputs in input order, so results line up with the requests no matter
    /// which capability finishes first.
    pub async fn execute_all(&self, requests: &[ToolCallRequest]) -> Vec<ToolResult> {
        join_all(requests.iter().map(|request| self.execute(request))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::tooling::registry::{CapabilityError, ToolCapability};
    use crate::application::tooling::schema::{ParamType, ToolSchema};
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Shout;

    #[async_trait]
    impl ToolCapability for Shout {
        async fn invoke(&self, arguments: Map<String, Value>) -> Result<String, CapabilityError> {
            let text = arguments
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Ok(text.to_uppercase())
        }
    }

    struct Tracked {
        invoked: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ToolCapability for Tracked {
        async fn invoke(&self, _arguments: Map<String, Value>) -> Result<String, CapabilityError> {
            self.invoked.store(true, Ordering::SeqCst);
            Ok("ran".to_string())
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

    fn request(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
            invalid: None,
        }
    }

    fn executor_with(entries: Vec<(ToolSchema, Arc<dyn ToolCapability>)>) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        for (schema, capability) in entries {
            registry.register(schema, capability).expect("register");
        }
        ToolExecutor::new(Arc::new(registry), ExecutionPolicy::default())
    }

    #[tokio::test]
    async fn success_captures_capability_output() {
        let executor = executor_with(vec![(
            ToolSchema::new("shout", "Uppercase").required(
                "text",
                ParamType::String,
                "Input text",
            ),
            Arc::new(Shout),
        )]);

        let result = executor
            .execute(&request("call-1", "shout", json!({"text": "hi"})))
            .await;
        assert!(result.is_success());
        assert_eq!(result.payload, "HI");
        assert_eq!(result.tool_call_id, "call-1");
    }

    #[tokio::test]
    async fn unknown_tool_returns_error_result() {
        let executor = executor_with(Vec::new());
        let result = executor
            .execute(&request("call-1", "bogus", json!({})))
            .await;
        assert!(!result.is_success());
        let message = result.error_message.expect("error message");
        assert!(message.contains("unknown tool"));
        assert!(message.contains("bogus"));
    }

    #[tokio::test]
    async fn schema_violation_skips_the_capability() {
        let invoked = Arc::new(AtomicBool::new(false));
        let executor = executor_with(vec![(
            ToolSchema::new("tracked", "Tracked").required("path", ParamType::String, "Path"),
            Arc::new(Tracked {
                invoked: invoked.clone(),
            }),
        )]);

        let result = executor
            .execute(&request("call-1", "tracked", json!({})))
            .await;
        assert!(!result.is_success());
        assert!(result.error_message.expect("message").contains("path"));
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn invalid_directive_is_answered_without_lookup() {
        let executor = executor_with(Vec::new());
        let mut bad = request("call-7", "", json!(null));
        bad.invalid = Some("missing tool name".to_string());

        let result = executor.execute(&bad).await;
        assert!(!result.is_success());
        assert!(result
            .error_message
            .expect("message")
            .contains("malformed tool directive"));
        assert_eq!(result.tool_call_id, "call-7");
    }

    #[tokio::test(start_paused = true)]
    async fn capability_overrunning_the_budget_times_out() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolSchema::new("slow", "Sleeps"),
                Arc::new(Sleeper {
                    millis: 120_000,
                    label: "slow",
                }),
            )
            .expect("register");
        let executor = ToolExecutor::new(
            Arc::new(registry),
            ExecutionPolicy {
                timeout: Duration::from_secs(1),
            },
        );

        let result = executor.execute(&request("call-1", "slow", json!({}))).await;
        assert!(!result.is_success());
        assert!(result.error_message.expect("message").contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn results_come_back_in_request_order() {
        let executor = executor_with(vec![
            (
                ToolSchema::new("slow", "Sleeps long"),
                Arc::new(Sleeper {
                    millis: 50,
                    label: "slow",
                }),
            ),
            (
                ToolSchema::new("fast", "Sleeps briefly"),
                Arc::new(Sleeper {
                    millis: 5,
                    label: "fast",
                }),
            ),
        ]);

        let requests = vec![
            request("call-1", "slow", json!({})),
            request("call-2", "fast", json!({})),
        ];
        let results = executor.execute_all(&requests).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tool_call_id, "call-1");
        assert_eq!(results[0].payload, "slow");
        assert_eq!(results[1].tool_call_id, "call-2");
        assert_eq!(results[1].payload, "fast");
    }
}
