use crate::application::tooling::registry::{CapabilityError, ToolCapability};
use crate::application::tooling::schema::{ParamType, ToolSchema};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::process::Command;
use tracing::debug;

/// Runs a command under `bash -c` and feeds the combined output back to the
/// model. The working directory and environment are inherited from the host
/// process that registered the tool.
pub struct ExecuteBash;

impl ExecuteBash {
    pub fn schema() -> ToolSchema {
        ToolSchema::new("execute_bash", "Execute a bash command").required(
            "command",
            ParamType::String,
            "The bash command to execute",
        )
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteBashArgs {
    command: String,
}

#[async_trait]
impl ToolCapability for ExecuteBash {
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<String, CapabilityError> {
        let args: ExecuteBashArgs = serde_json::from_value(Value::Object(arguments))?;
        run_bash(&args.command).await
    }
}

/// Shared with the REPL's `!command` escape.
pub(crate) async fn run_bash(command: &str) -> Result<String, CapabilityError> {
    if command.trim().is_empty() {
        return Err(CapabilityError::new("command cannot be empty"));
    }

    debug!(%command, "Executing bash command");
    // The shell must not outlive a dropped invocation (executor timeout).
    let output = Command::new("bash")
        .arg("-c")
        .arg(command)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| CapabilityError::new(format!("failed to spawn bash: {e}")))?;

    let mut result = String::new();
    if !output.stdout.is_empty() {
        result.push_str(&String::from_utf8_lossy(&output.stdout));
    }

    if !output.stderr.is_empty() {
        if !result.is_empty() && !result.ends_with('\n') {
            result.push('\n');
        }
        if !output.status.success() {
            result.push_str("Error: ");
        }
        result.push_str(&String::from_utf8_lossy(&output.stderr));
    }

    if !output.status.success() && result.is_empty() {
        result = format!("Command failed with exit code: {}", output.status);
    }

    if !result.is_empty() && !result.ends_with('\n') {
        result.push('\n');
    }

    Ok(result)
}
