use crate::application::tooling::registry::{CapabilityError, ToolCapability};
use crate::application::tooling::schema::{ParamType, ToolSchema};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

/// Write-side filesystem tool: create, string-replace, append, or insert.
pub struct FsWrite;

impl FsWrite {
    pub fn schema() -> ToolSchema {
        ToolSchema::new("fs_write", "Create or modify a file")
            .required("path", ParamType::String, "Path to the file")
            .required(
                "command",
                ParamType::String,
                "One of create, str_replace, append, or insert",
            )
            .optional(
                "file_text",
                ParamType::String,
                "Full file content (create command)",
            )
            .optional(
                "old_str",
                ParamType::String,
                "Exact string to replace (str_replace command)",
            )
            .optional(
                "new_str",
                ParamType::String,
                "Replacement or added content (str_replace, append, insert commands)",
            )
            .optional(
                "insert_line",
                ParamType::Integer,
                "Line to insert after, 1-based (insert command)",
            )
    }
}

#[derive(Debug, Deserialize)]
struct FsWriteArgs {
    path: String,
    command: String,
    file_text: Option<String>,
    old_str: Option<String>,
    new_str: Option<String>,
    insert_line: Option<u64>,
}

#[async_trait]
impl ToolCapability for FsWrite {
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<String, CapabilityError> {
        let args: FsWriteArgs = serde_json::from_value(Value::Object(arguments))?;
        match args.command.as_str() {
            "create" => create_file(&args.path, args.file_text.as_deref().unwrap_or_default()).await,
            "str_replace" => {
                replace_in_file(
                    &args.path,
                    args.old_str.as_deref().unwrap_or_default(),
                    args.new_str.as_deref().unwrap_or_default(),
                )
                .await
            }
            "append" => append_to_file(&args.path, args.new_str.as_deref().unwrap_or_default()).await,
            "insert" => {
                insert_in_file(
                    &args.path,
                    args.insert_line.unwrap_or(0) as usize,
                    args.new_str.as_deref().unwrap_or_default(),
                )
                .await
            }
            other => Err(CapabilityError::new(format!(
                "invalid fs_write command '{other}', expected create, str_replace, append, or insert"
            ))),
        }
    }
}

async fn create_file(path: &str, content: &str) -> Result<String, CapabilityError> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CapabilityError::new(format!(
                    "failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }

    tokio::fs::write(path, content)
        .await
        .map_err(|e| CapabilityError::new(format!("failed to write {}: {e}", path.display())))?;
    Ok(format!("File created successfully: {}", path.display()))
}

async fn replace_in_file(path: &str, old_str: &str, new_str: &str) -> Result<String, CapabilityError> {
    let path = Path::new(path);
    let content = read_existing(path).await?;

    if !content.contains(old_str) {
        return Err(CapabilityError::new(format!(
            "string not found in file: {old_str}"
        )));
    }

    let new_content = content.replace(old_str, new_str);
    tokio::fs::write(path, new_content)
        .await
        .map_err(|e| CapabilityError::new(format!("failed to write {}: {e}", path.display())))?;
    Ok(format!("String replaced successfully in {}", path.display()))
}

async fn append_to_file(path: &str, content: &str) -> Result<String, CapabilityError> {
    let path = Path::new(path);
    let mut current = read_existing(path).await?;

    if !current.is_empty() && !current.ends_with('\n') {
        current.push('\n');
    }
    current.push_str(content);
    if !current.ends_with('\n') {
        current.push('\n');
    }

    tokio::fs::write(path, current)
        .await
        .map_err(|e| CapabilityError::new(format!("failed to write {}: {e}", path.display())))?;
    Ok(format!("Content appended successfully to {}", path.display()))
}

async fn insert_in_file(
    path: &str,
    line_number: usize,
    content: &str,
) -> Result<String, CapabilityError> {
    let path = Path::new(path);
    let file_content = read_existing(path).await?;
    let lines: Vec<&str> = file_content.lines().collect();

    if line_number > lines.len() {
        return Err(CapabilityError::new(format!(
            "line number {line_number} is out of range (file has {} lines)",
            lines.len()
        )));
    }

    let mut new_lines: Vec<&str> = Vec::with_capacity(lines.len() + 1);
    if line_number == 0 {
        new_lines.push(content);
    }
    for (i, line) in lines.iter().enumerate() {
        new_lines.push(line);
        if i + 1 == line_number {
            new_lines.push(content);
        }
    }

    tokio::fs::write(path, new_lines.join("\n"))
        .await
        .map_err(|e| CapabilityError::new(format!("failed to write {}: {e}", path.display())))?;
    Ok(format!(
        "Content inserted successfully at line {line_number} in {}",
        path.display()
    ))
}

async fn read_existing(path: &Path) -> Result<String, CapabilityError> {
    if !path.is_file() {
        return Err(CapabilityError::new(format!(
            "file not found: {}",
            path.display()
        )));
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CapabilityError::new(format!("failed to read {}: {e}", path.display())))
}
