use crate::application::tooling::registry::{CapabilityError, ToolCapability};
use crate::application::tooling::schema::{ParamType, ToolSchema};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const DEFAULT_SEARCH_CONTEXT: usize = 2;

/// Read-side filesystem tool with three modes: line-ranged file reads,
/// directory listings, and case-insensitive substring search.
pub struct FsRead;

impl FsRead {
    pub fn schema() -> ToolSchema {
        ToolSchema::new("fs_read", "Read a file, list a directory, or search inside a file")
            .required("path", ParamType::String, "Path to the file or directory")
            .required(
                "mode",
                ParamType::String,
                "One of Line, Directory, or Search",
            )
            .optional(
                "start_line",
                ParamType::Integer,
                "First line, 1-based; negative counts from the end (Line mode)",
            )
            .optional(
                "end_line",
                ParamType::Integer,
                "Last line, 1-based; 0 or absent reads to the end (Line mode)",
            )
            .optional(
                "pattern",
                ParamType::String,
                "Substring to search for, case-insensitive (Search mode)",
            )
            .optional(
                "context_lines",
                ParamType::Integer,
                "Context lines around each match (Search mode)",
            )
    }
}

#[derive(Debug, Deserialize)]
struct FsReadArgs {
    path: String,
    mode: String,
    start_line: Option<i64>,
    end_line: Option<i64>,
    pattern: Option<String>,
    context_lines: Option<u64>,
}

#[async_trait]
impl ToolCapability for FsRead {
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<String, CapabilityError> {
        let args: FsReadArgs = serde_json::from_value(Value::Object(arguments))?;
        match args.mode.as_str() {
            "Line" => {
                read_lines(
                    &args.path,
                    args.start_line.unwrap_or(1),
                    args.end_line.unwrap_or(0),
                )
                .await
            }
            "Directory" => list_directory(&args.path).await,
            "Search" => {
                let pattern = args.pattern.as_deref().unwrap_or_default();
                search_file(
                    &args.path,
                    pattern,
                    args.context_lines
                        .map(|n| n as usize)
                        .unwrap_or(DEFAULT_SEARCH_CONTEXT),
                )
                .await
            }
            other => Err(CapabilityError::new(format!(
                "invalid fs_read mode '{other}', expected Line, Directory, or Search"
            ))),
        }
    }
}

async fn read_lines(path: &str, start_line: i64, end_line: i64) -> Result<String, CapabilityError> {
    let path = Path::new(path);
    if !path.is_file() {
        return Err(CapabilityError::new(format!(
            "file not found: {}",
            path.display()
        )));
    }

    let content = tokio::fs::read_to_string(path).await?;
    let lines: Vec<&str> = content.lines().collect();
    let line_count = lines.len();

    let start = if start_line < 0 {
        line_count.saturating_sub(start_line.unsigned_abs() as usize)
    } else {
        (start_line.max(1) as usize) - 1
    };

    let end = if end_line < 0 {
        line_count.saturating_sub(end_line.unsigned_abs() as usize - 1)
    } else if end_line == 0 {
        line_count
    } else {
        (end_line as usize).min(line_count)
    };

    if start >= line_count {
        return Err(CapabilityError::new(format!(
            "starting line {start_line} is outside of the allowed range (1 to {line_count})"
        )));
    }

    let end = end.max(start);
    Ok(lines[start..end].join("\n"))
}

async fn list_directory(path: &str) -> Result<String, CapabilityError> {
    let path = Path::new(path);
    if !path.is_dir() {
        return Err(CapabilityError::new(format!(
            "directory not found: {}",
            path.display()
        )));
    }

    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(path).await?;
    while let Some(entry) = reader.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        entries.push((entry.file_name().to_string_lossy().to_string(), metadata));
    }

    // Directories first, then alphabetical.
    entries.sort_by(|(a_name, a_meta), (b_name, b_meta)| {
        b_meta
            .is_dir()
            .cmp(&a_meta.is_dir())
            .then_with(|| a_name.cmp(b_name))
    });

    let mut result = String::new();
    result.push_str("Type Permissions     Size  Modified          Name\n");
    result.push_str("---- ----------- -------- ----------------- ----------------\n");

    for (name, metadata) in entries {
        let file_type = if metadata.is_dir() {
            "dir "
        } else if metadata.is_file() {
            "file"
        } else {
            "link"
        };
        let permissions = if metadata.permissions().readonly() {
            "r--"
        } else {
            "rw-"
        };
        let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());
        let modified_secs = modified
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let timestamp = DateTime::<Utc>::from_timestamp(modified_secs as i64, 0)
            .unwrap_or_default()
            .format("%Y-%m-%d %H:%M")
            .to_string();
        let display_name = if metadata.is_dir() {
            format!("{name}/")
        } else {
            name
        };
        result.push_str(&format!(
            "{file_type} {permissions:11} {:8} {timestamp} {display_name}\n",
            metadata.len()
        ));
    }

    Ok(result)
}

async fn search_file(path: &str, pattern: &str, context: usize) -> Result<String, CapabilityError> {
    let path = Path::new(path);
    if !path.is_file() {
        return Err(CapabilityError::new(format!(
            "file not found: {}",
            path.display()
        )));
    }
    if pattern.is_empty() {
        return Err(CapabilityError::new("search pattern cannot be empty"));
    }

    let content = tokio::fs::read_to_string(path).await?;
    let lines: Vec<&str> = content.lines().collect();
    let pattern_lower = pattern.to_lowercase();

    let mut body = String::new();
    let mut matches_found = 0;

    for (line_num, line) in lines.iter().enumerate() {
        if !line.to_lowercase().contains(&pattern_lower) {
            continue;
        }
        matches_found += 1;
        if matches_found > 1 {
            body.push_str("\n--\n");
        }

        let start = line_num.saturating_sub(context);
        let end = (line_num + context + 1).min(lines.len());
        for i in start..end {
            let prefix = if i == line_num { "> " } else { "  " };
            body.push_str(&format!("{prefix}{}: {}\n", i + 1, lines[i]));
        }
    }

    if matches_found == 0 {
        Ok(format!(
            "Pattern '{pattern}' not found in {}",
            path.display()
        ))
    } else {
        Ok(format!(
            "Found {matches_found} matches for pattern '{pattern}' in {}:\n\n{body}",
            path.display()
        ))
    }
}
