//! Directive extraction: turning raw model output into structured tool calls.
//!
//! The directive syntax is provider-defined, so it lives behind the
//! [`DirectiveFormat`] trait. Swapping formats swaps the extractor, the
//! catalogue guidance, and the transcript rendering together; the agent loop
//! itself never sees directive syntax.

use crate::application::tooling::ToolSchema;
use crate::config::DirectiveKind;
use crate::domain::types::{ToolCallRequest, ToolResult};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// One directive as parsed out of model output, before an id is assigned.
/// A malformed directive keeps whatever fields were readable and records the
/// reason in `malformed`; it still travels downstream so the model gets an
/// answer for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCall {
    pub name: String,
    pub arguments: Value,
    pub malformed: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub plain_text: String,
    pub calls: Vec<ParsedCall>,
}

/// A provider-defined directive syntax. Implementations must be pure: no
/// I/O, and identical input text always yields identical extractions.
pub trait DirectiveFormat: Send + Sync {
    fn extract(&self, raw: &str) -> Extraction;

    /// Instructions and tool catalogue injected into the system prompt.
    fn tool_guidance(&self, schemas: &[&ToolSchema]) -> String;

    /// Re-renders a call when the transcript is serialized back to the model.
    fn render_tool_call(&self, call: &ToolCallRequest) -> String;

    /// Renders a result into the content of the answering tool turn.
    fn render_tool_result(&self, result: &ToolResult) -> String;
}

pub fn directive_format(kind: DirectiveKind) -> Arc<dyn DirectiveFormat> {
    match kind {
        DirectiveKind::Json => Arc::new(JsonDirectiveFormat),
        DirectiveKind::Xml => Arc::new(XmlDirectiveFormat::new()),
    }
}

/// Default format: directives are JSON objects of the shape
/// `{"tool_call": {"name": "...", "arguments": {...}}}`, embedded anywhere in
/// the output, optionally inside a ``` fence.
pub struct JsonDirectiveFormat;

impl DirectiveFormat for JsonDirectiveFormat {
    fn extract(&self, raw: &str) -> Extraction {
        let mut calls = Vec::new();
        let mut directive_spans = Vec::new();

        for (start, end) in object_spans(raw) {
            let Ok(value) = serde_json::from_str::<Value>(&raw[start..end]) else {
                continue;
            };
            let Some(directive) = value.get("tool_call") else {
                continue;
            };
            calls.push(parse_directive(directive));
            directive_spans.push((start, end));
        }

        Extraction {
            plain_text: strip_spans(raw, &directive_spans),
            calls,
        }
    }

    fn tool_guidance(&self, schemas: &[&ToolSchema]) -> String {
        let mut lines = vec![
            "You can act on the user's machine by calling tools.".to_string(),
            "To call a tool, emit a JSON object on its own line: {\"tool_call\":{\"name\":\"tool_name\",\"arguments\":{...}}}."
                .to_string(),
            "You may emit several tool_call objects in one reply; every call is answered with a tool_result object before you continue."
                .to_string(),
            "When no tool is needed, answer in plain text without any tool_call object.".to_string(),
        ];

        if schemas.is_empty() {
            lines.push("No tools are currently available.".to_string());
        } else {
            lines.push("Available tools:".to_string());
            for schema in schemas {
                let compact = serde_json::to_string(&schema.declaration()).unwrap_or_default();
                lines.push(format!("- {}: {}. Declaration: {}", schema.name, schema.description, compact));
            }
        }

        lines.join(" ")
    }

    fn render_tool_call(&self, call: &ToolCallRequest) -> String {
        json!({
            "tool_call": {
                "name": call.name,
                "arguments": call.arguments,
            }
        })
        .to_string()
    }

    fn render_tool_result(&self, result: &ToolResult) -> String {
        json!({ "tool_result": result }).to_string()
    }
}

fn parse_directive(directive: &Value) -> ParsedCall {
    let Some(map) = directive.as_object() else {
        return ParsedCall {
            name: String::new(),
            arguments: Value::Null,
            malformed: Some("tool_call must be a JSON object".to_string()),
        };
    };

    let name = map
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let arguments = map.get("arguments").cloned().unwrap_or_else(|| json!({}));

    let malformed = if name.is_empty() {
        Some("missing tool name".to_string())
    } else if !arguments.is_object() && !arguments.is_null() {
        Some("arguments must be a JSON object".to_string())
    } else {
        None
    };

    ParsedCall {
        name,
        arguments,
        malformed,
    }
}

/// Byte spans of balanced top-level `{...}` candidates, string-aware.
fn object_spans(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = balanced_end(text, i) {
                spans.push((i, end));
                i = end;
                continue;
            }
        }
        i += 1;
    }
    spans
}

fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Removes directive spans from the text, together with any code-fence
/// markers that immediately wrapped them.
fn strip_spans(text: &str, spans: &[(usize, usize)]) -> String {
    let mut out = String::new();
    let mut cursor = 0;
    for &(start, end) in spans {
        let start = fence_before(text, start);
        let end = fence_after(text, end);
        if start > cursor {
            out.push_str(&text[cursor..start]);
        }
        cursor = cursor.max(end);
    }
    out.push_str(&text[cursor..]);
    out.trim().to_string()
}

fn fence_before(text: &str, start: usize) -> usize {
    let head = text[..start].trim_end();
    for marker in ["```json", "```JSON", "```"] {
        if head.ends_with(marker) {
            return head.len() - marker.len();
        }
    }
    start
}

fn fence_after(text: &str, end: usize) -> usize {
    let tail = &text[end..];
    let skipped = tail.len() - tail.trim_start().len();
    if tail[skipped..].starts_with("```") {
        end + skipped + 3
    } else {
        end
    }
}

/// Alternative format: directives are XML blocks of the shape
/// `<tool_calls><invoke name="..."><parameter name="...">value</parameter>
/// </invoke></tool_calls>`.
pub struct XmlDirectiveFormat {
    block: Regex,
    invoke: Regex,
    invoke_open: Regex,
    param: Regex,
}

impl XmlDirectiveFormat {
    pub fn new() -> Self {
        Self {
            block: Regex::new(r"(?s)<tool_calls>(.*?)</tool_calls>").expect("hard-coded pattern"),
            invoke: Regex::new(r#"(?s)<invoke name="([^"]+)">(.*?)</invoke>"#)
                .expect("hard-coded pattern"),
            invoke_open: Regex::new(r"<invoke\b[^>]*>").expect("hard-coded pattern"),
            param: Regex::new(r#"(?s)<parameter name="([^"]+)">([^<]*)</parameter>"#)
                .expect("hard-coded pattern"),
        }
    }
}

impl Default for XmlDirectiveFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveFormat for XmlDirectiveFormat {
    fn extract(&self, raw: &str) -> Extraction {
        let mut calls = Vec::new();
        let mut plain = String::new();
        let mut cursor = 0;

        for captures in self.block.captures_iter(raw) {
            let Some(full) = captures.get(0) else { continue };
            let inner = captures.get(1).map(|m| m.as_str()).unwrap_or_default();

            plain.push_str(&raw[cursor..full.start()]);
            cursor = full.end();

            let mut parsed = 0;
            for invocation in self.invoke.captures_iter(inner) {
                parsed += 1;
                let name = unescape_xml(invocation.get(1).map(|m| m.as_str()).unwrap_or_default());
                let body = invocation.get(2).map(|m| m.as_str()).unwrap_or_default();

                let mut arguments = Map::new();
                for param in self.param.captures_iter(body) {
                    let key = param.get(1).map(|m| m.as_str()).unwrap_or_default();
                    let value = param.get(2).map(|m| m.as_str()).unwrap_or_default();
                    arguments.insert(unescape_xml(key), coerce_scalar(&unescape_xml(value)));
                }

                calls.push(ParsedCall {
                    name,
                    arguments: Value::Object(arguments),
                    malformed: None,
                });
            }

            // Invoke tags the regex could not read still deserve an answer.
            // Only count tag-shaped occurrences, not free text mentioning the
            // tag name.
            let attempted = self.invoke_open.find_iter(inner).count();
            for _ in parsed..attempted {
                calls.push(ParsedCall {
                    name: String::new(),
                    arguments: Value::Null,
                    malformed: Some("unparseable invoke element".to_string()),
                });
            }
        }

        plain.push_str(&raw[cursor..]);
        Extraction {
            plain_text: plain.trim().to_string(),
            calls,
        }
    }

    fn tool_guidance(&self, schemas: &[&ToolSchema]) -> String {
        let mut lines = vec![
            "You can act on the user's machine by calling tools.".to_string(),
            "To call a tool, emit a block of the form: <tool_calls><invoke name=\"tool_name\"><parameter name=\"param\">value</parameter></invoke></tool_calls>."
                .to_string(),
            "You may place several invoke elements in one block; every call is answered with a tool_result element before you continue."
                .to_string(),
            "When no tool is needed, answer in plain text without any tool_calls block.".to_string(),
        ];

        if schemas.is_empty() {
            lines.push("No tools are currently available.".to_string());
        } else {
            lines.push("Available tools:".to_string());
            for schema in schemas {
                let compact = serde_json::to_string(&schema.declaration()).unwrap_or_default();
                lines.push(format!("- {}: {}. Declaration: {}", schema.name, schema.description, compact));
            }
        }

        lines.join(" ")
    }

    fn render_tool_call(&self, call: &ToolCallRequest) -> String {
        let mut body = String::new();
        if let Some(map) = call.arguments.as_object() {
            for (key, value) in map {
                let rendered = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                body.push_str(&format!(
                    "<parameter name=\"{}\">{}</parameter>",
                    escape_xml(key),
                    escape_xml(&rendered)
                ));
            }
        }
        format!(
            "<tool_calls><invoke name=\"{}\">{body}</invoke></tool_calls>",
            escape_xml(&call.name)
        )
    }

    fn render_tool_result(&self, result: &ToolResult) -> String {
        let status = if result.is_success() { "success" } else { "error" };
        let content = result
            .error_message
            .as_deref()
            .unwrap_or(result.payload.as_str());
        format!(
            "<tool_result id=\"{}\" status=\"{status}\">{}</tool_result>",
            escape_xml(&result.tool_call_id),
            escape_xml(content)
        )
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape_xml(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

fn coerce_scalar(value: &str) -> Value {
    let trimmed = value.trim();
    if trimmed == "true" {
        return Value::Bool(true);
    }
    if trimmed == "false" {
        return Value::Bool(false);
    }
    if let Ok(number) = trimmed.parse::<i64>() {
        return Value::Number(number.into());
    }
    Value::String(value.to_string())
}
