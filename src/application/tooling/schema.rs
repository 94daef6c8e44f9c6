use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Boolean,
}

impl ParamType {
    pub fn name(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

/// Declared shape of a tool's arguments. Registered once at startup and
/// immutable afterwards.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

#[derive(Debug, Error)]
pub enum SchemaViolation {
    #[error("tool '{tool}' expects a JSON object as arguments")]
    NotAnObject { tool: String },
    #[error("tool '{tool}' is missing required field '{field}'")]
    MissingField { tool: String, field: String },
    #[error("tool '{tool}' field '{field}' must be of type {expected}")]
    InvalidType {
        tool: String,
        field: String,
        expected: &'static str,
    },
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn required(
        mut self,
        name: impl Into<String>,
        kind: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        });
        self
    }

    pub fn optional(
        mut self,
        name: impl Into<String>,
        kind: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
        });
        self
    }

    /// Checks required fields and declared types. Undeclared extra fields are
    /// tolerated; the capability decides what to do with them.
    pub fn validate(&self, arguments: &Value) -> Result<(), SchemaViolation> {
        let empty = Map::new();
        let map = match arguments {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => {
                return Err(SchemaViolation::NotAnObject {
                    tool: self.name.clone(),
                })
            }
        };

        for param in &self.params {
            match map.get(&param.name) {
                None | Some(Value::Null) => {
                    if param.required {
                        return Err(SchemaViolation::MissingField {
                            tool: self.name.clone(),
                            field: param.name.clone(),
                        });
                    }
                }
                Some(value) => {
                    if !param.kind.matches(value) {
                        return Err(SchemaViolation::InvalidType {
                            tool: self.name.clone(),
                            field: param.name.clone(),
                            expected: param.kind.name(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// JSON declaration surfaced to the model inside the tool catalogue.
    pub fn declaration(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            properties.insert(
                param.name.clone(),
                json!({
                    "type": param.kind.name(),
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        json!({
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        })
    }
}
