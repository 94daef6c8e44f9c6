use super::schema::ToolSchema;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Failure raised by a capability. The executor converts it into an error
/// result; it never crosses the execute boundary as an `Err`.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CapabilityError(String);

impl CapabilityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<std::io::Error> for CapabilityError {
    fn from(source: std::io::Error) -> Self {
        Self(source.to_string())
    }
}

impl From<serde_json::Error> for CapabilityError {
    fn from(source: serde_json::Error) -> Self {
        Self(source.to_string())
    }
}

/// An executable tool body. Receives arguments already validated against the
/// registered schema and returns the text payload fed back to the model.
#[async_trait]
pub trait ToolCapability: Send + Sync {
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<String, CapabilityError>;
}

pub struct RegisteredTool {
    pub schema: ToolSchema,
    pub capability: Arc<dyn ToolCapability>,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
}

/// Name → (schema, capability) table. Populated during startup, read-only
/// afterwards; lookups are by case-insensitive name.
#[derive(Default)]
pub struct ToolRegistry {
    entries: HashMap<String, RegisteredTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        schema: ToolSchema,
        capability: Arc<dyn ToolCapability>,
    ) -> Result<(), RegistryError> {
        let key = schema.name.to_lowercase();
        if self.entries.contains_key(&key) {
            return Err(RegistryError::DuplicateTool(schema.name.clone()));
        }
        self.order.push(key.clone());
        self.entries.insert(key, RegisteredTool { schema, capability });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&RegisteredTool, RegistryError> {
        self.entries
            .get(&name.to_lowercase())
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    /// Schemas in registration order, for the model-facing tool catalogue.
    pub fn schemas(&self) -> Vec<&ToolSchema> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key))
            .map(|entry| &entry.schema)
            .collect()
    }

}
