pub mod builtin;
mod executor;
mod registry;
mod schema;

pub use executor::{ExecutionPolicy, ToolExecutor};
pub use registry::{CapabilityError, RegistryError, ToolCapability, ToolRegistry};
pub use schema::{ParamSpec, ParamType, SchemaViolation, ToolSchema};
