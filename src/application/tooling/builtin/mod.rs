//! Built-in local tools: shell execution and filesystem access.

mod execute_bash;
mod fs_read;
mod fs_write;

pub use execute_bash::ExecuteBash;
pub use fs_read::FsRead;
pub use fs_write::FsWrite;

pub(crate) use execute_bash::run_bash;

use super::registry::{RegistryError, ToolRegistry};
use std::sync::Arc;

/// Registers the standard tool set. Called once during startup.
pub fn register_builtin_tools(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(ExecuteBash::schema(), Arc::new(ExecuteBash))?;
    registry.register(FsRead::schema(), Arc::new(FsRead))?;
    registry.register(FsWrite::schema(), Arc::new(FsWrite))?;
    Ok(())
}
