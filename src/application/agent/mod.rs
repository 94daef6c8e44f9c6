//! The agent loop and its directive extraction layer.

mod context;
mod errors;
mod extractor;
mod models;
mod runner;

pub use context::HostContext;
pub use errors::AgentError;
pub use extractor::{
    directive_format, DirectiveFormat, Extraction, JsonDirectiveFormat, ParsedCall,
    XmlDirectiveFormat,
};
pub use models::{AgentOptions, AgentReply, StepReport, Termination};
pub use runner::Agent;

#[cfg(test)]
mod tests;
