//! Agent descriptors and their construction.
//!
//! - `config`: static or context-derived instructions and tools
//! - `runtime`: the [`Agent`] that implements `AgentHandle`
//! - `builder`: fluent [`AgentBuilder`]

pub mod builder;
pub mod config;
pub mod runtime;

pub use builder::AgentBuilder;
pub use config::{Instructions, ToolSet};
pub use runtime::Agent;
