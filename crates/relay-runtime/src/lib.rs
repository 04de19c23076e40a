//! Tokio-powered runtime for multi-agent handoff turns.
//!
//! [`run_turn`] takes an orchestrator agent and one inbound message, picks the
//! starting specialist, drives rounds until no further handoff is requested and
//! returns a single UI chunk stream. Memory preload, persistence, chat titles
//! and follow-up suggestions hang off the orchestrator's memory configuration.

pub mod agent;
pub mod auxiliary;
pub mod config;
pub mod driver;
pub mod handoff;
pub mod memory;
pub mod multiplexer;
pub mod prompts;
pub mod routing;

#[cfg(test)]
mod testing;

pub use agent::{Agent, AgentBuilder, Instructions, ToolSet};
pub use config::{
    RoutingMode, RunOptions, DEFAULT_LAST_MESSAGES, DEFAULT_LAST_MESSAGES_WITH_HANDOFFS,
    DEFAULT_MAX_ROUNDS, DEFAULT_MAX_STEPS,
};
pub use driver::{
    collect_turn, run_turn, RunMetadata, TurnCompletion, TurnOutput, TurnReport, TurnState,
    TurnStream, TurnSummary,
};
pub use handoff::filters;
pub use memory::{PersistOutcome, UpdateWorkingMemoryTool, UPDATE_WORKING_MEMORY_TOOL_NAME};
pub use multiplexer::{is_internal_chunk, RoundOutcome, StreamFold};
pub use prompts::SystemPromptCache;
pub use routing::{select_starting_agent, RoutingDecision, RoutingOptions};
