//! # Relay SDK
//!
//! Multi-agent handoff orchestration for Rust. An orchestrator agent declares
//! specialist agents it may hand a conversation to; one call to [`run_turn`]
//! picks the starting specialist, follows handoffs requested by the agents
//! themselves and returns a single stream of UI chunks.
//!
//! ```toml
//! [dependencies]
//! relay-sdk = "0.1"
//! ```
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use futures::StreamExt;
//! use relay_sdk::prelude::*;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl LanguageModel for Echo {
//!     async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
//!         let last = request.messages.last().map(|m| m.text()).unwrap_or_default();
//!         Ok(LlmResponse {
//!             message: AgentMessage::assistant(format!("echo: {last}")),
//!         })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let model: Arc<dyn LanguageModel> = Arc::new(Echo);
//!
//!     let math = AgentBuilder::new("math", "You are a patient math tutor.")
//!         .with_description("Arithmetic and algebra")
//!         .with_model(model.clone())
//!         .match_on(MatchPattern::regex(r"\d+\s*[+*/-]\s*\d+")?)
//!         .build()?;
//!
//!     let triage = AgentBuilder::new("triage", "Answer briefly or hand off.")
//!         .with_model(model)
//!         .with_handoff(Handoff::new(Arc::new(math)))
//!         .build()?;
//!
//!     let turn = run_turn(Arc::new(triage), RunOptions::text("what is 6 * 7?"))?;
//!     let mut chunks = turn.chunks;
//!     while let Some(chunk) = chunks.next().await {
//!         println!("{}", serde_json::to_string(&chunk)?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Memory (history, working memory, chat titles and follow-up suggestions)
//! is configured on the orchestrator with [`MemoryConfig`].

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use relay_core::{
    agent, context, error, events, guardrails, handoff, llm, memory, messaging, security, stream,
    tools,
};
pub use relay_core::{
    AgentEvent, AgentHandle, AgentMessage, AgentStatus, EventBroadcaster, EventDispatcher,
    ExecutionContext, FnGuardrail, Guardrail, GuardrailVerdict, Handoff, HandoffInputData,
    HandoffSignal, InMemoryMemoryProvider, LanguageModel, LlmRequest, LlmResponse, MatchPattern,
    MemoryConfig, MemoryProvider, RelayError, RoutingStrategy, ToolBuilder, UiChunk,
    HANDOFF_TOOL_NAME,
};
pub use relay_runtime::{
    collect_turn, filters, run_turn, Agent, AgentBuilder, Instructions, RoutingMode, RunOptions,
    ToolSet, TurnCompletion, TurnOutput, TurnReport, TurnStream, TurnSummary,
};

/// Runtime internals for callers that drive pieces of a turn themselves.
pub mod runtime {
    pub use relay_runtime::{
        agent, auxiliary, config, driver, handoff, memory, multiplexer, prompts, routing,
    };
}

/// Prelude module for common imports
///
/// ```rust
/// use relay_sdk::prelude::*;
/// ```
pub mod prelude {
    pub use relay_core::{
        AgentHandle, AgentMessage, ExecutionContext, GuardrailVerdict, Handoff, HistoryConfig,
        InMemoryMemoryProvider, LanguageModel, LlmRequest, LlmResponse, MatchPattern, MemoryConfig,
        TitleConfig, ToolBuilder, UiChunk, WorkingMemoryConfig,
    };
    pub use relay_runtime::{run_turn, AgentBuilder, RoutingMode, RunOptions};
}
