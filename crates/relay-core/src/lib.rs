//! Core traits and shared data models for multi-agent handoff orchestration.
//! The runtime crate composes these; nothing here talks to a model provider
//! or a storage backend directly.

pub mod agent;
pub mod context;
pub mod error;
pub mod events;
pub mod guardrails;
pub mod handoff;
pub mod llm;
pub mod memory;
pub mod messaging;
pub mod prompts;
pub mod security;
pub mod stream;
pub mod tools;

pub use agent::{AgentDescriptor, AgentHandle, AgentRunRequest, MatchPattern};
pub use context::{ContextMetadata, ExecutionContext};
pub use error::{RelayError, RelayResult};
pub use events::{AgentEvent, EventBroadcaster, EventDispatcher};
pub use guardrails::{FnGuardrail, Guardrail, GuardrailVerdict, Guardrails};
pub use handoff::{
    Handoff, HandoffInputData, HandoffInputFilter, HandoffSignal, HandoffTool, OnHandoffCallback,
    RoutingStrategy, HANDOFF_TOOL_NAME,
};
pub use llm::{ChunkStream, LanguageModel, LlmRequest, LlmResponse, ToolChoice};
pub use memory::{
    ChatSession, ChatsConfig, HistoryConfig, InMemoryMemoryProvider, MemoryConfig, MemoryKey,
    MemoryProvider, MemoryScope, StoredMessage, SuggestionsConfig, TitleConfig, WorkingMemory,
    WorkingMemoryConfig,
};
pub use messaging::{AgentMessage, MessageContent, MessageMetadata, MessagePart, MessageRole};
pub use stream::{AgentStatus, ChunkWriter, HandoffNotice, UiChunk};
pub use tools::{
    Tool, ToolBox, ToolBuilder, ToolContext, ToolParameterSchema, ToolRegistry, ToolSchema,
};
