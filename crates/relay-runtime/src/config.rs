//! Per-turn run options.

use std::fmt;
use std::sync::Arc;

use relay_core::{AgentEvent, AgentMessage, EventDispatcher};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::driver::TurnSummary;

pub const DEFAULT_MAX_ROUNDS: usize = 5;
pub const DEFAULT_MAX_STEPS: usize = 5;
/// Conversation window for agents without handoffs.
pub const DEFAULT_LAST_MESSAGES: usize = 5;
/// Conversation window for agents that own handoffs.
pub const DEFAULT_LAST_MESSAGES_WITH_HANDOFFS: usize = 10;

/// Whether programmatic pattern matching may pick the starting agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    #[default]
    Auto,
    /// Only explicit and tool-choice routing apply; otherwise the orchestrator answers.
    Fixed,
}

pub type EventCallback = Arc<dyn Fn(&AgentEvent) + Send + Sync>;
pub type FinishCallback = Arc<dyn Fn(&TurnSummary) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

/// Inbound request for one turn.
#[derive(Clone)]
pub struct RunOptions {
    pub message: AgentMessage,
    pub strategy: RoutingMode,
    pub max_rounds: usize,
    pub max_steps: Option<usize>,
    /// Free-form context; `chatId` / `userId` keys are honored when the typed
    /// fields are unset.
    pub context: Value,
    pub chat_id: Option<String>,
    pub user_id: Option<String>,
    pub agent_choice: Option<String>,
    pub tool_choice: Option<String>,
    pub last_messages: Option<usize>,
    pub on_event: Option<EventCallback>,
    pub on_finish: Option<FinishCallback>,
    pub on_error: Option<ErrorCallback>,
    pub events: Option<EventDispatcher>,
}

impl RunOptions {
    pub fn new(message: AgentMessage) -> Self {
        Self {
            message,
            strategy: RoutingMode::Auto,
            max_rounds: DEFAULT_MAX_ROUNDS,
            max_steps: None,
            context: Value::Null,
            chat_id: None,
            user_id: None,
            agent_choice: None,
            tool_choice: None,
            last_messages: None,
            on_event: None,
            on_finish: None,
            on_error: None,
            events: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(AgentMessage::user(text))
    }

    pub fn with_strategy(mut self, strategy: RoutingMode) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_chat(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_agent_choice(mut self, agent: impl Into<String>) -> Self {
        self.agent_choice = Some(agent.into());
        self
    }

    pub fn with_tool_choice(mut self, tool: impl Into<String>) -> Self {
        self.tool_choice = Some(tool.into());
        self
    }

    pub fn with_last_messages(mut self, count: usize) -> Self {
        self.last_messages = Some(count);
        self
    }

    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        self.on_event = Some(Arc::new(f));
        self
    }

    pub fn on_finish<F>(mut self, f: F) -> Self
    where
        F: Fn(&TurnSummary) + Send + Sync + 'static,
    {
        self.on_finish = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&anyhow::Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn with_event_dispatcher(mut self, dispatcher: EventDispatcher) -> Self {
        self.events = Some(dispatcher);
        self
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("strategy", &self.strategy)
            .field("max_rounds", &self.max_rounds)
            .field("max_steps", &self.max_steps)
            .field("chat_id", &self.chat_id)
            .field("agent_choice", &self.agent_choice)
            .field("tool_choice", &self.tool_choice)
            .field("last_messages", &self.last_messages)
            .finish_non_exhaustive()
    }
}
