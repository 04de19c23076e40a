//! Handoff control signals and the reserved tool that produces them.
//!
//! A handoff is requested by an agent calling the reserved [`HANDOFF_TOOL_NAME`]
//! tool. The tool's output is the [`HandoffSignal`]; the stream multiplexer
//! swallows every chunk that belongs to this tool so the signal never reaches
//! the consumer.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::AgentHandle;
use crate::context::ExecutionContext;
use crate::messaging::AgentMessage;
use crate::prompts::HANDOFF_TOOL_DESCRIPTION;
use crate::tools::{Tool, ToolContext, ToolParameterSchema, ToolSchema};

/// Reserved tool name. Chunks tied to it are internal control-plane traffic.
pub const HANDOFF_TOOL_NAME: &str = "handoff_to_agent";

/// Instruction to transfer the turn to another agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HandoffSignal {
    pub target_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Optional payload for the target agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl HandoffSignal {
    pub fn new(target_agent: impl Into<String>) -> Self {
        Self {
            target_agent: target_agent.into(),
            reason: None,
            context: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Parses the handoff tool's output. Accepts `targetAgent` or the shorter `agent` key.
    pub fn from_output(output: &Value) -> Option<Self> {
        let target = output
            .get("targetAgent")
            .or_else(|| output.get("agent"))
            .and_then(Value::as_str)?;
        if target.trim().is_empty() {
            return None;
        }
        Some(Self {
            target_agent: target.to_string(),
            reason: output
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string),
            context: output.get("context").filter(|v| !v.is_null()).cloned(),
        })
    }
}

/// How an agent was selected for the turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategy {
    Explicit,
    ToolChoice,
    Programmatic,
    /// The executing agent requested the switch through the handoff tool.
    Llm,
}

impl RoutingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStrategy::Explicit => "explicit",
            RoutingStrategy::ToolChoice => "tool-choice",
            RoutingStrategy::Programmatic => "programmatic",
            RoutingStrategy::Llm => "llm",
        }
    }
}

/// History passed through a handoff input filter.
#[derive(Debug, Clone)]
pub struct HandoffInputData {
    /// Conversation as it stood when the turn began.
    pub input_history: Vec<AgentMessage>,
    /// Finalized messages added during the turn before the handing-off round.
    pub pre_handoff_items: Vec<AgentMessage>,
    /// Items produced by the handing-off round.
    pub new_items: Vec<AgentMessage>,
    pub run_context: ExecutionContext,
}

impl HandoffInputData {
    /// Flattens the three segments into the conversation the target agent sees.
    pub fn into_messages(self) -> Vec<AgentMessage> {
        let mut messages = self.input_history;
        messages.extend(self.pre_handoff_items);
        messages.extend(self.new_items);
        messages
    }
}

pub type HandoffInputFilter =
    Arc<dyn Fn(HandoffInputData) -> anyhow::Result<HandoffInputData> + Send + Sync>;

pub type OnHandoffCallback =
    Arc<dyn Fn(&HandoffSignal, &ExecutionContext) -> anyhow::Result<()> + Send + Sync>;

/// A declared handoff target with its optional transfer hooks.
#[derive(Clone)]
pub struct Handoff {
    pub agent: Arc<dyn AgentHandle>,
    pub input_filter: Option<HandoffInputFilter>,
    pub on_handoff: Option<OnHandoffCallback>,
}

impl Handoff {
    pub fn new(agent: Arc<dyn AgentHandle>) -> Self {
        Self {
            agent,
            input_filter: None,
            on_handoff: None,
        }
    }

    pub fn with_input_filter(mut self, filter: HandoffInputFilter) -> Self {
        self.input_filter = Some(filter);
        self
    }

    pub fn with_on_handoff(mut self, callback: OnHandoffCallback) -> Self {
        self.on_handoff = Some(callback);
        self
    }

    pub fn name(&self) -> &str {
        self.agent.name()
    }
}

impl fmt::Debug for Handoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handoff")
            .field("agent", &self.agent.name())
            .field("input_filter", &self.input_filter.is_some())
            .field("on_handoff", &self.on_handoff.is_some())
            .finish()
    }
}

/// Tool exposed to agents that own handoffs. Its output is the handoff signal.
pub struct HandoffTool {
    targets: Vec<(String, Option<String>)>,
}

impl HandoffTool {
    pub fn new(handoffs: &[Handoff]) -> Self {
        Self {
            targets: handoffs
                .iter()
                .map(|h| {
                    (
                        h.agent.name().to_string(),
                        h.agent.descriptor().description.clone(),
                    )
                })
                .collect(),
        }
    }

    fn target_names(&self) -> Vec<&str> {
        self.targets.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn target_listing(&self) -> String {
        self.targets
            .iter()
            .map(|(name, description)| match description {
                Some(description) => format!("- {name}: {description}"),
                None => format!("- {name}"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandoffArgs {
    #[serde(alias = "agent")]
    target_agent: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    context: Option<Value>,
}

#[async_trait]
impl Tool for HandoffTool {
    fn schema(&self) -> ToolSchema {
        let mut target = ToolParameterSchema::string("Name of the agent to transfer the turn to");
        target.enum_values = Some(
            self.target_names()
                .into_iter()
                .map(|n| Value::String(n.to_string()))
                .collect(),
        );
        ToolSchema::new(
            HANDOFF_TOOL_NAME,
            HANDOFF_TOOL_DESCRIPTION.replace("{agents}", &self.target_listing()),
            ToolParameterSchema::object(
                "Handoff request",
                [
                    ("targetAgent".to_string(), target),
                    (
                        "reason".to_string(),
                        ToolParameterSchema::string("Why the other agent is better suited"),
                    ),
                    (
                        "context".to_string(),
                        ToolParameterSchema::string("Anything the target agent needs to know"),
                    ),
                ]
                .into_iter()
                .collect(),
                vec!["targetAgent".to_string()],
            ),
        )
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<Value> {
        let args: HandoffArgs = serde_json::from_value(args)?;
        if !self.target_names().contains(&args.target_agent.as_str()) {
            anyhow::bail!(
                "Unknown agent '{}'. Available: {:?}",
                args.target_agent,
                self.target_names()
            );
        }
        tracing::debug!(
            from = ?ctx.context.metadata.agent,
            to = %args.target_agent,
            "handoff requested"
        );
        let signal = HandoffSignal {
            target_agent: args.target_agent,
            reason: args.reason,
            context: args.context,
        };
        Ok(serde_json::to_value(signal)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_signal_from_tool_output() {
        let signal = HandoffSignal::from_output(&json!({
            "targetAgent": "history",
            "reason": "question is about history"
        }))
        .unwrap();
        assert_eq!(signal.target_agent, "history");
        assert_eq!(signal.reason.as_deref(), Some("question is about history"));

        let short = HandoffSignal::from_output(&json!({"agent": "math"})).unwrap();
        assert_eq!(short.target_agent, "math");
    }

    #[test]
    fn rejects_output_without_target() {
        assert!(HandoffSignal::from_output(&json!({"reason": "x"})).is_none());
        assert!(HandoffSignal::from_output(&json!({"targetAgent": "  "})).is_none());
        assert!(HandoffSignal::from_output(&json!("history")).is_none());
    }

    #[test]
    fn input_data_flattens_in_order() {
        let data = HandoffInputData {
            input_history: vec![AgentMessage::user("q")],
            pre_handoff_items: vec![AgentMessage::assistant("a1")],
            new_items: vec![AgentMessage::system("tools")],
            run_context: ExecutionContext::default(),
        };
        let texts: Vec<String> = data.into_messages().iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["q", "a1", "tools"]);
    }
}
