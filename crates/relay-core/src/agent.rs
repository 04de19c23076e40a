use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::guardrails::Guardrails;
use crate::handoff::Handoff;
use crate::llm::{ChunkStream, ToolChoice};
use crate::memory::MemoryConfig;
use crate::messaging::AgentMessage;

/// Minimal metadata about an agent instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub description: Option<String>,
}

pub type MatchPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Pattern used by programmatic routing to claim a user message.
#[derive(Clone)]
pub enum MatchPattern {
    /// Case-insensitive substring.
    Text(String),
    Regex(Regex),
    Predicate(MatchPredicate),
}

impl MatchPattern {
    pub fn text(needle: impl Into<String>) -> Self {
        Self::Text(needle.into())
    }

    pub fn regex(pattern: &str) -> anyhow::Result<Self> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    pub fn matches(&self, input: &str) -> bool {
        match self {
            MatchPattern::Text(needle) => input.to_lowercase().contains(&needle.to_lowercase()),
            MatchPattern::Regex(re) => re.is_match(input),
            MatchPattern::Predicate(f) => f(input),
        }
    }
}

impl fmt::Debug for MatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPattern::Text(needle) => f.debug_tuple("Text").field(needle).finish(),
            MatchPattern::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            MatchPattern::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Input for a single agent execution (one round).
#[derive(Clone)]
pub struct AgentRunRequest {
    pub messages: Vec<AgentMessage>,
    pub context: ExecutionContext,
    pub max_steps: usize,
    pub tool_choice: Option<ToolChoice>,
}

/// Abstraction over a fully configured agent (instructions + tools + handoffs).
///
/// The orchestrator is an agent too; the round driver only ever talks to this trait.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    fn descriptor(&self) -> &AgentDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Whether any of the agent's routing patterns claims `input`.
    fn matches(&self, _input: &str) -> bool {
        false
    }

    fn handoffs(&self) -> &[Handoff] {
        &[]
    }

    /// Whether the agent exposes a tool called `name` under `ctx`.
    fn has_tool(&self, _name: &str, _ctx: &ExecutionContext) -> bool {
        false
    }

    /// Per-agent step limit; `None` defers to the run options.
    fn max_steps(&self) -> Option<usize> {
        None
    }

    fn guardrails(&self) -> Option<&Guardrails> {
        None
    }

    fn memory(&self) -> Option<&MemoryConfig> {
        None
    }

    /// Starts one round of execution and returns the agent's chunk stream.
    async fn run(&self, request: AgentRunRequest) -> anyhow::Result<ChunkStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_pattern_is_case_insensitive_substring() {
        let pattern = MatchPattern::text("Equation");
        assert!(pattern.matches("solve this equation please"));
        assert!(!pattern.matches("when did rome fall"));
    }

    #[test]
    fn regex_and_predicate_patterns() {
        let re = MatchPattern::regex(r"\d+\s*[+*/-]\s*\d+").unwrap();
        assert!(re.matches("what is 2 + 2"));
        assert!(!re.matches("what is two plus two"));

        let pred = MatchPattern::predicate(|s| s.ends_with('?'));
        assert!(pred.matches("who?"));
        assert_eq!(format!("{pred:?}"), "Predicate(..)");
    }
}
