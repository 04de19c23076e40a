//! Fluent builder API for constructing agents.

use std::sync::Arc;

use relay_core::{
    AgentDescriptor, Guardrail, Guardrails, Handoff, LanguageModel, MatchPattern, MemoryConfig,
    RelayError, ToolBox, ToolRegistry, HANDOFF_TOOL_NAME,
};

use super::config::{Instructions, ToolSet};
use super::runtime::Agent;
use crate::prompts::SystemPromptCache;

/// Builder API to assemble an [`Agent`] in a single fluent flow.
///
/// ```ignore
/// let math = AgentBuilder::new("math", "You are a patient math tutor.")
///     .with_description("Arithmetic, algebra and equations")
///     .with_model(model.clone())
///     .match_on(MatchPattern::regex(r"\d+\s*[+*/-]\s*\d+")?)
///     .build()?;
///
/// let triage = AgentBuilder::new("triage", "Answer briefly or hand off.")
///     .with_model(model)
///     .with_handoff(Handoff::new(Arc::new(math)))
///     .build()?;
/// ```
pub struct AgentBuilder {
    name: String,
    description: Option<String>,
    instructions: Instructions,
    tools: Vec<ToolBox>,
    dynamic_tools: Option<ToolSet>,
    model: Option<Arc<dyn LanguageModel>>,
    match_on: Vec<MatchPattern>,
    handoffs: Vec<Handoff>,
    guardrails: Guardrails,
    memory: Option<MemoryConfig>,
    max_steps: Option<usize>,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>, instructions: impl Into<Instructions>) -> Self {
        Self {
            name: name.into(),
            description: None,
            instructions: instructions.into(),
            tools: Vec::new(),
            dynamic_tools: None,
            model: None,
            match_on: Vec::new(),
            handoffs: Vec::new(),
            guardrails: Guardrails::default(),
            memory: None,
            max_steps: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_tool(mut self, tool: ToolBox) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools<I>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = ToolBox>,
    {
        self.tools.extend(tools);
        self
    }

    /// Derives the tool set from the execution context on every round.
    /// Replaces any tools added with [`AgentBuilder::with_tool`].
    pub fn with_dynamic_tools(mut self, tools: ToolSet) -> Self {
        self.dynamic_tools = Some(tools);
        self
    }

    pub fn match_on(mut self, pattern: MatchPattern) -> Self {
        self.match_on.push(pattern);
        self
    }

    pub fn with_handoff(mut self, handoff: Handoff) -> Self {
        self.handoffs.push(handoff);
        self
    }

    pub fn with_handoffs<I>(mut self, handoffs: I) -> Self
    where
        I: IntoIterator<Item = Handoff>,
    {
        self.handoffs.extend(handoffs);
        self
    }

    pub fn with_input_guardrail(mut self, guardrail: Arc<dyn Guardrail>) -> Self {
        self.guardrails.input.push(guardrail);
        self
    }

    pub fn with_output_guardrail(mut self, guardrail: Arc<dyn Guardrail>) -> Self {
        self.guardrails.output.push(guardrail);
        self
    }

    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn build(self) -> Result<Agent, RelayError> {
        if self.name.trim().is_empty() {
            return Err(RelayError::Config("agent name must not be empty".into()));
        }
        let model = self
            .model
            .ok_or_else(|| RelayError::Config(format!("agent '{}' has no model", self.name)))?;
        if self.max_steps == Some(0) {
            return Err(RelayError::Config(format!(
                "agent '{}' needs max_steps >= 1",
                self.name
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for handoff in &self.handoffs {
            let target = handoff.name();
            if target == self.name {
                return Err(RelayError::Config(format!(
                    "agent '{}' cannot hand off to itself",
                    self.name
                )));
            }
            if !seen.insert(target.to_string()) {
                return Err(RelayError::Config(format!(
                    "agent '{}' declares handoff target '{target}' twice",
                    self.name
                )));
            }
        }

        let tools = match self.dynamic_tools {
            Some(dynamic) => dynamic,
            None => {
                let registry: ToolRegistry = self.tools.into_iter().collect();
                if registry.has(HANDOFF_TOOL_NAME) {
                    return Err(RelayError::Config(format!(
                        "tool name '{HANDOFF_TOOL_NAME}' is reserved"
                    )));
                }
                ToolSet::Static(registry)
            }
        };

        tracing::debug!(
            agent = %self.name,
            handoffs = self.handoffs.len(),
            patterns = self.match_on.len(),
            "built agent"
        );

        Ok(Agent {
            descriptor: AgentDescriptor {
                name: self.name,
                description: self.description,
            },
            instructions: self.instructions,
            tools,
            model,
            match_on: self.match_on,
            handoffs: self.handoffs,
            guardrails: self.guardrails,
            memory: self.memory,
            max_steps: self.max_steps,
            prompt_cache: SystemPromptCache::new(),
        })
    }
}
