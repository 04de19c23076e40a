//! Agent runtime implementation
//!
//! An [`Agent`] turns a round request into a model stream: it resolves its
//! tools for the current context, adds the handoff and working-memory tools
//! when configured, composes the system prompt and hands everything to the
//! execution primitive.

use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{
    AgentDescriptor, AgentHandle, AgentRunRequest, ChunkStream, ExecutionContext, Guardrails,
    Handoff, HandoffTool, LanguageModel, LlmRequest, MatchPattern, MemoryConfig, ToolRegistry,
};

use super::config::{Instructions, ToolSet};
use crate::memory::UpdateWorkingMemoryTool;
use crate::prompts::{append_prompt, handoff_section, render_prompt, SystemPromptCache};

pub struct Agent {
    pub(crate) descriptor: AgentDescriptor,
    pub(crate) instructions: Instructions,
    pub(crate) tools: ToolSet,
    pub(crate) model: Arc<dyn LanguageModel>,
    pub(crate) match_on: Vec<MatchPattern>,
    pub(crate) handoffs: Vec<Handoff>,
    pub(crate) guardrails: Guardrails,
    pub(crate) memory: Option<MemoryConfig>,
    pub(crate) max_steps: Option<usize>,
    pub(crate) prompt_cache: SystemPromptCache,
}

impl Agent {
    /// Tools exposed for one round: the configured set plus the built-in
    /// handoff and working-memory tools.
    pub fn resolve_tools(&self, ctx: &ExecutionContext) -> ToolRegistry {
        let mut registry = self.tools.resolve(ctx);
        if !self.handoffs.is_empty() {
            registry.register(Arc::new(HandoffTool::new(&self.handoffs)));
        }
        if let Some(memory) = &self.memory {
            if let Some(wm) = &memory.working_memory {
                registry.register(Arc::new(UpdateWorkingMemoryTool::new(
                    memory.provider.clone(),
                    wm.clone(),
                )));
            }
        }
        registry
    }

    fn base_prompt(&self, instructions: String) -> String {
        let mut prompt = instructions;
        if let Some(section) = handoff_section(&self.handoffs) {
            append_prompt(&mut prompt, &section);
        }
        prompt
    }

    pub fn system_prompt(&self, ctx: &ExecutionContext) -> String {
        let additions: Vec<&str> = ctx.working_memory.as_deref().into_iter().collect();
        if self.instructions.is_static() {
            self.prompt_cache.compose(
                &self.descriptor.name,
                || self.base_prompt(self.instructions.resolve(ctx)),
                &additions,
            )
        } else {
            render_prompt(&self.base_prompt(self.instructions.resolve(ctx)), &additions)
        }
    }
}

#[async_trait]
impl AgentHandle for Agent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    fn matches(&self, input: &str) -> bool {
        self.match_on.iter().any(|p| p.matches(input))
    }

    fn handoffs(&self) -> &[Handoff] {
        &self.handoffs
    }

    fn has_tool(&self, name: &str, ctx: &ExecutionContext) -> bool {
        self.tools.resolve(ctx).has(name)
    }

    fn max_steps(&self) -> Option<usize> {
        self.max_steps
    }

    fn guardrails(&self) -> Option<&Guardrails> {
        (!self.guardrails.is_empty()).then_some(&self.guardrails)
    }

    fn memory(&self) -> Option<&MemoryConfig> {
        self.memory.as_ref()
    }

    async fn run(&self, request: AgentRunRequest) -> anyhow::Result<ChunkStream> {
        let tools = self.resolve_tools(&request.context);
        let system_prompt = self.system_prompt(&request.context);
        tracing::debug!(
            agent = %self.descriptor.name,
            messages = request.messages.len(),
            tools = ?tools.names(),
            max_steps = request.max_steps,
            "starting agent execution"
        );
        self.model
            .stream(LlmRequest {
                system_prompt,
                messages: request.messages,
                tools,
                tool_choice: request.tool_choice,
                max_steps: request.max_steps,
                context: request.context,
            })
            .await
    }
}
