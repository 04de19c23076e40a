//! Test doubles shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use relay_core::{
    AgentDescriptor, AgentHandle, AgentMessage, AgentRunRequest, ChunkStream, ExecutionContext,
    Handoff, LanguageModel, LlmRequest, LlmResponse, MatchPattern, UiChunk,
};

/// Model that always answers with the same text.
pub struct FixedModel {
    reply: String,
}

impl FixedModel {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for FixedModel {
    async fn generate(&self, _request: LlmRequest) -> anyhow::Result<LlmResponse> {
        Ok(LlmResponse {
            message: AgentMessage::assistant(self.reply.clone()),
        })
    }
}

/// Agent with scripted rounds and declared routing metadata.
pub struct StubAgent {
    descriptor: AgentDescriptor,
    patterns: Vec<MatchPattern>,
    tools: Vec<String>,
    handoffs: Vec<Handoff>,
    rounds: Mutex<VecDeque<Vec<UiChunk>>>,
    pub requests: Mutex<Vec<AgentRunRequest>>,
}

impl StubAgent {
    pub fn new(name: &str) -> Self {
        Self {
            descriptor: AgentDescriptor {
                name: name.to_string(),
                description: None,
            },
            patterns: Vec::new(),
            tools: Vec::new(),
            handoffs: Vec::new(),
            rounds: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pattern(mut self, pattern: MatchPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn with_tool(mut self, name: &str) -> Self {
        self.tools.push(name.to_string());
        self
    }

    pub fn with_handoffs(mut self, handoffs: Vec<Handoff>) -> Self {
        self.handoffs = handoffs;
        self
    }

    pub fn with_round(self, chunks: Vec<UiChunk>) -> Self {
        self.rounds.lock().unwrap().push_back(chunks);
        self
    }
}

#[async_trait]
impl AgentHandle for StubAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    fn matches(&self, input: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(input))
    }

    fn handoffs(&self) -> &[Handoff] {
        &self.handoffs
    }

    fn has_tool(&self, name: &str, _ctx: &ExecutionContext) -> bool {
        self.tools.iter().any(|t| t == name)
    }

    async fn run(&self, request: AgentRunRequest) -> anyhow::Result<ChunkStream> {
        self.requests.lock().unwrap().push(request);
        let chunks = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("{} has no scripted round left", self.descriptor.name))?;
        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }
}
