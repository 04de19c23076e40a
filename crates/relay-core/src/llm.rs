use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::messaging::AgentMessage;
use crate::stream::UiChunk;
use crate::tools::ToolRegistry;

/// Chunk stream produced by one agent execution.
pub type ChunkStream = Pin<Box<dyn Stream<Item = anyhow::Result<UiChunk>> + Send>>;

/// How the model may pick tools on its first step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    Required,
    None,
    Tool(String),
}

/// Request structure passed to the execution primitive.
#[derive(Clone, Default)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub messages: Vec<AgentMessage>,
    pub tools: ToolRegistry,
    pub tool_choice: Option<ToolChoice>,
    pub max_steps: usize,
    pub context: ExecutionContext,
}

impl LlmRequest {
    pub fn new(system_prompt: impl Into<String>, messages: Vec<AgentMessage>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages,
            max_steps: 1,
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub message: AgentMessage,
}

/// The language-model call and tool-execution primitive.
///
/// Implementations own tool invocation: `stream` is expected to run up to
/// `max_steps` model/tool iterations and surface them as chunks.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse>;

    /// Streams a response. The default wraps [`LanguageModel::generate`] in a
    /// single text step.
    async fn stream(&self, request: LlmRequest) -> anyhow::Result<ChunkStream> {
        let response = self.generate(request).await?;
        let text_id = uuid::Uuid::new_v4().to_string();
        let mut chunks = vec![UiChunk::start(uuid::Uuid::new_v4().to_string()), UiChunk::StartStep];
        chunks.extend(UiChunk::text_block(text_id, response.message.text()));
        chunks.push(UiChunk::FinishStep);
        chunks.push(UiChunk::finish(Some("stop".to_string())));
        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct Echo;

    #[async_trait]
    impl LanguageModel for Echo {
        async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
            let last = request
                .messages
                .last()
                .map(|m| m.text())
                .unwrap_or_default();
            Ok(LlmResponse {
                message: AgentMessage::assistant(format!("echo: {last}")),
            })
        }
    }

    #[tokio::test]
    async fn default_stream_wraps_generate() {
        let stream = Echo
            .stream(LlmRequest::new("sys", vec![AgentMessage::user("hi")]))
            .await
            .unwrap();
        let chunks: Vec<UiChunk> = stream.map(|c| c.unwrap()).collect().await;
        let kinds: Vec<&str> = chunks.iter().map(UiChunk::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "start",
                "start-step",
                "text-start",
                "text-delta",
                "text-end",
                "finish-step",
                "finish"
            ]
        );
        assert!(matches!(&chunks[3], UiChunk::TextDelta { delta, .. } if delta == "echo: hi"));
    }
}
