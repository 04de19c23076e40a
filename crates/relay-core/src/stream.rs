//! Outward chunk protocol shared by agents, the stream multiplexer, and consumers.
//!
//! Chunks serialize to the UI message stream shape (`{"type": "text-delta", ...}`)
//! so they can be forwarded to a browser client as server-sent events unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::handoff::RoutingStrategy;

/// One unit of streamed output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiChunk {
    #[serde(rename_all = "camelCase")]
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },

    ReasoningStart {
        id: String,
    },
    ReasoningDelta {
        id: String,
        delta: String,
    },
    ReasoningEnd {
        id: String,
    },

    #[serde(rename_all = "camelCase")]
    ToolInputStart {
        tool_call_id: String,
        tool_name: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolInputDelta {
        tool_call_id: String,
        input_text_delta: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable {
        tool_call_id: String,
        output: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
    },

    StartStep,
    FinishStep,

    #[serde(rename = "data-agent-handoff")]
    AgentHandoff { data: HandoffNotice },
    #[serde(rename = "data-agent-status")]
    AgentStatus { data: AgentStatusNotice },
    #[serde(rename = "data-chat-title")]
    ChatTitle { data: ChatTitleNotice },
    #[serde(rename = "data-suggestions")]
    Suggestions { data: SuggestionsNotice },

    #[serde(rename_all = "camelCase")]
    Error {
        error_text: String,
    },
    #[serde(rename_all = "camelCase")]
    Finish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_metadata: Option<Value>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HandoffNotice {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub routing_strategy: RoutingStrategy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Routing,
    Executing,
    Completing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentStatusNotice {
    pub status: AgentStatus,
    pub agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatTitleNotice {
    pub chat_id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestionsNotice {
    pub prompts: Vec<String>,
}

impl UiChunk {
    pub fn start(message_id: impl Into<String>) -> Self {
        Self::Start {
            message_id: Some(message_id.into()),
        }
    }

    pub fn text_start(id: impl Into<String>) -> Self {
        Self::TextStart { id: id.into() }
    }

    pub fn text_delta(id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self::TextDelta {
            id: id.into(),
            delta: delta.into(),
        }
    }

    pub fn text_end(id: impl Into<String>) -> Self {
        Self::TextEnd { id: id.into() }
    }

    /// A complete `text-start` / `text-delta` / `text-end` block.
    pub fn text_block(id: impl Into<String>, text: impl Into<String>) -> Vec<Self> {
        let id = id.into();
        vec![
            Self::text_start(id.clone()),
            Self::text_delta(id.clone(), text),
            Self::text_end(id),
        ]
    }

    pub fn tool_input_start(tool_call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self::ToolInputStart {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
        }
    }

    pub fn tool_input_available(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
    ) -> Self {
        Self::ToolInputAvailable {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input,
        }
    }

    pub fn tool_output_available(tool_call_id: impl Into<String>, output: Value) -> Self {
        Self::ToolOutputAvailable {
            tool_call_id: tool_call_id.into(),
            output,
        }
    }

    pub fn error(error_text: impl Into<String>) -> Self {
        Self::Error {
            error_text: error_text.into(),
        }
    }

    pub fn finish(finish_reason: Option<String>) -> Self {
        Self::Finish {
            finish_reason,
            message_metadata: None,
        }
    }

    pub fn handoff(notice: HandoffNotice) -> Self {
        Self::AgentHandoff { data: notice }
    }

    pub fn status(status: AgentStatus, agent: impl Into<String>) -> Self {
        Self::AgentStatus {
            data: AgentStatusNotice {
                status,
                agent: agent.into(),
            },
        }
    }

    pub fn chat_title(chat_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::ChatTitle {
            data: ChatTitleNotice {
                chat_id: chat_id.into(),
                title: title.into(),
            },
        }
    }

    pub fn suggestions(prompts: Vec<String>) -> Self {
        Self::Suggestions {
            data: SuggestionsNotice { prompts },
        }
    }

    /// Call id of a tool chunk, if this is one.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            UiChunk::ToolInputStart { tool_call_id, .. }
            | UiChunk::ToolInputDelta { tool_call_id, .. }
            | UiChunk::ToolInputAvailable { tool_call_id, .. }
            | UiChunk::ToolOutputAvailable { tool_call_id, .. }
            | UiChunk::ToolOutputError { tool_call_id, .. } => Some(tool_call_id.as_str()),
            _ => None,
        }
    }

    /// Tool name carried by the chunk itself. Only the input start/available
    /// chunks repeat it; later chunks must be resolved through their call id.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            UiChunk::ToolInputStart { tool_name, .. }
            | UiChunk::ToolInputAvailable { tool_name, .. } => Some(tool_name.as_str()),
            _ => None,
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, UiChunk::Finish { .. })
    }

    /// Wire type tag, e.g. `text-delta` or `data-agent-handoff`.
    pub fn kind(&self) -> &'static str {
        match self {
            UiChunk::Start { .. } => "start",
            UiChunk::TextStart { .. } => "text-start",
            UiChunk::TextDelta { .. } => "text-delta",
            UiChunk::TextEnd { .. } => "text-end",
            UiChunk::ReasoningStart { .. } => "reasoning-start",
            UiChunk::ReasoningDelta { .. } => "reasoning-delta",
            UiChunk::ReasoningEnd { .. } => "reasoning-end",
            UiChunk::ToolInputStart { .. } => "tool-input-start",
            UiChunk::ToolInputDelta { .. } => "tool-input-delta",
            UiChunk::ToolInputAvailable { .. } => "tool-input-available",
            UiChunk::ToolOutputAvailable { .. } => "tool-output-available",
            UiChunk::ToolOutputError { .. } => "tool-output-error",
            UiChunk::StartStep => "start-step",
            UiChunk::FinishStep => "finish-step",
            UiChunk::AgentHandoff { .. } => "data-agent-handoff",
            UiChunk::AgentStatus { .. } => "data-agent-status",
            UiChunk::ChatTitle { .. } => "data-chat-title",
            UiChunk::Suggestions { .. } => "data-suggestions",
            UiChunk::Error { .. } => "error",
            UiChunk::Finish { .. } => "finish",
        }
    }
}

/// Handle attached to the execution context so tools can push custom chunks
/// onto the turn's outward stream. The round driver is the only reader.
#[derive(Debug, Clone)]
pub struct ChunkWriter {
    tx: mpsc::UnboundedSender<UiChunk>,
}

impl ChunkWriter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiChunk>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn write(&self, chunk: UiChunk) {
        if self.tx.send(chunk).is_err() {
            tracing::debug!("chunk writer closed; dropping chunk");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chunks_use_ui_stream_wire_shape() {
        let chunk = UiChunk::tool_input_start("call-1", "lookup");
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({"type": "tool-input-start", "toolCallId": "call-1", "toolName": "lookup"})
        );

        let notice = UiChunk::handoff(HandoffNotice {
            from: "triage".into(),
            to: "math".into(),
            reason: None,
            routing_strategy: RoutingStrategy::Programmatic,
        });
        assert_eq!(
            serde_json::to_value(&notice).unwrap(),
            json!({
                "type": "data-agent-handoff",
                "data": {"from": "triage", "to": "math", "routingStrategy": "programmatic"}
            })
        );

        assert_eq!(
            serde_json::to_value(UiChunk::StartStep).unwrap(),
            json!({"type": "start-step"})
        );
    }

    #[test]
    fn decodes_status_chunk() {
        let chunk: UiChunk = serde_json::from_value(json!({
            "type": "data-agent-status",
            "data": {"status": "executing", "agent": "math"}
        }))
        .unwrap();
        assert_eq!(chunk, UiChunk::status(AgentStatus::Executing, "math"));
        assert_eq!(chunk.kind(), "data-agent-status");
    }

    #[tokio::test]
    async fn writer_delivers_in_order() {
        let (writer, mut rx) = ChunkWriter::channel();
        writer.write(UiChunk::text_start("a"));
        writer.write(UiChunk::text_end("a"));
        assert_eq!(rx.recv().await, Some(UiChunk::text_start("a")));
        assert_eq!(rx.recv().await, Some(UiChunk::text_end("a")));
    }
}
