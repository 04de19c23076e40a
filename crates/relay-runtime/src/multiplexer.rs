//! Per-round fold over an agent's chunk stream.
//!
//! The fold forwards content chunks verbatim and in order, swallows the
//! handoff tool's chunks and the agent's own `start` / `finish` chunks, and
//! collects what the round driver needs to decide what happens next.

use std::collections::HashMap;

use relay_core::{HandoffSignal, UiChunk, HANDOFF_TOOL_NAME};
use serde_json::Value;

/// Whether `chunk` is handoff control-plane traffic. `tool_names` maps call
/// ids to tool names for chunks that do not carry the name themselves.
pub fn is_internal_chunk(chunk: &UiChunk, tool_names: &HashMap<String, String>) -> bool {
    let name = chunk.tool_name().or_else(|| {
        chunk
            .tool_call_id()
            .and_then(|id| tool_names.get(id))
            .map(String::as_str)
    });
    name == Some(HANDOFF_TOOL_NAME)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub tool_name: String,
    pub tool_call_id: String,
    pub output: Value,
}

/// Signals extracted from one agent execution.
#[derive(Debug, Clone, Default)]
pub struct RoundOutcome {
    pub text: String,
    pub tool_names: HashMap<String, String>,
    /// Non-handoff tool outputs in arrival order.
    pub tool_outputs: Vec<ToolOutput>,
    pub handoff: Option<HandoffSignal>,
    pub finish_reason: Option<String>,
    pub steps: usize,
    pub usage: Option<Value>,
}

impl RoundOutcome {
    /// Latest output produced by `tool_name`.
    pub fn tool_output(&self, tool_name: &str) -> Option<&Value> {
        self.tool_outputs
            .iter()
            .rev()
            .find(|o| o.tool_name == tool_name)
            .map(|o| &o.output)
    }
}

#[derive(Debug, Default)]
pub struct StreamFold {
    outcome: RoundOutcome,
}

impl StreamFold {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> usize {
        self.outcome.steps
    }

    pub fn handoff(&self) -> Option<&HandoffSignal> {
        self.outcome.handoff.as_ref()
    }

    /// Folds one chunk in. Returns the chunk to forward, or `None` if it is swallowed.
    pub fn observe(&mut self, chunk: UiChunk) -> Option<UiChunk> {
        let state = &mut self.outcome;

        if let UiChunk::ToolInputStart {
            tool_call_id,
            tool_name,
        }
        | UiChunk::ToolInputAvailable {
            tool_call_id,
            tool_name,
            ..
        } = &chunk
        {
            state
                .tool_names
                .entry(tool_call_id.clone())
                .or_insert_with(|| tool_name.clone());
        }

        if is_internal_chunk(&chunk, &state.tool_names) {
            if let UiChunk::ToolOutputAvailable { output, .. } = &chunk {
                match (HandoffSignal::from_output(output), state.handoff.is_some()) {
                    (Some(signal), false) => {
                        tracing::debug!(target_agent = %signal.target_agent, "handoff signal extracted");
                        state.handoff = Some(signal);
                    }
                    (Some(signal), true) => tracing::warn!(
                        ignored = %signal.target_agent,
                        "multiple handoffs in one round; keeping the first"
                    ),
                    (None, _) => tracing::warn!(output = %output, "unparseable handoff output"),
                }
            }
            return None;
        }

        match &chunk {
            UiChunk::Start { .. } => return None,
            UiChunk::Finish {
                finish_reason,
                message_metadata,
            } => {
                state.finish_reason = finish_reason.clone();
                if message_metadata.is_some() {
                    state.usage = message_metadata.clone();
                }
                return None;
            }
            UiChunk::TextDelta { delta, .. } => state.text.push_str(delta),
            UiChunk::StartStep => state.steps += 1,
            UiChunk::ToolOutputAvailable {
                tool_call_id,
                output,
            } => {
                let tool_name = state
                    .tool_names
                    .get(tool_call_id)
                    .cloned()
                    .unwrap_or_default();
                state.tool_outputs.push(ToolOutput {
                    tool_name,
                    tool_call_id: tool_call_id.clone(),
                    output: output.clone(),
                });
            }
            _ => {}
        }
        Some(chunk)
    }

    pub fn finish(self) -> RoundOutcome {
        self.outcome
    }
}
