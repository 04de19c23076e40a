//! Conversation hand-over between agents.

use relay_core::{
    AgentMessage, HandoffInputData, HandoffInputFilter, HandoffSignal, MessageContent,
    MessageMetadata, MessageRole,
};
use serde_json::{json, Map, Value};

use crate::multiplexer::RoundOutcome;

/// Items the handing-off round contributes to the target's conversation: a
/// single `tool` message with the round's tool outputs and the handoff reason.
/// The round's text is deliberately absent.
pub fn handoff_items(from: &str, outcome: &RoundOutcome, signal: &HandoffSignal) -> Vec<AgentMessage> {
    if outcome.tool_outputs.is_empty() && signal.reason.is_none() && signal.context.is_none() {
        return Vec::new();
    }

    let outputs: Vec<Value> = outcome
        .tool_outputs
        .iter()
        .map(|o| json!({"toolName": o.tool_name, "toolCallId": o.tool_call_id, "output": o.output}))
        .collect();

    let mut record = Map::new();
    record.insert("handoffFrom".into(), Value::String(from.to_string()));
    if !outputs.is_empty() {
        record.insert("toolOutputs".into(), Value::Array(outputs));
    }
    if let Some(reason) = &signal.reason {
        record.insert("handoffReason".into(), Value::String(reason.clone()));
    }
    if let Some(context) = &signal.context {
        record.insert("handoffContext".into(), context.clone());
    }

    let mut message = AgentMessage::new(MessageRole::Tool, MessageContent::Json(Value::Object(record)));
    message.metadata = Some(MessageMetadata {
        agent: Some(from.to_string()),
        tool_call_id: None,
    });
    vec![message]
}

/// Runs `filter` over `data`. A failing filter leaves the data unfiltered.
pub fn apply_input_filter(
    filter: Option<&HandoffInputFilter>,
    target: &str,
    data: HandoffInputData,
) -> HandoffInputData {
    let Some(filter) = filter else {
        return data;
    };
    match filter(data.clone()) {
        Ok(filtered) => {
            tracing::debug!(
                target_agent = %target,
                before = data.input_history.len() + data.pre_handoff_items.len() + data.new_items.len(),
                after = filtered.input_history.len() + filtered.pre_handoff_items.len() + filtered.new_items.len(),
                "applied handoff input filter"
            );
            filtered
        }
        Err(e) => {
            tracing::warn!(target_agent = %target, error = %e, "handoff input filter failed; passing history through");
            data
        }
    }
}

/// Ready-made handoff input filters.
pub mod filters {
    use std::sync::Arc;

    use relay_core::security::{redact_pii, sanitize_json};
    use relay_core::{AgentMessage, HandoffInputData, HandoffInputFilter, MessageContent, MessagePart, MessageRole};

    /// Wraps a closure as a [`HandoffInputFilter`].
    pub fn from_fn<F>(f: F) -> HandoffInputFilter
    where
        F: Fn(HandoffInputData) -> anyhow::Result<HandoffInputData> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    /// Drops every `tool` message from all three segments.
    pub fn remove_tool_messages() -> HandoffInputFilter {
        from_fn(|mut data| {
            let keep = |m: &AgentMessage| m.role != MessageRole::Tool;
            data.input_history.retain(keep);
            data.pre_handoff_items.retain(keep);
            data.new_items.retain(keep);
            Ok(data)
        })
    }

    /// Keeps only the most recent `n` messages of the flattened conversation.
    pub fn keep_last_messages(n: usize) -> HandoffInputFilter {
        from_fn(move |mut data| {
            let mut budget = n;
            for segment in [&mut data.new_items, &mut data.pre_handoff_items, &mut data.input_history] {
                let keep = segment.len().min(budget);
                let excess = segment.len() - keep;
                segment.drain(..excess);
                budget -= keep;
            }
            Ok(data)
        })
    }

    /// Scrubs emails, phone numbers and card numbers from every message.
    pub fn redact_sensitive() -> HandoffInputFilter {
        from_fn(|mut data| {
            for segment in [&mut data.input_history, &mut data.pre_handoff_items, &mut data.new_items] {
                for message in segment.iter_mut() {
                    redact_message(message);
                }
            }
            Ok(data)
        })
    }

    /// Applies `filters` left to right; the first failure aborts the chain.
    pub fn chain(filters: Vec<HandoffInputFilter>) -> HandoffInputFilter {
        from_fn(move |data| filters.iter().try_fold(data, |data, filter| filter(data)))
    }

    fn redact_message(message: &mut AgentMessage) {
        match &mut message.content {
            MessageContent::Text(text) => *text = redact_pii(text),
            MessageContent::Json(value) => *value = sanitize_json(value),
            MessageContent::Parts(parts) => {
                for part in parts.iter_mut() {
                    if let MessagePart::Text { text } = part {
                        *text = redact_pii(text);
                    }
                }
            }
        }
    }
}
