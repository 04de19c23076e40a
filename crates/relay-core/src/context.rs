//! Per-turn execution context passed by reference through every round.

use serde_json::{Map, Value};

use crate::stream::{ChunkWriter, UiChunk};

/// Request-scoped metadata the orchestrator maintains on the context.
#[derive(Debug, Clone, Default)]
pub struct ContextMetadata {
    /// Name of the agent currently executing.
    pub agent: Option<String>,
    pub request_id: String,
    pub chat_id: Option<String>,
    pub user_id: Option<String>,
}

/// User-supplied key/value bag plus the orchestrator's request-scoped additions.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    values: Map<String, Value>,
    pub metadata: ContextMetadata,
    /// Rendered working-memory block injected into the next system prompt.
    pub working_memory: Option<String>,
    writer: Option<ChunkWriter>,
}

impl ExecutionContext {
    pub fn new(values: Map<String, Value>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    /// Builds a context from an arbitrary JSON value; non-objects yield an empty bag.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::new(map),
            Value::Null => Self::default(),
            other => {
                tracing::warn!(kind = %json_kind(&other), "context is not a JSON object; ignoring");
                Self::default()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.metadata
            .chat_id
            .as_deref()
            .or_else(|| self.get_str("chatId"))
    }

    pub fn user_id(&self) -> Option<&str> {
        self.metadata
            .user_id
            .as_deref()
            .or_else(|| self.get_str("userId"))
    }

    pub fn with_writer(mut self, writer: ChunkWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Pushes a chunk onto the turn's outward stream. A context without an
    /// attached writer silently drops it.
    pub fn write(&self, chunk: UiChunk) {
        match &self.writer {
            Some(writer) => writer.write(chunk),
            None => tracing::debug!(kind = chunk.kind(), "no writer attached; chunk dropped"),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
