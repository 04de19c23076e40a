//! Tool contracts handed to the execution primitive.
//!
//! The orchestrator never executes tools itself; it assembles a
//! [`ToolRegistry`] per agent and the execution primitive invokes tools while
//! streaming. The schema types serialize to the JSON Schema shape most model
//! providers accept.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::ExecutionContext;

/// JSON Schema definition for tool parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameterSchema {
    #[serde(rename = "type")]
    pub schema_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, ToolParameterSchema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,

    /// Enum values for restricted choices
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ToolParameterSchema {
    fn typed(schema_type: &str, description: Option<String>) -> Self {
        Self {
            schema_type: schema_type.to_string(),
            description,
            properties: None,
            required: None,
            enum_values: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::typed("string", Some(description.into()))
    }

    pub fn object(
        description: impl Into<String>,
        properties: HashMap<String, ToolParameterSchema>,
        required: Vec<String>,
    ) -> Self {
        Self {
            properties: Some(properties),
            required: Some(required),
            ..Self::typed("object", Some(description.into()))
        }
    }

    pub fn empty_object() -> Self {
        Self {
            properties: Some(HashMap::new()),
            required: Some(Vec::new()),
            ..Self::typed("object", None)
        }
    }
}

/// Complete schema definition for a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique, stable name (used by the model for invocation)
    pub name: String,
    pub description: String,
    pub parameters: ToolParameterSchema,
}

impl ToolSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameterSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    pub fn no_params(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ToolParameterSchema::empty_object())
    }
}

/// Context provided to tool implementations by the execution primitive.
#[derive(Clone)]
pub struct ToolContext {
    pub context: ExecutionContext,
    pub tool_call_id: Option<String>,
}

impl ToolContext {
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            context,
            tool_call_id: None,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    /// Executes the tool. The returned JSON becomes the `tool-output-available` payload.
    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<Value>;
}

pub type ToolBox = Arc<dyn Tool>;

/// Named set of tools for one agent. Iteration order is by tool name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolBox>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: ToolBox) -> &mut Self {
        let name = tool.schema().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "replaced previously registered tool");
        }
        self
    }

    pub fn register_all<I>(&mut self, tools: I) -> &mut Self
    where
        I: IntoIterator<Item = ToolBox>,
    {
        for tool in tools {
            self.register(tool);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolBox> {
        self.tools.get(name)
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl FromIterator<ToolBox> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = ToolBox>>(iter: I) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register_all(iter);
        registry
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type AsyncToolFn =
    Arc<dyn Fn(Value, ToolContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// A tool backed by an async closure.
pub struct FunctionTool {
    schema: ToolSchema,
    handler: AsyncToolFn,
}

#[async_trait]
impl Tool for FunctionTool {
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<Value> {
        (self.handler)(args, ctx).await
    }
}

/// Builds [`FunctionTool`]s from closures.
pub struct ToolBuilder {
    name: String,
    description: String,
    parameters: Option<ToolParameterSchema>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: ToolParameterSchema) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn build_async<F, Fut>(self, handler: F) -> ToolBox
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let schema = ToolSchema::new(
            self.name,
            self.description,
            self.parameters
                .unwrap_or_else(ToolParameterSchema::empty_object),
        );
        let handler: AsyncToolFn = Arc::new(move |args, ctx| Box::pin(handler(args, ctx)));
        Arc::new(FunctionTool { schema, handler })
    }

    pub fn build<F>(self, handler: F) -> ToolBox
    where
        F: Fn(Value, ToolContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.build_async(move |args, ctx| {
            let handler = handler.clone();
            async move { handler(args, ctx) }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn function_tool_invokes_closure() {
        let tool = ToolBuilder::new("echo", "Echo the input")
            .with_parameters(ToolParameterSchema::object(
                "args",
                HashMap::from([("text".to_string(), ToolParameterSchema::string("text"))]),
                vec!["text".into()],
            ))
            .build(|args, _ctx| {
                let text = args.get("text").and_then(Value::as_str).unwrap_or("");
                Ok(json!({ "echo": text }))
            });

        let out = tool
            .execute(json!({"text": "hi"}), ToolContext::new(ExecutionContext::default()))
            .await
            .unwrap();
        assert_eq!(out, json!({"echo": "hi"}));
        assert_eq!(tool.schema().parameters.required, Some(vec!["text".to_string()]));
    }

    #[test]
    fn registry_lists_names_sorted() {
        let registry: ToolRegistry = vec![
            ToolBuilder::new("weather", "w").build(|_, _| Ok(Value::Null)),
            ToolBuilder::new("calculator", "c").build(|_, _| Ok(Value::Null)),
        ]
        .into_iter()
        .collect();

        assert_eq!(registry.names(), vec!["calculator", "weather"]);
        assert!(registry.has("weather"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn no_params_schema_is_empty_object() {
        let schema = ToolSchema::no_params("ping", "Ping");
        let value = serde_json::to_value(&schema.parameters).unwrap();
        assert_eq!(value, json!({"type": "object", "properties": {}, "required": []}));
    }
}
