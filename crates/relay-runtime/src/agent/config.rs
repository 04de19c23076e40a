//! Static and context-derived agent configuration.

use std::fmt;
use std::sync::Arc;

use relay_core::{ExecutionContext, ToolRegistry};

pub type InstructionsFn = Arc<dyn Fn(&ExecutionContext) -> String + Send + Sync>;
pub type ToolsFn = Arc<dyn Fn(&ExecutionContext) -> ToolRegistry + Send + Sync>;

#[derive(Clone)]
pub enum Instructions {
    Static(String),
    /// Rebuilt from the execution context on every round; never cached.
    Dynamic(InstructionsFn),
}

impl Instructions {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&ExecutionContext) -> String + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    pub fn resolve(&self, ctx: &ExecutionContext) -> String {
        match self {
            Instructions::Static(text) => text.clone(),
            Instructions::Dynamic(f) => f(ctx),
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Instructions::Static(_))
    }
}

impl From<&str> for Instructions {
    fn from(text: &str) -> Self {
        Self::Static(text.to_string())
    }
}

impl From<String> for Instructions {
    fn from(text: String) -> Self {
        Self::Static(text)
    }
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instructions::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Instructions::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

#[derive(Clone)]
pub enum ToolSet {
    Static(ToolRegistry),
    Dynamic(ToolsFn),
}

impl ToolSet {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&ExecutionContext) -> ToolRegistry + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    pub fn resolve(&self, ctx: &ExecutionContext) -> ToolRegistry {
        match self {
            ToolSet::Static(registry) => registry.clone(),
            ToolSet::Dynamic(f) => f(ctx),
        }
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::Static(ToolRegistry::new())
    }
}
