//! System prompt composition.
//!
//! An agent's base prompt (instructions plus the handoff section) only depends
//! on its static configuration, so it is built once per key and reused. Dynamic
//! additions such as the working-memory block are appended on every call.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use relay_core::prompts::HANDOFF_SYSTEM_PROMPT;
use relay_core::Handoff;

/// Appends `fragment` as a new paragraph. Empty fragments are ignored.
pub fn append_prompt(prompt: &mut String, fragment: &str) {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return;
    }
    if !prompt.is_empty() {
        prompt.push_str("\n\n");
    }
    prompt.push_str(fragment);
}

/// Renders `base` followed by each addition.
pub fn render_prompt(base: &str, additions: &[&str]) -> String {
    let mut prompt = base.to_string();
    for addition in additions {
        append_prompt(&mut prompt, addition);
    }
    prompt
}

/// Handoff section listing the targets an agent may transfer to.
pub fn handoff_section(handoffs: &[Handoff]) -> Option<String> {
    if handoffs.is_empty() {
        return None;
    }
    let listing = handoffs
        .iter()
        .map(|h| match &h.agent.descriptor().description {
            Some(description) => format!("- {}: {}", h.name(), description),
            None => format!("- {}", h.name()),
        })
        .collect::<Vec<_>>()
        .join("\n");
    Some(HANDOFF_SYSTEM_PROMPT.replace("{agents}", &listing))
}

#[derive(Debug, Default)]
pub struct SystemPromptCache {
    entries: RwLock<HashMap<String, Arc<str>>>,
}

impl SystemPromptCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memoized base prompt for `key` (building it with `base` on
    /// first use) with `additions` appended.
    pub fn compose<F>(&self, key: &str, base: F, additions: &[&str]) -> String
    where
        F: FnOnce() -> String,
    {
        let cached = self
            .entries
            .read()
            .ok()
            .and_then(|entries| entries.get(key).cloned());

        let base = match cached {
            Some(base) => base,
            None => {
                let built: Arc<str> = Arc::from(base());
                match self.entries.write() {
                    Ok(mut entries) => {
                        tracing::debug!(key, "cached system prompt");
                        entries.entry(key.to_string()).or_insert(built).clone()
                    }
                    Err(_) => built,
                }
            }
        };
        render_prompt(&base, additions)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
