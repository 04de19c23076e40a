//! Memory gateway integration: preload before round 0 and persistence after the turn.
//!
//! Nothing in here fails a turn. Provider errors are logged and the turn
//! degrades to "current message only" or skips the write.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use relay_core::prompts::{UPDATE_WORKING_MEMORY_TOOL_DESCRIPTION, WORKING_MEMORY_PROMPT};
use relay_core::{
    AgentMessage, ChatSession, ExecutionContext, MemoryConfig, MemoryKey, MemoryProvider,
    MemoryScope, StoredMessage, Tool, ToolContext, ToolParameterSchema, ToolSchema,
    WorkingMemoryConfig,
};
use serde_json::{json, Value};

pub const UPDATE_WORKING_MEMORY_TOOL_NAME: &str = "update_working_memory";

/// Resolves the record key for `config.scope`. `None` when the id it needs is absent.
pub fn working_memory_key<'a>(
    config: &WorkingMemoryConfig,
    ctx: &'a ExecutionContext,
) -> Option<MemoryKey<'a>> {
    let id = match config.scope {
        MemoryScope::Chat => ctx.chat_id(),
        MemoryScope::User => ctx.user_id(),
    }?;
    Some(MemoryKey {
        scope: config.scope,
        id,
    })
}

pub fn render_working_memory(content: &str) -> String {
    let content = if content.trim().is_empty() {
        "(empty)"
    } else {
        content.trim()
    };
    WORKING_MEMORY_PROMPT.replace("{memory}", content)
}

/// State loaded before the first round.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    /// Stored history, oldest first. Does not include the new message.
    pub history: Vec<AgentMessage>,
    /// Rendered working-memory block for the system prompt.
    pub working_memory: Option<String>,
    pub chat: Option<ChatSession>,
    /// Whether this turn carries the chat's first message.
    pub first_message: bool,
}

/// Loads history, working memory and the chat record concurrently.
pub async fn preload(config: Option<&MemoryConfig>, ctx: &ExecutionContext) -> MemorySnapshot {
    let Some(config) = config else {
        return MemorySnapshot::default();
    };
    let provider = config.provider.as_ref();
    let chat_id = ctx.chat_id();

    let history = async {
        match (config.history, chat_id) {
            (Some(history), Some(chat_id)) if provider.supports_history() => {
                match provider.get_messages(chat_id, history.limit).await {
                    Ok(messages) => messages.into_iter().map(StoredMessage::into_message).collect(),
                    Err(e) => {
                        tracing::warn!(chat_id = %chat_id, error = %e, "failed to load history; continuing with current message only");
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        }
    };

    let working = async {
        let wm = config.working_memory.as_ref()?;
        let Some(key) = working_memory_key(wm, ctx) else {
            tracing::debug!(scope = ?wm.scope, "working memory enabled but no id for its scope");
            return None;
        };
        let stored = match provider.get_working_memory(key).await {
            Ok(record) => record.map(|r| r.content),
            Err(e) => {
                tracing::warn!(scope = ?key.scope, error = %e, "failed to load working memory");
                None
            }
        };
        let content = stored.or_else(|| wm.template.clone()).unwrap_or_default();
        Some(render_working_memory(&content))
    };

    let chat = async {
        match chat_id {
            Some(chat_id) if provider.supports_chats() => match provider.get_chat(chat_id).await {
                Ok(chat) => Some(chat),
                Err(e) => {
                    tracing::warn!(chat_id = %chat_id, error = %e, "failed to load chat record");
                    None
                }
            },
            _ => None,
        }
    };

    let (history, working_memory, chat) = tokio::join!(history, working, chat);
    // `None` from the chat future means "unknown"; `Some(None)` means the chat does not exist yet.
    let first_message = matches!(&chat, Some(None))
        || matches!(&chat, Some(Some(c)) if c.message_count == 0);

    tracing::debug!(
        history = history.len(),
        working_memory = working_memory.is_some(),
        first_message,
        "memory preloaded"
    );

    MemorySnapshot {
        history,
        working_memory,
        chat: chat.flatten(),
        first_message,
    }
}

/// Everything the detached persistence task needs.
pub struct PersistJob {
    pub provider: Arc<dyn MemoryProvider>,
    pub chat_id: String,
    pub user_id: Option<String>,
    pub user_message: AgentMessage,
    pub assistant_message: AgentMessage,
    pub chat: Option<ChatSession>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistOutcome {
    pub saved_messages: usize,
    pub chat_saved: bool,
    pub errors: Vec<String>,
}

/// Appends the user and assistant messages (in that order) while upserting
/// the chat record.
pub async fn persist_turn(job: PersistJob) -> PersistOutcome {
    let provider = job.provider.as_ref();
    let chat_id = job.chat_id.as_str();
    let user_id = job.user_id.as_deref();

    let messages = async {
        if !provider.supports_history() {
            return (0, Vec::new());
        }
        let mut saved = 0;
        let mut errors = Vec::new();
        // Sequential: history is ordered by insertion, so the user message
        // must land before the answer.
        for message in [&job.user_message, &job.assistant_message] {
            let stored = StoredMessage::from_message(chat_id, user_id, message);
            match provider.save_message(stored).await {
                Ok(()) => saved += 1,
                Err(e) => {
                    tracing::warn!(chat_id = %chat_id, role = message.role.as_str(), error = %e, "failed to save message");
                    errors.push(format!("save {} message: {e}", message.role.as_str()));
                }
            }
        }
        (saved, errors)
    };

    let chat = async {
        if !provider.supports_chats() {
            return Ok(false);
        }
        let mut chat = job
            .chat
            .clone()
            .unwrap_or_else(|| ChatSession::new(chat_id, job.user_id.clone()));
        chat.message_count += 2;
        chat.updated_at = Utc::now();
        if chat.title.is_none() {
            chat.title = job.title.clone();
        }
        provider.save_chat(chat).await.map(|_| true)
    };

    let ((saved_messages, mut errors), chat) = tokio::join!(messages, chat);
    let chat_saved = match chat {
        Ok(saved) => saved,
        Err(e) => {
            tracing::warn!(chat_id = %chat_id, error = %e, "failed to save chat record");
            errors.push(format!("save chat: {e}"));
            false
        }
    };

    tracing::debug!(chat_id = %chat_id, saved_messages, chat_saved, "turn persisted");
    PersistOutcome {
        saved_messages,
        chat_saved,
        errors,
    }
}

/// Lets an agent rewrite its working memory.
pub struct UpdateWorkingMemoryTool {
    provider: Arc<dyn MemoryProvider>,
    config: WorkingMemoryConfig,
}

impl UpdateWorkingMemoryTool {
    pub fn new(provider: Arc<dyn MemoryProvider>, config: WorkingMemoryConfig) -> Self {
        Self { provider, config }
    }
}

#[async_trait]
impl Tool for UpdateWorkingMemoryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            UPDATE_WORKING_MEMORY_TOOL_NAME,
            UPDATE_WORKING_MEMORY_TOOL_DESCRIPTION,
            ToolParameterSchema::object(
                "Working memory update",
                HashMap::from([(
                    "memory".to_string(),
                    ToolParameterSchema::string("The complete updated working memory document"),
                )]),
                vec!["memory".to_string()],
            ),
        )
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<Value> {
        let memory = args
            .get("memory")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("missing required parameter: memory"))?;
        let key = working_memory_key(&self.config, &ctx.context).ok_or_else(|| {
            anyhow::anyhow!("no {:?} id available for working memory", self.config.scope)
        })?;
        self.provider.update_working_memory(key, memory).await?;
        tracing::debug!(scope = ?key.scope, agent = ?ctx.context.metadata.agent, "working memory updated by agent");
        Ok(json!({"success": true}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{HistoryConfig, InMemoryMemoryProvider, WorkingMemory};

    struct FailingStore;

    #[async_trait]
    impl MemoryProvider for FailingStore {
        async fn get_working_memory(&self, _key: MemoryKey<'_>) -> anyhow::Result<Option<WorkingMemory>> {
            anyhow::bail!("connection refused")
        }

        async fn update_working_memory(&self, _key: MemoryKey<'_>, _content: &str) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }

        fn supports_history(&self) -> bool {
            true
        }

        async fn get_messages(&self, _chat_id: &str, _limit: usize) -> anyhow::Result<Vec<StoredMessage>> {
            anyhow::bail!("connection refused")
        }
    }

    fn chat_ctx(chat_id: &str) -> ExecutionContext {
        let mut ctx = ExecutionContext::default();
        ctx.metadata.chat_id = Some(chat_id.to_string());
        ctx
    }

    #[tokio::test]
    async fn preload_without_config_or_chat_is_empty() {
        let snapshot = preload(None, &chat_ctx("c1")).await;
        assert!(snapshot.history.is_empty());

        let config = MemoryConfig::new(Arc::new(InMemoryMemoryProvider::new()))
            .with_history(HistoryConfig::default());
        let snapshot = preload(Some(&config), &ExecutionContext::default()).await;
        assert!(snapshot.history.is_empty());
        assert!(!snapshot.first_message);
    }

    #[tokio::test]
    async fn preload_degrades_on_provider_errors() {
        let config = MemoryConfig::new(Arc::new(FailingStore))
            .with_history(HistoryConfig { limit: 5 })
            .with_working_memory(WorkingMemoryConfig {
                scope: MemoryScope::Chat,
                template: Some("# Notes".into()),
            });
        let snapshot = preload(Some(&config), &chat_ctx("c1")).await;
        assert!(snapshot.history.is_empty());
        // Falls back to the template.
        assert!(snapshot.working_memory.unwrap().contains("# Notes"));
    }

    #[tokio::test]
    async fn persist_then_preload_round_trips_history() {
        let store = Arc::new(InMemoryMemoryProvider::new());
        let outcome = persist_turn(PersistJob {
            provider: store.clone(),
            chat_id: "c1".into(),
            user_id: Some("u1".into()),
            user_message: AgentMessage::user("what is 2+2?"),
            assistant_message: AgentMessage::assistant("4"),
            chat: None,
            title: Some("Simple sums".into()),
        })
        .await;
        assert_eq!(outcome.saved_messages, 2);
        assert!(outcome.chat_saved);

        let config = MemoryConfig::new(store.clone()).with_history(HistoryConfig::default());
        let snapshot = preload(Some(&config), &chat_ctx("c1")).await;
        let texts: Vec<String> = snapshot.history.iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["what is 2+2?", "4"]);
        let chat = snapshot.chat.unwrap();
        assert_eq!(chat.message_count, 2);
        assert_eq!(chat.title.as_deref(), Some("Simple sums"));
        assert!(!snapshot.first_message);
    }

    #[tokio::test]
    async fn working_memory_tool_writes_through_scope() {
        let store = Arc::new(InMemoryMemoryProvider::new());
        let tool = UpdateWorkingMemoryTool::new(
            store.clone(),
            WorkingMemoryConfig {
                scope: MemoryScope::User,
                template: None,
            },
        );

        let mut ctx = ExecutionContext::default();
        let missing = tool
            .execute(json!({"memory": "x"}), ToolContext::new(ctx.clone()))
            .await;
        assert!(missing.is_err());

        ctx.metadata.user_id = Some("u1".into());
        tool.execute(json!({"memory": "prefers metric units"}), ToolContext::new(ctx))
            .await
            .unwrap();
        let record = store
            .get_working_memory(MemoryKey {
                scope: MemoryScope::User,
                id: "u1",
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.content, "prefers metric units");
    }
}
