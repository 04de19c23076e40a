//! Memory gateway: working memory, conversation history and chat metadata.
//!
//! Only working memory is mandatory for a provider. History and chat records
//! are optional capabilities; the default method bodies make an unsupported
//! capability look like an empty store.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::LanguageModel;
use crate::messaging::{AgentMessage, MessageContent, MessageRole};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const DEFAULT_SUGGESTIONS_MIN_LENGTH: usize = 100;
pub const DEFAULT_SUGGESTIONS_CONTEXT_WINDOW: usize = 4;
pub const DEFAULT_SUGGESTIONS_COUNT: usize = 3;
pub const DEFAULT_TITLE_MAX_LENGTH: usize = 80;
pub const DEFAULT_SUGGESTIONS_WAIT: Duration = Duration::from_secs(3);
pub const DEFAULT_TITLE_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    #[default]
    Chat,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkingMemory {
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub role: MessageRole,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    /// Durable copy of `message`; file parts never reach the store.
    pub fn from_message(chat_id: &str, user_id: Option<&str>, message: &AgentMessage) -> Self {
        let message = message.without_files();
        Self {
            chat_id: chat_id.to_string(),
            user_id: user_id.map(str::to_string),
            role: message.role,
            content: message.content,
            timestamp: Utc::now(),
        }
    }

    pub fn into_message(self) -> AgentMessage {
        AgentMessage::new(self.role, self.content)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(chat_id: impl Into<String>, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            chat_id: chat_id.into(),
            user_id,
            title: None,
            message_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Key for a working-memory record: the chat id or the user id, depending on scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryKey<'a> {
    pub scope: MemoryScope,
    pub id: &'a str,
}

#[async_trait]
pub trait MemoryProvider: Send + Sync {
    async fn get_working_memory(&self, key: MemoryKey<'_>) -> anyhow::Result<Option<WorkingMemory>>;

    async fn update_working_memory(&self, key: MemoryKey<'_>, content: &str) -> anyhow::Result<()>;

    fn supports_history(&self) -> bool {
        false
    }

    fn supports_chats(&self) -> bool {
        false
    }

    async fn save_message(&self, _message: StoredMessage) -> anyhow::Result<()> {
        Ok(())
    }

    /// The most recent `limit` messages of a chat, oldest first.
    async fn get_messages(&self, _chat_id: &str, _limit: usize) -> anyhow::Result<Vec<StoredMessage>> {
        Ok(Vec::new())
    }

    /// Inserts or replaces the chat record.
    async fn save_chat(&self, _chat: ChatSession) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get_chat(&self, _chat_id: &str) -> anyhow::Result<Option<ChatSession>> {
        Ok(None)
    }

    async fn update_chat_title(&self, _chat_id: &str, _title: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkingMemoryConfig {
    #[serde(default)]
    pub scope: MemoryScope,
    /// Initial document used until the agent writes its first update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[derive(Clone)]
pub struct TitleConfig {
    pub model: Arc<dyn LanguageModel>,
    /// Overrides the built-in title prompt.
    pub instructions: Option<String>,
    pub max_length: usize,
    /// How long the turn holds its `finish` chunk for the title. A title that
    /// misses it is still stored, but never streamed.
    pub wait: Duration,
}

impl TitleConfig {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            instructions: None,
            max_length: DEFAULT_TITLE_MAX_LENGTH,
            wait: DEFAULT_TITLE_WAIT,
        }
    }
}

#[derive(Clone)]
pub struct SuggestionsConfig {
    pub model: Arc<dyn LanguageModel>,
    pub instructions: Option<String>,
    /// Responses at or below this many characters get no suggestions.
    pub min_response_length: usize,
    /// Number of trailing messages handed to the suggestion model.
    pub context_window: usize,
    pub count: usize,
    /// How long the turn holds its `finish` chunk for suggestions before dropping them.
    pub wait: Duration,
}

impl SuggestionsConfig {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            instructions: None,
            min_response_length: DEFAULT_SUGGESTIONS_MIN_LENGTH,
            context_window: DEFAULT_SUGGESTIONS_CONTEXT_WINDOW,
            count: DEFAULT_SUGGESTIONS_COUNT,
            wait: DEFAULT_SUGGESTIONS_WAIT,
        }
    }
}

#[derive(Clone, Default)]
pub struct ChatsConfig {
    pub generate_title: Option<TitleConfig>,
    pub suggestions: Option<SuggestionsConfig>,
}

/// Memory settings of an agent. Only the orchestrator's configuration is
/// consulted for a turn.
#[derive(Clone)]
pub struct MemoryConfig {
    pub provider: Arc<dyn MemoryProvider>,
    pub working_memory: Option<WorkingMemoryConfig>,
    pub history: Option<HistoryConfig>,
    pub chats: Option<ChatsConfig>,
}

impl MemoryConfig {
    pub fn new(provider: Arc<dyn MemoryProvider>) -> Self {
        Self {
            provider,
            working_memory: None,
            history: None,
            chats: None,
        }
    }

    pub fn with_working_memory(mut self, config: WorkingMemoryConfig) -> Self {
        self.working_memory = Some(config);
        self
    }

    pub fn with_history(mut self, config: HistoryConfig) -> Self {
        self.history = Some(config);
        self
    }

    pub fn with_title(mut self, config: TitleConfig) -> Self {
        self.chats.get_or_insert_with(ChatsConfig::default).generate_title = Some(config);
        self
    }

    pub fn with_suggestions(mut self, config: SuggestionsConfig) -> Self {
        self.chats.get_or_insert_with(ChatsConfig::default).suggestions = Some(config);
        self
    }

    pub fn title(&self) -> Option<&TitleConfig> {
        self.chats.as_ref()?.generate_title.as_ref()
    }

    pub fn suggestions(&self) -> Option<&SuggestionsConfig> {
        self.chats.as_ref()?.suggestions.as_ref()
    }
}

impl fmt::Debug for MemoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConfig")
            .field("working_memory", &self.working_memory)
            .field("history", &self.history)
            .field("title", &self.title().is_some())
            .field("suggestions", &self.suggestions().is_some())
            .finish()
    }
}

/// Process-local provider for tests and development. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryMemoryProvider {
    working: RwLock<HashMap<(MemoryScope, String), WorkingMemory>>,
    messages: RwLock<HashMap<String, Vec<StoredMessage>>>,
    chats: RwLock<HashMap<String, ChatSession>>,
}

impl InMemoryMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(store: &str) -> anyhow::Error {
    anyhow::anyhow!("in-memory {store} store lock poisoned")
}

#[async_trait]
impl MemoryProvider for InMemoryMemoryProvider {
    async fn get_working_memory(&self, key: MemoryKey<'_>) -> anyhow::Result<Option<WorkingMemory>> {
        let working = self.working.read().map_err(|_| poisoned("working memory"))?;
        Ok(working.get(&(key.scope, key.id.to_string())).cloned())
    }

    async fn update_working_memory(&self, key: MemoryKey<'_>, content: &str) -> anyhow::Result<()> {
        let mut working = self.working.write().map_err(|_| poisoned("working memory"))?;
        working.insert(
            (key.scope, key.id.to_string()),
            WorkingMemory {
                content: content.to_string(),
                updated_at: Utc::now(),
            },
        );
        tracing::debug!(scope = ?key.scope, id = %key.id, "updated working memory");
        Ok(())
    }

    fn supports_history(&self) -> bool {
        true
    }

    fn supports_chats(&self) -> bool {
        true
    }

    async fn save_message(&self, message: StoredMessage) -> anyhow::Result<()> {
        let mut messages = self.messages.write().map_err(|_| poisoned("message"))?;
        tracing::debug!(chat_id = %message.chat_id, role = message.role.as_str(), "stored message");
        messages
            .entry(message.chat_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn get_messages(&self, chat_id: &str, limit: usize) -> anyhow::Result<Vec<StoredMessage>> {
        let messages = self.messages.read().map_err(|_| poisoned("message"))?;
        let Some(chat) = messages.get(chat_id) else {
            return Ok(Vec::new());
        };
        let start = chat.len().saturating_sub(limit);
        Ok(chat[start..].to_vec())
    }

    async fn save_chat(&self, chat: ChatSession) -> anyhow::Result<()> {
        let mut chats = self.chats.write().map_err(|_| poisoned("chat"))?;
        chats.insert(chat.chat_id.clone(), chat);
        Ok(())
    }

    async fn get_chat(&self, chat_id: &str) -> anyhow::Result<Option<ChatSession>> {
        let chats = self.chats.read().map_err(|_| poisoned("chat"))?;
        Ok(chats.get(chat_id).cloned())
    }

    async fn update_chat_title(&self, chat_id: &str, title: &str) -> anyhow::Result<()> {
        let mut chats = self.chats.write().map_err(|_| poisoned("chat"))?;
        match chats.get_mut(chat_id) {
            Some(chat) => {
                chat.title = Some(title.to_string());
                chat.updated_at = Utc::now();
            }
            None => tracing::warn!(chat_id = %chat_id, "title update for unknown chat ignored"),
        }
        Ok(())
    }
}
