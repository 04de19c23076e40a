//! Routing demo
//!
//! A triage agent with math and history specialists, driven by an offline
//! keyword model so the whole flow runs without an API key:
//! 1. programmatic routing on an arithmetic pattern
//! 2. an agent-requested handoff from triage to history
//! 3. chat memory with a generated title
//!
//! Run with `RUST_LOG=relay_runtime=debug cargo run -p routing-demo` to watch
//! the round driver's state transitions.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use relay_sdk::prelude::*;
use relay_sdk::tools::ToolContext;
use relay_sdk::HANDOFF_TOOL_NAME;
use serde_json::json;
use tracing::info;

/// Answers from canned replies and calls the handoff tool when the user
/// mentions a topic one of the offered targets covers.
struct KeywordModel {
    name: &'static str,
    replies: Vec<(&'static str, &'static str)>,
    fallback: &'static str,
    handoffs: Vec<(&'static str, &'static str)>,
}

impl KeywordModel {
    fn reply_for(&self, input: &str) -> &'static str {
        let lower = input.to_lowercase();
        self.replies
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, reply)| *reply)
            .unwrap_or(self.fallback)
    }

    fn handoff_for(&self, input: &str) -> Option<&'static str> {
        let lower = input.to_lowercase();
        self.handoffs
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, target)| *target)
    }
}

#[async_trait]
impl LanguageModel for KeywordModel {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
        let input = request.messages.last().map(|m| m.text()).unwrap_or_default();
        Ok(LlmResponse {
            message: AgentMessage::assistant(self.reply_for(&input)),
        })
    }

    async fn stream(&self, request: LlmRequest) -> Result<relay_sdk::llm::ChunkStream> {
        let input = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == relay_sdk::messaging::MessageRole::User)
            .map(|m| m.text())
            .unwrap_or_default();

        let mut chunks = vec![UiChunk::start(format!("{}-msg", self.name)), UiChunk::StartStep];
        match (self.handoff_for(&input), request.tools.get(HANDOFF_TOOL_NAME)) {
            (Some(target), Some(tool)) => {
                let args = json!({"targetAgent": target, "reason": format!("{target} question")});
                let output = tool
                    .execute(args.clone(), ToolContext::new(request.context.clone()))
                    .await?;
                chunks.push(UiChunk::tool_input_start("call-1", HANDOFF_TOOL_NAME));
                chunks.push(UiChunk::tool_input_available("call-1", HANDOFF_TOOL_NAME, args));
                chunks.push(UiChunk::tool_output_available("call-1", output));
            }
            _ => chunks.extend(UiChunk::text_block(
                format!("{}-text", self.name),
                self.reply_for(&input),
            )),
        }
        chunks.push(UiChunk::FinishStep);
        chunks.push(UiChunk::finish(Some("stop".into())));
        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }
}

fn build_triage(store: Arc<InMemoryMemoryProvider>) -> Result<Arc<dyn AgentHandle>> {
    let math = AgentBuilder::new("math", "You are a patient math tutor. Show your steps.")
        .with_description("Arithmetic, algebra and equations")
        .with_model(Arc::new(KeywordModel {
            name: "math",
            replies: vec![("12 * 7", "12 * 7 = 84. Multiply 12 by 7, or add 12 seven times.")],
            fallback: "Let's work through it step by step.",
            handoffs: Vec::new(),
        }))
        .match_on(MatchPattern::regex(r"\d+\s*[+*/-]\s*\d+")?)
        .build()?;

    let history = AgentBuilder::new("history", "You are a history tutor. Give dates.")
        .with_description("Dates, empires and wars")
        .with_model(Arc::new(KeywordModel {
            name: "history",
            replies: vec![("rome", "The Western Roman Empire fell in 476 AD.")],
            fallback: "That happened a long time ago.",
            handoffs: Vec::new(),
        }))
        .build()?;

    let title_model = Arc::new(KeywordModel {
        name: "title",
        replies: vec![("rome", "The Fall of Rome")],
        fallback: "New conversation",
        handoffs: Vec::new(),
    });

    let triage = AgentBuilder::new(
        "triage",
        "You greet students and hand subject questions to the right tutor.",
    )
    .with_model(Arc::new(KeywordModel {
        name: "triage",
        replies: Vec::new(),
        fallback: "Hi! Ask me about math or history.",
        handoffs: vec![("rome", "history"), ("empire", "history")],
    }))
    .with_handoff(Handoff::new(Arc::new(math)))
    .with_handoff(Handoff::new(Arc::new(history)))
    .with_memory(
        MemoryConfig::new(store)
            .with_history(HistoryConfig::default())
            .with_title(TitleConfig::new(title_model)),
    )
    .build()?;

    Ok(Arc::new(triage))
}

async fn ask(triage: &Arc<dyn AgentHandle>, chat_id: &str, text: &str) -> Result<()> {
    info!("user: {text}");
    let turn = run_turn(triage.clone(), RunOptions::text(text).with_chat(chat_id))?;

    let mut chunks = turn.chunks;
    while let Some(chunk) = chunks.next().await {
        match &chunk {
            UiChunk::TextDelta { delta, .. } => info!("  text: {delta}"),
            other => info!("  {}", serde_json::to_string(other)?),
        }
    }

    if let Some(report) = turn.completion.wait().await {
        if let Some(summary) = report.summary {
            info!(agent = %summary.agent, rounds = summary.rounds, "turn summary");
        }
        if let Some(title) = report.title {
            info!("chat title: {title}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "routing_demo=info,relay_runtime=warn".into()),
        )
        .init();

    let store = Arc::new(InMemoryMemoryProvider::new());
    let triage = build_triage(store.clone())?;

    ask(&triage, "chat-1", "hello there").await?;
    ask(&triage, "chat-2", "what is 12 * 7?").await?;
    ask(&triage, "chat-3", "when did rome fall?").await?;

    Ok(())
}
