//! The round driver: one user turn, from inbound message to terminal `finish` chunk.
//!
//! States: `Routing -> Executing -> (Handoff -> Executing)* -> Done | Error`.
//! Exactly one `start` and one `finish` chunk reach the consumer per turn.
//! Everything the turn does after the stream (persistence, a late title) runs
//! detached and reports through [`TurnCompletion`].

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use futures::{FutureExt, Stream, StreamExt};
use relay_core::{
    AgentEvent, AgentHandle, AgentMessage, AgentRunRequest, AgentStatus, EventDispatcher,
    ExecutionContext, GuardrailVerdict, Handoff, HandoffInputData, HandoffNotice, MemoryConfig,
    MemoryProvider, MessageMetadata, RelayError, RoutingStrategy, ToolChoice, UiChunk,
};
use relay_core::security::safe_preview;
use relay_core::ChunkWriter;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::auxiliary::{generate_suggestions, generate_title, wants_suggestions};
use crate::config::{
    EventCallback, RunOptions, DEFAULT_LAST_MESSAGES, DEFAULT_LAST_MESSAGES_WITH_HANDOFFS,
    DEFAULT_MAX_STEPS,
};
use crate::handoff::{apply_input_filter, handoff_items};
use crate::memory::{persist_turn, preload, PersistJob, PersistOutcome};
use crate::multiplexer::StreamFold;
use crate::routing::{select_starting_agent, RoutingOptions};

pub type TurnStream = Pin<Box<dyn Stream<Item = UiChunk> + Send>>;

/// Outward stream of a turn plus the handle that resolves once its detached work is done.
pub struct TurnOutput {
    pub chunks: TurnStream,
    pub completion: TurnCompletion,
}

/// What the user ended up with.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSummary {
    /// Final assistant text, after output guardrails.
    pub text: String,
    /// Agent that produced the final text.
    pub agent: String,
    pub rounds: usize,
    /// Agents in execution order.
    pub agents: Vec<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct TurnReport {
    pub summary: Option<TurnSummary>,
    pub error: Option<String>,
    pub persistence: Option<PersistOutcome>,
    pub title: Option<String>,
}

pub struct TurnCompletion {
    rx: oneshot::Receiver<TurnReport>,
}

impl TurnCompletion {
    /// Waits for persistence and late title generation. `None` when the turn
    /// was dropped before it finished.
    pub async fn wait(self) -> Option<TurnReport> {
        self.rx.await.ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnState {
    Routing,
    Executing { agent: String, round: usize },
    Handoff { from: String, to: String },
    Done,
    Error,
}

/// Bookkeeping for one turn.
#[derive(Debug, Clone)]
pub struct RunMetadata {
    /// Completed rounds.
    pub round: usize,
    /// Specialists that already held the turn; a handoff to one of them ends it.
    pub used: HashSet<String>,
    pub request_id: String,
}

impl RunMetadata {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            round: 0,
            used: HashSet::new(),
            request_id: request_id.into(),
        }
    }
}

struct EventSink {
    on_event: Option<EventCallback>,
    dispatcher: Option<EventDispatcher>,
}

impl EventSink {
    fn emit(&self, event: AgentEvent) {
        tracing::trace!(event = event.event_type_name(), "lifecycle event");
        if let Some(on_event) = &self.on_event {
            on_event(&event);
        }
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.dispatch(&event);
        }
    }
}

fn transition(state: &mut TurnState, next: TurnState, request_id: &str) {
    tracing::debug!(request_id, from = ?state, to = ?next, "turn state");
    *state = next;
}

fn tail(messages: Vec<AgentMessage>, n: usize) -> Vec<AgentMessage> {
    let mut messages = messages;
    let start = messages.len().saturating_sub(n);
    messages.split_off(start)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<UiChunk>) -> Vec<UiChunk> {
    let mut out = Vec::new();
    while let Ok(chunk) = rx.try_recv() {
        out.push(chunk);
    }
    out
}

/// Takes the task's result if it has already finished.
fn take_if_ready<T>(slot: &mut Option<JoinHandle<Option<T>>>) -> Option<T> {
    let handle = slot.as_mut()?;
    let joined = handle.now_or_never()?;
    *slot = None;
    joined.ok().flatten()
}

/// Looks up a handoff target among the current agent's handoffs, then the
/// orchestrator's. The orchestrator itself is a valid target.
fn resolve_target(current: &Arc<dyn AgentHandle>, orchestrator: &Arc<dyn AgentHandle>, name: &str) -> Option<Handoff> {
    current
        .handoffs()
        .iter()
        .chain(orchestrator.handoffs())
        .find(|h| h.name() == name)
        .cloned()
        .or_else(|| (orchestrator.name() == name).then(|| Handoff::new(orchestrator.clone())))
}

fn validate(options: &RunOptions) -> Result<(), RelayError> {
    if options.message.text().trim().is_empty() && !options.message.content.has_files() {
        return Err(RelayError::EmptyMessage);
    }
    if options.max_rounds == 0 {
        return Err(RelayError::ZeroRounds);
    }
    if options.last_messages == Some(0) {
        return Err(RelayError::InvalidOption("last_messages must be at least 1".into()));
    }
    if options.max_steps == Some(0) {
        return Err(RelayError::InvalidOption("max_steps must be at least 1".into()));
    }
    if matches!(options.agent_choice.as_deref(), Some(name) if name.trim().is_empty()) {
        return Err(RelayError::InvalidOption("agent_choice must not be blank".into()));
    }
    Ok(())
}

struct Finalize {
    persist: Option<PersistJob>,
    late_title: Option<LateTitle>,
    title: Option<String>,
    summary: TurnSummary,
    reporter: Option<oneshot::Sender<TurnReport>>,
}

struct LateTitle {
    handle: JoinHandle<Option<String>>,
    provider: Arc<dyn MemoryProvider>,
    chat_id: String,
}

async fn finalize(job: Finalize) {
    let persistence = match job.persist {
        Some(persist) => Some(persist_turn(persist).await),
        None => None,
    };

    let mut title = job.title;
    if let Some(late) = job.late_title {
        if let Ok(Some(generated)) = late.handle.await {
            match late.provider.update_chat_title(&late.chat_id, &generated).await {
                Ok(()) => tracing::debug!(chat_id = %late.chat_id, "stored late chat title"),
                Err(e) => tracing::warn!(chat_id = %late.chat_id, error = %e, "failed to store chat title"),
            }
            title = Some(generated);
        }
    }

    if let Some(reporter) = job.reporter {
        let _ = reporter.send(TurnReport {
            summary: Some(job.summary),
            error: None,
            persistence,
            title,
        });
    }
}

fn spawn_title(memory: &MemoryConfig, text: String) -> Option<JoinHandle<Option<String>>> {
    let config = memory.title()?.clone();
    Some(tokio::spawn(async move {
        match generate_title(&config, &text).await {
            Ok(title) => Some(title),
            Err(e) => {
                tracing::warn!(error = %e, "title generation failed");
                None
            }
        }
    }))
}

/// Runs one turn with `orchestrator` as the default agent.
///
/// Configuration errors are returned before any stream exists. Every other
/// failure surfaces as an `error` chunk followed by `finish`.
pub fn run_turn(orchestrator: Arc<dyn AgentHandle>, options: RunOptions) -> Result<TurnOutput, RelayError> {
    validate(&options)?;

    let request_id = Uuid::new_v4().to_string();
    let (writer, mut side_rx) = ChunkWriter::channel();
    let (report_tx, report_rx) = oneshot::channel();

    let mut ctx = ExecutionContext::from_value(options.context.clone()).with_writer(writer);
    ctx.metadata.request_id = request_id.clone();
    ctx.metadata.chat_id = options
        .chat_id
        .clone()
        .or_else(|| ctx.get_str("chatId").map(str::to_string));
    ctx.metadata.user_id = options
        .user_id
        .clone()
        .or_else(|| ctx.get_str("userId").map(str::to_string));

    let events = EventSink {
        on_event: options.on_event.clone(),
        dispatcher: options.events.clone(),
    };
    let memory = orchestrator.memory().cloned();

    tracing::info!(
        request_id = %request_id,
        orchestrator = %orchestrator.name(),
        chat_id = ?ctx.metadata.chat_id,
        max_rounds = options.max_rounds,
        message = %safe_preview(&options.message.text()),
        "turn started"
    );

    let chunks = stream! {
        let mut reporter = Some(report_tx);
        let mut state = TurnState::Routing;
        let mut meta = RunMetadata::new(request_id.clone());

        yield UiChunk::start(request_id.clone());
        yield UiChunk::status(AgentStatus::Routing, orchestrator.name());

        let snapshot = preload(memory.as_ref(), &ctx).await;
        ctx.working_memory = snapshot.working_memory.clone();
        let chat_id = ctx.chat_id().map(str::to_string);

        let mut user_message = options.message.clone();
        if let Some(guardrails) = orchestrator.guardrails() {
            match guardrails.check_input(&user_message.text(), &ctx).await {
                GuardrailVerdict::Pass => {}
                GuardrailVerdict::Modify { content } => user_message = AgentMessage::user(content),
                GuardrailVerdict::Block { message } => {
                    tracing::info!(request_id = %meta.request_id, input = %safe_preview(&user_message.text()), "input blocked by guardrail");
                    transition(&mut state, TurnState::Done, &meta.request_id);
                    let summary = TurnSummary {
                        text: message.clone(),
                        agent: orchestrator.name().to_string(),
                        rounds: 0,
                        agents: Vec::new(),
                        finish_reason: Some("content-filter".into()),
                        usage: None,
                    };
                    events.emit(AgentEvent::AgentComplete { total_rounds: 0 });
                    if let Some(on_finish) = &options.on_finish {
                        on_finish(&summary);
                    }
                    if let Some(reporter) = reporter.take() {
                        let _ = reporter.send(TurnReport { summary: Some(summary), ..Default::default() });
                    }
                    for chunk in UiChunk::text_block(Uuid::new_v4().to_string(), message) {
                        yield chunk;
                    }
                    yield UiChunk::status(AgentStatus::Completing, orchestrator.name());
                    yield UiChunk::finish(Some("content-filter".into()));
                    return;
                }
            }
        }

        // Titles are generated from the message as it passed the input guardrails.
        let mut title_task = match (&memory, &chat_id) {
            (Some(memory), Some(_)) if snapshot.first_message => spawn_title(memory, user_message.text()),
            _ => None,
        };
        let mut title: Option<String> = None;

        let mut input_history = snapshot.history.clone();
        input_history.push(user_message.clone());
        let mut turn_items: Vec<AgentMessage> = Vec::new();

        let user_text = user_message.text();
        let decision = select_starting_agent(
            &orchestrator,
            &user_text,
            &RoutingOptions {
                explicit_agent: options.agent_choice.as_deref(),
                tool_choice: options.tool_choice.as_deref(),
                mode: options.strategy,
            },
            &ctx,
        );
        let mut current = decision.agent.clone();
        let mut tool_choice = None;
        if let Some(strategy) = decision.strategy {
            meta.used.insert(current.name().to_string());
            if strategy == RoutingStrategy::ToolChoice {
                tool_choice = options.tool_choice.clone().map(ToolChoice::Tool);
            }
            tracing::info!(agent = %current.name(), strategy = strategy.as_str(), "routed turn");
            yield UiChunk::handoff(HandoffNotice {
                from: orchestrator.name().to_string(),
                to: current.name().to_string(),
                reason: None,
                routing_strategy: strategy,
            });
        }

        let mut agents = Vec::new();
        let mut final_text = String::new();
        let mut finish_reason = None;
        let mut usage = None;

        loop {
            let round = meta.round;
            let name = current.name().to_string();
            transition(&mut state, TurnState::Executing { agent: name.clone(), round }, &meta.request_id);
            agents.push(name.clone());
            yield UiChunk::status(AgentStatus::Executing, name.clone());
            events.emit(AgentEvent::AgentStart { agent: name.clone(), round });

            ctx.metadata.agent = Some(name.clone());
            let window = options.last_messages.unwrap_or(if current.handoffs().is_empty() {
                DEFAULT_LAST_MESSAGES
            } else {
                DEFAULT_LAST_MESSAGES_WITH_HANDOFFS
            });
            let conversation: Vec<AgentMessage> = input_history.iter().chain(turn_items.iter()).cloned().collect();
            let request = AgentRunRequest {
                messages: tail(conversation, window),
                context: ctx.clone(),
                max_steps: options.max_steps.or(current.max_steps()).unwrap_or(DEFAULT_MAX_STEPS),
                tool_choice: tool_choice.take(),
            };

            let mut failure = None;
            let mut fold = StreamFold::new();
            match current.run(request).await {
                Ok(mut agent_stream) => {
                    while let Some(item) = agent_stream.next().await {
                        let chunk = match item {
                            Ok(chunk) => chunk,
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        };
                        let step = matches!(chunk, UiChunk::StartStep);
                        if let Some(forward) = fold.observe(chunk) {
                            yield forward;
                        }
                        if step {
                            events.emit(AgentEvent::AgentStep { agent: name.clone(), step: fold.steps() });
                        }
                        for side in drain(&mut side_rx) {
                            yield side;
                        }
                        if let (Some(generated), Some(chat_id)) = (take_if_ready(&mut title_task), &chat_id) {
                            title = Some(generated.clone());
                            yield UiChunk::chat_title(chat_id.clone(), generated);
                        }
                    }
                }
                Err(e) => failure = Some(e),
            }
            for side in drain(&mut side_rx) {
                yield side;
            }

            if let Some(e) = failure {
                transition(&mut state, TurnState::Error, &meta.request_id);
                tracing::error!(agent = %name, round, error = %e, "agent execution failed");
                if let Some(task) = title_task.take() {
                    task.abort();
                }
                events.emit(AgentEvent::AgentError { error: e.to_string() });
                if let Some(on_error) = &options.on_error {
                    on_error(&e);
                }
                if let Some(reporter) = reporter.take() {
                    let _ = reporter.send(TurnReport { error: Some(e.to_string()), ..Default::default() });
                }
                yield UiChunk::error(e.to_string());
                yield UiChunk::finish(Some("error".into()));
                return;
            }

            let outcome = fold.finish();
            events.emit(AgentEvent::AgentFinish { agent: name.clone(), round });
            meta.round += 1;
            final_text = outcome.text.clone();
            finish_reason = outcome.finish_reason.clone();
            if outcome.usage.is_some() {
                usage = outcome.usage.clone();
            }

            let Some(signal) = outcome.handoff.clone() else {
                break;
            };
            let target_name = signal.target_agent.clone();
            if meta.used.contains(&target_name) {
                tracing::info!(from = %name, to = %target_name, "handoff target already handled this turn; stopping");
                break;
            }
            if meta.round >= options.max_rounds {
                tracing::info!(from = %name, to = %target_name, max_rounds = options.max_rounds, "round budget exhausted; stopping");
                break;
            }
            let Some(target) = resolve_target(&current, &orchestrator, &target_name) else {
                tracing::warn!(from = %name, to = %target_name, "handoff to unknown agent; stopping");
                break;
            };

            transition(&mut state, TurnState::Handoff { from: name.clone(), to: target_name.clone() }, &meta.request_id);
            if let Some(on_handoff) = &target.on_handoff {
                if let Err(e) = on_handoff(&signal, &ctx) {
                    tracing::warn!(to = %target_name, error = %e, "on_handoff callback failed; continuing");
                }
            }
            let data = HandoffInputData {
                input_history: input_history.clone(),
                pre_handoff_items: std::mem::take(&mut turn_items),
                new_items: handoff_items(&name, &outcome, &signal),
                run_context: ctx.clone(),
            };
            let filtered = apply_input_filter(target.input_filter.as_ref(), &target_name, data);
            input_history = filtered.input_history;
            turn_items = filtered.pre_handoff_items;
            turn_items.extend(filtered.new_items);

            if target.agent.name() != orchestrator.name() {
                meta.used.insert(target_name.clone());
            }
            tracing::info!(from = %name, to = %target_name, reason = ?signal.reason, "handoff");
            yield UiChunk::handoff(HandoffNotice {
                from: name.clone(),
                to: target_name.clone(),
                reason: signal.reason.clone(),
                routing_strategy: RoutingStrategy::Llm,
            });
            events.emit(AgentEvent::AgentHandoff { from: name, to: target_name, reason: signal.reason });
            current = target.agent;
        }

        transition(&mut state, TurnState::Done, &meta.request_id);
        let final_agent = current.name().to_string();

        let mut persisted_text = final_text.clone();
        if let Some(guardrails) = current.guardrails() {
            if !final_text.is_empty() {
                match guardrails.check_output(&final_text, &ctx).await {
                    GuardrailVerdict::Pass => {}
                    GuardrailVerdict::Modify { content } => persisted_text = content,
                    GuardrailVerdict::Block { message } => {
                        yield UiChunk::error(message.clone());
                        persisted_text = message;
                    }
                }
            }
        }

        let mut assistant_message = AgentMessage::assistant(persisted_text.clone());
        assistant_message.metadata = Some(MessageMetadata { agent: Some(final_agent.clone()), tool_call_id: None });

        if let Some(config) = memory.as_ref().and_then(|m| m.suggestions()).cloned() {
            if wants_suggestions(&config, &persisted_text) {
                let mut conversation = input_history.clone();
                conversation.push(assistant_message.clone());
                let wait = config.wait;
                let mut handle = tokio::spawn(async move { generate_suggestions(&config, &conversation).await });
                match tokio::time::timeout(wait, &mut handle).await {
                    Ok(Ok(Ok(prompts))) => yield UiChunk::suggestions(prompts),
                    Ok(Ok(Err(e))) => tracing::warn!(error = %e, "suggestion generation failed"),
                    Ok(Err(e)) => tracing::warn!(error = %e, "suggestion task panicked"),
                    Err(_) => {
                        handle.abort();
                        tracing::debug!("suggestions not ready before the stream closed; dropped");
                    }
                }
            }
        }

        for side in drain(&mut side_rx) {
            yield side;
        }
        yield UiChunk::status(AgentStatus::Completing, final_agent.clone());

        if let Some(handle) = title_task.as_mut() {
            let wait = memory.as_ref().and_then(|m| m.title()).map(|t| t.wait).unwrap_or_default();
            match tokio::time::timeout(wait, handle).await {
                Ok(joined) => {
                    title_task = None;
                    match (joined, &chat_id) {
                        (Ok(Some(generated)), Some(chat_id)) => {
                            title = Some(generated.clone());
                            yield UiChunk::chat_title(chat_id.clone(), generated);
                        }
                        (Err(e), _) => tracing::warn!(error = %e, "title task panicked"),
                        _ => {}
                    }
                }
                Err(_) => tracing::debug!(?wait, "title not ready before the stream closed; storing it afterwards"),
            }
        }

        let summary = TurnSummary {
            text: persisted_text,
            agent: final_agent,
            rounds: meta.round,
            agents,
            finish_reason: finish_reason.clone(),
            usage,
        };
        events.emit(AgentEvent::AgentComplete { total_rounds: meta.round });
        tracing::info!(request_id = %meta.request_id, rounds = meta.round, agent = %summary.agent, "turn complete");

        let persist = match (&memory, &chat_id) {
            (Some(memory), Some(chat_id)) => Some(PersistJob {
                provider: memory.provider.clone(),
                chat_id: chat_id.clone(),
                user_id: ctx.user_id().map(str::to_string),
                user_message: user_message.clone(),
                assistant_message,
                chat: snapshot.chat.clone(),
                title: title.clone(),
            }),
            _ => None,
        };
        let late_title = match (title_task.take(), &memory, &chat_id) {
            (Some(handle), Some(memory), Some(chat_id)) => Some(LateTitle {
                handle,
                provider: memory.provider.clone(),
                chat_id: chat_id.clone(),
            }),
            _ => None,
        };
        if let Some(on_finish) = &options.on_finish {
            on_finish(&summary);
        }
        tokio::spawn(finalize(Finalize {
            persist,
            late_title,
            title,
            summary,
            reporter: reporter.take(),
        }));

        yield UiChunk::finish(finish_reason);
    };

    Ok(TurnOutput {
        chunks: Box::pin(chunks),
        completion: TurnCompletion { rx: report_rx },
    })
}

/// Convenience for callers that want the whole turn at once.
pub async fn collect_turn(
    orchestrator: Arc<dyn AgentHandle>,
    options: RunOptions,
) -> Result<(Vec<UiChunk>, Option<TurnReport>), RelayError> {
    let TurnOutput { chunks, completion } = run_turn(orchestrator, options)?;
    let chunks = chunks.collect::<Vec<_>>().await;
    Ok((chunks, completion.wait().await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubAgent;
    use async_trait::async_trait;
    use relay_core::{
        AgentDescriptor, ChunkStream, MatchPattern, MessageRole, HANDOFF_TOOL_NAME,
    };
    use serde_json::json;
    use std::sync::Mutex;

    fn answer(text: &str) -> Vec<UiChunk> {
        let mut chunks = vec![UiChunk::start("agent-msg"), UiChunk::StartStep];
        chunks.extend(UiChunk::text_block("t1", text));
        chunks.push(UiChunk::FinishStep);
        chunks.push(UiChunk::finish(Some("stop".into())));
        chunks
    }

    fn hand_off(call_id: &str, target: &str) -> Vec<UiChunk> {
        vec![
            UiChunk::start("agent-msg"),
            UiChunk::StartStep,
            UiChunk::tool_input_start(call_id, HANDOFF_TOOL_NAME),
            UiChunk::tool_input_available(call_id, HANDOFF_TOOL_NAME, json!({"targetAgent": target})),
            UiChunk::tool_output_available(
                call_id,
                json!({"targetAgent": target, "reason": "better fit"}),
            ),
            UiChunk::FinishStep,
            UiChunk::finish(Some("tool-calls".into())),
        ]
    }

    fn kinds(chunks: &[UiChunk]) -> Vec<&'static str> {
        chunks.iter().map(UiChunk::kind).collect()
    }

    fn count(chunks: &[UiChunk], kind: &str) -> usize {
        chunks.iter().filter(|c| c.kind() == kind).count()
    }

    fn handoffs(chunks: &[UiChunk]) -> Vec<(String, String, RoutingStrategy)> {
        chunks
            .iter()
            .filter_map(|c| match c {
                UiChunk::AgentHandoff { data } => {
                    Some((data.from.clone(), data.to.clone(), data.routing_strategy))
                }
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn orchestrator_answers_directly() {
        let triage = Arc::new(StubAgent::new("triage").with_round(answer("Hello there")));
        let (chunks, report) = collect_turn(triage.clone(), RunOptions::text("hi"))
            .await
            .unwrap();

        assert_eq!(
            kinds(&chunks),
            vec![
                "start",
                "data-agent-status",
                "data-agent-status",
                "start-step",
                "text-start",
                "text-delta",
                "text-end",
                "finish-step",
                "data-agent-status",
                "finish",
            ]
        );
        assert_eq!(chunks.last(), Some(&UiChunk::finish(Some("stop".into()))));

        let summary = report.unwrap().summary.unwrap();
        assert_eq!(summary.text, "Hello there");
        assert_eq!(summary.agent, "triage");
        assert_eq!(summary.rounds, 1);
        assert_eq!(triage.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn handoff_chunks_never_reach_the_consumer() {
        let history = Arc::new(StubAgent::new("history").with_round(answer("Rome fell in 476.")));
        let mut round = UiChunk::text_block("t0", "Let me get the history tutor.");
        round.extend(hand_off("call-1", "history"));
        let triage = Arc::new(
            StubAgent::new("triage")
                .with_handoffs(vec![Handoff::new(history.clone())])
                .with_round(round),
        );

        let (chunks, report) = collect_turn(triage, RunOptions::text("when did rome fall"))
            .await
            .unwrap();

        // The consumer saw the intermediate text; the next agent does not.
        assert!(chunks.contains(&UiChunk::text_delta("t0", "Let me get the history tutor.")));

        assert!(chunks.iter().all(|c| c.tool_call_id() != Some("call-1")));
        assert_eq!(count(&chunks, "start"), 1);
        assert_eq!(count(&chunks, "finish"), 1);
        assert_eq!(
            handoffs(&chunks),
            vec![("triage".into(), "history".into(), RoutingStrategy::Llm)]
        );

        let requests = history.requests.lock().unwrap();
        assert!(requests[0]
            .messages
            .iter()
            .all(|m| !m.text().contains("history tutor")));
        let carried = requests[0].messages.last().unwrap();
        assert_eq!(carried.role, MessageRole::Tool);
        let record = carried.content.as_json().unwrap();
        assert_eq!(record["handoffFrom"], "triage");
        assert_eq!(record["handoffReason"], "better fit");

        let summary = report.unwrap().summary.unwrap();
        assert_eq!(summary.agents, vec!["triage", "history"]);
        assert_eq!(summary.text, "Rome fell in 476.");
    }

    #[tokio::test]
    async fn returning_to_a_used_agent_ends_the_turn() {
        // Neither specialist declares handoffs; targets resolve through the orchestrator.
        let math = Arc::new(
            StubAgent::new("math")
                .with_pattern(MatchPattern::text("+"))
                .with_round(hand_off("call-1", "history")),
        );
        let history = Arc::new(StubAgent::new("history").with_round(hand_off("call-2", "math")));
        let triage = Arc::new(StubAgent::new("triage").with_handoffs(vec![
            Handoff::new(math.clone()),
            Handoff::new(history.clone()),
        ]));

        let (chunks, report) = collect_turn(triage, RunOptions::text("2 + 2 and the year rome fell"))
            .await
            .unwrap();

        assert_eq!(
            handoffs(&chunks),
            vec![
                ("triage".into(), "math".into(), RoutingStrategy::Programmatic),
                ("math".into(), "history".into(), RoutingStrategy::Llm),
            ]
        );
        assert_eq!(math.requests.lock().unwrap().len(), 1);
        let summary = report.unwrap().summary.unwrap();
        assert_eq!(summary.rounds, 2);
        assert_eq!(summary.agents, vec!["math", "history"]);
        assert_eq!(chunks.last().map(UiChunk::kind), Some("finish"));
    }

    #[tokio::test]
    async fn round_budget_stops_before_the_target_runs() {
        let history = Arc::new(StubAgent::new("history").with_round(answer("unused")));
        let triage = Arc::new(
            StubAgent::new("triage")
                .with_handoffs(vec![Handoff::new(history.clone())])
                .with_round(hand_off("call-1", "history")),
        );

        let (chunks, report) = collect_turn(triage, RunOptions::text("history please").with_max_rounds(1))
            .await
            .unwrap();

        assert!(history.requests.lock().unwrap().is_empty());
        assert!(handoffs(&chunks).is_empty());
        assert_eq!(report.unwrap().summary.unwrap().rounds, 1);
    }

    #[tokio::test]
    async fn handing_back_to_the_orchestrator_is_bounded_by_rounds() {
        let math = Arc::new(StubAgent::new("math").with_round(hand_off("call-2", "triage")));
        let history = Arc::new(StubAgent::new("history").with_round(answer("unused")));
        let triage = Arc::new(
            StubAgent::new("triage")
                .with_handoffs(vec![Handoff::new(math.clone()), Handoff::new(history.clone())])
                .with_round(hand_off("call-1", "math"))
                .with_round(hand_off("call-3", "history")),
        );

        let (chunks, report) = collect_turn(triage.clone(), RunOptions::text("help").with_max_rounds(3))
            .await
            .unwrap();

        assert_eq!(
            handoffs(&chunks),
            vec![
                ("triage".into(), "math".into(), RoutingStrategy::Llm),
                ("math".into(), "triage".into(), RoutingStrategy::Llm),
            ]
        );
        assert_eq!(triage.requests.lock().unwrap().len(), 2);
        assert!(history.requests.lock().unwrap().is_empty());
        let summary = report.unwrap().summary.unwrap();
        assert_eq!(summary.rounds, 3);
        assert_eq!(summary.agents, vec!["triage", "math", "triage"]);
    }

    #[tokio::test]
    async fn orchestrator_cannot_send_the_turn_back_to_a_used_specialist() {
        let math = Arc::new(
            StubAgent::new("math")
                .with_round(hand_off("call-2", "triage"))
                .with_round(answer("unused")),
        );
        let triage = Arc::new(
            StubAgent::new("triage")
                .with_handoffs(vec![Handoff::new(math.clone())])
                .with_round(hand_off("call-1", "math"))
                .with_round(hand_off("call-3", "math")),
        );

        let (chunks, report) = collect_turn(triage, RunOptions::text("help").with_max_rounds(5))
            .await
            .unwrap();

        let notices = handoffs(&chunks);
        assert_eq!(notices.len(), 2);
        assert_eq!(notices.last().map(|(_, to, _)| to.as_str()), Some("triage"));
        assert_eq!(math.requests.lock().unwrap().len(), 1);
        let summary = report.unwrap().summary.unwrap();
        assert_eq!(summary.rounds, 3);
        assert_eq!(summary.agent, "triage");
    }

    struct ProgressAgent {
        descriptor: AgentDescriptor,
    }

    #[async_trait]
    impl AgentHandle for ProgressAgent {
        fn descriptor(&self) -> &AgentDescriptor {
            &self.descriptor
        }

        async fn run(&self, request: AgentRunRequest) -> anyhow::Result<ChunkStream> {
            for chunk in UiChunk::text_block("progress", "Looking that up...") {
                request.context.write(chunk);
            }
            Ok(Box::pin(futures::stream::iter(answer("Found it.").into_iter().map(Ok))))
        }
    }

    #[tokio::test]
    async fn side_channel_chunks_are_merged_before_finish() {
        let agent = Arc::new(ProgressAgent {
            descriptor: AgentDescriptor {
                name: "researcher".into(),
                description: None,
            },
        });
        let (chunks, _) = collect_turn(agent, RunOptions::text("look it up")).await.unwrap();

        let progress = chunks
            .iter()
            .position(|c| c == &UiChunk::text_delta("progress", "Looking that up..."))
            .unwrap();
        let finish = chunks.iter().position(UiChunk::is_finish).unwrap();
        assert!(progress < finish);
    }

    #[tokio::test]
    async fn agent_failure_becomes_error_then_finish() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = errors.clone();
        let triage = Arc::new(StubAgent::new("triage"));
        let options = RunOptions::text("hi").on_error(move |e| seen.lock().unwrap().push(e.to_string()));

        let (chunks, report) = collect_turn(triage, options).await.unwrap();

        let tail: Vec<&str> = kinds(&chunks).into_iter().rev().take(2).collect();
        assert_eq!(tail, vec!["finish", "error"]);
        assert_eq!(chunks.last(), Some(&UiChunk::finish(Some("error".into()))));
        let report = report.unwrap();
        assert!(report.summary.is_none());
        assert!(report.error.unwrap().contains("no scripted round"));
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lifecycle_events_follow_the_turn() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let history = Arc::new(StubAgent::new("history").with_round(answer("476 AD")));
        let triage = Arc::new(
            StubAgent::new("triage")
                .with_handoffs(vec![Handoff::new(history)])
                .with_round(hand_off("call-1", "history")),
        );
        let options = RunOptions::text("rome?").on_event(move |e| {
            sink.lock().unwrap().push(e.event_type_name());
        });

        let _ = collect_turn(triage, options).await.unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "agent-start",
                "agent-step",
                "agent-finish",
                "agent-handoff",
                "agent-start",
                "agent-step",
                "agent-finish",
                "agent-complete",
            ]
        );
    }

    #[test]
    fn invalid_options_fail_before_streaming() {
        let agent: Arc<dyn AgentHandle> = Arc::new(StubAgent::new("triage"));
        assert!(matches!(
            run_turn(agent.clone(), RunOptions::text("   ")),
            Err(RelayError::EmptyMessage)
        ));
        assert!(matches!(
            run_turn(agent.clone(), RunOptions::text("hi").with_max_rounds(0)),
            Err(RelayError::ZeroRounds)
        ));
        assert!(matches!(
            run_turn(agent, RunOptions::text("hi").with_last_messages(0)),
            Err(RelayError::InvalidOption(_))
        ));
    }
}
