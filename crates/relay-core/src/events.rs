//! Lifecycle events for a turn and fan-out to external broadcasters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentEvent {
    AgentStart {
        agent: String,
        round: usize,
    },
    AgentStep {
        agent: String,
        step: usize,
    },
    AgentFinish {
        agent: String,
        round: usize,
    },
    AgentHandoff {
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AgentComplete {
        total_rounds: usize,
    },
    AgentError {
        error: String,
    },
}

impl AgentEvent {
    pub fn event_type_name(&self) -> &'static str {
        match self {
            AgentEvent::AgentStart { .. } => "agent-start",
            AgentEvent::AgentStep { .. } => "agent-step",
            AgentEvent::AgentFinish { .. } => "agent-finish",
            AgentEvent::AgentHandoff { .. } => "agent-handoff",
            AgentEvent::AgentComplete { .. } => "agent-complete",
            AgentEvent::AgentError { .. } => "agent-error",
        }
    }
}

#[async_trait]
pub trait EventBroadcaster: Send + Sync {
    fn id(&self) -> &str;
    async fn broadcast(&self, event: &AgentEvent) -> anyhow::Result<()>;
    fn should_broadcast(&self, _event: &AgentEvent) -> bool {
        true
    }
}

/// Fans events out to broadcasters on detached tasks so a slow sink never
/// stalls the turn.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    broadcasters: Vec<Arc<dyn EventBroadcaster>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_broadcaster(&mut self, broadcaster: Arc<dyn EventBroadcaster>) {
        self.broadcasters.push(broadcaster);
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn EventBroadcaster>) -> Self {
        self.add_broadcaster(broadcaster);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.broadcasters.is_empty()
    }

    pub fn dispatch(&self, event: &AgentEvent) {
        for broadcaster in self.broadcasters.iter().cloned() {
            if !broadcaster.should_broadcast(event) {
                continue;
            }
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(e) = broadcaster.broadcast(&event).await {
                    tracing::warn!(
                        broadcaster_id = broadcaster.id(),
                        event = event.event_type_name(),
                        error = %e,
                        "failed to broadcast event"
                    );
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Forward {
        tx: mpsc::UnboundedSender<AgentEvent>,
    }

    #[async_trait]
    impl EventBroadcaster for Forward {
        fn id(&self) -> &str {
            "forward"
        }

        async fn broadcast(&self, event: &AgentEvent) -> anyhow::Result<()> {
            self.tx.send(event.clone())?;
            Ok(())
        }

        fn should_broadcast(&self, event: &AgentEvent) -> bool {
            !matches!(event, AgentEvent::AgentStep { .. })
        }
    }

    #[test]
    fn events_serialize_kebab_case() {
        let value = serde_json::to_value(AgentEvent::AgentComplete { total_rounds: 2 }).unwrap();
        assert_eq!(value, json!({"type": "agent-complete", "totalRounds": 2}));
    }

    #[tokio::test]
    async fn dispatcher_respects_filter() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = EventDispatcher::new().with_broadcaster(Arc::new(Forward { tx }));

        dispatcher.dispatch(&AgentEvent::AgentStep {
            agent: "math".into(),
            step: 1,
        });
        dispatcher.dispatch(&AgentEvent::AgentError {
            error: "boom".into(),
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type_name(), "agent-error");
    }
}
