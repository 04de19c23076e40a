//! Starting-agent selection.

use std::sync::Arc;

use relay_core::{AgentHandle, ExecutionContext, RoutingStrategy};

use crate::config::RoutingMode;

#[derive(Debug, Clone, Default)]
pub struct RoutingOptions<'a> {
    pub explicit_agent: Option<&'a str>,
    pub tool_choice: Option<&'a str>,
    pub mode: RoutingMode,
}

#[derive(Clone)]
pub struct RoutingDecision {
    pub agent: Arc<dyn AgentHandle>,
    /// `None` when the orchestrator keeps the turn.
    pub strategy: Option<RoutingStrategy>,
}

/// Picks the agent that runs round 0. Candidates are the orchestrator's
/// handoff targets; the first rule that matches wins:
/// explicit choice, single tool owner, routing pattern, orchestrator.
pub fn select_starting_agent(
    orchestrator: &Arc<dyn AgentHandle>,
    input: &str,
    options: &RoutingOptions<'_>,
    ctx: &ExecutionContext,
) -> RoutingDecision {
    let specialists = orchestrator.handoffs();

    if let Some(name) = options.explicit_agent {
        match specialists.iter().find(|h| h.name() == name) {
            Some(h) => {
                return RoutingDecision {
                    agent: h.agent.clone(),
                    strategy: Some(RoutingStrategy::Explicit),
                }
            }
            None => tracing::warn!(agent = %name, "explicit agent choice is not a known specialist"),
        }
    }

    if let Some(tool) = options.tool_choice {
        let mut owners = specialists.iter().filter(|h| h.agent.has_tool(tool, ctx));
        match (owners.next(), owners.next()) {
            (Some(owner), None) => {
                return RoutingDecision {
                    agent: owner.agent.clone(),
                    strategy: Some(RoutingStrategy::ToolChoice),
                }
            }
            (None, _) => tracing::debug!(tool = %tool, "no specialist owns the chosen tool"),
            (Some(_), Some(_)) => tracing::debug!(tool = %tool, "chosen tool is shared; ignoring"),
        }
    }

    if options.mode == RoutingMode::Auto {
        if let Some(h) = specialists.iter().find(|h| h.agent.matches(input)) {
            return RoutingDecision {
                agent: h.agent.clone(),
                strategy: Some(RoutingStrategy::Programmatic),
            };
        }
    }

    RoutingDecision {
        agent: orchestrator.clone(),
        strategy: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubAgent;
    use relay_core::{Handoff, MatchPattern};

    fn team() -> Arc<dyn AgentHandle> {
        let math = StubAgent::new("math")
            .with_pattern(MatchPattern::regex(r"\d+\s*[+*/-]\s*\d+").unwrap())
            .with_tool("calculator");
        let history = StubAgent::new("history")
            .with_pattern(MatchPattern::text("war"))
            .with_tool("timeline")
            .with_tool("calculator");
        let geo = StubAgent::new("geography").with_tool("atlas");
        Arc::new(StubAgent::new("triage").with_handoffs(vec![
            Handoff::new(Arc::new(math)),
            Handoff::new(Arc::new(history)),
            Handoff::new(Arc::new(geo)),
        ]))
    }

    fn route(input: &str, options: RoutingOptions<'_>) -> (String, Option<RoutingStrategy>) {
        let decision =
            select_starting_agent(&team(), input, &options, &ExecutionContext::default());
        (decision.agent.name().to_string(), decision.strategy)
    }

    #[test]
    fn explicit_choice_wins() {
        let options = RoutingOptions {
            explicit_agent: Some("geography"),
            tool_choice: Some("timeline"),
            ..Default::default()
        };
        assert_eq!(
            route("what is 2 + 2", options),
            ("geography".into(), Some(RoutingStrategy::Explicit))
        );
    }

    #[test]
    fn unknown_explicit_choice_falls_through() {
        let options = RoutingOptions {
            explicit_agent: Some("physics"),
            ..Default::default()
        };
        assert_eq!(
            route("what is 2 + 2", options),
            ("math".into(), Some(RoutingStrategy::Programmatic))
        );
    }

    #[test]
    fn tool_affinity_needs_a_single_owner() {
        let unique = RoutingOptions {
            tool_choice: Some("atlas"),
            ..Default::default()
        };
        assert_eq!(
            route("hello", unique),
            ("geography".into(), Some(RoutingStrategy::ToolChoice))
        );

        let shared = RoutingOptions {
            tool_choice: Some("calculator"),
            ..Default::default()
        };
        assert_eq!(route("hello", shared), ("triage".into(), None));
    }

    #[test]
    fn patterns_follow_declaration_order() {
        // Both patterns match; math is declared first.
        assert_eq!(
            route("war of 1812: 1812 - 1776", RoutingOptions::default()),
            ("math".into(), Some(RoutingStrategy::Programmatic))
        );
    }

    #[test]
    fn fixed_mode_skips_patterns() {
        let options = RoutingOptions {
            mode: RoutingMode::Fixed,
            ..Default::default()
        };
        assert_eq!(route("what is 2 + 2", options), ("triage".into(), None));
    }

    #[test]
    fn routing_is_deterministic() {
        for _ in 0..10 {
            assert_eq!(
                route("tell me about the war", RoutingOptions::default()),
                ("history".into(), Some(RoutingStrategy::Programmatic))
            );
        }
    }
}
