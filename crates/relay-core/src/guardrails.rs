use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;

/// Outcome of a guardrail check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardrailVerdict {
    Pass,
    /// Stop and surface `message` instead.
    Block { message: String },
    /// Continue with `content` in place of the checked text.
    Modify { content: String },
}

#[async_trait]
pub trait Guardrail: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, text: &str, ctx: &ExecutionContext) -> anyhow::Result<GuardrailVerdict>;
}

/// Input and output guardrails of one agent.
#[derive(Clone, Default)]
pub struct Guardrails {
    pub input: Vec<Arc<dyn Guardrail>>,
    pub output: Vec<Arc<dyn Guardrail>>,
}

impl Guardrails {
    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }

    pub async fn check_input(&self, text: &str, ctx: &ExecutionContext) -> GuardrailVerdict {
        run_chain(&self.input, "input", text, ctx).await
    }

    pub async fn check_output(&self, text: &str, ctx: &ExecutionContext) -> GuardrailVerdict {
        run_chain(&self.output, "output", text, ctx).await
    }
}

/// Runs guardrails in order. A block short-circuits; modifications feed the
/// next guardrail. A failing guardrail counts as a pass.
async fn run_chain(
    chain: &[Arc<dyn Guardrail>],
    phase: &str,
    text: &str,
    ctx: &ExecutionContext,
) -> GuardrailVerdict {
    let mut current: Option<String> = None;
    for guardrail in chain {
        let candidate = current.as_deref().unwrap_or(text);
        match guardrail.check(candidate, ctx).await {
            Ok(GuardrailVerdict::Pass) => {}
            Ok(GuardrailVerdict::Modify { content }) => {
                tracing::debug!(guardrail = guardrail.name(), phase, "guardrail modified text");
                current = Some(content);
            }
            Ok(block @ GuardrailVerdict::Block { .. }) => {
                tracing::info!(guardrail = guardrail.name(), phase, "guardrail blocked text");
                return block;
            }
            Err(e) => {
                tracing::warn!(guardrail = guardrail.name(), phase, error = %e, "guardrail failed; treating as pass");
            }
        }
    }
    match current {
        Some(content) => GuardrailVerdict::Modify { content },
        None => GuardrailVerdict::Pass,
    }
}

/// Guardrail backed by a synchronous closure.
pub struct FnGuardrail<F> {
    name: String,
    check: F,
}

impl<F> FnGuardrail<F>
where
    F: Fn(&str) -> GuardrailVerdict + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

#[async_trait]
impl<F> Guardrail for FnGuardrail<F>
where
    F: Fn(&str) -> GuardrailVerdict + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, text: &str, _ctx: &ExecutionContext) -> anyhow::Result<GuardrailVerdict> {
        Ok((self.check)(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    #[async_trait]
    impl Guardrail for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn check(&self, _text: &str, _ctx: &ExecutionContext) -> anyhow::Result<GuardrailVerdict> {
            anyhow::bail!("classifier offline")
        }
    }

    #[tokio::test]
    async fn modifications_chain_and_failures_pass() {
        let guardrails = Guardrails {
            input: vec![
                Arc::new(FnGuardrail::new("upper", |t: &str| GuardrailVerdict::Modify {
                    content: t.to_uppercase(),
                })),
                Arc::new(Broken),
                Arc::new(FnGuardrail::new("suffix", |t: &str| GuardrailVerdict::Modify {
                    content: format!("{t}!"),
                })),
            ],
            output: vec![],
        };
        let verdict = guardrails.check_input("hi", &ExecutionContext::default()).await;
        assert_eq!(
            verdict,
            GuardrailVerdict::Modify {
                content: "HI!".into()
            }
        );
    }

    #[tokio::test]
    async fn block_short_circuits() {
        let guardrails = Guardrails {
            input: vec![],
            output: vec![
                Arc::new(FnGuardrail::new("deny", |_: &str| GuardrailVerdict::Block {
                    message: "not allowed".into(),
                })),
                Arc::new(Broken),
            ],
        };
        let ctx = ExecutionContext::default();
        assert_eq!(guardrails.check_input("x", &ctx).await, GuardrailVerdict::Pass);
        assert!(matches!(
            guardrails.check_output("x", &ctx).await,
            GuardrailVerdict::Block { message } if message == "not allowed"
        ));
    }
}
