//! Chat title and follow-up suggestion generation.
//!
//! Both run beside the primary stream and never fail it; the round driver
//! decides whether a result arrived in time to be streamed.

use relay_core::prompts::{SUGGESTIONS_PROMPT, TITLE_PROMPT};
use relay_core::security::truncate_chars;
use relay_core::{AgentMessage, LlmRequest, SuggestionsConfig, TitleConfig};
use serde_json::Value;

/// Asks the title model for a title for the chat's first message.
pub async fn generate_title(config: &TitleConfig, first_message: &str) -> anyhow::Result<String> {
    let prompt = config.instructions.as_deref().unwrap_or(TITLE_PROMPT);
    let response = config
        .model
        .generate(LlmRequest::new(prompt, vec![AgentMessage::user(first_message)]))
        .await?;
    clean_title(&response.message.text(), config.max_length)
        .ok_or_else(|| anyhow::anyhow!("title model returned an empty title"))
}

/// First non-empty line, unquoted, without trailing punctuation, at most `max_chars`.
pub fn clean_title(raw: &str, max_chars: usize) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .trim_start_matches(|c| c == '#' || c == '*')
        .trim_start_matches("Title:")
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*')
        .trim_end_matches(|c: char| c == '.' || c == '!' || c == ':')
        .trim();
    if line.is_empty() {
        return None;
    }
    Some(truncate_chars(line, max_chars))
}

/// Whether a response is long enough to deserve suggestions.
pub fn wants_suggestions(config: &SuggestionsConfig, response: &str) -> bool {
    response.chars().count() > config.min_response_length
}

/// Asks the suggestion model for follow-up prompts over the trailing
/// `context_window` messages.
pub async fn generate_suggestions(
    config: &SuggestionsConfig,
    conversation: &[AgentMessage],
) -> anyhow::Result<Vec<String>> {
    let start = conversation.len().saturating_sub(config.context_window);
    let transcript = conversation[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.text()))
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = config
        .instructions
        .clone()
        .unwrap_or_else(|| SUGGESTIONS_PROMPT.replace("{count}", &config.count.to_string()));
    let response = config
        .model
        .generate(LlmRequest::new(prompt, vec![AgentMessage::user(transcript)]))
        .await?;
    let prompts = parse_suggestions(&response.message.text(), config.count);
    if prompts.is_empty() {
        anyhow::bail!("suggestion model returned no usable prompts");
    }
    Ok(prompts)
}

/// Accepts a JSON array of strings (optionally fenced) or one suggestion per line.
pub fn parse_suggestions(raw: &str, count: usize) -> Vec<String> {
    let body = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let items: Vec<String> = match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => body
            .lines()
            .map(|l| {
                l.trim()
                    .trim_start_matches(|c: char| c.is_ascii_digit() || c == '-' || c == '*' || c == '.' || c == ')')
                    .trim()
                    .to_string()
            })
            .collect(),
    };

    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(count)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedModel;
    use std::sync::Arc;

    #[test]
    fn title_is_cleaned_and_bounded() {
        assert_eq!(
            clean_title("\n\"Fractions Homework Help.\"\nextra", 80).as_deref(),
            Some("Fractions Homework Help")
        );
        assert_eq!(clean_title("Title: Roman history", 80).as_deref(), Some("Roman history"));
        assert_eq!(clean_title("abcdefghij", 4).as_deref(), Some("abcd..."));
        assert!(clean_title("  \n ", 80).is_none());
    }

    #[test]
    fn suggestions_parse_json_or_lines() {
        assert_eq!(
            parse_suggestions("```json\n[\"Why?\", \"How?\", \"When?\", \"Who?\"]\n```", 3),
            vec!["Why?", "How?", "When?"]
        );
        assert_eq!(
            parse_suggestions("1. What about decimals?\n- And percentages?\n\n", 3),
            vec!["What about decimals?", "And percentages?"]
        );
    }

    #[tokio::test]
    async fn generators_use_their_models() {
        let title = TitleConfig::new(Arc::new(FixedModel::new("Long division")));
        assert_eq!(generate_title(&title, "how do I divide 144 by 12?").await.unwrap(), "Long division");

        let suggestions = SuggestionsConfig::new(Arc::new(FixedModel::new("[\"What is 12 x 12?\"]")));
        let out = generate_suggestions(&suggestions, &[AgentMessage::user("q"), AgentMessage::assistant("a")])
            .await
            .unwrap();
        assert_eq!(out, vec!["What is 12 x 12?"]);

        let empty = SuggestionsConfig::new(Arc::new(FixedModel::new("[]")));
        assert!(generate_suggestions(&empty, &[]).await.is_err());
    }

    #[test]
    fn short_answers_get_no_suggestions() {
        let config = SuggestionsConfig::new(Arc::new(FixedModel::new("")));
        assert!(!wants_suggestions(&config, "4"));
        assert!(wants_suggestions(&config, &"x".repeat(101)));
    }
}
