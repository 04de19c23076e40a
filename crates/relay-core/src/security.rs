//! PII scrubbing helpers used by log previews and the `redact_sensitive` handoff filter.

use regex::Regex;
use serde_json::{Map, Value};

/// Preview length used for log fields and lifecycle events.
pub const MAX_PREVIEW_LENGTH: usize = 100;

/// Keys whose values are always replaced when a JSON payload is scrubbed.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "authorization",
    "credit_card",
    "card_number",
    "cvv",
    "ssn",
    "private_key",
];

lazy_static::lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap();
    static ref CARD: Regex = Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b").unwrap();
    static ref PHONE: Regex = Regex::new(r"(\+\d{1,3}[-.\s]?)?\(?\b\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap();
}

/// Cuts `text` to at most `max_chars` characters, appending `...` when cut.
///
/// ```
/// use relay_core::security::truncate_chars;
///
/// assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
/// assert_eq!(truncate_chars("short", 10), "short");
/// ```
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Replaces emails, card numbers and phone numbers with placeholders.
///
/// ```
/// use relay_core::security::redact_pii;
///
/// let out = redact_pii("mail jane@example.com or call 555-123-4567");
/// assert_eq!(out, "mail [EMAIL] or call [PHONE]");
/// ```
pub fn redact_pii(text: &str) -> String {
    // Cards before phones so the phone pattern cannot claim part of a card number.
    let text = EMAIL.replace_all(text, "[EMAIL]");
    let text = CARD.replace_all(&text, "[CARD]");
    PHONE.replace_all(&text, "[PHONE]").into_owned()
}

/// Recursively scrubs a JSON value: sensitive keys are masked and string
/// leaves go through [`redact_pii`].
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    let lowered = key.to_lowercase();
                    let scrubbed = if SENSITIVE_KEYS.iter().any(|k| lowered.contains(k)) {
                        Value::String("[REDACTED]".to_string())
                    } else {
                        sanitize_json(val)
                    };
                    (key.clone(), scrubbed)
                })
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_json).collect()),
        Value::String(s) => Value::String(redact_pii(s)),
        other => other.clone(),
    }
}

/// Redacted, truncated preview suitable for a log field.
pub fn safe_preview(text: &str) -> String {
    truncate_chars(&redact_pii(text), MAX_PREVIEW_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn card_numbers_are_not_mistaken_for_phones() {
        assert_eq!(redact_pii("card 4111 1111 1111 1111"), "card [CARD]");
    }

    #[test]
    fn sanitize_masks_keys_and_scrubs_strings() {
        let out = sanitize_json(&json!({
            "user": {"apiKey": "sk-123", "contact": "bob@example.org"},
            "items": ["call +1 555 123 4567"],
            "count": 3
        }));
        assert_eq!(out["user"]["apiKey"], "[REDACTED]");
        assert_eq!(out["user"]["contact"], "[EMAIL]");
        assert_eq!(out["items"][0], "call [PHONE]");
        assert_eq!(out["count"], 3);
    }

    #[test]
    fn preview_is_bounded() {
        let preview = safe_preview(&"x".repeat(500));
        assert_eq!(preview.chars().count(), MAX_PREVIEW_LENGTH + 3);
        assert_eq!(safe_preview("mail ada@example.com"), "mail [EMAIL]");
    }
}
