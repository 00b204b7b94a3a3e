//! ResponseClassifier: tool output to a closed set of outcomes
//!
//! A JSON payload with `"success": true` is the only positive answer.
//! Anything else is classified from its `error`, `message` or `reason`
//! field (first present), or from the raw text when no JSON is found.

use super::extract::{extract_payload, json_payloads};
use super::rules::{OutcomeKind, RuleTable};
use crate::core::config::{DEFAULT_PREVIEW_LENGTH, DriverConfig};
use crate::core::error::DriverResult;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Localized marker some tool builds print after a purchase
const PURCHASE_SUCCESS_MARKER: &str = "购买成功";

/// Fields searched for a failure message, in priority order
const MESSAGE_FIELDS: [&str; 3] = ["error", "message", "reason"];

/// Shorten `text` to at most `max_chars` characters, marking the cut with `…`
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut preview: String = text.chars().take(max_chars).collect();
    preview.push('…');
    preview
}

/// Result of classifying one payload; immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedOutcome {
    kind: OutcomeKind,
    message: String,
    raw_payload: String,
}

impl ClassifiedOutcome {
    pub fn new(kind: OutcomeKind, message: impl Into<String>, raw_payload: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw_payload: raw_payload.into(),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        self.kind
    }

    /// The tool's own message, bounded to the preview length
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Full text the classification was made from
    pub fn raw_payload(&self) -> &str {
        &self.raw_payload
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

/// Stateless classifier over an ordered rule table
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    rules: RuleTable,
    preview_length: usize,
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new(RuleTable::builtin(), DEFAULT_PREVIEW_LENGTH)
    }
}

impl ResponseClassifier {
    pub fn new(rules: RuleTable, preview_length: usize) -> Self {
        Self {
            rules,
            preview_length,
        }
    }

    /// Classifier with configured extra keywords and preview length
    pub fn from_config(config: &DriverConfig) -> DriverResult<Self> {
        let rules = RuleTable::with_extra_keywords(&config.classifier.extra_keywords)?;
        Ok(Self::new(rules, config.messages.preview_length))
    }

    pub fn preview_length(&self) -> usize {
        self.preview_length
    }

    /// See [`extract_payload`]
    pub fn extract_payload(&self, raw: &str) -> Option<String> {
        extract_payload(raw)
    }

    /// Classify a single payload
    ///
    /// JSON payloads are judged by `success` and their message field; text
    /// that does not parse is matched against the rule table as is.
    pub fn classify(&self, payload: &str, is_two_factor: bool) -> ClassifiedOutcome {
        match serde_json::from_str::<Value>(payload.trim()) {
            Ok(value) => self.classify_json(&value, payload, is_two_factor),
            Err(_) => self.classify_text(payload, payload, is_two_factor),
        }
    }

    /// Classify complete tool output
    ///
    /// The first JSON payload carrying a `success` field decides. Verbose
    /// runs also print JSON log lines, so a payload without `success` only
    /// decides when none has one and its message matched a rule. Without
    /// either, the whole output is classified as text.
    pub fn interpret(&self, raw: &str, is_two_factor: bool) -> ClassifiedOutcome {
        let values: Vec<(String, Value)> = json_payloads(raw)
            .into_iter()
            .filter_map(|payload| {
                let value = serde_json::from_str::<Value>(&payload).ok()?;
                Some((payload, value))
            })
            .collect();

        let answer = values.iter().find(|(_, value)| value.get("success").is_some());
        if let Some((payload, value)) = answer {
            let outcome = self.classify_json(value, payload, is_two_factor);
            debug!(kind = %outcome.kind, "classified tool answer");
            return outcome;
        }

        let matched = values.iter().find_map(|(payload, value)| {
            let outcome = self.classify_json(value, payload, is_two_factor);
            (outcome.kind != OutcomeKind::UnknownError).then_some(outcome)
        });
        if let Some(outcome) = matched {
            debug!(kind = %outcome.kind, "classified tool payload");
            return outcome;
        }

        let outcome = self.classify_text(raw, raw, is_two_factor);
        debug!(kind = %outcome.kind, "classified tool output as text");
        outcome
    }

    fn classify_json(&self, value: &Value, payload: &str, is_two_factor: bool) -> ClassifiedOutcome {
        if value.get("success").and_then(Value::as_bool) == Some(true) {
            let message = error_message(value).unwrap_or_default();
            return ClassifiedOutcome::new(
                OutcomeKind::Success,
                truncate_preview(&message, self.preview_length),
                payload.trim(),
            );
        }

        match error_message(value) {
            Some(message) => self.classify_text(&message, payload.trim(), is_two_factor),
            None => self.classify_text(payload, payload.trim(), is_two_factor),
        }
    }

    fn classify_text(&self, text: &str, payload: &str, is_two_factor: bool) -> ClassifiedOutcome {
        let kind = self
            .rules
            .match_text(text, is_two_factor)
            .unwrap_or(OutcomeKind::UnknownError);
        ClassifiedOutcome::new(kind, truncate_preview(text, self.preview_length), payload)
    }
}

/// First present message field, as text
fn error_message(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    MESSAGE_FIELDS
        .iter()
        .find_map(|field| object.get(*field))
        .map(|field| match field {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .filter(|message| !message.trim().is_empty())
}

/// Whether purchase output reports success
///
/// The first payload carrying a boolean `success` decides; otherwise the
/// localized success marker anywhere in the output counts.
pub fn is_purchase_success(raw: &str) -> bool {
    let decided = json_payloads(raw).iter().find_map(|payload| {
        serde_json::from_str::<Value>(payload)
            .ok()?
            .get("success")?
            .as_bool()
    });
    decided.unwrap_or_else(|| raw.contains(PURCHASE_SUCCESS_MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ResponseClassifier {
        ResponseClassifier::default()
    }

    #[test]
    fn test_success_payload() {
        let outcome = classifier().classify(r#"{"success":true,"email":"a@b.com"}"#, false);
        assert_eq!(outcome.kind(), OutcomeKind::Success);
        assert!(outcome.is_success());
    }

    #[test]
    fn test_success_regardless_of_surrounding_logs() {
        let raw = "[info] starting\n{\"success\":true}\n[info] done";
        assert_eq!(classifier().interpret(raw, false).kind(), OutcomeKind::Success);
        assert_eq!(classifier().interpret(raw, true).kind(), OutcomeKind::Success);
    }

    #[test]
    fn test_invalid_auth_code_only_in_two_factor_attempt() {
        let payload = r#"{"success":false,"error":"invalid auth code"}"#;
        assert_eq!(
            classifier().classify(payload, true).kind(),
            OutcomeKind::AuthCodeInvalid
        );
        assert_ne!(
            classifier().classify(payload, false).kind(),
            OutcomeKind::AuthCodeInvalid
        );
    }

    #[test]
    fn test_localized_invalid_code() {
        let payload = r#"{"success":false,"error":"验证码错误"}"#;
        assert_eq!(
            classifier().classify(payload, true).kind(),
            OutcomeKind::AuthCodeInvalid
        );
        assert_eq!(
            classifier().classify(payload, false).kind(),
            OutcomeKind::UnknownError
        );
    }

    #[test]
    fn test_invalid_credential() {
        let outcome = classifier().classify(r#"{"success":false,"error":"incorrect password"}"#, false);
        assert_eq!(outcome.kind(), OutcomeKind::InvalidCredential);
        assert_eq!(outcome.message(), "incorrect password");
        assert_eq!(
            outcome.raw_payload(),
            r#"{"success":false,"error":"incorrect password"}"#
        );
    }

    #[test]
    fn test_two_factor_required() {
        let outcome = classifier().classify(
            r#"{"success":false,"error":"please enter authentication code"}"#,
            false,
        );
        assert_eq!(outcome.kind(), OutcomeKind::RequiresTwoFactor);
    }

    #[test]
    fn test_message_field_priority() {
        let payload = r#"{"reason":"network unreachable","message":"bad credentials","error":"2FA required"}"#;
        assert_eq!(
            classifier().classify(payload, false).kind(),
            OutcomeKind::RequiresTwoFactor
        );

        let payload = r#"{"reason":"network unreachable","message":"bad credentials"}"#;
        assert_eq!(
            classifier().classify(payload, false).kind(),
            OutcomeKind::InvalidCredential
        );
    }

    #[test]
    fn test_network_error() {
        let outcome = classifier().classify(r#"{"success":false,"error":"connection reset by peer"}"#, false);
        assert_eq!(outcome.kind(), OutcomeKind::NetworkError);
    }

    #[test]
    fn test_unknown_error_keeps_message() {
        let outcome = classifier().classify(r#"{"success":false,"error":"account locked"}"#, false);
        assert_eq!(outcome.kind(), OutcomeKind::UnknownError);
        assert_eq!(outcome.message(), "account locked");
    }

    #[test]
    fn test_failure_without_message_classifies_whole_segment() {
        let outcome = classifier().classify(r#"{"success":false,"hint":"ssl"}"#, false);
        assert_eq!(outcome.kind(), OutcomeKind::NetworkError);
    }

    #[test]
    fn test_plain_text_payload() {
        let outcome = classifier().classify("Error: bad credentials supplied", false);
        assert_eq!(outcome.kind(), OutcomeKind::InvalidCredential);
        assert_eq!(outcome.raw_payload(), "Error: bad credentials supplied");
    }

    #[test]
    fn test_interpret_skips_indecisive_segments() {
        let raw = "{\"level\":\"debug\",\"msg\":\"booting\"}\n{\"success\":false,\"error\":\"timed out\"}";
        assert_eq!(
            classifier().interpret(raw, false).kind(),
            OutcomeKind::NetworkError
        );
    }

    #[test]
    fn test_json_log_line_does_not_override_answer() {
        let raw = "{\"level\":\"debug\",\"message\":\"opening connection to auth endpoint\"}\n{\"success\":true}";
        let outcome = classifier().interpret(raw, false);
        assert_eq!(outcome.kind(), OutcomeKind::Success);
        assert_eq!(outcome.raw_payload(), "{\"success\":true}");

        let raw = "{\"level\":\"info\",\"message\":\"enter the auth code\"}\n{\"success\":false,\"error\":\"incorrect password\"}";
        assert_eq!(
            classifier().interpret(raw, false).kind(),
            OutcomeKind::InvalidCredential
        );
    }

    #[test]
    fn test_log_message_decides_without_answer() {
        let raw = "{\"level\":\"info\",\"message\":\"booting\"}\n{\"level\":\"error\",\"message\":\"network is unreachable\"}";
        assert_eq!(
            classifier().interpret(raw, false).kind(),
            OutcomeKind::NetworkError
        );
    }

    #[test]
    fn test_interpret_falls_back_to_text() {
        let outcome = classifier().interpret("fatal: two factor authentication required", false);
        assert_eq!(outcome.kind(), OutcomeKind::RequiresTwoFactor);
    }

    #[test]
    fn test_long_messages_are_truncated() {
        let classifier = ResponseClassifier::new(RuleTable::builtin(), 10);
        let long = format!(r#"{{"success":false,"error":"{}"}}"#, "x".repeat(50));
        let outcome = classifier.classify(&long, false);
        assert_eq!(outcome.message(), format!("{}…", "x".repeat(10)));
        assert_eq!(outcome.raw_payload(), long);
    }

    #[test]
    fn test_truncate_preview_is_char_safe() {
        assert_eq!(truncate_preview("验证码错误请重试", 3), "验证码…");
        assert_eq!(truncate_preview("  short  ", 10), "short");
    }

    #[test]
    fn test_purchase_success_detection() {
        assert!(is_purchase_success("{\"success\":true}"));
        assert!(is_purchase_success("INF done\n购买成功"));
        assert!(!is_purchase_success("{\"success\":false,\"error\":\"购买成功 marker in error\"}"));
        assert!(!is_purchase_success("license required"));
    }

    #[test]
    fn test_extra_keywords_from_config() {
        let mut config = DriverConfig::default();
        config
            .classifier
            .extra_keywords
            .insert("invalidCredential".to_string(), vec!["account disabled".to_string()]);
        let classifier = ResponseClassifier::from_config(&config).unwrap();
        assert_eq!(
            classifier
                .classify(r#"{"success":false,"error":"Account disabled"}"#, false)
                .kind(),
            OutcomeKind::InvalidCredential
        );
    }
}
