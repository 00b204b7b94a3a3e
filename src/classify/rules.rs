//! Ordered keyword rule table for free-text classification
//!
//! Rules are evaluated top to bottom and the first match wins. Keyword
//! matching is case-insensitive substring search, one Aho-Corasick automaton
//! per rule.

use crate::core::error::{DriverError, DriverResult};
use aho_corasick::AhoCorasick;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Closed set of outcomes a tool response can map to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutcomeKind {
    Success,
    RequiresTwoFactor,
    InvalidCredential,
    AuthCodeInvalid,
    NetworkError,
    Timeout,
    UnknownError,
}

impl OutcomeKind {
    /// Outcomes that can carry keywords, by their configuration name
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name {
            "requiresTwoFactor" => Some(Self::RequiresTwoFactor),
            "invalidCredential" => Some(Self::InvalidCredential),
            "authCodeInvalid" => Some(Self::AuthCodeInvalid),
            "networkError" => Some(Self::NetworkError),
            _ => None,
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Success => write!(f, "success"),
            OutcomeKind::RequiresTwoFactor => write!(f, "requiresTwoFactor"),
            OutcomeKind::InvalidCredential => write!(f, "invalidCredential"),
            OutcomeKind::AuthCodeInvalid => write!(f, "authCodeInvalid"),
            OutcomeKind::NetworkError => write!(f, "networkError"),
            OutcomeKind::Timeout => write!(f, "timeout"),
            OutcomeKind::UnknownError => write!(f, "unknownError"),
        }
    }
}

/// One `{keywords -> outcome}` entry
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub outcome: OutcomeKind,
    /// Only applies while a one-time code is being verified
    pub two_factor_only: bool,
    keywords: Vec<String>,
    matcher: AhoCorasick,
}

impl ClassificationRule {
    pub fn new(
        outcome: OutcomeKind,
        keywords: Vec<String>,
        two_factor_only: bool,
    ) -> DriverResult<Self> {
        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&keywords)
            .map_err(|e| DriverError::ConfigError(format!("关键字规则无效: {}", e)))?;

        Ok(Self {
            outcome,
            two_factor_only,
            keywords,
            matcher,
        })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn matches(&self, text: &str, is_two_factor: bool) -> bool {
        if self.two_factor_only && !is_two_factor {
            return false;
        }
        self.matcher.is_match(text)
    }
}

const AUTH_CODE_INVALID_KEYWORDS: &[&str] =
    &["invalid auth code", "auth code is incorrect", "验证码错误"];

const TWO_FACTOR_KEYWORDS: &[&str] = &[
    "auth code",
    "two factor",
    "2fa",
    "authentication code",
    "请输入验证码",
];

const INVALID_CREDENTIAL_KEYWORDS: &[&str] = &[
    "invalid credentials",
    "incorrect",
    "username or password",
    "bad credentials",
];

const NETWORK_KEYWORDS: &[&str] = &["network", "timeout", "timed out", "connection", "ssl"];

lazy_static! {
    static ref BUILTIN_RULES: RuleTable = RuleTable::builtin_uncached();
}

/// Ordered rule table
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<ClassificationRule>,
}

impl Default for RuleTable {
    fn default() -> Self {
        BUILTIN_RULES.clone()
    }
}

impl RuleTable {
    /// Built-in rules
    ///
    /// The invalid-code rule is first but only active during code
    /// verification; an initial login falls straight through to the
    /// two-factor rule.
    pub fn builtin() -> Self {
        Self::default()
    }

    fn builtin_uncached() -> Self {
        let definitions: [(OutcomeKind, &[&str], bool); 4] = [
            (OutcomeKind::AuthCodeInvalid, AUTH_CODE_INVALID_KEYWORDS, true),
            (OutcomeKind::RequiresTwoFactor, TWO_FACTOR_KEYWORDS, false),
            (OutcomeKind::InvalidCredential, INVALID_CREDENTIAL_KEYWORDS, false),
            (OutcomeKind::NetworkError, NETWORK_KEYWORDS, false),
        ];

        let rules = definitions
            .into_iter()
            .filter_map(|(outcome, keywords, two_factor_only)| {
                let keywords = keywords.iter().map(|k| k.to_string()).collect();
                ClassificationRule::new(outcome, keywords, two_factor_only).ok()
            })
            .collect();

        Self { rules }
    }

    /// Built-in rules with configured keywords appended to the matching rule
    ///
    /// Rule order is unchanged; unknown outcome names are rejected.
    pub fn with_extra_keywords(extra: &HashMap<String, Vec<String>>) -> DriverResult<Self> {
        let mut table = Self::builtin();
        if extra.is_empty() {
            return Ok(table);
        }

        for name in extra.keys() {
            if OutcomeKind::from_config_name(name).is_none() {
                return Err(DriverError::ConfigError(format!(
                    "未知的结果类型: {}",
                    name
                )));
            }
        }

        for rule in table.rules.iter_mut() {
            let additions: Vec<String> = extra
                .get(&rule.outcome.to_string())
                .into_iter()
                .flatten()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
            if additions.is_empty() {
                continue;
            }

            let mut keywords = rule.keywords.clone();
            keywords.extend(additions);
            *rule = ClassificationRule::new(rule.outcome, keywords, rule.two_factor_only)?;
        }

        Ok(table)
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// First matching outcome, or None when no rule applies
    pub fn match_text(&self, text: &str, is_two_factor: bool) -> Option<OutcomeKind> {
        if text.trim().is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.matches(text, is_two_factor))
            .map(|rule| rule.outcome)
    }
}
