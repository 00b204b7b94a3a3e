//! Response classification
//!
//! Turns raw tool output into a typed outcome. Nothing here touches a
//! process, so every rule can be exercised on plain strings.

pub mod classifier;
pub mod extract;
pub mod rules;
pub mod search;

pub use classifier::{ClassifiedOutcome, ResponseClassifier, is_purchase_success, truncate_preview};
pub use extract::{extract_payload, json_payloads, json_segments};
pub use rules::{ClassificationRule, OutcomeKind, RuleTable};
pub use search::{AppSummary, SearchResults, parse_search_apps};
