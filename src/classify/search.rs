//! Search result interpretation

use super::extract::json_payloads;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One app from a search response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSummary {
    pub bundle_id: String,
    /// Raw JSON text of the store id
    pub id: String,
    pub name: String,
    /// Raw JSON text of the price, e.g. `0` or `0.99`
    pub price: String,
    pub version: String,
}

impl AppSummary {
    pub fn is_free(&self) -> bool {
        self.price
            .trim_matches('"')
            .parse::<f64>()
            .is_ok_and(|price| price == 0.0)
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let raw = |key: &str| object.get(key).map(Value::to_string).unwrap_or_default();

        let bundle_id = match object.get("bundleID").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => text("bundleId"),
        };

        Self {
            bundle_id,
            id: raw("id"),
            name: text("name"),
            price: raw("price"),
            version: text("version"),
        }
    }
}

/// Parsed `apps` array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    pub apps: Vec<AppSummary>,
    /// Entries that were not JSON objects
    pub skipped: usize,
}

/// Read the `apps` array from the first payload that has one
pub fn parse_search_apps(raw: &str) -> Option<SearchResults> {
    json_payloads(raw).iter().find_map(|payload| {
        let value: Value = serde_json::from_str(payload).ok()?;
        let apps = value.get("apps")?.as_array()?;

        let mut results = SearchResults::default();
        for entry in apps {
            match entry.as_object() {
                Some(object) => results.apps.push(AppSummary::from_object(object)),
                None => results.skipped += 1,
            }
        }
        Some(results)
    })
}
