//! Request DTOs for the HTTP API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::SetOptions;
use crate::governor::{ComplexityBudget, QueryDocument, Variables};

/// Request body for PUT /cache
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// Raw key, before namespacing and hashing
    pub key: String,
    /// Any JSON value
    pub value: Value,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Optional TTL in seconds; wins over `data_type`
    #[serde(default)]
    pub ttl: Option<u64>,
    /// Data category used to pick a TTL (e.g. `item`, `search-result`)
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub compress: bool,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.ttl == Some(0) {
            return Some("TTL must be at least 1 second".to_string());
        }
        if self.tags.iter().any(|t| t.is_empty()) {
            return Some("Tags cannot be empty".to_string());
        }
        None
    }

    pub fn options(&self) -> SetOptions {
        SetOptions {
            ttl: self.ttl,
            data_type: self.data_type.clone(),
            tags: self.tags.clone(),
            compress: self.compress,
            skip_l1: false,
        }
    }
}

/// Request body for POST /cache/mget
#[derive(Debug, Clone, Deserialize)]
pub struct MGetRequest {
    pub keys: Vec<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Query string accepted by the single-key routes (`?namespace=...`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

/// Request body for POST /query/analyze
///
/// `max_depth` and `max_complexity` tighten or relax the configured
/// budget for this one evaluation.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub query: QueryDocument,
    #[serde(default)]
    pub variables: Variables,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub max_complexity: Option<u64>,
}

impl AnalyzeRequest {
    pub fn budget(&self, defaults: ComplexityBudget) -> ComplexityBudget {
        ComplexityBudget::new(
            self.max_depth.unwrap_or(defaults.max_depth),
            self.max_complexity.unwrap_or(defaults.max_complexity),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_request_deserialize() {
        let json = r#"{"key": "item:42", "value": {"name": "widget"}}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.key, "item:42");
        assert_eq!(req.value, json!({"name": "widget"}));
        assert!(req.ttl.is_none());
        assert!(req.tags.is_empty());
        assert!(!req.compress);
    }

    #[test]
    fn test_set_request_options() {
        let json = r#"{"key": "k", "value": 1, "ttl": 60, "tags": ["room:5"], "compress": true}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        let options = req.options();
        assert_eq!(options.ttl, Some(60));
        assert_eq!(options.tags, vec!["room:5"]);
        assert!(options.compress);
    }

    #[test]
    fn test_validate_empty_key() {
        let req: SetRequest = serde_json::from_value(json!({"key": "", "value": 1})).unwrap();
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_zero_ttl() {
        let req: SetRequest = serde_json::from_value(json!({"key": "k", "value": 1, "ttl": 0})).unwrap();
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_valid_request() {
        let req: SetRequest =
            serde_json::from_value(json!({"key": "valid_key", "value": "v", "ttl": 60})).unwrap();
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_analyze_budget_overrides() {
        let req: AnalyzeRequest = serde_json::from_value(json!({
            "query": { "selections": [{ "name": "id" }] },
            "max_depth": 3
        }))
        .unwrap();

        let budget = req.budget(ComplexityBudget::new(7, 1000));
        assert_eq!(budget, ComplexityBudget::new(3, 1000));
        assert!(req.variables.is_empty());
    }
}
