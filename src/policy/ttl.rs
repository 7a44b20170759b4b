//! TTL table keyed by semantic data category.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Built-in data categories, most volatile first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataType {
    List,
    Item,
    SearchResult,
    AnalyticsSummary,
    StaticReference,
}

impl DataType {
    pub const ALL: [DataType; 5] = [
        DataType::List,
        DataType::Item,
        DataType::SearchResult,
        DataType::AnalyticsSummary,
        DataType::StaticReference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::List => "list",
            DataType::Item => "item",
            DataType::SearchResult => "search-result",
            DataType::AnalyticsSummary => "analytics-summary",
            DataType::StaticReference => "static-reference",
        }
    }

    /// Shipped TTL in seconds.
    pub fn default_ttl(&self) -> u64 {
        match self {
            DataType::List => 60,
            DataType::Item => 120,
            DataType::SearchResult => 600,
            DataType::AnalyticsSummary => 1800,
            DataType::StaticReference => 3600,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown data type '{s}'"))
    }
}

/// Category -> TTL lookup. Starts from the built-in values; deployments
/// may override them or add their own categories.
#[derive(Debug, Clone)]
pub struct TtlTable {
    ttls: HashMap<String, u64>,
    fallback: u64,
}

impl TtlTable {
    /// Built-in table; unknown categories get `fallback` seconds.
    pub fn new(fallback: u64) -> Self {
        let ttls = DataType::ALL
            .into_iter()
            .map(|t| (t.as_str().to_string(), t.default_ttl()))
            .collect();
        Self { ttls, fallback }
    }

    pub fn with_overrides(mut self, overrides: &HashMap<String, u64>) -> Self {
        for (name, secs) in overrides {
            self.ttls.insert(name.clone(), *secs);
        }
        self
    }

    pub fn ttl_for(&self, data_type: &str) -> u64 {
        self.ttls.get(data_type).copied().unwrap_or(self.fallback)
    }

    pub fn fallback(&self) -> u64 {
        self.fallback
    }
}
