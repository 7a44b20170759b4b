//! Query Governor
//!
//! Rejects structurally expensive queries before anything executes:
//! depth is checked first, then the complexity score. Nothing here touches
//! the cache or any backing store.

mod analysis;
mod query;
mod score_cache;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{CacheError, Result};

pub use analysis::{
    check_depth, query_depth, score_complexity, DEFAULT_LIST_SIZE, DEPTH_SURCHARGE,
    INTROSPECTION_PENALTY, LEAF_COST, MAX_LIST_SIZE,
};
pub use query::{QueryDocument, Selection, Variables};
pub use score_cache::{ScoreCache, ScoreCacheStats};

// == Budget ==
/// Limits applied to one request evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityBudget {
    pub max_depth: usize,
    pub max_complexity: u64,
}

impl ComplexityBudget {
    pub fn new(max_depth: usize, max_complexity: u64) -> Self {
        Self {
            max_depth,
            max_complexity,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_query_depth, config.max_query_complexity)
    }
}

impl Default for ComplexityBudget {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Measured cost of an accepted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryCost {
    pub depth: usize,
    pub complexity: u64,
}

// == Governor ==
#[derive(Debug)]
pub struct QueryGovernor {
    scores: Mutex<ScoreCache>,
}

impl QueryGovernor {
    /// `score_cache_size` bounds the number of remembered scores.
    pub fn new(score_cache_size: usize) -> Self {
        Self {
            scores: Mutex::new(ScoreCache::new(score_cache_size)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.score_cache_size)
    }

    pub fn check_depth(&self, doc: &QueryDocument, max_depth: usize) -> Result<usize> {
        check_depth(doc, max_depth)
    }

    /// Complexity score, served from the score cache when this shape and
    /// these variables were seen before.
    pub fn score(&self, doc: &QueryDocument, variables: &Variables) -> u64 {
        let fingerprint = ScoreCache::fingerprint(doc, variables);
        if let Some(score) = self.scores.lock().get(&fingerprint) {
            return score;
        }

        let score = score_complexity(doc, variables);
        self.scores.lock().insert(fingerprint, score);
        score
    }

    // == Enforce ==
    /// Measures the query against `budget`.
    pub fn enforce(
        &self,
        doc: &QueryDocument,
        variables: &Variables,
        budget: ComplexityBudget,
    ) -> Result<QueryCost> {
        let operation = doc.operation_name.as_deref().unwrap_or("anonymous");

        let depth = check_depth(doc, budget.max_depth).inspect_err(|e| {
            warn!(operation, error = %e, "query rejected");
        })?;

        let complexity = self.score(doc, variables);
        if complexity > budget.max_complexity {
            let err = CacheError::ComplexityExceeded {
                score: complexity,
                max: budget.max_complexity,
            };
            warn!(operation, error = %err, "query rejected");
            return Err(err);
        }

        debug!(operation, depth, complexity, "query accepted");
        Ok(QueryCost { depth, complexity })
    }

    pub fn cache_stats(&self) -> ScoreCacheStats {
        self.scores.lock().stats()
    }

    pub fn clear_cache(&self) {
        self.scores.lock().clear();
    }
}

impl Default for QueryGovernor {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested(levels: usize) -> QueryDocument {
        let mut sel = Selection::field("leaf");
        for i in 0..levels {
            sel = Selection::field(format!("level{i}")).select(sel);
        }
        QueryDocument::new(vec![sel])
    }

    #[test]
    fn test_enforce_accepts_within_budget() {
        let governor = QueryGovernor::default();
        let cost = governor
            .enforce(&nested(7), &Variables::new(), ComplexityBudget::default())
            .unwrap();
        assert_eq!(cost.depth, 7);
        assert!(cost.complexity <= 1000);
    }

    #[test]
    fn test_enforce_rejects_depth_before_complexity() {
        let governor = QueryGovernor::default();
        let budget = ComplexityBudget::new(7, 1);

        let err = governor.enforce(&nested(8), &Variables::new(), budget).unwrap_err();
        assert!(matches!(err, CacheError::DepthExceeded { depth: 8, max: 7 }));
        // depth rejection happens before scoring
        assert_eq!(governor.cache_stats().misses, 0);
    }

    #[test]
    fn test_enforce_rejects_complexity() {
        let governor = QueryGovernor::default();
        let doc = QueryDocument::new(vec![Selection::list("items")
            .arg("first", "$n")
            .select(Selection::list("children").arg("first", 100).select(Selection::field("id")))]);
        let mut vars = Variables::new();
        vars.insert("n".into(), json!(100));

        let err = governor
            .enforce(&doc, &vars, ComplexityBudget::default())
            .unwrap_err();
        assert!(matches!(err, CacheError::ComplexityExceeded { max: 1000, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_scores_are_cached() {
        let governor = QueryGovernor::new(8);
        let doc = nested(3);

        let first = governor.score(&doc, &Variables::new());
        let second = governor.score(&doc, &Variables::new());

        assert_eq!(first, second);
        let stats = governor.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);

        governor.clear_cache();
        assert_eq!(governor.cache_stats().entries, 0);
    }
}
