//! Bounded LRU cache of complexity scores.
//!
//! Scores are a pure function of the normalized document and the request
//! variables, so entries never go stale and need no invalidation.

use std::collections::HashMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::query::{QueryDocument, Variables};
use crate::cache::LruTracker;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct ScoreCacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug)]
pub struct ScoreCache {
    scores: HashMap<String, u64>,
    lru: LruTracker,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl ScoreCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            scores: HashMap::new(),
            lru: LruTracker::new(),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    /// SHA-256 over the normalized document and the variables.
    pub fn fingerprint(doc: &QueryDocument, variables: &Variables) -> String {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&doc.normalized()).unwrap_or_default());
        hasher.update([0u8]);
        hasher.update(serde_json::to_vec(variables).unwrap_or_default());
        hex::encode(hasher.finalize())
    }

    pub fn get(&mut self, fingerprint: &str) -> Option<u64> {
        match self.scores.get(fingerprint) {
            Some(&score) => {
                self.hits += 1;
                self.lru.touch(fingerprint);
                Some(score)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, fingerprint: String, score: u64) {
        if self.capacity == 0 {
            return;
        }
        if !self.scores.contains_key(&fingerprint) && self.scores.len() >= self.capacity {
            if let Some(oldest) = self.lru.evict_oldest() {
                self.scores.remove(&oldest);
            }
        }
        self.lru.touch(&fingerprint);
        self.scores.insert(fingerprint, score);
    }

    pub fn stats(&self) -> ScoreCacheStats {
        ScoreCacheStats {
            entries: self.scores.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
        }
    }

    pub fn clear(&mut self) {
        self.scores.clear();
        self.lru.clear();
    }
}
