// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Content-addressed cache of proof outcomes
//!
//! Keys hash the *canonicalized* formula, so two contracts that simplify
//! to the same thing share an entry regardless of how they were spelled.
//! Only settled outcomes (proven / disproven) are stored; unknowns are
//! retried. Writes are idempotent, which makes the map safe to share
//! across verification threads.

use crate::ast::ExprRef;
use crate::simplify;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Cache key: canonical formula digest plus the timeout it was checked at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: [u8; 32],
    timeout_ms: u64,
}

impl CacheKey {
    /// Key for a formula; invariant under canonicalization
    pub fn for_formula(formula: &ExprRef, timeout_ms: u64) -> Self {
        let canonical = simplify::simplify(formula);
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        let digest = hasher.finalize().into();
        Self { digest, timeout_ms }
    }
}

/// A settled proof outcome worth keeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedOutcome {
    Proven,
    Disproven { counterexample: String },
}

/// Bounded concurrent map from formula digests to outcomes
pub struct ResultCache {
    entries: Mutex<HashMap<CacheKey, CachedOutcome>>,
    capacity: usize,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedOutcome> {
        let entries = self.entries.lock().ok()?;
        let hit = entries.get(key).cloned();
        if hit.is_some() {
            debug!("formula cache hit");
        }
        hit
    }

    /// Insert a settled outcome; first write wins, and a full cache simply
    /// stops accepting new entries
    pub fn insert(&self, key: CacheKey, outcome: CachedOutcome) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.contains_key(&key) {
                return;
            }
            if entries.len() >= self.capacity {
                debug!(capacity = self.capacity, "formula cache full, not inserting");
                return;
            }
            entries.insert(key, outcome);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Expression};
    use crate::error::Span;

    fn sp() -> Span {
        Span::unknown()
    }

    #[test]
    fn test_key_invariant_under_simplification() {
        // x > 0 && true hashes the same as x > 0
        let base = Expression::binary(
            BinaryOp::Gt,
            Expression::variable("x", sp()),
            Expression::int32(0, sp()),
            sp(),
        );
        let padded = Expression::binary(
            BinaryOp::And,
            base.clone(),
            Expression::boolean(true, sp()),
            sp(),
        );
        assert_eq!(
            CacheKey::for_formula(&base, 5000),
            CacheKey::for_formula(&padded, 5000)
        );
    }

    #[test]
    fn test_timeout_is_part_of_the_key() {
        let formula = Expression::variable("p", sp());
        assert_ne!(
            CacheKey::for_formula(&formula, 1000),
            CacheKey::for_formula(&formula, 5000)
        );
    }

    #[test]
    fn test_round_trip_and_idempotent_writes() {
        let cache = ResultCache::new(16);
        let formula = Expression::variable("p", sp());
        let key = CacheKey::for_formula(&formula, 5000);

        assert!(cache.get(&key).is_none());
        cache.insert(key, CachedOutcome::Proven);
        assert_eq!(cache.get(&key), Some(CachedOutcome::Proven));

        // A second write does not clobber the settled result.
        cache.insert(
            key,
            CachedOutcome::Disproven {
                counterexample: "p=false".to_string(),
            },
        );
        assert_eq!(cache.get(&key), Some(CachedOutcome::Proven));
    }

    #[test]
    fn test_capacity_bound() {
        let cache = ResultCache::new(1);
        let first = CacheKey::for_formula(&Expression::variable("a", sp()), 1);
        let second = CacheKey::for_formula(&Expression::variable("b", sp()), 1);
        cache.insert(first, CachedOutcome::Proven);
        cache.insert(second, CachedOutcome::Proven);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&second).is_none());
    }
}
