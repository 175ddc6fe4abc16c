// 🗂️ Query Cache - staleness tracking for cached registry/allocation lists
//
// After a successful bulk save the cached goal list and the cached
// allocation list are both stale: goal progress depends on both.
// Consumers check `is_stale` and refetch; `mark_fresh` records the refetch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKey {
    Accounts,
    Goals,
    GoalsAllocations,
}

impl QueryKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKey::Accounts => "accounts",
            QueryKey::Goals => "goals",
            QueryKey::GoalsAllocations => "goals_allocations",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Entry {
    stale: bool,
    /// Bumped on every invalidation
    generation: u64,
}

/// Shared staleness table (clones share state)
#[derive(Debug, Clone, Default)]
pub struct QueryCache {
    entries: Arc<RwLock<HashMap<QueryKey, Entry>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&self, key: QueryKey) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(key).or_default();
        entry.stale = true;
        entry.generation += 1;
        debug!(key = key.as_str(), generation = entry.generation, "query invalidated");
    }

    pub fn invalidate_all(&self, keys: &[QueryKey]) {
        for key in keys {
            self.invalidate(*key);
        }
    }

    pub fn mark_fresh(&self, key: QueryKey) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.entry(key).or_default().stale = false;
    }

    /// Never-fetched keys are not stale
    pub fn is_stale(&self, key: QueryKey) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&key).map(|e| e.stale).unwrap_or(false)
    }

    /// Number of invalidations seen for a key
    pub fn generation(&self, key: QueryKey) -> u64 {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&key).map(|e| e.generation).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_and_refresh() {
        let cache = QueryCache::new();
        assert!(!cache.is_stale(QueryKey::Goals));

        cache.invalidate_all(&[QueryKey::Goals, QueryKey::GoalsAllocations]);
        assert!(cache.is_stale(QueryKey::Goals));
        assert!(cache.is_stale(QueryKey::GoalsAllocations));
        assert!(!cache.is_stale(QueryKey::Accounts));

        cache.mark_fresh(QueryKey::Goals);
        assert!(!cache.is_stale(QueryKey::Goals));
        assert_eq!(cache.generation(QueryKey::Goals), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let cache = QueryCache::new();
        let other = cache.clone();

        other.invalidate(QueryKey::Accounts);
        other.invalidate(QueryKey::Accounts);

        assert!(cache.is_stale(QueryKey::Accounts));
        assert_eq!(cache.generation(QueryKey::Accounts), 2);
        assert_eq!(QueryKey::GoalsAllocations.as_str(), "goals_allocations");
    }
}
