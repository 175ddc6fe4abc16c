// 🎯 Allocation Record - "what percentage of account A funds goal G"
//
// Allocations form a sparse bipartite weighting between accounts and goals.
// Absence of a row means 0%; a zero row is never persisted.
//
// The pair (account_id, goal_id) is the identity of an allocation. The
// percent is its only value.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

// ============================================================================
// ALLOCATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub account_id: String,
    pub goal_id: String,

    /// Percentage of the account committed to the goal, in [0, 100]
    #[serde(alias = "percentAllocation", alias = "percent_allocation")]
    pub percent: f64,
}

impl Allocation {
    pub fn new(account_id: &str, goal_id: &str, percent: f64) -> Self {
        Allocation {
            account_id: account_id.to_string(),
            goal_id: goal_id.to_string(),
            percent,
        }
    }

    pub fn key(&self) -> AllocationKey {
        AllocationKey::new(&self.account_id, &self.goal_id)
    }

    /// Zero rows are equivalent to no row at all. Negative values are not
    /// zero; they stay visible so validation can reject them.
    pub fn is_zero(&self) -> bool {
        self.percent == 0.0
    }
}

/// Composite key of an allocation cell (row = account, column = goal)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AllocationKey {
    pub account_id: String,
    pub goal_id: String,
}

impl AllocationKey {
    pub fn new(account_id: &str, goal_id: &str) -> Self {
        AllocationKey {
            account_id: account_id.to_string(),
            goal_id: goal_id.to_string(),
        }
    }
}

impl std::fmt::Display for AllocationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.account_id, self.goal_id)
    }
}

// ============================================================================
// FINGERPRINT
// ============================================================================

/// Order-independent SHA-256 of the non-zero rows of an allocation list
///
/// Two lists that describe the same allocation set produce the same
/// fingerprint regardless of ordering. Later duplicates win, as on load.
pub fn allocation_fingerprint(allocations: &[Allocation]) -> String {
    let canonical = canonicalize(allocations);

    let mut hasher = Sha256::new();
    for (key, percent) in &canonical {
        hasher.update(format!("{}\u{1f}{}\u{1f}{}\n", key.account_id, key.goal_id, percent));
    }
    format!("{:x}", hasher.finalize())
}

/// Sorted map of the non-zero rows (last occurrence wins)
fn canonicalize(allocations: &[Allocation]) -> BTreeMap<AllocationKey, f64> {
    let mut canonical = BTreeMap::new();
    for allocation in allocations {
        if allocation.is_zero() {
            canonical.remove(&allocation.key());
        } else {
            canonical.insert(allocation.key(), allocation.percent);
        }
    }
    canonical
}

// ============================================================================
// DIFF (server-known state vs local working copy)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationDiff {
    /// Rows that are new or whose percent changed
    pub upserts: Vec<Allocation>,

    /// Pairs present on the server and absent locally (implicitly set to 0)
    pub removals: Vec<AllocationKey>,
}

impl AllocationDiff {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.upserts.len() + self.removals.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} upsert(s), {} removal(s)",
            self.upserts.len(),
            self.removals.len()
        )
    }
}

/// Minimal set of changes that turns `server` into `local`
pub fn diff(server: &[Allocation], local: &[Allocation]) -> AllocationDiff {
    let server = canonicalize(server);
    let local = canonicalize(local);

    let upserts = local
        .iter()
        .filter(|(key, percent)| server.get(*key) != Some(*percent))
        .map(|(key, percent)| Allocation::new(&key.account_id, &key.goal_id, *percent))
        .collect();

    let removals = server
        .keys()
        .filter(|key| !local.contains_key(*key))
        .cloned()
        .collect();

    AllocationDiff { upserts, removals }
}

// ============================================================================
// TESTS
// ============================================================================
