// 🧮 Allocation Matrix - editable working copy of all allocations
//
// Rows = accounts, columns = goals, cells = percent.
//
// Storage is sparse: only non-zero cells live in the map (account -> goal
// -> percent), so "absent" and "0%" are the same thing. The matrix does NOT enforce the row-sum rule;
// the validator runs after every edit and reports overflow instead.

use crate::allocation::{Allocation, AllocationKey};
use crate::entities::{Account, Goal};
use crate::error::AllocationError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

pub const MAX_PERCENT: f64 = 100.0;

// ============================================================================
// ROW / COLUMN HEADERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowHeader {
    pub account_id: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnHeader {
    pub goal_id: String,
    pub is_achieved: bool,
}

// ============================================================================
// LOAD REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Non-zero cells held after load
    pub loaded: usize,

    /// Rows whose account or goal is not in the registries
    pub dropped_unknown: Vec<AllocationKey>,

    /// Keys listed more than once (the last value was kept)
    pub duplicates: Vec<AllocationKey>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.dropped_unknown.is_empty() && self.duplicates.is_empty()
    }
}

// ============================================================================
// ALLOCATION MATRIX
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AllocationMatrix {
    rows: Vec<RowHeader>,
    columns: Vec<ColumnHeader>,
    cells: HashMap<String, HashMap<String, f64>>,

    /// Duplicate keys seen by the last load, kept for display until the
    /// next load or `clear_load_duplicates`
    load_duplicates: Vec<AllocationKey>,
}

impl AllocationMatrix {
    /// Empty matrix shaped by the registries (rows in account order,
    /// columns in goal order)
    pub fn new(accounts: &[Account], goals: &[Goal]) -> Self {
        AllocationMatrix {
            rows: accounts
                .iter()
                .map(|a| RowHeader {
                    account_id: a.id.clone(),
                    is_active: a.is_active,
                })
                .collect(),
            columns: goals
                .iter()
                .map(|g| ColumnHeader {
                    goal_id: g.id.clone(),
                    is_achieved: g.is_achieved,
                })
                .collect(),
            cells: HashMap::new(),
            load_duplicates: Vec::new(),
        }
    }

    /// Matrix over bare ids (every account active, no goal achieved)
    pub fn from_ids(account_ids: &[&str], goal_ids: &[&str]) -> Self {
        AllocationMatrix {
            rows: account_ids
                .iter()
                .map(|id| RowHeader {
                    account_id: id.to_string(),
                    is_active: true,
                })
                .collect(),
            columns: goal_ids
                .iter()
                .map(|id| ColumnHeader {
                    goal_id: id.to_string(),
                    is_achieved: false,
                })
                .collect(),
            cells: HashMap::new(),
            load_duplicates: Vec::new(),
        }
    }

    /// Replace the working copy with `existing`
    ///
    /// Pairs absent from `existing` start at 0. Rows naming an account or
    /// goal outside the registries are dropped. For repeated keys the last
    /// listed value wins. Values are stored as given (even out of range) so
    /// the validator can flag them.
    pub fn load(&mut self, existing: &[Allocation]) -> LoadReport {
        self.cells.clear();
        self.load_duplicates.clear();

        let mut report = LoadReport::default();
        let mut seen: HashSet<AllocationKey> = HashSet::new();

        for allocation in existing {
            let key = allocation.key();

            if !self.has_account(&key.account_id) || !self.has_goal(&key.goal_id) {
                warn!(key = %key, "dropping allocation for unknown account or goal");
                report.dropped_unknown.push(key);
                continue;
            }

            if !seen.insert(key.clone()) {
                warn!(key = %key, "duplicate allocation in load input, last value wins");
                report.duplicates.push(key.clone());
            }

            self.put(&key.account_id, &key.goal_id, allocation.percent);
        }

        report.loaded = self.len();
        self.load_duplicates = report.duplicates.clone();

        debug!(
            loaded = report.loaded,
            dropped = report.dropped_unknown.len(),
            duplicates = report.duplicates.len(),
            "allocation matrix loaded"
        );

        report
    }

    /// Set one cell; 0 removes it
    ///
    /// Rejects values that are not finite or outside [0, 100], and ids the
    /// registries don't know. Does not check the row sum.
    pub fn set_cell(
        &mut self,
        account_id: &str,
        goal_id: &str,
        percent: f64,
    ) -> Result<(), AllocationError> {
        if !self.has_account(account_id) {
            return Err(AllocationError::UnknownAccount(account_id.to_string()));
        }
        if !self.has_goal(goal_id) {
            return Err(AllocationError::UnknownGoal(goal_id.to_string()));
        }
        if !is_valid_percent(percent) {
            return Err(AllocationError::InvalidPercent {
                account_id: account_id.to_string(),
                goal_id: goal_id.to_string(),
                percent,
            });
        }

        self.put(account_id, goal_id, percent);

        debug!(account_id, goal_id, percent, "allocation cell updated");
        Ok(())
    }

    /// Store a cell as given; 0 removes it
    fn put(&mut self, account_id: &str, goal_id: &str, percent: f64) {
        if percent == 0.0 {
            if let Some(row) = self.cells.get_mut(account_id) {
                row.remove(goal_id);
                if row.is_empty() {
                    self.cells.remove(account_id);
                }
            }
        } else {
            self.cells
                .entry(account_id.to_string())
                .or_default()
                .insert(goal_id.to_string(), percent);
        }
    }

    /// Current value of a cell (0 when absent)
    pub fn cell(&self, account_id: &str, goal_id: &str) -> f64 {
        self.cells
            .get(account_id)
            .and_then(|row| row.get(goal_id))
            .copied()
            .unwrap_or(0.0)
    }

    /// Non-zero (goal_id, percent) pairs of one account, in column order
    pub fn get_row<'a>(&'a self, account_id: &str) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        let row = self.cells.get(account_id);
        self.columns.iter().filter_map(move |column| {
            row.and_then(|cells| cells.get(column.goal_id.as_str()))
                .map(|percent| (column.goal_id.as_str(), *percent))
        })
    }

    /// Non-zero (account_id, percent) pairs of one goal, in row order
    pub fn get_column<'a>(&'a self, goal_id: &'a str) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.rows.iter().filter_map(move |row| {
            self.cells
                .get(row.account_id.as_str())
                .and_then(|cells| cells.get(goal_id))
                .map(|percent| (row.account_id.as_str(), *percent))
        })
    }

    /// Total percent committed by an account
    pub fn row_sum(&self, account_id: &str) -> f64 {
        self.get_row(account_id).map(|(_, percent)| percent).sum()
    }

    /// Percent still free on an account (never below 0)
    pub fn remaining(&self, account_id: &str) -> f64 {
        (MAX_PERCENT - self.row_sum(account_id)).max(0.0)
    }

    /// Sum of percentages pointing at a goal (across accounts, so may exceed 100)
    pub fn column_sum(&self, goal_id: &str) -> f64 {
        self.get_column(goal_id).map(|(_, percent)| percent).sum()
    }

    /// Every non-zero allocation, rows in account order then goal order
    pub fn to_allocation_list(&self) -> Vec<Allocation> {
        self.rows
            .iter()
            .flat_map(|row| {
                self.get_row(&row.account_id)
                    .map(move |(goal_id, percent)| Allocation::new(&row.account_id, goal_id, percent))
            })
            .collect()
    }

    /// Zero out every cell of an account
    pub fn clear_row(&mut self, account_id: &str) {
        self.cells.remove(account_id);
    }

    /// Drop a goal column together with its cells (goal was deleted)
    pub fn remove_goal(&mut self, goal_id: &str) -> usize {
        let mut removed = 0;
        for row in self.cells.values_mut() {
            if row.remove(goal_id).is_some() {
                removed += 1;
            }
        }
        self.cells.retain(|_, row| !row.is_empty());
        self.columns.retain(|c| c.goal_id != goal_id);
        self.load_duplicates.retain(|key| key.goal_id != goal_id);
        removed
    }

    pub fn rows(&self) -> &[RowHeader] {
        &self.rows
    }

    pub fn columns(&self) -> &[ColumnHeader] {
        &self.columns
    }

    pub fn has_account(&self, account_id: &str) -> bool {
        self.rows.iter().any(|r| r.account_id == account_id)
    }

    pub fn has_goal(&self, goal_id: &str) -> bool {
        self.columns.iter().any(|c| c.goal_id == goal_id)
    }

    pub fn load_duplicates(&self) -> &[AllocationKey] {
        &self.load_duplicates
    }

    pub fn clear_load_duplicates(&mut self) {
        self.load_duplicates.clear();
    }

    /// Number of non-zero cells
    pub fn len(&self) -> usize {
        self.cells.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Finite and within [0, 100]
pub fn is_valid_percent(percent: f64) -> bool {
    percent.is_finite() && (0.0..=MAX_PERCENT).contains(&percent)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn matrix() -> AllocationMatrix {
        AllocationMatrix::from_ids(&["A", "B"], &["G1", "G2"])
    }

    #[test]
    fn test_set_cell_and_row_sum() {
        let mut m = matrix();
        m.set_cell("A", "G1", 100.0).unwrap();
        m.set_cell("B", "G1", 30.0).unwrap();
        m.set_cell("B", "G2", 70.0).unwrap();

        assert_eq!(m.row_sum("A"), 100.0);
        assert_eq!(m.row_sum("B"), 100.0);
        assert_eq!(m.column_sum("G1"), 130.0);
        assert_eq!(m.remaining("A"), 0.0);

        let list = m.to_allocation_list();
        assert_eq!(
            list,
            vec![
                Allocation::new("A", "G1", 100.0),
                Allocation::new("B", "G1", 30.0),
                Allocation::new("B", "G2", 70.0),
            ]
        );
    }

    #[test]
    fn test_set_cell_rejects_invalid_percent() {
        let mut m = matrix();

        for bad in [-0.5, 100.01, f64::NAN, f64::INFINITY] {
            let err = m.set_cell("A", "G1", bad).unwrap_err();
            assert!(matches!(err, AllocationError::InvalidPercent { .. }));
        }

        // Rejected edits leave the cell untouched
        assert_eq!(m.cell("A", "G1"), 0.0);
        assert!(m.is_empty());
    }

    #[test]
    fn test_set_cell_rejects_unknown_ids() {
        let mut m = matrix();
        assert_eq!(
            m.set_cell("Z", "G1", 10.0),
            Err(AllocationError::UnknownAccount("Z".to_string()))
        );
        assert_eq!(
            m.set_cell("A", "G9", 10.0),
            Err(AllocationError::UnknownGoal("G9".to_string()))
        );
    }

    #[test]
    fn test_setting_zero_removes_cell() {
        let mut m = matrix();
        m.set_cell("A", "G1", 40.0).unwrap();
        m.set_cell("A", "G2", 20.0).unwrap();
        m.set_cell("A", "G1", 0.0).unwrap();

        assert_eq!(m.to_allocation_list(), vec![Allocation::new("A", "G2", 20.0)]);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_set_cell_allows_overflow_for_validator() {
        let mut m = matrix();
        m.set_cell("A", "G1", 60.0).unwrap();
        m.set_cell("A", "G2", 50.0).unwrap();

        assert_eq!(m.row_sum("A"), 110.0);
        assert_eq!(m.remaining("A"), 0.0);
    }

    #[test]
    fn test_get_row_is_restartable() {
        let mut m = matrix();
        m.set_cell("A", "G1", 25.0).unwrap();
        m.set_cell("A", "G2", 35.0).unwrap();

        let first: Vec<(&str, f64)> = m.get_row("A").collect();
        let second: Vec<(&str, f64)> = m.get_row("A").collect();

        assert_eq!(first, vec![("G1", 25.0), ("G2", 35.0)]);
        assert_eq!(first, second);
        assert_eq!(m.get_row("B").count(), 0);
    }

    #[test]
    fn test_load_then_serialize_is_order_independent() {
        let rows = vec![
            Allocation::new("B", "G2", 70.0),
            Allocation::new("A", "G1", 100.0),
            Allocation::new("B", "G1", 30.0),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        let mut m1 = matrix();
        let mut m2 = matrix();
        m1.load(&rows);
        m2.load(&reversed);

        assert_eq!(m1.to_allocation_list(), m2.to_allocation_list());

        // Reloading the output is a fixpoint
        let once = m1.to_allocation_list();
        m1.load(&once);
        assert_eq!(m1.to_allocation_list(), once);
    }

    #[test]
    fn test_load_duplicates_last_value_wins() {
        let mut m = matrix();
        let report = m.load(&[
            Allocation::new("A", "G1", 20.0),
            Allocation::new("A", "G1", 45.0),
        ]);

        assert_eq!(m.cell("A", "G1"), 45.0);
        assert_eq!(m.len(), 1);
        assert_eq!(report.duplicates, vec![AllocationKey::new("A", "G1")]);
        assert_eq!(m.load_duplicates().len(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_load_drops_unknown_ids_and_zero_rows() {
        let mut m = matrix();
        let report = m.load(&[
            Allocation::new("A", "G1", 50.0),
            Allocation::new("X", "G1", 50.0),
            Allocation::new("A", "G7", 50.0),
            Allocation::new("B", "G2", 0.0),
        ]);

        assert_eq!(report.loaded, 1);
        assert_eq!(report.dropped_unknown.len(), 2);
        assert_eq!(m.to_allocation_list(), vec![Allocation::new("A", "G1", 50.0)]);
    }

    #[test]
    fn test_load_replaces_previous_state() {
        let mut m = matrix();
        m.set_cell("B", "G2", 10.0).unwrap();
        m.load(&[Allocation::new("A", "G1", 5.0)]);

        assert_eq!(m.cell("B", "G2"), 0.0);
        assert_eq!(m.cell("A", "G1"), 5.0);
    }

    #[test]
    fn test_remove_goal_drops_column() {
        let mut m = matrix();
        m.set_cell("A", "G1", 10.0).unwrap();
        m.set_cell("B", "G1", 20.0).unwrap();
        m.set_cell("B", "G2", 30.0).unwrap();

        assert_eq!(m.remove_goal("G1"), 2);
        assert!(!m.has_goal("G1"));
        assert_eq!(m.to_allocation_list(), vec![Allocation::new("B", "G2", 30.0)]);
        assert!(m.set_cell("A", "G1", 5.0).is_err());
    }

    #[test]
    fn test_row_reads_follow_column_order_after_zeroing() {
        let mut m = AllocationMatrix::from_ids(&["A"], &["G3", "G1", "G2"]);
        m.set_cell("A", "G2", 20.0).unwrap();
        m.set_cell("A", "G3", 30.0).unwrap();
        m.set_cell("A", "G1", 10.0).unwrap();

        let row: Vec<(&str, f64)> = m.get_row("A").collect();
        assert_eq!(row, vec![("G3", 30.0), ("G1", 10.0), ("G2", 20.0)]);
        assert_eq!(m.get_column("G1").collect::<Vec<_>>(), vec![("A", 10.0)]);

        for goal in ["G1", "G2", "G3"] {
            m.set_cell("A", goal, 0.0).unwrap();
        }
        assert!(m.is_empty());
        assert_eq!(m.get_row("A").count(), 0);
        assert_eq!(m.get_row("missing").count(), 0);
    }

    #[test]
    fn test_clear_row() {
        let mut m = matrix();
        m.set_cell("A", "G1", 10.0).unwrap();
        m.set_cell("A", "G2", 10.0).unwrap();
        m.set_cell("B", "G2", 10.0).unwrap();

        m.clear_row("A");
        assert_eq!(m.row_sum("A"), 0.0);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_is_valid_percent() {
        assert!(is_valid_percent(0.0));
        assert!(is_valid_percent(33.33));
        assert!(is_valid_percent(100.0));
        assert!(!is_valid_percent(-0.0001));
        assert!(!is_valid_percent(f64::NAN));
    }

    const ACCOUNTS: [&str; 3] = ["A", "B", "C"];
    const GOALS: [&str; 3] = ["G1", "G2", "G3"];

    /// Duplicate-free allocation rows plus a shuffled copy of them
    fn rows_and_shuffle() -> impl Strategy<Value = (Vec<Allocation>, Vec<Allocation>)> {
        prop::collection::btree_map(
            (0..ACCOUNTS.len(), 0..GOALS.len()),
            prop_oneof![Just(0.0), 0.0f64..=100.0],
            0..9,
        )
        .prop_map(|cells| {
            cells
                .into_iter()
                .map(|((a, g), percent)| Allocation::new(ACCOUNTS[a], GOALS[g], percent))
                .collect::<Vec<_>>()
        })
        .prop_flat_map(|rows| (Just(rows.clone()), Just(rows).prop_shuffle()))
    }

    proptest! {
        #[test]
        fn prop_load_then_list_ignores_input_order((rows, shuffled) in rows_and_shuffle()) {
            let mut first = AllocationMatrix::from_ids(&ACCOUNTS, &GOALS);
            let mut second = AllocationMatrix::from_ids(&ACCOUNTS, &GOALS);
            first.load(&rows);
            second.load(&shuffled);

            let list = first.to_allocation_list();
            prop_assert_eq!(&list, &second.to_allocation_list());
            prop_assert!(list.iter().all(|a| a.percent != 0.0));
            prop_assert_eq!(list.len(), rows.iter().filter(|a| a.percent != 0.0).count());
        }
    }
}
