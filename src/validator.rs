// ✅ Allocation Validator - decides whether an allocation set is submittable
//
// Rules:
//   1. Every cell is a finite number in [0, 100]            → InvalidPercent
//   2. Every account's row sum is <= 100 (± tolerance)      → AllocationOverflow
//   3. (exact policy only) touched rows sum to 100          → AllocationShortfall
//   4. Each (account, goal) pair appears once in a list     → DuplicateAllocation
//
// Inactive accounts and achieved goals holding allocations are warnings, not
// errors. The validator is pure: same input, same report, no I/O.

use crate::allocation::{Allocation, AllocationKey};
use crate::entities::{Account, Goal};
use crate::error::AllocationError;
use crate::matrix::{is_valid_percent, AllocationMatrix, MAX_PERCENT};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Slack for binary rounding of decimal input (33.4 + 33.3 + 33.3)
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

// ============================================================================
// SUM POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SumPolicy {
    /// Accounts may be partially or fully unallocated
    #[default]
    #[serde(rename = "at_most_100")]
    AtMost100,

    /// Any account with at least one allocation must total exactly 100
    #[serde(rename = "exactly_100")]
    Exactly100,
}

impl SumPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SumPolicy::AtMost100 => "at_most_100",
            SumPolicy::Exactly100 => "exactly_100",
        }
    }
}

// ============================================================================
// WARNINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AllocationWarning {
    /// Account was deactivated after allocations were made
    InactiveAccount { account_id: String, total: f64 },

    /// Goal is already achieved but still receives allocations
    AchievedGoal { goal_id: String, total: f64 },

    /// Load input repeated this key; only the last value was kept
    DuplicateOnLoad { account_id: String, goal_id: String },
}

impl AllocationWarning {
    pub fn message(&self) -> String {
        match self {
            AllocationWarning::InactiveAccount { account_id, total } => format!(
                "inactive account {} still allocates {:.2}%",
                account_id, total
            ),
            AllocationWarning::AchievedGoal { goal_id, total } => format!(
                "achieved goal {} still receives {:.2}%",
                goal_id, total
            ),
            AllocationWarning::DuplicateOnLoad { account_id, goal_id } => format!(
                "allocation {}/{} was listed more than once; last value kept",
                account_id, goal_id
            ),
        }
    }
}

// ============================================================================
// VALIDATION REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<AllocationError>,
    pub warnings: Vec<AllocationWarning>,
}

impl ValidationReport {
    pub fn is_submittable(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors attached to one account (for row highlighting)
    pub fn row_errors(&self, account_id: &str) -> Vec<&AllocationError> {
        self.errors
            .iter()
            .filter(|e| e.account_id() == Some(account_id))
            .collect()
    }

    /// True if a specific cell carries an error
    pub fn has_cell_error(&self, account_id: &str, goal_id: &str) -> bool {
        self.errors
            .iter()
            .any(|e| e.account_id() == Some(account_id) && e.goal_id() == Some(goal_id))
    }

    pub fn overflowing_accounts(&self) -> Vec<&str> {
        self.errors
            .iter()
            .filter_map(|e| match e {
                AllocationError::AllocationOverflow { account_id, .. } => Some(account_id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} error(s), {} warning(s)",
            self.errors.len(),
            self.warnings.len()
        )
    }

    /// Ok with the report when submittable, `SubmissionBlocked` otherwise
    pub fn into_result(self) -> Result<ValidationReport, AllocationError> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(AllocationError::SubmissionBlocked(self.errors))
        }
    }
}

// ============================================================================
// ALLOCATION VALIDATOR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocationValidator {
    /// Tolerance for floating-point row sums (default: 1e-9)
    pub tolerance: f64,

    pub policy: SumPolicy,
}

impl AllocationValidator {
    pub fn new() -> Self {
        AllocationValidator {
            tolerance: DEFAULT_TOLERANCE,
            policy: SumPolicy::AtMost100,
        }
    }

    pub fn with_policy(policy: SumPolicy) -> Self {
        AllocationValidator {
            tolerance: DEFAULT_TOLERANCE,
            policy,
        }
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        AllocationValidator {
            tolerance,
            policy: SumPolicy::AtMost100,
        }
    }

    /// Validate the current state of a matrix
    pub fn validate(&self, matrix: &AllocationMatrix) -> ValidationReport {
        let mut report = ValidationReport::default();

        for row in matrix.rows() {
            let mut total = 0.0;
            let mut touched = false;

            for (goal_id, percent) in matrix.get_row(&row.account_id) {
                touched = true;
                if is_valid_percent(percent) {
                    total += percent;
                } else {
                    report.errors.push(AllocationError::InvalidPercent {
                        account_id: row.account_id.clone(),
                        goal_id: goal_id.to_string(),
                        percent,
                    });
                }
            }

            self.check_row_sum(&row.account_id, total, touched, &mut report.errors);

            if !row.is_active && total > 0.0 {
                report.warnings.push(AllocationWarning::InactiveAccount {
                    account_id: row.account_id.clone(),
                    total,
                });
            }
        }

        for column in matrix.columns() {
            let total = matrix.column_sum(&column.goal_id);
            if column.is_achieved && total > 0.0 {
                report.warnings.push(AllocationWarning::AchievedGoal {
                    goal_id: column.goal_id.clone(),
                    total,
                });
            }
        }

        for key in matrix.load_duplicates() {
            report.warnings.push(AllocationWarning::DuplicateOnLoad {
                account_id: key.account_id.clone(),
                goal_id: key.goal_id.clone(),
            });
        }

        report
    }

    /// Validate a raw allocation list against the registries
    ///
    /// Unlike `validate`, repeated keys are errors here: a list with
    /// duplicates must never be persisted.
    pub fn validate_allocations(
        &self,
        allocations: &[Allocation],
        accounts: &[Account],
        goals: &[Goal],
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        let known_accounts: HashMap<&str, &Account> =
            accounts.iter().map(|a| (a.id.as_str(), a)).collect();
        let known_goals: HashMap<&str, &Goal> = goals.iter().map(|g| (g.id.as_str(), g)).collect();

        let mut seen: HashSet<AllocationKey> = HashSet::new();
        let mut row_totals: BTreeMap<&str, (f64, bool)> = BTreeMap::new();
        let mut column_totals: BTreeMap<&str, f64> = BTreeMap::new();

        for allocation in allocations {
            if !seen.insert(allocation.key()) {
                report.errors.push(AllocationError::DuplicateAllocation {
                    account_id: allocation.account_id.clone(),
                    goal_id: allocation.goal_id.clone(),
                });
                continue;
            }

            if !known_accounts.contains_key(allocation.account_id.as_str()) {
                report
                    .errors
                    .push(AllocationError::UnknownAccount(allocation.account_id.clone()));
                continue;
            }
            if !known_goals.contains_key(allocation.goal_id.as_str()) {
                report
                    .errors
                    .push(AllocationError::UnknownGoal(allocation.goal_id.clone()));
                continue;
            }

            if !is_valid_percent(allocation.percent) {
                report.errors.push(AllocationError::InvalidPercent {
                    account_id: allocation.account_id.clone(),
                    goal_id: allocation.goal_id.clone(),
                    percent: allocation.percent,
                });
                continue;
            }

            if allocation.percent == 0.0 {
                continue;
            }

            let entry = row_totals
                .entry(allocation.account_id.as_str())
                .or_insert((0.0, false));
            entry.0 += allocation.percent;
            entry.1 = true;

            *column_totals.entry(allocation.goal_id.as_str()).or_insert(0.0) += allocation.percent;
        }

        for (account_id, (total, touched)) in &row_totals {
            self.check_row_sum(account_id, *total, *touched, &mut report.errors);

            if let Some(account) = known_accounts.get(account_id) {
                if !account.is_active {
                    report.warnings.push(AllocationWarning::InactiveAccount {
                        account_id: account_id.to_string(),
                        total: *total,
                    });
                }
            }
        }

        for (goal_id, total) in &column_totals {
            if let Some(goal) = known_goals.get(goal_id) {
                if goal.is_achieved {
                    report.warnings.push(AllocationWarning::AchievedGoal {
                        goal_id: goal_id.to_string(),
                        total: *total,
                    });
                }
            }
        }

        report
    }

    fn check_row_sum(
        &self,
        account_id: &str,
        total: f64,
        touched: bool,
        errors: &mut Vec<AllocationError>,
    ) {
        if total > MAX_PERCENT + self.tolerance {
            errors.push(AllocationError::AllocationOverflow {
                account_id: account_id.to_string(),
                excess: total - MAX_PERCENT,
            });
        } else if self.policy == SumPolicy::Exactly100
            && touched
            && total < MAX_PERCENT - self.tolerance
        {
            errors.push(AllocationError::AllocationShortfall {
                account_id: account_id.to_string(),
                missing: MAX_PERCENT - total,
            });
        }
    }
}

impl Default for AllocationValidator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
