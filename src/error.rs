// ⚠️ Allocation Errors
// One taxonomy shared by the matrix, the validator and the save protocol.
//
// Edit-time errors (InvalidPercent, UnknownAccount, UnknownGoal) are resolved
// locally. Overflow/shortfall/duplicate errors block submission. Only
// SubmissionFailed ever comes from the backend.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AllocationError {
    /// Cell value outside [0, 100] or not a finite number
    #[error("invalid percent {percent} for account {account_id} / goal {goal_id}")]
    InvalidPercent {
        account_id: String,
        goal_id: String,
        percent: f64,
    },

    /// Row sum above 100
    #[error("account {account_id} is over-allocated by {excess:.2}%")]
    AllocationOverflow { account_id: String, excess: f64 },

    /// Row sum below 100 while the exact-100 policy is active
    #[error("account {account_id} is under-allocated by {missing:.2}%")]
    AllocationShortfall { account_id: String, missing: f64 },

    /// Same (account, goal) pair listed more than once
    #[error("duplicate allocation for account {account_id} / goal {goal_id}")]
    DuplicateAllocation { account_id: String, goal_id: String },

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("unknown goal: {0}")]
    UnknownGoal(String),

    /// Client-side validation failed, nothing was sent
    #[error("submission blocked by {} validation error(s)", .0.len())]
    SubmissionBlocked(Vec<AllocationError>),

    /// Another bulk replace is still pending
    #[error("a save is already in progress")]
    SubmissionInFlight,

    /// Backend or transport rejected the bulk replace
    #[error("failed to save allocations: {0}")]
    SubmissionFailed(String),
}

impl AllocationError {
    /// Account the error points at, if any (for row highlighting)
    pub fn account_id(&self) -> Option<&str> {
        match self {
            AllocationError::InvalidPercent { account_id, .. }
            | AllocationError::AllocationOverflow { account_id, .. }
            | AllocationError::AllocationShortfall { account_id, .. }
            | AllocationError::DuplicateAllocation { account_id, .. } => Some(account_id),
            AllocationError::UnknownAccount(id) => Some(id),
            _ => None,
        }
    }

    /// Goal the error points at, if any (for cell highlighting)
    pub fn goal_id(&self) -> Option<&str> {
        match self {
            AllocationError::InvalidPercent { goal_id, .. }
            | AllocationError::DuplicateAllocation { goal_id, .. } => Some(goal_id),
            AllocationError::UnknownGoal(id) => Some(id),
            _ => None,
        }
    }

    /// True for errors that are caught before any network call
    pub fn is_client_side(&self) -> bool {
        !matches!(
            self,
            AllocationError::SubmissionFailed(_) | AllocationError::SubmissionInFlight
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
