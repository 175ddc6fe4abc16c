// 💾 Allocation Editor - working copy + bulk-replace save protocol
//
// Save protocol:
//   1. Take the submit slot, then validate a snapshot of the working copy.
//      Any error blocks the save (no call made).
//   2. Submit the full non-zero list in ONE bulk replace. Pairs the server
//      has and the list lacks are removed by the receiving side.
//   3. On success: the submitted list becomes the server-known state and the
//      cached goal + allocation lists are invalidated.
//   4. On failure: nothing local changes; the error is returned, not retried.
//
// Only one submit may be in flight. Edits stay open while it is pending.

use crate::allocation::{allocation_fingerprint, diff, Allocation, AllocationDiff};
use crate::backend::AllocationBackend;
use crate::cache::{QueryCache, QueryKey};
use crate::entities::{Account, Goal};
use crate::error::AllocationError;
use crate::matrix::{AllocationMatrix, LoadReport};
use crate::validator::{AllocationValidator, AllocationWarning, ValidationReport};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tracing::{debug, info, warn};

// ============================================================================
// SAVE OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveOutcome {
    /// The full list that was sent
    pub submitted: Vec<Allocation>,

    /// What changed relative to the previous server-known state
    pub diff: AllocationDiff,

    /// Fingerprint of `submitted`
    pub fingerprint: String,

    /// Non-blocking findings at submit time
    #[serde(skip)]
    pub warnings: Vec<AllocationWarning>,
}

// ============================================================================
// IN-FLIGHT GUARD
// ============================================================================

/// Holds the submit slot; releases it on drop (success, error or cancel)
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ============================================================================
// ALLOCATION EDITOR
// ============================================================================

struct EditorState {
    matrix: AllocationMatrix,

    /// Last allocation set confirmed by the backend
    server: Vec<Allocation>,

    load_report: LoadReport,
}

pub struct AllocationEditor<B> {
    backend: B,
    validator: AllocationValidator,
    cache: QueryCache,
    state: RwLock<EditorState>,
    in_flight: AtomicBool,
}

impl<B: AllocationBackend> AllocationEditor<B> {
    /// Load the allocation set from the backend and start an editing session
    pub async fn open(
        backend: B,
        accounts: &[Account],
        goals: &[Goal],
        validator: AllocationValidator,
        cache: QueryCache,
    ) -> Result<Self> {
        let existing = backend
            .load_allocations()
            .await
            .context("Failed to load allocations")?;

        let mut matrix = AllocationMatrix::new(accounts, goals);
        let load_report = matrix.load(&existing);
        cache.mark_fresh(QueryKey::GoalsAllocations);

        info!(
            accounts = accounts.len(),
            goals = goals.len(),
            allocations = load_report.loaded,
            "allocation editor opened"
        );

        Ok(AllocationEditor {
            backend,
            validator,
            cache,
            state: RwLock::new(EditorState {
                matrix,
                server: existing,
                load_report,
            }),
            in_flight: AtomicBool::new(false),
        })
    }

    /// Start a session from an already-loaded matrix
    pub fn from_matrix(
        backend: B,
        matrix: AllocationMatrix,
        validator: AllocationValidator,
        cache: QueryCache,
    ) -> Self {
        let server = matrix.to_allocation_list();
        AllocationEditor {
            backend,
            validator,
            cache,
            state: RwLock::new(EditorState {
                matrix,
                server,
                load_report: LoadReport::default(),
            }),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Edit one cell and return the live validation report
    pub fn set_cell(
        &self,
        account_id: &str,
        goal_id: &str,
        percent: f64,
    ) -> Result<ValidationReport, AllocationError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.matrix.set_cell(account_id, goal_id, percent)?;
        Ok(self.validator.validate(&state.matrix))
    }

    pub fn validate(&self) -> ValidationReport {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        self.validator.validate(&state.matrix)
    }

    /// Read access to the working copy (for rendering)
    pub fn with_matrix<R>(&self, f: impl FnOnce(&AllocationMatrix) -> R) -> R {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&state.matrix)
    }

    pub fn row_sum(&self, account_id: &str) -> f64 {
        self.with_matrix(|m| m.row_sum(account_id))
    }

    pub fn allocations(&self) -> Vec<Allocation> {
        self.with_matrix(|m| m.to_allocation_list())
    }

    pub fn server_allocations(&self) -> Vec<Allocation> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.server.clone()
    }

    pub fn load_report(&self) -> LoadReport {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.load_report.clone()
    }

    /// Changes a submit would apply
    pub fn pending_diff(&self) -> AllocationDiff {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        diff(&state.server, &state.matrix.to_allocation_list())
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending_diff().is_empty()
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Replace the working copy with an external list (e.g. a CSV import)
    ///
    /// Same rules as the initial load; the server-known state is unchanged,
    /// so the difference shows up as pending changes.
    pub fn load(&self, allocations: &[Allocation]) -> LoadReport {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let report = state.matrix.load(allocations);
        state.load_report = report.clone();
        report
    }

    /// Discard local edits and go back to the server-known state
    pub fn reset(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let server = state.server.clone();
        state.load_report = state.matrix.load(&server);
        debug!("allocation editor reset to server state");
    }

    /// Drop a deleted goal's column from the working copy and server state
    pub fn remove_goal(&self, goal_id: &str) -> usize {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.server.retain(|a| a.goal_id != goal_id);
        state.matrix.remove_goal(goal_id)
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Validate, then bulk-replace the allocation set on the backend
    pub async fn submit(&self) -> Result<SaveOutcome, AllocationError> {
        // Snapshot only once the slot is ours, so the diff is taken against
        // the server state left by any save that just finished
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or_else(|| {
            warn!("allocation save rejected: another save is in flight");
            AllocationError::SubmissionInFlight
        })?;

        let (submitted, pending, report) = {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            let report = self.validator.validate(&state.matrix);
            let submitted = state.matrix.to_allocation_list();
            let pending = diff(&state.server, &submitted);
            (submitted, pending, report)
        };

        let report = report.into_result().map_err(|e| {
            warn!(error = %e, "allocation save blocked by validation");
            e
        })?;

        let fingerprint = allocation_fingerprint(&submitted);
        info!(
            rows = submitted.len(),
            changes = %pending.summary(),
            fingerprint = %fingerprint,
            "submitting allocation set"
        );

        if let Err(e) = self.backend.save_allocations(&submitted).await {
            let message = format!("{:#}", e);
            warn!(error = %message, "allocation save failed");
            return Err(AllocationError::SubmissionFailed(message));
        }

        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            state.server = submitted.clone();
            state.matrix.clear_load_duplicates();
            state.load_report.duplicates.clear();
        }
        self.cache
            .invalidate_all(&[QueryKey::Goals, QueryKey::GoalsAllocations]);

        info!(fingerprint = %fingerprint, "allocation set saved");

        Ok(SaveOutcome {
            submitted,
            diff: pending,
            fingerprint,
            warnings: report.warnings,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
