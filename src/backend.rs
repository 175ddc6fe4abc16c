// 🔌 Backend Interfaces - what the allocation engine consumes
//
// Account registry:  list_accounts
// Goal registry:     list_goals, delete_goal
// Allocation layer:  load_allocations, save_allocations (bulk replace)
//
// The transport is the implementor's concern. `SqliteStore` is the on-disk
// implementation; `InMemoryBackend` backs tests and dry runs.

use crate::allocation::Allocation;
use crate::entities::{Account, AccountRegistry, Goal, GoalRegistry};
use crate::validator::AllocationValidator;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<Account>>;
}

#[async_trait]
pub trait GoalSource: Send + Sync {
    async fn list_goals(&self) -> Result<Vec<Goal>>;

    /// Delete a goal; its allocation column goes with it
    async fn delete_goal(&self, goal_id: &str) -> Result<()>;
}

#[async_trait]
pub trait AllocationBackend: Send + Sync {
    async fn load_allocations(&self) -> Result<Vec<Allocation>>;

    /// Replace the whole allocation set in one call
    ///
    /// Pairs missing from `allocations` are removed by the receiving side.
    async fn save_allocations(&self, allocations: &[Allocation]) -> Result<()>;
}

#[async_trait]
impl<T: AccountSource + ?Sized> AccountSource for Arc<T> {
    async fn list_accounts(&self) -> Result<Vec<Account>> {
        (**self).list_accounts().await
    }
}

#[async_trait]
impl<T: GoalSource + ?Sized> GoalSource for Arc<T> {
    async fn list_goals(&self) -> Result<Vec<Goal>> {
        (**self).list_goals().await
    }

    async fn delete_goal(&self, goal_id: &str) -> Result<()> {
        (**self).delete_goal(goal_id).await
    }
}

#[async_trait]
impl<T: AllocationBackend + ?Sized> AllocationBackend for Arc<T> {
    async fn load_allocations(&self) -> Result<Vec<Allocation>> {
        (**self).load_allocations().await
    }

    async fn save_allocations(&self, allocations: &[Allocation]) -> Result<()> {
        (**self).save_allocations(allocations).await
    }
}

// ============================================================================
// IN-MEMORY BACKEND
// ============================================================================

/// Registries plus an allocation list held in memory
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    pub accounts: AccountRegistry,
    pub goals: GoalRegistry,
    allocations: Arc<RwLock<Vec<Allocation>>>,
    validator: AllocationValidator,
}

impl InMemoryBackend {
    pub fn new(accounts: AccountRegistry, goals: GoalRegistry) -> Self {
        InMemoryBackend {
            accounts,
            goals,
            allocations: Arc::new(RwLock::new(Vec::new())),
            validator: AllocationValidator::new(),
        }
    }

    /// Use `validator` for the checks the receiving side runs on save
    pub fn with_validator(mut self, validator: AllocationValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Seed stored allocations without going through the save path
    pub fn seed_allocations(&self, allocations: Vec<Allocation>) {
        *self.allocations.write().unwrap_or_else(|e| e.into_inner()) = allocations;
    }

    pub fn stored_allocations(&self) -> Vec<Allocation> {
        self.allocations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl AccountSource for InMemoryBackend {
    async fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.accounts.all_accounts())
    }
}

#[async_trait]
impl GoalSource for InMemoryBackend {
    async fn list_goals(&self) -> Result<Vec<Goal>> {
        Ok(self.goals.all_goals())
    }

    async fn delete_goal(&self, goal_id: &str) -> Result<()> {
        if !self.goals.delete(goal_id) {
            return Err(anyhow!("Goal not found: {}", goal_id));
        }
        self.allocations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|a| a.goal_id != goal_id);
        Ok(())
    }
}

#[async_trait]
impl AllocationBackend for InMemoryBackend {
    async fn load_allocations(&self) -> Result<Vec<Allocation>> {
        Ok(self.stored_allocations())
    }

    async fn save_allocations(&self, allocations: &[Allocation]) -> Result<()> {
        let report = self.validator.validate_allocations(
            allocations,
            &self.accounts.all_accounts(),
            &self.goals.all_goals(),
        );
        if !report.is_submittable() {
            let reasons: Vec<String> = report.errors.iter().map(|e| e.to_string()).collect();
            bail!("Allocation set rejected: {}", reasons.join("; "));
        }

        let non_zero: Vec<Allocation> = allocations
            .iter()
            .filter(|a| !a.is_zero())
            .cloned()
            .collect();
        *self.allocations.write().unwrap_or_else(|e| e.into_inner()) = non_zero;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::AccountType;

    fn backend() -> InMemoryBackend {
        let accounts = AccountRegistry::new();
        accounts.register(Account::with_id("A", "Checking", AccountType::Cash, "USD"));
        let goals = GoalRegistry::new();
        goals.register(Goal::with_id("G1", "Trip", 2_000.0));
        goals.register(Goal::with_id("G2", "House", 80_000.0));
        InMemoryBackend::new(accounts, goals)
    }

    #[tokio::test]
    async fn test_save_replaces_whole_set() {
        let backend = backend();
        backend.seed_allocations(vec![
            Allocation::new("A", "G1", 50.0),
            Allocation::new("A", "G2", 50.0),
        ]);

        backend
            .save_allocations(&[Allocation::new("A", "G2", 80.0)])
            .await
            .unwrap();

        assert_eq!(
            backend.load_allocations().await.unwrap(),
            vec![Allocation::new("A", "G2", 80.0)]
        );
    }

    #[tokio::test]
    async fn test_save_rejects_unknown_ids_without_changes() {
        let backend = backend();
        backend.seed_allocations(vec![Allocation::new("A", "G1", 10.0)]);

        let result = backend
            .save_allocations(&[Allocation::new("A", "G404", 10.0)])
            .await;

        assert!(result.is_err());
        assert_eq!(backend.stored_allocations().len(), 1);
    }

    #[tokio::test]
    async fn test_save_rejects_duplicates_and_out_of_range_rows() {
        let backend = backend();
        backend.seed_allocations(vec![Allocation::new("A", "G1", 10.0)]);

        let duplicate = backend
            .save_allocations(&[
                Allocation::new("A", "G1", -5.0),
                Allocation::new("A", "G1", 150.0),
            ])
            .await;
        assert!(duplicate.is_err());

        let too_large = backend
            .save_allocations(&[Allocation::new("A", "G2", 150.0)])
            .await;
        let message = too_large.unwrap_err().to_string();
        assert!(message.contains("Allocation set rejected"));

        let negative = backend
            .save_allocations(&[Allocation::new("A", "G2", -5.0)])
            .await;
        assert!(negative.is_err());

        assert_eq!(
            backend.stored_allocations(),
            vec![Allocation::new("A", "G1", 10.0)]
        );
    }

    #[tokio::test]
    async fn test_save_rejects_row_overflow() {
        let backend = backend();

        let result = backend
            .save_allocations(&[
                Allocation::new("A", "G1", 60.0),
                Allocation::new("A", "G2", 50.0),
            ])
            .await;

        assert!(result.is_err());
        assert!(backend.stored_allocations().is_empty());
    }

    #[tokio::test]
    async fn test_delete_goal_removes_column() {
        let backend = backend();
        backend.seed_allocations(vec![
            Allocation::new("A", "G1", 50.0),
            Allocation::new("A", "G2", 50.0),
        ]);

        backend.delete_goal("G1").await.unwrap();

        assert_eq!(backend.list_goals().await.unwrap().len(), 1);
        assert_eq!(
            backend.stored_allocations(),
            vec![Allocation::new("A", "G2", 50.0)]
        );
        assert!(backend.delete_goal("G1").await.is_err());
    }

    #[tokio::test]
    async fn test_arc_forwards_calls() {
        let shared: Arc<InMemoryBackend> = Arc::new(backend());
        assert_eq!(shared.list_accounts().await.unwrap().len(), 1);
        assert!(AllocationBackend::load_allocations(&shared).await.unwrap().is_empty());
    }
}
