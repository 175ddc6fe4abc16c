// 🧭 Goal Settings - orchestration of the goals settings screen
//
// Owns the backend and the query cache. Opens allocation editing sessions
// from fresh registry data, deletes goals (which orphans their allocation
// column) and computes goal progress.

use crate::backend::{AccountSource, AllocationBackend, GoalSource};
use crate::cache::{QueryCache, QueryKey};
use crate::editor::AllocationEditor;
use crate::progress::{goal_progress, GoalProgress};
use crate::validator::AllocationValidator;
use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::info;

pub struct GoalSettings<B> {
    backend: B,
    validator: AllocationValidator,
    cache: QueryCache,
}

impl<B> GoalSettings<B>
where
    B: AccountSource + GoalSource + AllocationBackend + Clone,
{
    pub fn new(backend: B, validator: AllocationValidator) -> Self {
        GoalSettings {
            backend,
            validator,
            cache: QueryCache::new(),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Fetch accounts and goals, then load allocations into a new editor
    pub async fn open_editor(&self) -> Result<AllocationEditor<B>> {
        let accounts = self
            .backend
            .list_accounts()
            .await
            .context("Failed to list accounts")?;
        self.cache.mark_fresh(QueryKey::Accounts);

        let goals = self
            .backend
            .list_goals()
            .await
            .context("Failed to list goals")?;
        self.cache.mark_fresh(QueryKey::Goals);

        AllocationEditor::open(
            self.backend.clone(),
            &accounts,
            &goals,
            self.validator,
            self.cache.clone(),
        )
        .await
    }

    /// Delete a goal and invalidate both cached goal and allocation lists
    pub async fn delete_goal(&self, goal_id: &str) -> Result<()> {
        self.backend
            .delete_goal(goal_id)
            .await
            .with_context(|| format!("Failed to delete goal {}", goal_id))?;

        self.cache
            .invalidate_all(&[QueryKey::Goals, QueryKey::GoalsAllocations]);
        info!(goal_id, "goal deleted, goal and allocation queries invalidated");
        Ok(())
    }

    /// Progress of every goal from the stored allocations
    pub async fn goal_progress(
        &self,
        account_values: &HashMap<String, f64>,
    ) -> Result<Vec<GoalProgress>> {
        let goals = self.backend.list_goals().await?;
        let allocations = self.backend.load_allocations().await?;
        self.cache.mark_fresh(QueryKey::Goals);
        self.cache.mark_fresh(QueryKey::GoalsAllocations);
        Ok(goal_progress(&goals, &allocations, account_values))
    }
}
