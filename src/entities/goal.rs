// 🏁 Goal Entity - a savings/investment target funded by accounts
//
// Goals are owned by the goal registry. Their ids become matrix columns.
// Deleting a goal orphans its allocation column.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

// ============================================================================
// GOAL ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    /// Stable identity (UUID) - NEVER changes
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Amount the goal aims to reach, in the base currency
    pub target_amount: f64,

    #[serde(default)]
    pub deadline: Option<NaiveDate>,

    pub is_achieved: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    pub fn new(title: &str, target_amount: f64) -> Self {
        let now = Utc::now();

        Goal {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: None,
            target_amount,
            deadline: None,
            is_achieved: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(id: &str, title: &str, target_amount: f64) -> Self {
        let mut goal = Goal::new(title, target_amount);
        goal.id = id.to_string();
        goal
    }

    pub fn mark_achieved(&mut self) {
        self.is_achieved = true;
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// GOAL REGISTRY
// ============================================================================

/// In-memory registry of goals
///
/// Cloning the registry shares the same underlying storage.
#[derive(Clone)]
pub struct GoalRegistry {
    goals: Arc<RwLock<Vec<Goal>>>,
}

impl GoalRegistry {
    pub fn new() -> Self {
        GoalRegistry {
            goals: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a goal (replaces an existing one with the same id)
    pub fn register(&self, goal: Goal) {
        let mut goals = self.goals.write().unwrap_or_else(|e| e.into_inner());
        goals.retain(|g| g.id != goal.id);
        goals.push(goal);
    }

    /// All goals, sorted by title
    pub fn all_goals(&self) -> Vec<Goal> {
        let goals = self.goals.read().unwrap_or_else(|e| e.into_inner());
        let mut all = goals.clone();
        all.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        all
    }

    /// Remove a goal; returns false when it was not registered
    pub fn delete(&self, id: &str) -> bool {
        let mut goals = self.goals.write().unwrap_or_else(|e| e.into_inner());
        let before = goals.len();
        goals.retain(|g| g.id != id);
        goals.len() != before
    }
}

impl Default for GoalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_creation() {
        let goal = Goal::new("House down payment", 60_000.0);

        assert!(!goal.id.is_empty());
        assert_eq!(goal.title, "House down payment");
        assert_eq!(goal.target_amount, 60_000.0);
        assert!(!goal.is_achieved);
    }

    #[test]
    fn test_mark_achieved() {
        let mut goal = Goal::with_id("G1", "Trip", 5_000.0);
        goal.mark_achieved();
        assert!(goal.is_achieved);
        assert!(goal.updated_at >= goal.created_at);
    }

    #[test]
    fn test_registry_delete() {
        let registry = GoalRegistry::new();
        registry.register(Goal::with_id("G1", "Emergency fund", 10_000.0));
        registry.register(Goal::with_id("G2", "Car", 20_000.0));

        let titles: Vec<String> = registry.all_goals().into_iter().map(|g| g.title).collect();
        assert_eq!(titles, vec!["Car".to_string(), "Emergency fund".to_string()]);

        assert!(registry.delete("G2"));
        assert!(!registry.delete("G2"));
        let remaining: Vec<String> = registry.all_goals().into_iter().map(|g| g.id).collect();
        assert_eq!(remaining, vec!["G1".to_string()]);
    }

    #[test]
    fn test_goal_deserializes_without_optional_fields() {
        let json = r#"{
            "id": "G1",
            "title": "Retirement",
            "targetAmount": 1000000.0,
            "isAchieved": false,
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z"
        }"#;

        let goal: Goal = serde_json::from_str(json).unwrap();
        assert_eq!(goal.id, "G1");
        assert_eq!(goal.description, None);
        assert_eq!(goal.deadline, None);
    }
}
