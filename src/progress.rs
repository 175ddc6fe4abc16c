// 📈 Goal Progress - how far each goal is funded by its allocations
//
// funded(goal) = Σ value(account) × percent(account, goal) / 100
// progress     = funded / target   (0 when target <= 0)

use crate::allocation::Allocation;
use crate::entities::Goal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One account's share of a goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub account_id: String,
    pub percent: f64,
    pub account_value: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub goal_id: String,
    pub title: String,
    pub target_amount: f64,
    pub funded_amount: f64,
    /// funded / target, unclamped (1.2 = 120%)
    pub progress: f64,
    pub is_achieved: bool,
    pub contributions: Vec<Contribution>,
}

impl GoalProgress {
    /// Progress clamped to [0, 1] for progress bars
    pub fn display_ratio(&self) -> f64 {
        self.progress.clamp(0.0, 1.0)
    }

    pub fn remaining_amount(&self) -> f64 {
        (self.target_amount - self.funded_amount).max(0.0)
    }
}

/// Progress of every goal, in input order
///
/// Accounts missing from `account_values` contribute nothing.
pub fn goal_progress(
    goals: &[Goal],
    allocations: &[Allocation],
    account_values: &HashMap<String, f64>,
) -> Vec<GoalProgress> {
    goals
        .iter()
        .map(|goal| {
            let contributions: Vec<Contribution> = allocations
                .iter()
                .filter(|a| a.goal_id == goal.id && !a.is_zero())
                .filter_map(|a| {
                    account_values.get(&a.account_id).map(|value| Contribution {
                        account_id: a.account_id.clone(),
                        percent: a.percent,
                        account_value: *value,
                        amount: value * a.percent / 100.0,
                    })
                })
                .collect();

            let funded_amount: f64 = contributions.iter().map(|c| c.amount).sum();
            let progress = if goal.target_amount > 0.0 {
                funded_amount / goal.target_amount
            } else {
                0.0
            };

            GoalProgress {
                goal_id: goal.id.clone(),
                title: goal.title.clone(),
                target_amount: goal.target_amount,
                funded_amount,
                progress,
                is_achieved: goal.is_achieved
                    || (goal.target_amount > 0.0 && funded_amount >= goal.target_amount),
                contributions,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_progress_sums_contributions() {
        let goals = vec![
            Goal::with_id("G1", "Emergency fund", 10_000.0),
            Goal::with_id("G2", "House", 100_000.0),
        ];
        let allocations = vec![
            Allocation::new("A", "G1", 100.0),
            Allocation::new("B", "G1", 30.0),
            Allocation::new("B", "G2", 70.0),
        ];
        let values: HashMap<String, f64> =
            [("A".to_string(), 5_000.0), ("B".to_string(), 20_000.0)]
                .into_iter()
                .collect();

        let progress = goal_progress(&goals, &allocations, &values);

        assert_eq!(progress.len(), 2);
        assert_eq!(progress[0].funded_amount, 11_000.0);
        assert!(progress[0].is_achieved);
        assert_eq!(progress[0].display_ratio(), 1.0);
        assert_eq!(progress[0].contributions.len(), 2);

        assert_eq!(progress[1].funded_amount, 14_000.0);
        assert!((progress[1].progress - 0.14).abs() < 1e-12);
        assert_eq!(progress[1].remaining_amount(), 86_000.0);
        assert!(!progress[1].is_achieved);
    }

    #[test]
    fn test_goal_progress_handles_missing_values_and_zero_target() {
        let goals = vec![Goal::with_id("G1", "Someday", 0.0)];
        let allocations = vec![Allocation::new("A", "G1", 50.0)];

        let progress = goal_progress(&goals, &allocations, &HashMap::new());

        assert_eq!(progress[0].funded_amount, 0.0);
        assert_eq!(progress[0].progress, 0.0);
        assert!(progress[0].contributions.is_empty());
        assert!(!progress[0].is_achieved);
    }
}
