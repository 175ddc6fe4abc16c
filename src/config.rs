// ⚙️ Configuration - database location and allocation policy
//
// Lookup order: explicit --config path (must exist), then
// ./goal-allocation.toml if present, then defaults. GOAL_ALLOCATION_DB
// overrides the database path last.

use crate::validator::{AllocationValidator, SumPolicy, DEFAULT_TOLERANCE};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "goal-allocation.toml";
pub const DATABASE_ENV: &str = "GOAL_ALLOCATION_DB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding accounts, goals and allocations
    pub database_path: PathBuf,

    /// Row-sum rule: at_most_100 (partial allocation allowed) or exactly_100
    pub policy: SumPolicy,

    /// Slack for floating-point row sums
    pub tolerance: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("goal_allocation.db"),
            policy: SumPolicy::AtMost100,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                if !p.exists() {
                    bail!("Config file not found: {}", p.display());
                }
                Self::from_file(p)?
            }
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Config::default()
                }
            }
        };

        if let Ok(db) = std::env::var(DATABASE_ENV) {
            if !db.is_empty() {
                config.database_path = PathBuf::from(db);
            }
        }

        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 || self.tolerance >= 1.0 {
            bail!("tolerance must be in [0, 1), got {}", self.tolerance);
        }
        Ok(())
    }

    pub fn validator(&self) -> AllocationValidator {
        AllocationValidator {
            tolerance: self.tolerance,
            policy: self.policy,
        }
    }
}
