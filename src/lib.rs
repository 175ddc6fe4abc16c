// Goal Allocation Engine - Core Library
// Distributes each account's contribution across savings/investment goals.
// Exposes all modules for use in the CLI and tests.

pub mod allocation;
pub mod backend;
pub mod cache;
pub mod config;
pub mod csv_io;
pub mod editor;
pub mod entities;
pub mod error;
pub mod matrix;
pub mod progress;
pub mod settings;
pub mod store;
pub mod validator;

// Re-export commonly used types
pub use allocation::{allocation_fingerprint, diff, Allocation, AllocationDiff, AllocationKey};
pub use backend::{AccountSource, AllocationBackend, GoalSource, InMemoryBackend};
pub use cache::{QueryCache, QueryKey};
pub use config::Config;
pub use csv_io::{read_allocations_csv, write_allocations_csv};
pub use editor::{AllocationEditor, SaveOutcome};
pub use entities::{Account, AccountRegistry, AccountType, Goal, GoalRegistry};
pub use error::AllocationError;
pub use matrix::{AllocationMatrix, LoadReport};
pub use progress::{goal_progress, Contribution, GoalProgress};
pub use settings::GoalSettings;
pub use store::{Event, SqliteStore};
pub use validator::{
    AllocationValidator, AllocationWarning, SumPolicy, ValidationReport, DEFAULT_TOLERANCE,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
