// Entity Models - the external registries the allocation engine reads from
//
// Each entity has a stable identity (UUID) and a registry used as the
// source of truth for valid ids during an editing session.

pub mod account;
pub mod goal;

pub use account::{Account, AccountRegistry, AccountType};
pub use goal::{Goal, GoalRegistry};
