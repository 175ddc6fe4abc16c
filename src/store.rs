// 🗄️ SQLite Store - accounts, goals, allocations + audit trail
//
// The receiving side of the bulk replace: `replace_allocations` validates
// the submitted list against the stored registries, then swaps the whole
// goals_allocation table inside one SQL transaction. Either every row
// changes or none does.

use crate::allocation::{allocation_fingerprint, Allocation};
use crate::backend::{AccountSource, AllocationBackend, GoalSource};
use crate::entities::{Account, AccountType, Goal};
use crate::validator::AllocationValidator;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Event for audit trail ("Every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            account_type TEXT NOT NULL,
            account_group TEXT,
            currency TEXT NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS goals (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            target_amount REAL NOT NULL,
            deadline TEXT,
            is_achieved INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Allocations: one row per non-zero (account, goal) pair
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS goals_allocation (
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            goal_id TEXT NOT NULL REFERENCES goals(id) ON DELETE CASCADE,
            percent REAL NOT NULL CHECK (percent > 0 AND percent <= 100),
            PRIMARY KEY (account_id, goal_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_allocation_goal ON goals_allocation(goal_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ============================================================================
// ACCOUNTS
// ============================================================================

/// Insert or update an account by id
pub fn insert_account(conn: &Connection, account: &Account) -> Result<()> {
    conn.execute(
        "INSERT INTO accounts (
            id, name, account_type, account_group, currency,
            is_default, is_active, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            account_type = excluded.account_type,
            account_group = excluded.account_group,
            currency = excluded.currency,
            is_default = excluded.is_default,
            is_active = excluded.is_active,
            updated_at = excluded.updated_at",
        params![
            account.id,
            account.name,
            account.account_type.as_str(),
            account.group,
            account.currency,
            account.is_default,
            account.is_active,
            account.created_at.to_rfc3339(),
            account.updated_at.to_rfc3339(),
        ],
    )
    .with_context(|| format!("Failed to insert account {}", account.id))?;

    Ok(())
}

pub fn set_account_active(conn: &Connection, account_id: &str, active: bool) -> Result<()> {
    let changed = conn.execute(
        "UPDATE accounts SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
        params![active, Utc::now().to_rfc3339(), account_id],
    )?;

    if changed == 0 {
        bail!("Account not found: {}", account_id);
    }
    Ok(())
}

pub fn list_accounts(conn: &Connection) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, account_type, account_group, currency,
                is_default, is_active, created_at, updated_at
         FROM accounts
         ORDER BY name, id",
    )?;

    let accounts = stmt
        .query_map([], |row| {
            let type_str: String = row.get(2)?;
            let account_type = AccountType::parse(&type_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    Type::Text,
                    format!("unknown account type {}", type_str).into(),
                )
            })?;

            Ok(Account {
                id: row.get(0)?,
                name: row.get(1)?,
                account_type,
                group: row.get(3)?,
                currency: row.get(4)?,
                is_default: row.get(5)?,
                is_active: row.get(6)?,
                created_at: parse_timestamp(7, row.get(7)?)?,
                updated_at: parse_timestamp(8, row.get(8)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(accounts)
}

// ============================================================================
// GOALS
// ============================================================================

/// Insert or update a goal by id (never a delete+insert, so the allocation
/// column survives)
pub fn insert_goal(conn: &Connection, goal: &Goal) -> Result<()> {
    conn.execute(
        "INSERT INTO goals (
            id, title, description, target_amount, deadline,
            is_achieved, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            target_amount = excluded.target_amount,
            deadline = excluded.deadline,
            is_achieved = excluded.is_achieved,
            updated_at = excluded.updated_at",
        params![
            goal.id,
            goal.title,
            goal.description,
            goal.target_amount,
            goal.deadline.map(|d| d.to_string()),
            goal.is_achieved,
            goal.created_at.to_rfc3339(),
            goal.updated_at.to_rfc3339(),
        ],
    )
    .with_context(|| format!("Failed to insert goal {}", goal.id))?;

    Ok(())
}

pub fn list_goals(conn: &Connection) -> Result<Vec<Goal>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, description, target_amount, deadline,
                is_achieved, created_at, updated_at
         FROM goals
         ORDER BY title, id",
    )?;

    let goals = stmt
        .query_map([], |row| {
            let deadline: Option<String> = row.get(4)?;
            let deadline = deadline
                .map(|d| {
                    NaiveDate::parse_from_str(&d, "%Y-%m-%d").map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
                    })
                })
                .transpose()?;

            Ok(Goal {
                id: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                target_amount: row.get(3)?,
                deadline,
                is_achieved: row.get(5)?,
                created_at: parse_timestamp(6, row.get(6)?)?,
                updated_at: parse_timestamp(7, row.get(7)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(goals)
}

/// Delete a goal and its allocation column
pub fn delete_goal(conn: &mut Connection, goal_id: &str) -> Result<usize> {
    let tx = conn.transaction()?;

    let removed = tx.execute(
        "DELETE FROM goals_allocation WHERE goal_id = ?1",
        params![goal_id],
    )?;
    let deleted = tx.execute("DELETE FROM goals WHERE id = ?1", params![goal_id])?;

    if deleted == 0 {
        bail!("Goal not found: {}", goal_id);
    }

    insert_event(
        &tx,
        &Event::new(
            "goal_deleted",
            "goal",
            goal_id,
            serde_json::json!({ "allocations_removed": removed }),
            "goal_registry",
        ),
    )?;

    tx.commit()?;
    info!(goal_id, allocations_removed = removed, "goal deleted");
    Ok(removed)
}

// ============================================================================
// ALLOCATIONS
// ============================================================================

pub fn load_allocations(conn: &Connection) -> Result<Vec<Allocation>> {
    let mut stmt = conn.prepare(
        "SELECT account_id, goal_id, percent
         FROM goals_allocation
         ORDER BY account_id, goal_id",
    )?;

    let allocations = stmt
        .query_map([], |row| {
            Ok(Allocation {
                account_id: row.get(0)?,
                goal_id: row.get(1)?,
                percent: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(allocations)
}

/// Bulk replace the allocation table; returns the fingerprint of the new set
///
/// The list is validated against the stored accounts and goals first. Any
/// validation error rejects the whole call and leaves the table untouched.
pub fn replace_allocations(
    conn: &mut Connection,
    allocations: &[Allocation],
    validator: &AllocationValidator,
) -> Result<String> {
    let tx = conn.transaction()?;

    let accounts = list_accounts(&tx)?;
    let goals = list_goals(&tx)?;
    let report = validator.validate_allocations(allocations, &accounts, &goals);
    if !report.is_submittable() {
        let reasons: Vec<String> = report.errors.iter().map(|e| e.to_string()).collect();
        warn!(errors = report.errors.len(), "rejecting allocation replace");
        bail!("Allocation set rejected: {}", reasons.join("; "));
    }

    let previous: i64 = tx.query_row("SELECT COUNT(*) FROM goals_allocation", [], |row| row.get(0))?;
    tx.execute("DELETE FROM goals_allocation", [])?;

    let mut inserted = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO goals_allocation (account_id, goal_id, percent) VALUES (?1, ?2, ?3)",
        )?;
        for allocation in allocations.iter().filter(|a| !a.is_zero()) {
            stmt.execute(params![
                allocation.account_id,
                allocation.goal_id,
                allocation.percent
            ])?;
            inserted += 1;
        }
    }

    let fingerprint = allocation_fingerprint(allocations);
    insert_event(
        &tx,
        &Event::new(
            "allocations_replaced",
            "goals_allocation",
            &fingerprint,
            serde_json::json!({
                "previous_rows": previous,
                "rows": inserted,
            }),
            "allocation_editor",
        ),
    )?;

    tx.commit()?;
    info!(previous, rows = inserted, fingerprint = %fingerprint, "allocations replaced");

    Ok(fingerprint)
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(1, row.get(1)?)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// SQLITE STORE (backend implementation)
// ============================================================================

/// Shared SQLite connection implementing the backend traits
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    validator: AllocationValidator,
}

impl SqliteStore {
    pub fn open(path: &Path, validator: AllocationValidator) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn, validator))
    }

    pub fn open_in_memory(validator: AllocationValidator) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn, validator))
    }

    fn from_connection(conn: Connection, validator: AllocationValidator) -> Self {
        SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
            validator,
        }
    }

    /// Run `f` with exclusive access to the connection
    pub fn with_connection<R>(&self, f: impl FnOnce(&mut Connection) -> Result<R>) -> Result<R> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))?;
        f(&mut conn)
    }
}

#[async_trait]
impl AccountSource for SqliteStore {
    async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.with_connection(|conn| list_accounts(conn))
    }
}

#[async_trait]
impl GoalSource for SqliteStore {
    async fn list_goals(&self) -> Result<Vec<Goal>> {
        self.with_connection(|conn| list_goals(conn))
    }

    async fn delete_goal(&self, goal_id: &str) -> Result<()> {
        self.with_connection(|conn| delete_goal(conn, goal_id))
            .map(|_| ())
    }
}

#[async_trait]
impl AllocationBackend for SqliteStore {
    async fn load_allocations(&self) -> Result<Vec<Allocation>> {
        self.with_connection(|conn| load_allocations(conn))
    }

    async fn save_allocations(&self, allocations: &[Allocation]) -> Result<()> {
        let validator = self.validator;
        self.with_connection(|conn| replace_allocations(conn, allocations, &validator))
            .map(|_| ())
    }
}

// ============================================================================
// TESTS
// ============================================================================
