// 💳 Account Entity - a funding source for goals
//
// "Account name is a VALUE (can change), Account UUID is IDENTITY (never changes)"
//
// Accounts are owned by the account registry. The allocation engine only
// reads them: ids become matrix rows, is_active drives validator warnings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

// ============================================================================
// ACCOUNT TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// Brokerage account holding securities
    Securities,

    /// Cash / bank account
    Cash,

    /// Crypto wallet or exchange account
    Cryptocurrency,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Securities => "SECURITIES",
            AccountType::Cash => "CASH",
            AccountType::Cryptocurrency => "CRYPTOCURRENCY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "SECURITIES" => Some(AccountType::Securities),
            "CASH" => Some(AccountType::Cash),
            "CRYPTOCURRENCY" | "CRYPTO" => Some(AccountType::Cryptocurrency),
            _ => None,
        }
    }
}

// ============================================================================
// ACCOUNT ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Stable identity (UUID) - NEVER changes
    pub id: String,

    /// Display name (e.g., "Brokerage - Long Term")
    pub name: String,

    pub account_type: AccountType,

    /// Optional grouping label shown in account lists
    #[serde(default)]
    pub group: Option<String>,

    /// Currency (ISO 4217 code: USD, EUR, CAD, etc.)
    pub currency: String,

    #[serde(default)]
    pub is_default: bool,

    /// Inactive accounts may keep allocations; they are flagged, not rejected
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create new active account with a fresh UUID
    pub fn new(name: &str, account_type: AccountType, currency: &str) -> Self {
        let now = Utc::now();

        Account {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            account_type,
            group: None,
            currency: currency.to_uppercase(),
            is_default: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Same as `new` but with a caller-chosen id (imports, fixtures)
    pub fn with_id(id: &str, name: &str, account_type: AccountType, currency: &str) -> Self {
        let mut account = Account::new(name, account_type, currency);
        account.id = id.to_string();
        account
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.updated_at = Utc::now();
    }

    /// "Name (CUR)" label for matrix row headers
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.currency)
    }
}

// ============================================================================
// ACCOUNT REGISTRY
// ============================================================================

/// In-memory registry of accounts
///
/// Source of truth for valid account ids during an editing session.
/// Cloning the registry shares the same underlying storage.
#[derive(Clone)]
pub struct AccountRegistry {
    accounts: Arc<RwLock<Vec<Account>>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        AccountRegistry {
            accounts: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register an account (replaces an existing one with the same id)
    pub fn register(&self, account: Account) {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        accounts.retain(|a| a.id != account.id);
        accounts.push(account);
    }

    /// All accounts, sorted by name
    pub fn all_accounts(&self) -> Vec<Account> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        let mut all = accounts.clone();
        all.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        all
    }
}

impl Default for AccountRegistry {
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
    fn test_account_creation() {
        let account = Account::new("Brokerage", AccountType::Securities, "usd");

        assert!(!account.id.is_empty());
        assert_eq!(account.name, "Brokerage");
        assert_eq!(account.currency, "USD");
        assert_eq!(account.label(), "Brokerage (USD)");
        assert!(account.is_active);
        assert!(!account.is_default);
    }

    #[test]
    fn test_account_type_parse() {
        assert_eq!(AccountType::parse("cash"), Some(AccountType::Cash));
        assert_eq!(AccountType::parse("CRYPTO"), Some(AccountType::Cryptocurrency));
        assert_eq!(AccountType::parse("bonds"), None);
        assert_eq!(AccountType::Securities.as_str(), "SECURITIES");
    }

    #[test]
    fn test_account_serializes_camel_case() {
        let account = Account::with_id("A", "Savings", AccountType::Cash, "EUR");
        let json = serde_json::to_value(&account).unwrap();

        assert_eq!(json["id"], "A");
        assert_eq!(json["accountType"], "CASH");
        assert_eq!(json["isActive"], true);
    }

    #[test]
    fn test_registry_register_replaces_same_id() {
        let registry = AccountRegistry::new();
        registry.register(Account::with_id("A", "Old Name", AccountType::Cash, "USD"));
        registry.register(Account::with_id("A", "New Name", AccountType::Cash, "USD"));

        let all = registry.all_accounts();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "New Name");
    }

    #[test]
    fn test_registry_lists_by_name() {
        let registry = AccountRegistry::new();
        registry.register(Account::with_id("A", "Checking", AccountType::Cash, "USD"));
        registry.register(Account::with_id("B", "Brokerage", AccountType::Securities, "CAD"));

        let names: Vec<String> = registry.all_accounts().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["Brokerage".to_string(), "Checking".to_string()]);
    }
}
