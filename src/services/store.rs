//! Ledger persistence.
//!
//! Each account is stored as one row holding the nested JSON snapshot of
//! the account (bots and histories included), keyed by user id. Writes are
//! revision-guarded: a save only replaces a row with a strictly newer
//! revision, so saves issued outside the account lock cannot regress
//! stored state.

use crate::types::Account;
use dashmap::DashMap;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store connection lock poisoned")]
    Poisoned,
}

/// Durable storage of ledger accounts.
pub trait LedgerStore: Send + Sync {
    /// Load every stored account.
    fn load_all(&self) -> Result<Vec<Account>, StoreError>;

    /// Load one account.
    fn load(&self, user_id: &str) -> Result<Option<Account>, StoreError>;

    /// Save an account unless a newer revision is already stored.
    fn save(&self, account: &Account) -> Result<(), StoreError>;
}

// =============================================================================
// SQLite
// =============================================================================

/// SQLite-backed ledger store.
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
}

impl SqliteLedgerStore {
    /// Open (or create) the store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite ledger store initialized");
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite ledger store initialized");
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                user_id TEXT PRIMARY KEY,
                revision INTEGER NOT NULL,
                data_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Stored revision of an account, if any.
    pub fn revision(&self, user_id: &str) -> Result<Option<u64>, StoreError> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT revision FROM accounts WHERE user_id = ?1",
            params![user_id],
            |row| row.get::<_, i64>(0),
        );
        match result {
            Ok(rev) => Ok(Some(rev.max(0) as u64)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn load_all(&self) -> Result<Vec<Account>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT user_id, data_json FROM accounts ORDER BY user_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut accounts = Vec::new();
        for row in rows {
            let (user_id, json) = row?;
            match serde_json::from_str::<Account>(&json) {
                Ok(account) => accounts.push(account),
                Err(e) => warn!("Skipping unreadable account {}: {}", user_id, e),
            }
        }
        Ok(accounts)
    }

    fn load(&self, user_id: &str) -> Result<Option<Account>, StoreError> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT data_json FROM accounts WHERE user_id = ?1",
            params![user_id],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, account: &Account) -> Result<(), StoreError> {
        let json = serde_json::to_string(account)?;
        let now = chrono::Utc::now().timestamp_millis();
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT INTO accounts (user_id, revision, data_json, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                revision = excluded.revision,
                data_json = excluded.data_json,
                updated_at = excluded.updated_at
             WHERE excluded.revision > accounts.revision",
            params![account.user_id, account.revision as i64, json, now],
        )?;
        if changed == 0 {
            debug!(
                "Skipped save of {} at revision {}: newer revision stored",
                account.user_id, account.revision
            );
        }
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// In-memory ledger store with the same revision guard.
#[derive(Default)]
pub struct MemoryLedgerStore {
    accounts: DashMap<String, Account>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load_all(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self.accounts.iter().map(|e| e.value().clone()).collect();
        accounts.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(accounts)
    }

    fn load(&self, user_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(user_id).map(|e| e.value().clone()))
    }

    fn save(&self, account: &Account) -> Result<(), StoreError> {
        let mut entry = self
            .accounts
            .entry(account.user_id.clone())
            .or_insert_with(|| account.clone());
        if account.revision > entry.revision {
            *entry = account.clone();
        }
        Ok(())
    }
}
