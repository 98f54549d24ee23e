//! SQLite-backed store.
//!
//! Wills are kept as JSON documents next to the indexed columns the lookups
//! need; linked wallets and transactions are plain rows. Amounts are stored as
//! decimal text because SQLite integers stop at 64 bits.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use super::{LinkedWalletRepository, StoreError, TransactionRepository, WillRepository};
use crate::types::{
    Address, LinkedWallet, LinkedWalletStatus, SpendingLimits, TransactionRecord, TxStatus,
    TxType, Will, WillStatus,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS wills (
    will_id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS wills_owner ON wills (owner, created_at);

CREATE TABLE IF NOT EXISTS linked_wallets (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    will_id TEXT NOT NULL,
    address TEXT NOT NULL,
    signature TEXT NOT NULL,
    approved_at TEXT NOT NULL,
    status TEXT NOT NULL,
    UNIQUE (will_id, address)
);

CREATE TABLE IF NOT EXISTS transactions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    tx_hash TEXT NOT NULL UNIQUE,
    will_id TEXT NOT NULL,
    from_address TEXT NOT NULL,
    to_address TEXT NOT NULL,
    amount TEXT NOT NULL,
    token_symbol TEXT NOT NULL,
    tx_type TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS transactions_will ON transactions (will_id);
";

/// Durable store in a single SQLite file.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Connection::open(path)?;
        // Enable WAL mode for concurrent read access
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::init(db)?;
        info!(path = %path.display(), "Authorization store opened");
        Ok(store)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self, StoreError> {
        db.execute_batch(SCHEMA)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }

    fn load_will(db: &Connection, will_id: &str) -> Result<Option<Will>, StoreError> {
        let data: Option<String> = db
            .query_row(
                "SELECT data FROM wills WHERE will_id = ?1",
                [will_id],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|d| serde_json::from_str(&d).map_err(StoreError::from))
            .transpose()
    }

    fn write_will(db: &Connection, will: &Will) -> Result<(), StoreError> {
        let data = serde_json::to_string(will)?;
        db.execute(
            "INSERT INTO wills (will_id, owner, status, created_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(will_id) DO UPDATE SET
                owner = ?2, status = ?3, created_at = ?4, data = ?5",
            params![
                will.will_id,
                will.owner.to_string(),
                will.status.as_str(),
                will.created_at.to_stamp(),
                data
            ],
        )?;
        Ok(())
    }

    fn modify_will(
        &self,
        will_id: &str,
        change: impl FnOnce(&mut Will),
    ) -> Result<(), StoreError> {
        let db = self.conn()?;
        let mut will =
            Self::load_will(&db, will_id)?.ok_or_else(|| StoreError::NotFound(will_id.to_string()))?;
        change(&mut will);
        Self::write_will(&db, &will)
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
trait Stamp {
    fn to_stamp(&self) -> String;
}

impl Stamp for DateTime<Utc> {
    fn to_stamp(&self) -> String {
        self.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }
}

fn parse_address(raw: &str) -> Result<Address, StoreError> {
    Address::parse(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// Raw text columns of a linked wallet row, decoded after the query.
struct WalletRow {
    will_id: String,
    address: String,
    signature: String,
    approved_at: String,
    status: String,
}

impl WalletRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            will_id: row.get(0)?,
            address: row.get(1)?,
            signature: row.get(2)?,
            approved_at: row.get(3)?,
            status: row.get(4)?,
        })
    }

    fn decode(self) -> Result<LinkedWallet, StoreError> {
        Ok(LinkedWallet {
            will_id: self.will_id,
            address: parse_address(&self.address)?,
            signature: self.signature,
            approved_at: parse_time(&self.approved_at)?,
            status: LinkedWalletStatus::parse(&self.status)
                .ok_or_else(|| StoreError::Corrupt(format!("wallet status {}", self.status)))?,
        })
    }
}

struct TransactionRow {
    tx_hash: String,
    will_id: String,
    from_address: String,
    to_address: String,
    amount: String,
    token_symbol: String,
    tx_type: String,
    status: String,
    created_at: String,
}

impl TransactionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            tx_hash: row.get(0)?,
            will_id: row.get(1)?,
            from_address: row.get(2)?,
            to_address: row.get(3)?,
            amount: row.get(4)?,
            token_symbol: row.get(5)?,
            tx_type: row.get(6)?,
            status: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn decode(self) -> Result<TransactionRecord, StoreError> {
        Ok(TransactionRecord {
            tx_hash: self.tx_hash,
            will_id: self.will_id,
            from_address: parse_address(&self.from_address)?,
            to_address: parse_address(&self.to_address)?,
            amount: self
                .amount
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("amount {}", self.amount)))?,
            token_symbol: self.token_symbol,
            tx_type: TxType::parse(&self.tx_type)
                .ok_or_else(|| StoreError::Corrupt(format!("tx type {}", self.tx_type)))?,
            status: TxStatus::parse(&self.status)
                .ok_or_else(|| StoreError::Corrupt(format!("tx status {}", self.status)))?,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

#[async_trait]
impl WillRepository for SqliteStore {
    async fn get_will(&self, will_id: &str) -> Result<Option<Will>, StoreError> {
        let db = self.conn()?;
        Self::load_will(&db, will_id)
    }

    async fn get_will_by_owner(&self, owner: &Address) -> Result<Option<Will>, StoreError> {
        let db = self.conn()?;
        let data: Option<String> = db
            .query_row(
                "SELECT data FROM wills WHERE owner = ?1
                 ORDER BY created_at DESC LIMIT 1",
                [owner.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|d| serde_json::from_str(&d).map_err(StoreError::from))
            .transpose()
    }

    async fn save_will(&self, will: &Will) -> Result<(), StoreError> {
        let db = self.conn()?;
        Self::write_will(&db, will)
    }

    async fn update_status(&self, will_id: &str, status: WillStatus) -> Result<(), StoreError> {
        self.modify_will(will_id, |will| {
            will.status = status;
            will.updated_at = Utc::now();
        })
    }

    async fn update_spending_limits(
        &self,
        will_id: &str,
        limits: &SpendingLimits,
    ) -> Result<(), StoreError> {
        self.modify_will(will_id, |will| will.spending_limits = limits.clone())
    }
}

#[async_trait]
impl LinkedWalletRepository for SqliteStore {
    async fn get_linked_wallets(
        &self,
        will_id: &str,
        approved_only: bool,
    ) -> Result<Vec<LinkedWallet>, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare_cached(
            "SELECT will_id, address, signature, approved_at, status FROM linked_wallets
             WHERE will_id = ?1 AND (?2 = 0 OR status = 'approved')
             ORDER BY approved_at ASC, seq ASC",
        )?;
        let rows = stmt
            .query_map(params![will_id, approved_only], WalletRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(WalletRow::decode).collect()
    }

    async fn save_linked_wallet(&self, wallet: &LinkedWallet) -> Result<(), StoreError> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO linked_wallets (will_id, address, signature, approved_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(will_id, address) DO UPDATE SET
                signature = ?3, approved_at = ?4, status = ?5",
            params![
                wallet.will_id,
                wallet.address.to_string(),
                wallet.signature,
                wallet.approved_at.to_stamp(),
                wallet.status.as_str()
            ],
        )?;
        Ok(())
    }

    async fn set_linked_wallet_status(
        &self,
        will_id: &str,
        address: &Address,
        status: LinkedWalletStatus,
    ) -> Result<(), StoreError> {
        let db = self.conn()?;
        let changed = db.execute(
            "UPDATE linked_wallets SET status = ?3 WHERE will_id = ?1 AND address = ?2",
            params![will_id, address.to_string(), status.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("{}/{}", will_id, address)));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for SqliteStore {
    async fn save_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO transactions
                (tx_hash, will_id, from_address, to_address, amount, token_symbol, tx_type, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(tx_hash) DO UPDATE SET
                will_id = ?2, from_address = ?3, to_address = ?4, amount = ?5,
                token_symbol = ?6, tx_type = ?7, status = ?8, created_at = ?9",
            params![
                record.tx_hash,
                record.will_id,
                record.from_address.to_string(),
                record.to_address.to_string(),
                record.amount.to_string(),
                record.token_symbol,
                record.tx_type.as_str(),
                record.status.as_str(),
                record.created_at.to_stamp()
            ],
        )?;
        Ok(())
    }

    async fn get_transactions(&self, will_id: &str) -> Result<Vec<TransactionRecord>, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare_cached(
            "SELECT tx_hash, will_id, from_address, to_address, amount, token_symbol, tx_type, status, created_at
             FROM transactions WHERE will_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map([will_id], TransactionRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(TransactionRow::decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_will_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("heirloom.db");
        let mut will = fixtures::will("will-1", Address::from_bytes([1; 20]));
        will.total_amount = u128::MAX;

        {
            let store = SqliteStore::open(&path).unwrap();
            store.save_will(&will).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let loaded = store.get_will("will-1").await.unwrap().unwrap();
        assert_eq!(loaded, will);
    }

    #[tokio::test]
    async fn test_status_and_limits_updates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let will = fixtures::will("will-1", Address::from_bytes([1; 20]));
        store.save_will(&will).await.unwrap();

        let mut limits = will.spending_limits.clone();
        limits.daily_spent = 600;
        store.update_spending_limits("will-1", &limits).await.unwrap();
        store.update_status("will-1", WillStatus::Executed).await.unwrap();

        let loaded = store.get_will("will-1").await.unwrap().unwrap();
        assert_eq!(loaded.spending_limits.daily_spent, 600);
        assert_eq!(loaded.status, WillStatus::Executed);

        assert!(matches!(
            store.update_status("nope", WillStatus::Executed).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_latest_will_by_owner() {
        let store = SqliteStore::open_in_memory().unwrap();
        let owner = Address::from_bytes([9; 20]);
        let mut older = fixtures::will("older", owner);
        older.created_at = older.created_at - chrono::Duration::hours(2);
        store.save_will(&older).await.unwrap();
        store.save_will(&fixtures::will("newer", owner)).await.unwrap();

        let found = store.get_will_by_owner(&owner).await.unwrap().unwrap();
        assert_eq!(found.will_id, "newer");
    }

    #[tokio::test]
    async fn test_linked_wallets() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = LinkedWallet::approved("w", Address::from_bytes([5; 20]), "sig-a");
        let mut second = LinkedWallet::approved("w", Address::from_bytes([4; 20]), "sig-b");
        second.approved_at = first.approved_at + chrono::Duration::seconds(1);
        store.save_linked_wallet(&first).await.unwrap();
        store.save_linked_wallet(&second).await.unwrap();

        let wallets = store.get_linked_wallets("w", true).await.unwrap();
        assert_eq!(wallets, vec![first.clone(), second.clone()]);

        store
            .set_linked_wallet_status("w", &second.address, LinkedWalletStatus::Removed)
            .await
            .unwrap();
        assert_eq!(store.get_linked_wallets("w", true).await.unwrap(), vec![first]);
        assert_eq!(store.get_linked_wallets("w", false).await.unwrap().len(), 2);

        assert!(matches!(
            store
                .set_linked_wallet_status("w", &Address::from_bytes([0; 20]), LinkedWalletStatus::Removed)
                .await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_transactions_upsert_by_hash() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = fixtures::transaction("0xabc", "w", u128::MAX);
        store.save_transaction(&record).await.unwrap();
        store.save_transaction(&record).await.unwrap();

        let rows = store.get_transactions("w").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, u128::MAX);
        assert!(store.get_transactions("other").await.unwrap().is_empty());
    }
}
