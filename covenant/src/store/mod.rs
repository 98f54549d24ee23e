//! Authorization store.
//!
//! Three narrow repositories over the durable records. Every read returns a
//! full record or `None`; addresses are canonical [`Address`] values, so no
//! backend performs case-folding of its own.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use std::sync::Arc;

use crate::types::{
    Address, LinkedWallet, LinkedWalletStatus, SpendingLimits, TransactionRecord, Will, WillStatus,
};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Error types for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Record to update does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Underlying database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored data could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A lock guarding the backend was poisoned
    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Corrupt(e.to_string())
    }
}

/// Will records.
#[async_trait]
pub trait WillRepository: Send + Sync {
    /// Load a will by ID.
    async fn get_will(&self, will_id: &str) -> Result<Option<Will>, StoreError>;

    /// Latest-created will of an owner, in any status.
    async fn get_will_by_owner(&self, owner: &Address) -> Result<Option<Will>, StoreError>;

    /// Insert or replace a will.
    async fn save_will(&self, will: &Will) -> Result<(), StoreError>;

    /// Set a will's status.
    async fn update_status(&self, will_id: &str, status: WillStatus) -> Result<(), StoreError>;

    /// Write back a will's spend counters.
    async fn update_spending_limits(
        &self,
        will_id: &str,
        limits: &SpendingLimits,
    ) -> Result<(), StoreError>;
}

/// Wallets opted into a will.
#[async_trait]
pub trait LinkedWalletRepository: Send + Sync {
    /// Wallets of a will in approval order.
    async fn get_linked_wallets(
        &self,
        will_id: &str,
        approved_only: bool,
    ) -> Result<Vec<LinkedWallet>, StoreError>;

    /// Insert or replace the row for `(will_id, address)`.
    async fn save_linked_wallet(&self, wallet: &LinkedWallet) -> Result<(), StoreError>;

    /// Change a wallet's status (soft delete via [`LinkedWalletStatus::Removed`]).
    async fn set_linked_wallet_status(
        &self,
        will_id: &str,
        address: &Address,
        status: LinkedWalletStatus,
    ) -> Result<(), StoreError>;
}

/// Append-only transaction log.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Upsert by transaction hash.
    async fn save_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError>;

    /// All records of a will, oldest first.
    async fn get_transactions(&self, will_id: &str) -> Result<Vec<TransactionRecord>, StoreError>;
}

/// The three repositories, typically backed by one store.
#[derive(Clone)]
pub struct Repositories {
    pub wills: Arc<dyn WillRepository>,
    pub wallets: Arc<dyn LinkedWalletRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
}

impl Repositories {
    /// Use one store for all three repositories.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: WillRepository + LinkedWalletRepository + TransactionRepository + 'static,
    {
        Self {
            wills: store.clone(),
            wallets: store.clone(),
            transactions: store,
        }
    }
}
