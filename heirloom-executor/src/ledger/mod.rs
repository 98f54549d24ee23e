//! Ledger client contract.
//!
//! The engine never signs anything itself: submissions are authorized by the
//! service's custody account behind the [`LedgerClient`] implementation.

pub mod memory;

use async_trait::async_trait;
use covenant::Address;
use serde::{Deserialize, Serialize};

pub use memory::InMemoryLedger;

/// Error types for ledger operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// Transaction was not accepted
    #[error("Submission rejected: {0}")]
    Submission(String),

    /// Transaction was accepted but its fate is unknown
    #[error("Confirmation failed: {0}")]
    Confirmation(String),

    /// Read call failed
    #[error("Query failed: {0}")]
    Query(String),
}

/// An asset whose balance can be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "token", rename_all = "snake_case")]
pub enum Asset {
    Native,
    Token(Address),
}

/// What a submitted transaction does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum CallPayload {
    /// Send `value` of the native asset from a custodied wallet to `target`
    NativeTransfer { from: Address },
    /// `transferFrom(from, to, amount)` on the token at `target`
    TokenTransferFrom {
        from: Address,
        to: Address,
        amount: u128,
    },
    /// Withdraw from the vault at `target`; `token: None` means native asset
    VaultWithdraw {
        token: Option<Address>,
        to: Address,
        amount: u128,
    },
    /// Record a death certificate on the registry at `target`
    DeathCertificate {
        will_id: String,
        owner: Address,
        beneficiary_count: u32,
        message: String,
    },
}

/// A transaction to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCall {
    pub target: Address,
    /// Native value attached
    pub value: u128,
    pub payload: CallPayload,
}

/// Handle of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHandle {
    pub hash: String,
}

/// Final state of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub hash: String,
    pub success: bool,
}

/// Client of the ledger the assets live on.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a transaction.
    async fn submit(&self, call: LedgerCall) -> Result<TxHandle, LedgerError>;

    /// Wait for a submitted transaction to settle.
    async fn wait(&self, handle: &TxHandle) -> Result<TxReceipt, LedgerError>;

    /// Balance of `owner` in `asset`, smallest units.
    async fn balance_of(&self, asset: Asset, owner: &Address) -> Result<u128, LedgerError>;

    /// Amount `spender` may pull from `owner` of `token`.
    async fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<u128, LedgerError>;
}
