//! Core types for the will authorization model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error parsing a ledger address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// Missing `0x` prefix
    #[error("Address must start with 0x: {0}")]
    MissingPrefix(String),

    /// Wrong number of hex digits
    #[error("Address must have 40 hex digits, got {0}")]
    InvalidLength(usize),

    /// Non-hex characters
    #[error("Address contains non-hex characters: {0}")]
    InvalidHex(String),
}

/// A 20-byte ledger account address.
///
/// Parsing accepts any letter case; display is always lower-case, which is the
/// canonical form used for comparisons and storage keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    /// Build from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Build from the trailing 20 bytes of a longer slice (e.g. a Keccak digest).
    pub fn from_tail(bytes: &[u8]) -> Option<Self> {
        let start = bytes.len().checked_sub(20)?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes[start..]);
        Some(Self(out))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse a `0x`-prefixed hex address.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| AddressError::MissingPrefix(trimmed.to_string()))?;

        if digits.len() != 40 {
            return Err(AddressError::InvalidLength(digits.len()));
        }

        let mut out = [0u8; 20];
        hex::decode_to_slice(digits, &mut out)
            .map_err(|_| AddressError::InvalidHex(trimmed.to_string()))?;
        Ok(Self(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_string()
    }
}

/// A named recipient with a share of the estate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beneficiary {
    /// Receiving address
    pub address: Address,
    /// Share in percent (fractional allowed, e.g. 36.3)
    pub percentage: f64,
    /// Display name
    pub name: String,
}

impl Beneficiary {
    /// Create a new beneficiary.
    pub fn new(address: Address, percentage: f64, name: impl Into<String>) -> Self {
        Self {
            address,
            percentage,
            name: name.into(),
        }
    }
}

/// Sum of all beneficiary percentages.
pub fn total_percentage(beneficiaries: &[Beneficiary]) -> f64 {
    beneficiaries.iter().map(|b| b.percentage).sum()
}

/// Lifecycle status of a will.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WillStatus {
    /// Authorized and waiting for the trigger
    Pending,
    /// Distribution has run
    Executed,
    /// Authorization lapsed (set by external policy)
    Expired,
}

impl WillStatus {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executed => "executed",
            Self::Expired => "expired",
        }
    }

    /// Parse the storage form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "executed" => Some(Self::Executed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for WillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How funds are moved when the will executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Native-asset transfers from each linked wallet
    Native,
    /// Pull-based stablecoin transfers from each linked wallet
    Stablecoin,
    /// Withdrawals from the owner's spend-limited vault
    Vault {
        /// Vault account
        vault: Address,
        /// Whether the vault pays out in the stablecoin rather than the native asset
        stablecoin: bool,
    },
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::Native
    }
}

/// Per-will transfer caps, mutated in place as transfers confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingLimits {
    /// Largest single transfer, smallest units
    pub per_tx_limit: u128,
    /// Largest total per calendar day, smallest units
    pub daily_limit: u128,
    /// Spent so far on `last_reset_date`
    pub daily_spent: u128,
    /// UTC date the daily counter belongs to
    pub last_reset_date: NaiveDate,
}

impl SpendingLimits {
    /// Fresh limits with nothing spent.
    pub fn new(per_tx_limit: u128, daily_limit: u128, today: NaiveDate) -> Self {
        Self {
            per_tx_limit,
            daily_limit,
            daily_spent: 0,
            last_reset_date: today,
        }
    }
}

/// A stored, signed authorization for one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Will {
    /// Unique will ID
    pub will_id: String,
    /// Owner address
    pub owner: Address,
    /// Ordered beneficiary list
    pub beneficiaries: Vec<Beneficiary>,
    /// Authorized total, smallest units
    pub total_amount: u128,
    /// Authorization validity bound (unix seconds)
    pub valid_until: u64,
    /// Owner signature over the authorization
    pub signature: String,
    /// Lifecycle status
    pub status: WillStatus,
    /// Execution mode
    pub mode: ExecutionMode,
    /// Spend caps
    pub spending_limits: SpendingLimits,
    /// When the will was first authorized
    pub created_at: DateTime<Utc>,
    /// When the will was last changed
    pub updated_at: DateTime<Utc>,
}

/// Approval state of a linked wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkedWalletStatus {
    /// Requested, not yet approved
    Pending,
    /// Participates in fan-out
    Approved,
    /// Soft-deleted
    Removed,
}

impl LinkedWalletStatus {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Removed => "removed",
        }
    }

    /// Parse the storage form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }
}

/// A wallet opted into a will's aggregated distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedWallet {
    /// Will this wallet contributes to
    pub will_id: String,
    /// Wallet address
    pub address: Address,
    /// Proof of the wallet's opt-in
    pub signature: String,
    /// When the wallet was approved
    pub approved_at: DateTime<Utc>,
    /// Approval state
    pub status: LinkedWalletStatus,
}

impl LinkedWallet {
    /// An approved wallet link.
    pub fn approved(will_id: impl Into<String>, address: Address, signature: impl Into<String>) -> Self {
        Self {
            will_id: will_id.into(),
            address,
            signature: signature.into(),
            approved_at: Utc::now(),
            status: LinkedWalletStatus::Approved,
        }
    }
}

/// Kind of ledger transaction recorded for a will.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxType {
    /// Trigger attestation
    DeathDeclaration,
    /// Transfer to a beneficiary
    Distribution,
}

impl TxType {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeathDeclaration => "DEATH_DECLARATION",
            Self::Distribution => "DISTRIBUTION",
        }
    }

    /// Parse the storage form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEATH_DECLARATION" => Some(Self::DeathDeclaration),
            "DISTRIBUTION" => Some(Self::Distribution),
            _ => None,
        }
    }
}

/// Settlement state of a recorded transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }

    /// Parse the storage form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Append-only audit record of a ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Ledger transaction hash (unique)
    pub tx_hash: String,
    /// Will the transaction belongs to
    pub will_id: String,
    /// Source wallet
    pub from_address: Address,
    /// Beneficiary (or attestation target)
    pub to_address: Address,
    /// Amount, smallest units
    pub amount: u128,
    /// Asset symbol
    pub token_symbol: String,
    /// Transaction kind
    pub tx_type: TxType,
    /// Settlement state
    pub status: TxStatus,
    /// When the record was written
    pub created_at: DateTime<Utc>,
}
