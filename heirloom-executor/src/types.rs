//! Core types for will execution.

use covenant::{Address, Beneficiary, LimitRejection, StoreError, WillStatus};
use serde::{Deserialize, Serialize};

/// Error types for execution. Every variant is raised before any transfer.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// No will with this ID
    #[error("Will not found: {0}")]
    NotFound(String),

    /// Caller is not the will's owner
    #[error("Owner mismatch for will {will_id}: claimed {claimed}")]
    OwnerMismatch { will_id: String, claimed: Address },

    /// Will already executed or expired
    #[error("Will {will_id} is {status}, not pending")]
    NotPending { will_id: String, status: WillStatus },

    /// Substituted beneficiary list is unusable
    #[error("Invalid beneficiary override: {0}")]
    InvalidOverride(String),

    /// Execution mode needs configuration that is missing
    #[error("Unsupported execution mode: {0}")]
    UnsupportedMode(String),

    /// Store failed while loading the will
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for execution operations.
pub type Result<T> = std::result::Result<T, ExecutionError>;

/// A request to execute a will.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub will_id: String,
    pub claimed_owner: Address,
    /// Beneficiaries to use for this execution instead of the stored ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beneficiaries: Option<Vec<Beneficiary>>,
}

impl ExecutionRequest {
    pub fn new(will_id: impl Into<String>, claimed_owner: Address) -> Self {
        Self {
            will_id: will_id.into(),
            claimed_owner,
            beneficiaries: None,
        }
    }

    /// Substitute an adjusted beneficiary list.
    pub fn with_beneficiaries(mut self, beneficiaries: Vec<Beneficiary>) -> Self {
        self.beneficiaries = Some(beneficiaries);
        self
    }
}

/// Why a transfer did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Refused by the spending limiter before submission
    LimitExceeded { rejection: LimitRejection },
    /// Ledger refused the submission or confirmation never arrived
    Submission { detail: String },
    /// Included on the ledger but reverted
    Reverted { tx_hash: String },
    /// Source wallet's balance could not be read
    WalletUnavailable { detail: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LimitExceeded { rejection } => write!(f, "limit exceeded: {}", rejection),
            Self::Submission { detail } => write!(f, "submission failed: {}", detail),
            Self::Reverted { tx_hash } => write!(f, "reverted: {}", tx_hash),
            Self::WalletUnavailable { detail } => write!(f, "wallet unavailable: {}", detail),
        }
    }
}

/// Outcome of one (wallet, beneficiary) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferOutcome {
    Confirmed { tx_hash: String },
    Failed { reason: FailureReason },
}

/// One entry of an execution's result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Source wallet
    pub wallet: Address,
    pub beneficiary: Address,
    pub beneficiary_name: String,
    /// Attempted amount; zero when the wallet failed before allocation
    pub amount: u128,
    pub outcome: TransferOutcome,
}

impl ExecutionResult {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.outcome, TransferOutcome::Confirmed { .. })
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.outcome {
            TransferOutcome::Failed { reason } => Some(reason),
            TransferOutcome::Confirmed { .. } => None,
        }
    }
}

/// What one execution did.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub will_id: String,
    /// True when every attempted transfer confirmed
    pub success: bool,
    pub results: Vec<ExecutionResult>,
    pub attestation_tx: Option<String>,
    /// Beneficiary list the distribution used
    pub beneficiaries: Vec<Beneficiary>,
    /// False if the terminal status could not be written
    pub finalized: bool,
}

impl ExecutionReport {
    /// Sum of confirmed amounts.
    pub fn total_confirmed(&self) -> u128 {
        self.results
            .iter()
            .filter(|r| r.is_confirmed())
            .fold(0u128, |acc, r| acc.saturating_add(r.amount))
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_confirmed()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serialization() {
        let confirmed = TransferOutcome::Confirmed {
            tx_hash: "0xabc".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&confirmed).unwrap(),
            serde_json::json!({"status": "confirmed", "tx_hash": "0xabc"})
        );

        let failed = TransferOutcome::Failed {
            reason: FailureReason::LimitExceeded {
                rejection: LimitRejection::PerTransaction {
                    amount: 5,
                    limit: 4,
                },
            },
        };
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["reason"]["kind"], "limit_exceeded");
        assert_eq!(value["reason"]["rejection"]["kind"], "per_transaction");
    }

    #[test]
    fn test_report_totals() {
        let result = |amount, outcome| ExecutionResult {
            wallet: Address::from_bytes([1; 20]),
            beneficiary: Address::from_bytes([2; 20]),
            beneficiary_name: "B".to_string(),
            amount,
            outcome,
        };
        let report = ExecutionReport {
            will_id: "w".to_string(),
            success: false,
            results: vec![
                result(
                    600,
                    TransferOutcome::Confirmed {
                        tx_hash: "0x1".to_string(),
                    },
                ),
                result(
                    400,
                    TransferOutcome::Failed {
                        reason: FailureReason::Submission {
                            detail: "nonce".to_string(),
                        },
                    },
                ),
            ],
            attestation_tx: None,
            beneficiaries: Vec::new(),
            finalized: true,
        };
        assert_eq!(report.total_confirmed(), 600);
        assert_eq!(report.failed_count(), 1);
    }
}
