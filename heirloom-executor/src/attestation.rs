//! Trigger attestation.
//!
//! Records on the ledger that a will's trigger condition has occurred. The
//! controller treats every failure here as non-blocking.

use async_trait::async_trait;
use covenant::Address;
use std::sync::Arc;
use tracing::info;

use crate::ledger::{CallPayload, LedgerCall, LedgerClient, LedgerError};

#[derive(Debug, thiserror::Error)]
pub enum AttestationError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Attestation transaction reverted: {0}")]
    Reverted(String),
}

/// A recorded attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    pub tx_hash: String,
    /// Where the attestation lives
    pub registry: Address,
}

/// Sink for death/inactivity attestations.
#[async_trait]
pub trait AttestationSink: Send + Sync {
    async fn record(
        &self,
        will_id: &str,
        owner: &Address,
        beneficiary_count: u32,
        message: &str,
    ) -> Result<Attestation, AttestationError>;
}

/// Writes death certificates to a registry contract.
pub struct LedgerAttestationSink {
    ledger: Arc<dyn LedgerClient>,
    registry: Address,
}

impl LedgerAttestationSink {
    pub fn new(ledger: Arc<dyn LedgerClient>, registry: Address) -> Self {
        Self { ledger, registry }
    }
}

#[async_trait]
impl AttestationSink for LedgerAttestationSink {
    async fn record(
        &self,
        will_id: &str,
        owner: &Address,
        beneficiary_count: u32,
        message: &str,
    ) -> Result<Attestation, AttestationError> {
        let handle = self
            .ledger
            .submit(LedgerCall {
                target: self.registry,
                value: 0,
                payload: CallPayload::DeathCertificate {
                    will_id: will_id.to_string(),
                    owner: *owner,
                    beneficiary_count,
                    message: message.to_string(),
                },
            })
            .await?;

        let receipt = self.ledger.wait(&handle).await?;
        if !receipt.success {
            return Err(AttestationError::Reverted(receipt.hash));
        }

        info!(will_id, tx_hash = %receipt.hash, "Death certificate recorded");
        Ok(Attestation {
            tx_hash: receipt.hash,
            registry: self.registry,
        })
    }
}
