//! Will lifecycle controller.
//!
//! `pending -> executed` is the only transition made here. Validation
//! failures return before any side effect; once distribution starts the
//! will ends up `executed` whatever the individual transfers did.

use covenant::registry::PERCENTAGE_TOLERANCE;
use covenant::{
    Address, Beneficiary, Clock, LinkedWallet, Repositories, SystemClock, TransactionRecord,
    TxStatus, TxType, Will, WillStatus,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::attestation::AttestationSink;
use crate::config::ExecutorConfig;
use crate::fanout::FanoutExecutor;
use crate::ledger::LedgerClient;
use crate::locks::WillLocks;
use crate::strategy::{select_strategy, ExecutionStrategy};
use crate::types::{ExecutionError, ExecutionReport, ExecutionRequest, Result};

/// Runs wills.
pub struct WillController {
    repos: Repositories,
    ledger: Arc<dyn LedgerClient>,
    attestation: Option<Arc<dyn AttestationSink>>,
    config: ExecutorConfig,
    clock: Arc<dyn Clock>,
    locks: WillLocks,
}

impl WillController {
    pub fn new(repos: Repositories, ledger: Arc<dyn LedgerClient>, config: ExecutorConfig) -> Self {
        Self {
            repos,
            ledger,
            attestation: None,
            config,
            clock: Arc::new(SystemClock),
            locks: WillLocks::new(),
        }
    }

    /// Record an attestation before each distribution.
    pub fn with_attestation(mut self, sink: Arc<dyn AttestationSink>) -> Self {
        self.attestation = Some(sink);
        self
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Execute a pending will.
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionReport> {
        let _guard = self.locks.acquire(&request.will_id).await;

        let mut will = self.load_pending(&request.will_id, &request.claimed_owner).await?;

        let beneficiaries = match request.beneficiaries {
            Some(list) => {
                validate_override(&list)?;
                info!(will_id = %will.will_id, "Executing with substituted beneficiaries");
                list
            }
            None => will.beneficiaries.clone(),
        };

        let strategy = select_strategy(&will.mode, &self.config)?;
        let wallets = self.approved_wallets(&will).await?;
        let sources = strategy.sources(&will, &wallets);

        info!(
            will_id = %will.will_id,
            owner = %will.owner,
            strategy = strategy.name(),
            sources = sources.len(),
            beneficiaries = beneficiaries.len(),
            "Executing will"
        );

        let attestation_tx = self
            .attest(&will, beneficiaries.len(), strategy.as_ref())
            .await;

        let fanout = FanoutExecutor::new(
            self.ledger.clone(),
            self.repos.wills.clone(),
            self.repos.transactions.clone(),
            self.clock.clone(),
        );
        let results = fanout
            .execute(&mut will, &beneficiaries, &sources, strategy.as_ref())
            .await;

        let finalized = match self
            .repos
            .wills
            .update_status(&will.will_id, WillStatus::Executed)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(will_id = %will.will_id, error = %e, "Failed to mark will executed");
                false
            }
        };

        let report = ExecutionReport {
            will_id: will.will_id,
            success: results.iter().all(|r| r.is_confirmed()),
            results,
            attestation_tx,
            beneficiaries,
            finalized,
        };

        info!(
            will_id = %report.will_id,
            success = report.success,
            confirmed = report.results.len() - report.failed_count(),
            failed = report.failed_count(),
            total = report.total_confirmed(),
            "Will executed"
        );
        Ok(report)
    }

    async fn load_pending(&self, will_id: &str, claimed_owner: &Address) -> Result<Will> {
        let will = self
            .repos
            .wills
            .get_will(will_id)
            .await?
            .ok_or_else(|| ExecutionError::NotFound(will_id.to_string()))?;

        if will.owner != *claimed_owner {
            warn!(will_id, claimed = %claimed_owner, "Execution requested by non-owner");
            return Err(ExecutionError::OwnerMismatch {
                will_id: will_id.to_string(),
                claimed: *claimed_owner,
            });
        }
        if will.status != WillStatus::Pending {
            return Err(ExecutionError::NotPending {
                will_id: will_id.to_string(),
                status: will.status,
            });
        }
        Ok(will)
    }

    async fn approved_wallets(&self, will: &Will) -> Result<Vec<LinkedWallet>> {
        let wallets = self
            .repos
            .wallets
            .get_linked_wallets(&will.will_id, true)
            .await?;
        if !wallets.is_empty() {
            return Ok(wallets);
        }

        warn!(will_id = %will.will_id, "No approved wallets, falling back to owner");
        let mut owner = LinkedWallet::approved(will.will_id.clone(), will.owner, will.signature.clone());
        owner.approved_at = will.created_at;
        Ok(vec![owner])
    }

    /// Best effort; a failure only costs the attestation.
    async fn attest(
        &self,
        will: &Will,
        beneficiary_count: usize,
        strategy: &dyn ExecutionStrategy,
    ) -> Option<String> {
        if !self.config.attestation_enabled {
            return None;
        }
        let sink = self.attestation.as_ref()?;

        let message = format!(
            "Inheritance trigger for will {} of {}",
            will.will_id, will.owner
        );
        let count = u32::try_from(beneficiary_count).unwrap_or(u32::MAX);
        let attestation = match sink.record(&will.will_id, &will.owner, count, &message).await {
            Ok(attestation) => attestation,
            Err(e) => {
                warn!(will_id = %will.will_id, error = %e, "Attestation failed, continuing");
                return None;
            }
        };

        let record = TransactionRecord {
            tx_hash: attestation.tx_hash.clone(),
            will_id: will.will_id.clone(),
            from_address: will.owner,
            to_address: attestation.registry,
            amount: 0,
            token_symbol: strategy.token_symbol().to_string(),
            tx_type: TxType::DeathDeclaration,
            status: TxStatus::Confirmed,
            created_at: self.clock.now(),
        };
        if let Err(e) = self.repos.transactions.save_transaction(&record).await {
            warn!(will_id = %will.will_id, error = %e, "Failed to record attestation");
        }

        Some(attestation.tx_hash)
    }
}

/// A substituted list must be usable as-is: no negative or non-finite
/// shares, and a total of 100.
fn validate_override(beneficiaries: &[Beneficiary]) -> Result<()> {
    if beneficiaries.is_empty() {
        return Err(ExecutionError::InvalidOverride(
            "beneficiary list is empty".to_string(),
        ));
    }
    if let Some(bad) = beneficiaries
        .iter()
        .find(|b| !b.percentage.is_finite() || b.percentage < 0.0)
    {
        return Err(ExecutionError::InvalidOverride(format!(
            "invalid percentage {} for {}",
            bad.percentage, bad.name
        )));
    }
    let total = covenant::total_percentage(beneficiaries);
    if (total - 100.0).abs() > PERCENTAGE_TOLERANCE {
        return Err(ExecutionError::InvalidOverride(format!(
            "percentages sum to {}",
            total
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::LedgerAttestationSink;
    use crate::ledger::{Asset, InMemoryLedger};
    use chrono::{TimeZone, Utc};
    use covenant::{
        ExecutionMode, FixedClock, InMemoryStore, LinkedWalletRepository, SpendingLimits,
        TransactionRepository, WillRepository,
    };

    const OWNER: Address = Address::from_bytes([1; 20]);
    const REGISTRY: Address = Address::from_bytes([0xc0; 20]);

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()))
    }

    fn will() -> Will {
        let now = clock().now();
        Will {
            will_id: "will-1".to_string(),
            owner: OWNER,
            beneficiaries: vec![
                Beneficiary::new(Address::from_bytes([0xa1; 20]), 60.0, "Alice"),
                Beneficiary::new(Address::from_bytes([0xb2; 20]), 40.0, "Bob"),
            ],
            total_amount: 1_000,
            valid_until: 1_900_000_000,
            signature: "0xsig".to_string(),
            status: WillStatus::Pending,
            mode: ExecutionMode::Native,
            spending_limits: SpendingLimits::new(1_000, 1_000, now.date_naive()),
            created_at: now,
            updated_at: now,
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        ledger: Arc<InMemoryLedger>,
        controller: WillController,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let will = will();
        store.save_will(&will).await.unwrap();
        store
            .save_linked_wallet(&LinkedWallet::approved("will-1", OWNER, "0xsig"))
            .await
            .unwrap();

        let ledger = Arc::new(InMemoryLedger::new(Address::from_bytes([0xee; 20])));
        ledger.set_balance(Asset::Native, OWNER, 1_000);

        let config = ExecutorConfig {
            native_fee_reserve: 0,
            ..Default::default()
        };
        let controller = WillController::new(Repositories::from_store(store.clone()), ledger.clone(), config)
            .with_attestation(Arc::new(LedgerAttestationSink::new(ledger.clone(), REGISTRY)))
            .with_clock(clock());

        Fixture {
            store,
            ledger,
            controller,
        }
    }

    #[tokio::test]
    async fn test_execute_records_attestation_and_transfers() {
        let f = fixture().await;
        let report = f
            .controller
            .execute(ExecutionRequest::new("will-1", OWNER))
            .await
            .unwrap();

        assert!(report.success);
        assert!(report.finalized);
        assert!(report.attestation_tx.is_some());
        assert_eq!(report.total_confirmed(), 1_000);

        let records = f.store.get_transactions("will-1").await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].tx_type, TxType::DeathDeclaration);
        assert_eq!(records[0].to_address, REGISTRY);
        assert_eq!(
            f.store.get_will("will-1").await.unwrap().unwrap().status,
            WillStatus::Executed
        );
    }

    #[tokio::test]
    async fn test_validation_has_no_side_effects() {
        let f = fixture().await;

        assert!(matches!(
            f.controller
                .execute(ExecutionRequest::new("missing", OWNER))
                .await,
            Err(ExecutionError::NotFound(_))
        ));
        assert!(matches!(
            f.controller
                .execute(ExecutionRequest::new("will-1", Address::from_bytes([9; 20])))
                .await,
            Err(ExecutionError::OwnerMismatch { .. })
        ));
        assert!(matches!(
            f.controller
                .execute(
                    ExecutionRequest::new("will-1", OWNER).with_beneficiaries(vec![
                        Beneficiary::new(Address::from_bytes([0xa1; 20]), 90.0, "Alice")
                    ])
                )
                .await,
            Err(ExecutionError::InvalidOverride(_))
        ));

        assert_eq!(f.ledger.submitted_count(), 0);
        assert!(f.store.get_transactions("will-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_attestation() {
        let f = fixture().await;
        let controller = WillController::new(
            Repositories::from_store(f.store.clone()),
            f.ledger.clone(),
            ExecutorConfig {
                native_fee_reserve: 0,
                attestation_enabled: false,
                ..Default::default()
            },
        )
        .with_attestation(Arc::new(LedgerAttestationSink::new(f.ledger.clone(), REGISTRY)));

        let report = controller
            .execute(ExecutionRequest::new("will-1", OWNER))
            .await
            .unwrap();
        assert!(report.attestation_tx.is_none());
        assert_eq!(f.ledger.submitted_count(), 2);
    }

    #[test]
    fn test_override_validation() {
        let a = Address::from_bytes([0xa1; 20]);
        assert!(validate_override(&[]).is_err());
        assert!(validate_override(&[Beneficiary::new(a, f64::NAN, "A")]).is_err());
        assert!(validate_override(&[
            Beneficiary::new(a, 100.0, "A"),
            Beneficiary::new(a, 0.0, "B")
        ])
        .is_ok());
        assert!(validate_override(&[
            Beneficiary::new(a, 33.4, "A"),
            Beneficiary::new(a, 33.3, "B"),
            Beneficiary::new(a, 33.3, "C")
        ])
        .is_ok());
    }
}
