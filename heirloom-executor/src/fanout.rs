//! Multi-wallet fan-out.
//!
//! Sends every beneficiary its share of every source wallet, one transfer at
//! a time. A failed transfer is recorded in the results and the loop moves
//! on; nothing here aborts the distribution.

use covenant::{
    Address, Beneficiary, Clock, SpendingLimiter, TransactionRecord, TransactionRepository,
    TxStatus, TxType, Will, WillRepository,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::allocation::{decide, TransferDecision};
use crate::ledger::LedgerClient;
use crate::strategy::ExecutionStrategy;
use crate::types::{ExecutionResult, FailureReason, TransferOutcome};

/// Distributes source balances across beneficiaries.
pub struct FanoutExecutor {
    ledger: Arc<dyn LedgerClient>,
    wills: Arc<dyn WillRepository>,
    transactions: Arc<dyn TransactionRepository>,
    clock: Arc<dyn Clock>,
}

impl FanoutExecutor {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        wills: Arc<dyn WillRepository>,
        transactions: Arc<dyn TransactionRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            wills,
            transactions,
            clock,
        }
    }

    /// Run the fan-out over `sources` in order.
    ///
    /// `will.spending_limits` is updated as transfers confirm and persisted
    /// after each one. Each limit check uses the clock's date at that
    /// moment, so a fan-out running past UTC midnight starts a new day.
    /// The caller must hold the will's lock.
    pub async fn execute(
        &self,
        will: &mut Will,
        beneficiaries: &[Beneficiary],
        sources: &[Address],
        strategy: &dyn ExecutionStrategy,
    ) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(sources.len() * beneficiaries.len());

        for source in sources {
            let distributable = match strategy.distributable(self.ledger.as_ref(), source).await {
                Ok(amount) => amount,
                Err(e) => {
                    warn!(
                        will_id = %will.will_id,
                        wallet = %source,
                        error = %e,
                        "Could not read wallet, skipping its beneficiaries"
                    );
                    results.extend(beneficiaries.iter().map(|b| ExecutionResult {
                        wallet: *source,
                        beneficiary: b.address,
                        beneficiary_name: b.name.clone(),
                        amount: 0,
                        outcome: TransferOutcome::Failed {
                            reason: FailureReason::WalletUnavailable {
                                detail: e.to_string(),
                            },
                        },
                    }));
                    continue;
                }
            };

            if distributable == 0 {
                debug!(will_id = %will.will_id, wallet = %source, "Nothing to distribute");
                continue;
            }

            debug!(
                will_id = %will.will_id,
                wallet = %source,
                distributable,
                strategy = strategy.name(),
                "Distributing wallet"
            );

            for beneficiary in beneficiaries {
                let today = self.clock.today();
                let decision = decide(
                    &mut will.spending_limits,
                    distributable,
                    beneficiary.percentage,
                    today,
                );
                let amount = match decision {
                    TransferDecision::Skip => continue,
                    TransferDecision::Reject { amount, rejection } => {
                        warn!(
                            will_id = %will.will_id,
                            beneficiary = %beneficiary.address,
                            remaining = SpendingLimiter::remaining_today(&will.spending_limits, today),
                            error = %rejection,
                            "Transfer refused by spending limits"
                        );
                        results.push(Self::failed(
                            source,
                            beneficiary,
                            amount,
                            FailureReason::LimitExceeded { rejection },
                        ));
                        continue;
                    }
                    TransferDecision::Submit(amount) => amount,
                };

                let outcome = self.transfer(source, beneficiary, amount, strategy).await;
                if let TransferOutcome::Confirmed { tx_hash } = &outcome {
                    self.record(will, source, beneficiary, amount, tx_hash, strategy)
                        .await;
                }
                results.push(ExecutionResult {
                    wallet: *source,
                    beneficiary: beneficiary.address,
                    beneficiary_name: beneficiary.name.clone(),
                    amount,
                    outcome,
                });
            }
        }

        results
    }

    async fn transfer(
        &self,
        source: &Address,
        beneficiary: &Beneficiary,
        amount: u128,
        strategy: &dyn ExecutionStrategy,
    ) -> TransferOutcome {
        let call = strategy.transfer_call(source, &beneficiary.address, amount);

        let receipt = match self.ledger.submit(call).await {
            Ok(handle) => self.ledger.wait(&handle).await,
            Err(e) => Err(e),
        };

        match receipt {
            Ok(receipt) if receipt.success => TransferOutcome::Confirmed {
                tx_hash: receipt.hash,
            },
            Ok(receipt) => {
                warn!(tx_hash = %receipt.hash, beneficiary = %beneficiary.address, "Transfer reverted");
                TransferOutcome::Failed {
                    reason: FailureReason::Reverted {
                        tx_hash: receipt.hash,
                    },
                }
            }
            Err(e) => {
                warn!(beneficiary = %beneficiary.address, error = %e, "Transfer failed");
                TransferOutcome::Failed {
                    reason: FailureReason::Submission {
                        detail: e.to_string(),
                    },
                }
            }
        }
    }

    /// Book a confirmed transfer against the limits and the audit log.
    async fn record(
        &self,
        will: &mut Will,
        source: &Address,
        beneficiary: &Beneficiary,
        amount: u128,
        tx_hash: &str,
        strategy: &dyn ExecutionStrategy,
    ) {
        SpendingLimiter::commit(&mut will.spending_limits, amount);
        if let Err(e) = self
            .wills
            .update_spending_limits(&will.will_id, &will.spending_limits)
            .await
        {
            warn!(will_id = %will.will_id, error = %e, "Failed to persist spending limits");
        }

        let record = TransactionRecord {
            tx_hash: tx_hash.to_string(),
            will_id: will.will_id.clone(),
            from_address: *source,
            to_address: beneficiary.address,
            amount,
            token_symbol: strategy.token_symbol().to_string(),
            tx_type: TxType::Distribution,
            status: TxStatus::Confirmed,
            created_at: self.clock.now(),
        };
        if let Err(e) = self.transactions.save_transaction(&record).await {
            warn!(will_id = %will.will_id, tx_hash, error = %e, "Failed to record transfer");
        }

        info!(
            will_id = %will.will_id,
            beneficiary = %beneficiary.name,
            amount,
            tx_hash,
            "Transfer confirmed"
        );
    }

    fn failed(
        source: &Address,
        beneficiary: &Beneficiary,
        amount: u128,
        reason: FailureReason,
    ) -> ExecutionResult {
        ExecutionResult {
            wallet: *source,
            beneficiary: beneficiary.address,
            beneficiary_name: beneficiary.name.clone(),
            amount,
            outcome: TransferOutcome::Failed { reason },
        }
    }
}
