//! In-memory ledger for tests and dry runs.

use async_trait::async_trait;
use covenant::Address;
use dashmap::{DashMap, DashSet};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

use super::{Asset, CallPayload, LedgerCall, LedgerClient, LedgerError, TxHandle, TxReceipt};

/// A balance movement applied by a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub tx_hash: String,
    pub asset: Asset,
    pub from: Address,
    pub to: Address,
    pub amount: u128,
}

/// Ledger simulated in process memory.
///
/// Transactions settle when waited on. Failures can be injected per
/// recipient, per call target, or per balance owner.
pub struct InMemoryLedger {
    /// Account that submits and spends pull allowances
    operator: Address,
    balances: DashMap<(Asset, Address), u128>,
    /// (token, owner, spender) -> remaining allowance
    allowances: DashMap<(Address, Address, Address), u128>,
    pending: DashMap<String, LedgerCall>,
    receipts: DashMap<String, TxReceipt>,
    nonce: AtomicU64,
    rejected_recipients: DashSet<Address>,
    reverted_recipients: DashSet<Address>,
    rejected_targets: DashSet<Address>,
    /// (source, recipient) pairs whose transfers are refused
    rejected_pairs: DashSet<(Address, Address)>,
    unreadable: DashSet<Address>,
    settlements: Mutex<Vec<Settlement>>,
}

impl InMemoryLedger {
    pub fn new(operator: Address) -> Self {
        Self {
            operator,
            balances: DashMap::new(),
            allowances: DashMap::new(),
            pending: DashMap::new(),
            receipts: DashMap::new(),
            nonce: AtomicU64::new(0),
            rejected_recipients: DashSet::new(),
            reverted_recipients: DashSet::new(),
            rejected_targets: DashSet::new(),
            rejected_pairs: DashSet::new(),
            unreadable: DashSet::new(),
            settlements: Mutex::new(Vec::new()),
        }
    }

    /// Set a balance.
    pub fn set_balance(&self, asset: Asset, owner: Address, amount: u128) {
        self.balances.insert((asset, owner), amount);
    }

    /// Current balance, zero if never set.
    pub fn balance(&self, asset: Asset, owner: &Address) -> u128 {
        self.balances
            .get(&(asset, *owner))
            .map(|b| *b.value())
            .unwrap_or(0)
    }

    /// Let `spender` pull up to `amount` of `token` from `owner`.
    pub fn approve(&self, token: Address, owner: Address, spender: Address, amount: u128) {
        self.allowances.insert((token, owner, spender), amount);
    }

    /// Refuse submissions paying `recipient`.
    pub fn reject_transfers_to(&self, recipient: Address) {
        self.rejected_recipients.insert(recipient);
    }

    /// Accept but revert transactions paying `recipient`.
    pub fn revert_transfers_to(&self, recipient: Address) {
        self.reverted_recipients.insert(recipient);
    }

    /// Refuse every submission addressed to `target`.
    pub fn reject_calls_to(&self, target: Address) {
        self.rejected_targets.insert(target);
    }

    /// Refuse submissions moving funds from `source` to `recipient`.
    pub fn reject_transfer(&self, source: Address, recipient: Address) {
        self.rejected_pairs.insert((source, recipient));
    }

    /// Fail balance and allowance queries for `owner`.
    pub fn fail_queries_for(&self, owner: Address) {
        self.unreadable.insert(owner);
    }

    /// Balance movements applied so far, in settlement order.
    pub fn settlements(&self) -> Vec<Settlement> {
        self.settlements
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Number of transactions accepted for submission.
    pub fn submitted_count(&self) -> u64 {
        self.nonce.load(Ordering::SeqCst)
    }

    fn recipient(call: &LedgerCall) -> Option<Address> {
        match &call.payload {
            CallPayload::NativeTransfer { .. } => Some(call.target),
            CallPayload::TokenTransferFrom { to, .. } | CallPayload::VaultWithdraw { to, .. } => {
                Some(*to)
            }
            CallPayload::DeathCertificate { .. } => None,
        }
    }

    fn source(call: &LedgerCall) -> Option<Address> {
        match &call.payload {
            CallPayload::NativeTransfer { from } | CallPayload::TokenTransferFrom { from, .. } => {
                Some(*from)
            }
            CallPayload::VaultWithdraw { .. } => Some(call.target),
            CallPayload::DeathCertificate { .. } => None,
        }
    }

    fn debit(&self, asset: Asset, owner: Address, amount: u128) -> bool {
        match self.balances.get_mut(&(asset, owner)) {
            Some(mut balance) if *balance >= amount => {
                *balance -= amount;
                true
            }
            _ => amount == 0,
        }
    }

    fn credit(&self, asset: Asset, owner: Address, amount: u128) {
        let mut balance = self.balances.entry((asset, owner)).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    fn transfer(&self, hash: &str, asset: Asset, from: Address, to: Address, amount: u128) -> bool {
        if !self.debit(asset, from, amount) {
            return false;
        }
        self.credit(asset, to, amount);
        if let Ok(mut settlements) = self.settlements.lock() {
            settlements.push(Settlement {
                tx_hash: hash.to_string(),
                asset,
                from,
                to,
                amount,
            });
        }
        true
    }

    /// Apply a call's effects; false means the transaction reverts.
    fn apply(&self, hash: &str, call: &LedgerCall) -> bool {
        if Self::recipient(call).is_some_and(|r| self.reverted_recipients.contains(&r)) {
            return false;
        }

        match &call.payload {
            CallPayload::NativeTransfer { from } => {
                self.transfer(hash, Asset::Native, *from, call.target, call.value)
            }
            CallPayload::TokenTransferFrom { from, to, amount } => {
                let key = (call.target, *from, self.operator);
                let allowed = self.allowances.get(&key).map(|a| *a.value()).unwrap_or(0);
                if allowed < *amount {
                    return false;
                }
                if !self.transfer(hash, Asset::Token(call.target), *from, *to, *amount) {
                    return false;
                }
                self.allowances.insert(key, allowed - amount);
                true
            }
            CallPayload::VaultWithdraw { token, to, amount } => {
                let asset = token.map(Asset::Token).unwrap_or(Asset::Native);
                self.transfer(hash, asset, call.target, *to, *amount)
            }
            CallPayload::DeathCertificate { .. } => true,
        }
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn submit(&self, call: LedgerCall) -> Result<TxHandle, LedgerError> {
        if self.rejected_targets.contains(&call.target) {
            return Err(LedgerError::Submission(format!(
                "calls to {} are rejected",
                call.target
            )));
        }
        if let Some(recipient) = Self::recipient(&call) {
            if self.rejected_recipients.contains(&recipient) {
                return Err(LedgerError::Submission(format!(
                    "transfer to {} rejected",
                    recipient
                )));
            }
            if let Some(source) = Self::source(&call) {
                if self.rejected_pairs.contains(&(source, recipient)) {
                    return Err(LedgerError::Submission(format!(
                        "transfer from {} to {} rejected",
                        source, recipient
                    )));
                }
            }
        }

        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(nonce.to_be_bytes());
        hasher.update(format!("{:?}", call).as_bytes());
        let hash = format!("0x{}", hex::encode(hasher.finalize()));

        debug!(tx_hash = %hash, target = %call.target, "Transaction submitted");
        self.pending.insert(hash.clone(), call);
        Ok(TxHandle { hash })
    }

    async fn wait(&self, handle: &TxHandle) -> Result<TxReceipt, LedgerError> {
        if let Some(receipt) = self.receipts.get(&handle.hash) {
            return Ok(receipt.value().clone());
        }

        let (hash, call) = self
            .pending
            .remove(&handle.hash)
            .ok_or_else(|| LedgerError::Confirmation(format!("unknown transaction {}", handle.hash)))?;

        let receipt = TxReceipt {
            success: self.apply(&hash, &call),
            hash: hash.clone(),
        };
        self.receipts.insert(hash, receipt.clone());
        Ok(receipt)
    }

    async fn balance_of(&self, asset: Asset, owner: &Address) -> Result<u128, LedgerError> {
        if self.unreadable.contains(owner) {
            return Err(LedgerError::Query(format!("balance of {} unavailable", owner)));
        }
        Ok(self.balance(asset, owner))
    }

    async fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<u128, LedgerError> {
        if self.unreadable.contains(owner) {
            return Err(LedgerError::Query(format!("allowance of {} unavailable", owner)));
        }
        Ok(self
            .allowances
            .get(&(*token, *owner, *spender))
            .map(|a| *a.value())
            .unwrap_or(0))
    }
}
