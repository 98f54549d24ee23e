//! In-memory store backed by concurrent maps.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{LinkedWalletRepository, StoreError, TransactionRepository, WillRepository};
use crate::types::{
    Address, LinkedWallet, LinkedWalletStatus, SpendingLimits, TransactionRecord, Will, WillStatus,
};

/// Volatile store for tests and single-process deployments.
pub struct InMemoryStore {
    wills: DashMap<String, Will>,
    /// Linked wallets per will, each tagged with its insertion sequence
    wallets: DashMap<String, Vec<(u64, LinkedWallet)>>,
    /// Transactions by hash, tagged with insertion sequence
    transactions: DashMap<String, (u64, TransactionRecord)>,
    sequence: AtomicU64,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            wills: DashMap::new(),
            wallets: DashMap::new(),
            transactions: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// Number of transaction records held.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WillRepository for InMemoryStore {
    async fn get_will(&self, will_id: &str) -> Result<Option<Will>, StoreError> {
        Ok(self.wills.get(will_id).map(|w| w.value().clone()))
    }

    async fn get_will_by_owner(&self, owner: &Address) -> Result<Option<Will>, StoreError> {
        Ok(self
            .wills
            .iter()
            .filter(|w| w.owner == *owner)
            .max_by_key(|w| w.created_at)
            .map(|w| w.value().clone()))
    }

    async fn save_will(&self, will: &Will) -> Result<(), StoreError> {
        self.wills.insert(will.will_id.clone(), will.clone());
        Ok(())
    }

    async fn update_status(&self, will_id: &str, status: WillStatus) -> Result<(), StoreError> {
        let mut will = self
            .wills
            .get_mut(will_id)
            .ok_or_else(|| StoreError::NotFound(will_id.to_string()))?;
        will.status = status;
        will.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn update_spending_limits(
        &self,
        will_id: &str,
        limits: &SpendingLimits,
    ) -> Result<(), StoreError> {
        let mut will = self
            .wills
            .get_mut(will_id)
            .ok_or_else(|| StoreError::NotFound(will_id.to_string()))?;
        will.spending_limits = limits.clone();
        Ok(())
    }
}

#[async_trait]
impl LinkedWalletRepository for InMemoryStore {
    async fn get_linked_wallets(
        &self,
        will_id: &str,
        approved_only: bool,
    ) -> Result<Vec<LinkedWallet>, StoreError> {
        let Some(rows) = self.wallets.get(will_id) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<(u64, LinkedWallet)> = rows
            .iter()
            .filter(|(_, w)| !approved_only || w.status == LinkedWalletStatus::Approved)
            .cloned()
            .collect();
        rows.sort_by(|(sa, a), (sb, b)| a.approved_at.cmp(&b.approved_at).then(sa.cmp(sb)));

        Ok(rows.into_iter().map(|(_, w)| w).collect())
    }

    async fn save_linked_wallet(&self, wallet: &LinkedWallet) -> Result<(), StoreError> {
        let sequence = self.next_sequence();
        let mut rows = self.wallets.entry(wallet.will_id.clone()).or_default();

        if let Some((_, existing)) = rows.iter_mut().find(|(_, w)| w.address == wallet.address) {
            *existing = wallet.clone();
        } else {
            rows.push((sequence, wallet.clone()));
        }
        Ok(())
    }

    async fn set_linked_wallet_status(
        &self,
        will_id: &str,
        address: &Address,
        status: LinkedWalletStatus,
    ) -> Result<(), StoreError> {
        let mut rows = self
            .wallets
            .get_mut(will_id)
            .ok_or_else(|| StoreError::NotFound(will_id.to_string()))?;
        let (_, wallet) = rows
            .iter_mut()
            .find(|(_, w)| w.address == *address)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", will_id, address)))?;
        wallet.status = status;
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for InMemoryStore {
    async fn save_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        let sequence = self.next_sequence();
        self.transactions
            .entry(record.tx_hash.clone())
            .and_modify(|(_, existing)| *existing = record.clone())
            .or_insert_with(|| (sequence, record.clone()));
        Ok(())
    }

    async fn get_transactions(&self, will_id: &str) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut rows: Vec<(u64, TransactionRecord)> = self
            .transactions
            .iter()
            .filter(|entry| entry.value().1.will_id == will_id)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, r)| r).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;

    #[tokio::test]
    async fn test_will_round_trip_and_status() {
        let store = InMemoryStore::new();
        let will = fixtures::will("will-1", Address::from_bytes([1; 20]));
        store.save_will(&will).await.unwrap();

        let loaded = store.get_will("will-1").await.unwrap().unwrap();
        assert_eq!(loaded, will);

        store.update_status("will-1", WillStatus::Executed).await.unwrap();
        let loaded = store.get_will("will-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, WillStatus::Executed);

        assert!(store.get_will("missing").await.unwrap().is_none());
        assert!(matches!(
            store.update_status("missing", WillStatus::Executed).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_latest_will_by_owner() {
        let store = InMemoryStore::new();
        let owner = Address::from_bytes([1; 20]);

        let mut older = fixtures::will("older", owner);
        older.created_at = older.created_at - chrono::Duration::days(1);
        let newer = fixtures::will("newer", owner);
        store.save_will(&older).await.unwrap();
        store.save_will(&newer).await.unwrap();

        let found = store.get_will_by_owner(&owner).await.unwrap().unwrap();
        assert_eq!(found.will_id, "newer");
        assert!(store
            .get_will_by_owner(&Address::from_bytes([2; 20]))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_linked_wallets_order_and_soft_delete() {
        let store = InMemoryStore::new();
        let base = chrono::Utc::now();

        for (i, byte) in [3u8, 1, 2].iter().enumerate() {
            let mut wallet = LinkedWallet::approved("w", Address::from_bytes([*byte; 20]), "sig");
            wallet.approved_at = base + chrono::Duration::seconds(i as i64);
            store.save_linked_wallet(&wallet).await.unwrap();
        }

        let order: Vec<u8> = store
            .get_linked_wallets("w", true)
            .await
            .unwrap()
            .iter()
            .map(|w| w.address.as_bytes()[0])
            .collect();
        assert_eq!(order, vec![3, 1, 2]);

        store
            .set_linked_wallet_status("w", &Address::from_bytes([1; 20]), LinkedWalletStatus::Removed)
            .await
            .unwrap();
        assert_eq!(store.get_linked_wallets("w", true).await.unwrap().len(), 2);
        // Removed rows stay auditable
        assert_eq!(store.get_linked_wallets("w", false).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_transactions_upsert_by_hash() {
        let store = InMemoryStore::new();
        let record = fixtures::transaction("0xaaa", "w", 10);
        store.save_transaction(&record).await.unwrap();
        store.save_transaction(&record).await.unwrap();
        store
            .save_transaction(&fixtures::transaction("0xbbb", "w", 20))
            .await
            .unwrap();

        let rows = store.get_transactions("w").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tx_hash, "0xaaa");
        assert_eq!(store.transaction_count(), 2);
    }
}
