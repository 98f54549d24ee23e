//! Will registry: authorization intake and wallet linking.
//!
//! Every will that reaches the store went through [`WillRegistry::authorize`],
//! so the store only ever holds signature-verified plans.

use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::signature::SignatureVerifier;
use crate::store::{Repositories, StoreError};
use crate::types::{
    total_percentage, Address, Beneficiary, ExecutionMode, LinkedWallet, LinkedWalletStatus,
    SpendingLimits, Will, WillStatus,
};

/// Allowed drift of a plan's percentage sum from 100.
pub const PERCENTAGE_TOLERANCE: f64 = 1e-6;

/// Error types for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid allocation: {0}")]
    InvalidAllocation(String),

    #[error("Authorization expired at {valid_until} (now {now})")]
    AuthorizationExpired { valid_until: u64, now: u64 },

    #[error("Spending limits must be non-zero")]
    InvalidLimits,

    #[error("Signature does not recover to the claimed signer")]
    InvalidSignature,

    #[error("Will not found: {0}")]
    NotFound(String),

    #[error("Will {will_id} is {status}, not pending")]
    NotPending { will_id: String, status: WillStatus },

    #[error("The owner's wallet cannot be unlinked")]
    OwnerWalletRequired,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A signed plan submitted by its owner.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub owner: Address,
    pub beneficiaries: Vec<Beneficiary>,
    pub total_amount: u128,
    /// Unix seconds
    pub valid_until: u64,
    pub signature: String,
    pub mode: ExecutionMode,
    pub per_tx_limit: u128,
    pub daily_limit: u128,
}

/// Intake for authorizations and linked-wallet approvals.
pub struct WillRegistry {
    repos: Repositories,
    verifier: SignatureVerifier,
    clock: Arc<dyn Clock>,
}

impl WillRegistry {
    pub fn new(repos: Repositories, verifier: SignatureVerifier) -> Self {
        Self {
            repos,
            verifier,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate, verify and store an authorization.
    ///
    /// A pending will of the same owner is updated in place; otherwise a new
    /// will is created with the owner as its first linked wallet.
    pub async fn authorize(&self, request: AuthorizationRequest) -> Result<Will, RegistryError> {
        validate_allocation(&request.beneficiaries)?;

        let now = self.clock.now();
        let now_secs = now.timestamp().max(0) as u64;
        if request.valid_until < now_secs {
            return Err(RegistryError::AuthorizationExpired {
                valid_until: request.valid_until,
                now: now_secs,
            });
        }
        if request.per_tx_limit == 0 || request.daily_limit == 0 {
            return Err(RegistryError::InvalidLimits);
        }

        if !self.verifier.verify_authorization(
            &request.owner,
            &request.beneficiaries,
            request.total_amount,
            request.valid_until,
            &request.signature,
        ) {
            warn!(owner = %request.owner, "Rejected authorization with invalid signature");
            return Err(RegistryError::InvalidSignature);
        }

        let existing = self
            .repos
            .wills
            .get_will_by_owner(&request.owner)
            .await?
            .filter(|w| w.status == WillStatus::Pending);

        if let Some(mut will) = existing {
            will.beneficiaries = request.beneficiaries;
            will.total_amount = request.total_amount;
            will.valid_until = request.valid_until;
            will.signature = request.signature;
            will.mode = request.mode;
            will.spending_limits.per_tx_limit = request.per_tx_limit;
            will.spending_limits.daily_limit = request.daily_limit;
            will.updated_at = now;
            self.repos.wills.save_will(&will).await?;

            info!(will_id = %will.will_id, owner = %will.owner, "Will re-authorized");
            return Ok(will);
        }

        let will = Will {
            will_id: uuid::Uuid::new_v4().to_string(),
            owner: request.owner,
            beneficiaries: request.beneficiaries,
            total_amount: request.total_amount,
            valid_until: request.valid_until,
            signature: request.signature,
            status: WillStatus::Pending,
            mode: request.mode,
            spending_limits: SpendingLimits::new(
                request.per_tx_limit,
                request.daily_limit,
                self.clock.today(),
            ),
            created_at: now,
            updated_at: now,
        };
        self.repos.wills.save_will(&will).await?;

        let mut owner_wallet =
            LinkedWallet::approved(will.will_id.clone(), will.owner, will.signature.clone());
        owner_wallet.approved_at = now;
        self.repos.wallets.save_linked_wallet(&owner_wallet).await?;

        info!(
            will_id = %will.will_id,
            owner = %will.owner,
            beneficiaries = will.beneficiaries.len(),
            "Will authorized"
        );
        Ok(will)
    }

    /// Approve `wallet` as a funding source for a pending will.
    pub async fn link_wallet(
        &self,
        will_id: &str,
        wallet: Address,
        signature: &str,
    ) -> Result<LinkedWallet, RegistryError> {
        self.pending_will(will_id).await?;

        if !self.verifier.verify_wallet_link(will_id, &wallet, signature) {
            warn!(will_id, wallet = %wallet, "Rejected wallet link with invalid signature");
            return Err(RegistryError::InvalidSignature);
        }

        let mut linked = LinkedWallet::approved(will_id, wallet, signature);
        linked.approved_at = self.clock.now();
        self.repos.wallets.save_linked_wallet(&linked).await?;

        info!(will_id, wallet = %wallet, "Wallet linked");
        Ok(linked)
    }

    /// Soft-delete a linked wallet.
    pub async fn unlink_wallet(&self, will_id: &str, wallet: Address) -> Result<(), RegistryError> {
        let will = self
            .repos
            .wills
            .get_will(will_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(will_id.to_string()))?;
        if will.owner == wallet {
            return Err(RegistryError::OwnerWalletRequired);
        }

        self.repos
            .wallets
            .set_linked_wallet_status(will_id, &wallet, LinkedWalletStatus::Removed)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(what) => RegistryError::NotFound(what),
                other => RegistryError::Store(other),
            })?;

        info!(will_id, wallet = %wallet, "Wallet unlinked");
        Ok(())
    }

    async fn pending_will(&self, will_id: &str) -> Result<Will, RegistryError> {
        let will = self
            .repos
            .wills
            .get_will(will_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(will_id.to_string()))?;
        if will.status != WillStatus::Pending {
            return Err(RegistryError::NotPending {
                will_id: will.will_id,
                status: will.status,
            });
        }
        Ok(will)
    }
}

/// Check that a plan is non-empty, positive and sums to 100.
pub fn validate_allocation(beneficiaries: &[Beneficiary]) -> Result<(), RegistryError> {
    if beneficiaries.is_empty() {
        return Err(RegistryError::InvalidAllocation(
            "no beneficiaries".to_string(),
        ));
    }
    if let Some(bad) = beneficiaries
        .iter()
        .find(|b| !b.percentage.is_finite() || b.percentage <= 0.0)
    {
        return Err(RegistryError::InvalidAllocation(format!(
            "{} has percentage {}",
            bad.address, bad.percentage
        )));
    }

    let total = total_percentage(beneficiaries);
    if (total - 100.0).abs() > PERCENTAGE_TOLERANCE {
        return Err(RegistryError::InvalidAllocation(format!(
            "percentages sum to {}",
            total
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::test_keys::{address, key, sign};
    use crate::signature::{WalletLink, WillAuthorization};
    use crate::store::{InMemoryStore, LinkedWalletRepository, WillRepository};
    use k256::ecdsa::SigningKey;

    const VALID_UNTIL: u64 = 4_000_000_000;

    fn setup() -> (WillRegistry, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let registry = WillRegistry::new(
            Repositories::from_store(store.clone()),
            SignatureVerifier::default(),
        );
        (registry, store)
    }

    fn plan() -> Vec<Beneficiary> {
        vec![
            Beneficiary::new(Address::from_bytes([0xa1; 20]), 60.0, "Alice"),
            Beneficiary::new(Address::from_bytes([0xb2; 20]), 40.0, "Bob"),
        ]
    }

    fn signed_request(signer: &SigningKey, beneficiaries: Vec<Beneficiary>, total: u128) -> AuthorizationRequest {
        let owner = address(signer);
        let digest = SignatureVerifier::default().digest(&WillAuthorization {
            owner: &owner,
            beneficiaries: &beneficiaries,
            total_amount: total,
            valid_until: VALID_UNTIL,
        });
        AuthorizationRequest {
            owner,
            beneficiaries,
            total_amount: total,
            valid_until: VALID_UNTIL,
            signature: sign(signer, &digest),
            mode: ExecutionMode::Native,
            per_tx_limit: 1_000,
            daily_limit: 1_000,
        }
    }

    #[tokio::test]
    async fn test_new_will_links_owner() {
        let (registry, store) = setup();
        let signer = key(1);

        let will = registry
            .authorize(signed_request(&signer, plan(), 1_000))
            .await
            .unwrap();
        assert_eq!(will.status, WillStatus::Pending);
        assert_eq!(will.owner, address(&signer));

        let wallets = store.get_linked_wallets(&will.will_id, true).await.unwrap();
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets[0].address, will.owner);
    }

    #[tokio::test]
    async fn test_reauthorization_keeps_will_id() {
        let (registry, store) = setup();
        let signer = key(2);

        let first = registry
            .authorize(signed_request(&signer, plan(), 1_000))
            .await
            .unwrap();

        let mut limits = first.spending_limits.clone();
        limits.daily_spent = 250;
        store
            .update_spending_limits(&first.will_id, &limits)
            .await
            .unwrap();

        let revised = vec![
            Beneficiary::new(Address::from_bytes([0xa1; 20]), 50.0, "Alice"),
            Beneficiary::new(Address::from_bytes([0xb2; 20]), 50.0, "Bob"),
        ];
        let second = registry
            .authorize(signed_request(&signer, revised.clone(), 2_000))
            .await
            .unwrap();

        assert_eq!(second.will_id, first.will_id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.beneficiaries, revised);
        assert_eq!(second.spending_limits.daily_spent, 250);
        assert_eq!(store.get_linked_wallets(&first.will_id, false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_executed_will_gets_replaced() {
        let (registry, store) = setup();
        let signer = key(3);

        let first = registry
            .authorize(signed_request(&signer, plan(), 1_000))
            .await
            .unwrap();
        store
            .update_status(&first.will_id, WillStatus::Executed)
            .await
            .unwrap();

        let second = registry
            .authorize(signed_request(&signer, plan(), 1_000))
            .await
            .unwrap();
        assert_ne!(second.will_id, first.will_id);
    }

    #[tokio::test]
    async fn test_bad_signature_stores_nothing() {
        let (registry, store) = setup();
        let mut request = signed_request(&key(4), plan(), 1_000);
        request.total_amount = 5_000;
        let owner = request.owner;

        assert!(matches!(
            registry.authorize(request).await,
            Err(RegistryError::InvalidSignature)
        ));
        assert!(store.get_will_by_owner(&owner).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_validation_precedes_signature_check() {
        let (registry, _) = setup();

        let mut uneven = plan();
        uneven[0].percentage = 59.0;
        assert!(matches!(
            registry.authorize(signed_request(&key(5), uneven, 1_000)).await,
            Err(RegistryError::InvalidAllocation(_))
        ));

        assert!(matches!(
            registry.authorize(signed_request(&key(5), Vec::new(), 1_000)).await,
            Err(RegistryError::InvalidAllocation(_))
        ));

        let mut expired = signed_request(&key(5), plan(), 1_000);
        expired.valid_until = 1;
        assert!(matches!(
            registry.authorize(expired).await,
            Err(RegistryError::AuthorizationExpired { .. })
        ));

        let mut unlimited = signed_request(&key(5), plan(), 1_000);
        unlimited.daily_limit = 0;
        assert!(matches!(
            registry.authorize(unlimited).await,
            Err(RegistryError::InvalidLimits)
        ));
    }

    #[test]
    fn test_fractional_plan_within_tolerance() {
        let beneficiaries = vec![
            Beneficiary::new(Address::from_bytes([1; 20]), 33.3, "A"),
            Beneficiary::new(Address::from_bytes([2; 20]), 33.3, "B"),
            Beneficiary::new(Address::from_bytes([3; 20]), 33.4, "C"),
        ];
        assert!(validate_allocation(&beneficiaries).is_ok());

        let negative = vec![
            Beneficiary::new(Address::from_bytes([1; 20]), 120.0, "A"),
            Beneficiary::new(Address::from_bytes([2; 20]), -20.0, "B"),
        ];
        assert!(validate_allocation(&negative).is_err());
    }

    #[tokio::test]
    async fn test_link_and_unlink_wallet() {
        let (registry, store) = setup();
        let owner_key = key(6);
        let will = registry
            .authorize(signed_request(&owner_key, plan(), 1_000))
            .await
            .unwrap();

        let wallet_key = key(7);
        let wallet = address(&wallet_key);
        let digest = SignatureVerifier::default().digest(&WalletLink {
            will_id: &will.will_id,
            wallet: &wallet,
        });
        let sig = sign(&wallet_key, &digest);

        registry.link_wallet(&will.will_id, wallet, &sig).await.unwrap();
        let wallets = store.get_linked_wallets(&will.will_id, true).await.unwrap();
        assert_eq!(wallets.len(), 2);
        assert_eq!(wallets[0].address, will.owner);

        // The owner's opt-in signature does not prove the wallet's
        assert!(matches!(
            registry.link_wallet(&will.will_id, wallet, &will.signature).await,
            Err(RegistryError::InvalidSignature)
        ));

        registry.unlink_wallet(&will.will_id, wallet).await.unwrap();
        assert_eq!(store.get_linked_wallets(&will.will_id, true).await.unwrap().len(), 1);

        assert!(matches!(
            registry.unlink_wallet(&will.will_id, will.owner).await,
            Err(RegistryError::OwnerWalletRequired)
        ));

        // Re-approval restores the row
        registry.link_wallet(&will.will_id, wallet, &sig).await.unwrap();
        assert_eq!(store.get_linked_wallets(&will.will_id, true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_link_requires_pending_will() {
        let (registry, store) = setup();
        let will = registry
            .authorize(signed_request(&key(8), plan(), 1_000))
            .await
            .unwrap();
        store
            .update_status(&will.will_id, WillStatus::Executed)
            .await
            .unwrap();

        assert!(matches!(
            registry
                .link_wallet(&will.will_id, Address::from_bytes([9; 20]), "0x00")
                .await,
            Err(RegistryError::NotPending { .. })
        ));
        assert!(matches!(
            registry
                .link_wallet("missing", Address::from_bytes([9; 20]), "0x00")
                .await,
            Err(RegistryError::NotFound(_))
        ));
    }
}
