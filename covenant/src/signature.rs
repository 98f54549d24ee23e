//! Typed-data signature verification.
//!
//! Authorizations are signed as EIP-712 typed data. This module rebuilds the
//! digest from the claimed payload, recovers the signing address from the
//! secp256k1 signature and compares it with the claimed signer. Signature
//! generation is out of scope; only recovery and comparison live here.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use tracing::debug;

use crate::canonical::canonical_beneficiaries;
use crate::types::{Address, Beneficiary};

const DOMAIN_TYPE: &str = "EIP712Domain(string name,string version,uint256 chainId)";
const AUTHORIZATION_TYPE: &str =
    "WillAuthorization(address owner,string beneficiaries,uint256 totalAmount,uint256 validUntil)";
const WALLET_LINK_TYPE: &str = "WalletLink(string willId,address wallet)";

/// Error types for signature recovery.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// Not hex, or wrong length
    #[error("Malformed signature: {0}")]
    Malformed(String),

    /// Recovery byte outside 0/1/27/28
    #[error("Invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    /// Curve-level recovery failed
    #[error("Recovery failed: {0}")]
    RecoveryFailed(String),
}

/// EIP-712 signing domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningDomain {
    /// Application name
    pub name: String,
    /// Domain version
    pub version: String,
    /// Chain the signatures are bound to
    pub chain_id: u64,
}

impl Default for SigningDomain {
    fn default() -> Self {
        Self {
            name: "Heirloom".to_string(),
            version: "1".to_string(),
            chain_id: 2368,
        }
    }
}

impl SigningDomain {
    /// The domain separator hash.
    pub fn separator(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(32 * 4);
        buf.extend_from_slice(&keccak256(DOMAIN_TYPE.as_bytes()));
        buf.extend_from_slice(&keccak256(self.name.as_bytes()));
        buf.extend_from_slice(&keccak256(self.version.as_bytes()));
        buf.extend_from_slice(&encode_uint(self.chain_id as u128));
        keccak256(&buf)
    }
}

/// A message with an EIP-712 struct hash.
pub trait TypedMessage {
    /// `hashStruct(message)`.
    fn struct_hash(&self) -> [u8; 32];
}

/// The owner's signed will authorization.
#[derive(Debug, Clone)]
pub struct WillAuthorization<'a> {
    pub owner: &'a Address,
    pub beneficiaries: &'a [Beneficiary],
    pub total_amount: u128,
    pub valid_until: u64,
}

impl TypedMessage for WillAuthorization<'_> {
    fn struct_hash(&self) -> [u8; 32] {
        let canonical = canonical_beneficiaries(self.beneficiaries);

        let mut buf = Vec::with_capacity(32 * 5);
        buf.extend_from_slice(&keccak256(AUTHORIZATION_TYPE.as_bytes()));
        buf.extend_from_slice(&encode_address(self.owner));
        buf.extend_from_slice(&keccak256(canonical.as_bytes()));
        buf.extend_from_slice(&encode_uint(self.total_amount));
        buf.extend_from_slice(&encode_uint(self.valid_until as u128));
        keccak256(&buf)
    }
}

/// A wallet's opt-in to contribute to a will.
#[derive(Debug, Clone)]
pub struct WalletLink<'a> {
    pub will_id: &'a str,
    pub wallet: &'a Address,
}

impl TypedMessage for WalletLink<'_> {
    fn struct_hash(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(32 * 3);
        buf.extend_from_slice(&keccak256(WALLET_LINK_TYPE.as_bytes()));
        buf.extend_from_slice(&keccak256(self.will_id.as_bytes()));
        buf.extend_from_slice(&encode_address(self.wallet));
        keccak256(&buf)
    }
}

/// Recovers and checks signers of typed messages within one domain.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    domain: SigningDomain,
    separator: [u8; 32],
}

impl SignatureVerifier {
    /// Create a verifier for a signing domain.
    pub fn new(domain: SigningDomain) -> Self {
        let separator = domain.separator();
        Self { domain, separator }
    }

    /// The signing domain.
    pub fn domain(&self) -> &SigningDomain {
        &self.domain
    }

    /// The digest a wallet signs for `message`.
    pub fn digest(&self, message: &impl TypedMessage) -> [u8; 32] {
        let mut buf = Vec::with_capacity(2 + 64);
        buf.extend_from_slice(&[0x19, 0x01]);
        buf.extend_from_slice(&self.separator);
        buf.extend_from_slice(&message.struct_hash());
        keccak256(&buf)
    }

    /// Recover the address that signed `message`.
    pub fn recover(
        &self,
        message: &impl TypedMessage,
        signature: &str,
    ) -> Result<Address, SignatureError> {
        recover_prehash(&self.digest(message), signature)
    }

    /// Check that `signature` is the owner's authorization of this plan.
    ///
    /// Never errors: any recovery failure counts as a mismatch.
    pub fn verify_authorization(
        &self,
        owner: &Address,
        beneficiaries: &[Beneficiary],
        total_amount: u128,
        valid_until: u64,
        signature: &str,
    ) -> bool {
        let message = WillAuthorization {
            owner,
            beneficiaries,
            total_amount,
            valid_until,
        };
        self.matches(&message, owner, signature)
    }

    /// Check that `signature` is `wallet`'s opt-in to `will_id`.
    pub fn verify_wallet_link(&self, will_id: &str, wallet: &Address, signature: &str) -> bool {
        let message = WalletLink { will_id, wallet };
        self.matches(&message, wallet, signature)
    }

    fn matches(&self, message: &impl TypedMessage, expected: &Address, signature: &str) -> bool {
        match self.recover(message, signature) {
            Ok(signer) => signer == *expected,
            Err(e) => {
                debug!(expected = %expected, error = %e, "Signature recovery failed");
                false
            }
        }
    }
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::new(SigningDomain::default())
    }
}

/// Recover the signer of a 32-byte prehash from a 65-byte `r ‖ s ‖ v` hex signature.
pub fn recover_prehash(prehash: &[u8; 32], signature: &str) -> Result<Address, SignatureError> {
    let digits = signature.trim();
    let digits = digits.strip_prefix("0x").unwrap_or(digits);
    let bytes = hex::decode(digits).map_err(|e| SignatureError::Malformed(e.to_string()))?;
    if bytes.len() != 65 {
        return Err(SignatureError::Malformed(format!(
            "expected 65 bytes, got {}",
            bytes.len()
        )));
    }

    let v = bytes[64];
    let recovery_byte = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => return Err(SignatureError::InvalidRecoveryId(other)),
    };
    let recovery_id =
        RecoveryId::from_byte(recovery_byte).ok_or(SignatureError::InvalidRecoveryId(v))?;

    let sig = Signature::from_slice(&bytes[..64])
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;

    let key = VerifyingKey::recover_from_prehash(prehash, &sig, recovery_id)
        .map_err(|e| SignatureError::RecoveryFailed(e.to_string()))?;

    Ok(address_of(&key))
}

/// Ledger address of a public key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Address::from_bytes(out)
}

/// Keccak-256 of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let hash = Keccak256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hash);
    out
}

fn encode_uint(value: u128) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[16..].copy_from_slice(&value.to_be_bytes());
    out
}

fn encode_address(address: &Address) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(address.as_bytes());
    out
}


#[cfg(test)]
mod tests {
    use super::test_keys::*;
    use super::*;

    fn plan() -> Vec<Beneficiary> {
        vec![
            Beneficiary::new(Address::from_bytes([0xa1; 20]), 60.0, "Alice"),
            Beneficiary::new(Address::from_bytes([0xb2; 20]), 40.0, "Bob"),
        ]
    }

    fn sign_plan(
        verifier: &SignatureVerifier,
        key: &k256::ecdsa::SigningKey,
        beneficiaries: &[Beneficiary],
        total: u128,
    ) -> String {
        let owner = address(key);
        let message = WillAuthorization {
            owner: &owner,
            beneficiaries,
            total_amount: total,
            valid_until: 1_900_000_000,
        };
        sign(key, &verifier.digest(&message))
    }

    #[test]
    fn test_authorization_round_trip() {
        let verifier = SignatureVerifier::default();
        let key = key(1);
        let owner = address(&key);
        let sig = sign_plan(&verifier, &key, &plan(), 1_000);

        assert!(verifier.verify_authorization(&owner, &plan(), 1_000, 1_900_000_000, &sig));
    }

    #[test]
    fn test_reordered_beneficiaries_still_verify() {
        let verifier = SignatureVerifier::default();
        let key = key(2);
        let owner = address(&key);
        let sig = sign_plan(&verifier, &key, &plan(), 1_000);

        let mut reversed = plan();
        reversed.reverse();
        assert!(verifier.verify_authorization(&owner, &reversed, 1_000, 1_900_000_000, &sig));
    }

    #[test]
    fn test_owner_comparison_ignores_case() {
        let verifier = SignatureVerifier::default();
        let key = key(3);
        let owner = address(&key);
        let sig = sign_plan(&verifier, &key, &plan(), 1_000);

        let upper = Address::parse(&owner.to_string().to_uppercase().replacen("0X", "0x", 1))
            .unwrap();
        assert!(verifier.verify_authorization(&upper, &plan(), 1_000, 1_900_000_000, &sig));
    }

    #[test]
    fn test_wrong_owner_or_tampered_payload_fails() {
        let verifier = SignatureVerifier::default();
        let key = key(4);
        let owner = address(&key);
        let other = address(&super::test_keys::key(5));
        let sig = sign_plan(&verifier, &key, &plan(), 1_000);

        assert!(!verifier.verify_authorization(&other, &plan(), 1_000, 1_900_000_000, &sig));
        assert!(!verifier.verify_authorization(&owner, &plan(), 2_000, 1_900_000_000, &sig));

        let mut changed = plan();
        changed[0].percentage = 59.0;
        changed[1].percentage = 41.0;
        assert!(!verifier.verify_authorization(&owner, &changed, 1_000, 1_900_000_000, &sig));
    }

    #[test]
    fn test_other_domain_fails() {
        let verifier = SignatureVerifier::default();
        let key = key(6);
        let owner = address(&key);
        let sig = sign_plan(&verifier, &key, &plan(), 1_000);

        let other_chain = SignatureVerifier::new(SigningDomain {
            chain_id: 1,
            ..SigningDomain::default()
        });
        assert!(!other_chain.verify_authorization(&owner, &plan(), 1_000, 1_900_000_000, &sig));
    }

    #[test]
    fn test_malformed_signatures_are_false_not_errors() {
        let verifier = SignatureVerifier::default();
        let owner = address(&key(7));

        for sig in ["", "0x1234", "not hex at all", &format!("0x{}", "00".repeat(65))] {
            assert!(!verifier.verify_authorization(&owner, &plan(), 1_000, 1_900_000_000, sig));
        }
    }

    #[test]
    fn test_recovery_id_forms() {
        let verifier = SignatureVerifier::default();
        let key = key(8);
        let owner = address(&key);
        let sig = sign_plan(&verifier, &key, &plan(), 1_000);

        // Same signature with v as 0/1 instead of 27/28
        let mut bytes = hex::decode(sig.trim_start_matches("0x")).unwrap();
        bytes[64] -= 27;
        let raw_v = hex::encode(&bytes);
        assert!(verifier.verify_authorization(&owner, &plan(), 1_000, 1_900_000_000, &raw_v));

        bytes[64] = 99;
        let err = recover_prehash(&[0u8; 32], &hex::encode(&bytes)).unwrap_err();
        assert!(matches!(err, SignatureError::InvalidRecoveryId(99)));
    }

    #[test]
    fn test_wallet_link() {
        let verifier = SignatureVerifier::default();
        let key = key(9);
        let wallet = address(&key);
        let digest = verifier.digest(&WalletLink {
            will_id: "will-1",
            wallet: &wallet,
        });
        let sig = sign(&key, &digest);

        assert!(verifier.verify_wallet_link("will-1", &wallet, &sig));
        assert!(!verifier.verify_wallet_link("will-2", &wallet, &sig));
    }

    #[test]
    fn test_keccak_known_vector() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }
}
