//! Configuration for the Heirloom engine.

use covenant::{Address, SigningDomain};
use heirloom_agent::ReallocationConfig;
use serde::{Deserialize, Serialize};

/// 0.001 of an 18-decimal native asset.
pub const DEFAULT_NATIVE_FEE_RESERVE: u128 = 1_000_000_000_000_000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeirloomConfig {
    /// EIP-712 domain for authorizations and wallet links
    pub signing: SigningDomain,
    /// Distribution settings
    pub executor: ExecutorConfig,
    /// Pre-execution plan review
    pub reallocation: ReallocationConfig,
}

impl HeirloomConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Distribution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Symbol recorded for native-asset transfers
    pub native_symbol: String,
    /// Held back from each wallet's native balance for fees (smallest units)
    #[serde(with = "amount")]
    pub native_fee_reserve: u128,
    /// Service account that submits transactions and spends pull allowances
    pub executor_address: Address,
    /// Token used by stablecoin and stablecoin-vault modes
    pub stablecoin: Option<StablecoinConfig>,
    /// Contract receiving death certificates; attestation is off without one
    pub certificate_registry: Option<Address>,
    /// Record an attestation before distributing
    pub attestation_enabled: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            native_symbol: "KITE".to_string(),
            native_fee_reserve: DEFAULT_NATIVE_FEE_RESERVE,
            executor_address: Address::from_bytes([0; 20]),
            stablecoin: None,
            certificate_registry: None,
            attestation_enabled: true,
        }
    }
}

/// A stablecoin token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StablecoinConfig {
    pub token: Address,
    pub symbol: String,
}

/// `u128` amounts as decimal strings; plain integers are accepted on input.
mod amount {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        struct AmountVisitor;

        impl<'de> Visitor<'de> for AmountVisitor {
            type Value = u128;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a non-negative integer or decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
                Ok(v as u128)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
                u128::try_from(v).map_err(|_| E::custom("negative amount"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
                v.trim().parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}
