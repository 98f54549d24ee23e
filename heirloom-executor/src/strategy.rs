//! Execution strategies, one per [`ExecutionMode`].
//!
//! A strategy answers three questions for the fan-out: which accounts fund
//! the distribution, how much each can give, and what call moves the funds.

use async_trait::async_trait;
use covenant::{Address, ExecutionMode, LinkedWallet, Will};

use crate::config::ExecutorConfig;
use crate::ledger::{Asset, CallPayload, LedgerCall, LedgerClient, LedgerError};
use crate::types::{ExecutionError, Result};

#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Symbol recorded on transaction records.
    fn token_symbol(&self) -> &str;

    /// Funding accounts, in processing order.
    fn sources(&self, will: &Will, wallets: &[LinkedWallet]) -> Vec<Address>;

    /// Amount `source` can distribute right now.
    async fn distributable(
        &self,
        ledger: &dyn LedgerClient,
        source: &Address,
    ) -> std::result::Result<u128, LedgerError>;

    /// The call that sends `amount` from `source` to `to`.
    fn transfer_call(&self, source: &Address, to: &Address, amount: u128) -> LedgerCall;
}

fn wallet_sources(wallets: &[LinkedWallet]) -> Vec<Address> {
    let mut sources: Vec<Address> = Vec::with_capacity(wallets.len());
    for wallet in wallets {
        if !sources.contains(&wallet.address) {
            sources.push(wallet.address);
        }
    }
    sources
}

/// Native-asset transfers from each linked wallet, minus a fee reserve.
pub struct NativeTransfer {
    symbol: String,
    fee_reserve: u128,
}

impl NativeTransfer {
    pub fn new(symbol: impl Into<String>, fee_reserve: u128) -> Self {
        Self {
            symbol: symbol.into(),
            fee_reserve,
        }
    }
}

#[async_trait]
impl ExecutionStrategy for NativeTransfer {
    fn name(&self) -> &'static str {
        "native"
    }

    fn token_symbol(&self) -> &str {
        &self.symbol
    }

    fn sources(&self, _will: &Will, wallets: &[LinkedWallet]) -> Vec<Address> {
        wallet_sources(wallets)
    }

    async fn distributable(
        &self,
        ledger: &dyn LedgerClient,
        source: &Address,
    ) -> std::result::Result<u128, LedgerError> {
        let balance = ledger.balance_of(Asset::Native, source).await?;
        Ok(balance.saturating_sub(self.fee_reserve))
    }

    fn transfer_call(&self, source: &Address, to: &Address, amount: u128) -> LedgerCall {
        LedgerCall {
            target: *to,
            value: amount,
            payload: CallPayload::NativeTransfer { from: *source },
        }
    }
}

/// Pull-based token transfers from each linked wallet.
///
/// A wallet can give at most what it holds and what it allowed the executor
/// to pull; no fee reserve applies since the executor pays for the call.
pub struct TokenPull {
    token: Address,
    symbol: String,
    spender: Address,
}

impl TokenPull {
    pub fn new(token: Address, symbol: impl Into<String>, spender: Address) -> Self {
        Self {
            token,
            symbol: symbol.into(),
            spender,
        }
    }
}

#[async_trait]
impl ExecutionStrategy for TokenPull {
    fn name(&self) -> &'static str {
        "token_pull"
    }

    fn token_symbol(&self) -> &str {
        &self.symbol
    }

    fn sources(&self, _will: &Will, wallets: &[LinkedWallet]) -> Vec<Address> {
        wallet_sources(wallets)
    }

    async fn distributable(
        &self,
        ledger: &dyn LedgerClient,
        source: &Address,
    ) -> std::result::Result<u128, LedgerError> {
        let allowance = ledger.allowance(&self.token, source, &self.spender).await?;
        if allowance == 0 {
            return Ok(0);
        }
        let balance = ledger.balance_of(Asset::Token(self.token), source).await?;
        Ok(balance.min(allowance))
    }

    fn transfer_call(&self, source: &Address, to: &Address, amount: u128) -> LedgerCall {
        LedgerCall {
            target: self.token,
            value: 0,
            payload: CallPayload::TokenTransferFrom {
                from: *source,
                to: *to,
                amount,
            },
        }
    }
}

/// Withdrawals from the owner's spend-limited vault, the single source.
pub struct VaultWithdrawal {
    vault: Address,
    token: Option<Address>,
    symbol: String,
}

impl VaultWithdrawal {
    pub fn new(vault: Address, token: Option<Address>, symbol: impl Into<String>) -> Self {
        Self {
            vault,
            token,
            symbol: symbol.into(),
        }
    }

    fn asset(&self) -> Asset {
        self.token.map(Asset::Token).unwrap_or(Asset::Native)
    }
}

#[async_trait]
impl ExecutionStrategy for VaultWithdrawal {
    fn name(&self) -> &'static str {
        "vault"
    }

    fn token_symbol(&self) -> &str {
        &self.symbol
    }

    fn sources(&self, _will: &Will, _wallets: &[LinkedWallet]) -> Vec<Address> {
        vec![self.vault]
    }

    async fn distributable(
        &self,
        ledger: &dyn LedgerClient,
        source: &Address,
    ) -> std::result::Result<u128, LedgerError> {
        ledger.balance_of(self.asset(), source).await
    }

    fn transfer_call(&self, source: &Address, to: &Address, amount: u128) -> LedgerCall {
        LedgerCall {
            target: *source,
            value: 0,
            payload: CallPayload::VaultWithdraw {
                token: self.token,
                to: *to,
                amount,
            },
        }
    }
}

/// Pick the strategy for a will's mode.
pub fn select_strategy(
    mode: &ExecutionMode,
    config: &ExecutorConfig,
) -> Result<Box<dyn ExecutionStrategy>> {
    let stablecoin = || {
        config.stablecoin.as_ref().ok_or_else(|| {
            ExecutionError::UnsupportedMode("stablecoin mode without a configured token".to_string())
        })
    };

    Ok(match mode {
        ExecutionMode::Native => Box::new(NativeTransfer::new(
            config.native_symbol.clone(),
            config.native_fee_reserve,
        )),
        ExecutionMode::Stablecoin => {
            let coin = stablecoin()?;
            Box::new(TokenPull::new(
                coin.token,
                coin.symbol.clone(),
                config.executor_address,
            ))
        }
        ExecutionMode::Vault {
            vault,
            stablecoin: false,
        } => Box::new(VaultWithdrawal::new(*vault, None, config.native_symbol.clone())),
        ExecutionMode::Vault {
            vault,
            stablecoin: true,
        } => {
            let coin = stablecoin()?;
            Box::new(VaultWithdrawal::new(
                *vault,
                Some(coin.token),
                coin.symbol.clone(),
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StablecoinConfig;
    use crate::ledger::InMemoryLedger;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            native_fee_reserve: 100,
            executor_address: addr(0xee),
            stablecoin: Some(StablecoinConfig {
                token: addr(0x55),
                symbol: "USDC".to_string(),
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_native_reserve() {
        let ledger = InMemoryLedger::new(addr(0xee));
        ledger.set_balance(Asset::Native, addr(1), 1_100);
        ledger.set_balance(Asset::Native, addr(2), 50);

        let strategy = select_strategy(&ExecutionMode::Native, &config()).unwrap();
        assert_eq!(strategy.name(), "native");
        assert_eq!(strategy.token_symbol(), "KITE");
        assert_eq!(strategy.distributable(&ledger, &addr(1)).await.unwrap(), 1_000);
        assert_eq!(strategy.distributable(&ledger, &addr(2)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_token_pull_is_bounded_by_allowance() {
        let ledger = InMemoryLedger::new(addr(0xee));
        ledger.set_balance(Asset::Token(addr(0x55)), addr(1), 1_000);
        ledger.approve(addr(0x55), addr(1), addr(0xee), 250);
        ledger.set_balance(Asset::Token(addr(0x55)), addr(2), 1_000);

        let strategy = select_strategy(&ExecutionMode::Stablecoin, &config()).unwrap();
        assert_eq!(strategy.distributable(&ledger, &addr(1)).await.unwrap(), 250);
        assert_eq!(strategy.distributable(&ledger, &addr(2)).await.unwrap(), 0);

        let call = strategy.transfer_call(&addr(1), &addr(9), 10);
        assert_eq!(call.target, addr(0x55));
        assert_eq!(call.value, 0);
    }

    #[test]
    fn test_vault_is_single_source() {
        let mode = ExecutionMode::Vault {
            vault: addr(0x77),
            stablecoin: true,
        };
        let strategy = select_strategy(&mode, &config()).unwrap();
        let now = chrono::Utc::now();
        let will = Will {
            will_id: "w".to_string(),
            owner: addr(1),
            beneficiaries: Vec::new(),
            total_amount: 0,
            valid_until: 0,
            signature: String::new(),
            status: covenant::WillStatus::Pending,
            mode,
            spending_limits: covenant::SpendingLimits::new(1, 1, now.date_naive()),
            created_at: now,
            updated_at: now,
        };
        let wallets = vec![
            LinkedWallet::approved("w", addr(1), "s"),
            LinkedWallet::approved("w", addr(2), "s"),
        ];
        assert_eq!(strategy.sources(&will, &wallets), vec![addr(0x77)]);
        assert_eq!(strategy.token_symbol(), "USDC");
    }

    #[test]
    fn test_stablecoin_requires_config() {
        let config = ExecutorConfig::default();
        assert!(matches!(
            select_strategy(&ExecutionMode::Stablecoin, &config),
            Err(ExecutionError::UnsupportedMode(_))
        ));
        assert!(select_strategy(&ExecutionMode::Native, &config).is_ok());
    }
}
