//! Heirloom Executor - Will Execution Engine
//!
//! Turns a pending, signed will into ledger transfers:
//! - Per-will locking and fail-fast validation
//! - Optional trigger attestation (non-blocking)
//! - Strategy per execution mode (native, stablecoin pull, vault)
//! - Sequential multi-wallet fan-out under a shared spending budget
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             HeirloomEngine              │
//! │   (PlanAdvisor gate + WillController)   │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┼───────────────┐
//!      ▼           ▼               ▼
//! ┌──────────┐ ┌──────────────┐ ┌──────────────┐
//! │ Will     │ │ Attestation  │ │ Fan-out      │
//! │ Locks    │ │ Sink         │ │ (Strategy)   │
//! └──────────┘ └──────┬───────┘ └──────┬───────┘
//!                     └───────┬────────┘
//!                             ▼
//!                      ┌──────────────┐
//!                      │ LedgerClient │
//!                      └──────────────┘
//! ```

pub mod allocation;
pub mod attestation;
pub mod config;
pub mod controller;
pub mod engine;
pub mod fanout;
pub mod ledger;
pub mod locks;
pub mod strategy;
pub mod types;

// Re-export main types for convenience
pub use allocation::{allocate, decide, percentage_tenths, TransferDecision};
pub use attestation::{Attestation, AttestationError, AttestationSink, LedgerAttestationSink};
pub use config::{ExecutorConfig, HeirloomConfig, StablecoinConfig};
pub use controller::WillController;
pub use engine::{EngineReport, HeirloomEngine};
pub use fanout::FanoutExecutor;
pub use ledger::{Asset, CallPayload, InMemoryLedger, LedgerCall, LedgerClient, LedgerError};
pub use locks::WillLocks;
pub use strategy::{
    select_strategy, ExecutionStrategy, NativeTransfer, TokenPull, VaultWithdrawal,
};
pub use types::{
    ExecutionError, ExecutionReport, ExecutionRequest, ExecutionResult, FailureReason,
    TransferOutcome,
};
