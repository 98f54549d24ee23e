//! Covenant - Will Authorization Model for Heirloom
//!
//! The durable, signed side of an inheritance plan:
//!
//! - **Wills**: signed beneficiary plans with spend limits and an execution mode
//! - **Linked wallets**: additional funding sources that opted into a will
//! - **Transaction log**: append-only record of everything sent on a will's behalf
//!
//! # Key Components
//!
//! - [`SignatureVerifier`]: Recovers EIP-712 signers of authorizations and wallet links
//! - [`SpendingLimiter`]: Per-transfer and per-day caps with lazy date reset
//! - [`WillRegistry`]: Validates and stores authorizations, links wallets
//! - [`store`]: Repository traits with in-memory and SQLite backends
//!
//! # Example
//!
//! ```ignore
//! use covenant::{Repositories, SignatureVerifier, SqliteStore, WillRegistry};
//!
//! let store = Arc::new(SqliteStore::open(Path::new("heirloom.db"))?);
//! let registry = WillRegistry::new(Repositories::from_store(store), SignatureVerifier::default());
//! let will = registry.authorize(request).await?;
//! ```

pub mod canonical;
pub mod clock;
pub mod limits;
pub mod registry;
pub mod signature;
pub mod store;
pub mod types;

// Re-export main types
pub use canonical::canonical_beneficiaries;
pub use clock::{Clock, FixedClock, SystemClock};
pub use limits::{LimitRejection, SpendingLimiter};
pub use registry::{AuthorizationRequest, RegistryError, WillRegistry};
pub use signature::{SignatureError, SignatureVerifier, SigningDomain};
pub use store::{
    InMemoryStore, LinkedWalletRepository, Repositories, SqliteStore, StoreError,
    TransactionRepository, WillRepository,
};
pub use types::*;
