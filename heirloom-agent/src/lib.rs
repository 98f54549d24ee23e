//! Heirloom Agent - Intent Review for Wills
//!
//! Checks a signed plan against what its owner has been saying lately:
//! - Trait-based LLM backends (OpenAI-compatible, mock)
//! - Social post sources
//! - Intent assessment and quantification
//! - Weighted reallocation with protective bounds
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              PlanAdvisor                │
//! │   (pre-execution gate for a will)       │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┼───────────────┐
//!      ▼           ▼               ▼
//! ┌──────────┐ ┌──────────────┐ ┌──────────────┐
//! │ Social   │ │ Assessor /   │ │ Reallocation │
//! │ Source   │ │ Quantifier   │ │ Engine       │
//! └──────────┘ │ (LlmBackend) │ └──────────────┘
//!              └──────────────┘
//! ```

pub mod advisor;
pub mod assessor;
pub mod backend;
pub mod config;
pub mod json;
pub mod quantifier;
pub mod reallocation;
pub mod social;

// Re-export main types for convenience
pub use advisor::{PlanAdvisor, PlanReview};
pub use assessor::{IntentAssessment, IntentAssessor};
pub use backend::{CompletionRequest, CompletionResponse, LlmBackend, LlmError};
pub use config::ReallocationConfig;
pub use quantifier::{IntentAction, IntentQuantifier, SocialBeneficiary};
pub use reallocation::{
    normalize, AdjustmentEntry, AdjustmentKind, ReallocationEngine, ReallocationOutcome,
    Recommendation,
};
pub use social::{SocialError, SocialPost, SocialSource, StaticSocialSource};
