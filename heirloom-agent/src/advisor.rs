//! Pre-execution plan review.
//!
//! Fetches the owner's recent posts, scores them against the will, and when
//! the score falls below the trigger threshold, quantifies the posts and
//! produces a reallocated plan. Every collaborator failure degrades to "the
//! authorized plan stands".

use covenant::{Beneficiary, Will};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::assessor::{IntentAssessment, IntentAssessor};
use crate::backend::LlmBackend;
use crate::config::ReallocationConfig;
use crate::quantifier::{IntentQuantifier, SocialBeneficiary};
use crate::reallocation::{ReallocationEngine, ReallocationOutcome};
use crate::social::SocialSource;

/// What the advisor concluded for one will.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReview {
    pub assessment: IntentAssessment,
    pub posts_considered: usize,
    pub intents: Vec<SocialBeneficiary>,
    /// Present only when the intent-match score triggered reallocation
    pub outcome: Option<ReallocationOutcome>,
}

impl PlanReview {
    /// The blended plan, if one was produced.
    pub fn adjusted_beneficiaries(&self) -> Option<&[Beneficiary]> {
        self.outcome.as_ref().map(|o| o.adjusted.as_slice())
    }
}

/// Gatekeeper between the signed plan and social signals.
pub struct PlanAdvisor {
    backend: Arc<dyn LlmBackend>,
    social: Arc<dyn SocialSource>,
    assessor: IntentAssessor,
    quantifier: IntentQuantifier,
    config: ReallocationConfig,
}

impl PlanAdvisor {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        social: Arc<dyn SocialSource>,
        config: ReallocationConfig,
    ) -> Self {
        Self {
            social,
            assessor: IntentAssessor::new(backend.clone(), &config),
            quantifier: IntentQuantifier::new(backend.clone(), &config),
            backend,
            config,
        }
    }

    /// Review `will` against the posts of `handle`.
    pub async fn review(&self, will: &Will, handle: &str) -> PlanReview {
        if !self.backend.is_available().await {
            warn!(
                will_id = %will.will_id,
                backend = self.backend.id(),
                "LLM backend unavailable, authorized plan stands"
            );
            return PlanReview {
                assessment: IntentAssessment::neutral("backend unavailable"),
                posts_considered: 0,
                intents: Vec::new(),
                outcome: None,
            };
        }

        let posts = match self
            .social
            .get_recent_posts(handle, self.config.max_posts)
            .await
        {
            Ok(posts) => posts,
            Err(e) => {
                warn!(will_id = %will.will_id, handle, error = %e, "Social lookup failed");
                Vec::new()
            }
        };

        let assessment = self.assessor.assess(&will.beneficiaries, &posts).await;
        if assessment.intent_match >= self.config.trigger_threshold {
            info!(
                will_id = %will.will_id,
                intent_match = assessment.intent_match,
                "Authorized plan stands"
            );
            return PlanReview {
                assessment,
                posts_considered: posts.len(),
                intents: Vec::new(),
                outcome: None,
            };
        }

        let texts: Vec<String> = posts.iter().map(|p| p.content.clone()).collect();
        let intents = self.quantifier.quantify(&will.beneficiaries, &texts).await;
        let outcome =
            ReallocationEngine::reallocate(&will.beneficiaries, &intents, assessment.intent_match);

        info!(
            will_id = %will.will_id,
            intent_match = assessment.intent_match,
            intents = intents.len(),
            "Plan reallocated after low intent match"
        );

        PlanReview {
            assessment,
            posts_considered: posts.len(),
            intents,
            outcome: Some(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::social::{SocialPost, StaticSocialSource};
    use chrono::Utc;
    use covenant::{Address, ExecutionMode, SpendingLimits, WillStatus};

    fn will() -> Will {
        let now = Utc::now();
        Will {
            will_id: "will-1".to_string(),
            owner: Address::from_bytes([9; 20]),
            beneficiaries: vec![
                Beneficiary::new(Address::from_bytes([1; 20]), 50.0, "Alice"),
                Beneficiary::new(Address::from_bytes([2; 20]), 50.0, "Bob"),
            ],
            total_amount: 1_000,
            valid_until: 4_000_000_000,
            signature: "0x".to_string(),
            status: WillStatus::Pending,
            mode: ExecutionMode::Native,
            spending_limits: SpendingLimits::new(1_000, 1_000, now.date_naive()),
            created_at: now,
            updated_at: now,
        }
    }

    fn social() -> Arc<StaticSocialSource> {
        Arc::new(StaticSocialSource::new().with_posts(
            "owner",
            vec![SocialPost::new("Bob has been wonderful, Alice not so much", Utc::now())],
        ))
    }

    #[tokio::test]
    async fn test_high_match_leaves_plan() {
        let backend = Arc::new(MockBackend::default().then_respond(r#"{"intentMatch": 90}"#));
        let advisor = PlanAdvisor::new(backend.clone(), social(), ReallocationConfig::default());

        let review = advisor.review(&will(), "owner").await;
        assert!(review.outcome.is_none());
        assert!(review.adjusted_beneficiaries().is_none());
        assert_eq!(review.posts_considered, 1);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_low_match_reallocates() {
        let backend = Arc::new(
            MockBackend::default()
                .then_respond(r#"{"intentMatch": 20, "summary": "prefers Bob"}"#)
                .then_respond(r#"{"beneficiaries": [{"name": "Alice", "percentage": 0, "action": "REMOVE"}]}"#),
        );
        let advisor = PlanAdvisor::new(backend.clone(), social(), ReallocationConfig::default());

        let review = advisor.review(&will(), "owner").await;
        let adjusted = review.adjusted_beneficiaries().unwrap();
        assert_eq!(adjusted[0].percentage, 33.3);
        assert_eq!(adjusted[1].percentage, 66.7);
        assert_eq!(review.intents.len(), 1);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_backend_skips_review() {
        let backend = Arc::new(
            MockBackend::default()
                .then_respond(r#"{"intentMatch": 5}"#)
                .with_available(false),
        );
        let advisor = PlanAdvisor::new(backend.clone(), social(), ReallocationConfig::default());

        let review = advisor.review(&will(), "owner").await;
        assert!(review.assessment.degraded);
        assert_eq!(review.assessment.intent_match, 100.0);
        assert!(review.outcome.is_none());
        assert_eq!(review.posts_considered, 0);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_social_failure_is_neutral() {
        let backend = Arc::new(MockBackend::default());
        let advisor = PlanAdvisor::new(
            backend.clone(),
            Arc::new(StaticSocialSource::unavailable()),
            ReallocationConfig::default(),
        );

        let review = advisor.review(&will(), "owner").await;
        assert!(review.assessment.degraded);
        assert!(review.outcome.is_none());
        assert_eq!(backend.call_count(), 0);
    }
}
