//! Intent assessment: how well does the written will match what its owner
//! has been saying publicly?

use covenant::Beneficiary;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::{CompletionRequest, LlmBackend};
use crate::config::ReallocationConfig;
use crate::json::{extract_json, lenient_f64};
use crate::social::SocialPost;

const SYSTEM_PROMPT: &str = "You compare a person's written will with their recent public posts. \
Score from 0 to 100 how consistent the posts are with the will's beneficiaries and shares \
(100 = fully consistent or posts say nothing relevant, 0 = posts clearly contradict the will). \
Reply with JSON only: {\"intentMatch\": number, \"summary\": string}.";

/// Result of comparing a will with observed signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentAssessment {
    /// 0-100
    pub intent_match: f64,
    pub summary: String,
    /// Set when the score is the neutral fallback rather than a real assessment
    pub degraded: bool,
}

impl IntentAssessment {
    /// The authorized plan stands.
    pub fn neutral(reason: impl Into<String>) -> Self {
        Self {
            intent_match: 100.0,
            summary: reason.into(),
            degraded: true,
        }
    }
}

/// LLM-backed intent-match scoring.
pub struct IntentAssessor {
    backend: Arc<dyn LlmBackend>,
    max_tokens: u32,
    temperature: f32,
}

impl IntentAssessor {
    pub fn new(backend: Arc<dyn LlmBackend>, config: &ReallocationConfig) -> Self {
        Self {
            backend,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// Score `posts` against the will's beneficiaries.
    pub async fn assess(&self, beneficiaries: &[Beneficiary], posts: &[SocialPost]) -> IntentAssessment {
        if posts.is_empty() {
            return IntentAssessment::neutral("no posts to assess");
        }

        let request = CompletionRequest::user(build_prompt(beneficiaries, posts))
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .fit_to(self.backend.capabilities());

        let response = match self.backend.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(backend = self.backend.id(), error = %e, "Intent assessment failed");
                return IntentAssessment::neutral(format!("assessment unavailable: {}", e));
            }
        };

        match parse_assessment(&response.content) {
            Some(assessment) => {
                info!(
                    intent_match = assessment.intent_match,
                    posts = posts.len(),
                    tokens = response.usage.total(),
                    "Intent assessed"
                );
                assessment
            }
            None => {
                warn!(backend = self.backend.id(), "Unparseable intent assessment");
                IntentAssessment::neutral("assessment output unparseable")
            }
        }
    }
}

fn build_prompt(beneficiaries: &[Beneficiary], posts: &[SocialPost]) -> String {
    let mut prompt = String::from("Will:\n");
    for b in beneficiaries {
        prompt.push_str(&format!("- {}: {}%\n", b.name, b.percentage));
    }
    prompt.push_str("\nRecent posts:\n");
    for post in posts {
        prompt.push_str(&format!("[{}] {}\n", post.date.format("%Y-%m-%d"), post.content.trim()));
    }
    prompt
}

fn parse_assessment(output: &str) -> Option<IntentAssessment> {
    let value = extract_json(output)?;
    let score = value
        .get("intentMatch")
        .or_else(|| value.get("intent_match"))
        .and_then(lenient_f64)
        .filter(|s| s.is_finite())?;

    Some(IntentAssessment {
        intent_match: score.clamp(0.0, 100.0),
        summary: value
            .get("summary")
            .and_then(|s| s.as_str())
            .unwrap_or_default()
            .to_string(),
        degraded: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use chrono::Utc;
    use covenant::Address;

    fn will() -> Vec<Beneficiary> {
        vec![Beneficiary::new(Address::from_bytes([1; 20]), 100.0, "Alice")]
    }

    fn posts() -> Vec<SocialPost> {
        vec![SocialPost::new("Leaving everything to my cat", Utc::now())]
    }

    #[tokio::test]
    async fn test_scores_from_backend() {
        let backend = Arc::new(
            MockBackend::default()
                .with_response("```json\n{\"intentMatch\": 140, \"summary\": \"diverges\"}\n```"),
        );
        let assessor = IntentAssessor::new(backend, &ReallocationConfig::default());

        let assessment = assessor.assess(&will(), &posts()).await;
        assert_eq!(assessment.intent_match, 100.0);
        assert_eq!(assessment.summary, "diverges");
        assert!(!assessment.degraded);
    }

    #[tokio::test]
    async fn test_low_score() {
        let backend = Arc::new(MockBackend::default().with_response(r#"{"intentMatch": "30"}"#));
        let assessor = IntentAssessor::new(backend, &ReallocationConfig::default());
        assert_eq!(assessor.assess(&will(), &posts()).await.intent_match, 30.0);
    }

    #[tokio::test]
    async fn test_failures_are_neutral() {
        let down = IntentAssessor::new(
            Arc::new(MockBackend::default().with_available(false)),
            &ReallocationConfig::default(),
        );
        let assessment = down.assess(&will(), &posts()).await;
        assert_eq!(assessment.intent_match, 100.0);
        assert!(assessment.degraded);

        let garbled = IntentAssessor::new(
            Arc::new(MockBackend::default().with_response("no idea")),
            &ReallocationConfig::default(),
        );
        assert!(garbled.assess(&will(), &posts()).await.degraded);

        let backend = Arc::new(MockBackend::default());
        let silent = IntentAssessor::new(backend.clone(), &ReallocationConfig::default());
        assert!(silent.assess(&will(), &[]).await.degraded);
        assert_eq!(backend.call_count(), 0);
    }
}
