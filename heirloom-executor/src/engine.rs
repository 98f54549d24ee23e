//! Engine facade.
//!
//! Wires the registry, the optional plan advisor and the controller over one
//! set of repositories and one ledger.

use covenant::{Clock, Repositories, SignatureVerifier, WillRegistry, WillStatus};
use heirloom_agent::{LlmBackend, PlanAdvisor, PlanReview, SocialSource};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::attestation::LedgerAttestationSink;
use crate::config::HeirloomConfig;
use crate::controller::WillController;
use crate::ledger::LedgerClient;
use crate::types::{ExecutionReport, ExecutionRequest, Result};

/// Outcome of [`HeirloomEngine::execute`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineReport {
    /// Plan review, when one ran
    pub review: Option<PlanReview>,
    pub execution: ExecutionReport,
}

pub struct HeirloomEngine {
    repos: Repositories,
    registry: WillRegistry,
    controller: WillController,
    advisor: Option<PlanAdvisor>,
    config: HeirloomConfig,
}

impl HeirloomEngine {
    pub fn new(config: HeirloomConfig, repos: Repositories, ledger: Arc<dyn LedgerClient>) -> Self {
        let registry = WillRegistry::new(
            repos.clone(),
            SignatureVerifier::new(config.signing.clone()),
        );

        let mut controller =
            WillController::new(repos.clone(), ledger.clone(), config.executor.clone());
        if let Some(certificates) = config.executor.certificate_registry {
            controller = controller
                .with_attestation(Arc::new(LedgerAttestationSink::new(ledger, certificates)));
        }

        Self {
            repos,
            registry,
            controller,
            advisor: None,
            config,
        }
    }

    /// Review plans against social posts before executing.
    pub fn with_advisor(
        mut self,
        backend: Arc<dyn LlmBackend>,
        social: Arc<dyn SocialSource>,
    ) -> Self {
        self.advisor = Some(PlanAdvisor::new(
            backend,
            social,
            self.config.reallocation.clone(),
        ));
        self
    }

    /// Replace the time source everywhere.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.registry = self.registry.with_clock(clock.clone());
        self.controller = self.controller.with_clock(clock);
        self
    }

    /// Authorization intake.
    pub fn registry(&self) -> &WillRegistry {
        &self.registry
    }

    pub fn config(&self) -> &HeirloomConfig {
        &self.config
    }

    /// Execute a will, reviewing it first when `social_handle` is given.
    ///
    /// A reallocated plan is used for this execution only; the stored will
    /// keeps its authorized beneficiaries.
    pub async fn execute(
        &self,
        mut request: ExecutionRequest,
        social_handle: Option<&str>,
    ) -> Result<EngineReport> {
        let review = match (social_handle, request.beneficiaries.is_none()) {
            (Some(handle), true) => self.review(&request, handle).await?,
            (Some(_), false) => {
                debug!(will_id = %request.will_id, "Explicit beneficiaries given, skipping review");
                None
            }
            (None, _) => None,
        };

        if let Some(adjusted) = review.as_ref().and_then(|r| r.adjusted_beneficiaries()) {
            info!(
                will_id = %request.will_id,
                beneficiaries = adjusted.len(),
                "Executing reallocated plan"
            );
            request.beneficiaries = Some(adjusted.to_vec());
        }

        let execution = self.controller.execute(request).await?;
        Ok(EngineReport { review, execution })
    }

    async fn review(&self, request: &ExecutionRequest, handle: &str) -> Result<Option<PlanReview>> {
        let Some(advisor) = &self.advisor else {
            warn!(will_id = %request.will_id, "Social handle given but no advisor configured");
            return Ok(None);
        };

        // Only review wills the controller would accept; it reports the error
        let will = match self.repos.wills.get_will(&request.will_id).await? {
            Some(will)
                if will.owner == request.claimed_owner && will.status == WillStatus::Pending =>
            {
                will
            }
            _ => return Ok(None),
        };

        Ok(Some(advisor.review(&will, handle).await))
    }
}
