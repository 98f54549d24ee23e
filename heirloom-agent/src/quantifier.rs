//! Intent quantification.
//!
//! Turns free text into structured beneficiary deltas via the LLM. Model
//! output is untrusted: anything that does not parse is dropped, and numeric
//! fields are clamped into range.

use covenant::{Address, Beneficiary};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{CompletionRequest, LlmBackend};
use crate::config::ReallocationConfig;
use crate::json::{extract_json, lenient_f64};

const SYSTEM_PROMPT: &str = "You extract inheritance intentions from a person's own writing. \
Reply with JSON only: {\"beneficiaries\": [{\"name\": string, \"address\": string or null, \
\"percentage\": number 0-100, \"relationship\": string, \"trustScore\": number 0-1, \
\"action\": \"ADD\" | \"REMOVE\" | \"ADJUST\"}]}. \
Use ADD for someone the author wants to provide for, REMOVE for someone the author wants \
excluded, ADJUST for a changed share. Only include people the text clearly refers to. \
Return an empty list when nothing applies.";

/// What a social signal asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentAction {
    Add,
    Remove,
    Adjust,
}

impl IntentAction {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADD" => Some(Self::Add),
            "REMOVE" => Some(Self::Remove),
            "ADJUST" => Some(Self::Adjust),
            _ => None,
        }
    }
}

/// A beneficiary intention inferred from external text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialBeneficiary {
    pub name: String,
    pub address: Option<Address>,
    /// Requested share, 0-100
    pub percentage: f64,
    pub relationship: String,
    /// Confidence in the signal, 0-1
    pub trust_score: f64,
    pub action: IntentAction,
}

impl SocialBeneficiary {
    /// Whether this signal refers to `beneficiary`.
    ///
    /// By address when the signal carries one, otherwise by name.
    pub fn refers_to(&self, beneficiary: &Beneficiary) -> bool {
        match &self.address {
            Some(address) => *address == beneficiary.address,
            None => self
                .name
                .trim()
                .eq_ignore_ascii_case(beneficiary.name.trim()),
        }
    }
}

/// LLM-backed extraction of [`SocialBeneficiary`] entries.
pub struct IntentQuantifier {
    backend: Arc<dyn LlmBackend>,
    max_tokens: u32,
    temperature: f32,
}

impl IntentQuantifier {
    pub fn new(backend: Arc<dyn LlmBackend>, config: &ReallocationConfig) -> Self {
        Self {
            backend,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// Quantify `texts` against the will's current beneficiaries.
    ///
    /// Never fails: backend errors and malformed output yield an empty list.
    pub async fn quantify(
        &self,
        beneficiaries: &[Beneficiary],
        texts: &[String],
    ) -> Vec<SocialBeneficiary> {
        if texts.is_empty() {
            return Vec::new();
        }

        let request = CompletionRequest::user(build_prompt(beneficiaries, texts))
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .fit_to(self.backend.capabilities());

        match self.backend.complete(request).await {
            Ok(response) => {
                let intents = parse_intents(&response.content);
                debug!(
                    backend = self.backend.id(),
                    intents = intents.len(),
                    tokens = response.usage.total(),
                    "Quantified social intents"
                );
                intents
            }
            Err(e) => {
                warn!(backend = self.backend.id(), error = %e, "Intent quantification failed");
                Vec::new()
            }
        }
    }
}

fn build_prompt(beneficiaries: &[Beneficiary], texts: &[String]) -> String {
    let mut prompt = String::from("Current will beneficiaries:\n");
    for b in beneficiaries {
        prompt.push_str(&format!("- {} ({}): {}%\n", b.name, b.address, b.percentage));
    }
    prompt.push_str("\nTexts by the will's author:\n");
    for (i, text) in texts.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, text.trim()));
    }
    prompt
}

/// Parse model output into intents, dropping anything unusable.
pub fn parse_intents(output: &str) -> Vec<SocialBeneficiary> {
    let Some(value) = extract_json(output) else {
        warn!("Quantifier output contained no JSON");
        return Vec::new();
    };

    let entries = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("beneficiaries") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    entries.iter().filter_map(parse_entry).collect()
}

fn parse_entry(entry: &Value) -> Option<SocialBeneficiary> {
    let name = entry.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let action = IntentAction::parse(entry.get("action")?.as_str()?)?;

    let percentage = entry
        .get("percentage")
        .and_then(lenient_f64)
        .filter(|p| p.is_finite())
        .unwrap_or(0.0)
        .clamp(0.0, 100.0);
    let trust_score = entry
        .get("trustScore")
        .or_else(|| entry.get("trust_score"))
        .and_then(lenient_f64)
        .filter(|t| t.is_finite())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    Some(SocialBeneficiary {
        name: name.to_string(),
        address: entry
            .get("address")
            .and_then(Value::as_str)
            .and_then(|a| Address::parse(a.trim()).ok()),
        percentage,
        relationship: entry
            .get("relationship")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        trust_score,
        action,
    })
}
