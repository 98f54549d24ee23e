//! Weighted reallocation.
//!
//! Blends the authorized plan with quantified social intents. The written
//! plan always keeps 80% of the influence; social signals can shift at most
//! the remaining 20%, a removal request only halves a named beneficiary's
//! base share, and no social-only newcomer ends up above 30%.
//!
//! Output percentages are normalized to exactly 100.0 in one-decimal steps,
//! which the executor's tenth-of-a-percent amount arithmetic relies on.

use covenant::{Address, Beneficiary};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::quantifier::{IntentAction, SocialBeneficiary};

/// Influence of the authorized plan.
pub const WILL_WEIGHT: f64 = 0.80;
/// Influence of social signals.
pub const SOCIAL_WEIGHT: f64 = 0.20;
/// Extra factor applied to a base share the owner's posts ask to remove.
pub const REMOVAL_FACTOR: f64 = 0.5;
/// Upper bound for any beneficiary that exists only in social signals.
pub const SOCIAL_SHARE_CAP: f64 = 30.0;

const TENTHS_TOTAL: i64 = 1000;

/// What the caller should do with the adjusted plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Proceed,
    /// Social signals carry the majority of the weight
    Review,
}

impl Recommendation {
    pub fn for_social_weight(social_weight: f64) -> Self {
        if social_weight > 0.5 {
            Self::Review
        } else {
            Self::Proceed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Retained,
    Reduced,
    Blended,
    Added,
    Skipped,
}

/// One line of the reallocation audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentEntry {
    pub name: String,
    pub address: Option<Address>,
    pub kind: AdjustmentKind,
    pub original_percentage: f64,
    pub adjusted_percentage: f64,
    pub detail: String,
}

/// Result of one reallocation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReallocationOutcome {
    /// Blended plan, summing to exactly 100.0
    pub adjusted: Vec<Beneficiary>,
    pub will_weight: f64,
    pub social_weight: f64,
    /// Score that triggered this run
    pub intent_match: f64,
    pub adjustment_log: Vec<AdjustmentEntry>,
    pub recommendation: Recommendation,
}

/// Working state for one output beneficiary.
struct Draft {
    name: String,
    address: Address,
    original: f64,
    base: f64,
    social: f64,
    removed: bool,
    social_only: bool,
}

impl Draft {
    fn share(&self) -> f64 {
        let base = if self.removed {
            self.base * REMOVAL_FACTOR
        } else {
            self.base
        };
        base + self.social
    }

    /// Least share a named beneficiary keeps, whatever the signals say.
    fn floor(&self) -> f64 {
        self.original * WILL_WEIGHT * REMOVAL_FACTOR
    }

    fn kind(&self) -> AdjustmentKind {
        if self.social_only {
            AdjustmentKind::Added
        } else if self.removed {
            AdjustmentKind::Reduced
        } else if self.social > 0.0 {
            AdjustmentKind::Blended
        } else {
            AdjustmentKind::Retained
        }
    }
}

/// The blending algorithm; stateless.
pub struct ReallocationEngine;

impl ReallocationEngine {
    /// Blend `will` with `intents`.
    ///
    /// `intent_match` is recorded but does not influence the weights.
    pub fn reallocate(
        will: &[Beneficiary],
        intents: &[SocialBeneficiary],
        intent_match: f64,
    ) -> ReallocationOutcome {
        let mut drafts: Vec<Draft> = will
            .iter()
            .map(|b| Draft {
                name: b.name.clone(),
                address: b.address,
                original: b.percentage,
                base: b.percentage * WILL_WEIGHT,
                social: 0.0,
                removed: false,
                social_only: false,
            })
            .collect();
        let mut log = Vec::new();

        for intent in intents {
            let existing = will.iter().position(|b| intent.refers_to(b));
            match (existing, intent.action) {
                (Some(i), IntentAction::Remove) => drafts[i].removed = true,
                (Some(i), IntentAction::Add | IntentAction::Adjust) => {
                    drafts[i].social += intent.percentage * SOCIAL_WEIGHT;
                }
                (None, IntentAction::Add) => match intent.address {
                    Some(address) => {
                        let contribution = intent.percentage * SOCIAL_WEIGHT;
                        match drafts
                            .iter_mut()
                            .find(|d| d.social_only && d.address == address)
                        {
                            Some(draft) => draft.social += contribution,
                            None => drafts.push(Draft {
                                name: intent.name.clone(),
                                address,
                                original: 0.0,
                                base: 0.0,
                                social: contribution,
                                removed: false,
                                social_only: true,
                            }),
                        }
                    }
                    None => {
                        debug!(name = %intent.name, "Skipping social beneficiary without address");
                        log.push(skipped(intent, "no ledger address to pay"));
                    }
                },
                (None, _) => {
                    log.push(skipped(intent, "not a beneficiary of this will"));
                }
            }
        }

        for draft in drafts.iter_mut().filter(|d| d.social_only) {
            draft.social = draft.social.min(SOCIAL_SHARE_CAP);
        }

        let social_total: f64 = drafts.iter().map(|d| d.social).sum();
        let social_bound = SOCIAL_WEIGHT * 100.0;
        if social_total > social_bound {
            let factor = social_bound / social_total;
            for draft in drafts.iter_mut() {
                draft.social *= factor;
            }
        }

        let shares: Vec<f64> = drafts.iter().map(Draft::share).collect();
        let capped: Vec<bool> = drafts.iter().map(|d| d.social_only).collect();
        let floors: Vec<f64> = drafts.iter().map(Draft::floor).collect();
        let normalized = normalize_bounded(&shares, &capped, &floors);

        let mut adjusted = Vec::with_capacity(drafts.len());
        let mut entries = Vec::with_capacity(drafts.len() + log.len());
        for (draft, percentage) in drafts.iter().zip(normalized) {
            adjusted.push(Beneficiary::new(draft.address, percentage, draft.name.clone()));
            entries.push(AdjustmentEntry {
                name: draft.name.clone(),
                address: Some(draft.address),
                kind: draft.kind(),
                original_percentage: draft.original,
                adjusted_percentage: percentage,
                detail: describe(draft),
            });
        }
        entries.extend(log);

        let recommendation = Recommendation::for_social_weight(SOCIAL_WEIGHT);
        info!(
            beneficiaries = adjusted.len(),
            intents = intents.len(),
            intent_match,
            ?recommendation,
            "Reallocated will"
        );

        ReallocationOutcome {
            adjusted,
            will_weight: WILL_WEIGHT,
            social_weight: SOCIAL_WEIGHT,
            intent_match,
            adjustment_log: entries,
            recommendation,
        }
    }
}

fn skipped(intent: &SocialBeneficiary, detail: &str) -> AdjustmentEntry {
    AdjustmentEntry {
        name: intent.name.clone(),
        address: intent.address,
        kind: AdjustmentKind::Skipped,
        original_percentage: 0.0,
        adjusted_percentage: 0.0,
        detail: format!("{:?} ignored: {}", intent.action, detail),
    }
}

fn describe(draft: &Draft) -> String {
    match draft.kind() {
        AdjustmentKind::Added => format!("social-only share {:.2}", draft.social),
        AdjustmentKind::Reduced => format!(
            "removal requested, base {:.2} halved, social {:.2}",
            draft.base, draft.social
        ),
        AdjustmentKind::Blended => format!("base {:.2} plus social {:.2}", draft.base, draft.social),
        _ => format!("base {:.2}", draft.base),
    }
}

/// Largest-remainder normalization to one decimal place.
///
/// Shares are scaled to sum to 100, truncated to tenths, and the residual is
/// assigned to the largest share. A list already summing to 100 in tenths
/// comes back unchanged.
pub fn normalize(shares: &[f64]) -> Vec<f64> {
    normalize_bounded(shares, &[], &[])
}

/// [`normalize`], with `capped` entries held at or below [`SOCIAL_SHARE_CAP`]
/// and every entry kept at or above its entry in `floors`.
///
/// The excess of a clamped entry is spread proportionally over the entries
/// not clamped, and the residual tenths never go to a capped entry while an
/// uncapped one exists. A positive floor is rounded up to the next tenth, so
/// truncation never takes an entry with a floor down to 0.0. Missing
/// `capped` or `floors` entries mean uncapped and no floor.
pub fn normalize_bounded(shares: &[f64], capped: &[bool], floors: &[f64]) -> Vec<f64> {
    let n = shares.len();
    if n == 0 {
        return Vec::new();
    }
    let is_capped = |i: usize| capped.get(i).copied().unwrap_or(false);
    let floor_tenths = |i: usize| match floors.get(i) {
        Some(f) if f.is_finite() && *f > 0.0 => (f * 10.0 - 1e-9).ceil() as i64,
        _ => 0,
    };

    let clean: Vec<f64> = shares
        .iter()
        .map(|s| if s.is_finite() && *s > 0.0 { *s } else { 0.0 })
        .collect();
    let total: f64 = clean.iter().sum();

    let mut scaled: Vec<f64> = if total > 0.0 {
        clean.iter().map(|s| s * 100.0 / total).collect()
    } else {
        vec![100.0 / n as f64; n]
    };

    let mut clamped = vec![false; n];
    loop {
        let mut excess = 0.0;
        for i in 0..n {
            if is_capped(i) && !clamped[i] && scaled[i] > SOCIAL_SHARE_CAP {
                excess += scaled[i] - SOCIAL_SHARE_CAP;
                scaled[i] = SOCIAL_SHARE_CAP;
                clamped[i] = true;
            }
        }
        if excess <= 0.0 {
            break;
        }

        let free: f64 = (0..n).filter(|&i| !clamped[i]).map(|i| scaled[i]).sum();
        if free <= 0.0 {
            break;
        }
        for i in (0..n).filter(|&i| !clamped[i]) {
            scaled[i] += excess * scaled[i] / free;
        }
    }

    let mut tenths: Vec<i64> = scaled
        .iter()
        .map(|s| (s * 10.0 + 1e-9).floor() as i64)
        .collect();
    for (i, t) in tenths.iter_mut().enumerate() {
        *t = (*t).max(floor_tenths(i));
    }
    let mut residual = TENTHS_TOTAL - tenths.iter().sum::<i64>();

    // Tenths lifted onto floors come out of the largest shares with room left
    while residual < 0 {
        let values: Vec<f64> = tenths.iter().map(|&t| t as f64).collect();
        let Some(i) = largest(&values, |i| tenths[i] > floor_tenths(i)) else {
            break;
        };
        tenths[i] -= 1;
        residual += 1;
    }

    let target = largest(&scaled, |i| !is_capped(i)).or_else(|| largest(&scaled, |_| true));
    if let Some(i) = target {
        tenths[i] += residual;
    }

    tenths.into_iter().map(|t| t as f64 / 10.0).collect()
}

/// Index of the first largest value among indices passing `eligible`.
fn largest(values: &[f64], eligible: impl Fn(usize) -> bool) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, value) in values.iter().enumerate() {
        if !eligible(i) {
            continue;
        }
        match best {
            Some(b) if values[b] >= *value => {}
            _ => best = Some(i),
        }
    }
    best
}
