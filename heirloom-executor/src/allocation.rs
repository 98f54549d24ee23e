//! Amount and limit decisions, free of side effects.
//!
//! Percentages are rounded to tenths once, then all arithmetic is integer:
//! `amount = floor(distributable × tenths / 1000)`.

use chrono::NaiveDate;
use covenant::{LimitRejection, SpendingLimiter, SpendingLimits};

/// A percentage in integer tenths, clamped to 0..=1000.
pub fn percentage_tenths(percentage: f64) -> u128 {
    if !percentage.is_finite() || percentage <= 0.0 {
        return 0;
    }
    let tenths = (percentage * 10.0).round();
    if tenths >= 1000.0 {
        1000
    } else {
        tenths as u128
    }
}

/// Share of `distributable` for `percentage`, rounded down.
pub fn allocate(distributable: u128, percentage: f64) -> u128 {
    let tenths = percentage_tenths(percentage);
    // Split to keep the product inside u128
    (distributable / 1000) * tenths + (distributable % 1000) * tenths / 1000
}

/// What to do for one beneficiary of one wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferDecision {
    /// Nothing to send
    Skip,
    /// Refused by the spending limiter
    Reject { amount: u128, rejection: LimitRejection },
    /// Send this amount
    Submit(u128),
}

/// Decide the transfer for one beneficiary.
///
/// Applies the limiter's lazy date reset to `limits`, but never spends.
pub fn decide(
    limits: &mut SpendingLimits,
    distributable: u128,
    percentage: f64,
    today: NaiveDate,
) -> TransferDecision {
    let amount = allocate(distributable, percentage);
    if amount == 0 {
        return TransferDecision::Skip;
    }
    match SpendingLimiter::check(limits, amount, today) {
        Ok(()) => TransferDecision::Submit(amount),
        Err(rejection) => TransferDecision::Reject { amount, rejection },
    }
}
