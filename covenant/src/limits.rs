//! Spending limiter.
//!
//! Per-transfer and per-day caps, shared by every source wallet of a will.
//! The daily counter resets lazily: only the calendar-date comparison at check
//! time matters, so a will idle for N days does not owe N resets.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::SpendingLimits;

/// Why a transfer was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LimitRejection {
    /// Single transfer above the per-transaction cap
    #[error("Amount {amount} exceeds per-transaction limit {limit}")]
    PerTransaction { amount: u128, limit: u128 },

    /// Transfer would push the day's total over the daily cap
    #[error("Amount {amount} would exceed daily limit {limit} ({spent} already spent today)")]
    Daily {
        amount: u128,
        spent: u128,
        limit: u128,
    },
}

/// Check-then-commit spend accounting over a will's [`SpendingLimits`].
///
/// Callers serialize check/commit per will; see the executor's will locks.
pub struct SpendingLimiter;

impl SpendingLimiter {
    /// Reset the daily counter if `today` is a different calendar date.
    ///
    /// Returns `true` if a reset happened.
    pub fn roll_over(limits: &mut SpendingLimits, today: NaiveDate) -> bool {
        if limits.last_reset_date != today {
            limits.daily_spent = 0;
            limits.last_reset_date = today;
            true
        } else {
            false
        }
    }

    /// Decide whether `amount` may be sent now.
    ///
    /// Performs the lazy daily reset first. Never adds to `daily_spent`; that
    /// only happens in [`SpendingLimiter::commit`] once a transfer confirms.
    pub fn check(
        limits: &mut SpendingLimits,
        amount: u128,
        today: NaiveDate,
    ) -> Result<(), LimitRejection> {
        Self::roll_over(limits, today);

        if amount > limits.per_tx_limit {
            return Err(LimitRejection::PerTransaction {
                amount,
                limit: limits.per_tx_limit,
            });
        }

        let over_daily = match limits.daily_spent.checked_add(amount) {
            Some(total) => total > limits.daily_limit,
            None => true,
        };
        if over_daily {
            return Err(LimitRejection::Daily {
                amount,
                spent: limits.daily_spent,
                limit: limits.daily_limit,
            });
        }

        Ok(())
    }

    /// Record a confirmed transfer.
    pub fn commit(limits: &mut SpendingLimits, amount: u128) {
        limits.daily_spent = limits.daily_spent.saturating_add(amount);
    }

    /// Amount still available today (after any pending reset).
    pub fn remaining_today(limits: &SpendingLimits, today: NaiveDate) -> u128 {
        if limits.last_reset_date != today {
            limits.daily_limit
        } else {
            limits.daily_limit.saturating_sub(limits.daily_spent)
        }
    }
}
