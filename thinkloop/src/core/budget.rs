//! Daily token budget governor.

use chrono::NaiveDate;

use crate::core::types::BudgetRecord;

/// Return the record for `today`, resetting the counter when the day changed.
///
/// An absent record starts a fresh day.
pub fn roll_over(record: Option<BudgetRecord>, today: NaiveDate) -> BudgetRecord {
    match record {
        Some(record) if record.date == today => record,
        _ => BudgetRecord {
            date: today,
            tokens_used: 0,
        },
    }
}

pub fn is_exhausted(record: &BudgetRecord, daily_limit: u64) -> bool {
    record.tokens_used >= daily_limit
}

pub fn charge(record: &mut BudgetRecord, cost: u64) {
    record.tokens_used = record.tokens_used.saturating_add(cost);
}

/// Rough cost when the oracle does not report usage: four characters per token.
pub fn estimate_tokens(prompt_chars: usize, reply_chars: usize) -> u64 {
    (prompt_chars + reply_chars).div_ceil(4) as u64
}
