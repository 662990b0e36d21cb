//! Level-payment amortization math.
//!
//! The annuity formula `P * r * (1+r)^n / ((1+r)^n - 1)` on exact decimals.
//! Only the headline figures are computed here; the engine does not persist
//! a per-period schedule.

use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;

use crate::error::{LedgerError, LedgerResult};
use crate::money::{Money, Rate};
use crate::types::PaymentFrequency;

/// Headline figures for a level-payment loan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmortizedTerms {
    pub monthly_payment: Money,
    pub total_payment: Money,
    pub total_interest: Money,
}

/// Compute the level monthly installment and derived totals.
///
/// Degenerate zero-rate case: the installment is `P / n`.
pub fn level_payment_terms(
    principal: Money,
    annual_rate: Rate,
    term_months: u32,
) -> LedgerResult<AmortizedTerms> {
    if term_months == 0 {
        return Err(LedgerError::validation("loan term must be at least 1 month"));
    }
    if !principal.is_positive() {
        return Err(LedgerError::validation(format!(
            "principal must be positive, got {principal}"
        )));
    }

    let p = principal.as_decimal();
    let n = Decimal::from(term_months);
    let r = annual_rate.monthly_fraction();

    let raw_monthly = if r.is_zero() {
        p / n
    } else {
        // (1 + r)^n by repeated multiplication; Decimal has no integer pow
        // that preserves exactness for our scale.
        let mut compound = Decimal::ONE;
        let base = Decimal::ONE + r;
        for _ in 0..term_months {
            compound *= base;
        }
        p * r * compound / (compound - Decimal::ONE)
    };

    let raw_total = raw_monthly * n;
    Ok(AmortizedTerms {
        monthly_payment: Money::new(raw_monthly),
        total_payment: Money::new(raw_total),
        total_interest: Money::new(raw_total - p),
    })
}

/// The next payment due date, one period after `from`.
pub fn next_due_date(from: DateTime<Utc>, frequency: PaymentFrequency) -> DateTime<Utc> {
    match frequency {
        PaymentFrequency::Weekly => from + Duration::weeks(1),
        PaymentFrequency::Biweekly => from + Duration::weeks(2),
        PaymentFrequency::Monthly => add_months(from, 1),
        PaymentFrequency::Quarterly => add_months(from, 3),
        PaymentFrequency::Annually => add_months(from, 12),
    }
}

/// Calendar-month stepping; clamps to the last day of shorter months.
pub fn add_months(from: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    from.checked_add_months(Months::new(months)).unwrap_or(from)
}
