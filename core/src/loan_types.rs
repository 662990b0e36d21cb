//! Loan type registry.
//!
//! A loan type is the product template every application and loan must
//! satisfy: rate, amount bounds, term bounds, payment frequency. Bounds are
//! enforced at application time; the rate is frozen onto the loan at
//! approval, so later edits here never touch running loans.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::money::{Money, Rate};
use crate::store::{self, LedgerStore};
use crate::types::{EntityId, PaymentFrequency};

#[derive(Debug, Clone)]
pub struct LoanType {
    pub loan_type_id: EntityId,
    pub name: String,
    pub interest_rate: Rate,
    pub min_amount: Money,
    pub max_amount: Money,
    pub min_term_months: u32,
    pub max_term_months: u32,
    pub payment_frequency: PaymentFrequency,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewLoanType {
    pub name: String,
    pub interest_rate: Rate,
    pub min_amount: Money,
    pub max_amount: Money,
    pub min_term_months: u32,
    pub max_term_months: u32,
    pub payment_frequency: PaymentFrequency,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct LoanTypePatch {
    pub name: Option<String>,
    pub interest_rate: Option<Rate>,
    pub min_amount: Option<Money>,
    pub max_amount: Option<Money>,
    pub min_term_months: Option<u32>,
    pub max_term_months: Option<u32>,
    pub payment_frequency: Option<PaymentFrequency>,
    pub is_active: Option<bool>,
}

/// Per-activity-flag aggregate for reporting.
#[derive(Debug, Clone)]
pub struct LoanTypeStats {
    pub is_active: bool,
    pub count: usize,
    pub avg_interest_rate: Rate,
}

pub struct LoanTypeService<'a> {
    store: &'a LedgerStore,
    #[allow(dead_code)]
    config: &'a LedgerConfig,
}

impl<'a> LoanTypeService<'a> {
    pub(crate) fn new(store: &'a LedgerStore, config: &'a LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn create(&self, new: NewLoanType) -> LedgerResult<LoanType> {
        validate_rules(
            new.interest_rate,
            new.min_amount,
            new.max_amount,
            new.min_term_months,
            new.max_term_months,
        )?;

        let conn = self.store.conn();
        // name uniqueness spans soft-deleted rows too
        if store::loan_type::name_taken(conn, &new.name, None)? {
            return Err(LedgerError::conflict(format!(
                "loan type '{}' already exists",
                new.name
            )));
        }

        let loan_type = LoanType {
            loan_type_id: Uuid::new_v4().to_string(),
            name: new.name,
            interest_rate: new.interest_rate,
            min_amount: new.min_amount,
            max_amount: new.max_amount,
            min_term_months: new.min_term_months,
            max_term_months: new.max_term_months,
            payment_frequency: new.payment_frequency,
            is_active: true,
            created_at: Utc::now(),
            deleted_at: None,
        };
        store::loan_type::insert(conn, &loan_type)?;
        log::info!("loan type created: {} ({})", loan_type.name, loan_type.loan_type_id);
        Ok(loan_type)
    }

    pub fn get(&self, id: &str) -> LedgerResult<LoanType> {
        store::loan_type::by_id(self.store.conn(), id, false)?
            .ok_or_else(|| LedgerError::not_found("loan type", id))
    }

    /// Active, non-deleted types ordered by name.
    pub fn list_active(&self) -> LedgerResult<Vec<LoanType>> {
        store::loan_type::list_active(self.store.conn())
    }

    pub fn update(&self, id: &str, patch: LoanTypePatch) -> LedgerResult<LoanType> {
        let conn = self.store.conn();
        let mut loan_type = store::loan_type::by_id(conn, id, false)?
            .ok_or_else(|| LedgerError::not_found("loan type", id))?;

        if let Some(name) = &patch.name {
            if name != &loan_type.name && store::loan_type::name_taken(conn, name, Some(id))? {
                return Err(LedgerError::conflict(format!(
                    "loan type '{name}' already exists"
                )));
            }
            loan_type.name = name.clone();
        }
        if let Some(rate) = patch.interest_rate {
            loan_type.interest_rate = rate;
        }
        if let Some(min) = patch.min_amount {
            loan_type.min_amount = min;
        }
        if let Some(max) = patch.max_amount {
            loan_type.max_amount = max;
        }
        if let Some(min) = patch.min_term_months {
            loan_type.min_term_months = min;
        }
        if let Some(max) = patch.max_term_months {
            loan_type.max_term_months = max;
        }
        if let Some(freq) = patch.payment_frequency {
            loan_type.payment_frequency = freq;
        }
        if let Some(active) = patch.is_active {
            loan_type.is_active = active;
        }

        validate_rules(
            loan_type.interest_rate,
            loan_type.min_amount,
            loan_type.max_amount,
            loan_type.min_term_months,
            loan_type.max_term_months,
        )?;

        store::loan_type::update_row(conn, &loan_type)?;
        Ok(loan_type)
    }

    /// Soft delete. Refused while any non-terminal loan references the type.
    pub fn delete(&self, id: &str) -> LedgerResult<()> {
        let conn = self.store.conn();
        let loan_type = store::loan_type::by_id(conn, id, false)?
            .ok_or_else(|| LedgerError::not_found("loan type", id))?;

        let open_loans = store::loan_type::non_terminal_loan_count(conn, id)?;
        if open_loans > 0 {
            return Err(LedgerError::validation(format!(
                "cannot delete loan type '{}': {open_loans} open loan(s) reference it",
                loan_type.name
            )));
        }

        store::loan_type::soft_delete(conn, id, Utc::now())?;
        log::info!("loan type deleted: {}", loan_type.name);
        Ok(())
    }

    pub fn restore(&self, id: &str) -> LedgerResult<LoanType> {
        let conn = self.store.conn();
        let loan_type = store::loan_type::by_id(conn, id, true)?
            .ok_or_else(|| LedgerError::not_found("loan type", id))?;
        if loan_type.deleted_at.is_none() {
            return Err(LedgerError::validation("loan type is not deleted"));
        }
        store::loan_type::restore_row(conn, id)?;
        store::loan_type::by_id(conn, id, false)?
            .ok_or_else(|| LedgerError::not_found("loan type", id))
    }

    /// Counts and average rate split by activity flag.
    pub fn stats(&self) -> LedgerResult<Vec<LoanTypeStats>> {
        let all = store::loan_type::list_all(self.store.conn())?;
        let mut out = Vec::new();
        for flag in [true, false] {
            let group: Vec<_> = all.iter().filter(|t| t.is_active == flag).collect();
            if group.is_empty() {
                continue;
            }
            let sum: Decimal = group
                .iter()
                .map(|t| t.interest_rate.as_percent())
                .sum();
            out.push(LoanTypeStats {
                is_active: flag,
                count: group.len(),
                avg_interest_rate: Rate::from_percent(sum / Decimal::from(group.len() as u64)),
            });
        }
        Ok(out)
    }
}

fn validate_rules(
    rate: Rate,
    min_amount: Money,
    max_amount: Money,
    min_term: u32,
    max_term: u32,
) -> LedgerResult<()> {
    let pct = rate.as_percent();
    if pct < Decimal::ZERO || pct > Decimal::from(100) {
        return Err(LedgerError::validation(format!(
            "interest rate must be within [0, 100], got {rate}"
        )));
    }
    if min_term > max_term {
        return Err(LedgerError::validation(format!(
            "minimum term {min_term} cannot exceed maximum term {max_term}"
        )));
    }
    if min_amount > max_amount {
        return Err(LedgerError::validation(format!(
            "minimum amount {min_amount} cannot exceed maximum amount {max_amount}"
        )));
    }
    if min_amount.is_negative() {
        return Err(LedgerError::validation(format!(
            "minimum amount cannot be negative, got {min_amount}"
        )));
    }
    Ok(())
}
