//! Loan record and balance engine.
//!
//! The running `balance` column is maintained transactionally by the payment
//! ledger (see `payments.rs`). `calculate_balance` is the independent
//! reporting view: it recomputes from principal, simple full-term interest
//! and the completed-payment ledger. The two views use different interest
//! models and diverge once payments exist; both are preserved on purpose
//! (see DESIGN.md).

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::amortization::{self, level_payment_terms};
use crate::applications::LoanApplication;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::money::{Money, Rate};
use crate::numbering;
use crate::store::{self, LedgerStore};
use crate::types::{EntityId, LoanStatus, Paged, PaymentFrequency};

#[derive(Debug, Clone)]
pub struct Loan {
    pub loan_id: EntityId,
    pub loan_number: String,
    pub application_id: Option<EntityId>,
    pub customer_id: EntityId,
    pub loan_type_id: EntityId,
    pub branch_id: Option<EntityId>,
    pub principal_amount: Money,
    /// Frozen at creation; later loan type edits never reach a running loan.
    pub interest_rate: Rate,
    pub term_months: u32,
    pub monthly_payment: Money,
    pub total_payment: Money,
    pub total_interest: Money,
    pub balance: Money,
    pub disbursement_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<EntityId>,
    pub status_comments: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Administrative creation of a loan without an application behind it.
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub customer_id: EntityId,
    pub loan_type_id: EntityId,
    pub branch_id: Option<EntityId>,
    pub principal_amount: Money,
    pub term_months: u32,
}

/// Administrative field update. Loan number, customer and loan type are
/// immutable; balance and status move only through their own operations.
#[derive(Debug, Clone, Default)]
pub struct LoanUpdate {
    pub branch_id: Option<EntityId>,
    pub due_date: Option<DateTime<Utc>>,
    pub status_comments: Option<String>,
}

/// The reporting view produced by `calculate_balance`.
#[derive(Debug, Clone)]
pub struct LoanBalanceSummary {
    pub principal_amount: Money,
    pub interest_rate: Rate,
    pub term_months: u32,
    /// Principal plus simple full-term interest.
    pub total_amount: Money,
    /// Sum of completed payment amounts.
    pub total_payments: Money,
    pub balance: Money,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub next_payment_due: Option<DateTime<Utc>>,
}

pub struct LoanService<'a> {
    store: &'a LedgerStore,
    config: &'a LedgerConfig,
}

impl<'a> LoanService<'a> {
    pub(crate) fn new(store: &'a LedgerStore, config: &'a LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Create a loan directly, without an application. The loan starts
    /// `pending` and undisbursed, so its balance is zero until activation.
    pub fn create(&self, new: NewLoan) -> LedgerResult<Loan> {
        let conn = self.store.conn();

        let loan_type = store::loan_type::by_id(conn, &new.loan_type_id, false)?
            .ok_or_else(|| LedgerError::not_found("loan type", &new.loan_type_id))?;
        if !store::customer_exists(conn, &new.customer_id)? {
            return Err(LedgerError::not_found("customer", &new.customer_id));
        }
        if let Some(branch_id) = &new.branch_id {
            if !store::branch_exists(conn, branch_id)? {
                return Err(LedgerError::not_found("branch", branch_id));
            }
        }

        let terms = level_payment_terms(new.principal_amount, loan_type.interest_rate, new.term_months)?;
        let mut loan = Loan {
            loan_id: Uuid::new_v4().to_string(),
            loan_number: String::new(),
            application_id: None,
            customer_id: new.customer_id,
            loan_type_id: new.loan_type_id,
            branch_id: new.branch_id,
            principal_amount: new.principal_amount,
            interest_rate: loan_type.interest_rate,
            term_months: new.term_months,
            monthly_payment: terms.monthly_payment,
            total_payment: terms.total_payment,
            total_interest: terms.total_interest,
            balance: Money::ZERO,
            disbursement_date: None,
            due_date: None,
            last_payment_date: None,
            status: LoanStatus::Pending,
            status_updated_at: None,
            updated_by: None,
            status_comments: None,
            created_at: Utc::now(),
            deleted_at: None,
        };
        insert_with_fresh_number(conn, self.config, &mut loan)?;
        log::info!("loan {} created (pending) for customer {}", loan.loan_number, loan.customer_id);
        Ok(loan)
    }

    pub fn get(&self, id: &str) -> LedgerResult<Loan> {
        store::loan::by_id(self.store.conn(), id, false)?
            .ok_or_else(|| LedgerError::not_found("loan", id))
    }

    pub fn get_by_number(&self, loan_number: &str) -> LedgerResult<Loan> {
        store::loan::by_number(self.store.conn(), loan_number)?
            .ok_or_else(|| LedgerError::not_found("loan", loan_number))
    }

    pub fn get_by_application(&self, application_id: &str) -> LedgerResult<Loan> {
        store::loan::by_application(self.store.conn(), application_id)?
            .ok_or_else(|| LedgerError::not_found("loan for application", application_id))
    }

    pub fn by_customer(&self, customer_id: &str) -> LedgerResult<Vec<Loan>> {
        store::loan::list_by_customer(self.store.conn(), customer_id)
    }

    /// Paginated listing, optionally filtered by status, newest first.
    pub fn list(
        &self,
        status: Option<LoanStatus>,
        page: u32,
        limit: Option<u32>,
    ) -> LedgerResult<Paged<Loan>> {
        let limit = limit.unwrap_or(self.config.default_page_limit).max(1);
        let page = page.max(1);
        let conn = self.store.conn();
        let total = store::loan::count(conn, status)? as u64;
        let items = store::loan::list(conn, status, limit, (page - 1) * limit)?;
        Ok(Paged {
            items,
            total,
            page,
            limit,
        })
    }

    pub fn update(&self, id: &str, update: LoanUpdate) -> LedgerResult<Loan> {
        let conn = self.store.conn();
        let mut loan = store::loan::by_id(conn, id, false)?
            .ok_or_else(|| LedgerError::not_found("loan", id))?;

        if let Some(branch_id) = update.branch_id {
            if !store::branch_exists(conn, &branch_id)? {
                return Err(LedgerError::not_found("branch", &branch_id));
            }
            loan.branch_id = Some(branch_id);
        }
        if let Some(due_date) = update.due_date {
            loan.due_date = Some(due_date);
        }
        if let Some(comments) = update.status_comments {
            loan.status_comments = Some(comments);
        }
        store::loan::update_row(conn, &loan)?;
        Ok(loan)
    }

    /// Administrative status override. No domain restriction beyond the loan
    /// existing; payment-driven transitions live in the payment ledger.
    /// Activating a never-disbursed loan disburses it: balance becomes the
    /// principal and the first due date is one period out.
    pub fn update_status(
        &self,
        id: &str,
        status: LoanStatus,
        updated_by: &str,
        comments: Option<&str>,
    ) -> LedgerResult<Loan> {
        self.store.exclusive_tx(self.config.busy_retries, |tx| {
            let mut loan = store::loan::by_id(tx, id, false)?
                .ok_or_else(|| LedgerError::not_found("loan", id))?;

            if status == LoanStatus::Active && loan.disbursement_date.is_none() {
                let loan_type = store::loan_type::by_id(tx, &loan.loan_type_id, true)?
                    .ok_or_else(|| LedgerError::not_found("loan type", &loan.loan_type_id))?;
                let now = Utc::now();
                loan.disbursement_date = Some(now);
                loan.due_date = Some(amortization::next_due_date(now, loan_type.payment_frequency));
                loan.balance = loan.principal_amount;
            }

            loan.status = status;
            loan.status_updated_at = Some(Utc::now());
            loan.updated_by = Some(updated_by.to_string());
            loan.status_comments = comments.map(str::to_string);
            store::loan::update_row(tx, &loan)?;
            log::info!("loan {} status set to {} by {}", loan.loan_number, status, updated_by);
            Ok(loan)
        })
    }

    /// Recompute the reporting balance independently of the stored column.
    pub fn calculate_balance(&self, id: &str) -> LedgerResult<LoanBalanceSummary> {
        let conn = self.store.conn();
        let loan = store::loan::by_id(conn, id, false)?
            .ok_or_else(|| LedgerError::not_found("loan", id))?;

        let completed = store::payment::completed_amounts(conn, id)?;
        let total_payments = completed
            .iter()
            .fold(Money::ZERO, |acc, amount| acc + *amount);
        let last_payment_date = store::payment::last_completed_date(conn, id)?;

        // Simple (non-amortizing) interest over the whole term:
        // P * annual_rate * term / 12.
        let interest = Money::new(
            loan.principal_amount.as_decimal()
                * loan.interest_rate.as_fraction()
                * Decimal::from(loan.term_months)
                / Decimal::from(12),
        );
        let total_amount = loan.principal_amount + interest;

        let next_payment_due = match last_payment_date {
            Some(last) => Some(amortization::next_due_date(last, PaymentFrequency::Monthly)),
            None => loan.due_date,
        };

        Ok(LoanBalanceSummary {
            principal_amount: loan.principal_amount,
            interest_rate: loan.interest_rate,
            term_months: loan.term_months,
            total_amount,
            total_payments,
            balance: total_amount - total_payments,
            last_payment_date,
            next_payment_due,
        })
    }

    /// Soft delete; an active loan cannot be deleted.
    pub fn delete(&self, id: &str) -> LedgerResult<()> {
        let conn = self.store.conn();
        let loan = store::loan::by_id(conn, id, false)?
            .ok_or_else(|| LedgerError::not_found("loan", id))?;

        if loan.status == LoanStatus::Active {
            return Err(LedgerError::invalid_state(
                "loan",
                loan.status.as_str(),
                "delete",
            ));
        }

        store::loan::soft_delete(conn, id, Utc::now())?;
        Ok(())
    }

    pub fn restore(&self, id: &str) -> LedgerResult<Loan> {
        let conn = self.store.conn();
        let loan = store::loan::by_id(conn, id, true)?
            .ok_or_else(|| LedgerError::not_found("loan", id))?;
        if loan.deleted_at.is_none() {
            return Err(LedgerError::validation("loan is not deleted"));
        }
        store::loan::restore_row(conn, id)?;
        store::loan::by_id(conn, id, false)?.ok_or_else(|| LedgerError::not_found("loan", id))
    }
}

/// Build the loan for an approved application. Runs inside the decision's
/// transaction: any failure here rolls the whole decision back.
pub(crate) fn create_from_application(
    conn: &Connection,
    config: &LedgerConfig,
    application: &LoanApplication,
) -> LedgerResult<Loan> {
    let loan_type = store::loan_type::by_id(conn, &application.loan_type_id, false)?
        .ok_or_else(|| LedgerError::not_found("loan type", &application.loan_type_id))?;

    let terms = level_payment_terms(
        application.principal_amount,
        loan_type.interest_rate,
        application.term_months,
    )?;

    let now = Utc::now();
    let mut loan = Loan {
        loan_id: Uuid::new_v4().to_string(),
        loan_number: String::new(),
        application_id: Some(application.application_id.clone()),
        customer_id: application.customer_id.clone(),
        loan_type_id: application.loan_type_id.clone(),
        branch_id: application.branch_id.clone(),
        principal_amount: application.principal_amount,
        interest_rate: loan_type.interest_rate,
        term_months: application.term_months,
        monthly_payment: terms.monthly_payment,
        total_payment: terms.total_payment,
        total_interest: terms.total_interest,
        balance: application.principal_amount,
        disbursement_date: Some(now),
        due_date: Some(amortization::next_due_date(now, loan_type.payment_frequency)),
        last_payment_date: None,
        status: LoanStatus::Active,
        status_updated_at: None,
        updated_by: None,
        status_comments: None,
        created_at: now,
        deleted_at: None,
    };
    insert_with_fresh_number(conn, config, &mut loan)?;
    Ok(loan)
}

/// Insert, regenerating the loan number on a unique-constraint collision.
/// A duplicate application link is also a constraint violation but never a
/// number problem, so it surfaces as a Conflict immediately.
fn insert_with_fresh_number(
    conn: &Connection,
    config: &LedgerConfig,
    loan: &mut Loan,
) -> LedgerResult<()> {
    let mut attempts = config.number_attempts;
    loop {
        loan.loan_number = numbering::document_number(config.loan_prefix, Utc::now());
        match store::loan::insert(conn, loan) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_unique_violation() => {
                if loan.application_id.is_some()
                    && store::loan::by_application(
                        conn,
                        loan.application_id.as_deref().unwrap_or_default(),
                    )?
                    .is_some()
                {
                    return Err(LedgerError::conflict(format!(
                        "application '{}' already has a loan",
                        loan.application_id.as_deref().unwrap_or_default()
                    )));
                }
                if attempts > 1 {
                    attempts -= 1;
                    log::debug!("loan number collision, regenerating ({attempts} attempts left)");
                    continue;
                }
                return Err(LedgerError::conflict(
                    "could not generate a unique loan number",
                ));
            }
            Err(e) => return Err(e),
        }
    }
}
