//! Loan application state machine.
//!
//! pending -> {approved, rejected, cancelled}. The pending state is the only
//! mutable one; a decision is terminal and appends to the application's
//! decision history. Approval creates exactly one loan inside the same
//! transaction — an application can never end up approved without its loan.

use chrono::{DateTime, Utc};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::loans::{self, Loan};
use crate::money::Money;
use crate::numbering;
use crate::store::{self, LedgerStore};
use crate::types::{ApplicationStatus, Decision, EntityId};

#[derive(Debug, Clone)]
pub struct LoanApplication {
    pub application_id: EntityId,
    pub application_number: String,
    pub customer_id: EntityId,
    pub loan_type_id: EntityId,
    pub branch_id: Option<EntityId>,
    pub principal_amount: Money,
    pub term_months: u32,
    pub purpose: Option<String>,
    pub status: ApplicationStatus,
    pub decision_history: Vec<Decision>,
    pub final_decision: Option<ApplicationStatus>,
    pub final_decision_at: Option<DateTime<Utc>>,
    pub decision_by: Option<EntityId>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewApplication {
    pub customer_id: EntityId,
    pub loan_type_id: EntityId,
    pub branch_id: Option<EntityId>,
    pub principal_amount: Money,
    pub term_months: u32,
    pub purpose: Option<String>,
}

/// Full-field overwrite of the mutable part of a pending application.
#[derive(Debug, Clone)]
pub struct ApplicationUpdate {
    pub principal_amount: Money,
    pub term_months: u32,
    pub purpose: Option<String>,
}

/// Result of a decision; `loan` is present exactly when the decision
/// was an approval.
#[derive(Debug)]
pub struct DecisionOutcome {
    pub application: LoanApplication,
    pub loan: Option<Loan>,
}

pub struct ApplicationService<'a> {
    store: &'a LedgerStore,
    config: &'a LedgerConfig,
}

impl<'a> ApplicationService<'a> {
    pub(crate) fn new(store: &'a LedgerStore, config: &'a LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn create(&self, new: NewApplication) -> LedgerResult<LoanApplication> {
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

        check_bounds(&loan_type, new.principal_amount, new.term_months)?;

        let mut application = LoanApplication {
            application_id: uuid::Uuid::new_v4().to_string(),
            application_number: String::new(),
            customer_id: new.customer_id,
            loan_type_id: new.loan_type_id,
            branch_id: new.branch_id,
            principal_amount: new.principal_amount,
            term_months: new.term_months,
            purpose: new.purpose,
            status: ApplicationStatus::Pending,
            decision_history: Vec::new(),
            final_decision: None,
            final_decision_at: None,
            decision_by: None,
            created_at: Utc::now(),
            deleted_at: None,
        };

        // The random suffix can collide on a busy day; the unique constraint
        // catches it and we roll a fresh number.
        let mut attempts = self.config.number_attempts;
        loop {
            application.application_number =
                numbering::document_number(self.config.application_prefix, Utc::now());
            match store::application::insert(conn, &application) {
                Ok(()) => break,
                Err(e) if e.is_unique_violation() && attempts > 1 => {
                    attempts -= 1;
                    log::debug!(
                        "application number collision, regenerating ({attempts} attempts left)"
                    );
                }
                Err(e) if e.is_unique_violation() => {
                    return Err(LedgerError::conflict(
                        "could not generate a unique application number",
                    ));
                }
                Err(e) => return Err(e),
            }
        }

        log::info!(
            "application {} created for customer {} ({} over {} months)",
            application.application_number,
            application.customer_id,
            application.principal_amount,
            application.term_months
        );
        Ok(application)
    }

    pub fn get(&self, id: &str) -> LedgerResult<LoanApplication> {
        store::application::by_id(self.store.conn(), id, false)?
            .ok_or_else(|| LedgerError::not_found("application", id))
    }

    pub fn by_customer(&self, customer_id: &str) -> LedgerResult<Vec<LoanApplication>> {
        store::application::list_by_customer(self.store.conn(), customer_id)
    }

    pub fn list_all(&self) -> LedgerResult<Vec<LoanApplication>> {
        store::application::list_all(self.store.conn())
    }

    /// Overwrite principal/term/purpose. Only a pending application is
    /// mutable, and the new values must still fit the loan type's bounds.
    pub fn update(&self, id: &str, update: ApplicationUpdate) -> LedgerResult<LoanApplication> {
        let conn = self.store.conn();
        let mut application = store::application::by_id(conn, id, false)?
            .ok_or_else(|| LedgerError::not_found("application", id))?;

        if application.status != ApplicationStatus::Pending {
            return Err(LedgerError::invalid_state(
                "application",
                application.status.as_str(),
                "update",
            ));
        }

        let loan_type = store::loan_type::by_id(conn, &application.loan_type_id, false)?
            .ok_or_else(|| LedgerError::not_found("loan type", &application.loan_type_id))?;
        check_bounds(&loan_type, update.principal_amount, update.term_months)?;

        application.principal_amount = update.principal_amount;
        application.term_months = update.term_months;
        application.purpose = update.purpose;
        store::application::update_fields(conn, &application)?;
        Ok(application)
    }

    /// Decide a pending application. Approval creates the loan in the same
    /// transaction; if loan creation fails for any reason the decision rolls
    /// back with it and the application stays pending.
    pub fn decide(
        &self,
        id: &str,
        status: ApplicationStatus,
        decided_by: &str,
        comments: Option<&str>,
    ) -> LedgerResult<DecisionOutcome> {
        if status == ApplicationStatus::Pending {
            return Err(LedgerError::validation(
                "decision must be approved, rejected or cancelled",
            ));
        }

        let outcome = self.store.exclusive_tx(self.config.busy_retries, |tx| {
            let mut application = store::application::by_id(tx, id, false)?
                .ok_or_else(|| LedgerError::not_found("application", id))?;

            if application.status != ApplicationStatus::Pending {
                return Err(LedgerError::invalid_state(
                    "application",
                    application.status.as_str(),
                    "decide",
                ));
            }

            let decision = Decision {
                status,
                decided_at: Utc::now(),
                decided_by: decided_by.to_string(),
                comments: comments.map(str::to_string),
            };

            application.status = status;
            application.final_decision = Some(status);
            application.final_decision_at = Some(decision.decided_at);
            application.decision_by = Some(decision.decided_by.clone());
            application.decision_history.push(decision);
            store::application::update_decision(tx, &application)?;

            let loan = if status == ApplicationStatus::Approved {
                Some(loans::create_from_application(tx, self.config, &application)?)
            } else {
                None
            };

            Ok(DecisionOutcome { application, loan })
        })?;

        log::info!(
            "application {} decided: {}{}",
            outcome.application.application_number,
            outcome.application.status,
            outcome
                .loan
                .as_ref()
                .map(|l| format!(", loan {} created", l.loan_number))
                .unwrap_or_default()
        );
        Ok(outcome)
    }

    /// Soft delete; only a pending application may be deleted.
    pub fn delete(&self, id: &str) -> LedgerResult<()> {
        let conn = self.store.conn();
        let application = store::application::by_id(conn, id, false)?
            .ok_or_else(|| LedgerError::not_found("application", id))?;

        if application.status != ApplicationStatus::Pending {
            return Err(LedgerError::invalid_state(
                "application",
                application.status.as_str(),
                "delete",
            ));
        }

        store::application::soft_delete(conn, id, Utc::now())?;
        Ok(())
    }

    /// Un-delete, whatever the current status.
    pub fn restore(&self, id: &str) -> LedgerResult<LoanApplication> {
        let conn = self.store.conn();
        store::application::by_id(conn, id, true)?
            .ok_or_else(|| LedgerError::not_found("application", id))?;
        store::application::restore_row(conn, id)?;
        store::application::by_id(conn, id, false)?
            .ok_or_else(|| LedgerError::not_found("application", id))
    }
}

fn check_bounds(
    loan_type: &crate::loan_types::LoanType,
    principal: Money,
    term_months: u32,
) -> LedgerResult<()> {
    if principal < loan_type.min_amount || principal > loan_type.max_amount {
        return Err(LedgerError::validation(format!(
            "principal amount {principal} must be between {} and {}",
            loan_type.min_amount, loan_type.max_amount
        )));
    }
    if term_months < loan_type.min_term_months || term_months > loan_type.max_term_months {
        return Err(LedgerError::validation(format!(
            "loan term {term_months} must be between {} and {} months",
            loan_type.min_term_months, loan_type.max_term_months
        )));
    }
    Ok(())
}
