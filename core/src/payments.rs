//! Loan payment ledger.
//!
//! Payments are the only path that moves a loan's running balance. The
//! sub-state machine is pending -> {completed, rejected} and completed ->
//! reversed; nothing else. Every transition that touches the balance runs
//! under the store's exclusive transaction: lock, read, validate, write the
//! balance and the payment row together.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::money::Money;
use crate::store::{self, LedgerStore};
use crate::types::{EntityId, LoanStatus, Paged, PaymentMethod, PaymentStatus};

#[derive(Debug, Clone)]
pub struct LoanPayment {
    pub payment_id: EntityId,
    pub loan_id: EntityId,
    /// 1-based, contiguous per loan, assigned at creation.
    pub payment_number: u32,
    pub amount: Money,
    pub principal_amount: Money,
    pub interest_amount: Money,
    pub payment_date: DateTime<Utc>,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub recorded_by: EntityId,
    pub status: PaymentStatus,
    pub verified_by: Option<EntityId>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verification_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub loan_id: EntityId,
    pub amount: Money,
    pub principal_amount: Money,
    pub interest_amount: Money,
    pub payment_date: DateTime<Utc>,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub recorded_by: EntityId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyAction {
    Approve,
    Reject,
}

/// Free-form edit of a payment that is still pending.
#[derive(Debug, Clone, Default)]
pub struct PaymentPatch {
    pub amount: Option<Money>,
    pub principal_amount: Option<Money>,
    pub interest_amount: Option<Money>,
    pub payment_date: Option<DateTime<Utc>>,
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub loan_id: Option<EntityId>,
    pub status: Option<PaymentStatus>,
    pub method: Option<PaymentMethod>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub page: u32,
    pub limit: Option<u32>,
}

pub struct PaymentService<'a> {
    store: &'a LedgerStore,
    config: &'a LedgerConfig,
}

impl<'a> PaymentService<'a> {
    pub(crate) fn new(store: &'a LedgerStore, config: &'a LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Record a payment against an active loan. The payment number and the
    /// row insert happen in one exclusive transaction, so concurrent
    /// submissions can never share a number.
    pub fn create(&self, new: NewPayment) -> LedgerResult<LoanPayment> {
        if !new.amount.is_positive() {
            return Err(LedgerError::validation(format!(
                "payment amount must be positive, got {}",
                new.amount
            )));
        }
        if new.principal_amount.is_negative() || new.interest_amount.is_negative() {
            return Err(LedgerError::validation(format!(
                "payment split cannot be negative: principal {}, interest {}",
                new.principal_amount, new.interest_amount
            )));
        }

        let payment = self.store.exclusive_tx(self.config.busy_retries, |tx| {
            let loan = store::loan::by_id(tx, &new.loan_id, false)?
                .ok_or_else(|| LedgerError::not_found("loan", &new.loan_id))?;
            if loan.status != LoanStatus::Active {
                return Err(LedgerError::invalid_state(
                    "loan",
                    loan.status.as_str(),
                    "record a payment against",
                ));
            }

            let payment_number = store::payment::max_payment_number(tx, &new.loan_id)? + 1;
            let payment = LoanPayment {
                payment_id: Uuid::new_v4().to_string(),
                loan_id: new.loan_id.clone(),
                payment_number,
                amount: new.amount,
                principal_amount: new.principal_amount,
                interest_amount: new.interest_amount,
                payment_date: new.payment_date,
                method: new.method,
                reference: new.reference.clone(),
                recorded_by: new.recorded_by.clone(),
                status: PaymentStatus::Pending,
                verified_by: None,
                verified_at: None,
                verification_notes: None,
                created_at: Utc::now(),
            };
            store::payment::insert(tx, &payment)?;
            Ok(payment)
        })?;

        log::info!(
            "payment #{} of {} recorded on loan {} (pending verification)",
            payment.payment_number,
            payment.amount,
            payment.loan_id
        );
        Ok(payment)
    }

    /// Approve or reject a pending payment.
    ///
    /// Approval decrements the loan balance by the payment's principal
    /// portion and marks the loan paid when the balance reaches zero; a
    /// rejection touches nothing but the payment row. Both rows commit
    /// together.
    pub fn verify(
        &self,
        payment_id: &str,
        action: VerifyAction,
        verified_by: &str,
        reason: Option<&str>,
    ) -> LedgerResult<LoanPayment> {
        let payment = self.store.exclusive_tx(self.config.busy_retries, |tx| {
            let mut payment = store::payment::by_id(tx, payment_id)?
                .ok_or_else(|| LedgerError::not_found("payment", payment_id))?;
            if payment.status != PaymentStatus::Pending {
                return Err(LedgerError::invalid_state(
                    "payment",
                    payment.status.as_str(),
                    "verify",
                ));
            }

            payment.verified_by = Some(verified_by.to_string());
            payment.verified_at = Some(Utc::now());
            payment.verification_notes = reason.map(str::to_string);

            match action {
                VerifyAction::Approve => {
                    let mut loan = store::loan::by_id(tx, &payment.loan_id, false)?
                        .ok_or_else(|| LedgerError::not_found("loan", &payment.loan_id))?;

                    let new_balance = loan.balance - payment.principal_amount;
                    if new_balance.is_negative() {
                        return Err(LedgerError::validation(format!(
                            "payment principal {} exceeds loan balance {}",
                            payment.principal_amount, loan.balance
                        )));
                    }

                    payment.status = PaymentStatus::Completed;
                    store::payment::update_row(tx, &payment)?;

                    loan.balance = new_balance;
                    loan.last_payment_date = Some(payment.payment_date);
                    if !new_balance.is_positive() {
                        loan.status = LoanStatus::Paid;
                    }
                    store::loan::update_row(tx, &loan)?;
                }
                VerifyAction::Reject => {
                    payment.status = PaymentStatus::Rejected;
                    if payment.verification_notes.is_none() {
                        payment.verification_notes = Some("Payment rejected".to_string());
                    }
                    store::payment::update_row(tx, &payment)?;
                }
            }
            Ok(payment)
        })?;

        log::info!(
            "payment #{} on loan {} verified: {}",
            payment.payment_number,
            payment.loan_id,
            payment.status
        );
        Ok(payment)
    }

    /// Reverse a completed payment: the loan balance is restored by the
    /// payment's principal portion and a paid loan becomes active again.
    pub fn reverse(&self, payment_id: &str, reversal_reason: &str) -> LedgerResult<LoanPayment> {
        let payment = self.store.exclusive_tx(self.config.busy_retries, |tx| {
            let mut payment = store::payment::by_id(tx, payment_id)?
                .ok_or_else(|| LedgerError::not_found("payment", payment_id))?;
            if payment.status != PaymentStatus::Completed {
                return Err(LedgerError::invalid_state(
                    "payment",
                    payment.status.as_str(),
                    "reverse",
                ));
            }

            let mut loan = store::loan::by_id(tx, &payment.loan_id, false)?
                .ok_or_else(|| LedgerError::not_found("loan", &payment.loan_id))?;

            let new_balance = loan.balance + payment.principal_amount;
            loan.balance = new_balance;
            // Only a paid loan is re-activated; a reversal never resurrects
            // a cancelled or defaulted one.
            if loan.status == LoanStatus::Paid && new_balance.is_positive() {
                loan.status = LoanStatus::Active;
            }
            store::loan::update_row(tx, &loan)?;

            payment.status = PaymentStatus::Reversed;
            payment.verification_notes = Some(reversal_reason.to_string());
            store::payment::update_row(tx, &payment)?;
            Ok(payment)
        })?;

        log::info!(
            "payment #{} on loan {} reversed",
            payment.payment_number,
            payment.loan_id
        );
        Ok(payment)
    }

    /// Edit a pending payment. Completed payments are immutable here — the
    /// only legal mutation of a completed payment is `reverse`. Rejected and
    /// reversed payments are terminal.
    pub fn update(&self, payment_id: &str, patch: PaymentPatch) -> LedgerResult<LoanPayment> {
        self.store.exclusive_tx(self.config.busy_retries, |tx| {
            let mut payment = store::payment::by_id(tx, payment_id)?
                .ok_or_else(|| LedgerError::not_found("payment", payment_id))?;
            if payment.status != PaymentStatus::Pending {
                return Err(LedgerError::invalid_state(
                    "payment",
                    payment.status.as_str(),
                    "update",
                ));
            }

            if let Some(amount) = patch.amount {
                if !amount.is_positive() {
                    return Err(LedgerError::validation(format!(
                        "payment amount must be positive, got {amount}"
                    )));
                }
                payment.amount = amount;
            }
            if let Some(principal) = patch.principal_amount {
                if principal.is_negative() {
                    return Err(LedgerError::validation(format!(
                        "payment principal cannot be negative, got {principal}"
                    )));
                }
                payment.principal_amount = principal;
            }
            if let Some(interest) = patch.interest_amount {
                if interest.is_negative() {
                    return Err(LedgerError::validation(format!(
                        "payment interest cannot be negative, got {interest}"
                    )));
                }
                payment.interest_amount = interest;
            }
            if let Some(date) = patch.payment_date {
                payment.payment_date = date;
            }
            if let Some(method) = patch.method {
                payment.method = method;
            }
            if let Some(reference) = &patch.reference {
                payment.reference = Some(reference.clone());
            }
            store::payment::update_editable(tx, &payment)?;
            Ok(payment)
        })
    }

    pub fn get(&self, payment_id: &str) -> LedgerResult<LoanPayment> {
        store::payment::by_id(self.store.conn(), payment_id)?
            .ok_or_else(|| LedgerError::not_found("payment", payment_id))
    }

    /// Filtered, paginated listing ordered by payment date descending.
    pub fn list(&self, filter: &PaymentFilter) -> LedgerResult<Paged<LoanPayment>> {
        let limit = filter.limit.unwrap_or(self.config.default_page_limit).max(1);
        let page = filter.page.max(1);
        let conn = self.store.conn();
        let total = store::payment::count(conn, filter)? as u64;
        let items = store::payment::list(conn, filter, limit, (page - 1) * limit)?;
        Ok(Paged {
            items,
            total,
            page,
            limit,
        })
    }
}
