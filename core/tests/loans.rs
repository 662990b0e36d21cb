//! Integration tests for the loan record and balance engine.
//!
//! Covers:
//! 1. Amortization figures frozen onto the loan at approval
//! 2. Direct (administrative) creation and activation
//! 3. Delete/restore rules
//! 4. The reporting balance view and its documented divergence from the
//!    transactionally maintained balance column

use chrono::Utc;
use lending_core::amortization::level_payment_terms;
use lending_core::{
    ApplicationStatus, LedgerEngine, LedgerError, Loan, LoanStatus, Money, NewApplication,
    NewLoan, NewLoanType, NewPayment, PaymentFrequency, PaymentMethod, Rate, VerifyAction,
};
use rust_decimal_macros::dec;

fn build() -> (LedgerEngine, String) {
    let engine = LedgerEngine::in_memory().expect("in-memory engine");
    engine.store().insert_customer("cust-1", "Test Customer").unwrap();
    engine.store().insert_branch("branch-1", "Head Office").unwrap();
    let loan_type = engine
        .loan_types()
        .create(NewLoanType {
            name: "Personal Loan".into(),
            interest_rate: Rate::from_percent(dec!(12)),
            min_amount: Money::from_major(1_000),
            max_amount: Money::from_major(50_000),
            min_term_months: 3,
            max_term_months: 24,
            payment_frequency: PaymentFrequency::Monthly,
        })
        .unwrap();
    (engine, loan_type.loan_type_id)
}

fn approved_loan(engine: &LedgerEngine, loan_type_id: &str, principal: i64, term: u32) -> Loan {
    let app = engine
        .applications()
        .create(NewApplication {
            customer_id: "cust-1".into(),
            loan_type_id: loan_type_id.into(),
            branch_id: Some("branch-1".into()),
            principal_amount: Money::from_major(principal),
            term_months: term,
            purpose: None,
        })
        .unwrap();
    engine
        .applications()
        .decide(&app.application_id, ApplicationStatus::Approved, "officer-1", None)
        .unwrap()
        .loan
        .expect("approval creates a loan")
}

// ─────────────────────────────────────────────────────────────────────────────
// Amortization
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn annuity_formula_produces_expected_installment() {
    // 10 000 at 12 % over 12 months: the classic 888.49
    let terms =
        level_payment_terms(Money::from_major(10_000), Rate::from_percent(dec!(12)), 12).unwrap();
    assert_eq!(terms.monthly_payment.to_string(), "888.49");
    assert_eq!(terms.total_payment.to_string(), "10661.85");
    assert_eq!(terms.total_interest.to_string(), "661.85");
}

#[test]
fn zero_rate_divides_principal_evenly() {
    let terms =
        level_payment_terms(Money::from_major(1_200), Rate::ZERO, 12).unwrap();
    assert_eq!(terms.monthly_payment, Money::from_major(100));
    assert_eq!(terms.total_payment, Money::from_major(1_200));
    assert_eq!(terms.total_interest, Money::ZERO);
}

#[test]
fn degenerate_terms_are_rejected() {
    assert!(matches!(
        level_payment_terms(Money::from_major(1_000), Rate::ZERO, 0),
        Err(LedgerError::Validation { .. })
    ));
    assert!(matches!(
        level_payment_terms(Money::ZERO, Rate::ZERO, 12),
        Err(LedgerError::Validation { .. })
    ));
}

#[test]
fn approved_loan_carries_amortized_figures() {
    let (engine, lt) = build();
    let loan = approved_loan(&engine, &lt, 10_000, 12);
    assert_eq!(loan.monthly_payment.to_string(), "888.49");
    assert_eq!(loan.total_payment.to_string(), "10661.85");
    assert_eq!(loan.total_interest.to_string(), "661.85");
}

// ─────────────────────────────────────────────────────────────────────────────
// Direct creation and activation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn directly_created_loan_is_pending_and_undisbursed() {
    let (engine, lt) = build();
    let loan = engine
        .loans()
        .create(NewLoan {
            customer_id: "cust-1".into(),
            loan_type_id: lt.clone(),
            branch_id: None,
            principal_amount: Money::from_major(5_000),
            term_months: 6,
        })
        .unwrap();
    assert_eq!(loan.status, LoanStatus::Pending);
    assert_eq!(loan.balance, Money::ZERO);
    assert!(loan.disbursement_date.is_none());
    assert!(loan.application_id.is_none());
}

#[test]
fn activating_a_pending_loan_disburses_it() {
    let (engine, lt) = build();
    let loan = engine
        .loans()
        .create(NewLoan {
            customer_id: "cust-1".into(),
            loan_type_id: lt.clone(),
            branch_id: None,
            principal_amount: Money::from_major(5_000),
            term_months: 6,
        })
        .unwrap();

    let active = engine
        .loans()
        .update_status(&loan.loan_id, LoanStatus::Active, "officer-1", Some("disbursed"))
        .unwrap();
    assert_eq!(active.status, LoanStatus::Active);
    assert_eq!(active.balance, Money::from_major(5_000));
    assert!(active.disbursement_date.is_some());
    assert!(active.due_date.is_some());
    assert_eq!(active.updated_by.as_deref(), Some("officer-1"));
}

#[test]
fn status_override_is_unrestricted_but_recorded() {
    let (engine, lt) = build();
    let loan = approved_loan(&engine, &lt, 10_000, 12);
    let defaulted = engine
        .loans()
        .update_status(&loan.loan_id, LoanStatus::Defaulted, "officer-2", Some("90 days past due"))
        .unwrap();
    assert_eq!(defaulted.status, LoanStatus::Defaulted);
    assert_eq!(defaulted.status_comments.as_deref(), Some("90 days past due"));
    // balance and disbursement are untouched by a pure status override
    assert_eq!(defaulted.balance, Money::from_major(10_000));
}

// ─────────────────────────────────────────────────────────────────────────────
// Lookups, listing, delete/restore
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn administrative_update_touches_only_mutable_fields() {
    let (engine, lt) = build();
    engine.store().insert_branch("branch-2", "North Branch").unwrap();
    let loan = approved_loan(&engine, &lt, 10_000, 12);

    let updated = engine
        .loans()
        .update(
            &loan.loan_id,
            lending_core::loans::LoanUpdate {
                branch_id: Some("branch-2".into()),
                status_comments: Some("moved to north branch".into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.branch_id.as_deref(), Some("branch-2"));
    // identity and money fields are untouched
    assert_eq!(updated.loan_number, loan.loan_number);
    assert_eq!(updated.customer_id, loan.customer_id);
    assert_eq!(updated.balance, loan.balance);
}

#[test]
fn loan_is_reachable_by_number_and_customer() {
    let (engine, lt) = build();
    let loan = approved_loan(&engine, &lt, 10_000, 12);

    let by_number = engine.loans().get_by_number(&loan.loan_number).unwrap();
    assert_eq!(by_number.loan_id, loan.loan_id);
    assert!(loan.loan_number.starts_with("LN-"));

    let by_customer = engine.loans().by_customer("cust-1").unwrap();
    assert_eq!(by_customer.len(), 1);
}

#[test]
fn listing_filters_by_status_and_paginates() {
    let (engine, lt) = build();
    for _ in 0..3 {
        approved_loan(&engine, &lt, 2_000, 6);
    }
    let loan = approved_loan(&engine, &lt, 2_000, 6);
    engine
        .loans()
        .update_status(&loan.loan_id, LoanStatus::Defaulted, "officer-1", None)
        .unwrap();

    let active = engine.loans().list(Some(LoanStatus::Active), 1, None).unwrap();
    assert_eq!(active.total, 3);

    let page = engine.loans().list(Some(LoanStatus::Active), 1, Some(2)).unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total, 3);
    let page2 = engine.loans().list(Some(LoanStatus::Active), 2, Some(2)).unwrap();
    assert_eq!(page2.items.len(), 1);

    let everything = engine.loans().list(None, 1, Some(50)).unwrap();
    assert_eq!(everything.total, 4);
}

#[test]
fn active_loan_cannot_be_deleted() {
    let (engine, lt) = build();
    let loan = approved_loan(&engine, &lt, 10_000, 12);
    let err = engine.loans().delete(&loan.loan_id).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState { .. }));
}

#[test]
fn non_active_loan_deletes_and_restores() {
    let (engine, lt) = build();
    let loan = approved_loan(&engine, &lt, 10_000, 12);
    engine
        .loans()
        .update_status(&loan.loan_id, LoanStatus::Cancelled, "officer-1", None)
        .unwrap();

    engine.loans().delete(&loan.loan_id).unwrap();
    assert!(matches!(
        engine.loans().get(&loan.loan_id).unwrap_err(),
        LedgerError::NotFound { .. }
    ));

    let restored = engine.loans().restore(&loan.loan_id).unwrap();
    assert_eq!(restored.status, LoanStatus::Cancelled);

    let err = engine.loans().restore(&loan.loan_id).unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
}

// ─────────────────────────────────────────────────────────────────────────────
// Reporting balance view
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn reporting_view_uses_simple_full_term_interest() {
    let (engine, lt) = build();
    let loan = approved_loan(&engine, &lt, 10_000, 12);

    // no payments yet: total = P + P*12%*12/12 = 11 200
    let summary = engine.loans().calculate_balance(&loan.loan_id).unwrap();
    assert_eq!(summary.total_amount, Money::from_major(11_200));
    assert_eq!(summary.total_payments, Money::ZERO);
    assert_eq!(summary.balance, Money::from_major(11_200));
    assert!(summary.last_payment_date.is_none());
    assert_eq!(summary.next_payment_due, loan.due_date);
}

#[test]
fn reporting_and_ledger_balances_diverge_once_payments_exist() {
    // The reporting view subtracts full payment amounts from principal plus
    // simple interest; the ledger column subtracts only principal portions.
    // Both behaviors are pinned here on purpose: reconciling them is a
    // product decision, not a code fix.
    let (engine, lt) = build();
    let loan = approved_loan(&engine, &lt, 10_000, 12);

    let payment = engine
        .payments()
        .create(NewPayment {
            loan_id: loan.loan_id.clone(),
            amount: Money::from_major(5_000),
            principal_amount: Money::from_major(4_500),
            interest_amount: Money::from_major(500),
            payment_date: Utc::now(),
            method: PaymentMethod::Cash,
            reference: None,
            recorded_by: "teller-1".into(),
        })
        .unwrap();
    engine
        .payments()
        .verify(&payment.payment_id, VerifyAction::Approve, "officer-1", None)
        .unwrap();

    let ledger = engine.loans().get(&loan.loan_id).unwrap();
    assert_eq!(ledger.balance, Money::from_major(5_500)); // 10 000 − 4 500

    let summary = engine.loans().calculate_balance(&loan.loan_id).unwrap();
    assert_eq!(summary.total_payments, Money::from_major(5_000));
    assert_eq!(summary.balance, Money::from_major(6_200)); // 11 200 − 5 000
    assert_eq!(summary.last_payment_date, Some(payment.payment_date));
    assert!(summary.next_payment_due.is_some());
}
