//! Integration tests for the loan application state machine.
//!
//! Covers:
//! 1. Bound enforcement at creation, at and one unit outside each bound
//! 2. Pending-only mutability (update, delete)
//! 3. Decision exclusivity: exactly one terminal decision, ever
//! 4. Approval creates exactly one loan, atomically with the decision

use lending_core::{
    ApplicationStatus, ApplicationUpdate, LedgerEngine, LedgerError, LoanStatus, Money,
    NewApplication, NewLoanType, PaymentFrequency, Rate,
};
use rust_decimal_macros::dec;

/// Engine with one customer, one branch and the standard test product:
/// 12 % over [1 000, 50 000] for 3–24 months.
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

fn application_input(loan_type_id: &str, principal: i64, term: u32) -> NewApplication {
    NewApplication {
        customer_id: "cust-1".into(),
        loan_type_id: loan_type_id.into(),
        branch_id: Some("branch-1".into()),
        principal_amount: Money::from_major(principal),
        term_months: term,
        purpose: Some("test".into()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bound enforcement
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn amounts_at_bounds_are_accepted() {
    let (engine, lt) = build();
    for (principal, term) in [(1_000, 3), (50_000, 24), (1_000, 24), (50_000, 3)] {
        let app = engine
            .applications()
            .create(application_input(&lt, principal, term))
            .unwrap();
        assert_eq!(app.status, ApplicationStatus::Pending);
    }
}

#[test]
fn amounts_one_unit_outside_bounds_are_rejected() {
    let (engine, lt) = build();
    for (principal, term) in [(999, 12), (50_001, 12)] {
        let err = engine
            .applications()
            .create(application_input(&lt, principal, term))
            .unwrap_err();
        assert!(
            matches!(err, LedgerError::Validation { .. }),
            "principal {principal} should fail validation, got {err:?}"
        );
    }
    for term in [2, 25] {
        let err = engine
            .applications()
            .create(application_input(&lt, 10_000, term))
            .unwrap_err();
        assert!(
            matches!(err, LedgerError::Validation { .. }),
            "term {term} should fail validation, got {err:?}"
        );
    }
}

#[test]
fn oversized_application_fails_validation() {
    // the §8-style scenario: 60 000 against a 50 000 cap
    let (engine, lt) = build();
    let err = engine
        .applications()
        .create(application_input(&lt, 60_000, 12))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
}

#[test]
fn unknown_references_fail_as_not_found() {
    let (engine, lt) = build();
    let err = engine
        .applications()
        .create(NewApplication {
            customer_id: "nobody".into(),
            ..application_input(&lt, 10_000, 12)
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { entity: "customer", .. }));

    let err = engine
        .applications()
        .create(NewApplication {
            loan_type_id: "no-such-type".into(),
            ..application_input(&lt, 10_000, 12)
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { entity: "loan type", .. }));
}

// ─────────────────────────────────────────────────────────────────────────────
// Pending-only mutability
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn pending_application_is_updatable_and_revalidated() {
    let (engine, lt) = build();
    let app = engine
        .applications()
        .create(application_input(&lt, 10_000, 12))
        .unwrap();

    let updated = engine
        .applications()
        .update(
            &app.application_id,
            ApplicationUpdate {
                principal_amount: Money::from_major(20_000),
                term_months: 18,
                purpose: Some("expansion".into()),
            },
        )
        .unwrap();
    assert_eq!(updated.principal_amount, Money::from_major(20_000));
    assert_eq!(updated.term_months, 18);

    let err = engine
        .applications()
        .update(
            &app.application_id,
            ApplicationUpdate {
                principal_amount: Money::from_major(100_000),
                term_months: 12,
                purpose: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
}

#[test]
fn decided_application_rejects_update_and_delete() {
    let (engine, lt) = build();
    let app = engine
        .applications()
        .create(application_input(&lt, 10_000, 12))
        .unwrap();
    engine
        .applications()
        .decide(&app.application_id, ApplicationStatus::Rejected, "officer-1", None)
        .unwrap();

    let err = engine
        .applications()
        .update(
            &app.application_id,
            ApplicationUpdate {
                principal_amount: Money::from_major(5_000),
                term_months: 6,
                purpose: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState { .. }));

    let err = engine.applications().delete(&app.application_id).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState { .. }));
}

#[test]
fn deleted_pending_application_can_be_restored() {
    let (engine, lt) = build();
    let app = engine
        .applications()
        .create(application_input(&lt, 10_000, 12))
        .unwrap();
    engine.applications().delete(&app.application_id).unwrap();
    assert!(matches!(
        engine.applications().get(&app.application_id).unwrap_err(),
        LedgerError::NotFound { .. }
    ));

    let restored = engine.applications().restore(&app.application_id).unwrap();
    assert_eq!(restored.status, ApplicationStatus::Pending);
    assert!(restored.deleted_at.is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision exclusivity and history
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn second_decision_fails_with_invalid_state() {
    let (engine, lt) = build();
    let app = engine
        .applications()
        .create(application_input(&lt, 10_000, 12))
        .unwrap();
    engine
        .applications()
        .decide(&app.application_id, ApplicationStatus::Approved, "officer-1", None)
        .unwrap();

    for status in [
        ApplicationStatus::Approved,
        ApplicationStatus::Rejected,
        ApplicationStatus::Cancelled,
    ] {
        let err = engine
            .applications()
            .decide(&app.application_id, status, "officer-2", None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState { .. }));
    }
}

#[test]
fn deciding_back_to_pending_is_rejected() {
    let (engine, lt) = build();
    let app = engine
        .applications()
        .create(application_input(&lt, 10_000, 12))
        .unwrap();
    let err = engine
        .applications()
        .decide(&app.application_id, ApplicationStatus::Pending, "officer-1", None)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
}

#[test]
fn decision_appends_history_and_final_fields() {
    let (engine, lt) = build();
    let app = engine
        .applications()
        .create(application_input(&lt, 10_000, 12))
        .unwrap();
    assert!(app.decision_history.is_empty());

    let outcome = engine
        .applications()
        .decide(
            &app.application_id,
            ApplicationStatus::Cancelled,
            "officer-1",
            Some("withdrawn by customer"),
        )
        .unwrap();
    let decided = outcome.application;
    assert_eq!(decided.status, ApplicationStatus::Cancelled);
    assert_eq!(decided.final_decision, Some(ApplicationStatus::Cancelled));
    assert_eq!(decided.decision_by.as_deref(), Some("officer-1"));
    assert_eq!(decided.decision_history.len(), 1);
    assert_eq!(
        decided.decision_history[0].comments.as_deref(),
        Some("withdrawn by customer")
    );

    // the history survives a round trip through the store
    let reloaded = engine.applications().get(&app.application_id).unwrap();
    assert_eq!(reloaded.decision_history.len(), 1);
    assert_eq!(reloaded.decision_history[0].decided_by, "officer-1");
}

// ─────────────────────────────────────────────────────────────────────────────
// Approval: loan creation and atomicity
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn approval_creates_exactly_one_active_loan() {
    let (engine, lt) = build();
    let app = engine
        .applications()
        .create(application_input(&lt, 10_000, 12))
        .unwrap();
    let outcome = engine
        .applications()
        .decide(&app.application_id, ApplicationStatus::Approved, "officer-1", None)
        .unwrap();

    let loan = outcome.loan.expect("approval returns the loan");
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.balance, Money::from_major(10_000));
    assert_eq!(loan.principal_amount, Money::from_major(10_000));
    assert_eq!(loan.interest_rate, Rate::from_percent(dec!(12)));
    assert!(loan.disbursement_date.is_some());
    assert!(loan.due_date.is_some());

    let by_app = engine.loans().get_by_application(&app.application_id).unwrap();
    assert_eq!(by_app.loan_id, loan.loan_id);
}

#[test]
fn rejection_creates_no_loan() {
    let (engine, lt) = build();
    let app = engine
        .applications()
        .create(application_input(&lt, 10_000, 12))
        .unwrap();
    let outcome = engine
        .applications()
        .decide(&app.application_id, ApplicationStatus::Rejected, "officer-1", None)
        .unwrap();
    assert!(outcome.loan.is_none());
    assert!(matches!(
        engine.loans().get_by_application(&app.application_id).unwrap_err(),
        LedgerError::NotFound { .. }
    ));
}

#[test]
fn failed_loan_creation_rolls_the_decision_back() {
    let (engine, lt) = build();
    let app = engine
        .applications()
        .create(application_input(&lt, 10_000, 12))
        .unwrap();

    // Force the loan-type lookup inside the approval to fail: no loan
    // references the type yet, so the registry lets us delete it.
    engine.loan_types().delete(&lt).unwrap();

    let err = engine
        .applications()
        .decide(&app.application_id, ApplicationStatus::Approved, "officer-1", None)
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { entity: "loan type", .. }));

    // no partial commit: still pending, no history, no loan
    let reloaded = engine.applications().get(&app.application_id).unwrap();
    assert_eq!(reloaded.status, ApplicationStatus::Pending);
    assert!(reloaded.decision_history.is_empty());
    assert!(reloaded.final_decision.is_none());
    assert!(matches!(
        engine.loans().get_by_application(&app.application_id).unwrap_err(),
        LedgerError::NotFound { .. }
    ));

    // and the application is decidable again once the product is restored
    engine.loan_types().restore(&lt).unwrap();
    let outcome = engine
        .applications()
        .decide(&app.application_id, ApplicationStatus::Approved, "officer-1", None)
        .unwrap();
    assert!(outcome.loan.is_some());
}

#[test]
fn listings_return_applications_newest_first() {
    let (engine, lt) = build();
    let first = engine
        .applications()
        .create(application_input(&lt, 2_000, 6))
        .unwrap();
    let second = engine
        .applications()
        .create(application_input(&lt, 3_000, 6))
        .unwrap();

    let by_customer = engine.applications().by_customer("cust-1").unwrap();
    assert_eq!(by_customer.len(), 2);

    let all = engine.applications().list_all().unwrap();
    let ids: Vec<_> = all.iter().map(|a| a.application_id.as_str()).collect();
    assert!(ids.contains(&first.application_id.as_str()));
    assert!(ids.contains(&second.application_id.as_str()));
}
