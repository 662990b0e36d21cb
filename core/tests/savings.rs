//! Integration tests for the savings transaction ledger.
//!
//! Exercises the shared locked-read/validate/write/record discipline:
//! 1. Deposit, withdraw, transfer move balances and leave ledger records
//! 2. Withdrawal enforces funds, the minimum-balance floor and the
//!    monthly count limit
//! 3. Any validation failure aborts before any write
//! 4. Account status transitions and interest posting

use lending_core::{
    AccountStatus, LedgerEngine, LedgerError, Money, NewSavingType, Rate, TransactionFilter,
    TransactionType,
};
use rust_decimal_macros::dec;

/// Engine with two customers and a savings product:
/// 2 % interest, 100 minimum balance, 2 withdrawals per month.
fn build() -> (LedgerEngine, String) {
    let engine = LedgerEngine::in_memory().expect("in-memory engine");
    engine.store().insert_customer("cust-1", "Saver One").unwrap();
    engine.store().insert_customer("cust-2", "Saver Two").unwrap();
    let saving_type = engine
        .savings()
        .create_type(NewSavingType {
            name: "Regular Savings".into(),
            interest_rate: Rate::from_percent(dec!(2)),
            min_balance: Money::from_major(100),
            withdrawal_limit: Some(2),
        })
        .unwrap();
    (engine, saving_type.saving_type_id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Account creation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn initial_balance_defaults_to_the_type_minimum() {
    let (engine, st) = build();
    let account = engine.savings().create_account("cust-1", &st, None).unwrap();
    assert_eq!(account.balance, Money::from_major(100));
    assert_eq!(account.status, AccountStatus::Active);
}

#[test]
fn initial_balance_below_minimum_is_rejected() {
    let (engine, st) = build();
    let err = engine
        .savings()
        .create_account("cust-1", &st, Some(Money::from_major(50)))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
}

#[test]
fn one_account_per_customer_and_type() {
    let (engine, st) = build();
    engine.savings().create_account("cust-1", &st, None).unwrap();
    let err = engine
        .savings()
        .create_account("cust-1", &st, None)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Conflict { .. }));
}

// ─────────────────────────────────────────────────────────────────────────────
// Deposit / withdraw / transfer
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn deposit_credits_and_records() {
    let (engine, st) = build();
    let savings = engine.savings();
    let account = savings
        .create_account("cust-1", &st, Some(Money::from_major(1_000)))
        .unwrap();

    let after = savings
        .deposit(&account.account_id, Money::from_major(250), "teller-1")
        .unwrap();
    assert_eq!(after.balance, Money::from_major(1_250));

    let txns = savings
        .transactions(&account.account_id, &TransactionFilter::default())
        .unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].transaction_type, TransactionType::Deposit);
    assert_eq!(txns[0].amount, Money::from_major(250));
    assert_eq!(txns[0].to_account_id.as_deref(), Some(account.account_id.as_str()));
}

#[test]
fn withdrawal_debits_within_funds_and_floor() {
    let (engine, st) = build();
    let savings = engine.savings();
    let account = savings
        .create_account("cust-1", &st, Some(Money::from_major(1_000)))
        .unwrap();

    let after = savings
        .withdraw(&account.account_id, Money::from_major(400), "teller-1")
        .unwrap();
    assert_eq!(after.balance, Money::from_major(600));

    // would leave 50, below the 100 floor
    let err = savings
        .withdraw(&account.account_id, Money::from_major(550), "teller-1")
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));

    // plainly more than the balance
    let err = savings
        .withdraw(&account.account_id, Money::from_major(10_000), "teller-1")
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
}

#[test]
fn monthly_withdrawal_limit_is_enforced() {
    let (engine, st) = build();
    let savings = engine.savings();
    let account = savings
        .create_account("cust-1", &st, Some(Money::from_major(2_000)))
        .unwrap();

    savings.withdraw(&account.account_id, Money::from_major(100), "teller-1").unwrap();
    savings.withdraw(&account.account_id, Money::from_major(100), "teller-1").unwrap();
    let err = savings
        .withdraw(&account.account_id, Money::from_major(100), "teller-1")
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));

    // deposits are not throttled
    savings.deposit(&account.account_id, Money::from_major(100), "teller-1").unwrap();
}

#[test]
fn transfer_moves_funds_atomically() {
    let (engine, st) = build();
    let savings = engine.savings();
    let from = savings
        .create_account("cust-1", &st, Some(Money::from_major(1_000)))
        .unwrap();
    let to = savings
        .create_account("cust-2", &st, Some(Money::from_major(100)))
        .unwrap();

    let (from_after, to_after) = savings
        .transfer(&from.account_id, &to.account_id, Money::from_major(300), "teller-1")
        .unwrap();
    assert_eq!(from_after.balance, Money::from_major(700));
    assert_eq!(to_after.balance, Money::from_major(400));

    // conservation: total across both accounts is unchanged
    let total = savings.balance(&from.account_id).unwrap()
        + savings.balance(&to.account_id).unwrap();
    assert_eq!(total, Money::from_major(1_100));

    let txns = savings
        .transactions(
            &from.account_id,
            &TransactionFilter {
                transaction_type: Some(TransactionType::Transfer),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(txns.len(), 1);
}

#[test]
fn transfer_rejects_self_and_insufficient_funds() {
    let (engine, st) = build();
    let savings = engine.savings();
    let from = savings
        .create_account("cust-1", &st, Some(Money::from_major(200)))
        .unwrap();
    let to = savings
        .create_account("cust-2", &st, Some(Money::from_major(100)))
        .unwrap();

    let err = savings
        .transfer(&from.account_id, &from.account_id, Money::from_major(50), "teller-1")
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));

    let err = savings
        .transfer(&from.account_id, &to.account_id, Money::from_major(5_000), "teller-1")
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
}

// ─────────────────────────────────────────────────────────────────────────────
// Rollback: failed validation writes nothing
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn failed_operations_leave_no_ledger_rows() {
    let (engine, st) = build();
    let savings = engine.savings();
    let account = savings
        .create_account("cust-1", &st, Some(Money::from_major(500)))
        .unwrap();

    let before_count = savings.transaction_count().unwrap();
    let before_balance = savings.balance(&account.account_id).unwrap();

    let _ = savings
        .withdraw(&account.account_id, Money::from_major(10_000), "teller-1")
        .unwrap_err();
    let _ = savings
        .transfer(&account.account_id, "no-such-account", Money::from_major(10), "teller-1")
        .unwrap_err();

    assert_eq!(savings.transaction_count().unwrap(), before_count);
    assert_eq!(savings.balance(&account.account_id).unwrap(), before_balance);
}

// ─────────────────────────────────────────────────────────────────────────────
// Status transitions and inactive accounts
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn inactive_accounts_refuse_money_movement() {
    let (engine, st) = build();
    let savings = engine.savings();
    let account = savings
        .create_account("cust-1", &st, Some(Money::from_major(500)))
        .unwrap();
    savings
        .update_account_status(&account.account_id, AccountStatus::Inactive)
        .unwrap();

    let err = savings
        .deposit(&account.account_id, Money::from_major(10), "teller-1")
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState { .. }));
    let err = savings
        .withdraw(&account.account_id, Money::from_major(10), "teller-1")
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState { .. }));

    // back to active, movement resumes
    savings
        .update_account_status(&account.account_id, AccountStatus::Active)
        .unwrap();
    savings.deposit(&account.account_id, Money::from_major(10), "teller-1").unwrap();
}

#[test]
fn closing_rules_are_enforced() {
    let (engine, _) = build();
    let savings = engine.savings();
    // dedicated zero-floor product so the balance can be fully drained
    let zero_floor = savings
        .create_type(NewSavingType {
            name: "Holding".into(),
            interest_rate: Rate::ZERO,
            min_balance: Money::ZERO,
            withdrawal_limit: None,
        })
        .unwrap();
    let account = savings
        .create_account("cust-1", &zero_floor.saving_type_id, Some(Money::from_major(50)))
        .unwrap();

    let err = savings
        .update_account_status(&account.account_id, AccountStatus::Closed)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));

    savings.withdraw(&account.account_id, Money::from_major(50), "teller-1").unwrap();
    savings
        .update_account_status(&account.account_id, AccountStatus::Closed)
        .unwrap();

    // closed is terminal
    let err = savings
        .update_account_status(&account.account_id, AccountStatus::Active)
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState { .. }));
}

// ─────────────────────────────────────────────────────────────────────────────
// Interest posting
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn interest_posting_credits_rate_percent_of_balance() {
    let (engine, st) = build();
    let savings = engine.savings();
    let account = savings
        .create_account("cust-1", &st, Some(Money::from_major(1_000)))
        .unwrap();

    let posting = savings.post_interest(&account.account_id).unwrap();
    assert_eq!(posting.interest, Money::from_major(20)); // 2 % of 1 000
    assert_eq!(posting.account.balance, Money::from_major(1_020));
    assert_eq!(
        savings.balance(&account.account_id).unwrap(),
        Money::from_major(1_020)
    );
}

#[test]
fn duplicate_saving_type_name_conflicts() {
    let (engine, _) = build();
    let err = engine
        .savings()
        .create_type(NewSavingType {
            name: "Regular Savings".into(),
            interest_rate: Rate::ZERO,
            min_balance: Money::ZERO,
            withdrawal_limit: None,
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::Conflict { .. }));
}
