//! ledger-runner: headless demo driver for the lending ledger.
//!
//! Usage:
//!   ledger-runner --db ledger.db
//!
//! Seeds a customer, branch, loan product and savings account, then walks a
//! full loan lifecycle (apply, approve, pay down, reverse) plus a savings
//! deposit/withdraw/transfer round, printing a summary at the end.

use anyhow::{Context, Result};
use chrono::Utc;
use lending_core::{
    ApplicationStatus, LedgerEngine, Money, NewApplication, NewLoanType, NewPayment,
    NewSavingType, PaymentFrequency, PaymentMethod, Rate, VerifyAction,
};
use rust_decimal_macros::dec;
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");

    println!("lending ledger — demo runner");
    println!("  db: {db}");
    println!();

    let engine = if db == ":memory:" {
        LedgerEngine::in_memory()?
    } else {
        LedgerEngine::open(db)?
    };

    // ── Seed collaborators and products ─────────────────────────────
    let store = engine.store();
    store.insert_customer("cust-1", "Amina Okafor")?;
    store.insert_customer("cust-2", "Daniel Mwangi")?;
    store.insert_branch("branch-1", "Main Street")?;

    let loan_type = engine.loan_types().create(NewLoanType {
        name: "Personal Loan".into(),
        interest_rate: Rate::from_percent(dec!(12)),
        min_amount: Money::from_major(1_000),
        max_amount: Money::from_major(50_000),
        min_term_months: 3,
        max_term_months: 24,
        payment_frequency: PaymentFrequency::Monthly,
    })?;

    // ── Loan lifecycle ─────────────────────────────────────────────
    let application = engine.applications().create(NewApplication {
        customer_id: "cust-1".into(),
        loan_type_id: loan_type.loan_type_id.clone(),
        branch_id: Some("branch-1".into()),
        principal_amount: Money::from_major(10_000),
        term_months: 12,
        purpose: Some("working capital".into()),
    })?;
    println!("application {} created (pending)", application.application_number);

    let outcome = engine.applications().decide(
        &application.application_id,
        ApplicationStatus::Approved,
        "officer-1",
        Some("approved on income review"),
    )?;
    let loan = outcome.loan.context("approval creates a loan")?;
    println!(
        "loan {} active: principal {}, installment {} over {} months",
        loan.loan_number, loan.principal_amount, loan.monthly_payment, loan.term_months
    );

    let payments = engine.payments();
    for _ in 0..2 {
        let payment = payments.create(NewPayment {
            loan_id: loan.loan_id.clone(),
            amount: Money::from_major(5_000),
            principal_amount: Money::from_major(5_000),
            interest_amount: Money::ZERO,
            payment_date: Utc::now(),
            method: PaymentMethod::BankTransfer,
            reference: None,
            recorded_by: "teller-1".into(),
        })?;
        payments.verify(&payment.payment_id, VerifyAction::Approve, "officer-1", None)?;
    }
    let paid = engine.loans().get(&loan.loan_id)?;
    println!("after two payments: balance {}, status {}", paid.balance, paid.status);

    let last = payments
        .list(&lending_core::PaymentFilter {
            loan_id: Some(loan.loan_id.clone()),
            ..Default::default()
        })?
        .items
        .into_iter()
        .next()
        .context("payments exist")?;
    payments.reverse(&last.payment_id, "teller keyed the wrong amount")?;
    let reversed = engine.loans().get(&loan.loan_id)?;
    println!(
        "after reversal: balance {}, status {}",
        reversed.balance, reversed.status
    );

    // ── Savings round ──────────────────────────────────────────────
    let savings = engine.savings();
    let saving_type = savings.create_type(NewSavingType {
        name: "Regular Savings".into(),
        interest_rate: Rate::from_percent(dec!(2)),
        min_balance: Money::from_major(100),
        withdrawal_limit: Some(3),
    })?;
    let acct_a = savings.create_account("cust-1", &saving_type.saving_type_id, Some(Money::from_major(1_000)))?;
    let acct_b = savings.create_account("cust-2", &saving_type.saving_type_id, None)?;

    savings.deposit(&acct_a.account_id, Money::from_major(500), "teller-1")?;
    savings.withdraw(&acct_a.account_id, Money::from_major(200), "teller-1")?;
    savings.transfer(&acct_a.account_id, &acct_b.account_id, Money::from_major(300), "teller-1")?;

    // ── Summary ────────────────────────────────────────────────────
    let summary = engine.loans().calculate_balance(&loan.loan_id)?;
    println!();
    println!("=== RUN SUMMARY ===");
    println!("  loan {}", reversed.loan_number);
    println!("    ledger balance:    {}", reversed.balance);
    println!("    reporting balance: {}", summary.balance);
    println!("    total payments:    {}", summary.total_payments);
    for account_id in [&acct_a.account_id, &acct_b.account_id] {
        let account = savings.get_account(account_id)?;
        println!("  account {} balance: {}", account.account_id, account.balance);
    }
    println!("  ledger transactions: {}", savings.transaction_count()?);

    Ok(())
}
