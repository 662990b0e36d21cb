//! Savings accounts and their transaction ledger.
//!
//! Deposits, withdrawals and transfers follow the same discipline as the
//! loan payment ledger: take the write lock, read the current balance,
//! validate against it, write the new balance and the transaction record in
//! the same commit. A transfer touches both accounts in ascending
//! primary-key order.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::money::{Money, Rate};
use crate::store::{self, LedgerStore};
use crate::types::{AccountStatus, EntityId, TransactionStatus, TransactionType};

#[derive(Debug, Clone)]
pub struct SavingType {
    pub saving_type_id: EntityId,
    pub name: String,
    /// Interest credited per posting run, as a percentage of balance.
    pub interest_rate: Rate,
    pub min_balance: Money,
    /// Completed withdrawals allowed per calendar month; None = unlimited.
    pub withdrawal_limit: Option<u32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSavingType {
    pub name: String,
    pub interest_rate: Rate,
    pub min_balance: Money,
    pub withdrawal_limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SavingAccount {
    pub account_id: EntityId,
    pub customer_id: EntityId,
    pub saving_type_id: EntityId,
    pub balance: Money,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AccountTransaction {
    pub transaction_id: EntityId,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub from_account_id: Option<EntityId>,
    pub to_account_id: Option<EntityId>,
    pub status: TransactionStatus,
    pub recorded_by: Option<EntityId>,
    pub transaction_date: DateTime<Utc>,
}

/// Result of an interest posting run.
#[derive(Debug, Clone)]
pub struct InterestPosting {
    pub account: SavingAccount,
    pub interest: Money,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub transaction_type: Option<TransactionType>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

pub struct SavingsService<'a> {
    store: &'a LedgerStore,
    config: &'a LedgerConfig,
}

impl<'a> SavingsService<'a> {
    pub(crate) fn new(store: &'a LedgerStore, config: &'a LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn create_type(&self, new: NewSavingType) -> LedgerResult<SavingType> {
        if new.min_balance.is_negative() {
            return Err(LedgerError::validation(format!(
                "minimum balance cannot be negative, got {}",
                new.min_balance
            )));
        }
        let saving_type = SavingType {
            saving_type_id: Uuid::new_v4().to_string(),
            name: new.name,
            interest_rate: new.interest_rate,
            min_balance: new.min_balance,
            withdrawal_limit: new.withdrawal_limit,
            created_at: Utc::now(),
        };
        match store::saving::insert_type(self.store.conn(), &saving_type) {
            Ok(()) => Ok(saving_type),
            Err(e) if e.is_unique_violation() => Err(LedgerError::conflict(format!(
                "saving type '{}' already exists",
                saving_type.name
            ))),
            Err(e) => Err(e),
        }
    }

    /// Open an account. The initial balance defaults to the saving type's
    /// minimum and may not sit below it; one account per (customer, type).
    pub fn create_account(
        &self,
        customer_id: &str,
        saving_type_id: &str,
        initial_balance: Option<Money>,
    ) -> LedgerResult<SavingAccount> {
        self.store.exclusive_tx(self.config.busy_retries, |tx| {
            if !store::customer_exists(tx, customer_id)? {
                return Err(LedgerError::not_found("customer", customer_id));
            }
            let saving_type = store::saving::type_by_id(tx, saving_type_id)?
                .ok_or_else(|| LedgerError::not_found("saving type", saving_type_id))?;

            if store::saving::account_for(tx, customer_id, saving_type_id)?.is_some() {
                return Err(LedgerError::conflict(format!(
                    "customer '{customer_id}' already has a '{}' account",
                    saving_type.name
                )));
            }

            let balance = initial_balance.unwrap_or(saving_type.min_balance);
            if balance < saving_type.min_balance {
                return Err(LedgerError::validation(format!(
                    "initial balance {balance} is below the required minimum {}",
                    saving_type.min_balance
                )));
            }

            let account = SavingAccount {
                account_id: Uuid::new_v4().to_string(),
                customer_id: customer_id.to_string(),
                saving_type_id: saving_type_id.to_string(),
                balance,
                status: AccountStatus::Active,
                created_at: Utc::now(),
            };
            store::saving::insert_account(tx, &account)?;
            log::info!(
                "saving account {} opened for customer {} with {}",
                account.account_id,
                customer_id,
                balance
            );
            Ok(account)
        })
    }

    pub fn deposit(
        &self,
        account_id: &str,
        amount: Money,
        recorded_by: &str,
    ) -> LedgerResult<SavingAccount> {
        require_positive(amount)?;
        let account = self.store.exclusive_tx(self.config.busy_retries, |tx| {
            let mut account = store::saving::account_by_id(tx, account_id)?
                .ok_or_else(|| LedgerError::not_found("saving account", account_id))?;
            require_active(&account, "deposit into")?;

            let record = AccountTransaction {
                transaction_id: Uuid::new_v4().to_string(),
                transaction_type: TransactionType::Deposit,
                amount,
                from_account_id: None,
                to_account_id: Some(account.account_id.clone()),
                status: TransactionStatus::Completed,
                recorded_by: Some(recorded_by.to_string()),
                transaction_date: Utc::now(),
            };
            store::saving::insert_transaction(tx, &record)?;

            account.balance = account.balance + amount;
            store::saving::update_account_balance(tx, &account.account_id, account.balance)?;
            Ok(account)
        })?;
        log::debug!("deposit of {} into {}", amount, account_id);
        Ok(account)
    }

    /// Withdraw, enforcing sufficient funds, the saving type's
    /// minimum-balance floor and its monthly withdrawal-count limit.
    pub fn withdraw(
        &self,
        account_id: &str,
        amount: Money,
        recorded_by: &str,
    ) -> LedgerResult<SavingAccount> {
        require_positive(amount)?;
        let account = self.store.exclusive_tx(self.config.busy_retries, |tx| {
            let mut account = store::saving::account_by_id(tx, account_id)?
                .ok_or_else(|| LedgerError::not_found("saving account", account_id))?;
            require_active(&account, "withdraw from")?;

            let saving_type = store::saving::type_by_id(tx, &account.saving_type_id)?
                .ok_or_else(|| LedgerError::not_found("saving type", &account.saving_type_id))?;

            if account.balance < amount {
                return Err(LedgerError::validation(format!(
                    "insufficient funds: balance {}, requested {amount}",
                    account.balance
                )));
            }
            let new_balance = account.balance - amount;
            if new_balance < saving_type.min_balance {
                return Err(LedgerError::validation(format!(
                    "withdrawal would leave {new_balance}, below the minimum balance {}",
                    saving_type.min_balance
                )));
            }

            if let Some(limit) = saving_type.withdrawal_limit {
                let used =
                    store::saving::monthly_withdrawal_count(tx, account_id, month_start()?)?;
                if used >= limit as i64 {
                    return Err(LedgerError::validation(format!(
                        "monthly withdrawal limit of {limit} reached"
                    )));
                }
            }

            let record = AccountTransaction {
                transaction_id: Uuid::new_v4().to_string(),
                transaction_type: TransactionType::Withdrawal,
                amount,
                from_account_id: Some(account.account_id.clone()),
                to_account_id: None,
                status: TransactionStatus::Completed,
                recorded_by: Some(recorded_by.to_string()),
                transaction_date: Utc::now(),
            };
            store::saving::insert_transaction(tx, &record)?;

            account.balance = new_balance;
            store::saving::update_account_balance(tx, &account.account_id, account.balance)?;
            Ok(account)
        })?;
        log::debug!("withdrawal of {} from {}", amount, account_id);
        Ok(account)
    }

    /// Move funds between two accounts atomically. Rows are read and written
    /// in ascending account-id order so concurrent opposite-direction
    /// transfers cannot deadlock.
    pub fn transfer(
        &self,
        from_account_id: &str,
        to_account_id: &str,
        amount: Money,
        recorded_by: &str,
    ) -> LedgerResult<(SavingAccount, SavingAccount)> {
        require_positive(amount)?;
        if from_account_id == to_account_id {
            return Err(LedgerError::validation(
                "cannot transfer an account to itself",
            ));
        }

        let result = self.store.exclusive_tx(self.config.busy_retries, |tx| {
            let mut first_id = from_account_id;
            let mut second_id = to_account_id;
            if first_id > second_id {
                std::mem::swap(&mut first_id, &mut second_id);
            }
            let first = store::saving::account_by_id(tx, first_id)?
                .ok_or_else(|| LedgerError::not_found("saving account", first_id))?;
            let second = store::saving::account_by_id(tx, second_id)?
                .ok_or_else(|| LedgerError::not_found("saving account", second_id))?;

            let (mut from, mut to) = if first.account_id == from_account_id {
                (first, second)
            } else {
                (second, first)
            };

            require_active(&from, "transfer from")?;
            require_active(&to, "transfer into")?;

            if from.balance < amount {
                return Err(LedgerError::validation(format!(
                    "insufficient funds: balance {}, requested {amount}",
                    from.balance
                )));
            }

            let record = AccountTransaction {
                transaction_id: Uuid::new_v4().to_string(),
                transaction_type: TransactionType::Transfer,
                amount,
                from_account_id: Some(from.account_id.clone()),
                to_account_id: Some(to.account_id.clone()),
                status: TransactionStatus::Completed,
                recorded_by: Some(recorded_by.to_string()),
                transaction_date: Utc::now(),
            };
            store::saving::insert_transaction(tx, &record)?;

            from.balance = from.balance - amount;
            to.balance = to.balance + amount;
            // write-back in id order as well
            if from.account_id < to.account_id {
                store::saving::update_account_balance(tx, &from.account_id, from.balance)?;
                store::saving::update_account_balance(tx, &to.account_id, to.balance)?;
            } else {
                store::saving::update_account_balance(tx, &to.account_id, to.balance)?;
                store::saving::update_account_balance(tx, &from.account_id, from.balance)?;
            }
            Ok((from, to))
        })?;
        log::debug!(
            "transfer of {} from {} to {}",
            amount,
            from_account_id,
            to_account_id
        );
        Ok(result)
    }

    /// Credit one period of interest (`balance * rate%`) to an active
    /// account, recording a saving_interest row in the same commit.
    pub fn post_interest(&self, account_id: &str) -> LedgerResult<InterestPosting> {
        self.store.exclusive_tx(self.config.busy_retries, |tx| {
            let mut account = store::saving::account_by_id(tx, account_id)?
                .ok_or_else(|| LedgerError::not_found("saving account", account_id))?;
            require_active(&account, "post interest to")?;

            let saving_type = store::saving::type_by_id(tx, &account.saving_type_id)?
                .ok_or_else(|| LedgerError::not_found("saving type", &account.saving_type_id))?;

            let interest = Money::new(
                account.balance.as_decimal() * saving_type.interest_rate.as_fraction(),
            );
            store::saving::insert_interest(tx, account_id, interest, Utc::now())?;

            account.balance = account.balance + interest;
            store::saving::update_account_balance(tx, &account.account_id, account.balance)?;
            log::info!("interest of {} posted to {}", interest, account_id);
            Ok(InterestPosting { account, interest })
        })
    }

    /// ACTIVE <-> INACTIVE, either -> CLOSED; closed accounts stay closed,
    /// and an account holding funds cannot be closed.
    pub fn update_account_status(
        &self,
        account_id: &str,
        status: AccountStatus,
    ) -> LedgerResult<SavingAccount> {
        self.store.exclusive_tx(self.config.busy_retries, |tx| {
            let mut account = store::saving::account_by_id(tx, account_id)?
                .ok_or_else(|| LedgerError::not_found("saving account", account_id))?;

            let allowed = match account.status {
                AccountStatus::Active => {
                    matches!(status, AccountStatus::Inactive | AccountStatus::Closed)
                }
                AccountStatus::Inactive => {
                    matches!(status, AccountStatus::Active | AccountStatus::Closed)
                }
                AccountStatus::Closed => false,
            };
            if !allowed {
                return Err(LedgerError::invalid_state(
                    "saving account",
                    account.status.as_str(),
                    "transition",
                ));
            }
            if status == AccountStatus::Closed && account.balance.is_positive() {
                return Err(LedgerError::validation(format!(
                    "cannot close account holding {}",
                    account.balance
                )));
            }

            account.status = status;
            store::saving::update_account_status(tx, account_id, status)?;
            Ok(account)
        })
    }

    pub fn get_account(&self, account_id: &str) -> LedgerResult<SavingAccount> {
        store::saving::account_by_id(self.store.conn(), account_id)?
            .ok_or_else(|| LedgerError::not_found("saving account", account_id))
    }

    pub fn accounts_by_customer(&self, customer_id: &str) -> LedgerResult<Vec<SavingAccount>> {
        store::saving::accounts_by_customer(self.store.conn(), customer_id)
    }

    pub fn balance(&self, account_id: &str) -> LedgerResult<Money> {
        Ok(self.get_account(account_id)?.balance)
    }

    /// Total rows in the transaction ledger. Used by run summaries and by
    /// tests asserting that failed operations wrote nothing.
    pub fn transaction_count(&self) -> LedgerResult<i64> {
        store::saving::transaction_count(self.store.conn())
    }

    /// Transactions touching the account, newest first.
    pub fn transactions(
        &self,
        account_id: &str,
        filter: &TransactionFilter,
    ) -> LedgerResult<Vec<AccountTransaction>> {
        let limit = filter.limit.unwrap_or(self.config.default_page_limit).max(1);
        store::saving::transactions_for_account(self.store.conn(), account_id, filter, limit)
    }
}

fn require_positive(amount: Money) -> LedgerResult<()> {
    if !amount.is_positive() {
        return Err(LedgerError::validation(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

fn require_active(account: &SavingAccount, attempted: &'static str) -> LedgerResult<()> {
    if account.status != AccountStatus::Active {
        return Err(LedgerError::invalid_state(
            "saving account",
            account.status.as_str(),
            attempted,
        ));
    }
    Ok(())
}

/// First instant of the current UTC calendar month.
fn month_start() -> LedgerResult<DateTime<Utc>> {
    let now = Utc::now();
    match Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0) {
        chrono::LocalResult::Single(dt) => Ok(dt),
        _ => Err(LedgerError::integrity("could not compute month start")),
    }
}
