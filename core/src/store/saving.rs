//! Saving account, saving type and transaction queries.

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::error::LedgerResult;
use crate::money::Money;
use crate::savings::{AccountTransaction, SavingAccount, SavingType, TransactionFilter};
use crate::types::AccountStatus;

fn map_type(row: &Row<'_>) -> rusqlite::Result<SavingType> {
    Ok(SavingType {
        saving_type_id: row.get(0)?,
        name: row.get(1)?,
        interest_rate: row.get(2)?,
        min_balance: row.get(3)?,
        withdrawal_limit: row.get::<_, Option<i64>>(4)?.map(|v| v as u32),
        created_at: row.get(5)?,
    })
}

fn map_account(row: &Row<'_>) -> rusqlite::Result<SavingAccount> {
    Ok(SavingAccount {
        account_id: row.get(0)?,
        customer_id: row.get(1)?,
        saving_type_id: row.get(2)?,
        balance: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_transaction(row: &Row<'_>) -> rusqlite::Result<AccountTransaction> {
    Ok(AccountTransaction {
        transaction_id: row.get(0)?,
        transaction_type: row.get(1)?,
        amount: row.get(2)?,
        from_account_id: row.get(3)?,
        to_account_id: row.get(4)?,
        status: row.get(5)?,
        recorded_by: row.get(6)?,
        transaction_date: row.get(7)?,
    })
}

pub(crate) fn insert_type(conn: &Connection, t: &SavingType) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO saving_type
             (saving_type_id, name, interest_rate, min_balance, withdrawal_limit, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            t.saving_type_id,
            t.name,
            t.interest_rate,
            t.min_balance,
            t.withdrawal_limit.map(|v| v as i64),
            t.created_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn type_by_id(conn: &Connection, id: &str) -> LedgerResult<Option<SavingType>> {
    Ok(conn
        .query_row(
            "SELECT saving_type_id, name, interest_rate, min_balance, withdrawal_limit, created_at
             FROM saving_type WHERE saving_type_id = ?1",
            params![id],
            map_type,
        )
        .optional()?)
}

pub(crate) fn insert_account(conn: &Connection, a: &SavingAccount) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO saving_account
             (account_id, customer_id, saving_type_id, balance, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            a.account_id,
            a.customer_id,
            a.saving_type_id,
            a.balance,
            a.status,
            a.created_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn account_by_id(conn: &Connection, id: &str) -> LedgerResult<Option<SavingAccount>> {
    Ok(conn
        .query_row(
            "SELECT account_id, customer_id, saving_type_id, balance, status, created_at
             FROM saving_account WHERE account_id = ?1",
            params![id],
            map_account,
        )
        .optional()?)
}

/// The customer's account of this saving type, if one exists.
pub(crate) fn account_for(
    conn: &Connection,
    customer_id: &str,
    saving_type_id: &str,
) -> LedgerResult<Option<SavingAccount>> {
    Ok(conn
        .query_row(
            "SELECT account_id, customer_id, saving_type_id, balance, status, created_at
             FROM saving_account WHERE customer_id = ?1 AND saving_type_id = ?2",
            params![customer_id, saving_type_id],
            map_account,
        )
        .optional()?)
}

pub(crate) fn accounts_by_customer(
    conn: &Connection,
    customer_id: &str,
) -> LedgerResult<Vec<SavingAccount>> {
    let mut stmt = conn.prepare(
        "SELECT account_id, customer_id, saving_type_id, balance, status, created_at
         FROM saving_account WHERE customer_id = ?1
         ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map(params![customer_id], map_account)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn update_account_balance(
    conn: &Connection,
    account_id: &str,
    balance: Money,
) -> LedgerResult<()> {
    conn.execute(
        "UPDATE saving_account SET balance = ?1 WHERE account_id = ?2",
        params![balance, account_id],
    )?;
    Ok(())
}

pub(crate) fn update_account_status(
    conn: &Connection,
    account_id: &str,
    status: AccountStatus,
) -> LedgerResult<()> {
    conn.execute(
        "UPDATE saving_account SET status = ?1 WHERE account_id = ?2",
        params![status, account_id],
    )?;
    Ok(())
}

pub(crate) fn insert_transaction(conn: &Connection, t: &AccountTransaction) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO account_transaction
             (transaction_id, transaction_type, amount, from_account_id, to_account_id,
              status, recorded_by, transaction_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            t.transaction_id,
            t.transaction_type,
            t.amount,
            t.from_account_id,
            t.to_account_id,
            t.status,
            t.recorded_by,
            t.transaction_date,
        ],
    )?;
    Ok(())
}

/// Completed withdrawals from the account since `month_start`.
pub(crate) fn monthly_withdrawal_count(
    conn: &Connection,
    account_id: &str,
    month_start: DateTime<Utc>,
) -> LedgerResult<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM account_transaction
         WHERE from_account_id = ?1
           AND transaction_type = 'WITHDRAWAL'
           AND status = 'COMPLETED'
           AND transaction_date >= ?2",
        params![account_id, month_start],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub(crate) fn transactions_for_account(
    conn: &Connection,
    account_id: &str,
    filter: &TransactionFilter,
    limit: u32,
) -> LedgerResult<Vec<AccountTransaction>> {
    let mut sql = String::from(
        "SELECT transaction_id, transaction_type, amount, from_account_id,
                to_account_id, status, recorded_by, transaction_date
         FROM account_transaction
         WHERE (from_account_id = ? OR to_account_id = ?)",
    );
    let mut args: Vec<Box<dyn ToSql>> =
        vec![Box::new(account_id.to_string()), Box::new(account_id.to_string())];

    if let Some(tt) = filter.transaction_type {
        sql.push_str(" AND transaction_type = ?");
        args.push(Box::new(tt));
    }
    if let Some(from) = filter.date_from {
        sql.push_str(" AND transaction_date >= ?");
        args.push(Box::new(from));
    }
    if let Some(to) = filter.date_to {
        sql.push_str(" AND transaction_date <= ?");
        args.push(Box::new(to));
    }
    sql.push_str(" ORDER BY transaction_date DESC LIMIT ?");
    args.push(Box::new(limit as i64));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params_from_iter(args.iter().map(|a| a.as_ref())),
        map_transaction,
    )?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn insert_interest(
    conn: &Connection,
    account_id: &str,
    interest: Money,
    now: DateTime<Utc>,
) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO saving_interest (interest_id, account_id, interest_earned, calculated_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![uuid::Uuid::new_v4().to_string(), account_id, interest, now],
    )?;
    Ok(())
}

/// Number of rows in the transaction ledger; rollback tests assert on it.
pub(crate) fn transaction_count(conn: &Connection) -> LedgerResult<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM account_transaction", [], |row| {
        row.get(0)
    })?;
    Ok(count)
}
