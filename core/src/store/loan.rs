//! Loan queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::LedgerResult;
use crate::loans::Loan;
use crate::types::LoanStatus;

const COLUMNS: &str = "loan_id, loan_number, application_id, customer_id, loan_type_id,
                       branch_id, principal_amount, interest_rate, term_months,
                       monthly_payment, total_payment, total_interest, balance,
                       disbursement_date, due_date, last_payment_date, status,
                       status_updated_at, updated_by, status_comments, created_at,
                       deleted_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Loan> {
    Ok(Loan {
        loan_id: row.get(0)?,
        loan_number: row.get(1)?,
        application_id: row.get(2)?,
        customer_id: row.get(3)?,
        loan_type_id: row.get(4)?,
        branch_id: row.get(5)?,
        principal_amount: row.get(6)?,
        interest_rate: row.get(7)?,
        term_months: row.get::<_, i64>(8)? as u32,
        monthly_payment: row.get(9)?,
        total_payment: row.get(10)?,
        total_interest: row.get(11)?,
        balance: row.get(12)?,
        disbursement_date: row.get(13)?,
        due_date: row.get(14)?,
        last_payment_date: row.get(15)?,
        status: row.get(16)?,
        status_updated_at: row.get(17)?,
        updated_by: row.get(18)?,
        status_comments: row.get(19)?,
        created_at: row.get(20)?,
        deleted_at: row.get(21)?,
    })
}

pub(crate) fn insert(conn: &Connection, l: &Loan) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO loan
             (loan_id, loan_number, application_id, customer_id, loan_type_id, branch_id,
              principal_amount, interest_rate, term_months, monthly_payment, total_payment,
              total_interest, balance, disbursement_date, due_date, last_payment_date,
              status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            l.loan_id,
            l.loan_number,
            l.application_id,
            l.customer_id,
            l.loan_type_id,
            l.branch_id,
            l.principal_amount,
            l.interest_rate,
            l.term_months as i64,
            l.monthly_payment,
            l.total_payment,
            l.total_interest,
            l.balance,
            l.disbursement_date,
            l.due_date,
            l.last_payment_date,
            l.status,
            l.created_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn by_id(
    conn: &Connection,
    id: &str,
    include_deleted: bool,
) -> LedgerResult<Option<Loan>> {
    let sql = if include_deleted {
        format!("SELECT {COLUMNS} FROM loan WHERE loan_id = ?1")
    } else {
        format!("SELECT {COLUMNS} FROM loan WHERE loan_id = ?1 AND deleted_at IS NULL")
    };
    Ok(conn.query_row(&sql, params![id], map_row).optional()?)
}

pub(crate) fn by_number(conn: &Connection, loan_number: &str) -> LedgerResult<Option<Loan>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM loan WHERE loan_number = ?1 AND deleted_at IS NULL"),
            params![loan_number],
            map_row,
        )
        .optional()?)
}

pub(crate) fn by_application(
    conn: &Connection,
    application_id: &str,
) -> LedgerResult<Option<Loan>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM loan WHERE application_id = ?1"),
            params![application_id],
            map_row,
        )
        .optional()?)
}

pub(crate) fn list_by_customer(conn: &Connection, customer_id: &str) -> LedgerResult<Vec<Loan>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM loan
         WHERE customer_id = ?1 AND deleted_at IS NULL
         ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(params![customer_id], map_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn list(
    conn: &Connection,
    status: Option<LoanStatus>,
    limit: u32,
    offset: u32,
) -> LedgerResult<Vec<Loan>> {
    let rows = match status {
        Some(status) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM loan
                 WHERE status = ?1 AND deleted_at IS NULL
                 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt.query_map(params![status, limit as i64, offset as i64], map_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM loan
                 WHERE deleted_at IS NULL
                 ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
            ))?;
            let rows = stmt.query_map(params![limit as i64, offset as i64], map_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok(rows)
}

pub(crate) fn count(conn: &Connection, status: Option<LoanStatus>) -> LedgerResult<i64> {
    let count: i64 = match status {
        Some(status) => conn.query_row(
            "SELECT COUNT(*) FROM loan WHERE status = ?1 AND deleted_at IS NULL",
            params![status],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM loan WHERE deleted_at IS NULL",
            [],
            |row| row.get(0),
        )?,
    };
    Ok(count)
}

/// Full-row update; the caller owns which fields actually changed.
pub(crate) fn update_row(conn: &Connection, l: &Loan) -> LedgerResult<()> {
    conn.execute(
        "UPDATE loan
         SET branch_id = ?1, balance = ?2, disbursement_date = ?3, due_date = ?4,
             last_payment_date = ?5, status = ?6, status_updated_at = ?7,
             updated_by = ?8, status_comments = ?9
         WHERE loan_id = ?10",
        params![
            l.branch_id,
            l.balance,
            l.disbursement_date,
            l.due_date,
            l.last_payment_date,
            l.status,
            l.status_updated_at,
            l.updated_by,
            l.status_comments,
            l.loan_id,
        ],
    )?;
    Ok(())
}

pub(crate) fn soft_delete(conn: &Connection, id: &str, now: DateTime<Utc>) -> LedgerResult<()> {
    conn.execute(
        "UPDATE loan SET deleted_at = ?1 WHERE loan_id = ?2",
        params![now, id],
    )?;
    Ok(())
}

pub(crate) fn restore_row(conn: &Connection, id: &str) -> LedgerResult<()> {
    conn.execute(
        "UPDATE loan SET deleted_at = NULL WHERE loan_id = ?1",
        params![id],
    )?;
    Ok(())
}
