//! Loan type queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::LedgerResult;
use crate::loan_types::LoanType;

const COLUMNS: &str = "loan_type_id, name, interest_rate, min_amount, max_amount,
                       min_term_months, max_term_months, payment_frequency,
                       is_active, created_at, deleted_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<LoanType> {
    Ok(LoanType {
        loan_type_id: row.get(0)?,
        name: row.get(1)?,
        interest_rate: row.get(2)?,
        min_amount: row.get(3)?,
        max_amount: row.get(4)?,
        min_term_months: row.get::<_, i64>(5)? as u32,
        max_term_months: row.get::<_, i64>(6)? as u32,
        payment_frequency: row.get(7)?,
        is_active: row.get::<_, i32>(8)? != 0,
        created_at: row.get(9)?,
        deleted_at: row.get(10)?,
    })
}

pub(crate) fn insert(conn: &Connection, t: &LoanType) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO loan_type (loan_type_id, name, interest_rate, min_amount, max_amount,
                                min_term_months, max_term_months, payment_frequency,
                                is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            t.loan_type_id,
            t.name,
            t.interest_rate,
            t.min_amount,
            t.max_amount,
            t.min_term_months as i64,
            t.max_term_months as i64,
            t.payment_frequency,
            t.is_active as i32,
            t.created_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn by_id(
    conn: &Connection,
    id: &str,
    include_deleted: bool,
) -> LedgerResult<Option<LoanType>> {
    let sql = if include_deleted {
        format!("SELECT {COLUMNS} FROM loan_type WHERE loan_type_id = ?1")
    } else {
        format!("SELECT {COLUMNS} FROM loan_type WHERE loan_type_id = ?1 AND deleted_at IS NULL")
    };
    Ok(conn.query_row(&sql, params![id], map_row).optional()?)
}

/// Name uniqueness spans soft-deleted rows.
pub(crate) fn name_taken(
    conn: &Connection,
    name: &str,
    exclude_id: Option<&str>,
) -> LedgerResult<bool> {
    let count: i64 = match exclude_id {
        Some(id) => conn.query_row(
            "SELECT COUNT(*) FROM loan_type WHERE name = ?1 AND loan_type_id != ?2",
            params![name, id],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM loan_type WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?,
    };
    Ok(count > 0)
}

pub(crate) fn list_active(conn: &Connection) -> LedgerResult<Vec<LoanType>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM loan_type
         WHERE is_active = 1 AND deleted_at IS NULL
         ORDER BY name ASC"
    ))?;
    let rows = stmt.query_map([], map_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn list_all(conn: &Connection) -> LedgerResult<Vec<LoanType>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM loan_type WHERE deleted_at IS NULL ORDER BY name ASC"
    ))?;
    let rows = stmt.query_map([], map_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn update_row(conn: &Connection, t: &LoanType) -> LedgerResult<()> {
    conn.execute(
        "UPDATE loan_type
         SET name = ?1, interest_rate = ?2, min_amount = ?3, max_amount = ?4,
             min_term_months = ?5, max_term_months = ?6, payment_frequency = ?7,
             is_active = ?8
         WHERE loan_type_id = ?9",
        params![
            t.name,
            t.interest_rate,
            t.min_amount,
            t.max_amount,
            t.min_term_months as i64,
            t.max_term_months as i64,
            t.payment_frequency,
            t.is_active as i32,
            t.loan_type_id,
        ],
    )?;
    Ok(())
}

pub(crate) fn soft_delete(
    conn: &Connection,
    id: &str,
    now: DateTime<Utc>,
) -> LedgerResult<()> {
    conn.execute(
        "UPDATE loan_type SET deleted_at = ?1 WHERE loan_type_id = ?2",
        params![now, id],
    )?;
    Ok(())
}

pub(crate) fn restore_row(conn: &Connection, id: &str) -> LedgerResult<()> {
    conn.execute(
        "UPDATE loan_type SET deleted_at = NULL WHERE loan_type_id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Loans that still hold this type hostage: anything not paid or cancelled.
pub(crate) fn non_terminal_loan_count(conn: &Connection, loan_type_id: &str) -> LedgerResult<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM loan
         WHERE loan_type_id = ?1
           AND status NOT IN ('paid', 'cancelled')
           AND deleted_at IS NULL",
        params![loan_type_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
