//! Loan application queries.
//!
//! The decision history is a JSON array column; it is decoded into
//! `Vec<Decision>` here at the load boundary and nowhere else.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::applications::LoanApplication;
use crate::error::LedgerResult;
use crate::types::Decision;

const COLUMNS: &str = "application_id, application_number, customer_id, loan_type_id,
                       branch_id, principal_amount, term_months, purpose, status,
                       decision_history, final_decision, final_decision_at,
                       decision_by, created_at, deleted_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<LoanApplication> {
    let history_json: String = row.get(9)?;
    let decision_history: Vec<Decision> = serde_json::from_str(&history_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(LoanApplication {
        application_id: row.get(0)?,
        application_number: row.get(1)?,
        customer_id: row.get(2)?,
        loan_type_id: row.get(3)?,
        branch_id: row.get(4)?,
        principal_amount: row.get(5)?,
        term_months: row.get::<_, i64>(6)? as u32,
        purpose: row.get(7)?,
        status: row.get(8)?,
        decision_history,
        final_decision: row.get(10)?,
        final_decision_at: row.get(11)?,
        decision_by: row.get(12)?,
        created_at: row.get(13)?,
        deleted_at: row.get(14)?,
    })
}

pub(crate) fn insert(conn: &Connection, a: &LoanApplication) -> LedgerResult<()> {
    let history = serde_json::to_string(&a.decision_history)?;
    conn.execute(
        "INSERT INTO loan_application
             (application_id, application_number, customer_id, loan_type_id, branch_id,
              principal_amount, term_months, purpose, status, decision_history, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            a.application_id,
            a.application_number,
            a.customer_id,
            a.loan_type_id,
            a.branch_id,
            a.principal_amount,
            a.term_months as i64,
            a.purpose,
            a.status,
            history,
            a.created_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn by_id(
    conn: &Connection,
    id: &str,
    include_deleted: bool,
) -> LedgerResult<Option<LoanApplication>> {
    let sql = if include_deleted {
        format!("SELECT {COLUMNS} FROM loan_application WHERE application_id = ?1")
    } else {
        format!(
            "SELECT {COLUMNS} FROM loan_application
             WHERE application_id = ?1 AND deleted_at IS NULL"
        )
    };
    Ok(conn.query_row(&sql, params![id], map_row).optional()?)
}

pub(crate) fn list_by_customer(
    conn: &Connection,
    customer_id: &str,
) -> LedgerResult<Vec<LoanApplication>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM loan_application
         WHERE customer_id = ?1 AND deleted_at IS NULL
         ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(params![customer_id], map_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn list_all(conn: &Connection) -> LedgerResult<Vec<LoanApplication>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM loan_application
         WHERE deleted_at IS NULL
         ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map([], map_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Writes the mutable-while-pending fields.
pub(crate) fn update_fields(conn: &Connection, a: &LoanApplication) -> LedgerResult<()> {
    conn.execute(
        "UPDATE loan_application
         SET principal_amount = ?1, term_months = ?2, purpose = ?3
         WHERE application_id = ?4",
        params![
            a.principal_amount,
            a.term_months as i64,
            a.purpose,
            a.application_id
        ],
    )?;
    Ok(())
}

/// Writes the decision outcome: status, final-decision fields and the
/// appended history.
pub(crate) fn update_decision(conn: &Connection, a: &LoanApplication) -> LedgerResult<()> {
    let history = serde_json::to_string(&a.decision_history)?;
    conn.execute(
        "UPDATE loan_application
         SET status = ?1, decision_history = ?2, final_decision = ?3,
             final_decision_at = ?4, decision_by = ?5
         WHERE application_id = ?6",
        params![
            a.status,
            history,
            a.final_decision,
            a.final_decision_at,
            a.decision_by,
            a.application_id,
        ],
    )?;
    Ok(())
}

pub(crate) fn soft_delete(conn: &Connection, id: &str, now: DateTime<Utc>) -> LedgerResult<()> {
    conn.execute(
        "UPDATE loan_application SET deleted_at = ?1 WHERE application_id = ?2",
        params![now, id],
    )?;
    Ok(())
}

pub(crate) fn restore_row(conn: &Connection, id: &str) -> LedgerResult<()> {
    conn.execute(
        "UPDATE loan_application SET deleted_at = NULL WHERE application_id = ?1",
        params![id],
    )?;
    Ok(())
}
