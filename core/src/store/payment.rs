//! Loan payment queries.

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::error::LedgerResult;
use crate::money::Money;
use crate::payments::{LoanPayment, PaymentFilter};

const COLUMNS: &str = "payment_id, loan_id, payment_number, amount, principal_amount,
                       interest_amount, payment_date, method, reference, recorded_by,
                       status, verified_by, verified_at, verification_notes, created_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<LoanPayment> {
    Ok(LoanPayment {
        payment_id: row.get(0)?,
        loan_id: row.get(1)?,
        payment_number: row.get::<_, i64>(2)? as u32,
        amount: row.get(3)?,
        principal_amount: row.get(4)?,
        interest_amount: row.get(5)?,
        payment_date: row.get(6)?,
        method: row.get(7)?,
        reference: row.get(8)?,
        recorded_by: row.get(9)?,
        status: row.get(10)?,
        verified_by: row.get(11)?,
        verified_at: row.get(12)?,
        verification_notes: row.get(13)?,
        created_at: row.get(14)?,
    })
}

pub(crate) fn insert(conn: &Connection, p: &LoanPayment) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO loan_payment
             (payment_id, loan_id, payment_number, amount, principal_amount,
              interest_amount, payment_date, method, reference, recorded_by,
              status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            p.payment_id,
            p.loan_id,
            p.payment_number as i64,
            p.amount,
            p.principal_amount,
            p.interest_amount,
            p.payment_date,
            p.method,
            p.reference,
            p.recorded_by,
            p.status,
            p.created_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn by_id(conn: &Connection, id: &str) -> LedgerResult<Option<LoanPayment>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM loan_payment WHERE payment_id = ?1"),
            params![id],
            map_row,
        )
        .optional()?)
}

/// Highest payment number assigned on the loan so far, 0 if none. Callers
/// must hold the write transaction so number assignment is serialized.
pub(crate) fn max_payment_number(conn: &Connection, loan_id: &str) -> LedgerResult<u32> {
    let max: i64 = conn.query_row(
        "SELECT COALESCE(MAX(payment_number), 0) FROM loan_payment WHERE loan_id = ?1",
        params![loan_id],
        |row| row.get(0),
    )?;
    Ok(max as u32)
}

/// Status + verification metadata write.
pub(crate) fn update_row(conn: &Connection, p: &LoanPayment) -> LedgerResult<()> {
    conn.execute(
        "UPDATE loan_payment
         SET status = ?1, verified_by = ?2, verified_at = ?3, verification_notes = ?4
         WHERE payment_id = ?5",
        params![
            p.status,
            p.verified_by,
            p.verified_at,
            p.verification_notes,
            p.payment_id,
        ],
    )?;
    Ok(())
}

/// Writes the fields that are editable while the payment is pending.
pub(crate) fn update_editable(conn: &Connection, p: &LoanPayment) -> LedgerResult<()> {
    conn.execute(
        "UPDATE loan_payment
         SET amount = ?1, principal_amount = ?2, interest_amount = ?3,
             payment_date = ?4, method = ?5, reference = ?6
         WHERE payment_id = ?7",
        params![
            p.amount,
            p.principal_amount,
            p.interest_amount,
            p.payment_date,
            p.method,
            p.reference,
            p.payment_id,
        ],
    )?;
    Ok(())
}

fn filter_clause(filter: &PaymentFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<&'static str> = Vec::new();
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(loan_id) = &filter.loan_id {
        clauses.push("loan_id = ?");
        args.push(Box::new(loan_id.clone()));
    }
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        args.push(Box::new(status));
    }
    if let Some(method) = filter.method {
        clauses.push("method = ?");
        args.push(Box::new(method));
    }
    if let Some(from) = filter.date_from {
        clauses.push("payment_date >= ?");
        args.push(Box::new(from));
    }
    if let Some(to) = filter.date_to {
        clauses.push("payment_date <= ?");
        args.push(Box::new(to));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (where_sql, args)
}

pub(crate) fn list(
    conn: &Connection,
    filter: &PaymentFilter,
    limit: u32,
    offset: u32,
) -> LedgerResult<Vec<LoanPayment>> {
    let (where_sql, mut args) = filter_clause(filter);
    let sql = format!(
        "SELECT {COLUMNS} FROM loan_payment{where_sql}
         ORDER BY payment_date DESC LIMIT ? OFFSET ?"
    );
    args.push(Box::new(limit as i64));
    args.push(Box::new(offset as i64));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args.iter().map(|a| a.as_ref())), map_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn count(conn: &Connection, filter: &PaymentFilter) -> LedgerResult<i64> {
    let (where_sql, args) = filter_clause(filter);
    let sql = format!("SELECT COUNT(*) FROM loan_payment{where_sql}");
    let count: i64 = conn.query_row(
        &sql,
        params_from_iter(args.iter().map(|a| a.as_ref())),
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Amounts of completed payments, summed exactly by the caller.
pub(crate) fn completed_amounts(conn: &Connection, loan_id: &str) -> LedgerResult<Vec<Money>> {
    let mut stmt = conn.prepare(
        "SELECT amount FROM loan_payment
         WHERE loan_id = ?1 AND status = 'completed'
         ORDER BY payment_number ASC",
    )?;
    let rows = stmt.query_map(params![loan_id], |row| row.get(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn last_completed_date(
    conn: &Connection,
    loan_id: &str,
) -> LedgerResult<Option<DateTime<Utc>>> {
    Ok(conn
        .query_row(
            "SELECT payment_date FROM loan_payment
             WHERE loan_id = ?1 AND status = 'completed'
             ORDER BY payment_date DESC LIMIT 1",
            params![loan_id],
            |row| row.get(0),
        )
        .optional()?)
}
