//! Human-readable document numbers: "LN-20260807-48271".
//!
//! The random suffix gives 90 000 values per prefix per day; collisions are
//! caught by the unique constraint on the column and retried by the caller
//! up to `LedgerConfig::number_attempts` times.

use chrono::{DateTime, Utc};
use rand::Rng;

pub fn document_number(prefix: &str, now: DateTime<Utc>) -> String {
    let date_part = now.format("%Y%m%d");
    let suffix: u32 = rand::thread_rng().gen_range(10_000..100_000);
    format!("{prefix}-{date_part}-{suffix}")
}
