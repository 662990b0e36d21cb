//! Shared primitive types used across the entire engine.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

/// A stable, unique identifier for any entity in the ledger.
pub type EntityId = String;

/// Declares a status/kind enum together with its TEXT representation.
/// The string form is the persistence codec: it is what lands in the
/// database and what comes back out.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        concat!("unknown ", stringify!($name), ": {}"), other
                    )),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum!(
    /// Lifecycle of a loan application. `Pending` is the only mutable state;
    /// the other three are terminal.
    ApplicationStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Cancelled => "cancelled",
    }
);

text_enum!(
    LoanStatus {
        Pending => "pending",
        Active => "active",
        Paid => "paid",
        Defaulted => "defaulted",
        Cancelled => "cancelled",
    }
);

text_enum!(
    /// Payment sub-state machine: pending -> {completed, rejected},
    /// completed -> reversed. Reversed and rejected are terminal.
    PaymentStatus {
        Pending => "pending",
        Completed => "completed",
        Reversed => "reversed",
        Rejected => "rejected",
    }
);

text_enum!(
    PaymentMethod {
        Cash => "cash",
        BankTransfer => "bank_transfer",
        MobileMoney => "mobile_money",
        Check => "check",
        Other => "other",
    }
);

text_enum!(
    PaymentFrequency {
        Monthly => "monthly",
        Weekly => "weekly",
        Biweekly => "biweekly",
        Quarterly => "quarterly",
        Annually => "annually",
    }
);

text_enum!(
    AccountStatus {
        Active => "ACTIVE",
        Inactive => "INACTIVE",
        Closed => "CLOSED",
    }
);

text_enum!(
    TransactionType {
        Deposit => "DEPOSIT",
        Withdrawal => "WITHDRAWAL",
        Transfer => "TRANSFER",
        Interest => "INTEREST",
    }
);

text_enum!(
    TransactionStatus {
        Completed => "COMPLETED",
        Failed => "FAILED",
    }
);

/// One entry in an application's append-only decision history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub status: ApplicationStatus,
    pub decided_at: DateTime<Utc>,
    pub decided_by: EntityId,
    pub comments: Option<String>,
}

/// One page of a listing plus the unpaginated total.
#[derive(Debug, Clone)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}
