use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid state: {entity} is '{current}', cannot {attempted}")]
    InvalidState {
        entity: &'static str,
        current: String,
        attempted: &'static str,
    },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Integrity violation: {message}")]
    Integrity { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation {
            message: message.into(),
        }
    }

    pub fn invalid_state(
        entity: &'static str,
        current: impl Into<String>,
        attempted: &'static str,
    ) -> Self {
        LedgerError::InvalidState {
            entity,
            current: current.into(),
            attempted,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        LedgerError::Conflict {
            message: message.into(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        LedgerError::Integrity {
            message: message.into(),
        }
    }

    /// True for a unique-constraint violation from SQLite. Number generation
    /// retries on this; everything else (including foreign-key failures,
    /// which share the generic constraint code) propagates untouched.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            LedgerError::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        )
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
