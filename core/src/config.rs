//! Engine configuration.
//!
//! Everything here has a production default; tests run with `Default`.

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Prefix for generated application numbers ("APP-20260807-48271").
    pub application_prefix: &'static str,
    /// Prefix for generated loan numbers ("LN-20260807-48271").
    pub loan_prefix: &'static str,
    /// Attempts at generating a unique document number before giving up
    /// with a Conflict error.
    pub number_attempts: u32,
    /// Retries of a write transaction that hits SQLITE_BUSY before the
    /// operation surfaces as an Integrity error. Business-rule failures
    /// are never retried.
    pub busy_retries: u32,
    /// Page size applied when a listing filter does not specify one.
    pub default_page_limit: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            application_prefix: "APP",
            loan_prefix: "LN",
            number_attempts: 5,
            busy_retries: 3,
            default_page_limit: 10,
        }
    }
}
