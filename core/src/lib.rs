pub mod amortization;
pub mod applications;
pub mod config;
pub mod engine;
pub mod error;
pub mod loan_types;
pub mod loans;
pub mod money;
pub mod numbering;
pub mod payments;
pub mod savings;
pub mod store;
pub mod types;

// re-export key types
pub use amortization::AmortizedTerms;
pub use applications::{ApplicationService, ApplicationUpdate, LoanApplication, NewApplication};
pub use config::LedgerConfig;
pub use engine::LedgerEngine;
pub use error::{LedgerError, LedgerResult};
pub use loan_types::{LoanType, LoanTypeService, NewLoanType};
pub use loans::{Loan, LoanBalanceSummary, LoanService, NewLoan};
pub use money::{Money, Rate};
pub use payments::{
    LoanPayment, NewPayment, PaymentFilter, PaymentPatch, PaymentService, VerifyAction,
};
pub use savings::{
    AccountTransaction, NewSavingType, SavingAccount, SavingType, SavingsService,
    TransactionFilter,
};
pub use store::LedgerStore;
pub use types::{
    AccountStatus, ApplicationStatus, Decision, EntityId, LoanStatus, Paged, PaymentFrequency,
    PaymentMethod, PaymentStatus, TransactionStatus, TransactionType,
};

// re-export external dependencies that callers will need
pub use chrono;
pub use rust_decimal::Decimal;
