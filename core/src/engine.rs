//! The composition root.
//!
//! RULES:
//!   - The engine owns the store and the config; services borrow both.
//!   - Services are constructed here, in dependency order, and nowhere else.
//!   - No service reaches into another service; shared behavior lives in
//!     store functions or free functions (see `loans::create_from_application`).

use crate::applications::ApplicationService;
use crate::config::LedgerConfig;
use crate::error::LedgerResult;
use crate::loan_types::LoanTypeService;
use crate::loans::LoanService;
use crate::payments::PaymentService;
use crate::savings::SavingsService;
use crate::store::LedgerStore;

pub struct LedgerEngine {
    store: LedgerStore,
    config: LedgerConfig,
}

impl LedgerEngine {
    /// Open (or create) the ledger database at `path` and apply migrations.
    pub fn open(path: &str) -> LedgerResult<Self> {
        let store = LedgerStore::open(path)?;
        store.migrate()?;
        Ok(Self {
            store,
            config: LedgerConfig::default(),
        })
    }

    /// In-memory engine (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        let store = LedgerStore::in_memory()?;
        store.migrate()?;
        Ok(Self {
            store,
            config: LedgerConfig::default(),
        })
    }

    pub fn with_config(store: LedgerStore, config: LedgerConfig) -> LedgerResult<Self> {
        store.migrate()?;
        Ok(Self { store, config })
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // Service views, in dependency order.

    pub fn loan_types(&self) -> LoanTypeService<'_> {
        LoanTypeService::new(&self.store, &self.config)
    }

    pub fn applications(&self) -> ApplicationService<'_> {
        ApplicationService::new(&self.store, &self.config)
    }

    pub fn loans(&self) -> LoanService<'_> {
        LoanService::new(&self.store, &self.config)
    }

    pub fn payments(&self) -> PaymentService<'_> {
        PaymentService::new(&self.store, &self.config)
    }

    pub fn savings(&self) -> SavingsService<'_> {
        SavingsService::new(&self.store, &self.config)
    }
}
