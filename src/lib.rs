

pub mod core;
pub mod lifecycle;
pub mod model;
pub mod store;


pub use crate::core::config::LifecycleConfig;
pub use crate::core::error::{LedgerError, Result};
pub use lifecycle::{
    CascadeRoot, DeletionType, LifecycleAction, LifecycleError, LifecycleManager,
    LifecycleRequest, Report,
};
pub use store::{InMemoryLedgerStore, LedgerSnapshot, LedgerStore, StoreError};


pub const DEFAULT_LOG_FILTER: &str = "ledger_lifecycle=info";
