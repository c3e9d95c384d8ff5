

pub mod config;
pub mod error;

pub use config::LifecycleConfig;
pub use error::{LedgerError, Result};
