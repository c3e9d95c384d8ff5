

use thiserror::Error;

use crate::store::StoreError;


#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<::config::ConfigError> for LedgerError {
    fn from(e: ::config::ConfigError) -> Self {
        LedgerError::Config(e.to_string())
    }
}


pub type Result<T> = std::result::Result<T, LedgerError>;
