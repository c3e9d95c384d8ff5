

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::Result;


const ENV_PREFIX: &str = "LEDGER";


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Ledger snapshot the binary reads and writes back.
    pub data_path: Option<PathBuf>,
    pub log_filter: String,
    pub pretty_reports: bool,
}

impl LifecycleConfig {
    pub fn new() -> Self {
        Self {
            data_path: None,
            log_filter: crate::DEFAULT_LOG_FILTER.to_string(),
            pretty_reports: true,
        }
    }


    /// Layers an optional config file under `LEDGER_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self::new()
    }
}
