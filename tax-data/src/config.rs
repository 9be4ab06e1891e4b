//! Engine configuration file.
//!
//! ```toml
//! [rounding]
//! final_precision = 2
//! intermediate_precision = 4
//! intermediate_rounding = "per_bracket"
//!
//! [database]
//! backend = "sqlite"
//! connection_string = "brackets.db"
//! seed_tables = true
//!
//! [[tables]]
//! key = { jurisdiction_id = "CN", tax_type = "monthly" }
//! effective_from = "2019-01-01"
//! brackets = [
//!     { lower_bound = "0", upper_bound = "3000", rate = "0.03" },
//!     { lower_bound = "3000", rate = "0.10" },
//! ]
//! ```
//!
//! Every section is optional. Decimals and dates are written as strings so
//! they are parsed exactly. Tables listed here are validated while the file
//! is read; when present they are used instead of the database tables.

use std::path::Path;

use serde::Deserialize;
use tax_core::db::DbConfig;
use tax_core::{BracketTable, CalculationError, RoundingPolicy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid rounding settings: {0}")]
    Rounding(#[from] CalculationError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rounding: RoundingPolicy,
    pub database: DbConfig,
    pub tables: Vec<BracketTable>,
}

impl EngineConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.rounding.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }
}
