//! Configuration management for ModToken

use crate::error::LedgerError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Largest account the runtime will create, in bytes.
    #[serde(default = "default_max_account_size")]
    pub max_account_size: usize,
    /// Largest serialized transaction the runtime will accept, in bytes.
    #[serde(default = "default_max_transaction_size")]
    pub max_transaction_size: usize,
    /// Maximum nesting of inter-module calls within one operation.
    #[serde(default = "default_max_invoke_depth")]
    pub max_invoke_depth: u8,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_account_size: default_max_account_size(),
            max_transaction_size: default_max_transaction_size(),
            max_invoke_depth: default_max_invoke_depth(),
        }
    }
}

fn default_max_account_size() -> usize {
    1_048_576
}

fn default_max_transaction_size() -> usize {
    100_000
}

fn default_max_invoke_depth() -> u8 {
    4
}

/// Load configuration from `modtoken.toml` in the working directory.
/// Falls back to defaults when the file is absent.
pub fn load_config() -> Result<Config, LedgerError> {
    load_config_from("modtoken.toml")
}

/// Load configuration from an explicit path, defaulting when absent.
pub fn load_config_from<P: AsRef<Path>>(path: P) -> Result<Config, LedgerError> {
    let config_str = fs::read_to_string(path).unwrap_or_default();
    let config: Config = if config_str.is_empty() {
        Config::default()
    } else {
        toml::from_str(&config_str)
            .map_err(|e| LedgerError::ConfigError(format!("Failed to parse config: {}", e)))?
    };

    // Validate critical values
    if config.ledger.max_invoke_depth == 0 {
        return Err(LedgerError::ConfigError(
            "ledger.max_invoke_depth must be at least 1".to_string(),
        ));
    }

    if config.ledger.max_account_size < crate::runtime::account::DISCRIMINATOR_LEN {
        return Err(LedgerError::ConfigError(format!(
            "ledger.max_account_size must be at least {} bytes",
            crate::runtime::account::DISCRIMINATOR_LEN
        )));
    }

    if config.ledger.max_transaction_size == 0 {
        return Err(LedgerError::ConfigError(
            "ledger.max_transaction_size must be non-zero".to_string(),
        ));
    }

    Ok(config)
}
