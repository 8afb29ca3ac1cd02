//! Wallet engine configuration.
//!
//! [`WalletConfig`] has defaults for every field. [`WalletConfig::load`]
//! layers an optional TOML file under `CIRRUS_*` environment variables
//! (`CIRRUS_DUST_THRESHOLD=1000`, `CIRRUS_LOG_FORMAT=json`, ...).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use cirrus_core::address::Network;
use cirrus_core::constants::{
    DEFAULT_DUST_THRESHOLD, DEFAULT_FEE_PER_KB, DEFAULT_MAX_FEE_ROUNDS, MIN_TX_FEE,
};

use crate::error::WalletError;
use crate::fee::PerKilobyteFee;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "CIRRUS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub network: Network,
    /// Change at or below this many units is folded into the fee.
    pub dust_threshold: u64,
    /// Bound on fee/size fixed-point rounds per build.
    pub max_fee_rounds: u32,
    pub fee_per_kb: u64,
    pub min_fee: u64,
    /// Confirmations an output needs before it is selected.
    pub min_confirmations: u64,
    /// Seconds between background rebroadcast passes.
    pub rebroadcast_interval_secs: u64,
    /// Root directory for persistent wallet data.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "cirrus_wallet=debug").
    pub log_level: String,
    /// "text" or "json".
    pub log_format: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cirrus");

        Self {
            network: Network::Mainnet,
            dust_threshold: DEFAULT_DUST_THRESHOLD,
            max_fee_rounds: DEFAULT_MAX_FEE_ROUNDS,
            fee_per_kb: DEFAULT_FEE_PER_KB,
            min_fee: MIN_TX_FEE,
            min_confirmations: 1,
            rebroadcast_interval_secs: 60,
            data_dir,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl WalletConfig {
    /// Load from an optional config file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, WalletError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize::<WalletConfig>())
            .map_err(|e| WalletError::Config(e.to_string()))?
            .validated()
    }

    fn validated(self) -> Result<Self, WalletError> {
        if self.max_fee_rounds == 0 {
            return Err(WalletError::Config("max_fee_rounds must be at least 1".into()));
        }
        if self.log_format != "text" && self.log_format != "json" {
            return Err(WalletError::Config(format!(
                "log_format must be \"text\" or \"json\", got {:?}",
                self.log_format
            )));
        }
        Ok(self)
    }

    /// Fee policy implied by `fee_per_kb` and `min_fee`.
    pub fn fee_policy(&self) -> PerKilobyteFee {
        PerKilobyteFee::new(self.fee_per_kb, self.min_fee)
    }

    pub fn rebroadcast_interval(&self) -> Duration {
        Duration::from_secs(self.rebroadcast_interval_secs.max(1))
    }

    /// Path to the RocksDB transaction history.
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history")
    }
}
