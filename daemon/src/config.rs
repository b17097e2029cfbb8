//! Daemon configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use dgov_types::{Address, GovernanceParams, TokenAmount, TypesError};
use dgov_utils::LogFormat;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("{field}: {source}")]
    Address {
        field: &'static str,
        source: TypesError,
    },

    #[error("custody must not be the zero address")]
    ZeroCustody,
}

/// An initial token allocation minted by `dgov init`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub address: String,
    pub amount: u64,
}

/// Configuration for the `dgov` binary.
///
/// Loaded from a TOML file via [`DaemonConfig::from_toml_file`]; flags and
/// `DGOV_*` environment variables override individual fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Directory holding the LMDB environment.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in bytes.
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Account the ledger escrows delegations into and pays proposals from.
    #[serde(default = "default_custody")]
    pub custody: String,

    /// Minimum net votes for a proposal to pass, in raw token units.
    #[serde(default = "default_quorum")]
    pub quorum: u64,

    #[serde(default = "default_voting_period")]
    pub voting_period_secs: u64,

    /// Balances minted once by `dgov init`.
    #[serde(default)]
    pub genesis: Vec<GenesisAllocation>,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./dgov_data")
}

fn default_map_size() -> usize {
    256 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_custody() -> String {
    "0x0000000000000000000000000000000000006d67".to_string()
}

fn default_quorum() -> u64 {
    GovernanceParams::DEFAULT_QUORUM as u64
}

fn default_voting_period() -> u64 {
    GovernanceParams::DEFAULT_VOTING_PERIOD_SECS
}

// ── Impl ───────────────────────────────────────────────────────────────

impl DaemonConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn custody_address(&self) -> Result<Address, ConfigError> {
        let address: Address = self.custody.parse().map_err(|source| ConfigError::Address {
            field: "custody",
            source,
        })?;
        if address.is_zero() {
            return Err(ConfigError::ZeroCustody);
        }
        Ok(address)
    }

    pub fn params(&self) -> GovernanceParams {
        GovernanceParams::new(TokenAmount::new(self.quorum.into()), self.voting_period_secs)
    }

    pub fn genesis_allocations(&self) -> Result<Vec<(Address, TokenAmount)>, ConfigError> {
        self.genesis
            .iter()
            .map(|alloc| -> Result<_, ConfigError> {
                let address = alloc.address.parse::<Address>().map_err(|source| ConfigError::Address {
                    field: "genesis.address",
                    source,
                })?;
                Ok((address, TokenAmount::new(alloc.amount.into())))
            })
            .collect()
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            map_size: default_map_size(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            custody: default_custody(),
            quorum: default_quorum(),
            voting_period_secs: default_voting_period(),
            genesis: Vec::new(),
        }
    }
}
