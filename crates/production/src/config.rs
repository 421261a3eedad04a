//! Node configuration loaded from TOML.
//!
//! ```toml
//! [node]
//! data_dir = "./data"
//!
//! [ledger]
//! window_size = 10
//! check_window_size = 2
//!
//! [storage]
//! compression = "lz4"
//!
//! [genesis]
//! chain_id = "meridian-devnet"
//! genesis_time = 1704067200000
//!
//! [[genesis.validators]]
//! name = "validator-0"
//! public_key = "8a88e3dd7409f195fd52db2d3cba5d72ca6709bf1d94121bf3748801b40f6f5c"
//! power = 100
//! ```

use crate::RocksDbConfig;
use meridian_ledger::LedgerConfig;
use meridian_types::{GenesisDoc, GenesisValidator, HexError, PublicKey};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading node configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid public key for genesis validator {name}: {source}")]
    InvalidHexKey { name: String, source: HexError },

    #[error("Public key for genesis validator {name} is not a valid Ed25519 point")]
    InvalidKey { name: String },
}

/// Top-level node configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Node settings
    #[serde(default)]
    pub node: NodeSettings,

    /// Ledger configuration
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: RocksDbConfig,

    /// Genesis document
    pub genesis: GenesisConfig,
}

/// Node settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSettings {
    /// Data directory for storage
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// Genesis section.
#[derive(Debug, Clone, Deserialize)]
pub struct GenesisConfig {
    /// Chain identifier
    pub chain_id: String,

    /// Genesis time in milliseconds since the Unix epoch
    #[serde(default)]
    pub genesis_time: u64,

    /// Initial validators
    #[serde(default)]
    pub validators: Vec<ValidatorEntry>,
}

/// A validator entry in the genesis section.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorEntry {
    /// Human readable name
    #[serde(default)]
    pub name: String,

    /// Hex-encoded Ed25519 public key
    pub public_key: String,

    /// Voting power (default: 1)
    #[serde(default = "default_power")]
    pub power: u64,
}

fn default_power() -> u64 {
    1
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, data_dir: Option<&Path>) {
        if let Some(data_dir) = data_dir {
            self.node.data_dir = data_dir.to_path_buf();
        }
    }

    /// Directory the RocksDB store lives in.
    pub fn db_path(&self) -> PathBuf {
        self.node.data_dir.join("ledger")
    }
}

impl GenesisConfig {
    /// Build the genesis document, keeping validator order.
    pub fn to_genesis_doc(&self) -> Result<GenesisDoc, ConfigError> {
        let validators = self
            .validators
            .iter()
            .map(|v| {
                let public_key =
                    PublicKey::from_hex(&v.public_key).map_err(|source| ConfigError::InvalidHexKey {
                        name: v.name.clone(),
                        source,
                    })?;
                if !public_key.is_valid() {
                    return Err(ConfigError::InvalidKey {
                        name: v.name.clone(),
                    });
                }
                Ok(GenesisValidator {
                    name: v.name.clone(),
                    public_key,
                    power: v.power,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GenesisDoc::new(
            self.chain_id.clone(),
            self.genesis_time,
            validators,
        ))
    }
}
