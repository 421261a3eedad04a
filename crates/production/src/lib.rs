//! Production wiring for the Meridian ledger.
//!
//! - [`RocksDbStore`]: durable [`meridian_ledger::Store`] with fsynced writes
//! - [`NodeConfig`]: TOML configuration including the genesis document
//! - [`init_logging`]: `tracing-subscriber` setup shared by the binaries

mod config;
mod storage;
pub mod telemetry;

pub use config::{ConfigError, GenesisConfig, NodeConfig, NodeSettings, ValidatorEntry};
pub use storage::{CompressionType, RocksDbConfig, RocksDbStore};
pub use telemetry::{init_logging, TelemetryError};
