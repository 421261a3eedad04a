//! Meridian Ledger Tool
//!
//! Opens the node's ledger store and reports on it.
//!
//! # Usage
//!
//! ```bash
//! # Create the ledger from genesis, or check an existing one against it
//! meridian-ledger init --config node.toml
//!
//! # Print the tip and the committed validator set
//! meridian-ledger inspect --config node.toml --data-dir /var/lib/meridian
//!
//! # Mint a validator key for a genesis file
//! meridian-ledger keygen
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use meridian_ledger::Blockchain;
use meridian_production::{init_logging, NodeConfig, RocksDbStore};
use meridian_types::KeyPair;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Meridian ledger tool
#[derive(Parser, Debug)]
#[command(name = "meridian-ledger")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level filter (overrides the default, RUST_LOG wins)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the ledger or create it from the configured genesis
    Init(CommonArgs),
    /// Print chain id, height, hashes and the committed validator set
    Inspect(CommonArgs),
    /// Generate a validator key pair and print it as hex
    Keygen,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Data directory for RocksDB (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn open_ledger(args: &CommonArgs) -> Result<Blockchain> {
    let mut config = NodeConfig::load(&args.config)
        .with_context(|| format!("Failed to load config file: {}", args.config.display()))?;
    config.apply_overrides(args.data_dir.as_deref());

    let genesis = config
        .genesis
        .to_genesis_doc()
        .context("Invalid genesis configuration")?;

    fs::create_dir_all(&config.node.data_dir).with_context(|| {
        format!(
            "Failed to create data directory: {}",
            config.node.data_dir.display()
        )
    })?;

    let db_path = config.db_path();
    let store = RocksDbStore::open_with_config(&db_path, &config.storage)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    Blockchain::load_or_new(Arc::new(store), &genesis, config.ledger.clone())
        .context("Failed to load ledger")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    match &cli.command {
        Command::Init(args) => {
            let ledger = open_ledger(args)?;
            info!(
                chain_id = %ledger.chain_id(),
                genesis_hash = %ledger.genesis_hash(),
                height = ledger.last_block_height().0,
                validators = ledger.num_validators(),
                "Ledger ready"
            );
        }
        Command::Inspect(args) => {
            let ledger = open_ledger(args)?;
            println!("chain id:        {}", ledger.chain_id());
            println!("genesis hash:    {}", ledger.genesis_hash());
            println!("height:          {}", ledger.last_block_height().0);
            let last_block_hash = ledger.last_block_hash();
            if last_block_hash.is_zero() {
                println!("last block hash: none");
            } else {
                println!("last block hash: {}", last_block_hash);
            }
            println!("app hash:        {}", ledger.app_hash_after_last_block());
            let validators = ledger.validators();
            println!(
                "validators:      {} ({} total power)",
                ledger.num_validators(),
                validators.total_power()
            );
            ledger.iterate_validators(|public_key, power| {
                println!("  {} {} {}", public_key.address(), public_key, power);
                false
            });
        }
        Command::Keygen => {
            let keypair = KeyPair::generate();
            println!("public_key = \"{}\"", keypair.public_key());
            println!("seed       = \"{}\"", hex::encode(keypair.seed()));
        }
    }

    Ok(())
}
