//! Custodian Command-Line Client
//!
//! Applies, rolls back and inspects object type migrations in a local
//! custodian store.

mod commands;
mod executor;
mod formatter;

use clap::Parser;
use commands::Command;
use custodian_core::config::{ManagerConfig, StorageConfig};
use custodian_core::migration::MigrationManager;
use formatter::OutputFormat;
use std::path::PathBuf;

/// Custodian Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "custodian")]
#[command(version, about = "Custodian schema engine")]
pub struct Args {
    /// Data directory
    #[arg(short = 'd', long, default_value = "./custodian-data")]
    pub data_path: PathBuf,

    /// Use a temporary store, removed on exit
    #[arg(long)]
    pub temporary: bool,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Page cache size in MB
    #[arg(long, default_value_t = 64)]
    pub cache_mb: u64,

    /// Accept migrations without checking them against their siblings
    #[arg(long)]
    pub skip_sibling_validation: bool,

    /// Drop dependent constraints when dropping tables
    #[arg(long)]
    pub cascade: bool,

    #[command(subcommand)]
    pub command: Command,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("custodian=info,custodian_core=info")),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let storage = if args.temporary {
        StorageConfig::temporary()
    } else {
        StorageConfig::new(&args.data_path)
    }
    .with_cache_capacity(args.cache_mb * 1024 * 1024);

    let config = ManagerConfig::new()
        .with_sibling_validation(!args.skip_sibling_validation)
        .with_cascade_drop(args.cascade);

    let manager = MigrationManager::open(storage, config)?;
    let formatter = formatter::create_formatter(args.format);

    let write = args.command.is_write();
    let output = executor::execute(&manager, args.command, &*formatter)?;
    if write {
        manager.storage().flush()?;
    }
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
