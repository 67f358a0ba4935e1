//! rigcfg - Main entry point
//!
//! Inspects, normalizes and brings up rig configuration files against a
//! simulated rig.

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::FailureDecision;

#[derive(Parser, Debug)]
#[command(name = "rigcfg")]
#[command(about = "Microscope rig configuration tool")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "rigcfg.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prune configuration entries that refer to missing devices
    Check {
        file: PathBuf,
        /// Drop whole groups instead of single settings
        #[arg(long)]
        strict: bool,
        /// Save the pruned model back to the file
        #[arg(long)]
        write: bool,
    },
    /// Re-save a config file in canonical order
    Normalize {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print devices, groups and pixel sizes
    Show {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Write the device enumeration file
    Devlist {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Bring the rig up from a config file
    Bringup {
        file: PathBuf,
        /// What to do with devices that fail to initialize
        #[arg(long, value_enum)]
        on_failure: Option<FailureDecision>,
        /// Save the resulting model
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write a default rigcfg.toml
    InitConfig {
        #[arg(default_value = "rigcfg.toml")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("rigcfg v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(&args.config)?;

    match args.command {
        Command::Check {
            file,
            strict,
            write,
        } => commands::check(&config, &file, strict, write),
        Command::Normalize { file, output } => {
            commands::normalize(&config, &file, output.as_deref())
        }
        Command::Show { file, json } => commands::show(&config, &file, json),
        Command::Devlist { output } => commands::devlist(&config, output.as_deref()),
        Command::Bringup {
            file,
            on_failure,
            output,
        } => commands::bringup(&config, &file, on_failure, output.as_deref()),
        Command::InitConfig { path } => {
            config::save_default_config(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}
