//! bundlecache CLI - command-line interface
//!
//! Syncs package manifests, prefetches bundles into the local cache and
//! inspects or clears what is cached.

mod commands;
mod error;

use std::process::ExitCode;

use bundlecache::config::ConfigFile;
use bundlecache::logging::init_logging;
use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "bundlecache", version, about = "Verified asset bundle cache")]
struct Cli {
    /// Package to operate on (defaults to remote.package from config.ini)
    #[arg(long, global = true)]
    package: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the configuration file with default settings
    Init,

    /// View or modify configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Print version information
    Version,

    /// Download and check a package manifest
    Sync {
        /// Manifest version; the latest remote version when omitted
        version: Option<String>,
    },

    /// Download every bundle of a manifest version into the cache
    Fetch {
        /// Manifest version
        version: String,

        /// Only bundles carrying one of these tags
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Check cached bundles of a manifest version against their CRC and size
    Verify {
        /// Manifest version
        version: String,

        /// Delete corrupted files
        #[arg(long)]
        repair: bool,
    },

    /// Remove cached files
    Clear {
        /// all, bundles, manifests, unused-bundles, unused-manifests or tags
        mode: String,

        /// Tags for the `tags` mode
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Manifest version required by the unused-* and tags modes
        #[arg(long)]
        version: Option<String>,
    },

    /// Show what is cached
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = ConfigFile::load().unwrap_or_default();
    let _log_guard = match init_logging(&config.logging_config()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", CliError::from(e));
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Config { command } => commands::config::run(command),
        Commands::Version => commands::version::run(),
        Commands::Sync { version } => commands::sync::run(cli.package, version),
        Commands::Fetch { version, tags } => commands::fetch::run(cli.package, version, tags),
        Commands::Verify { version, repair } => commands::verify::run(cli.package, version, repair),
        Commands::Clear {
            mode,
            tags,
            version,
        } => commands::clear::run(cli.package, mode, tags, version),
        Commands::Status => commands::status::run(cli.package),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
