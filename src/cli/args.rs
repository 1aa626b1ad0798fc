//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// vdsattr - Attribute maps over volumetric seismic data
///
/// Computes statistics over vertical windows around a surface, or between
/// two surfaces, and caches the responses in memory.
#[derive(Parser, Debug)]
#[command(name = "vdsattr")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "VDSATTR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Response cache size in MB (0 disables caching)
    #[arg(long, global = true, env = "VDSATTR_CACHE_SIZE")]
    pub cache_size: Option<u64>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute attributes in a window around a surface
    Along(ComputeArgs),

    /// Compute attributes between two surfaces
    Between(ComputeArgs),

    /// Print the cache key of requests
    Fingerprint(FingerprintArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the along and between commands
#[derive(Parser, Debug)]
pub struct ComputeArgs {
    /// Request files (JSON). Requests in one invocation share the cache.
    #[arg(required = true)]
    pub requests: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "summary")]
    pub format: OutputFormat,

    /// Only accept requests carrying this sas token
    #[arg(long, env = "VDSATTR_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

/// Arguments for the fingerprint command
#[derive(Parser, Debug)]
pub struct FingerprintArgs {
    /// Request files (JSON)
    #[arg(required = true)]
    pub requests: Vec<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., cache.max_size_mb)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Output format for computed responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Summary,
    /// JSON with every attribute map
    Json,
}
