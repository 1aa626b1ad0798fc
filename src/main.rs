//! vdsattr - Attribute maps over volumetric seismic data
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vdsattr::cli::args::ConfigAction;
use vdsattr::cli::{Cli, Commands};
use vdsattr::config::{Config, ConfigManager};
use vdsattr::error::VdsResult;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> VdsResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = ConfigManager::resolve(cli.config.clone());
    // `config init` must be able to replace a broken file
    let file_config = match config_manager.read().await {
        Ok(config) => config,
        Err(_) if is_config_init(&cli.command) => Config::default(),
        Err(e) => return Err(e),
    };
    let config = file_config.clone().with_cache_size(cli.cache_size);

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let verbosity = cli.verbose.max(u8::from(config.general.verbose));
    let filter = match verbosity {
        0 => EnvFilter::new("vdsattr=warn"),
        1 => EnvFilter::new("vdsattr=info"),
        _ => EnvFilter::new("vdsattr=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    // Dispatch to command
    match cli.command {
        Commands::Along(args) => vdsattr::cli::commands::compute("along", args, &config).await,
        Commands::Between(args) => vdsattr::cli::commands::compute("between", args, &config).await,
        Commands::Fingerprint(args) => vdsattr::cli::commands::fingerprint(args).await,
        Commands::Config(args) => {
            vdsattr::cli::commands::config(args, &config_manager, &file_config).await
        }
    }
}

fn is_config_init(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Config(args) if matches!(args.action, Some(ConfigAction::Init { .. }))
    )
}
