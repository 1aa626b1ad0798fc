//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, Initialized};
use crate::error::{VdsError, VdsResult};
use console::style;

const VALID_KEYS: [&str; 7] = [
    "general.verbose",
    "general.log_format",
    "cache.max_size_mb",
    "cache.tolerate_fingerprint_errors",
    "engine.max_workers",
    "engine.chunk_size",
    "engine.chunks_per_worker",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> VdsResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, &key, &value).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> VdsResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> VdsResult<()> {
    let path = manager.path().display();
    match manager.init(force).await? {
        Initialized::Kept => println!(
            "  {} Config already exists at {} - Use --force to overwrite",
            style("[WARN]").yellow(),
            path
        ),
        Initialized::Created | Initialized::Replaced => println!(
            "  {} Configuration initialized ({})",
            style("[OK]").green(),
            path
        ),
    }
    Ok(())
}

async fn set_value(manager: &ConfigManager, key: &str, value: &str) -> VdsResult<()> {
    manager.update(|config| assign(config, key, value)).await?;
    println!("  {} Set {} = {}", style("[OK]").green(), key, value);
    Ok(())
}

fn assign(config: &mut Config, key: &str, value: &str) -> VdsResult<()> {
    match key.split('.').collect::<Vec<_>>().as_slice() {
        ["general", "verbose"] => config.general.verbose = parse_bool(value)?,
        ["general", "log_format"] => config.general.log_format = parse_log_format(value)?,
        ["cache", "max_size_mb"] => config.cache.max_size_mb = parse_number(value)?,
        ["cache", "tolerate_fingerprint_errors"] => {
            config.cache.tolerate_fingerprint_errors = parse_bool(value)?
        }
        ["engine", "max_workers"] => config.engine.max_workers = parse_number(value)?,
        ["engine", "chunk_size"] => config.engine.chunk_size = parse_number(value)?,
        ["engine", "chunks_per_worker"] => config.engine.chunks_per_worker = parse_number(value)?,
        _ => {
            return Err(VdsError::invalid(format!(
                "Unknown config key: {}. Valid keys: {}",
                key,
                VALID_KEYS.join(", ")
            )))
        }
    }
    Ok(())
}

fn parse_bool(value: &str) -> VdsResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(VdsError::invalid(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(value: &str) -> VdsResult<T> {
    value
        .parse()
        .map_err(|_| VdsError::invalid(format!("Invalid number: {}", value)))
}

fn parse_log_format(value: &str) -> VdsResult<String> {
    match value {
        "text" | "json" => Ok(value.to_string()),
        _ => Err(VdsError::invalid(format!(
            "Invalid log format: {}. Use text or json",
            value
        ))),
    }
}
