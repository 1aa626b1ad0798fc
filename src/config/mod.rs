//! Configuration file handling
//!
//! The file lives at `--config` / `VDSATTR_CONFIG` when given, otherwise at
//! `<config dir>/vdsattr/config.toml`. A missing file reads as the defaults.
//! Command line overrides are applied on top of what was read and are never
//! written back.

pub mod schema;

pub use schema::Config;

use crate::error::{VdsError, VdsResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Outcome of [`ConfigManager::init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initialized {
    Created,
    Replaced,
    /// A file was already there and `force` was not given
    Kept,
}

/// Reads and edits one configuration file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    /// Use `explicit` when given, else the per-user default location
    pub fn resolve(explicit: Option<PathBuf>) -> Self {
        let path = explicit.unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("vdsattr")
                .join("config.toml")
        });
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file; absent means defaults
    pub async fn read(&self) -> VdsResult<Config> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", self.path.display());
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(VdsError::io(
                    format!("reading config from {}", self.path.display()),
                    e,
                ))
            }
        };

        toml::from_str(&content).map_err(|e| VdsError::ConfigInvalid {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Write the defaults, leaving an existing file alone unless `force`
    pub async fn init(&self, force: bool) -> VdsResult<Initialized> {
        let existed = fs::try_exists(&self.path).await.unwrap_or(false);
        if existed && !force {
            return Ok(Initialized::Kept);
        }

        self.write(&Config::default()).await?;
        Ok(if existed {
            Initialized::Replaced
        } else {
            Initialized::Created
        })
    }

    /// Read the file, apply `edit` and write the result back.
    ///
    /// Nothing is written when `edit` fails.
    pub async fn update<F>(&self, edit: F) -> VdsResult<Config>
    where
        F: FnOnce(&mut Config) -> VdsResult<()>,
    {
        let mut config = self.read().await?;
        edit(&mut config)?;
        self.write(&config).await?;
        Ok(config)
    }

    /// Replace the file through a sibling temp file so readers never see a
    /// partial write
    async fn write(&self, config: &Config) -> VdsResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| VdsError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let staged = self.path.with_extension("toml.tmp");
        let writing = |e: std::io::Error| {
            VdsError::io(format!("writing config to {}", self.path.display()), e)
        };
        fs::write(&staged, toml::to_string_pretty(config)?)
            .await
            .map_err(writing)?;
        fs::rename(&staged, &self.path).await.map_err(writing)?;

        info!("Configuration written to {}", self.path.display());
        Ok(())
    }
}
