//! Configuration schema for vdsattr
//!
//! Configuration is stored at `~/.config/vdsattr/config.toml`

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Response cache settings
    pub cache: CacheConfig,

    /// Attribute engine settings
    pub engine: EngineConfig,
}

impl Config {
    /// Apply the `--cache-size` override
    pub fn with_cache_size(mut self, max_size_mb: Option<u64>) -> Self {
        if let Some(size) = max_size_mb {
            self.cache.max_size_mb = size;
        }
        self
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Memory budget in MB (0 = caching disabled)
    pub max_size_mb: u64,

    /// Compute requests that cannot be fingerprinted instead of failing them
    pub tolerate_fingerprint_errors: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 0,
            tolerate_fingerprint_errors: true,
        }
    }
}

impl CacheConfig {
    /// Memory budget in bytes
    pub fn budget_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Attribute engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads (0 = available parallelism)
    pub max_workers: usize,

    /// Grid cells per chunk (0 = derived from grid size)
    pub chunk_size: usize,

    /// Chunks per worker when the chunk size is derived
    pub chunks_per_worker: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            chunk_size: 0,
            chunks_per_worker: 4,
        }
    }
}
