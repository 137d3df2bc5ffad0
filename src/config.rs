use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IntentMemConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub generation: GenerationConfig,
    pub blob: BlobConfig,
    pub persistence: PersistenceConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file holding the `identity -> pointer` cache.
    pub cache_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub api_base: String,
    /// Empty means the backend is not configured; extraction then answers
    /// with a CHAT/NONE intent instead of calling out.
    pub api_key: String,
    pub flash_model: String,
    pub pro_model: String,
    pub max_output_tokens: u32,
    pub temperature: f64,
    /// Generated text shorter than this (after trimming) is treated as empty.
    pub min_output_chars: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BlobConfig {
    pub publisher_url: String,
    pub aggregator_url: String,
    pub epochs: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PersistenceConfig {
    pub debounce_ms: u64,
    pub fast_path_ms: u64,
    pub failure_threshold: u32,
    pub backoff_secs: u64,
    pub notice_throttle_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    pub native_token: String,
    pub decimals: u32,
    pub address_prefix: String,
}

impl Default for IntentMemConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            generation: GenerationConfig::default(),
            blob: BlobConfig::default(),
            persistence: PersistenceConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8787,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let cache_path = default_intentmem_dir()
            .join("pointers.db")
            .to_string_lossy()
            .into_owned();
        Self { cache_path }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key: String::new(),
            flash_model: "gemini-2.5-flash".into(),
            pro_model: "gemini-2.5-pro".into(),
            max_output_tokens: 1024,
            temperature: 0.2,
            min_output_chars: 20,
            timeout_secs: 30,
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            publisher_url: "https://publisher.walrus-testnet.walrus.space".into(),
            aggregator_url: "https://aggregator.walrus-testnet.walrus.space".into(),
            epochs: 5,
            timeout_secs: 10,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            fast_path_ms: 100,
            failure_threshold: 3,
            backoff_secs: 30,
            notice_throttle_secs: 10,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            native_token: "SUI".into(),
            decimals: 9,
            address_prefix: "0x".into(),
        }
    }
}

impl BlobConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Returns `~/.intentmem/`
pub fn default_intentmem_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".intentmem")
}

/// Returns the default config file path: `~/.intentmem/config.toml`
pub fn default_config_path() -> PathBuf {
    default_intentmem_dir().join("config.toml")
}

impl IntentMemConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            IntentMemConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("INTENTMEM_CACHE") {
            self.storage.cache_path = val;
        }
        if let Ok(val) = std::env::var("INTENTMEM_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("INTENTMEM_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid INTENTMEM_PORT"),
            }
        }
        if let Ok(val) = std::env::var("GEMINI_API_KEY") {
            self.generation.api_key = val;
        }
        if let Ok(val) = std::env::var("INTENTMEM_PUBLISHER") {
            self.blob.publisher_url = val;
        }
        if let Ok(val) = std::env::var("INTENTMEM_AGGREGATOR") {
            self.blob.aggregator_url = val;
        }
    }

    /// Resolve the pointer cache path, expanding `~` if needed.
    pub fn resolved_cache_path(&self) -> PathBuf {
        expand_tilde(&self.storage.cache_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
