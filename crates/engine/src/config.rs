//! Engine configuration via `recordkv.toml`
//!
//! Every section is optional; missing sections and fields take their
//! defaults. `write_default_if_missing` drops a commented default file in
//! place on first use.

use serde::{Deserialize, Serialize};
use std::path::Path;

use recordkv_concurrency::RetryConfig;
use recordkv_core::{Error, Result};
use recordkv_storage::MemoryStore;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "recordkv.toml";

/// `[store]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix applied to every key (empty = none)
    pub key_prefix: String,
    /// Number of logical databases of an in-memory store
    pub databases: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            databases: MemoryStore::DEFAULT_DATABASES,
        }
    }
}

/// `[batch]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Queue an ECHO of each key so replies can be checked against it
    pub echo_keys: bool,
    /// SCAN batch size hint
    pub scan_count: usize,
    /// Read every written record back with HGETALL
    pub read_back: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            echo_keys: true,
            scan_count: 100,
            read_back: false,
        }
    }
}

/// Engine configuration loaded from `recordkv.toml`
///
/// # Example
///
/// ```toml
/// [store]
/// key_prefix = "app:"
///
/// [transaction]
/// max_retries = 5
///
/// [batch]
/// echo_keys = false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Store connection settings
    #[serde(default)]
    pub store: StoreConfig,
    /// Optimistic transaction retry policy
    #[serde(default)]
    pub transaction: RetryConfig,
    /// Batch operation settings
    #[serde(default)]
    pub batch: BatchConfig,
}

impl CacheConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# recordkv configuration

[store]
# Prefix applied to every key, stripped again from SCAN results
key_prefix = ""
# Logical databases of the in-memory store
databases = 16

[transaction]
# Retries after a watched key changed before EXEC (0 = no retries)
max_retries = 3
# Exponential backoff between retries
base_delay_ms = 10
max_delay_ms = 100

[batch]
# Queue ECHO <key> so each group's replies are checked against its key
echo_keys = true
# Keys examined per SCAN call
scan_count = 100
# Read every written record back with HGETALL
read_back = false
"#
    }

    /// Parse config from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: CacheConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values no store accepts
    pub fn validate(&self) -> Result<()> {
        if self.store.databases == 0 {
            return Err(Error::Config("store.databases must be at least 1".into()));
        }
        if self.batch.scan_count == 0 {
            return Err(Error::Config("batch.scan_count must be at least 1".into()));
        }
        Ok(())
    }

    /// Build an in-memory store from the `[store]` section
    pub fn memory_store(&self) -> MemoryStore {
        let store = MemoryStore::with_databases(self.store.databases);
        if self.store.key_prefix.is_empty() {
            store
        } else {
            store.with_prefix(self.store.key_prefix.clone())
        }
    }
}
