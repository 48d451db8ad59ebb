//! Configuration for the wallet ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Row locking configuration
    pub locking: LockingConfig,

    /// Startup wallet seeding
    pub seeding: SeedingConfig,

    /// Log output
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/wallet-ledger"),
            service_name: "wallet-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            storage: StorageConfig::default(),
            locking: LockingConfig::default(),
            seeding: SeedingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process store, state lost on exit
    Memory,
    /// Embedded RocksDB under `data_dir`
    RocksDb,
}

impl StorageBackend {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Some(StorageBackend::Memory),
            "rocksdb" => Some(StorageBackend::RocksDb),
            _ => None,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend
    pub backend: StorageBackend,

    /// RocksDB tuning (rocksdb backend only)
    pub rocksdb: RocksDBConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Level 0 file num compaction trigger
    pub level0_file_num_compaction_trigger: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
            level0_file_num_compaction_trigger: 4,
            enable_statistics: false,
        }
    }
}

/// Row locking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockingConfig {
    /// Maximum wait for a single row lock (milliseconds)
    pub lock_timeout_ms: u64,
}

impl LockingConfig {
    /// Lock timeout as a duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
        }
    }
}

/// Startup wallet seeding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedingConfig {
    /// Seed wallets on startup
    pub enabled: bool,

    /// Number of wallets to create on an empty ledger
    pub wallet_count: usize,

    /// Starting balance of every seeded wallet
    #[serde(with = "rust_decimal::serde::str")]
    pub starting_balance: Decimal,

    /// Collective deadline for the whole seeding pass (milliseconds)
    pub deadline_ms: u64,
}

impl SeedingConfig {
    /// Deadline as a duration
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Default for SeedingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wallet_count: 10,
            starting_balance: Decimal::from(100),
            deadline_ms: 30_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        Config::default().with_env_overrides()
    }

    /// Apply `LEDGER_*` environment overrides on top of this configuration
    pub fn with_env_overrides(mut self) -> crate::Result<Self> {
        if let Ok(data_dir) = std::env::var("LEDGER_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(backend) = std::env::var("LEDGER_STORAGE_BACKEND") {
            self.storage.backend = StorageBackend::from_str(&backend).ok_or_else(|| {
                crate::Error::Config(format!("Unknown storage backend: {}", backend))
            })?;
        }

        if let Ok(timeout) = std::env::var("LEDGER_LOCK_TIMEOUT_MS") {
            self.locking.lock_timeout_ms = parse_env("LEDGER_LOCK_TIMEOUT_MS", &timeout)?;
        }

        if let Ok(count) = std::env::var("LEDGER_SEED_WALLETS") {
            self.seeding.wallet_count = parse_env("LEDGER_SEED_WALLETS", &count)?;
        }

        if let Ok(balance) = std::env::var("LEDGER_SEED_BALANCE") {
            self.seeding.starting_balance = parse_env("LEDGER_SEED_BALANCE", &balance)?;
        }

        if let Ok(json) = std::env::var("LEDGER_LOG_JSON") {
            self.logging.json = parse_env("LEDGER_LOG_JSON", &json)?;
        }

        Ok(self)
    }

    /// Reject settings the ledger cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.locking.lock_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "locking.lock_timeout_ms must be positive".to_string(),
            ));
        }

        if self.seeding.enabled {
            crate::types::starting_balance(self.seeding.starting_balance).map_err(|_| {
                crate::Error::Config(format!(
                    "seeding.starting_balance is not a valid balance: {}",
                    self.seeding.starting_balance
                ))
            })?;
        }

        if self.storage.backend == StorageBackend::RocksDb && !cfg!(feature = "rocksdb") {
            return Err(crate::Error::Config(
                "rocksdb backend requires the `rocksdb` feature".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| crate::Error::Config(format!("Invalid {}={}: {}", name, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "wallet-ledger");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.seeding.wallet_count, 10);
        assert_eq!(config.seeding.starting_balance, dec!(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            service_name = "ledger-test"

            [locking]
            lock_timeout_ms = 250

            [seeding]
            wallet_count = 3
            starting_balance = "12.5"
            "#,
        )
        .unwrap();

        assert_eq!(config.service_name, "ledger-test");
        assert_eq!(config.locking.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.seeding.wallet_count, 3);
        assert_eq!(config.seeding.starting_balance, dec!(12.5));
        // Untouched sections keep their defaults
        assert!(config.seeding.enabled);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        std::fs::write(&path, "[storage]\nbackend = \"memory\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);

        std::fs::write(&path, "[storage]\nbackend = \"tape\"\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = Config::default();
        config.locking.lock_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.seeding.starting_balance = dec!(-1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!(StorageBackend::from_str("RocksDB"), Some(StorageBackend::RocksDb));
        assert_eq!(StorageBackend::from_str("memory"), Some(StorageBackend::Memory));
        assert_eq!(StorageBackend::from_str("postgres"), None);
    }
}
