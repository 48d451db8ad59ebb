//! Wallet ledger service binary

use anyhow::Context;
use std::sync::Arc;
use wallet_ledger::{Config, Ledger, LedgerStore, MemoryStore, SeedOutcome, StorageBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    if config.logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        backend = ?config.storage.backend,
        "Starting wallet ledger"
    );

    match config.storage.backend {
        StorageBackend::Memory => {
            let store = Arc::new(MemoryStore::new(config.locking.lock_timeout()));
            run(store, config).await
        }
        #[cfg(feature = "rocksdb")]
        StorageBackend::RocksDb => {
            let store = Arc::new(
                wallet_ledger::RocksStore::open(&config).context("Failed to open RocksDB store")?,
            );
            run(store, config).await
        }
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::RocksDb => anyhow::bail!("Built without the `rocksdb` feature"),
    }
}

fn load_config() -> anyhow::Result<Config> {
    let config = match std::env::var("LEDGER_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        Err(_) => Config::default(),
    };

    let config = config.with_env_overrides().context("Invalid environment override")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run<S: LedgerStore>(store: Arc<S>, config: Config) -> anyhow::Result<()> {
    let seeding_enabled = config.seeding.enabled;
    let ledger = Ledger::new(store, config)?;

    if seeding_enabled {
        match ledger.seed_wallets().await? {
            SeedOutcome::Created { created } => tracing::info!(created, "Seeded wallets"),
            SeedOutcome::Skipped { existing } => tracing::info!(existing, "Seeding skipped"),
        }
    }

    tracing::info!(
        wallets = ledger.wallet_count().await?,
        total_balance = %ledger.total_balance().await?,
        "Ledger ready"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down wallet ledger");
    Ok(())
}
