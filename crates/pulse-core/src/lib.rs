//! Shared plumbing for the Pulse agent: configuration, errors, the remote
//! JSON fetcher and the delimited snapshot store.

pub mod config;
pub mod error;
pub mod fetch;
pub mod kv;
pub mod locale;
pub mod store;

pub use config::{
    Config, EpidemicConfig, FixedPosition, LocaleConfig, LocationConfig, SchedulerConfig,
    TemperatureUnit, WeatherConfig,
};
pub use error::{FetchError, LocationError, StoreError};
pub use fetch::{JsonFetcher, JsonObject, TimeoutPolicy};
pub use kv::{KeyValueStore, MemoryStore, SqliteStore};
pub use locale::NumberLocale;
pub use store::{CacheRecord, PersistOutcome, SnapshotStore};

use anyhow::Result;

/// Install the tracing subscriber (`RUST_LOG` overrides the `info` default)
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::info!("Pulse core initialized");
    Ok(())
}
