use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pulse_agent::{RefreshDomain, RefreshScheduler};
use pulse_core::{Config, JsonFetcher, SnapshotStore, SqliteStore};
use pulse_epidemic::{CountryResolver, EpidemicCacheService, EpidemicClient};
use pulse_weather::{
    FixedLocationProvider, IpLocationProvider, LocationProvider, LocationResolver, Position,
    ProviderSet, ReverseGeocoder, WeatherCacheService, WeatherProvider,
};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    pulse_core::init()?;

    let (config, _validation) = Config::load_validated()?;
    tracing::info!("Config directory: {}", config.config_dir.display());

    let kv = SqliteStore::new(config.store_path()).context("Failed to open the cache store")?;
    let store = SnapshotStore::new(Arc::new(kv));

    let weather_fetcher = JsonFetcher::new(Duration::from_secs(config.weather.timeout_secs))?;
    let epidemic_fetcher = JsonFetcher::new(Duration::from_secs(config.epidemic.timeout_secs))?;

    // Location providers
    let mut providers = ProviderSet::new();
    if config.location.network_enabled {
        let ip: Arc<dyn LocationProvider> = Arc::new(IpLocationProvider::new(
            weather_fetcher.clone(),
            config.location.ip_lookup_url.clone(),
        ));
        providers = providers.with_network(ip);
    }
    if let Some(fixed) = config.location.fixed {
        providers = providers.with_gps(Arc::new(FixedLocationProvider::new(Position::new(
            fixed.latitude,
            fixed.longitude,
        ))));
    }

    let (location_tx, location_rx) = mpsc::unbounded_channel();
    let resolver = Arc::new(
        LocationResolver::new(
            Arc::new(providers),
            store.clone(),
            Duration::from_secs(config.location.min_update_minutes.saturating_mul(60)),
            config.location.min_distance_meters,
        )
        .with_listener(location_tx),
    );
    let geocoder = ReverseGeocoder::new(weather_fetcher.clone(), config.weather.geocode_url.clone());

    // Refresh domains
    let weather = WeatherCacheService::new(
        Arc::clone(&resolver),
        WeatherProvider::new(weather_fetcher, &config.weather, &config.locale),
        store.clone(),
        config.weather.temperature_unit.resolve(&config.locale),
    )
    .with_geocoder(geocoder.clone());

    let mut domains: Vec<Arc<dyn RefreshDomain>> = vec![Arc::new(weather)];

    if config.epidemic.enabled {
        let countries = CountryResolver::new(store.clone())
            .with_override(config.epidemic.country_override.clone())
            .with_location(Arc::clone(&resolver))
            .with_geocoder(geocoder);
        let epidemic = EpidemicCacheService::new(
            EpidemicClient::new(epidemic_fetcher, config.epidemic.api_url.clone()),
            countries,
            store,
            config.locale.number_locale(),
        );
        domains.push(Arc::new(epidemic));
    }

    let scheduler = RefreshScheduler::new(
        domains,
        Duration::from_secs(u64::from(config.scheduler.refresh_minutes) * 60),
    );
    scheduler.start();
    scheduler.forward_locations(location_rx);

    tracing::info!("Pulse agent running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    scheduler.shutdown().await;
    resolver.stop_updates().await;

    Ok(())
}
