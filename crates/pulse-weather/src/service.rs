//! Weather refresh pipeline: resolve, fetch, fill in the place, persist.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use pulse_core::{PersistOutcome, SnapshotStore, StoreError, TemperatureUnit};
use tracing::instrument;

use crate::cache::{unit_preference, WeatherRecord, UNIT_PREFERENCE_KEY, WEATHER_KEY};
use crate::geocode::ReverseGeocoder;
use crate::location::LocationResolver;
use crate::provider::WeatherProvider;
use crate::types::{Coordinate, WeatherSnapshot};

pub struct WeatherCacheService {
    resolver: Arc<LocationResolver>,
    provider: WeatherProvider,
    geocoder: Option<ReverseGeocoder>,
    store: SnapshotStore,
    default_unit: TemperatureUnit,
    last: Mutex<Option<WeatherSnapshot>>,
}

impl WeatherCacheService {
    pub fn new(
        resolver: Arc<LocationResolver>,
        provider: WeatherProvider,
        store: SnapshotStore,
        default_unit: TemperatureUnit,
    ) -> Self {
        Self {
            resolver,
            provider,
            geocoder: None,
            store,
            default_unit,
            last: Mutex::new(None),
        }
    }

    /// Fill a missing city or country from reverse geocoding.
    pub fn with_geocoder(mut self, geocoder: ReverseGeocoder) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn resolver(&self) -> &Arc<LocationResolver> {
        &self.resolver
    }

    /// Run one refresh cycle.
    ///
    /// A coordinate without a position triggers one re-resolution. Returns
    /// `None` when there is still no position or the fetch fails (a body
    /// with no weather values counts as failed); the stored record is left
    /// untouched in both cases.
    #[instrument(skip_all, name = "weather_refresh")]
    pub async fn refresh(&self, coordinate: Option<Coordinate>) -> Option<WeatherSnapshot> {
        let position = match coordinate.and_then(|c| c.position()) {
            Some(p) => p,
            None => match self.resolver.resolve().await.position() {
                Some(p) => p,
                None => {
                    tracing::info!("No position available; skipping weather refresh");
                    return None;
                }
            },
        };

        let mut snapshot = match self.provider.fetch(position, Utc::now()).await {
            Ok(s) => s,
            Err(e) if e.is_transient() => {
                tracing::warn!("Weather fetch failed, retrying next cycle: {}", e);
                return None;
            }
            Err(e) => {
                tracing::warn!("Weather response rejected: {}", e);
                return None;
            }
        };

        if snapshot.city.is_empty() || snapshot.country.is_empty() {
            if let Some(place) = match &self.geocoder {
                Some(g) => g.reverse(position).await,
                None => None,
            } {
                if snapshot.city.is_empty() {
                    snapshot.city = place.name.unwrap_or_default();
                }
                if snapshot.country.is_empty() {
                    snapshot.country = place.country_code.unwrap_or_default();
                }
            }
        }

        match self
            .store
            .persist_if_changed(WEATHER_KEY, &snapshot.to_record())
        {
            Ok(PersistOutcome::Written) => {
                tracing::info!("Weather updated for {} ({})", snapshot.city, snapshot.country)
            }
            Ok(PersistOutcome::Unchanged) => tracing::debug!("Weather unchanged"),
            Err(e) => tracing::warn!("Failed to persist weather: {}", e),
        }

        *self.last.lock() = Some(snapshot.clone());
        Some(snapshot)
    }

    /// Snapshot from the last successful refresh of this instance.
    pub fn last_snapshot(&self) -> Option<WeatherSnapshot> {
        self.last.lock().clone()
    }

    /// The record the display layer reads.
    pub fn stored_record(&self) -> Option<WeatherRecord> {
        self.store.load(WEATHER_KEY)
    }

    /// Unit the read-time accessors should use.
    pub fn unit(&self) -> TemperatureUnit {
        unit_preference(&self.store, self.default_unit)
    }

    pub fn set_unit(&self, unit: TemperatureUnit) -> Result<(), StoreError> {
        let value = match unit {
            TemperatureUnit::Fahrenheit => "1",
            _ => "0",
        };
        self.store.set_setting(UNIT_PREFERENCE_KEY, value)
    }
}
