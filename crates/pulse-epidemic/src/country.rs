//! Which country the epidemic figures are fetched for.

use std::sync::Arc;

use pulse_core::SnapshotStore;
use pulse_weather::{Coordinate, LocationResolver, ReverseGeocoder, WeatherRecord, WEATHER_KEY};

/// Resolves the country ISO code, first hit wins:
/// configured override, the coordinate's own country, the stored weather
/// record, reverse geocoding of a known position.
pub struct CountryResolver {
    override_iso: Option<String>,
    store: SnapshotStore,
    location: Option<Arc<LocationResolver>>,
    geocoder: Option<ReverseGeocoder>,
}

impl CountryResolver {
    pub fn new(store: SnapshotStore) -> Self {
        Self {
            override_iso: None,
            store,
            location: None,
            geocoder: None,
        }
    }

    pub fn with_override(mut self, iso: Option<String>) -> Self {
        self.override_iso = iso.and_then(normalize);
        self
    }

    pub fn with_location(mut self, resolver: Arc<LocationResolver>) -> Self {
        self.location = Some(resolver);
        self
    }

    pub fn with_geocoder(mut self, geocoder: ReverseGeocoder) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub async fn resolve(&self, coordinate: Option<&Coordinate>) -> Option<String> {
        if let Some(iso) = &self.override_iso {
            return Some(iso.clone());
        }
        if let Some(iso) = coordinate.and_then(|c| c.country.clone()).and_then(normalize) {
            return Some(iso);
        }
        if let Some(iso) = self
            .store
            .load::<WeatherRecord>(WEATHER_KEY)
            .and_then(|r| normalize(r.country))
        {
            return Some(iso);
        }
        if let Some(iso) = self.geocode(coordinate).await {
            return Some(iso);
        }

        let resolved = match &self.location {
            Some(location) => location.resolve().await,
            None => return None,
        };
        if let Some(iso) = resolved.country.clone().and_then(normalize) {
            return Some(iso);
        }
        self.geocode(Some(&resolved)).await
    }

    async fn geocode(&self, coordinate: Option<&Coordinate>) -> Option<String> {
        let position = coordinate.and_then(Coordinate::position)?;
        let geocoder = self.geocoder.as_ref()?;
        geocoder
            .reverse(position)
            .await
            .and_then(|place| place.country_code)
            .and_then(normalize)
    }
}

fn normalize(iso: String) -> Option<String> {
    let iso = iso.trim();
    (!iso.is_empty()).then(|| iso.to_ascii_uppercase())
}
