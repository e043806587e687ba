//! Reverse geocoding: convert coordinates to a place name and country code.
//! Uses a Nominatim-compatible endpoint (OpenStreetMap), no API key required.

use pulse_core::{JsonFetcher, JsonObject, TimeoutPolicy};
use serde::Deserialize;

use crate::types::Position;

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    state_district: Option<String>,
    county: Option<String>,
    state: Option<String>,
    country_code: Option<String>,
}

/// A reverse-geocoded place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    pub name: Option<String>,
    /// Uppercase ISO 3166-1 alpha-2
    pub country_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReverseGeocoder {
    fetcher: JsonFetcher,
    base_url: String,
}

impl ReverseGeocoder {
    pub fn new(fetcher: JsonFetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
        }
    }

    /// Look up the place at `position`.
    /// Returns `None` on failure or timeout; the caller keeps what it has.
    pub async fn reverse(&self, position: Position) -> Option<Place> {
        let url = match url::Url::parse_with_params(
            &self.base_url,
            &[
                ("lat", position.latitude.to_string()),
                ("lon", position.longitude.to_string()),
                ("format", "json".to_string()),
                ("addressdetails", "1".to_string()),
                ("zoom", "10".to_string()),
            ],
        ) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!("Invalid geocode URL {}: {}", self.base_url, e);
                return None;
            }
        };

        let body = match self
            .fetcher
            .fetch_json(url.as_str(), TimeoutPolicy::Default)
            .await
        {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!("Reverse geocode request failed: {}", e);
                return None;
            }
        };

        let place = parse_place(body)?;
        tracing::info!(
            "Reverse geocoded to: {} ({})",
            place.name.as_deref().unwrap_or("?"),
            place.country_code.as_deref().unwrap_or("?")
        );
        Some(place)
    }
}

fn parse_place(body: JsonObject) -> Option<Place> {
    let response: NominatimResponse =
        match serde_json::from_value(serde_json::Value::Object(body)) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Reverse geocode parse error: {}", e);
                return None;
            }
        };
    let addr = response.address?;

    let country_code = addr
        .country_code
        .filter(|c| !c.is_empty())
        .map(|c| c.to_ascii_uppercase());

    // Prefer city > town > village > municipality for the place name
    let name = addr
        .city
        .or(addr.town)
        .or(addr.village)
        .or(addr.municipality)
        .or(addr.state_district)
        .or(addr.county)
        .or(addr.state)
        .filter(|n| !n.is_empty());

    if name.is_none() && country_code.is_none() {
        return None;
    }
    Some(Place { name, country_code })
}
