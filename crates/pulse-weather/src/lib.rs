//! Weather domain for Pulse
//!
//! Resolves a position through the platform's location providers, fetches
//! current conditions from an OpenWeatherMap-compatible API and keeps the
//! 13-field weather record up to date.

pub mod types;
pub mod cache;
pub mod geocode;
pub mod location;
pub mod provider;
pub mod service;

pub use types::*;
pub use cache::{unit_preference, WeatherRecord, UNIT_PREFERENCE_KEY, WEATHER_KEY};
pub use geocode::{Place, ReverseGeocoder};
pub use location::{
    FixedLocationProvider, IpLocationProvider, LocationListener, LocationProvider,
    LocationResolver, ProviderSet,
};
pub use provider::WeatherProvider;
pub use service::WeatherCacheService;
