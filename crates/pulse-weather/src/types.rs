use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::WeatherRecord;

/// Location provider families, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Coarse, low-power positioning (IP or cell/wifi based)
    Network,
    /// Satellite positioning
    Gps,
}

/// Where a [`Coordinate`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    NetworkProvider,
    GpsProvider,
    /// Only a country code read back from the weather cache record
    StoredFallback,
    None,
}

impl From<ProviderKind> for LocationSource {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Network => LocationSource::NetworkProvider,
            ProviderKind::Gps => LocationSource::GpsProvider,
        }
    }
}

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_m(&self, other: &Position) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// Result of one location resolution.
///
/// Each resolution produces a fresh value. `StoredFallback` carries only a
/// country code; its latitude/longitude are zero and meaningless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    pub source: LocationSource,
    pub country: Option<String>,
}

impl Coordinate {
    pub fn from_provider(kind: ProviderKind, position: Position) -> Self {
        Self {
            latitude: position.latitude,
            longitude: position.longitude,
            source: kind.into(),
            country: None,
        }
    }

    pub fn stored_fallback(country: impl Into<String>) -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            source: LocationSource::StoredFallback,
            country: Some(country.into()),
        }
    }

    pub fn none() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            source: LocationSource::None,
            country: None,
        }
    }

    /// True when latitude/longitude came from a provider.
    pub fn has_position(&self) -> bool {
        matches!(
            self.source,
            LocationSource::NetworkProvider | LocationSource::GpsProvider
        )
    }

    pub fn position(&self) -> Option<Position> {
        self.has_position()
            .then(|| Position::new(self.latitude, self.longitude))
    }
}

/// Icon buckets for the display layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherIcon {
    ClearDay,
    ClearNight,
    Storm,
    Drizzle,
    Rain,
    Fog,
    Cloud,
}

impl WeatherIcon {
    /// Bucket an OpenWeatherMap condition code.
    ///
    /// 800 is clear sky and depends on daylight; everything else goes by
    /// its hundreds digit. Unmapped groups (snow included) fall back to
    /// the clear-day icon.
    /// See: https://openweathermap.org/weather-conditions
    pub fn from_code(code: i32, is_daylight: bool) -> Self {
        if code == 800 {
            return if is_daylight {
                Self::ClearDay
            } else {
                Self::ClearNight
            };
        }
        match code / 100 {
            2 => Self::Storm,
            3 => Self::Drizzle,
            5 => Self::Rain,
            7 => Self::Fog,
            8 => Self::Cloud,
            _ => Self::ClearDay,
        }
    }

    /// Stable key stored in the cache record.
    pub fn key(&self) -> &'static str {
        match self {
            Self::ClearDay => "clear_day",
            Self::ClearNight => "clear_night",
            Self::Storm => "storm",
            Self::Drizzle => "drizzle",
            Self::Rain => "rain",
            Self::Fog => "fog",
            Self::Cloud => "cloud",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "clear_day" => Some(Self::ClearDay),
            "clear_night" => Some(Self::ClearNight),
            "storm" => Some(Self::Storm),
            "drizzle" => Some(Self::Drizzle),
            "rain" => Some(Self::Rain),
            "fog" => Some(Self::Fog),
            "cloud" => Some(Self::Cloud),
            _ => None,
        }
    }
}

/// One fetched weather payload.
///
/// Values read from nested sub-objects are optional one by one: a payload
/// missing `wind` still yields temperature and humidity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub city: String,
    pub country: String,
    pub description: Option<String>,
    pub temperature_c: Option<f64>,
    pub icon_code: Option<i32>,
    pub icon: Option<WeatherIcon>,
    pub humidity_pct: Option<i32>,
    pub wind_speed_ms: Option<f64>,
    pub feels_like_c: Option<f64>,
    pub max_c: Option<f64>,
    pub min_c: Option<f64>,
    pub visibility_m: Option<i32>,
    pub cloudiness_pct: Option<i32>,
    pub wind_degrees: Option<i32>,
    pub is_daylight: bool,
    pub fetched_at: DateTime<Utc>,
}

impl WeatherSnapshot {
    /// Whether the payload carried any weather value at all.
    pub fn has_conditions(&self) -> bool {
        self.description.is_some()
            || self.icon_code.is_some()
            || self.temperature_c.is_some()
            || self.feels_like_c.is_some()
            || self.max_c.is_some()
            || self.min_c.is_some()
            || self.humidity_pct.is_some()
            || self.wind_speed_ms.is_some()
            || self.wind_degrees.is_some()
            || self.cloudiness_pct.is_some()
    }

    /// Project into the 13-field cache record.
    pub fn to_record(&self) -> WeatherRecord {
        fn one_decimal(v: Option<f64>) -> String {
            v.map(|v| format!("{:.1}", v)).unwrap_or_default()
        }
        fn int(v: Option<i32>) -> String {
            v.map(|v| v.to_string()).unwrap_or_default()
        }

        WeatherRecord {
            city: self.city.clone(),
            country: self.country.clone(),
            description: self
                .description
                .as_deref()
                .map(capitalize)
                .unwrap_or_default(),
            temperature: one_decimal(self.temperature_c),
            icon: self.icon.map(|i| i.key().to_string()).unwrap_or_default(),
            humidity: int(self.humidity_pct),
            wind_speed: one_decimal(self.wind_speed_ms),
            feels_like: one_decimal(self.feels_like_c),
            max_temp: one_decimal(self.max_c),
            min_temp: one_decimal(self.min_c),
            visibility: int(self.visibility_m),
            cloudiness: int(self.cloudiness_pct),
            wind_degrees: int(self.wind_degrees),
        }
    }
}

/// Uppercase the first character, leaving the rest untouched.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Celsius to Fahrenheit.
pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 1.8 + 32.0
}
