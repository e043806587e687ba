//! The persisted weather record and the read-time accessors the display
//! layer uses on it.
//!
//! Temperatures are stored in Celsius and only converted when read, so a
//! unit switch never needs a refetch or a second cache.

use pulse_core::{CacheRecord, SnapshotStore, TemperatureUnit};

use crate::types::{celsius_to_fahrenheit, WeatherIcon};

/// Store key of the 13-field weather record.
pub const WEATHER_KEY: &str = "weather_data";

/// Store key of the persisted unit preference.
pub const UNIT_PREFERENCE_KEY: &str = "weather_metrics";

/// Index of the country code; the location fallback reads it directly.
pub const COUNTRY_FIELD: usize = 1;

const MS_TO_MPH: f64 = 2.236_936;
const METERS_TO_FEET: f64 = 3.28;

/// Decoded weather record. Fields are the stored strings, unvalidated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WeatherRecord {
    pub city: String,
    pub country: String,
    pub description: String,
    pub temperature: String,
    pub icon: String,
    pub humidity: String,
    pub wind_speed: String,
    pub feels_like: String,
    pub max_temp: String,
    pub min_temp: String,
    pub visibility: String,
    pub cloudiness: String,
    pub wind_degrees: String,
}

impl CacheRecord for WeatherRecord {
    const DELIMITER: char = ',';
    const FIELD_COUNT: usize = 13;
    const COMPARISON_FIELD: Option<usize> = None;

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.city.clone(),
            self.country.clone(),
            self.description.clone(),
            self.temperature.clone(),
            self.icon.clone(),
            self.humidity.clone(),
            self.wind_speed.clone(),
            self.feels_like.clone(),
            self.max_temp.clone(),
            self.min_temp.clone(),
            self.visibility.clone(),
            self.cloudiness.clone(),
            self.wind_degrees.clone(),
        ]
    }

    fn from_fields(fields: Vec<String>) -> Self {
        let mut it = fields.into_iter();
        let mut next = || it.next().unwrap_or_default();
        Self {
            city: next(),
            country: next(),
            description: next(),
            temperature: next(),
            icon: next(),
            humidity: next(),
            wind_speed: next(),
            feels_like: next(),
            max_temp: next(),
            min_temp: next(),
            visibility: next(),
            cloudiness: next(),
            wind_degrees: next(),
        }
    }
}

impl WeatherRecord {
    pub fn temperature(&self, unit: TemperatureUnit) -> String {
        format_temperature(&self.temperature, unit)
    }

    pub fn feels_like(&self, unit: TemperatureUnit) -> String {
        format_temperature(&self.feels_like, unit)
    }

    pub fn max_temp(&self, unit: TemperatureUnit) -> String {
        format_temperature(&self.max_temp, unit)
    }

    pub fn min_temp(&self, unit: TemperatureUnit) -> String {
        format_temperature(&self.min_temp, unit)
    }

    pub fn humidity(&self) -> String {
        suffixed(&self.humidity, "%")
    }

    pub fn cloudiness(&self) -> String {
        suffixed(&self.cloudiness, "%")
    }

    pub fn wind_degrees(&self) -> String {
        suffixed(&self.wind_degrees, "°")
    }

    pub fn wind_speed(&self, unit: TemperatureUnit) -> String {
        let Some(ms) = parse_number(&self.wind_speed) else {
            return String::new();
        };
        match unit {
            TemperatureUnit::Fahrenheit => format!("{:.1}mph", ms * MS_TO_MPH),
            _ => format!("{:.1}m/s", ms),
        }
    }

    /// Kilometers from 100 m up, meters below; feet in imperial.
    pub fn visibility(&self, unit: TemperatureUnit) -> String {
        let Some(meters) = self.visibility.trim().parse::<i64>().ok() else {
            return String::new();
        };
        match unit {
            TemperatureUnit::Fahrenheit => format!("{:.0}ft", meters as f64 * METERS_TO_FEET),
            _ if meters >= 100 => format!("{}km", meters / 1000),
            _ => format!("{}m", meters),
        }
    }

    pub fn icon(&self) -> Option<WeatherIcon> {
        WeatherIcon::from_key(&self.icon)
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn format_temperature(celsius: &str, unit: TemperatureUnit) -> String {
    let Some(c) = parse_number(celsius) else {
        return String::new();
    };
    match unit {
        TemperatureUnit::Fahrenheit => format!("{:.0}°F", celsius_to_fahrenheit(c)),
        _ => format!("{:.0}°C", c),
    }
}

fn suffixed(value: &str, suffix: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!("{}{}", value, suffix)
    }
}

/// Unit stored under [`UNIT_PREFERENCE_KEY`], else `fallback`.
///
/// `Auto` never comes back from here when the fallback is resolved.
pub fn unit_preference(store: &SnapshotStore, fallback: TemperatureUnit) -> TemperatureUnit {
    match store
        .get_setting(UNIT_PREFERENCE_KEY)
        .map(|v| v.trim().to_ascii_lowercase())
        .as_deref()
    {
        Some("1" | "true" | "fahrenheit" | "f") => TemperatureUnit::Fahrenheit,
        Some("0" | "false" | "celsius" | "c") => TemperatureUnit::Celsius,
        _ => fallback,
    }
}
