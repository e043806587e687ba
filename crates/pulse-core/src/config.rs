use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::locale::NumberLocale;

/// Environment variable consulted when no weather API key is configured.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding config.toml and the cache database
    pub config_dir: PathBuf,

    /// Weather settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Epidemic statistics settings
    #[serde(default)]
    pub epidemic: EpidemicConfig,

    /// Location provider settings
    #[serde(default)]
    pub location: LocationConfig,

    /// Number and language formatting
    #[serde(default)]
    pub locale: LocaleConfig,

    /// Refresh timing
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Temperature unit preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Auto,
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Resolve `Auto` against the locale; the explicit variants pass through.
    pub fn resolve(self, locale: &LocaleConfig) -> TemperatureUnit {
        match self {
            TemperatureUnit::Auto => {
                if locale.uses_fahrenheit() {
                    TemperatureUnit::Fahrenheit
                } else {
                    TemperatureUnit::Celsius
                }
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Current-weather endpoint (OpenWeatherMap compatible)
    #[serde(default = "default_weather_api_url")]
    pub api_url: String,

    /// API key sent as `appid`; falls back to `OPENWEATHER_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Reverse geocoding endpoint (Nominatim compatible)
    #[serde(default = "default_geocode_url")]
    pub geocode_url: String,

    /// Unit used when nothing is persisted in the store
    #[serde(default)]
    pub temperature_unit: TemperatureUnit,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_weather_api_url() -> String {
    "https://api.openweathermap.org/data/2.5/weather".to_string()
}

fn default_geocode_url() -> String {
    "https://nominatim.openstreetmap.org/reverse".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_url: default_weather_api_url(),
            api_key: None,
            geocode_url: default_geocode_url(),
            temperature_unit: TemperatureUnit::Auto,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpidemicConfig {
    /// Disable to skip the epidemic domain entirely
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-country endpoint base (disease.sh compatible)
    #[serde(default = "default_epidemic_api_url")]
    pub api_url: String,

    /// Fixed ISO country code, bypassing location-derived resolution
    #[serde(default)]
    pub country_override: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_epidemic_api_url() -> String {
    "https://disease.sh/v3/covid-19/countries".to_string()
}

impl Default for EpidemicConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: default_epidemic_api_url(),
            country_override: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// A fixed position reported by the satellite-kind provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedPosition {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Use IP geolocation as the network provider
    #[serde(default = "default_true")]
    pub network_enabled: bool,

    /// IP geolocation endpoint (ip-api.com compatible)
    #[serde(default = "default_ip_lookup_url")]
    pub ip_lookup_url: String,

    /// Configured position served by the satellite-kind provider
    #[serde(default)]
    pub fixed: Option<FixedPosition>,

    /// Minimum time between provider updates, in minutes
    #[serde(default = "default_min_update_minutes")]
    pub min_update_minutes: u64,

    /// Minimum movement before a provider reports a change, in meters
    #[serde(default = "default_min_distance_meters")]
    pub min_distance_meters: f64,
}

fn default_ip_lookup_url() -> String {
    "http://ip-api.com/json".to_string()
}

fn default_min_update_minutes() -> u64 {
    120
}

fn default_min_distance_meters() -> f64 {
    1000.0
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            network_enabled: true,
            ip_lookup_url: default_ip_lookup_url(),
            fixed: None,
            min_update_minutes: default_min_update_minutes(),
            min_distance_meters: default_min_distance_meters(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleConfig {
    /// Locale tag such as `en_US` or `de_DE`
    #[serde(default = "default_locale_tag")]
    pub tag: String,
}

fn default_locale_tag() -> String {
    std::env::var("LC_ALL")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| std::env::var("LANG").ok().filter(|v| !v.is_empty()))
        .map(|v| v.split('.').next().unwrap_or_default().to_string())
        .filter(|v| !v.is_empty() && v != "C" && v != "POSIX")
        .unwrap_or_else(|| "en_US".to_string())
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            tag: default_locale_tag(),
        }
    }
}

impl LocaleConfig {
    /// Two-letter language code used for the `lang` query parameter.
    pub fn language(&self) -> &str {
        self.tag
            .split(['_', '-'])
            .next()
            .filter(|l| !l.is_empty())
            .unwrap_or("en")
    }

    /// Region part of the tag, if any.
    pub fn region(&self) -> Option<&str> {
        self.tag.split(['_', '-']).nth(1).filter(|r| !r.is_empty())
    }

    /// Regions that report temperatures in Fahrenheit.
    pub fn uses_fahrenheit(&self) -> bool {
        matches!(
            self.region(),
            Some("US" | "LR" | "MM" | "BS" | "BZ" | "KY" | "PW")
        )
    }

    pub fn number_locale(&self) -> NumberLocale {
        NumberLocale::from_tag(&self.tag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Period of the full refresh cycle, in minutes
    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: u32,
}

fn default_refresh_minutes() -> u32 {
    120
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_minutes: default_refresh_minutes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulse");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
            epidemic: EpidemicConfig::default(),
            location: LocationConfig::default(),
            locale: LocaleConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str::<Config>(&contents).context("Failed to parse config file")?
        } else {
            let mut config = Self::default();
            if let Some(parent) = path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(path)?;
            config
        };

        if config.weather.api_key.is_none() {
            config.weather.api_key = std::env::var(API_KEY_ENV).ok();
        }

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.weather.api_url, "weather.api_url", &mut result);
        self.validate_url(&self.weather.geocode_url, "weather.geocode_url", &mut result);
        self.validate_url(&self.epidemic.api_url, "epidemic.api_url", &mut result);
        self.validate_url(
            &self.location.ip_lookup_url,
            "location.ip_lookup_url",
            &mut result,
        );

        if self
            .weather
            .api_key
            .as_deref()
            .map_or(true, |k| k.trim().is_empty())
        {
            result.add_warning(
                "weather.api_key",
                format!("No API key configured (set {}); weather requests will be rejected", API_KEY_ENV),
            );
        }

        if self.weather.timeout_secs == 0 {
            result.add_error("weather.timeout_secs", "Timeout must be greater than 0");
        }
        if self.epidemic.timeout_secs == 0 {
            result.add_error("epidemic.timeout_secs", "Timeout must be greater than 0");
        }

        if let Some(country) = &self.epidemic.country_override {
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
                result.add_warning(
                    "epidemic.country_override",
                    format!("Expected a two-letter ISO code, got: {}", country),
                );
            }
        }

        if let Some(fixed) = &self.location.fixed {
            if !(-90.0..=90.0).contains(&fixed.latitude) {
                result.add_error("location.fixed.latitude", "Latitude must be within [-90, 90]");
            }
            if !(-180.0..=180.0).contains(&fixed.longitude) {
                result.add_error(
                    "location.fixed.longitude",
                    "Longitude must be within [-180, 180]",
                );
            }
        }

        if !self.location.network_enabled && self.location.fixed.is_none() {
            result.add_warning(
                "location",
                "No location provider enabled; only the stored country can be used",
            );
        }

        if self.location.min_update_minutes == 0 {
            result.add_error(
                "location.min_update_minutes",
                "Location update interval must be greater than 0",
            );
        }

        if self.scheduler.refresh_minutes == 0 {
            result.add_error(
                "scheduler.refresh_minutes",
                "Refresh interval must be greater than 0",
            );
        } else if self.scheduler.refresh_minutes > 1440 {
            result.add_warning(
                "scheduler.refresh_minutes",
                "Refresh interval is more than 24 hours",
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Path of the on-disk key-value store
    pub fn store_path(&self) -> PathBuf {
        self.config_dir.join("pulse.db")
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("pulse");

        Ok(config_dir.join("config.toml"))
    }
}
