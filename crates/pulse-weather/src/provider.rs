use chrono::{DateTime, Utc};
use pulse_core::{FetchError, JsonFetcher, JsonObject, LocaleConfig, TimeoutPolicy, WeatherConfig};
use serde_json::Value;
use tracing::instrument;

use crate::types::{Position, WeatherIcon, WeatherSnapshot};

/// OpenWeatherMap current-weather client.
#[derive(Debug, Clone)]
pub struct WeatherProvider {
    fetcher: JsonFetcher,
    api_url: String,
    api_key: Option<String>,
    lang: String,
}

impl WeatherProvider {
    pub fn new(fetcher: JsonFetcher, config: &WeatherConfig, locale: &LocaleConfig) -> Self {
        Self {
            fetcher,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            lang: locale.language().to_string(),
        }
    }

    /// Request URL; units are always metric, conversion happens on read.
    pub fn request_url(&self, position: Position) -> Result<url::Url, FetchError> {
        let mut params = vec![
            ("lat", position.latitude.to_string()),
            ("lon", position.longitude.to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("appid", key.clone()));
        }
        params.push(("units", "metric".to_string()));
        params.push(("lang", self.lang.clone()));

        url::Url::parse_with_params(&self.api_url, &params)
            .map_err(|e| FetchError::Network(format!("invalid weather URL: {}", e)))
    }

    /// Fetch current conditions at `position`.
    ///
    /// A body without a single weather value is a parse failure, not an
    /// empty snapshot.
    #[instrument(skip(self), level = "debug")]
    pub async fn fetch(
        &self,
        position: Position,
        now: DateTime<Utc>,
    ) -> Result<WeatherSnapshot, FetchError> {
        let url = self.request_url(position)?;
        let body = self
            .fetcher
            .fetch_json(url.as_str(), TimeoutPolicy::Default)
            .await?;
        let snapshot = parse_payload(&body, now);
        if !snapshot.has_conditions() {
            return Err(FetchError::Parse("no weather values in response".into()));
        }
        Ok(snapshot)
    }
}

/// Build a snapshot from a current-weather payload.
///
/// Every value is read on its own: a missing sub-object or key only empties
/// the fields that come from it.
pub fn parse_payload(body: &JsonObject, now: DateTime<Utc>) -> WeatherSnapshot {
    let condition = body
        .get("weather")
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(Value::as_object);
    let main = object(body, "main");
    let wind = object(body, "wind");
    let clouds = object(body, "clouds");
    let sys = object(body, "sys");

    let is_daylight = daylight(
        sys.and_then(|s| s.get("sunrise")).and_then(Value::as_i64),
        sys.and_then(|s| s.get("sunset")).and_then(Value::as_i64),
        now,
    );
    let icon_code = condition.and_then(|c| int(c, "id"));

    WeatherSnapshot {
        city: text(Some(body), "name").unwrap_or_default(),
        country: text(sys, "country").unwrap_or_default(),
        description: text(condition, "description"),
        temperature_c: float(main, "temp"),
        icon_code,
        icon: icon_code.map(|code| WeatherIcon::from_code(code, is_daylight)),
        humidity_pct: main.and_then(|m| int(m, "humidity")),
        wind_speed_ms: float(wind, "speed"),
        feels_like_c: float(main, "feels_like"),
        max_c: float(main, "temp_max"),
        min_c: float(main, "temp_min"),
        visibility_m: int(body, "visibility"),
        cloudiness_pct: clouds.and_then(|c| int(c, "all")),
        wind_degrees: wind.and_then(|w| int(w, "deg")),
        is_daylight,
        fetched_at: now,
    }
}

/// `sunrise <= now < sunset`; without both bounds it is treated as day.
fn daylight(sunrise: Option<i64>, sunset: Option<i64>, now: DateTime<Utc>) -> bool {
    match (sunrise, sunset) {
        (Some(rise), Some(set)) => {
            let now = now.timestamp();
            rise <= now && now < set
        }
        _ => true,
    }
}

fn object<'a>(body: &'a JsonObject, key: &str) -> Option<&'a JsonObject> {
    body.get(key).and_then(Value::as_object)
}

fn text(obj: Option<&JsonObject>, key: &str) -> Option<String> {
    obj.and_then(|o| o.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn float(obj: Option<&JsonObject>, key: &str) -> Option<f64> {
    obj.and_then(|o| o.get(key)).and_then(Value::as_f64)
}

fn int(obj: &JsonObject, key: &str) -> Option<i32> {
    let value = obj.get(key)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
        .and_then(|v| i32::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const SUNRISE: i64 = 1_760_853_600;
    const SUNSET: i64 = 1_760_893_200;

    fn payload(code: i64) -> JsonObject {
        let value = json!({
            "coord": { "lon": 7.68, "lat": 45.07 },
            "weather": [{ "id": code, "main": "Clouds", "description": "broken clouds", "icon": "04d" }],
            "main": {
                "temp": 14.62, "feels_like": 13.91, "temp_min": 13.1, "temp_max": 15.8,
                "pressure": 1019, "humidity": 71
            },
            "visibility": 10000,
            "wind": { "speed": 2.57, "deg": 250 },
            "clouds": { "all": 75 },
            "sys": { "country": "IT", "sunrise": SUNRISE, "sunset": SUNSET },
            "name": "Turin"
        });
        match value {
            Value::Object(map) => map,
            _ => JsonObject::new(),
        }
    }

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).unwrap()
    }

    #[test]
    fn test_parse_full_payload() {
        let s = parse_payload(&payload(803), at(SUNRISE + 60));
        assert_eq!(s.city, "Turin");
        assert_eq!(s.country, "IT");
        assert_eq!(s.description.as_deref(), Some("broken clouds"));
        assert_eq!(s.temperature_c, Some(14.62));
        assert_eq!(s.humidity_pct, Some(71));
        assert_eq!(s.wind_speed_ms, Some(2.57));
        assert_eq!(s.wind_degrees, Some(250));
        assert_eq!(s.visibility_m, Some(10000));
        assert_eq!(s.cloudiness_pct, Some(75));
        assert_eq!(s.icon, Some(WeatherIcon::Cloud));
        assert!(s.is_daylight);

        let record = s.to_record();
        assert_eq!(record.description, "Broken clouds");
        assert_eq!(record.temperature, "14.6");
        assert_eq!(record.icon, "cloud");
    }

    #[test]
    fn test_clear_sky_after_sunset_is_night() {
        let s = parse_payload(&payload(800), at(SUNSET + 1));
        assert!(!s.is_daylight);
        assert_eq!(s.icon, Some(WeatherIcon::ClearNight));

        let s = parse_payload(&payload(800), at(SUNSET - 1));
        assert_eq!(s.icon, Some(WeatherIcon::ClearDay));

        let s = parse_payload(&payload(801), at(SUNSET + 1));
        assert_eq!(s.icon, Some(WeatherIcon::Cloud));
    }

    #[test]
    fn test_missing_sub_objects_only_empty_their_fields() {
        let mut body = payload(500);
        body.remove("wind");
        body.remove("sys");

        let s = parse_payload(&body, at(0));
        assert_eq!(s.wind_speed_ms, None);
        assert_eq!(s.wind_degrees, None);
        assert_eq!(s.country, "");
        assert_eq!(s.temperature_c, Some(14.62));
        assert_eq!(s.humidity_pct, Some(71));
        // No sunrise/sunset: daylight assumed.
        assert!(s.is_daylight);
        assert_eq!(s.icon, Some(WeatherIcon::Rain));

        let record = s.to_record();
        assert_eq!(record.wind_speed, "");
        assert_eq!(record.humidity, "71");
    }

    #[test]
    fn test_missing_condition_leaves_icon_empty() {
        let mut body = payload(800);
        body.insert("weather".into(), json!([]));
        let s = parse_payload(&body, at(SUNRISE + 1));
        assert_eq!(s.icon_code, None);
        assert_eq!(s.icon, None);
        assert_eq!(s.to_record().icon, "");
    }

    #[test]
    fn test_payload_without_weather_values_has_no_conditions() {
        let body = match json!({ "name": "Turin", "sys": { "country": "IT" } }) {
            Value::Object(map) => map,
            _ => JsonObject::new(),
        };
        assert!(!parse_payload(&body, at(0)).has_conditions());
        assert!(!parse_payload(&JsonObject::new(), at(0)).has_conditions());

        let mut partial = JsonObject::new();
        partial.insert("clouds".into(), json!({ "all": 20 }));
        assert!(parse_payload(&partial, at(0)).has_conditions());
    }

    #[test]
    fn test_request_url() {
        let config = WeatherConfig {
            api_url: "https://api.example.test/data/2.5/weather".into(),
            api_key: Some("k3y".into()),
            ..WeatherConfig::default()
        };
        let locale = LocaleConfig {
            tag: "it_IT.UTF-8".into(),
        };
        let fetcher = JsonFetcher::new(std::time::Duration::from_secs(1)).unwrap();
        let provider = WeatherProvider::new(fetcher, &config, &locale);

        let url = provider.request_url(Position::new(45.07, 7.68)).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.test/data/2.5/weather?lat=45.07&lon=7.68&appid=k3y&units=metric&lang=it"
        );
    }
}
