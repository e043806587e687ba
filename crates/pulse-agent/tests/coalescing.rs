use std::sync::Arc;
use std::time::Duration;

use pulse_agent::{RefreshDomain, RefreshScheduler};
use pulse_core::{JsonFetcher, LocaleConfig, MemoryStore, SnapshotStore, TemperatureUnit, WeatherConfig};
use pulse_weather::{
    Coordinate, LocationResolver, Position, ProviderKind, ProviderSet, WeatherCacheService,
    WeatherProvider,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_location_change_during_timer_refresh_fetches_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "weather": [{ "id": 800, "description": "clear sky" }],
                    "main": { "temp": 18.0, "humidity": 40 },
                    "sys": { "country": "IT" },
                    "name": "Turin"
                }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let kv = Arc::new(MemoryStore::new());
    let store = SnapshotStore::new(kv.clone());
    let resolver = Arc::new(LocationResolver::new(
        Arc::new(ProviderSet::new()),
        store.clone(),
        Duration::from_secs(3600),
        1000.0,
    ));
    let config = WeatherConfig {
        api_url: format!("{}/weather", server.uri()),
        api_key: Some("k".into()),
        ..WeatherConfig::default()
    };
    let locale = LocaleConfig { tag: "en_US".into() };
    let weather = WeatherCacheService::new(
        resolver,
        WeatherProvider::new(JsonFetcher::new(Duration::from_secs(5)).unwrap(), &config, &locale),
        store,
        TemperatureUnit::Celsius,
    );

    let domains: Vec<Arc<dyn RefreshDomain>> = vec![Arc::new(weather)];
    let scheduler = RefreshScheduler::new(domains, Duration::from_secs(3600));

    // The first cycle has no coordinate and no provider; it resolves to
    // nothing and finishes without fetching.
    scheduler.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.received_requests().await.unwrap().is_empty());

    let here = Coordinate::from_provider(ProviderKind::Gps, Position::new(45.07, 7.68));
    scheduler.on_location_changed(here.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;
    // Fetch in flight; a second request for the same domain is dropped.
    scheduler.on_location_changed(here.clone());
    scheduler.on_external_trigger(Some("weather"));
    tokio::time::sleep(Duration::from_millis(800)).await;

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(kv.writes(), 1);

    scheduler.shutdown().await;
}
