use std::sync::Arc;
use std::time::Duration;

use pulse_core::{JsonFetcher, KeyValueStore, MemoryStore, NumberLocale, SnapshotStore};
use pulse_epidemic::{
    CountryResolver, Delta, DeltaField, EpidemicCacheService, EpidemicClient, EPIDEMIC_KEY,
};
use pulse_weather::WEATHER_KEY;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_day(server: &MockServer, iso: &str, day: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/countries/{}", iso)))
        .and(query_param(day, "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn service(server: &MockServer, kv: Arc<MemoryStore>) -> EpidemicCacheService {
    let fetcher = JsonFetcher::new(Duration::from_secs(5)).unwrap();
    let store = SnapshotStore::new(kv);
    EpidemicCacheService::new(
        EpidemicClient::new(fetcher, format!("{}/countries", server.uri())),
        CountryResolver::new(store.clone()),
        store,
        NumberLocale::default(),
    )
}

#[tokio::test]
async fn test_unchanged_tests_figure_writes_once() {
    let server = MockServer::start().await;
    mount_day(&server, "IT", "today", json!({ "country": "Italy", "tests": 1234, "todayCases": 10 })).await;
    mount_day(&server, "IT", "yesterday", json!({ "country": "Italy", "tests": 1000 })).await;

    let kv = Arc::new(MemoryStore::new());
    let svc = service(&server, kv.clone());

    let (today, yesterday) = svc.refresh(Some("IT")).await;
    assert!(today.is_some() && yesterday.is_some());
    svc.refresh(Some("IT")).await;

    assert_eq!(kv.writes(), 1);
    let record = svc.stored_record().unwrap();
    assert_eq!(record.tests, "1,234");
    assert_eq!(record.country_name, "Italy");
    assert_eq!(svc.diff_retrieve(DeltaField::Tests), Delta::Value(234));
}

#[tokio::test]
async fn test_zero_yesterday_gives_error_delta() {
    let server = MockServer::start().await;
    mount_day(&server, "IT", "today", json!({ "tests": 1500, "cases": 20, "todayDeaths": 3 })).await;
    mount_day(&server, "IT", "yesterday", json!({ "tests": 0, "cases": 18, "todayDeaths": 1 })).await;

    let svc = service(&server, Arc::new(MemoryStore::new()));
    svc.refresh(Some("IT")).await;

    let deltas = svc.deltas();
    assert_eq!(deltas.tests, Delta::Error);
    assert_eq!(deltas.cases, Delta::Value(2));
    assert_eq!(deltas.deaths, Delta::Value(2));
}

#[tokio::test]
async fn test_missing_day_keeps_stored_record() {
    let server = MockServer::start().await;
    mount_day(&server, "IT", "today", json!({ "tests": 1500 })).await;
    Mock::given(method("GET"))
        .and(query_param("yesterday", "true"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let kv = Arc::new(MemoryStore::new());
    let previous = "5]0]100]1]Italy]900]18 Oct";
    kv.set_string(EPIDEMIC_KEY, previous).unwrap();
    let svc = service(&server, kv.clone());

    let (today, yesterday) = svc.refresh(Some("IT")).await;
    assert!(today.is_some());
    assert!(yesterday.is_none());
    assert_eq!(kv.get_string(EPIDEMIC_KEY).unwrap().as_deref(), Some(previous));
    assert_eq!(svc.diff_retrieve(DeltaField::Tests), Delta::Error);
}

#[tokio::test]
async fn test_empty_country_clears_without_fetching() {
    let server = MockServer::start().await;
    mount_day(&server, "IT", "today", json!({ "tests": 1500 })).await;
    mount_day(&server, "IT", "yesterday", json!({ "tests": 1400 })).await;

    let kv = Arc::new(MemoryStore::new());
    let svc = service(&server, kv.clone());
    svc.refresh(Some("IT")).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 2);

    assert_eq!(svc.refresh(Some("")).await, (None, None));
    assert_eq!(svc.snapshots(), (None, None));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    assert_eq!(kv.writes(), 1);
}

#[tokio::test]
async fn test_country_comes_from_weather_record() {
    let server = MockServer::start().await;
    mount_day(&server, "DE", "today", json!({ "country": "Germany", "tests": 50 })).await;
    mount_day(&server, "DE", "yesterday", json!({ "country": "Germany", "tests": 40 })).await;

    let kv = Arc::new(MemoryStore::new());
    kv.set_string(
        WEATHER_KEY,
        "Berlin,DE,Clear sky,12.0,clear_day,60,2.0,11.0,13.0,10.0,10000,0,90",
    )
    .unwrap();
    let svc = service(&server, kv);

    let (today, _) = svc.refresh_for(None).await;
    assert_eq!(today.unwrap().country_name, "Germany");
}

#[tokio::test]
async fn test_no_country_anywhere() {
    let server = MockServer::start().await;
    let svc = service(&server, Arc::new(MemoryStore::new()));
    assert_eq!(svc.refresh_for(None).await, (None, None));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_days_are_fetched_one_after_the_other() {
    let server = MockServer::start().await;
    for (day, tests) in [("today", 1500), ("yesterday", 1000)] {
        Mock::given(method("GET"))
            .and(path("/countries/IT"))
            .and(query_param(day, "true"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "tests": tests }))
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let svc = service(&server, Arc::new(MemoryStore::new()));
    let started = std::time::Instant::now();
    let (today, yesterday) = svc.refresh(Some("IT")).await;

    assert!(today.is_some() && yesterday.is_some());
    assert!(started.elapsed() >= Duration::from_millis(600));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].url.query(), Some("today=true"));
    assert_eq!(requests[1].url.query(), Some("yesterday=true"));
}
