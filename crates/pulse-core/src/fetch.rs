//! Remote JSON fetch primitive shared by every refresh domain.
//!
//! One GET, no body, any content type accepted. The whole exchange is
//! bounded by a timeout and either yields a complete JSON object or an
//! error; partial bodies never escape. The response is owned by the
//! request future, so the connection is released when the future
//! completes, fails or is dropped by the timeout.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use tracing::instrument;

use crate::error::{FetchError, ReqwestErrorExt};

/// Decoded response body.
pub type JsonObject = serde_json::Map<String, Value>;

const USER_AGENT: &str = concat!("pulse/", env!("CARGO_PKG_VERSION"));

/// How long a single fetch may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// The fetcher's configured timeout
    #[default]
    Default,
    /// An explicit bound for this call
    Within(Duration),
}

impl TimeoutPolicy {
    fn resolve(self, default: Duration) -> Duration {
        match self {
            TimeoutPolicy::Default => default,
            TimeoutPolicy::Within(limit) => limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsonFetcher {
    client: Arc<Client>,
    default_timeout: Duration,
}

impl JsonFetcher {
    pub fn new(default_timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(default_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            default_timeout,
        })
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Fetch `url` and decode the body as a JSON object.
    ///
    /// A non-2xx status is reported as [`FetchError::Network`], the same as
    /// a transport failure.
    #[instrument(skip(self), level = "debug")]
    pub async fn fetch_json(
        &self,
        url: &str,
        policy: TimeoutPolicy,
    ) -> Result<JsonObject, FetchError> {
        let limit = policy.resolve(self.default_timeout);

        let result = match tokio::time::timeout(limit, self.get_object(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        };

        if let Err(e) = &result {
            tracing::warn!("Fetch failed: {}", e);
        }
        result
    }

    async fn get_object(&self, url: &str) -> Result<JsonObject, FetchError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "*/*")
            .send()
            .await
            .map_err(ReqwestErrorExt::into_fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Network(format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(ReqwestErrorExt::into_fetch_error)?;

        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(FetchError::Parse(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(FetchError::Parse(e.to_string())),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> JsonFetcher {
        JsonFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_object() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data"))
            .and(header("accept", "*/*"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "Turin",
                "main": {"temp": 21.5}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/data", mock_server.uri());
        let body = fetcher()
            .fetch_json(&url, TimeoutPolicy::Default)
            .await
            .unwrap();

        assert_eq!(body["name"], "Turin");
        assert_eq!(body["main"]["temp"], 21.5);
    }

    #[tokio::test]
    async fn test_non_success_status_is_network_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "message": "down"
            })))
            .mount(&mock_server)
            .await;

        let err = fetcher()
            .fetch_json(&mock_server.uri(), TimeoutPolicy::Default)
            .await
            .unwrap_err();

        match err {
            FetchError::Network(msg) => assert!(msg.contains("503"), "{}", msg),
            other => panic!("expected network error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_error_is_network_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let err = fetcher()
            .fetch_json(&mock_server.uri(), TimeoutPolicy::Default)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Network(_)));
    }

    #[tokio::test]
    async fn test_array_body_is_parse_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([1, 2, 3])))
            .mount(&mock_server)
            .await;

        let err = fetcher()
            .fetch_json(&mock_server.uri(), TimeoutPolicy::Default)
            .await
            .unwrap_err();

        match err {
            FetchError::Parse(msg) => assert!(msg.contains("array"), "{}", msg),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_truncated_body_is_parse_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"cases\": 12"))
            .mount(&mock_server)
            .await;

        let err = fetcher()
            .fetch_json(&mock_server.uri(), TimeoutPolicy::Default)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": true}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let err = fetcher()
            .fetch_json(
                &mock_server.uri(),
                TimeoutPolicy::Within(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();

        assert_eq!(err, FetchError::Timeout);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind and drop a listener to get a port nothing is serving on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = fetcher()
            .fetch_json(&format!("http://{}/", addr), TimeoutPolicy::Default)
            .await
            .unwrap_err();

        assert!(err.is_transient());
    }
}
