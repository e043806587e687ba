use pulse_core::{FetchError, JsonFetcher, TimeoutPolicy};
use tracing::instrument;

use crate::types::{Day, EpidemicSnapshot};

/// Client for a disease.sh-compatible per-country endpoint.
#[derive(Debug, Clone)]
pub struct EpidemicClient {
    fetcher: JsonFetcher,
    base_url: String,
}

impl EpidemicClient {
    pub fn new(fetcher: JsonFetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
        }
    }

    /// `{base}/{ISO}?{day}=true`
    pub fn request_url(&self, country_iso: &str, day: Day) -> Result<url::Url, FetchError> {
        let mut url = url::Url::parse(&format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            country_iso
        ))
        .map_err(|e| FetchError::Network(format!("invalid epidemic URL: {}", e)))?;
        url.query_pairs_mut().append_pair(day.query(), "true");
        Ok(url)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn fetch(&self, country_iso: &str, day: Day) -> Result<EpidemicSnapshot, FetchError> {
        let url = self.request_url(country_iso, day)?;
        let body = self
            .fetcher
            .fetch_json(url.as_str(), TimeoutPolicy::Default)
            .await?;
        Ok(EpidemicSnapshot::from_payload(&body, country_iso, day))
    }
}
