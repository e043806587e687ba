use async_trait::async_trait;
use pulse_epidemic::EpidemicCacheService;
use pulse_weather::{Coordinate, WeatherCacheService};

/// One independently refreshed data source.
#[async_trait]
pub trait RefreshDomain: Send + Sync {
    /// Stable name used for targeted triggers and logs.
    fn name(&self) -> &'static str;

    /// Run one refresh. Failures are contained and logged by the domain.
    async fn refresh(&self, coordinate: Option<Coordinate>);
}

#[async_trait]
impl RefreshDomain for WeatherCacheService {
    fn name(&self) -> &'static str {
        "weather"
    }

    async fn refresh(&self, coordinate: Option<Coordinate>) {
        WeatherCacheService::refresh(self, coordinate).await;
    }
}

#[async_trait]
impl RefreshDomain for EpidemicCacheService {
    fn name(&self) -> &'static str {
        "epidemic"
    }

    async fn refresh(&self, coordinate: Option<Coordinate>) {
        self.refresh_for(coordinate.as_ref()).await;
    }
}
