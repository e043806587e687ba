//! Location resolution with provider fallback.
//!
//! Resolution order is network provider, then satellite provider, then the
//! country code kept in the stored weather record. A provider that errors
//! is treated exactly like a disabled one.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_core::{FetchError, JsonFetcher, LocationError, SnapshotStore, TimeoutPolicy};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::{WeatherRecord, WEATHER_KEY};
use crate::types::{Coordinate, Position, ProviderKind};

/// Channel a provider pushes fresh fixes into.
pub type LocationListener = mpsc::UnboundedSender<Coordinate>;

/// Per-kind access to the platform's positioning.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn is_enabled(&self, kind: ProviderKind) -> Result<bool, LocationError>;

    /// Most recent fix, `Ok(None)` when the provider has none yet.
    async fn last_known(&self, kind: ProviderKind) -> Result<Option<Position>, LocationError>;

    /// Start pushing fixes to `listener` no more often than `min_interval`
    /// and only after moving `min_distance_m` meters.
    async fn request_updates(
        &self,
        kind: ProviderKind,
        min_interval: Duration,
        min_distance_m: f64,
        listener: LocationListener,
    ) -> Result<(), LocationError>;

    async fn remove_updates(&self, _kind: ProviderKind) -> Result<(), LocationError> {
        Ok(())
    }
}

pub struct LocationResolver {
    provider: Arc<dyn LocationProvider>,
    store: SnapshotStore,
    listener: Option<LocationListener>,
    min_interval: Duration,
    min_distance_m: f64,
    registered: Mutex<HashSet<ProviderKind>>,
}

impl LocationResolver {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        store: SnapshotStore,
        min_interval: Duration,
        min_distance_m: f64,
    ) -> Self {
        Self {
            provider,
            store,
            listener: None,
            min_interval,
            min_distance_m,
            registered: Mutex::new(HashSet::new()),
        }
    }

    /// Register `listener` with every provider the resolver reads from.
    pub fn with_listener(mut self, listener: LocationListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Best available coordinate. Never fails; the worst case is a
    /// coordinate with source `None`.
    pub async fn resolve(&self) -> Coordinate {
        for kind in [ProviderKind::Network, ProviderKind::Gps] {
            if !self.enabled(kind).await {
                continue;
            }
            if !self.ensure_registered(kind).await {
                continue;
            }
            match self.provider.last_known(kind).await {
                Ok(Some(position)) => {
                    tracing::debug!("Resolved location from {:?} provider", kind);
                    return Coordinate::from_provider(kind, position);
                }
                Ok(None) => tracing::debug!("{:?} provider has no fix yet", kind),
                Err(e) => tracing::warn!("{:?} provider failed: {}", kind, e),
            }
        }

        match self.stored_country() {
            Some(country) => {
                tracing::info!("No live location; using stored country {}", country);
                Coordinate::stored_fallback(country)
            }
            None => {
                tracing::info!("Location unavailable");
                Coordinate::none()
            }
        }
    }

    /// Whether any provider can currently be read.
    pub async fn are_providers_enabled(&self) -> bool {
        self.enabled(ProviderKind::Network).await || self.enabled(ProviderKind::Gps).await
    }

    /// Drop every update registration; the next `resolve` registers again.
    pub async fn stop_updates(&self) {
        let kinds: Vec<ProviderKind> = self.registered.lock().drain().collect();
        for kind in kinds {
            if let Err(e) = self.provider.remove_updates(kind).await {
                tracing::warn!("Failed to remove {:?} updates: {}", kind, e);
            }
        }
    }

    /// Country code at index 1 of the stored weather record.
    pub fn stored_country(&self) -> Option<String> {
        self.store
            .load::<WeatherRecord>(WEATHER_KEY)
            .map(|record| record.country)
            .filter(|country| !country.trim().is_empty())
    }

    async fn enabled(&self, kind: ProviderKind) -> bool {
        match self.provider.is_enabled(kind).await {
            Ok(enabled) => enabled,
            Err(e) => {
                tracing::warn!("{:?} provider check failed: {}", kind, e);
                false
            }
        }
    }

    /// Idempotent per kind. False when registration failed.
    async fn ensure_registered(&self, kind: ProviderKind) -> bool {
        let Some(listener) = &self.listener else {
            return true;
        };
        if !self.registered.lock().insert(kind) {
            return true;
        }
        match self
            .provider
            .request_updates(kind, self.min_interval, self.min_distance_m, listener.clone())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to register for {:?} updates: {}", kind, e);
                self.registered.lock().remove(&kind);
                false
            }
        }
    }
}

/// A position fixed in configuration, served as the satellite provider.
#[derive(Debug, Clone)]
pub struct FixedLocationProvider {
    position: Position,
}

impl FixedLocationProvider {
    pub fn new(position: Position) -> Self {
        Self { position }
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn is_enabled(&self, kind: ProviderKind) -> Result<bool, LocationError> {
        Ok(kind == ProviderKind::Gps)
    }

    async fn last_known(&self, kind: ProviderKind) -> Result<Option<Position>, LocationError> {
        Ok((kind == ProviderKind::Gps).then_some(self.position))
    }

    async fn request_updates(
        &self,
        kind: ProviderKind,
        _min_interval: Duration,
        _min_distance_m: f64,
        _listener: LocationListener,
    ) -> Result<(), LocationError> {
        // A fixed position never moves, so there is nothing to push.
        if kind == ProviderKind::Gps {
            Ok(())
        } else {
            Err(LocationError::ServiceUnavailable)
        }
    }
}

/// IP geolocation over HTTP, served as the network provider.
///
/// Accepts `lat`/`lon` (ip-api.com) or `latitude`/`longitude` (ipapi.co
/// style) payloads.
pub struct IpLocationProvider {
    lookup: Arc<IpLookup>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

struct IpLookup {
    fetcher: JsonFetcher,
    url: String,
    last: Mutex<Option<Position>>,
}

impl IpLookup {
    async fn locate(&self) -> Result<Position, LocationError> {
        let body = self
            .fetcher
            .fetch_json(&self.url, TimeoutPolicy::Default)
            .await
            .map_err(fetch_to_location_error)?;

        if body.get("status").and_then(|s| s.as_str()) == Some("fail") {
            return Err(LocationError::ServiceUnavailable);
        }

        let coord = |short: &str, long: &str| {
            body.get(short)
                .or_else(|| body.get(long))
                .and_then(|v| v.as_f64())
        };
        let position = match (coord("lat", "latitude"), coord("lon", "longitude")) {
            (Some(lat), Some(lon)) => Position::new(lat, lon),
            _ => return Err(LocationError::Other("no coordinates in response".into())),
        };

        *self.last.lock() = Some(position);
        Ok(position)
    }
}

fn fetch_to_location_error(e: FetchError) -> LocationError {
    match e {
        FetchError::Timeout => LocationError::Timeout,
        other => LocationError::Other(other.to_string()),
    }
}

impl IpLocationProvider {
    pub fn new(fetcher: JsonFetcher, url: impl Into<String>) -> Self {
        Self {
            lookup: Arc::new(IpLookup {
                fetcher,
                url: url.into(),
                last: Mutex::new(None),
            }),
            poller: Mutex::new(None),
        }
    }
}

#[async_trait]
impl LocationProvider for IpLocationProvider {
    async fn is_enabled(&self, kind: ProviderKind) -> Result<bool, LocationError> {
        Ok(kind == ProviderKind::Network)
    }

    async fn last_known(&self, kind: ProviderKind) -> Result<Option<Position>, LocationError> {
        if kind != ProviderKind::Network {
            return Ok(None);
        }
        let cached = *self.lookup.last.lock();
        match cached {
            Some(position) => Ok(Some(position)),
            None => self.lookup.locate().await.map(Some),
        }
    }

    async fn request_updates(
        &self,
        kind: ProviderKind,
        min_interval: Duration,
        min_distance_m: f64,
        listener: LocationListener,
    ) -> Result<(), LocationError> {
        if kind != ProviderKind::Network {
            return Err(LocationError::ServiceUnavailable);
        }
        if min_interval.is_zero() {
            return Err(LocationError::Other("update interval must be positive".into()));
        }

        let lookup = Arc::clone(&self.lookup);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(min_interval).await;
                if listener.is_closed() {
                    break;
                }
                let previous = *lookup.last.lock();
                let position = match lookup.locate().await {
                    Ok(position) => position,
                    Err(e) => {
                        tracing::debug!("IP location poll failed: {}", e);
                        continue;
                    }
                };
                let moved = previous
                    .map(|p| p.distance_m(&position) >= min_distance_m)
                    .unwrap_or(true);
                if moved
                    && listener
                        .send(Coordinate::from_provider(ProviderKind::Network, position))
                        .is_err()
                {
                    break;
                }
            }
        });

        if let Some(old) = self.poller.lock().replace(handle) {
            old.abort();
        }
        Ok(())
    }

    async fn remove_updates(&self, kind: ProviderKind) -> Result<(), LocationError> {
        if kind == ProviderKind::Network {
            if let Some(handle) = self.poller.lock().take() {
                handle.abort();
            }
        }
        Ok(())
    }
}

impl Drop for IpLocationProvider {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
        }
    }
}

/// Routes each provider kind to its own source.
#[derive(Default, Clone)]
pub struct ProviderSet {
    network: Option<Arc<dyn LocationProvider>>,
    gps: Option<Arc<dyn LocationProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network(mut self, provider: Arc<dyn LocationProvider>) -> Self {
        self.network = Some(provider);
        self
    }

    pub fn with_gps(mut self, provider: Arc<dyn LocationProvider>) -> Self {
        self.gps = Some(provider);
        self
    }

    fn source(&self, kind: ProviderKind) -> Option<&Arc<dyn LocationProvider>> {
        match kind {
            ProviderKind::Network => self.network.as_ref(),
            ProviderKind::Gps => self.gps.as_ref(),
        }
    }
}

#[async_trait]
impl LocationProvider for ProviderSet {
    async fn is_enabled(&self, kind: ProviderKind) -> Result<bool, LocationError> {
        match self.source(kind) {
            Some(p) => p.is_enabled(kind).await,
            None => Ok(false),
        }
    }

    async fn last_known(&self, kind: ProviderKind) -> Result<Option<Position>, LocationError> {
        match self.source(kind) {
            Some(p) => p.last_known(kind).await,
            None => Ok(None),
        }
    }

    async fn request_updates(
        &self,
        kind: ProviderKind,
        min_interval: Duration,
        min_distance_m: f64,
        listener: LocationListener,
    ) -> Result<(), LocationError> {
        match self.source(kind) {
            Some(p) => {
                p.request_updates(kind, min_interval, min_distance_m, listener)
                    .await
            }
            None => Err(LocationError::ServiceUnavailable),
        }
    }

    async fn remove_updates(&self, kind: ProviderKind) -> Result<(), LocationError> {
        match self.source(kind) {
            Some(p) => p.remove_updates(kind).await,
            None => Ok(()),
        }
    }
}
