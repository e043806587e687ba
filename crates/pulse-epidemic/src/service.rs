//! Epidemic refresh pipeline: fetch today and yesterday, persist on change,
//! answer day-over-day delta queries.

use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use pulse_core::{NumberLocale, PersistOutcome, SnapshotStore};
use pulse_weather::Coordinate;
use tracing::instrument;

use crate::client::EpidemicClient;
use crate::country::CountryResolver;
use crate::record::{EpidemicRecord, EPIDEMIC_KEY};
use crate::types::{Day, Delta, DeltaField, DeltaView, EpidemicSnapshot};

#[derive(Debug, Default)]
struct Snapshots {
    today: Option<EpidemicSnapshot>,
    yesterday: Option<EpidemicSnapshot>,
}

pub struct EpidemicCacheService {
    client: EpidemicClient,
    countries: CountryResolver,
    store: SnapshotStore,
    locale: NumberLocale,
    snapshots: Mutex<Snapshots>,
}

impl EpidemicCacheService {
    pub fn new(
        client: EpidemicClient,
        countries: CountryResolver,
        store: SnapshotStore,
        locale: NumberLocale,
    ) -> Self {
        Self {
            client,
            countries,
            store,
            locale,
            snapshots: Mutex::new(Snapshots::default()),
        }
    }

    /// Resolve the country for `coordinate` and refresh for it.
    pub async fn refresh_for(
        &self,
        coordinate: Option<&Coordinate>,
    ) -> (Option<EpidemicSnapshot>, Option<EpidemicSnapshot>) {
        let country = self.countries.resolve(coordinate).await;
        self.refresh(country.as_deref()).await
    }

    /// Fetch both days for `country_iso`.
    ///
    /// An empty or missing country clears both snapshots without fetching.
    /// The record is only written when both days were fetched and today's
    /// tests figure differs from the stored one.
    #[instrument(skip(self), name = "epidemic_refresh")]
    pub async fn refresh(
        &self,
        country_iso: Option<&str>,
    ) -> (Option<EpidemicSnapshot>, Option<EpidemicSnapshot>) {
        let Some(iso) = country_iso.map(str::trim).filter(|c| !c.is_empty()) else {
            tracing::info!("Country unavailable; clearing epidemic snapshots");
            *self.snapshots.lock() = Snapshots::default();
            return (None, None);
        };

        // One request in flight at a time.
        let today = self.fetch_day(iso, Day::Today).await;
        let yesterday = self.fetch_day(iso, Day::Yesterday).await;

        {
            let mut snapshots = self.snapshots.lock();
            snapshots.today = today.clone();
            snapshots.yesterday = yesterday.clone();
        }

        match &today {
            Some(t) if yesterday.is_some() => self.persist(t, Local::now().date_naive()),
            _ => tracing::info!("Incomplete epidemic data for {}; keeping stored record", iso),
        }

        (today, yesterday)
    }

    async fn fetch_day(&self, iso: &str, day: Day) -> Option<EpidemicSnapshot> {
        match self.client.fetch(iso, day).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    "Epidemic fetch for {} ({}) failed, retrying next cycle: {}",
                    iso,
                    day.query(),
                    e
                );
                None
            }
            Err(e) => {
                tracing::warn!("Epidemic response for {} ({}) rejected: {}", iso, day.query(), e);
                None
            }
        }
    }

    fn persist(&self, today: &EpidemicSnapshot, date: NaiveDate) {
        let record = EpidemicRecord::from_snapshot(today, &self.locale, date);
        match self.store.persist_if_changed(EPIDEMIC_KEY, &record) {
            Ok(PersistOutcome::Written) => tracing::info!(
                "Epidemic figures updated for {} (tests {})",
                record.country_name,
                record.tests
            ),
            Ok(PersistOutcome::Unchanged) => tracing::debug!("Epidemic tests figure unchanged"),
            Err(e) => tracing::warn!("Failed to persist epidemic figures: {}", e),
        }
    }

    /// Day-over-day difference for one figure.
    pub fn diff_retrieve(&self, field: DeltaField) -> Delta {
        let snapshots = self.snapshots.lock();
        Delta::between(snapshots.today.as_ref(), snapshots.yesterday.as_ref(), field)
    }

    pub fn deltas(&self) -> DeltaView {
        let snapshots = self.snapshots.lock();
        DeltaView::between(snapshots.today.as_ref(), snapshots.yesterday.as_ref())
    }

    pub fn snapshots(&self) -> (Option<EpidemicSnapshot>, Option<EpidemicSnapshot>) {
        let snapshots = self.snapshots.lock();
        (snapshots.today.clone(), snapshots.yesterday.clone())
    }

    pub fn stored_record(&self) -> Option<EpidemicRecord> {
        self.store.load(EPIDEMIC_KEY)
    }

    pub fn locale(&self) -> &NumberLocale {
        &self.locale
    }
}
