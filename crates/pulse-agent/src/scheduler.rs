//! Periodic and event-driven refresh of every registered domain.
//!
//! The timer, location changes and external triggers all funnel into one
//! loop. Each domain carries a busy guard: a request arriving while that
//! domain is still refreshing is dropped, so a domain never has two
//! fetches in flight. Different domains refresh concurrently.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pulse_weather::Coordinate;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::RefreshDomain;

#[derive(Debug)]
enum Command {
    LocationChanged(Coordinate),
    Trigger(Option<String>),
    RefreshNow,
}

#[derive(Clone)]
struct DomainSlot {
    domain: Arc<dyn RefreshDomain>,
    busy: Arc<tokio::sync::Mutex<()>>,
}

pub struct RefreshScheduler {
    slots: Arc<[DomainSlot]>,
    period: Duration,
    commands: mpsc::UnboundedSender<Command>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(domains: Vec<Arc<dyn RefreshDomain>>, period: Duration) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let slots = domains
            .into_iter()
            .map(|domain| DomainSlot {
                domain,
                busy: Arc::new(tokio::sync::Mutex::new(())),
            })
            .collect();
        Self {
            slots,
            period,
            commands,
            receiver: Mutex::new(Some(receiver)),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run a full cycle now, then one every period until shut down.
    pub fn start(&self) {
        let Some(mut receiver) = self.receiver.lock().take() else {
            tracing::warn!("Refresh scheduler already started");
            return;
        };

        let slots = Arc::clone(&self.slots);
        let cancel = self.cancel.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            tracing::info!(
                "Refresh scheduler started ({} domains, every {:?})",
                slots.len(),
                period
            );
            let mut deadline = Instant::now();

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,

                    command = receiver.recv() => {
                        let Some(command) = command else { break };
                        match command {
                            Command::LocationChanged(coordinate) => {
                                tracing::info!("Location changed; refreshing");
                                if run_cycle(&slots, Some(coordinate), None) > 0 {
                                    deadline = Instant::now() + period;
                                }
                            }
                            Command::Trigger(domain) => {
                                tracing::info!(
                                    "External trigger for {}",
                                    domain.as_deref().unwrap_or("all domains")
                                );
                                run_cycle(&slots, None, domain.as_deref());
                            }
                            Command::RefreshNow => {
                                if run_cycle(&slots, None, None) > 0 {
                                    deadline = Instant::now() + period;
                                }
                            }
                        }
                    }

                    _ = tokio::time::sleep_until(deadline) => {
                        tracing::debug!("Scheduled refresh");
                        run_cycle(&slots, None, None);
                        deadline = Instant::now() + period;
                    }
                }
            }

            tracing::info!("Refresh scheduler stopped");
        });
        self.tasks.lock().push(handle);
    }

    /// Refresh with `coordinate` and restart the period.
    pub fn on_location_changed(&self, coordinate: Coordinate) {
        self.send(Command::LocationChanged(coordinate));
    }

    /// Refresh one domain (or all) without moving the timer.
    pub fn on_external_trigger(&self, domain: Option<&str>) {
        self.send(Command::Trigger(domain.map(str::to_string)));
    }

    /// Full refresh that also restarts the period, e.g. after a locale change.
    pub fn refresh_now(&self) {
        self.send(Command::RefreshNow);
    }

    /// Forward provider fixes to [`RefreshScheduler::on_location_changed`].
    pub fn forward_locations(&self, mut locations: mpsc::UnboundedReceiver<Coordinate>) {
        let commands = self.commands.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = locations.recv() => {
                        let Some(coordinate) = next else { break };
                        if commands.send(Command::LocationChanged(coordinate)).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Stop the loop and wait for in-flight refreshes to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("Scheduler task ended abnormally: {}", e);
            }
        }
        for slot in self.slots.iter() {
            let _idle = slot.busy.lock().await;
        }
        tracing::info!("Refresh scheduler shut down");
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Refresh scheduler is not running; request dropped");
        }
    }
}

/// Start a refresh for every idle domain matching `only`; returns how many
/// were started.
fn run_cycle(slots: &[DomainSlot], coordinate: Option<Coordinate>, only: Option<&str>) -> usize {
    let mut started = 0;
    for slot in slots {
        let name = slot.domain.name();
        if only.is_some_and(|wanted| wanted != name) {
            continue;
        }
        let Ok(guard) = Arc::clone(&slot.busy).try_lock_owned() else {
            tracing::debug!("{} refresh already in flight; coalescing", name);
            continue;
        };

        let domain = Arc::clone(&slot.domain);
        let coordinate = coordinate.clone();
        tokio::spawn(async move {
            let _guard = guard;
            domain.refresh(coordinate).await;
            tracing::debug!("{} refresh finished", domain.name());
        });
        started += 1;
    }
    started
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pulse_weather::{Position, ProviderKind};

    struct FakeDomain {
        name: &'static str,
        delay: Duration,
        calls: Mutex<Vec<Option<Coordinate>>>,
    }

    impl FakeDomain {
        fn new(name: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                delay,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl RefreshDomain for FakeDomain {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn refresh(&self, coordinate: Option<Coordinate>) {
            self.calls.lock().push(coordinate);
            tokio::time::sleep(self.delay).await;
        }
    }

    const PERIOD: Duration = Duration::from_secs(120 * 60);

    fn minutes(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    fn coordinate() -> Coordinate {
        Coordinate::from_provider(ProviderKind::Gps, Position::new(45.07, 7.68))
    }

    fn scheduler(domains: &[Arc<FakeDomain>]) -> RefreshScheduler {
        let domains = domains
            .iter()
            .map(|d| Arc::clone(d) as Arc<dyn RefreshDomain>)
            .collect();
        RefreshScheduler::new(domains, PERIOD)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_immediately_then_periodically() {
        let weather = FakeDomain::new("weather", Duration::from_secs(1));
        let s = scheduler(&[weather.clone()]);
        s.start();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(weather.count(), 1);

        tokio::time::sleep(minutes(119)).await;
        assert_eq!(weather.count(), 1);

        tokio::time::sleep(minutes(2)).await;
        assert_eq!(weather.count(), 2);

        s.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_refresh_is_coalesced() {
        let weather = FakeDomain::new("weather", minutes(1));
        let epidemic = FakeDomain::new("epidemic", minutes(1));
        let s = scheduler(&[weather.clone(), epidemic.clone()]);
        s.start();

        // Timer cycle is still in flight when the location changes.
        tokio::time::sleep(Duration::from_secs(5)).await;
        s.on_location_changed(coordinate());
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(weather.count(), 1);
        assert_eq!(epidemic.count(), 1);
        assert_eq!(weather.calls.lock()[0], None);

        // Once idle the domain accepts the next request.
        tokio::time::sleep(minutes(2)).await;
        s.on_location_changed(coordinate());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(weather.count(), 2);
        assert_eq!(weather.calls.lock()[1], Some(coordinate()));

        s.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_change_restarts_period() {
        let weather = FakeDomain::new("weather", Duration::from_secs(1));
        let s = scheduler(&[weather.clone()]);
        s.start();
        tokio::time::sleep(minutes(60)).await;
        assert_eq!(weather.count(), 1);

        s.on_location_changed(coordinate());
        tokio::time::sleep(minutes(1)).await;
        assert_eq!(weather.count(), 2);

        // The original deadline (t=120) has passed without a cycle.
        tokio::time::sleep(minutes(100)).await;
        assert_eq!(weather.count(), 2);

        // New deadline at t=180.
        tokio::time::sleep(minutes(20)).await;
        assert_eq!(weather.count(), 3);

        s.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_location_change_keeps_deadline() {
        let weather = FakeDomain::new("weather", minutes(10));
        let s = scheduler(&[weather.clone()]);
        s.start();

        // Still busy with the first cycle; nothing starts.
        tokio::time::sleep(Duration::from_secs(5)).await;
        s.on_location_changed(coordinate());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(weather.count(), 1);

        // The timer fires on the original schedule at t=120.
        tokio::time::sleep(minutes(120) - Duration::from_secs(9)).await;
        assert_eq!(weather.count(), 2);

        s.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_trigger_keeps_deadline() {
        let weather = FakeDomain::new("weather", Duration::from_secs(1));
        let epidemic = FakeDomain::new("epidemic", Duration::from_secs(1));
        let s = scheduler(&[weather.clone(), epidemic.clone()]);
        s.start();
        tokio::time::sleep(minutes(60)).await;

        s.on_external_trigger(Some("epidemic"));
        tokio::time::sleep(minutes(1)).await;
        assert_eq!(weather.count(), 1);
        assert_eq!(epidemic.count(), 2);

        // Timer still fires at t=120.
        tokio::time::sleep(minutes(60)).await;
        assert_eq!(weather.count(), 2);
        assert_eq!(epidemic.count(), 3);

        s.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwarded_locations_trigger_refresh() {
        let weather = FakeDomain::new("weather", Duration::from_secs(1));
        let s = scheduler(&[weather.clone()]);
        let (tx, rx) = mpsc::unbounded_channel();
        s.start();
        s.forward_locations(rx);
        tokio::time::sleep(Duration::from_secs(10)).await;

        tx.send(coordinate()).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(weather.count(), 2);
        assert_eq!(weather.calls.lock()[1], Some(coordinate()));

        s.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_refresh() {
        let weather = FakeDomain::new("weather", minutes(3));
        let s = scheduler(&[weather.clone()]);
        s.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let started = Instant::now();
        s.shutdown().await;
        assert!(started.elapsed() >= minutes(2));

        // Requests after shutdown are ignored.
        s.refresh_now();
        tokio::time::sleep(PERIOD * 2).await;
        assert_eq!(weather.count(), 1);
    }
}
