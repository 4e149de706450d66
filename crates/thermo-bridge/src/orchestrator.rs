//! # Orchestrator
//!
//! Turns aggregated readings into enriched notifications. Every event runs
//! in its own task; the only shared state is the record store and the
//! registry link, both safe for concurrent use.
//!
//! ## Per-Event Workflow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  AggregatedEvent                                                        │
//! │     │  store snapshot (secondary: failure → empty image_ref)            │
//! │     ▼                                                                   │
//! │  card empty? ── yes ──► publish(placeholder) ──────────────────┐        │
//! │     │ no                                                       │        │
//! │     ▼                                                          │        │
//! │  RecordStore.get_identity(card)                                │        │
//! │     ├── Some(identity)                                         │        │
//! │     │      publish(enriched)                                   │        │
//! │     │      ├─► background: registry.push_status                │        │
//! │     │      └─► background, if stale: fetch → persist           │        │
//! │     │                                                          │        │
//! │     └── None                                                   │        │
//! │            publish(placeholder)                                │        │
//! │            fetch (waits) ── error ──► log, stop enrichment     │        │
//! │            photo (secondary) → put_identity ── error ──► stop  │        │
//! │            publish(enriched)                                   │        │
//! │            └─► background: registry.push_status                │        │
//! │                                                                ▼        │
//! │  append measurement (secondary) ◄──────────────────────────────┘        │
//! │  wait for background work                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A retention sweeper runs alongside for the lifetime of [`Orchestrator::run`].

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use thermo_core::{
    AggregatedEvent, CardNumber, EnrichedNotification, IdentityRecord, MeasurementEntry,
    StatusMessage, StatusPolicy, DEFAULT_RETENTION_DAYS, DEFAULT_STALENESS_MINUTES,
};

use crate::error::BridgeResult;
use crate::housekeeping::{RetentionSweeper, DEFAULT_SWEEP_INTERVAL};
use crate::ports::{CorrelatedRequester, Publisher, RecordStore};

// =============================================================================
// Configuration
// =============================================================================

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Thresholds and message templates.
    pub policy: StatusPolicy,

    /// Age after which a stored identity is refreshed in the background.
    pub staleness_window: chrono::Duration,

    /// Measurements and snapshots older than this are swept.
    pub retention_days: u32,

    /// Pause between sweeps.
    pub sweep_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            policy: StatusPolicy::default(),
            staleness_window: chrono::Duration::minutes(DEFAULT_STALENESS_MINUTES),
            retention_days: DEFAULT_RETENTION_DAYS,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// How one event's enrichment ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// No card was presented; published without identity.
    Unidentified,
    /// The record store could not be read; published without identity.
    LookupFailed,
    /// Identity came from the record store.
    Known { stale: bool },
    /// Identity was fetched from the registry and stored.
    Enrolled { created: bool },
    /// Registry fetch for an unknown card failed.
    FetchFailed,
    /// Fetched identity could not be stored.
    PersistFailed,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Lookup, enrich, persist and publish.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    registry: Arc<dyn CorrelatedRequester>,
    publisher: Arc<dyn Publisher>,
    config: Arc<OrchestratorConfig>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: Arc<dyn CorrelatedRequester>,
        publisher: Arc<dyn Publisher>,
        config: OrchestratorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Orchestrator {
            store,
            registry,
            publisher,
            config: Arc::new(config),
            cancel,
        }
    }

    /// Consumes events until cancelled or the queue closes.
    ///
    /// Each event gets its own task; the number in flight is not capped.
    pub async fn run(self, mut events_rx: mpsc::Receiver<AggregatedEvent>) {
        info!("Orchestrator starting");

        let sweeper = RetentionSweeper::new(
            Arc::clone(&self.store),
            self.config.retention_days,
            self.config.sweep_interval,
            self.cancel.clone(),
        );
        let sweeper_task = tokio::spawn(sweeper.run());

        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                event = events_rx.recv() => match event {
                    Some(event) => {
                        let this = self.clone();
                        in_flight.spawn(async move {
                            tokio::select! {
                                _ = this.cancel.cancelled() => {}
                                outcome = this.handle_event(event) => {
                                    debug!(?outcome, "Event processed");
                                }
                            }
                        });
                    }
                    None => {
                        info!("Event queue closed");
                        break;
                    }
                },
            }
        }

        while in_flight.join_next().await.is_some() {}
        if !self.cancel.is_cancelled() {
            sweeper_task.abort();
        }
        let _ = sweeper_task.await;

        info!("Orchestrator stopped");
    }

    /// Runs the full workflow for one event.
    pub async fn handle_event(&self, event: AggregatedEvent) -> EventOutcome {
        let card = event.card();
        let endpoint = Arc::clone(&event.endpoint);
        let status = self.config.policy.evaluate(event.temperature());
        let mut background = JoinSet::new();

        let image_ref = self.store_capture(&event).await;
        let placeholder = EnrichedNotification::placeholder(&event, status.status, image_ref.clone());

        let outcome = if card.is_empty() {
            self.publisher.publish(placeholder);
            EventOutcome::Unidentified
        } else {
            match self.store.get_identity(card).await {
                Err(e) => {
                    error!(card = %card, error = %e, "Identity lookup failed");
                    self.publisher.publish(placeholder);
                    EventOutcome::LookupFailed
                }
                Ok(Some(identity)) => {
                    debug!(card = %card, "Identity found in record store");
                    self.publisher.publish(placeholder.with_identity(&identity));
                    self.notify(&mut background, card, status, endpoint.cabin_id);

                    let stale = identity.is_stale(Utc::now(), self.config.staleness_window);
                    if stale {
                        debug!(card = %card, "Identity stale, refreshing");
                        self.refresh(&mut background, card);
                    }
                    EventOutcome::Known { stale }
                }
                Ok(None) => {
                    self.publisher.publish(placeholder.clone());
                    match self.enroll(card).await {
                        Ok((identity, created)) => {
                            self.publisher.publish(placeholder.with_identity(&identity));
                            self.notify(&mut background, card, status, endpoint.cabin_id);
                            EventOutcome::Enrolled { created }
                        }
                        Err(outcome) => outcome,
                    }
                }
            }
        };

        self.append_measurement(&event, image_ref).await;

        while background.join_next().await.is_some() {}
        outcome
    }

    /// Stores the snapshot. An empty reference means it was not saved.
    async fn store_capture(&self, event: &AggregatedEvent) -> String {
        if event.event.image.is_empty() {
            return String::new();
        }
        match self
            .store
            .put_capture(event.event.captured_at, event.card(), &event.event.image)
            .await
        {
            Ok(image_ref) => image_ref,
            Err(e) => {
                warn!(endpoint_id = event.endpoint.id, error = %e, "Snapshot not stored");
                String::new()
            }
        }
    }

    /// Fetches and stores an unknown identity.
    async fn enroll(&self, card: CardNumber) -> Result<(IdentityRecord, bool), EventOutcome> {
        let identity = match self.registry.fetch_identity(card).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(card = %card, error = %e, "Registry lookup failed");
                return Err(EventOutcome::FetchFailed);
            }
        };

        match persist_identity(self.store.as_ref(), identity).await {
            Ok((stored, created)) => {
                info!(card = %card, name = %stored.full_name(), created, "Identity enrolled");
                Ok((stored, created))
            }
            Err(e) => {
                error!(card = %card, error = %e, "Identity not stored");
                Err(EventOutcome::PersistFailed)
            }
        }
    }

    /// Refreshes a stale identity in the background.
    fn refresh(&self, background: &mut JoinSet<()>, card: CardNumber) {
        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.registry);
        background.spawn(async move {
            let identity = match registry.fetch_identity(card).await {
                Ok(identity) => identity,
                Err(e) => {
                    warn!(card = %card, error = %e, "Identity refresh failed");
                    return;
                }
            };
            match persist_identity(store.as_ref(), identity).await {
                Ok((_, created)) => debug!(card = %card, created, "Identity refreshed"),
                Err(e) => error!(card = %card, error = %e, "Refreshed identity not stored"),
            }
        });
    }

    /// Pushes the status line to the registry in the background.
    fn notify(
        &self,
        background: &mut JoinSet<()>,
        card: CardNumber,
        status: StatusMessage,
        cabin: u32,
    ) {
        let registry = Arc::clone(&self.registry);
        background.spawn(async move {
            if let Err(e) = registry.push_status(card, &status, cabin).await {
                warn!(card = %card, error = %e, "Status notification failed");
            }
        });
    }

    async fn append_measurement(&self, event: &AggregatedEvent, image_ref: String) {
        let entry = MeasurementEntry::new(
            event.endpoint.id,
            event.card(),
            event.temperature(),
            image_ref,
            event.received_at,
        );
        if let Err(e) = self.store.append_measurement(&entry).await {
            error!(endpoint_id = event.endpoint.id, error = %e, "Measurement not logged");
        }
    }
}

/// Saves the photo (best effort) and then the record.
async fn persist_identity(
    store: &dyn RecordStore,
    identity: IdentityRecord,
) -> BridgeResult<(IdentityRecord, bool)> {
    if let Some(photo) = identity.photo.as_deref() {
        if let Err(e) = store.put_photo(identity.card, photo).await {
            warn!(card = %identity.card, error = %e, "Photo not stored");
        }
    }
    store.put_identity(&identity).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{endpoint, raw_event, FakeRegistry, FakeStore, RecordingPublisher};
    use std::sync::atomic::Ordering;
    use thermo_core::TemperatureStatus;

    struct Harness {
        store: Arc<FakeStore>,
        registry: Arc<FakeRegistry>,
        publisher: Arc<RecordingPublisher>,
        orchestrator: Orchestrator,
    }

    fn harness(store: Arc<FakeStore>, registry: Arc<FakeRegistry>) -> Harness {
        let publisher = Arc::new(RecordingPublisher::default());
        let orchestrator = Orchestrator::new(
            store.clone(),
            registry.clone(),
            publisher.clone(),
            OrchestratorConfig::default(),
            CancellationToken::new(),
        );
        Harness {
            store,
            registry,
            publisher,
            orchestrator,
        }
    }

    fn event(card: CardNumber, temperature: f64) -> AggregatedEvent {
        AggregatedEvent::new(endpoint(3), raw_event(card, temperature))
    }

    fn person(card: CardNumber) -> IdentityRecord {
        let mut identity = IdentityRecord::new(card, "Ivanova", "Anna");
        identity.department = "Warehouse 2".into();
        identity
    }

    #[tokio::test]
    async fn test_known_fresh_identity() {
        let card = CardNumber::pack(12, 345);
        let h = harness(FakeStore::with_identity(person(card)), Arc::new(FakeRegistry::default()));

        let outcome = h.orchestrator.handle_event(event(card, 36.6)).await;
        assert_eq!(outcome, EventOutcome::Known { stale: false });

        let published = h.publisher.published();
        assert_eq!(published.len(), 1);
        assert!(published[0].identified);
        assert_eq!(published[0].family_name, "Ivanova");
        assert_eq!(published[0].status, TemperatureStatus::Normal);
        assert_eq!(published[0].image_ref, format!("capture_{}.jpeg", card.raw()));

        assert_eq!(h.registry.fetch_count(), 0);
        assert_eq!(h.registry.status_count(), 1);
        assert_eq!(h.store.measurement_count(), 1);
    }

    #[tokio::test]
    async fn test_known_stale_identity_refreshes_in_background() {
        let card = CardNumber::pack(12, 345);
        let mut stale = person(card);
        stale.updated_at = Utc::now() - chrono::Duration::minutes(61);
        let mut fresh = person(card);
        fresh.position = "Storekeeper".into();

        let h = harness(FakeStore::with_identity(stale), FakeRegistry::knowing(fresh));

        let outcome = h.orchestrator.handle_event(event(card, 38.0)).await;
        assert_eq!(outcome, EventOutcome::Known { stale: true });

        let published = h.publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].status, TemperatureStatus::Alarm);
        assert_eq!(published[0].position, "");

        assert_eq!(h.registry.fetch_count(), 1);
        let puts = h.store.puts.lock().unwrap().clone();
        assert_eq!(puts.len(), 1);
        assert!(!puts[0].1);
        assert_eq!(puts[0].0.position, "Storekeeper");

        let statuses = h.registry.statuses.lock().unwrap().clone();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].1.alarm);
        assert_eq!(statuses[0].2, 30);
    }

    #[tokio::test]
    async fn test_unknown_card_is_enrolled() {
        let card = CardNumber::pack(7, 77);
        let mut fetched = person(card);
        fetched.photo = Some(vec![1, 2, 3]);
        let h = harness(Arc::new(FakeStore::default()), FakeRegistry::knowing(fetched));

        let outcome = h.orchestrator.handle_event(event(card, 33.0)).await;
        assert_eq!(outcome, EventOutcome::Enrolled { created: true });

        let published = h.publisher.published();
        assert_eq!(published.len(), 2);
        assert!(!published[0].identified);
        assert_eq!(published[0].family_name, "");
        assert!(published[1].identified);
        assert_eq!(published[1].department, "Warehouse 2");
        assert_eq!(published[1].status, TemperatureStatus::Low);

        assert_eq!(h.registry.fetch_count(), 1);
        assert_eq!(h.store.puts.lock().unwrap().len(), 1);
        assert_eq!(h.store.photos.lock().unwrap().as_slice(), &[card]);
        assert_eq!(h.registry.status_count(), 1);
        assert_eq!(h.store.measurement_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_card_fetch_failure_stops_enrichment() {
        let card = CardNumber::pack(7, 78);
        let h = harness(Arc::new(FakeStore::default()), Arc::new(FakeRegistry::default()));

        let outcome = h.orchestrator.handle_event(event(card, 36.6)).await;
        assert_eq!(outcome, EventOutcome::FetchFailed);

        assert_eq!(h.publisher.published().len(), 1);
        assert!(h.store.puts.lock().unwrap().is_empty());
        assert_eq!(h.registry.status_count(), 0);
        assert_eq!(h.store.measurement_count(), 1);
    }

    #[tokio::test]
    async fn test_persist_failure_skips_second_publish() {
        let card = CardNumber::pack(7, 79);
        let store = Arc::new(FakeStore::default());
        store.fail_put.store(true, Ordering::SeqCst);
        let h = harness(store, FakeRegistry::knowing(person(card)));

        let outcome = h.orchestrator.handle_event(event(card, 36.6)).await;
        assert_eq!(outcome, EventOutcome::PersistFailed);
        assert_eq!(h.publisher.published().len(), 1);
        assert_eq!(h.registry.status_count(), 0);
        assert_eq!(h.store.measurement_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_card_skips_registry() {
        let h = harness(Arc::new(FakeStore::default()), Arc::new(FakeRegistry::default()));

        let outcome = h.orchestrator.handle_event(event(CardNumber::EMPTY, 36.6)).await;
        assert_eq!(outcome, EventOutcome::Unidentified);
        assert_eq!(h.publisher.published().len(), 1);
        assert_eq!(h.registry.fetch_count(), 0);
        assert_eq!(h.registry.status_count(), 0);
        assert_eq!(h.store.measurement_count(), 1);
    }

    #[tokio::test]
    async fn test_secondary_failures_are_contained() {
        let card = CardNumber::pack(1, 1);
        let store = FakeStore::with_identity(person(card));
        store.fail_capture.store(true, Ordering::SeqCst);
        store.fail_measurement.store(true, Ordering::SeqCst);
        let h = harness(store, Arc::new(FakeRegistry::default()));

        let outcome = h.orchestrator.handle_event(event(card, 36.6)).await;
        assert_eq!(outcome, EventOutcome::Known { stale: false });

        let published = h.publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].image_ref, "");
        assert_eq!(h.store.measurement_count(), 0);
    }

    #[tokio::test]
    async fn test_lookup_failure_still_publishes_and_logs() {
        let card = CardNumber::pack(1, 2);
        let store = Arc::new(FakeStore::default());
        store.fail_get.store(true, Ordering::SeqCst);
        let h = harness(store, Arc::new(FakeRegistry::default()));

        let outcome = h.orchestrator.handle_event(event(card, 36.6)).await;
        assert_eq!(outcome, EventOutcome::LookupFailed);
        assert_eq!(h.publisher.published().len(), 1);
        assert_eq!(h.registry.fetch_count(), 0);
        assert_eq!(h.store.measurement_count(), 1);
    }

    #[tokio::test]
    async fn test_run_processes_queue_until_cancelled() {
        let card = CardNumber::pack(2, 2);
        let store = FakeStore::with_identity(person(card));
        let publisher = Arc::new(RecordingPublisher::default());
        let cancel = CancellationToken::new();
        let orchestrator = Orchestrator::new(
            store.clone(),
            Arc::new(FakeRegistry::default()),
            publisher.clone(),
            OrchestratorConfig::default(),
            cancel.clone(),
        );

        let (tx, rx) = mpsc::channel(10);
        let task = tokio::spawn(orchestrator.run(rx));
        for _ in 0..3 {
            tx.send(event(card, 36.6)).await.unwrap();
        }

        while store.measurement_count() < 3 || store.sweeps.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(publisher.published().len(), 3);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }
}
