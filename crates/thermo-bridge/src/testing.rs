//! In-memory fakes of the capability traits for unit tests.

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thermo_core::{
    CardNumber, EndpointDescriptor, EnrichedNotification, IdentityRecord, MeasurementEntry,
    RawDeviceEvent, StatusMessage,
};
use thermo_db::SweepReport;

use crate::error::{BridgeError, BridgeResult};
use crate::ports::{CorrelatedRequester, Publisher, RecordStore};

pub fn endpoint(id: u32) -> Arc<EndpointDescriptor> {
    Arc::new(EndpointDescriptor {
        id,
        url: format!("ws://10.0.0.{}:8080/ws", id),
        cabin_id: id * 10,
        name: format!("Kiosk {}", id),
        description: None,
    })
}

pub fn raw_event(card: CardNumber, temperature: f64) -> RawDeviceEvent {
    RawDeviceEvent {
        captured_at: Utc::now().naive_utc(),
        temperature,
        card,
        file_name: format!("27-11-2020--12-37-54--{}--{}.jpg", card.raw(), temperature),
        image: vec![0xFF, 0xD8, 0xFF],
    }
}

// =============================================================================
// Record Store
// =============================================================================

#[derive(Default)]
pub struct FakeStore {
    pub identities: Mutex<HashMap<CardNumber, IdentityRecord>>,
    pub puts: Mutex<Vec<(IdentityRecord, bool)>>,
    pub photos: Mutex<Vec<CardNumber>>,
    pub captures: AtomicUsize,
    pub measurements: Mutex<Vec<MeasurementEntry>>,
    pub sweeps: AtomicUsize,
    pub fail_get: AtomicBool,
    pub fail_put: AtomicBool,
    pub fail_capture: AtomicBool,
    pub fail_measurement: AtomicBool,
    pub fail_sweep: AtomicBool,
}

impl FakeStore {
    pub fn with_identity(identity: IdentityRecord) -> Arc<Self> {
        let store = FakeStore::default();
        store.identities.lock().unwrap().insert(identity.card, identity);
        Arc::new(store)
    }

    pub fn measurement_count(&self) -> usize {
        self.measurements.lock().unwrap().len()
    }

    fn failure(flag: &AtomicBool, what: &str) -> BridgeResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(BridgeError::DatabaseError(format!("{} failed", what)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn get_identity(&self, card: CardNumber) -> BridgeResult<Option<IdentityRecord>> {
        Self::failure(&self.fail_get, "get")?;
        Ok(self.identities.lock().unwrap().get(&card).cloned())
    }

    async fn put_identity(&self, identity: &IdentityRecord) -> BridgeResult<(IdentityRecord, bool)> {
        Self::failure(&self.fail_put, "put")?;
        let mut stored = identity.clone();
        stored.photo = None;
        stored.updated_at = Utc::now();
        let created = self
            .identities
            .lock()
            .unwrap()
            .insert(identity.card, stored.clone())
            .is_none();
        self.puts.lock().unwrap().push((stored.clone(), created));
        Ok((stored, created))
    }

    async fn put_photo(&self, card: CardNumber, _bytes: &[u8]) -> BridgeResult<()> {
        self.photos.lock().unwrap().push(card);
        Ok(())
    }

    async fn put_capture(
        &self,
        _captured_at: NaiveDateTime,
        card: CardNumber,
        _bytes: &[u8],
    ) -> BridgeResult<String> {
        Self::failure(&self.fail_capture, "capture")?;
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(format!("capture_{}.jpeg", card.raw()))
    }

    async fn append_measurement(&self, entry: &MeasurementEntry) -> BridgeResult<()> {
        Self::failure(&self.fail_measurement, "measurement")?;
        self.measurements.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn sweep(&self, _retention_days: u32) -> BridgeResult<SweepReport> {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        Self::failure(&self.fail_sweep, "sweep")?;
        Ok(SweepReport::default())
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Default)]
pub struct FakeRegistry {
    pub people: Mutex<HashMap<CardNumber, IdentityRecord>>,
    pub fetches: AtomicUsize,
    pub statuses: Mutex<Vec<(CardNumber, StatusMessage, u32)>>,
}

impl FakeRegistry {
    pub fn knowing(identity: IdentityRecord) -> Arc<Self> {
        let registry = FakeRegistry::default();
        registry.people.lock().unwrap().insert(identity.card, identity);
        Arc::new(registry)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn status_count(&self) -> usize {
        self.statuses.lock().unwrap().len()
    }
}

#[async_trait]
impl CorrelatedRequester for FakeRegistry {
    async fn fetch_identity(&self, card: CardNumber) -> BridgeResult<IdentityRecord> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.people
            .lock()
            .unwrap()
            .get(&card)
            .cloned()
            .ok_or(BridgeError::RequestTimeout {
                key: card.correlation_key(),
                timeout_ms: 3000,
            })
    }

    async fn push_status(
        &self,
        card: CardNumber,
        status: &StatusMessage,
        cabin: u32,
    ) -> BridgeResult<()> {
        self.statuses.lock().unwrap().push((card, status.clone(), cabin));
        Ok(())
    }
}

// =============================================================================
// Publisher
// =============================================================================

#[derive(Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<EnrichedNotification>>,
}

impl RecordingPublisher {
    pub fn published(&self) -> Vec<EnrichedNotification> {
        self.published.lock().unwrap().clone()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, notification: EnrichedNotification) {
        self.published.lock().unwrap().push(notification);
    }
}
