//! # Capability Traits
//!
//! The seams the orchestrator is wired through. Production implementations
//! live in this crate and in thermo-db; tests substitute in-memory fakes.
//!
//! ```text
//! ┌──────────────┐   EventSource    ┌────────────┐
//! │  KioskLink   │ ───────────────► │ Aggregator │
//! └──────────────┘                  └─────┬──────┘
//!                                         │ AggregatedEvent
//!                                   ┌─────▼──────┐  CorrelatedRequester  ┌──────────────┐
//!                                   │Orchestrator│ ────────────────────► │ RegistryLink │
//!                                   └──┬──────┬──┘                       └──────────────┘
//!                         RecordStore  │      │  Publisher
//!                                ┌─────▼──┐ ┌─▼────────┐
//!                                │Database│ │ LiveFeed │
//!                                └────────┘ └──────────┘
//! ```

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::sync::Arc;

use thermo_core::{
    CardNumber, EndpointDescriptor, EnrichedNotification, IdentityRecord, MeasurementEntry,
    RawDeviceEvent, StatusMessage,
};
use thermo_db::{Database, SweepReport};

use crate::error::BridgeResult;

// =============================================================================
// Event Source
// =============================================================================

/// A stream of readings from one kiosk.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// The kiosk this source reads from.
    fn descriptor(&self) -> Arc<EndpointDescriptor>;

    /// Waits for the next reading.
    ///
    /// Returns `BridgeError::Cancelled` once the source has been shut down.
    async fn next_event(&self) -> BridgeResult<RawDeviceEvent>;
}

// =============================================================================
// Correlated Requester
// =============================================================================

/// Registry operations used by the orchestrator.
#[async_trait]
pub trait CorrelatedRequester: Send + Sync {
    /// Fetches a person record, waiting for the correlated response.
    async fn fetch_identity(&self, card: CardNumber) -> BridgeResult<IdentityRecord>;

    /// Pushes a status line to the access-control console.
    ///
    /// Delivery is at-most-once: a full outbound queue drops the message
    /// and still returns `Ok`.
    async fn push_status(
        &self,
        card: CardNumber,
        status: &StatusMessage,
        cabin: u32,
    ) -> BridgeResult<()>;
}

// =============================================================================
// Record Store
// =============================================================================

/// Persistence used by the orchestrator.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// `Ok(None)` when the card has never been enrolled.
    async fn get_identity(&self, card: CardNumber) -> BridgeResult<Option<IdentityRecord>>;

    /// Returns the stored record and whether it was newly created.
    async fn put_identity(&self, identity: &IdentityRecord) -> BridgeResult<(IdentityRecord, bool)>;

    async fn put_photo(&self, card: CardNumber, bytes: &[u8]) -> BridgeResult<()>;

    /// Stores a kiosk snapshot and returns its image reference.
    async fn put_capture(
        &self,
        captured_at: NaiveDateTime,
        card: CardNumber,
        bytes: &[u8],
    ) -> BridgeResult<String>;

    async fn append_measurement(&self, entry: &MeasurementEntry) -> BridgeResult<()>;

    /// Prunes measurements and snapshots older than the window.
    async fn sweep(&self, retention_days: u32) -> BridgeResult<SweepReport>;
}

#[async_trait]
impl RecordStore for Database {
    async fn get_identity(&self, card: CardNumber) -> BridgeResult<Option<IdentityRecord>> {
        Ok(Database::get_identity(self, card).await?)
    }

    async fn put_identity(&self, identity: &IdentityRecord) -> BridgeResult<(IdentityRecord, bool)> {
        Ok(Database::put_identity(self, identity).await?)
    }

    async fn put_photo(&self, card: CardNumber, bytes: &[u8]) -> BridgeResult<()> {
        Ok(self.save_photo(card, bytes).await?)
    }

    async fn put_capture(
        &self,
        captured_at: NaiveDateTime,
        card: CardNumber,
        bytes: &[u8],
    ) -> BridgeResult<String> {
        Ok(self.save_capture(captured_at, card, bytes).await?)
    }

    async fn append_measurement(&self, entry: &MeasurementEntry) -> BridgeResult<()> {
        Ok(Database::append_measurement(self, entry).await?)
    }

    async fn sweep(&self, retention_days: u32) -> BridgeResult<SweepReport> {
        Ok(Database::sweep(self, retention_days).await?)
    }
}

// =============================================================================
// Publisher
// =============================================================================

/// Live fan-out of notifications.
///
/// Never blocks. Subscribers come and go independently of `publish`.
pub trait Publisher: Send + Sync {
    fn publish(&self, notification: EnrichedNotification);
}
