//! # Domain Types
//!
//! Data carried between the kiosk links, the orchestrator, the record store
//! and the live feed.
//!
//! ## Event Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Event Lifecycle                                 │
//! │                                                                         │
//! │  ┌──────────────────┐   kiosk link   ┌──────────────────┐              │
//! │  │ kiosk JSON frame │ ─────────────► │  RawDeviceEvent  │              │
//! │  └──────────────────┘                │  time, t°, card  │              │
//! │                                      │  image bytes     │              │
//! │                                      └────────┬─────────┘              │
//! │                                     aggregator│ + received_at          │
//! │                                               │ + EndpointDescriptor   │
//! │                                      ┌────────▼─────────┐              │
//! │                                      │ AggregatedEvent  │              │
//! │                                      └────────┬─────────┘              │
//! │                                   orchestrator│                        │
//! │                  ┌────────────────────────────┼───────────────┐        │
//! │                  ▼                            ▼               ▼        │
//! │        ┌──────────────────┐      ┌─────────────────────┐ ┌──────────┐  │
//! │        │ IdentityRecord   │      │EnrichedNotification │ │Measurement│ │
//! │        │ (record store)   │      │   (live feed)       │ │  Entry    │ │
//! │        └──────────────────┘      └─────────────────────┘ └──────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ts_rs::TS;
use uuid::Uuid;

use crate::card::CardNumber;
use crate::status::TemperatureStatus;

// =============================================================================
// Endpoint Descriptor
// =============================================================================

/// Immutable identity of one kiosk, loaded at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Local kiosk id, used in the measurement log.
    pub id: u32,

    /// WebSocket address of the kiosk feed (ws://host:port/path).
    pub url: String,

    /// Cabin id the registry knows this kiosk by.
    pub cabin_id: u32,

    /// Display name.
    pub name: String,

    /// Free-form note (location, serial number).
    #[serde(default)]
    pub description: Option<String>,
}

// =============================================================================
// Device Events
// =============================================================================

/// One reading decoded by a kiosk link.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDeviceEvent {
    /// Capture time printed by the kiosk.
    pub captured_at: NaiveDateTime,

    /// Temperature, one decimal. 0.0 for failed readings.
    pub temperature: f64,

    /// Card presented, empty when unknown.
    pub card: CardNumber,

    /// Original kiosk file name.
    pub file_name: String,

    /// Snapshot bytes (JPEG).
    pub image: Vec<u8>,
}

/// A raw event stamped by the aggregator.
#[derive(Debug, Clone)]
pub struct AggregatedEvent {
    /// When the aggregator accepted the event.
    pub received_at: DateTime<Utc>,

    /// Kiosk the event came from.
    pub endpoint: Arc<EndpointDescriptor>,

    /// The reading itself.
    pub event: RawDeviceEvent,
}

impl AggregatedEvent {
    /// Stamps a raw event with the current time.
    pub fn new(endpoint: Arc<EndpointDescriptor>, event: RawDeviceEvent) -> Self {
        AggregatedEvent {
            received_at: Utc::now(),
            endpoint,
            event,
        }
    }

    /// Card presented at the kiosk.
    pub fn card(&self) -> CardNumber {
        self.event.card
    }

    /// Temperature reading.
    pub fn temperature(&self) -> f64 {
        self.event.temperature
    }
}

// =============================================================================
// Identity Record
// =============================================================================

/// Personnel data for one card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Owning card.
    pub card: CardNumber,

    /// Family name.
    pub family_name: String,

    /// Given name.
    pub given_name: String,

    /// Middle name (patronymic), may be empty.
    #[serde(default)]
    pub middle_name: String,

    /// Employer.
    #[serde(default)]
    pub organization: String,

    /// Department within the employer.
    #[serde(default)]
    pub department: String,

    /// Job title.
    #[serde(default)]
    pub position: String,

    /// Photo bytes (JPEG), only present right after a registry fetch.
    #[serde(skip)]
    pub photo: Option<Vec<u8>>,

    /// First time the record was stored.
    pub created_at: DateTime<Utc>,

    /// Last time the record was stored or refreshed.
    pub updated_at: DateTime<Utc>,
}

impl IdentityRecord {
    /// Creates a record with both timestamps set to now.
    pub fn new(card: CardNumber, family_name: impl Into<String>, given_name: impl Into<String>) -> Self {
        let now = Utc::now();
        IdentityRecord {
            card,
            family_name: family_name.into(),
            given_name: given_name.into(),
            middle_name: String::new(),
            organization: String::new(),
            department: String::new(),
            position: String::new(),
            photo: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true once `now - updated_at` exceeds the window.
    pub fn is_stale(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now.signed_duration_since(self.updated_at) > window
    }

    /// "Family Given Middle" without extra spaces.
    pub fn full_name(&self) -> String {
        [&self.family_name, &self.given_name, &self.middle_name]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// =============================================================================
// Measurement Log
// =============================================================================

/// Append-only record of one reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementEntry {
    /// UUID v4.
    pub id: String,

    /// Kiosk id.
    pub endpoint_id: u32,

    /// Card presented, empty when unknown.
    pub card: CardNumber,

    /// Temperature, one decimal.
    pub temperature: f64,

    /// Stored snapshot name, empty when the image was not saved.
    pub image_ref: String,

    /// When the reading was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl MeasurementEntry {
    /// Creates an entry with a fresh id.
    pub fn new(
        endpoint_id: u32,
        card: CardNumber,
        temperature: f64,
        image_ref: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        MeasurementEntry {
            id: Uuid::new_v4().to_string(),
            endpoint_id,
            card,
            temperature,
            image_ref: image_ref.into(),
            recorded_at,
        }
    }
}

// =============================================================================
// Enriched Notification
// =============================================================================

/// What live subscribers receive for every reading.
///
/// Identity fields are empty in the placeholder sent before a registry
/// fetch completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EnrichedNotification {
    /// Kiosk id.
    pub endpoint_id: u32,

    /// Kiosk display name.
    pub endpoint_name: String,

    /// When the reading was accepted.
    #[ts(as = "String")]
    pub received_at: DateTime<Utc>,

    /// Temperature, one decimal.
    pub temperature: f64,

    /// Reading classification.
    pub status: TemperatureStatus,

    /// Stored snapshot name.
    pub image_ref: String,

    /// Card presented.
    pub card: CardNumber,

    /// True when the identity fields below are populated.
    pub identified: bool,

    pub family_name: String,
    pub given_name: String,
    pub middle_name: String,
    pub organization: String,
    pub department: String,
    pub position: String,
}

impl EnrichedNotification {
    /// Notification without identity fields.
    pub fn placeholder(
        event: &AggregatedEvent,
        status: TemperatureStatus,
        image_ref: impl Into<String>,
    ) -> Self {
        EnrichedNotification {
            endpoint_id: event.endpoint.id,
            endpoint_name: event.endpoint.name.clone(),
            received_at: event.received_at,
            temperature: event.temperature(),
            status,
            image_ref: image_ref.into(),
            card: event.card(),
            identified: false,
            family_name: String::new(),
            given_name: String::new(),
            middle_name: String::new(),
            organization: String::new(),
            department: String::new(),
            position: String::new(),
        }
    }

    /// Fills the identity fields.
    pub fn with_identity(mut self, identity: &IdentityRecord) -> Self {
        self.identified = true;
        self.family_name = identity.family_name.clone();
        self.given_name = identity.given_name.clone();
        self.middle_name = identity.middle_name.clone();
        self.organization = identity.organization.clone();
        self.department = identity.department.clone();
        self.position = identity.position.clone();
        self
    }
}
