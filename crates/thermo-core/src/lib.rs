//! # thermo-core: Pure Codecs and Types
//!
//! Everything the bridge needs to understand a kiosk reading, with zero
//! I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Thermo Bridge Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          thermo-bridge (kiosk links, registry, orchestrator)    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ thermo-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   card    │  │ filename  │  │  status   │  │   types   │  │   │
//! │  │   │ pack/     │  │ capture   │  │ min/max   │  │ events,   │  │   │
//! │  │   │ unpack    │  │ grammar   │  │ templates │  │ identity  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 thermo-db (record store)                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`card`] - 32-bit packed access card numbers
//! - [`filename`] - Kiosk capture file name grammar
//! - [`status`] - Temperature thresholds and status messages
//! - [`types`] - Events, identities, measurement entries, notifications
//! - [`validation`] - Boundary checks
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use thermo_core::card::CardNumber;
//! use thermo_core::status::StatusPolicy;
//!
//! let card = CardNumber::pack(12, 345);
//! assert_eq!(card.to_string(), "12-345 (786777)");
//!
//! let message = StatusPolicy::default().evaluate(37.9);
//! assert!(message.alarm);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod card;
pub mod error;
pub mod filename;
pub mod status;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports
// =============================================================================

pub use card::CardNumber;
pub use error::{CoreError, CoreResult, ValidationError};
pub use filename::CaptureFileName;
pub use status::{round_temperature, StatusMessage, StatusPolicy, TemperatureStatus};
pub use types::{
    AggregatedEvent, EndpointDescriptor, EnrichedNotification, IdentityRecord, MeasurementEntry,
    RawDeviceEvent,
};

/// Default staleness window for cached identities (minutes).
///
/// ## Business Reason
/// Staff transfers and name changes reach the registry during the day;
/// an hour keeps the console close to the registry without hammering it.
pub const DEFAULT_STALENESS_MINUTES: i64 = 60;

/// Default retention for measurements and snapshots (days).
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
