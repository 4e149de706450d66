//! # thermo-bridge: Kiosk and Registry Engine
//!
//! Connects the thermal kiosks to the personnel registry, enriches every
//! reading with the person behind the card, stores it and pushes it to the
//! operator screens.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bridge Data Flow                                 │
//! │                                                                         │
//! │  kiosk WS ──► KioskLink ──┐                                            │
//! │  kiosk WS ──► KioskLink ──┼──► Aggregator ──► Orchestrator             │
//! │  kiosk WS ──► KioskLink ──┘    (fan-in)          │                      │
//! │   + snapshot GET                                 │                      │
//! │                                 ┌────────────────┼──────────────┐      │
//! │                                 ▼                ▼              ▼      │
//! │                          RecordStore      RegistryLink      LiveFeed   │
//! │                          (thermo-db)      (correlated RPC)  (axum WS)  │
//! │                                                                         │
//! │  Every long-running task watches one shared CancellationToken.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`endpoint`] - Kiosk feed client and snapshot download
//! - [`aggregator`] - Fan-in of every kiosk into one queue
//! - [`correlated`] - Registry client with request coalescing
//! - [`pending`] - Pending-correlation table behind the registry client
//! - [`orchestrator`] - Lookup, enrich, persist, publish
//! - [`housekeeping`] - Periodic retention sweep
//! - [`publisher`] - Live feed to operator screens
//! - [`ports`] - Capability traits between the pieces
//! - [`protocol`] - Kiosk and registry wire frames
//! - [`link`] - Shared WebSocket dialing, reconnect pacing and health logging
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Bridge error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use thermo_bridge::{BridgeConfig, Orchestrator, RegistryLink};
//!
//! let config = BridgeConfig::load(None)?;
//! let cancel = CancellationToken::new();
//! let (registry, registry_task) = RegistryLink::spawn(config.registry_link_config(), cancel.clone());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod aggregator;
pub mod config;
pub mod correlated;
pub mod endpoint;
pub mod error;
pub mod housekeeping;
pub mod link;
pub mod orchestrator;
pub mod pending;
pub mod ports;
pub mod protocol;
pub mod publisher;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use aggregator::{Aggregator, AggregatorConfig};
pub use config::BridgeConfig;
pub use correlated::{RegistryConnection, RegistryLink, RegistryLinkConfig};
pub use endpoint::{HttpImageFetcher, ImageFetcher, KioskConnection, KioskLink, KioskLinkConfig};
pub use error::{BridgeError, BridgeResult};
pub use housekeeping::RetentionSweeper;
pub use link::LinkState;
pub use orchestrator::{EventOutcome, Orchestrator, OrchestratorConfig};
pub use pending::PendingTable;
pub use ports::{CorrelatedRequester, EventSource, Publisher, RecordStore};
pub use protocol::{KioskFrame, RegistryRequest, RegistryResponse};
pub use publisher::{LiveFeed, LiveFeedServer};
