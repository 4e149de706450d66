//! # thermo-db: Record Store for Thermo Bridge
//!
//! SQLite storage for identities and the measurement log, plus the image
//! files that go with them.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Thermo Bridge Data Flow                          │
//! │                                                                         │
//! │  Orchestrator task (one per kiosk reading)                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    thermo-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐  ┌───────────────┐  ┌──────────────────┐   │   │
//! │  │   │   Database    │  │ Repositories  │  │   ImageStore     │   │   │
//! │  │   │   (pool.rs)   │  │ identity      │  │   persons/       │   │   │
//! │  │   │ IdentityCache │◄─│ measurement   │  │   captures/      │   │   │
//! │  │   └───────────────┘  └───────────────┘  └──────────────────┘   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                         │                       │
//! │       ▼                                         ▼                       │
//! │   thermo.db (WAL)                         images/ on disk              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use thermo_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("data/thermo.db")).await?;
//! let identity = db.get_identity(card).await?;
//! db.sweep(30).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod images;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use images::ImageStore;
pub use pool::{Database, DbConfig, SweepReport};

pub use repository::identity::IdentityRepository;
pub use repository::measurement::MeasurementRepository;
