//! # Database Pool Management
//!
//! Connection pool creation and the record-store facade used by the bridge.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Record Store                                    │
//! │                                                                         │
//! │  DbConfig::new(path) ← pool settings, image root, cache ttl            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← pool + migrations                       │
//! │       │                                                                 │
//! │       ├── get_identity ──► IdentityCache ──miss──► identities table    │
//! │       ├── put_identity ──► identities table ──► IdentityCache          │
//! │       ├── save_photo / save_capture ──► ImageStore (files)             │
//! │       ├── append_measurement ──► measurements table                    │
//! │       └── sweep(days) ──► DELETE old rows ──► remove old day dirs      │
//! │                                                                         │
//! │  Every orchestrator task shares one Database (Clone is cheap:          │
//! │  pool, cache and image root are reference counted).                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! Readers don't block writers, so the retention sweep and the live
//! pipeline can run side by side.

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use thermo_core::{CardNumber, IdentityRecord, MeasurementEntry};

use crate::cache::IdentityCache;
use crate::error::{DbError, DbResult};
use crate::images::ImageStore;
use crate::migrations;
use crate::repository::identity::IdentityRepository;
use crate::repository::measurement::MeasurementRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/thermo/thermo.db")
///     .images_dir("/var/lib/thermo/images")
///     .max_connections(5);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Root directory for snapshots and photos.
    pub images_dir: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// How long an identity stays in the in-memory cache.
    /// Default: 5 minutes
    pub cache_ttl: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// Images default to an `images` directory next to the database file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let database_path = path.into();
        let images_dir = database_path
            .parent()
            .map(|p| p.join("images"))
            .unwrap_or_else(|| PathBuf::from("images"));

        DbConfig {
            database_path,
            images_dir,
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            cache_ttl: Duration::from_secs(300),
            run_migrations: true,
        }
    }

    /// Sets the image root directory.
    pub fn images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.images_dir = dir.into();
        self
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the identity cache lifetime.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            images_dir: std::env::temp_dir().join("thermo-db-memory"),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(300),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Sweep Report
// =============================================================================

/// What one retention sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Measurement rows deleted.
    pub measurements_removed: u64,
    /// Snapshot day directories deleted.
    pub capture_dirs_removed: usize,
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle: pool, identity cache and image files.
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Identity cache shared by all clones.
    cache: Arc<IdentityCache>,

    /// Snapshot and photo files.
    images: ImageStore,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite: WAL, NORMAL synchronous, foreign keys
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            images = %config.images_dir.display(),
            "Initializing database connection"
        );

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            cache: Arc::new(IdentityCache::new(config.cache_ttl)),
            images: ImageStore::new(config.images_dir),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the identity repository (bypasses the cache).
    pub fn identities(&self) -> IdentityRepository {
        IdentityRepository::new(self.pool.clone())
    }

    /// Returns the measurement repository.
    pub fn measurements(&self) -> MeasurementRepository {
        MeasurementRepository::new(self.pool.clone())
    }

    /// Returns the image store.
    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    // =========================================================================
    // Record Store Operations
    // =========================================================================

    /// Looks up an identity, cache first.
    ///
    /// `Ok(None)` means the card has never been enrolled.
    pub async fn get_identity(&self, card: CardNumber) -> DbResult<Option<IdentityRecord>> {
        if let Some(hit) = self.cache.get(card).await {
            debug!(card = %card, "Identity cache hit");
            return Ok(Some(hit));
        }

        let found = self.identities().get(card).await?;
        if let Some(ref record) = found {
            self.cache.insert(record.clone()).await;
        }
        Ok(found)
    }

    /// Stores an identity and refreshes the cache.
    ///
    /// Returns the stored record and whether it was newly created.
    pub async fn put_identity(&self, identity: &IdentityRecord) -> DbResult<(IdentityRecord, bool)> {
        let (stored, created) = self.identities().upsert(identity).await?;
        self.cache.insert(stored.clone()).await;
        Ok((stored, created))
    }

    /// Stores a registry photo for a card.
    pub async fn save_photo(&self, card: CardNumber, bytes: &[u8]) -> DbResult<()> {
        self.images.save_photo(card, bytes).await?;
        Ok(())
    }

    /// Stores a kiosk snapshot and returns its image reference.
    pub async fn save_capture(
        &self,
        captured_at: NaiveDateTime,
        card: CardNumber,
        bytes: &[u8],
    ) -> DbResult<String> {
        self.images.save_capture(captured_at, card, bytes).await
    }

    /// Appends to the measurement log.
    pub async fn append_measurement(&self, entry: &MeasurementEntry) -> DbResult<()> {
        self.measurements().append(entry).await
    }

    /// Removes measurements and snapshot directories older than the window.
    ///
    /// Rows go first; if the delete fails the files are not touched.
    pub async fn sweep(&self, retention_days: u32) -> DbResult<SweepReport> {
        let cutoff = ChronoDuration::try_days(i64::from(retention_days))
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| {
                DbError::Internal(format!("retention window of {} days is out of range", retention_days))
            })?;

        let measurements_removed = self.measurements().prune_before(cutoff).await?;
        let capture_dirs_removed = self.images.prune_captures_before(cutoff.date_naive()).await?;

        info!(
            retention_days,
            measurements_removed, capture_dirs_removed, "Retention sweep complete"
        );

        Ok(SweepReport {
            measurements_removed,
            capture_dirs_removed,
        })
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
