//! # Identity Repository
//!
//! One row per card. Rows are created on the first successful registry
//! lookup and overwritten by every refresh.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use thermo_core::validation::validate_identity;
use thermo_core::{CardNumber, IdentityRecord};

use crate::error::DbResult;
use crate::repository::{from_millis, to_millis};

/// Row shape of the `identities` table.
#[derive(Debug, FromRow)]
struct IdentityRow {
    card: i64,
    family_name: String,
    given_name: String,
    middle_name: String,
    organization: String,
    department: String,
    position: String,
    revision: i64,
    created_at: i64,
    updated_at: i64,
}

impl IdentityRow {
    fn into_record(self) -> DbResult<IdentityRecord> {
        Ok(IdentityRecord {
            card: CardNumber::from_raw(self.card as u32),
            family_name: self.family_name,
            given_name: self.given_name,
            middle_name: self.middle_name,
            organization: self.organization,
            department: self.department,
            position: self.position,
            photo: None,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

/// Repository for identity records.
#[derive(Debug, Clone)]
pub struct IdentityRepository {
    pool: SqlitePool,
}

impl IdentityRepository {
    /// Creates a new IdentityRepository.
    pub fn new(pool: SqlitePool) -> Self {
        IdentityRepository { pool }
    }

    /// Gets the identity for a card, `None` when the card is unknown.
    pub async fn get(&self, card: CardNumber) -> DbResult<Option<IdentityRecord>> {
        let row: Option<IdentityRow> = sqlx::query_as(
            r#"
            SELECT card, family_name, given_name, middle_name, organization,
                   department, position, revision, created_at, updated_at
            FROM identities
            WHERE card = ?1
            "#,
        )
        .bind(card.raw() as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(IdentityRow::into_record).transpose()
    }

    /// Inserts or refreshes an identity.
    ///
    /// ## Returns
    /// The stored record and `true` when the row did not exist before.
    /// `created_at` survives refreshes; `updated_at` is always `now`.
    pub async fn upsert(&self, identity: &IdentityRecord) -> DbResult<(IdentityRecord, bool)> {
        validate_identity(identity)?;
        self.upsert_at(identity, Utc::now()).await
    }

    pub(crate) async fn upsert_at(
        &self,
        identity: &IdentityRecord,
        now: DateTime<Utc>,
    ) -> DbResult<(IdentityRecord, bool)> {
        let now_ms = to_millis(now);

        let row: IdentityRow = sqlx::query_as(
            r#"
            INSERT INTO identities (
                card, family_name, given_name, middle_name, organization,
                department, position, revision, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8)
            ON CONFLICT (card) DO UPDATE SET
                family_name  = excluded.family_name,
                given_name   = excluded.given_name,
                middle_name  = excluded.middle_name,
                organization = excluded.organization,
                department   = excluded.department,
                position     = excluded.position,
                revision     = identities.revision + 1,
                updated_at   = excluded.updated_at
            RETURNING card, family_name, given_name, middle_name, organization,
                      department, position, revision, created_at, updated_at
            "#,
        )
        .bind(identity.card.raw() as i64)
        .bind(identity.family_name.trim())
        .bind(identity.given_name.trim())
        .bind(identity.middle_name.trim())
        .bind(identity.organization.trim())
        .bind(identity.department.trim())
        .bind(identity.position.trim())
        .bind(now_ms)
        .fetch_one(&self.pool)
        .await?;

        let created = row.revision == 0;
        debug!(card = %identity.card, created, revision = row.revision, "Identity stored");

        Ok((row.into_record()?, created))
    }

    /// Number of stored identities.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM identities")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
