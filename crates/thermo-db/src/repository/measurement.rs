//! # Measurement Repository
//!
//! Append-only log of kiosk readings. Rows are only ever removed by the
//! retention sweep.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use thermo_core::{CardNumber, MeasurementEntry};

use crate::error::DbResult;
use crate::repository::{from_millis, to_millis};

#[derive(Debug, FromRow)]
struct MeasurementRow {
    id: String,
    endpoint_id: i64,
    card: i64,
    temperature: f64,
    image_ref: String,
    recorded_at: i64,
}

impl MeasurementRow {
    fn into_entry(self) -> DbResult<MeasurementEntry> {
        Ok(MeasurementEntry {
            id: self.id,
            endpoint_id: self.endpoint_id as u32,
            card: CardNumber::from_raw(self.card as u32),
            temperature: self.temperature,
            image_ref: self.image_ref,
            recorded_at: from_millis(self.recorded_at)?,
        })
    }
}

/// Repository for the measurement log.
#[derive(Debug, Clone)]
pub struct MeasurementRepository {
    pool: SqlitePool,
}

impl MeasurementRepository {
    /// Creates a new MeasurementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MeasurementRepository { pool }
    }

    /// Appends one reading.
    pub async fn append(&self, entry: &MeasurementEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO measurements (id, endpoint_id, card, temperature, image_ref, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.endpoint_id as i64)
        .bind(entry.card.raw() as i64)
        .bind(entry.temperature)
        .bind(&entry.image_ref)
        .bind(to_millis(entry.recorded_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Latest readings for a card, newest first.
    pub async fn list_for_card(&self, card: CardNumber, limit: i64) -> DbResult<Vec<MeasurementEntry>> {
        let rows: Vec<MeasurementRow> = sqlx::query_as(
            r#"
            SELECT id, endpoint_id, card, temperature, image_ref, recorded_at
            FROM measurements
            WHERE card = ?1
            ORDER BY recorded_at DESC
            LIMIT ?2
            "#,
        )
        .bind(card.raw() as i64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MeasurementRow::into_entry).collect()
    }

    /// Most recent reading at a kiosk.
    pub async fn last_for_endpoint(&self, endpoint_id: u32) -> DbResult<Option<MeasurementEntry>> {
        let row: Option<MeasurementRow> = sqlx::query_as(
            r#"
            SELECT id, endpoint_id, card, temperature, image_ref, recorded_at
            FROM measurements
            WHERE endpoint_id = ?1
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(endpoint_id as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MeasurementRow::into_entry).transpose()
    }

    /// Total number of rows.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM measurements")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Deletes rows recorded strictly before `cutoff`.
    ///
    /// Single statement: on failure nothing is removed.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM measurements WHERE recorded_at < ?1")
            .bind(to_millis(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;

    async fn repo() -> MeasurementRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.measurements()
    }

    #[tokio::test]
    async fn test_append_and_list() {
        let repo = repo().await;
        let card = CardNumber::from_raw(77);
        let now = Utc::now();

        for minutes in [3, 2, 1] {
            let entry = MeasurementEntry::new(4, card, 36.6, "", now - Duration::minutes(minutes));
            repo.append(&entry).await.unwrap();
        }
        repo.append(&MeasurementEntry::new(5, CardNumber::EMPTY, 0.0, "", now))
            .await
            .unwrap();

        let entries = repo.list_for_card(card, 10).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].recorded_at > entries[2].recorded_at);
        assert_eq!(entries[0].endpoint_id, 4);

        let last = repo.last_for_endpoint(5).await.unwrap().unwrap();
        assert!(last.card.is_empty());
        assert_eq!(repo.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_prune_before() {
        let repo = repo().await;
        let now = Utc::now();
        let card = CardNumber::from_raw(1);

        repo.append(&MeasurementEntry::new(1, card, 36.6, "", now - Duration::days(31)))
            .await
            .unwrap();
        repo.append(&MeasurementEntry::new(1, card, 36.7, "", now - Duration::days(29)))
            .await
            .unwrap();

        let removed = repo.prune_before(now - Duration::days(30)).await.unwrap();
        assert_eq!(removed, 1);

        let left = repo.list_for_card(card, 10).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].temperature, 36.7);
    }
}
