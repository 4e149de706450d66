//! # Repository Module
//!
//! SQL access for the record store, one repository per table.
//!
//! ## Available Repositories
//!
//! - [`IdentityRepository`](identity::IdentityRepository) - identity upsert and lookup
//! - [`MeasurementRepository`](measurement::MeasurementRepository) - measurement log

use chrono::{DateTime, Utc};

use crate::error::{DbError, DbResult};

pub mod identity;
pub mod measurement;

/// Timestamps are stored as unix milliseconds.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DbResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DbError::Internal(format!("timestamp out of range: {}", ms)))
}
