//! # Error Types
//!
//! Domain error types for thermo-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  thermo-core errors (this file)                                        │
//! │  ├── CoreError        - Codec failures (file names, cards)             │
//! │  └── ValidationError  - Required fields, malformed values              │
//! │                                                                         │
//! │  thermo-db errors (separate crate)                                     │
//! │  └── DbError          - Database and image file failures               │
//! │                                                                         │
//! │  thermo-bridge errors                                                  │
//! │  └── BridgeError      - Sockets, registry, orchestration               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → BridgeError → logs                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Core Error
// =============================================================================

/// Codec and domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A capture file name does not follow the kiosk grammar.
    ///
    /// ## When This Occurs
    /// - Kiosk firmware changed its naming scheme
    /// - The frame carried a thumbnail or a partial upload name
    #[error("Invalid capture file name: {0}")]
    InvalidFileName(String),

    /// Date or time fields are out of range (e.g. month 13).
    #[error("Invalid capture time in {0}")]
    InvalidTimestamp(String),

    /// The card token is neither a number nor the unknown marker.
    #[error("Invalid card number: {0}")]
    InvalidCard(String),

    /// The temperature token cannot be read as a number.
    #[error("Invalid temperature: {0}")]
    InvalidTemperature(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// A field value has the wrong shape.
    #[error("{field} is invalid: {reason}")]
    Invalid { field: String, reason: String },
}

impl ValidationError {
    /// Shorthand for a missing field.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    /// Shorthand for a malformed field.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
