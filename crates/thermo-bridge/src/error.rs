//! # Bridge Error Types
//!
//! Error types for the kiosk links, the registry link and orchestration.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Bridge Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │  (fatal)        │  │  (retried)      │  │  (logged, skipped)      │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  InvalidFrame           │ │
//! │  │  InvalidUrl     │  │  Disconnected   │  │  SerializationFailed    │ │
//! │  │  ConfigLoad     │  │  ConnectTimeout │  │  DeserializationFailed  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Correlation   │  │    Storage      │  │      Lifecycle          │ │
//! │  │  (one caller)   │  │  (secondary:    │  │                         │ │
//! │  │                 │  │   logged only)  │  │  Cancelled              │ │
//! │  │  RequestTimeout │  │  DatabaseError  │  │  ChannelError           │ │
//! │  │  QueueFull      │  │  DownloadFailed │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error type covering all possible engine failures.
#[derive(Debug, Error)]
pub enum BridgeError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid kiosk or registry URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Failed to establish a WebSocket connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket disconnected.
    #[error("Disconnected")]
    Disconnected,

    /// Connection timeout.
    #[error("Connection timeout after {0} seconds")]
    ConnectTimeout(u64),

    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Snapshot download failed.
    #[error("Image download failed: {0}")]
    DownloadFailed(String),

    /// Live feed server error.
    #[error("Live feed error: {0}")]
    LiveFeed(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Frame failed validation.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Failed to serialize a frame.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize a frame.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Codec failure (file name, card number).
    #[error(transparent)]
    Codec(#[from] thermo_core::CoreError),

    // =========================================================================
    // Correlation Errors
    // =========================================================================
    /// No response for a correlated request within its timeout.
    #[error("No registry response for {key} within {timeout_ms} ms")]
    RequestTimeout { key: String, timeout_ms: u64 },

    /// Outbound queue is full.
    #[error("Outbound queue full")]
    QueueFull,

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Record store failure.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Cancellation was requested.
    #[error("Cancelled")]
    Cancelled,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<thermo_db::DbError> for BridgeError {
    fn from(err: thermo_db::DbError) -> Self {
        BridgeError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            BridgeError::DeserializationFailed(err.to_string())
        } else {
            BridgeError::SerializationFailed(err.to_string())
        }
    }
}

impl From<url::ParseError> for BridgeError {
    fn from(err: url::ParseError) -> Self {
        BridgeError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed => BridgeError::Disconnected,
            WsError::AlreadyClosed => BridgeError::Disconnected,
            WsError::Protocol(p) => BridgeError::WebSocketError(p.to_string()),
            WsError::Io(io) => BridgeError::ConnectionFailed(io.to_string()),
            WsError::Tls(tls) => BridgeError::TlsError(tls.to_string()),
            other => BridgeError::WebSocketError(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::DownloadFailed(err.to_string())
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for BridgeError {
    fn from(err: toml::ser::Error) -> Self {
        BridgeError::ConfigSaveFailed(err.to_string())
    }
}

impl From<thermo_core::ValidationError> for BridgeError {
    fn from(err: thermo_core::ValidationError) -> Self {
        BridgeError::InvalidFrame(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl BridgeError {
    /// Returns true if the connection owner should reconnect and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionFailed(_)
                | BridgeError::Disconnected
                | BridgeError::ConnectTimeout(_)
                | BridgeError::WebSocketError(_)
                | BridgeError::TlsError(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidConfig(_)
                | BridgeError::InvalidUrl(_)
                | BridgeError::ConfigLoadFailed(_)
                | BridgeError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error came from a malformed payload.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidFrame(_)
                | BridgeError::SerializationFailed(_)
                | BridgeError::DeserializationFailed(_)
                | BridgeError::Codec(_)
        )
    }

    /// Returns true for cooperative shutdown.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled)
    }
}
