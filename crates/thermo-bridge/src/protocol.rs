//! # Wire Protocols
//!
//! JSON frames spoken by the kiosks and by the personnel registry.
//!
//! ## Kiosk Feed (inbound only)
//! ```text
//! {
//!   "action":      "newImage",                      ← only actionable value
//!   "timestamp":   "2020-11-27T12:37:54.838079",
//!   "filename":    "27-11-2020--12-37-54--Unknown--36.5.jpg",
//!   "date":        "11/27/2020 12:37:54",
//!   "card_number": "Unknown",
//!   "temperature": "36.5"
//! }
//! ```
//! The file name is authoritative; `card_number` and `temperature` are
//! informational copies.
//!
//! ## Registry (request/response over one socket)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  bridge ──► registry                                                    │
//! │  { "uid_request": "786777", "facility": 12, "numer": 345,               │
//! │    "mess_skud": "", "alarm": false, "cabina": 0 }     ← lookup          │
//! │                                                                         │
//! │  { "uid_request": "", "facility": 12, "numer": 345,                     │
//! │    "mess_skud": "temperature normal (36.6°)",                           │
//! │    "alarm": false, "cabina": 17 }                     ← status notify   │
//! │                                                                         │
//! │  registry ──► bridge                                                    │
//! │  { "uid_request": "786777", "family": "...", "name": "...",             │
//! │    "patronymic": "...", "numer": 345, "contora": "...",                 │
//! │    "otdel": "...", "sub_otdel": "...", "profy": "...",                  │
//! │    "photo": "<base64 jpeg>" }                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use thermo_core::{CardNumber, IdentityRecord, StatusMessage, ValidationError};

use crate::error::BridgeResult;

// =============================================================================
// Kiosk Frames
// =============================================================================

/// The action announcing a new snapshot.
pub const NEW_CAPTURE_ACTION: &str = "newImage";

/// One frame from a kiosk feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KioskFrame {
    /// Event type.
    #[serde(default)]
    pub action: String,

    /// Kiosk-side event time.
    #[serde(default)]
    pub timestamp: String,

    /// Snapshot file name on the kiosk.
    #[serde(default, rename = "filename")]
    pub file_name: String,

    /// Kiosk-side save time.
    #[serde(default)]
    pub date: String,

    /// Card number or "Unknown".
    #[serde(default)]
    pub card_number: String,

    /// Temperature as text.
    #[serde(default)]
    pub temperature: String,
}

impl KioskFrame {
    /// Parses a text frame.
    pub fn from_json(text: &str) -> BridgeResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Checks the fields every frame must carry.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.action.is_empty() {
            return Err(ValidationError::required("action"));
        }
        if self.timestamp.is_empty() {
            return Err(ValidationError::required("timestamp"));
        }
        if self.file_name.is_empty() {
            return Err(ValidationError::required("filename"));
        }
        Ok(())
    }

    /// Returns true for new-snapshot announcements.
    pub fn is_new_capture(&self) -> bool {
        self.action == NEW_CAPTURE_ACTION
    }
}

// =============================================================================
// Registry Request
// =============================================================================

/// Request sent to the registry.
///
/// An empty `message` asks for the person's record; a non-empty one pushes
/// a status line to the access-control console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRequest {
    /// Correlation key, echoed back in the response.
    #[serde(rename = "uid_request")]
    pub correlation_id: String,

    /// Card facility code.
    pub facility: u16,

    /// Card number within the facility.
    #[serde(rename = "numer")]
    pub number: u16,

    /// Status line for the console, empty for lookups.
    #[serde(rename = "mess_skud")]
    pub message: String,

    /// Raise the console alarm (only meaningful with a message).
    pub alarm: bool,

    /// Registry cabin id of the kiosk.
    #[serde(rename = "cabina")]
    pub cabin: u32,
}

impl RegistryRequest {
    /// Identity lookup keyed by the decimal card number.
    pub fn lookup(card: CardNumber) -> Self {
        RegistryRequest {
            correlation_id: card.correlation_key(),
            facility: card.facility(),
            number: card.number(),
            message: String::new(),
            alarm: false,
            cabin: 0,
        }
    }

    /// Status notification. Not correlated.
    pub fn status(card: CardNumber, status: &StatusMessage, cabin: u32) -> Self {
        RegistryRequest {
            correlation_id: String::new(),
            facility: card.facility(),
            number: card.number(),
            message: status.text.clone(),
            alarm: status.alarm,
            cabin,
        }
    }

    /// Returns true for identity lookups.
    pub fn is_lookup(&self) -> bool {
        self.message.is_empty()
    }

    /// Serializes to a text frame.
    pub fn to_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// =============================================================================
// Registry Response
// =============================================================================

/// Person record returned by the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryResponse {
    /// Correlation key of the request this answers.
    #[serde(default, rename = "uid_request")]
    pub correlation_id: String,

    /// Address of the registry's lead server.
    #[serde(default, rename = "ip_vedushiy")]
    pub lead_server: String,

    /// Registry record number.
    #[serde(default, rename = "num_rec")]
    pub record_number: u32,

    #[serde(default, rename = "family")]
    pub family_name: String,

    #[serde(default, rename = "name")]
    pub given_name: String,

    #[serde(default, rename = "patronymic")]
    pub middle_name: String,

    /// Card number within the facility.
    #[serde(default, rename = "numer")]
    pub number: u32,

    #[serde(default, rename = "contora")]
    pub organization: String,

    #[serde(default, rename = "otdel")]
    pub department: String,

    #[serde(default, rename = "sub_otdel")]
    pub sub_department: String,

    #[serde(default, rename = "profy")]
    pub position: String,

    /// Pass type.
    #[serde(default, rename = "type")]
    pub pass_type: String,

    /// Base64 JPEG.
    #[serde(default)]
    pub photo: String,
}

impl RegistryResponse {
    /// Parses a text frame, trims every string and validates it.
    pub fn from_json(text: &str) -> BridgeResult<Self> {
        let mut response: RegistryResponse = serde_json::from_str(text)?;
        response.trim();
        response.validate()?;
        Ok(response)
    }

    fn trim(&mut self) {
        for field in [
            &mut self.correlation_id,
            &mut self.lead_server,
            &mut self.family_name,
            &mut self.given_name,
            &mut self.middle_name,
            &mut self.organization,
            &mut self.department,
            &mut self.sub_department,
            &mut self.position,
            &mut self.pass_type,
            &mut self.photo,
        ] {
            let trimmed = field.trim();
            if trimmed.len() != field.len() {
                *field = trimmed.to_string();
            }
        }
    }

    /// Family and given name are required.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.family_name.is_empty() {
            return Err(ValidationError::required("family"));
        }
        if self.given_name.is_empty() {
            return Err(ValidationError::required("name"));
        }
        Ok(())
    }

    /// Converts to an identity record for `card`.
    ///
    /// The workshop (`sub_otdel`) is the department shown to operators;
    /// `otdel` is used when the registry leaves it empty. A photo that is
    /// not valid base64 is dropped with a warning.
    pub fn into_identity(self, card: CardNumber) -> IdentityRecord {
        let photo = if self.photo.is_empty() {
            None
        } else {
            match BASE64.decode(self.photo.as_bytes()) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(card = %card, error = %e, "Registry photo is not valid base64");
                    None
                }
            }
        };

        let department = if self.sub_department.is_empty() {
            self.department
        } else {
            self.sub_department
        };

        let now = Utc::now();
        IdentityRecord {
            card,
            family_name: self.family_name,
            given_name: self.given_name,
            middle_name: self.middle_name,
            organization: self.organization,
            department,
            position: self.position,
            photo,
            created_at: now,
            updated_at: now,
        }
    }
}
