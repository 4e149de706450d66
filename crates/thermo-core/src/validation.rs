//! # Validation Module
//!
//! Checks applied before data crosses a boundary: configured kiosks at
//! startup and identity records arriving from the registry.

use crate::error::ValidationError;
use crate::types::{EndpointDescriptor, IdentityRecord};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a WebSocket address.
///
/// ## Rules
/// - Must start with `ws://` or `wss://`
/// - Must have something after the scheme
pub fn validate_ws_url(field: &str, url: &str) -> ValidationResult<()> {
    let rest = url
        .strip_prefix("ws://")
        .or_else(|| url.strip_prefix("wss://"))
        .ok_or_else(|| ValidationError::invalid(field, "must start with ws:// or wss://"))?;

    if rest.trim().is_empty() {
        return Err(ValidationError::invalid(field, "missing host"));
    }
    Ok(())
}

/// Validates a configured kiosk.
pub fn validate_endpoint(endpoint: &EndpointDescriptor) -> ValidationResult<()> {
    if endpoint.id == 0 {
        return Err(ValidationError::required("endpoint.id"));
    }
    if endpoint.name.trim().is_empty() {
        return Err(ValidationError::required("endpoint.name"));
    }
    validate_ws_url("endpoint.url", &endpoint.url)
}

/// Validates an identity before it is stored.
///
/// ## Rules
/// - Family and given name are required (after trimming)
/// - The card must not be the empty sentinel
pub fn validate_identity(identity: &IdentityRecord) -> ValidationResult<()> {
    if identity.card.is_empty() {
        return Err(ValidationError::required("card"));
    }
    if identity.family_name.trim().is_empty() {
        return Err(ValidationError::required("family_name"));
    }
    if identity.given_name.trim().is_empty() {
        return Err(ValidationError::required("given_name"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardNumber;

    fn endpoint(url: &str) -> EndpointDescriptor {
        EndpointDescriptor {
            id: 1,
            url: url.to_string(),
            cabin_id: 4,
            name: "Lobby".to_string(),
            description: None,
        }
    }

    #[test]
    fn test_validate_ws_url() {
        assert!(validate_ws_url("url", "ws://10.0.0.1:8080/ws").is_ok());
        assert!(validate_ws_url("url", "wss://registry.local/ws").is_ok());
        assert!(validate_ws_url("url", "http://10.0.0.1").is_err());
        assert!(validate_ws_url("url", "ws://").is_err());
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint(&endpoint("ws://10.0.0.1:8080")).is_ok());

        let mut bad = endpoint("ws://10.0.0.1:8080");
        bad.id = 0;
        assert_eq!(
            validate_endpoint(&bad),
            Err(ValidationError::required("endpoint.id"))
        );

        let mut unnamed = endpoint("ws://10.0.0.1:8080");
        unnamed.name = "  ".into();
        assert!(validate_endpoint(&unnamed).is_err());
    }

    #[test]
    fn test_validate_identity() {
        let identity = IdentityRecord::new(CardNumber::from_raw(5), "Sidorov", "Oleg");
        assert!(validate_identity(&identity).is_ok());

        let nameless = IdentityRecord::new(CardNumber::from_raw(5), " ", "Oleg");
        assert_eq!(
            validate_identity(&nameless),
            Err(ValidationError::required("family_name"))
        );

        let cardless = IdentityRecord::new(CardNumber::EMPTY, "Sidorov", "Oleg");
        assert!(validate_identity(&cardless).is_err());
    }
}
