//! # Capture File Names
//!
//! Kiosks name every snapshot after the reading it belongs to, so the
//! file name is the only place the capture time, card and temperature
//! arrive together.
//!
//! ## Grammar
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Capture File Name Grammar                          │
//! │                                                                         │
//! │   DD-MM-YYYY--HH-MM-SS--<card>--[-]D.D.jpg                              │
//! │   └───┬────┘  └───┬──┘  └─┬──┘  └──┬───┘                                │
//! │       │           │       │        └── temperature, "-" marks a failed  │
//! │       │           │       │            reading and is stored as 0.0     │
//! │       │           │       └── decimal card number or "Unknown"          │
//! │       │           └── optional, midnight when absent                    │
//! │       └── capture date                                                  │
//! │                                                                         │
//! │   27-11-2020--08-15-02--786777--36.6.jpg                                │
//! │   27-11-2020--1234--36.5.jpg                                            │
//! │   27-11-2020--08-15-02--Unknown---1.0.jpg                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::card::CardNumber;
use crate::error::{CoreError, CoreResult};
use crate::status::round_temperature;

/// Card token kiosks write when no card was presented.
pub const UNKNOWN_CARD_TOKEN: &str = "unknown";

static CAPTURE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{1,2})-(\d{1,2})-(\d{4})(?:--(\d{1,2})-(\d{1,2})-(\d{1,2}))?--(\w+)--(-?)(\d+\.\d+)\.jpg$",
    )
    .expect("capture file name regex should compile")
});

/// A decoded capture file name.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureFileName {
    /// Capture time as printed by the kiosk (kiosk local clock).
    pub captured_at: NaiveDateTime,

    /// Card presented at the kiosk, empty when unknown.
    pub card: CardNumber,

    /// Temperature rounded to one decimal. 0.0 for negative readings.
    pub temperature: f64,
}

impl CaptureFileName {
    /// Parses a kiosk file name.
    ///
    /// ## Example
    /// ```rust
    /// use thermo_core::filename::CaptureFileName;
    ///
    /// let parsed = CaptureFileName::parse("27-11-2020--1234--36.5.jpg").unwrap();
    /// assert_eq!(parsed.card.raw(), 1234);
    /// assert_eq!(parsed.temperature, 36.5);
    /// ```
    pub fn parse(name: &str) -> CoreResult<Self> {
        let caps = CAPTURE_NAME
            .captures(name)
            .ok_or_else(|| CoreError::InvalidFileName(name.to_string()))?;

        let field = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();
        let number = |i: usize| -> CoreResult<u32> {
            field(i)
                .parse::<u32>()
                .map_err(|_| CoreError::InvalidTimestamp(name.to_string()))
        };

        let date = NaiveDate::from_ymd_opt(number(3)? as i32, number(2)?, number(1)?)
            .ok_or_else(|| CoreError::InvalidTimestamp(name.to_string()))?;

        let captured_at = if caps.get(4).is_some() {
            date.and_hms_opt(number(4)?, number(5)?, number(6)?)
        } else {
            date.and_hms_opt(0, 0, 0)
        }
        .ok_or_else(|| CoreError::InvalidTimestamp(name.to_string()))?;

        let card = parse_card_token(field(7))?;

        let temperature = if field(8) == "-" {
            0.0
        } else {
            let value = field(9)
                .parse::<f64>()
                .map_err(|_| CoreError::InvalidTemperature(field(9).to_string()))?;
            round_temperature(value)
        };

        Ok(CaptureFileName {
            captured_at,
            card,
            temperature,
        })
    }
}

/// Reads the card segment of a file name.
fn parse_card_token(token: &str) -> CoreResult<CardNumber> {
    if token.eq_ignore_ascii_case(UNKNOWN_CARD_TOKEN) {
        return Ok(CardNumber::EMPTY);
    }
    token.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_full_name() {
        let parsed = CaptureFileName::parse("27-11-2020--08-15-02--786777--36.6.jpg").unwrap();
        assert_eq!(parsed.captured_at.year(), 2020);
        assert_eq!(parsed.captured_at.month(), 11);
        assert_eq!(parsed.captured_at.day(), 27);
        assert_eq!(parsed.captured_at.hour(), 8);
        assert_eq!(parsed.captured_at.minute(), 15);
        assert_eq!(parsed.captured_at.second(), 2);
        assert_eq!(parsed.card, CardNumber::pack(12, 345));
        assert_eq!(parsed.temperature, 36.6);
    }

    #[test]
    fn test_parse_short_name() {
        let parsed = CaptureFileName::parse("27-11-2020--1234--36.5.jpg").unwrap();
        assert_eq!(parsed.captured_at.date(), NaiveDate::from_ymd_opt(2020, 11, 27).unwrap());
        assert_eq!(parsed.captured_at.hour(), 0);
        assert_eq!(parsed.card.raw(), 1234);
        assert_eq!(parsed.temperature, 36.5);
    }

    #[test]
    fn test_negative_reading_is_zero() {
        let parsed = CaptureFileName::parse("27-11-2020--08-15-02--1234---36.5.jpg").unwrap();
        assert_eq!(parsed.temperature, 0.0);
        assert_eq!(parsed.card.raw(), 1234);
    }

    #[test]
    fn test_unknown_card() {
        for token in ["Unknown", "unknown", "UNKNOWN"] {
            let name = format!("01-02-2021--10-00-00--{}--36.9.jpg", token);
            let parsed = CaptureFileName::parse(&name).unwrap();
            assert!(parsed.card.is_empty());
        }
    }

    #[test]
    fn test_temperature_rounding() {
        let parsed = CaptureFileName::parse("01-02-2021--10-00-00--7--36.649.jpg").unwrap();
        assert_eq!(parsed.temperature, 36.6);
    }

    #[test]
    fn test_invalid_names() {
        assert!(matches!(
            CaptureFileName::parse("snapshot.jpg"),
            Err(CoreError::InvalidFileName(_))
        ));
        assert!(matches!(
            CaptureFileName::parse("27-11-2020--1234--36.5.png"),
            Err(CoreError::InvalidFileName(_))
        ));
        assert!(matches!(
            CaptureFileName::parse("27-13-2020--1234--36.5.jpg"),
            Err(CoreError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            CaptureFileName::parse("27-11-2020--25-00-00--1234--36.5.jpg"),
            Err(CoreError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            CaptureFileName::parse("27-11-2020--guest--36.5.jpg"),
            Err(CoreError::InvalidCard(_))
        ));
    }
}
