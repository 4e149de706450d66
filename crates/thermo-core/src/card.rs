//! # Card Numbers
//!
//! Access cards carry a 16-bit facility code and a 16-bit card number.
//! Both halves are packed into one 32-bit value that the kiosks print in
//! their capture file names and the registry uses as its lookup key.
//!
//! ## Packing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Card Number Layout                              │
//! │                                                                         │
//! │   bit 31                 16 15                  0                       │
//! │   ┌────────────────────────┬────────────────────┐                       │
//! │   │     facility (u16)     │    number (u16)    │                       │
//! │   └────────────────────────┴────────────────────┘                       │
//! │                                                                         │
//! │   raw = facility << 16 | number                                         │
//! │   raw = 0  →  no card / unknown card                                    │
//! │                                                                         │
//! │   Example: facility 12, number 345                                      │
//! │            raw = 12 * 65536 + 345 = 786777                              │
//! │            displayed as "12-345 (786777)"                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::CoreError;

/// A packed access card identifier.
///
/// The zero value is the "no card" sentinel. Kiosks report it when the
/// person walked up without scanning a card.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS,
)]
#[serde(transparent)]
#[ts(export)]
pub struct CardNumber(u32);

impl CardNumber {
    /// The "no card" sentinel.
    pub const EMPTY: CardNumber = CardNumber(0);

    /// Wraps an already packed value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        CardNumber(raw)
    }

    /// Packs a facility code and card number.
    #[inline]
    pub const fn pack(facility: u16, number: u16) -> Self {
        CardNumber(((facility as u32) << 16) | number as u32)
    }

    /// Returns the packed value.
    #[inline]
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Returns the facility code (upper 16 bits).
    #[inline]
    pub const fn facility(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Returns the card number within the facility (lower 16 bits).
    #[inline]
    pub const fn number(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Returns true for the "no card" sentinel.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Key used to correlate registry lookups with their responses.
    pub fn correlation_key(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} ({})", self.facility(), self.number(), self.0)
    }
}

impl FromStr for CardNumber {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(CardNumber)
            .map_err(|_| CoreError::InvalidCard(s.to_string()))
    }
}

impl From<u32> for CardNumber {
    fn from(raw: u32) -> Self {
        CardNumber(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_bounds() {
        for (facility, number) in [(0, 0), (0, 1), (1, 0), (12, 345), (u16::MAX, u16::MAX)] {
            let card = CardNumber::pack(facility, number);
            assert_eq!(card.facility(), facility);
            assert_eq!(card.number(), number);
            assert_eq!(CardNumber::from_raw(card.raw()), card);
        }
    }

    #[test]
    fn test_pack_every_facility_edge() {
        for facility in (0..=u16::MAX).step_by(4099) {
            for number in (0..=u16::MAX).step_by(8191) {
                let card = CardNumber::pack(facility, number);
                assert_eq!((card.facility(), card.number()), (facility, number));
            }
        }
    }

    #[test]
    fn test_empty_card() {
        let card = CardNumber::pack(0, 0);
        assert_eq!(card.raw(), 0);
        assert!(card.is_empty());
        assert_eq!(card, CardNumber::EMPTY);
        assert_eq!(card.to_string(), "0-0 (0)");
    }

    #[test]
    fn test_display() {
        let card = CardNumber::pack(12, 345);
        assert_eq!(card.raw(), 786_777);
        assert_eq!(card.to_string(), "12-345 (786777)");
        assert_eq!(card.correlation_key(), "786777");
    }

    #[test]
    fn test_from_str() {
        assert_eq!("1234".parse::<CardNumber>().unwrap().raw(), 1234);
        assert!("abc".parse::<CardNumber>().is_err());
        assert!("99999999999".parse::<CardNumber>().is_err());
    }
}
