//! # Flights — Keys and Oracle Status Codes
//!
//! A flight is identified network-wide by a [`FlightKey`]: the BLAKE3 hash
//! of `(airline address, flight code, departure timestamp)`. Deterministic
//! and collision-resistant — any two parties that agree on the three inputs
//! derive the same key without coordination.
//!
//! A flight's real-world outcome arrives from the oracle subsystem as a
//! [`FlightStatus`] code. The oracle's internal consensus machinery is not
//! our problem; by the time a code reaches the escrow engine it is a single
//! already-agreed value. Only [`FlightStatus::LateAirline`] triggers
//! insurance crediting — weather is an act of god, technical delays at the
//! airport are not the carrier's fault, and on-time flights pay nobody.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::identity::Address;

// ---------------------------------------------------------------------------
// FlightStatus
// ---------------------------------------------------------------------------

/// The resolved status of a flight, as reported by the oracle.
///
/// The wire codes are spaced in tens — a convention inherited from the
/// original oracle deployment, kept so off-network tooling keeps working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightStatus {
    /// No oracle consensus yet. Every flight starts here.
    Unknown,
    /// Departed on time. No payout.
    OnTime,
    /// Delayed due to the airline's own fault. The only code that pays.
    LateAirline,
    /// Delayed by weather.
    LateWeather,
    /// Delayed by a technical issue outside the airline's control.
    LateTechnical,
    /// Delayed for some other reason.
    LateOther,
}

/// An unrecognized oracle status code.
#[derive(Debug, Error)]
#[error("unknown flight status code: {0}")]
pub struct UnknownStatusCode(pub u8);

impl FlightStatus {
    /// The numeric wire code for this status.
    pub fn code(&self) -> u8 {
        match self {
            FlightStatus::Unknown => 0,
            FlightStatus::OnTime => 10,
            FlightStatus::LateAirline => 20,
            FlightStatus::LateWeather => 30,
            FlightStatus::LateTechnical => 40,
            FlightStatus::LateOther => 50,
        }
    }

    /// Parse a numeric wire code. Unrecognized codes are rejected rather
    /// than mapped to `Unknown` — a typo'd oracle report must not silently
    /// leave a flight unresolved.
    pub fn from_code(code: u8) -> Result<Self, UnknownStatusCode> {
        match code {
            0 => Ok(FlightStatus::Unknown),
            10 => Ok(FlightStatus::OnTime),
            20 => Ok(FlightStatus::LateAirline),
            30 => Ok(FlightStatus::LateWeather),
            40 => Ok(FlightStatus::LateTechnical),
            50 => Ok(FlightStatus::LateOther),
            other => Err(UnknownStatusCode(other)),
        }
    }

    /// `true` if this status makes the airline liable — i.e. triggers
    /// crediting of every open policy on the flight.
    pub fn is_airline_fault(&self) -> bool {
        matches!(self, FlightStatus::LateAirline)
    }

    /// `true` once the oracle has delivered a verdict of any kind.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, FlightStatus::Unknown)
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlightStatus::Unknown => write!(f, "Unknown"),
            FlightStatus::OnTime => write!(f, "OnTime"),
            FlightStatus::LateAirline => write!(f, "LateAirline"),
            FlightStatus::LateWeather => write!(f, "LateWeather"),
            FlightStatus::LateTechnical => write!(f, "LateTechnical"),
            FlightStatus::LateOther => write!(f, "LateOther"),
        }
    }
}

// ---------------------------------------------------------------------------
// FlightKey
// ---------------------------------------------------------------------------

/// A malformed flight key string.
#[derive(Debug, Error)]
#[error("invalid flight key: expected 64 hex characters")]
pub struct InvalidFlightKey;

/// Deterministic identifier for a registered flight.
///
/// `BLAKE3(airline_hash ‖ flight_code ‖ departure_be)` — the airline hash is
/// a fixed 32 bytes and the departure timestamp a fixed trailing 8 bytes, so
/// the variable-length code in the middle cannot create ambiguous preimages.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlightKey([u8; 32]);

impl FlightKey {
    /// Derive the key for `(airline, code, departure)`.
    ///
    /// `departure` is a unix timestamp in seconds. Scheduling the "same"
    /// flight at a different departure time yields a different key — which
    /// is exactly right, because it is a different insurable event.
    pub fn derive(airline: &Address, code: &str, departure: i64) -> Self {
        let mut preimage = Vec::with_capacity(32 + code.len() + 8);
        preimage.extend_from_slice(airline.as_bytes());
        preimage.extend_from_slice(code.as_bytes());
        preimage.extend_from_slice(&departure.to_be_bytes());
        Self(*blake3::hash(&preimage).as_bytes())
    }

    /// Construct from a raw 32-byte hash (storage layer rehydration).
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex encoding, used in API paths and logs.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for FlightKey {
    type Err = InvalidFlightKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| InvalidFlightKey)?;
        let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| InvalidFlightKey)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlightKey({})", self.to_hex())
    }
}

impl Serialize for FlightKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for FlightKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            let arr: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| serde::de::Error::custom("expected 32-byte flight key"))?;
            Ok(Self(arr))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn airline(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    #[test]
    fn status_codes_roundtrip() {
        for status in [
            FlightStatus::Unknown,
            FlightStatus::OnTime,
            FlightStatus::LateAirline,
            FlightStatus::LateWeather,
            FlightStatus::LateTechnical,
            FlightStatus::LateOther,
        ] {
            assert_eq!(FlightStatus::from_code(status.code()).unwrap(), status);
        }
    }

    #[test]
    fn unrecognized_code_rejected() {
        assert!(FlightStatus::from_code(21).is_err());
        assert!(FlightStatus::from_code(255).is_err());
    }

    #[test]
    fn only_late_airline_is_airline_fault() {
        assert!(FlightStatus::LateAirline.is_airline_fault());
        assert!(!FlightStatus::OnTime.is_airline_fault());
        assert!(!FlightStatus::LateWeather.is_airline_fault());
        assert!(!FlightStatus::LateTechnical.is_airline_fault());
        assert!(!FlightStatus::LateOther.is_airline_fault());
        assert!(!FlightStatus::Unknown.is_airline_fault());
    }

    #[test]
    fn unknown_is_not_resolved() {
        assert!(!FlightStatus::Unknown.is_resolved());
        assert!(FlightStatus::OnTime.is_resolved());
    }

    #[test]
    fn key_derivation_is_deterministic() {
        let k1 = FlightKey::derive(&airline(1), "SB1309", 1_900_000_000);
        let k2 = FlightKey::derive(&airline(1), "SB1309", 1_900_000_000);
        assert_eq!(k1, k2);
    }

    #[test]
    fn key_varies_with_every_input() {
        let base = FlightKey::derive(&airline(1), "SB1309", 1_900_000_000);
        assert_ne!(base, FlightKey::derive(&airline(2), "SB1309", 1_900_000_000));
        assert_ne!(base, FlightKey::derive(&airline(1), "SB1310", 1_900_000_000));
        assert_ne!(base, FlightKey::derive(&airline(1), "SB1309", 1_900_000_001));
    }

    #[test]
    fn key_hex_roundtrip() {
        let key = FlightKey::derive(&airline(9), "SB42", 1_900_000_000);
        let parsed: FlightKey = key.to_hex().parse().unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn malformed_key_strings_rejected() {
        assert!("zzzz".parse::<FlightKey>().is_err());
        assert!("deadbeef".parse::<FlightKey>().is_err()); // too short
    }

    #[test]
    fn key_serde_json_roundtrip() {
        let key = FlightKey::derive(&airline(3), "SB7", 1_900_000_000);
        let json = serde_json::to_string(&key).unwrap();
        let recovered: FlightKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, recovered);
    }
}
