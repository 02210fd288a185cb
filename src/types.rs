//! Validated value types shared across the client.
//!
//! Construction is the validation point: a [`ContainerId`] or
//! [`ContainerAddress`] that exists is well-formed, and a
//! [`BandwidthLimit`]/[`NetworkLimit`] that exists is inside its configured
//! bounds. There is no way to build an invalid instance.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Sentinel the engine prints when a template lookup has no value.
pub const NO_VALUE_SENTINEL: &str = "<no value>";

static CONTAINER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9a-f]{64}").expect("static regex"));

/// Validation failures for the value types in this module.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    /// The input did not contain exactly one 64-hex-digit container id.
    #[error("malformed container id: {0:?}")]
    MalformedContainerId(String),

    /// The engine reported no address for the requested network.
    #[error("no address available: {0:?}")]
    NoAddress(String),

    /// A limit value fell outside its configured bounds.
    #[error("limit {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Rejected value
        value: i64,
        /// Configured lower bound (inclusive)
        min: u32,
        /// Configured upper bound (inclusive)
        max: u32,
    },

    /// A limit value was not a whole number.
    #[error("limit must be a whole number, got {0}")]
    NotWholeNumber(String),
}

/// A container identifier: exactly one 64-character lowercase-hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

impl ContainerId {
    /// Parse an untrusted string as a container id.
    ///
    /// The input must contain exactly one 64-hex-digit token; surrounding
    /// whitespace is tolerated.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MalformedContainerId`] otherwise.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let mut matches = CONTAINER_ID_RE.find_iter(raw);
        match (matches.next(), matches.next()) {
            (Some(m), None) if raw.trim() == m.as_str() => Ok(Self(m.as_str().to_string())),
            _ => Err(ValidationError::MalformedContainerId(raw.to_string())),
        }
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContainerId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}

/// An opaque container IP address as reported by the engine.
///
/// The engine's `<no value>` sentinel (and the empty string) never constructs
/// a valid instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerAddress(String);

impl ContainerAddress {
    /// Wrap an engine-reported address string.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NoAddress`] for the `<no value>` sentinel
    /// or an empty string.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == NO_VALUE_SENTINEL {
            return Err(ValidationError::NoAddress(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation id threaded explicitly through every client operation.
///
/// Emitted as a structured field on every log line so concurrent operations
/// can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    /// Create a transaction id from the caller's correlation token.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configured bounds for bandwidth/network limits, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitBounds {
    /// Minimum accepted value (inclusive), in Mbit
    pub min: u32,
    /// Maximum accepted value (inclusive), in Mbit
    pub max: u32,
    /// Standard value used when a request carries none
    pub standard: u32,
}

impl Default for LimitBounds {
    fn default() -> Self {
        Self {
            min: 1,
            max: 1000,
            standard: 10,
        }
    }
}

fn check_bounds(value: i64, bounds: &LimitBounds) -> Result<u32, ValidationError> {
    if value < bounds.min as i64 || value > bounds.max as i64 {
        return Err(ValidationError::OutOfRange {
            value,
            min: bounds.min,
            max: bounds.max,
        });
    }
    Ok(value as u32)
}

fn whole_number(raw: &serde_json::Number) -> Result<i64, ValidationError> {
    raw.as_i64()
        .ok_or_else(|| ValidationError::NotWholeNumber(raw.to_string()))
}

/// A validated egress bandwidth value in Mbit.
///
/// Serializes as a bare whole number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BandwidthLimit(u32);

impl BandwidthLimit {
    /// Validate `value` against `bounds`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::OutOfRange`] when `value` is outside
    /// `[bounds.min, bounds.max]`.
    pub fn new(value: i64, bounds: &LimitBounds) -> Result<Self, ValidationError> {
        check_bounds(value, bounds).map(Self)
    }

    /// Validate a deserialized number against `bounds`, rejecting
    /// non-whole input.
    ///
    /// # Errors
    ///
    /// Returns a validation error for fractional or out-of-range input.
    pub fn from_number(
        raw: &serde_json::Number,
        bounds: &LimitBounds,
    ) -> Result<Self, ValidationError> {
        Self::new(whole_number(raw)?, bounds)
    }

    /// The standard value for the given bounds.
    pub fn standard(bounds: &LimitBounds) -> Self {
        Self(bounds.standard)
    }

    /// The value in Mbit.
    pub fn mbit(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BandwidthLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated per-network rate limit in Mbit.
///
/// Same validation rules as [`BandwidthLimit`]; kept as a distinct type so a
/// per-container bandwidth cannot be passed where a network-wide limit is
/// expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NetworkLimit(u32);

impl NetworkLimit {
    /// Validate `value` against `bounds`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::OutOfRange`] when `value` is outside
    /// `[bounds.min, bounds.max]`.
    pub fn new(value: i64, bounds: &LimitBounds) -> Result<Self, ValidationError> {
        check_bounds(value, bounds).map(Self)
    }

    /// Validate a deserialized number against `bounds`, rejecting
    /// non-whole input.
    ///
    /// # Errors
    ///
    /// Returns a validation error for fractional or out-of-range input.
    pub fn from_number(
        raw: &serde_json::Number,
        bounds: &LimitBounds,
    ) -> Result<Self, ValidationError> {
        Self::new(whole_number(raw)?, bounds)
    }

    /// The standard value for the given bounds.
    pub fn standard(bounds: &LimitBounds) -> Self {
        Self(bounds.standard)
    }

    /// The value in Mbit.
    pub fn mbit(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NetworkLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX_ID: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_container_id_accepts_single_hex_token() {
        let id = ContainerId::parse(HEX_ID).unwrap();
        assert_eq!(id.as_str(), HEX_ID);
    }

    #[test]
    fn test_container_id_tolerates_surrounding_whitespace() {
        let id = ContainerId::parse(&format!("  {HEX_ID}\n")).unwrap();
        assert_eq!(id.as_str(), HEX_ID);
    }

    #[test]
    fn test_container_id_rejects_garbage() {
        assert!(ContainerId::parse("not-an-id").is_err());
        assert!(ContainerId::parse("").is_err());
        // uppercase hex is not the engine's digest format
        assert!(ContainerId::parse(&HEX_ID.to_uppercase()).is_err());
        // 63 digits
        assert!(ContainerId::parse(&HEX_ID[1..]).is_err());
    }

    #[test]
    fn test_container_id_rejects_embedded_token() {
        assert!(ContainerId::parse(&format!("error: {HEX_ID}")).is_err());
    }

    #[test]
    fn test_container_id_rejects_two_tokens() {
        assert!(ContainerId::parse(&format!("{HEX_ID} {HEX_ID}")).is_err());
    }

    #[test]
    fn test_address_rejects_no_value_sentinel() {
        assert!(matches!(
            ContainerAddress::parse("<no value>"),
            Err(ValidationError::NoAddress(_))
        ));
        assert!(ContainerAddress::parse("").is_err());
    }

    #[test]
    fn test_address_accepts_plain_ip() {
        let addr = ContainerAddress::parse("172.17.0.2\n").unwrap();
        assert_eq!(addr.as_str(), "172.17.0.2");
    }

    #[test]
    fn test_bandwidth_limit_bounds() {
        let bounds = LimitBounds {
            min: 1,
            max: 1000,
            standard: 10,
        };
        assert!(BandwidthLimit::new(1000, &bounds).is_ok());
        assert!(BandwidthLimit::new(1, &bounds).is_ok());
        assert!(BandwidthLimit::new(1001, &bounds).is_err());
        assert!(BandwidthLimit::new(0, &bounds).is_err());
    }

    #[test]
    fn test_bandwidth_limit_rejects_fractional_number() {
        let bounds = LimitBounds::default();
        let raw = serde_json::Number::from_f64(10.5).unwrap();
        assert!(matches!(
            BandwidthLimit::from_number(&raw, &bounds),
            Err(ValidationError::NotWholeNumber(_))
        ));
    }

    #[test]
    fn test_bandwidth_limit_serializes_as_bare_number() {
        let bounds = LimitBounds::default();
        let limit = BandwidthLimit::new(55, &bounds).unwrap();
        assert_eq!(serde_json::to_string(&limit).unwrap(), "55");
    }

    #[test]
    fn test_network_limit_standard_value() {
        let bounds = LimitBounds {
            min: 1,
            max: 1000,
            standard: 100,
        };
        assert_eq!(NetworkLimit::standard(&bounds).mbit(), 100);
    }
}
