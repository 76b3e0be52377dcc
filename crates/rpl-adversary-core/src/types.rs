//! Core types for the adversary node
//!
//! Newtypes over the raw protocol fields the core touches, so that wraparound
//! and ordering rules live in one place.

use core::fmt;
use core::ops::{Add, Deref, Sub};
use core::str::FromStr;
use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;

use crate::errors::AdversaryError;

// ----------------------------------------------------------------------------
// Link-Layer Address
// ----------------------------------------------------------------------------

/// Length of a link-layer (IEEE 802.15.4 extended) address
pub const LINK_ADDR_LEN: usize = 8;

/// Link-layer node identity; defaults to [`LinkAddr::NULL`]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LinkAddr([u8; LINK_ADDR_LEN]);

impl LinkAddr {
    /// Create a new link address from 8 bytes
    pub const fn new(bytes: [u8; LINK_ADDR_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a link address from the first 8 bytes of a longer identifier
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut addr = [0u8; LINK_ADDR_LEN];
        let len = core::cmp::min(bytes.len(), LINK_ADDR_LEN);
        addr[..len].copy_from_slice(&bytes[..len]);
        Self(addr)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; LINK_ADDR_LEN] {
        &self.0
    }

    /// All-zero address
    pub const NULL: Self = Self([0u8; LINK_ADDR_LEN]);
}

impl fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chunk) in self.0.chunks(2).enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", hex::encode(chunk))?;
        }
        Ok(())
    }
}

impl FromStr for LinkAddr {
    type Err = AdversaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean: String = s
            .strip_prefix("0x")
            .unwrap_or(s)
            .chars()
            .filter(|c| !matches!(c, '.' | ':' | '-'))
            .collect();

        let bytes = hex::decode(&clean).map_err(|_| AdversaryError::invalid_address(s))?;
        if bytes.len() != LINK_ADDR_LEN {
            return Err(AdversaryError::invalid_address(s));
        }

        Ok(Self::from_bytes(&bytes))
    }
}

impl Deref for LinkAddr {
    type Target = [u8; LINK_ADDR_LEN];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ----------------------------------------------------------------------------
// Rank
// ----------------------------------------------------------------------------

/// RPL rank of a node within a DODAG; lower is closer to the root
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rank(u16);

impl Rank {
    /// Smallest rank value the core will ever write
    pub const MIN: Self = Self(1);
    /// Rank of a detached node
    pub const INFINITE: Self = Self(u16::MAX);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// DODAG Version
// ----------------------------------------------------------------------------

/// DODAG version number (8-bit on the wire)
///
/// Increments are modular: `255 + 1 == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DagVersion(u8);

impl DagVersion {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// Next version, wrapping at the 8-bit boundary
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for DagVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Monotonic millisecond timestamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    /// Create a new timestamp
    pub const fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get milliseconds
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Duration from `earlier` to `self`, zero if `earlier` is later
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        let millis = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(millis))
    }
}

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Trait for providing monotonic time
pub trait TimeSource {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

// ----------------------------------------------------------------------------
// Datagram
// ----------------------------------------------------------------------------

/// Inbound application datagram handed to the receive callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub sender: Ipv6Addr,
    pub payload: Vec<u8>,
}

impl Datagram {
    pub fn new(sender: Ipv6Addr, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            sender,
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_addr_display_and_parse() {
        let addr = LinkAddr::new([0x00, 0x12, 0x74, 0x01, 0x00, 0x01, 0x01, 0x01]);
        let text = addr.to_string();
        assert_eq!(text, "0012.7401.0001.0101");
        assert_eq!(text.parse::<LinkAddr>().unwrap(), addr);
        assert_eq!("00:12:74:01:00:01:01:01".parse::<LinkAddr>().unwrap(), addr);
    }

    #[test]
    fn test_link_addr_default_is_null() {
        assert_eq!(LinkAddr::default(), LinkAddr::NULL);
        assert_eq!(LinkAddr::default().to_string(), "0000.0000.0000.0000");
    }

    #[test]
    fn test_link_addr_rejects_wrong_length() {
        assert!("0012.7401".parse::<LinkAddr>().is_err());
        assert!("zz12.7401.0001.0101".parse::<LinkAddr>().is_err());
    }

    #[test]
    fn test_dag_version_wraps() {
        assert_eq!(DagVersion::new(7).next(), DagVersion::new(8));
        assert_eq!(DagVersion::new(u8::MAX).next(), DagVersion::new(0));
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp::new(1_000) + Duration::from_millis(250);
        assert_eq!(t.as_millis(), 1_250);
        assert_eq!(t - Timestamp::new(1_000), 250);
        assert_eq!(Timestamp::new(5) - Timestamp::new(10), 0);
        assert_eq!(
            Timestamp::new(10).saturating_duration_since(Timestamp::new(4)),
            Duration::from_millis(6)
        );
    }
}
