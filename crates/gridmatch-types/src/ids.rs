//! Identifiers used throughout GridMatch.
//!
//! Orders use UUIDv7 for time-ordered lexicographic sorting. Match IDs are
//! derived deterministically from the market and the match sequence so a
//! replayed submission sequence yields the same IDs. Participants are
//! identified by their ledger address.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants;

// ---------------------------------------------------------------------------
// OrderId
// ---------------------------------------------------------------------------

/// Globally unique order identifier. Uses UUIDv7 for time-ordered sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse the hyphenated string form used on the wire.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MatchId
// ---------------------------------------------------------------------------

/// Identifier of a single match between a buy and a sell order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MatchId(pub Uuid);

impl MatchId {
    /// Deterministic `MatchId` from market symbol and match sequence.
    ///
    /// Replaying the same submissions into a fresh engine produces the
    /// **exact same** IDs.
    #[must_use]
    pub fn deterministic(market: &MarketId, sequence: u64) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"gridmatch:match_id:v1:");
        hasher.update((market.0.len() as u64).to_le_bytes());
        hasher.update(market.0.as_bytes());
        hasher.update(sequence.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(Uuid::from_bytes(bytes))
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ParticipantId
// ---------------------------------------------------------------------------

/// A market participant, identified by its ledger address.
///
/// Ordering is plain lexicographic on the address string; settlement
/// sorting uses it as the deterministic tie-breaker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// MarketId
// ---------------------------------------------------------------------------

/// A tradable instrument (e.g., `ENERGY/KWH`). Each market has its own
/// independent book and writer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(pub String);

impl MarketId {
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MarketId {
    fn default() -> Self {
        Self(constants::DEFAULT_MARKET.to_string())
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// GroupId
// ---------------------------------------------------------------------------

/// A partition of participants (feeder / cluster) settled independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_uniqueness() {
        let a = OrderId::new();
        let b = OrderId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn order_id_ordering() {
        let a = OrderId::new();
        let b = OrderId::new();
        assert!(a < b);
    }

    #[test]
    fn order_id_parse() {
        let id = OrderId::new();
        assert_eq!(OrderId::parse(&id.to_string()), Some(id));
        assert_eq!(OrderId::parse("not-a-uuid"), None);
    }

    #[test]
    fn match_id_deterministic() {
        let market = MarketId::new("ENERGY/KWH");
        let a = MatchId::deterministic(&market, 0);
        let b = MatchId::deterministic(&market, 0);
        assert_eq!(a, b);
        assert_ne!(a, MatchId::deterministic(&market, 1));
        assert_ne!(a, MatchId::deterministic(&MarketId::new("CARBON/T"), 0));
    }

    #[test]
    fn participant_ordering_is_lexicographic() {
        let a = ParticipantId::new("0xaaa");
        let b = ParticipantId::new("0xbbb");
        assert!(a < b);
    }

    #[test]
    fn participant_serializes_as_plain_string() {
        let p = ParticipantId::new("0xabc");
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"0xabc\"");
    }

    #[test]
    fn default_market() {
        assert_eq!(MarketId::default().as_str(), "ENERGY/KWH");
    }
}
