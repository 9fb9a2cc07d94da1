//! Settlement epoch types.
//!
//! A settlement round asks, per participant group, for a deterministic
//! ordering of buyers and of sellers. One [`EpochKey`] identifies one such
//! sorting task; at most one [`SortedResult`] may ever be committed per key.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GridmatchError, GroupId, ParticipantId, Result, constants};

/// Which side of the settlement round is being ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortRole {
    /// Ordered by trailing consumption, ascending.
    Buyer,
    /// Ordered by selling price for the hour, ascending.
    Seller,
}

impl SortRole {
    /// Parse the lowercase path form (`buyer` / `seller`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buyer" => Some(Self::Buyer),
            "seller" => Some(Self::Seller),
            _ => None,
        }
    }

    /// The boolean flag the ledger contract uses for this role.
    #[must_use]
    pub fn is_buyer_sorting(self) -> bool {
        self == Self::Buyer
    }
}

impl fmt::Display for SortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buyer => write!(f, "buyer"),
            Self::Seller => write!(f, "seller"),
        }
    }
}

// ---------------------------------------------------------------------------
// EpochKey: the durable idempotency token
// ---------------------------------------------------------------------------

/// `(round, group, role)`: identifies one sorting task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct EpochKey {
    /// Monotonically increasing round id (one per hour).
    pub round: u64,
    pub group: GroupId,
    pub role: SortRole,
}

impl EpochKey {
    #[must_use]
    pub fn new(round: u64, group: GroupId, role: SortRole) -> Self {
        Self { round, group, role }
    }

    /// Hour of day (0–23) this round falls on.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn hour_of_day(&self) -> u32 {
        (self.round % constants::HOURS_PER_DAY) as u32
    }
}

impl fmt::Display for EpochKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round:{}/{}/{}", self.round, self.group, self.role)
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// The ledger's "sorting needed" signal for one epoch key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortingRequest {
    pub key: EpochKey,
    pub participants: Vec<ParticipantId>,
}

impl SortingRequest {
    /// Check the request and collapse duplicate participants, keeping the
    /// first occurrence.
    ///
    /// # Errors
    /// [`GridmatchError::InvalidEpoch`] if the participant list is empty.
    pub fn normalized(mut self) -> Result<Self> {
        if self.participants.is_empty() {
            return Err(GridmatchError::InvalidEpoch {
                reason: format!("{} has no participants", self.key),
            });
        }
        let mut seen = std::collections::HashSet::with_capacity(self.participants.len());
        self.participants.retain(|p| seen.insert(p.clone()));
        Ok(self)
    }
}

/// A participant's sort metric for one epoch, fetched fresh from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantMetric {
    pub participant: ParticipantId,
    pub value: u64,
}

/// A participant left out of a committed sort because its metric could
/// not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedParticipant {
    pub participant: ParticipantId,
    pub reason: String,
}

/// One metered reading for a participant in a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterReading {
    pub participant: ParticipantId,
    pub generation: u64,
    pub consumption: u64,
}

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// SHA-256 digest of an externalized payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ContentDigest(pub [u8; 32]);

impl ContentDigest {
    /// Digest `bytes`.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hash);
        Self(out)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> Self {
        d.to_hex()
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = GridmatchError;

    fn try_from(s: String) -> Result<Self> {
        let bytes = hex::decode(&s).map_err(|e| GridmatchError::Serialization(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| GridmatchError::Serialization(format!("digest must be 32 bytes: {s}")))?;
        Ok(Self(arr))
    }
}

// ---------------------------------------------------------------------------
// SortedResult: written once per epoch key
// ---------------------------------------------------------------------------

/// The committed ordering for one epoch key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortedResult {
    pub key: EpochKey,
    /// Ascending by metric, ties by participant id.
    pub ordered: Vec<ParticipantId>,
    /// Participants dropped for partial data.
    pub excluded: Vec<ExcludedParticipant>,
    /// Present when the payload was externalized to the blob store.
    pub content_digest: Option<ContentDigest>,
    pub tx_hash: String,
    pub submitted_at: DateTime<Utc>,
}

impl SortedResult {
    /// Whether this result was committed with partial data.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.excluded.is_empty()
    }
}
