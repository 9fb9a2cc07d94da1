//! Ledger receipts.
//!
//! A [`TxReceipt`] is what the ledger hands back for a confirmed
//! transaction. A [`CommitReceipt`] is what the batch submitter reports for
//! a sorted-list commit, whether it was written now or found already on
//! the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContentDigest, EpochKey, ParticipantId};

/// Confirmation of a transaction included by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block: u64,
}

/// Result of committing one sorted list.
///
/// `ordered` and `content_digest` describe what the ledger holds, which
/// for a pre-existing commit may differ from what this attempt would have
/// sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReceipt {
    pub key: EpochKey,
    pub tx_hash: String,
    pub ordered: Vec<ParticipantId>,
    pub content_digest: Option<ContentDigest>,
    /// Send attempts made; 0 when the commit was found before any send.
    pub attempts: u32,
    /// `false` when an earlier, possibly unacknowledged, commit was found.
    pub newly_committed: bool,
    pub committed_at: DateTime<Utc>,
}
