//! The ledger gateway seam.
//!
//! The settlement ledger is a black box reached through [`LedgerGateway`]:
//! send a transaction, estimate its cost, call a read-only view, and
//! subscribe to its event feed. [`LedgerViews`] wraps the raw `call`
//! interface with the typed views settlement needs.

use async_trait::async_trait;
use futures::stream::BoxStream;
use gridmatch_types::{
    ContentDigest, EpochKey, GridmatchError, LedgerEvent, MeterReading, ParticipantId, Result,
    TxReceipt, constants,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A state-changing ledger call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub method: String,
    pub args: Value,
}

impl LedgerTransaction {
    pub fn new(method: impl Into<String>, args: Value) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }

    /// Serialized size, used for the inline-versus-blob decision.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        serde_json::to_vec(&self.args).map_or(0, |b| b.len())
    }
}

#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Submit a transaction and wait for inclusion.
    ///
    /// Fails with `LedgerReverted` when the ledger rejects it and with a
    /// transient error (`LedgerNetwork`, `LedgerTimeout`) when the outcome
    /// is unknown.
    async fn send_transaction(&self, tx: &LedgerTransaction) -> Result<TxReceipt>;

    /// Cost estimate for `tx`; a failure means the send would fail too.
    async fn estimate_cost(&self, tx: &LedgerTransaction) -> Result<u64>;

    /// Read-only view call.
    async fn call(&self, method: &str, args: Value) -> Result<Value>;

    /// Open the event feed for `event`. The feed is lazy, unbounded and
    /// cannot be restarted: a second subscription fails with
    /// `SubscriptionConsumed`.
    fn subscribe(&self, event: &str) -> Result<BoxStream<'static, LedgerEvent>>;
}

// ---------------------------------------------------------------------------
// Commit payload
// ---------------------------------------------------------------------------

/// Arguments of the sorted-list commit. Either `readings` travel inline or
/// `digest` points at the externalized payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortedCommitArgs {
    pub round: u64,
    pub group: u32,
    pub is_buyer_sorting: bool,
    pub sorted: Vec<ParticipantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<ContentDigest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub readings: Vec<MeterReading>,
}

/// A sorted list as recorded on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedSort {
    pub tx_hash: String,
    pub sorted: Vec<ParticipantId>,
    #[serde(default)]
    pub digest: Option<ContentDigest>,
}

/// Arguments that identify an epoch key in view calls.
#[must_use]
pub fn key_args(key: &EpochKey) -> Value {
    json!({
        "round": key.round,
        "group": key.group.0,
        "isBuyerSorting": key.role.is_buyer_sorting(),
    })
}

// ---------------------------------------------------------------------------
// Typed views
// ---------------------------------------------------------------------------

/// Typed read access over a [`LedgerGateway`].
#[derive(Clone, Copy)]
pub struct LedgerViews<'a> {
    ledger: &'a dyn LedgerGateway,
}

impl<'a> LedgerViews<'a> {
    pub fn new(ledger: &'a dyn LedgerGateway) -> Self {
        Self { ledger }
    }

    /// A seller's asking price for an hour of day.
    pub async fn selling_price(&self, participant: &ParticipantId, hour: u32) -> Result<u64> {
        let value = self
            .ledger
            .call(
                constants::SELLING_PRICE_VIEW,
                json!({ "participant": participant, "hour": hour }),
            )
            .await?;
        as_u64(constants::SELLING_PRICE_VIEW, &value)
    }

    /// A participant's metered consumption for an hour of day.
    pub async fn consumption(&self, participant: &ParticipantId, hour: u32) -> Result<u64> {
        let value = self
            .ledger
            .call(
                constants::CONSUMPTION_VIEW,
                json!({ "participant": participant, "hour": hour }),
            )
            .await?;
        as_u64(constants::CONSUMPTION_VIEW, &value)
    }

    /// The committed sort for `key`, if the ledger has one.
    pub async fn sorted_result(&self, key: &EpochKey) -> Result<Option<CommittedSort>> {
        let value = self
            .ledger
            .call(constants::SORTED_RESULT_VIEW, key_args(key))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| GridmatchError::LedgerDecode {
                view: constants::SORTED_RESULT_VIEW.to_string(),
                reason: e.to_string(),
            })
    }
}

fn as_u64(view: &str, value: &Value) -> Result<u64> {
    value.as_u64().ok_or_else(|| GridmatchError::LedgerDecode {
        view: view.to_string(),
        reason: format!("expected a non-negative integer, got {value}"),
    })
}
