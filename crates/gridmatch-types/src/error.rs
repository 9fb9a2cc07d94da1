//! Error types for GridMatch.
//!
//! All errors use the `GM_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order errors
//! - 4xx: Settlement epoch errors
//! - 5xx: Matching errors
//! - 6xx: Settlement submission errors
//! - 7xx: Ledger / blob store errors
//! - 9xx: Storage / general / internal errors
//!
//! Every variant also belongs to one [`ErrorClass`], which decides whether
//! the caller sees it, whether it is retried, or whether it is absorbed as
//! an idempotent no-op.

use thiserror::Error;

use crate::{EpochKey, MatchId, OrderId, ParticipantId};

/// How an error is handled by the component that observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed request. Rejected synchronously, never retried.
    InvalidInput,
    /// I/O or ledger hiccup. Retried with bounded exponential backoff.
    Transient,
    /// Duplicate epoch key or stale order state. Resolved as a no-op.
    Conflict,
    /// Corruption or unrecoverable configuration. Propagated to the operator.
    Fatal,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput => write!(f, "INVALID_INPUT"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Central error enum for all GridMatch operations.
#[derive(Debug, Clone, Error)]
pub enum GridmatchError {
    // =================================================================
    // Order Errors (1xx)
    // =================================================================
    /// The order is unknown, or already matched/cancelled.
    #[error("GM_ERR_100: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order failed validation (non-positive amount, negative price, ...).
    #[error("GM_ERR_101: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// An order with this ID already exists in the book.
    #[error("GM_ERR_102: Order already exists: {0}")]
    DuplicateOrder(OrderId),

    // =================================================================
    // Settlement Epoch Errors (4xx)
    // =================================================================
    /// The sorting request is malformed (empty group, ...).
    #[error("GM_ERR_400: Invalid epoch request: {reason}")]
    InvalidEpoch { reason: String },

    /// A result for this epoch key is already committed.
    #[error("GM_ERR_401: Epoch already committed: {0}")]
    EpochAlreadyCommitted(EpochKey),

    /// Every participant of the epoch was excluded; nothing to commit.
    #[error("GM_ERR_402: No participant metrics available for {0}")]
    NoMetrics(EpochKey),

    // =================================================================
    // Matching Errors (5xx)
    // =================================================================
    /// The matching pass could not be completed.
    #[error("GM_ERR_500: Matching failed: {reason}")]
    MatchingFailed { reason: String },

    /// A conservation or append-only invariant would be broken.
    #[error("GM_ERR_501: Invariant violation: {reason}")]
    InvariantViolation { reason: String },

    /// A match with this ID was already recorded.
    #[error("GM_ERR_502: Duplicate match: {0}")]
    DuplicateMatch(MatchId),

    // =================================================================
    // Settlement Submission Errors (6xx)
    // =================================================================
    /// The ledger commit did not land after exhausting all attempts.
    #[error("GM_ERR_600: Submission failed for {key} after {attempts} attempts: {reason}")]
    SubmissionFailed {
        key: EpochKey,
        attempts: u32,
        reason: String,
    },

    /// Reading a participant metric from the ledger failed.
    #[error("GM_ERR_601: Metric fetch failed for {participant}: {reason}")]
    MetricFetchFailed {
        participant: ParticipantId,
        reason: String,
    },

    // =================================================================
    // Ledger / Blob Errors (7xx)
    // =================================================================
    /// A ledger call exceeded its per-attempt timeout.
    #[error("GM_ERR_700: Ledger timeout during {operation}")]
    LedgerTimeout { operation: String },

    /// The ledger could not be reached.
    #[error("GM_ERR_701: Ledger network error: {reason}")]
    LedgerNetwork { reason: String },

    /// The ledger executed and rejected the transaction.
    #[error("GM_ERR_702: Ledger transaction reverted: {reason}")]
    LedgerReverted { reason: String },

    /// Cost estimation failed before sending.
    #[error("GM_ERR_703: Cost estimation failed: {reason}")]
    EstimationFailed { reason: String },

    /// The content-addressed blob store rejected or lost a payload.
    #[error("GM_ERR_704: Blob store error: {reason}")]
    BlobStore { reason: String },

    /// A ledger view returned a value that does not decode.
    #[error("GM_ERR_706: Malformed ledger response from {view}: {reason}")]
    LedgerDecode { view: String, reason: String },

    /// The ledger event subscription can only be taken once.
    #[error("GM_ERR_705: Event subscription already consumed: {0}")]
    SubscriptionConsumed(String),

    // =================================================================
    // Storage / General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("GM_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("GM_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("GM_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// Storage I/O error; the failed write was not applied.
    #[error("GM_ERR_903: Storage error: {0}")]
    Storage(String),

    /// Persisted state is inconsistent.
    #[error("GM_ERR_904: Storage corrupted: {0}")]
    StorageCorrupted(String),
}

impl GridmatchError {
    /// Map this error onto the handling taxonomy.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::OrderNotFound(_)
            | Self::InvalidOrder { .. }
            | Self::InvalidEpoch { .. }
            | Self::Serialization(_) => ErrorClass::InvalidInput,

            Self::DuplicateOrder(_) | Self::EpochAlreadyCommitted(_) | Self::DuplicateMatch(_) => {
                ErrorClass::Conflict
            }

            Self::NoMetrics(_)
            | Self::MatchingFailed { .. }
            | Self::MetricFetchFailed { .. }
            | Self::SubmissionFailed { .. }
            | Self::LedgerTimeout { .. }
            | Self::LedgerNetwork { .. }
            | Self::EstimationFailed { .. }
            | Self::BlobStore { .. }
            | Self::Storage(_) => ErrorClass::Transient,

            Self::InvariantViolation { .. }
            | Self::LedgerReverted { .. }
            | Self::LedgerDecode { .. }
            | Self::SubscriptionConsumed(_)
            | Self::Internal(_)
            | Self::Configuration(_)
            | Self::StorageCorrupted(_) => ErrorClass::Fatal,
        }
    }

    /// Whether a bounded retry may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, GridmatchError>;

impl From<std::io::Error> for GridmatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for GridmatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
