//! System-wide constants for GridMatch.

/// Default instrument when a submission names none.
pub const DEFAULT_MARKET: &str = "ENERGY/KWH";

/// Default API listen port.
pub const DEFAULT_API_PORT: u16 = 8080;

/// Bounded queue depth per broadcast subscriber. A subscriber that falls
/// this far behind is dropped.
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 256;

/// Maximum concurrent participant metric reads per epoch.
pub const DEFAULT_METRIC_FETCH_CONCURRENCY: usize = 8;

/// Attempts per participant metric read before the participant is excluded.
pub const DEFAULT_METRIC_FETCH_ATTEMPTS: u32 = 3;

/// Backoff before the first metric read retry, in milliseconds.
pub const DEFAULT_METRIC_FETCH_BACKOFF_MS: u64 = 200;

/// First hour (inclusive) of the buyer consumption window.
pub const DEFAULT_BUYER_WINDOW_START_HOUR: u32 = 19;

/// Last hour (inclusive) of the buyer consumption window.
pub const DEFAULT_BUYER_WINDOW_END_HOUR: u32 = 22;

/// Hours in one settlement day.
pub const HOURS_PER_DAY: u64 = 24;

/// Staged readings for rounds this far behind the latest seller commit
/// are dropped unless that round is still pending.
pub const STAGED_READINGS_RETENTION_ROUNDS: u64 = 24;

/// Bounded commit attempts before `SubmissionFailed`.
pub const DEFAULT_COMMIT_ATTEMPTS: u32 = 5;

/// Initial commit retry backoff in milliseconds (doubles per attempt).
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;

/// Backoff ceiling in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// Per-attempt ledger call timeout in milliseconds.
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 30_000;

/// Serialized payloads above this many bytes are externalized to the
/// content-addressed blob store.
pub const DEFAULT_INLINE_PAYLOAD_LIMIT: usize = 4_096;

/// Interval of the coordinator's retry pass over uncommitted epochs.
pub const DEFAULT_RETRY_PASS_INTERVAL_MS: u64 = 60_000;

/// Ledger method committing a sorted participant list.
pub const COMMIT_SORTED_METHOD: &str = "submitSortedAddresses";

/// Ledger view returning the committed sort for an epoch key, if any.
pub const SORTED_RESULT_VIEW: &str = "sortedResult";

/// Ledger view returning a participant's selling price for an hour.
pub const SELLING_PRICE_VIEW: &str = "sellingPrice";

/// Ledger view returning a participant's consumption for an hour.
pub const CONSUMPTION_VIEW: &str = "consumption";

/// Ledger method advancing the on-chain hour.
pub const UPDATE_HOUR_METHOD: &str = "updateHour";

/// Ledger event signalling that a group needs sorting.
pub const SORTING_NEEDED_EVENT: &str = "NeedSorting";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "GridMatch";
