//! # gridmatch-settlement
//!
//! **Finality Plane**: turns the ledger's "sorting needed" signals into
//! exactly one committed sorted participant list per epoch key.
//!
//! ## Architecture
//!
//! A [`SortingCoordinator`] consumes the ledger's event stream and, per
//! epoch key:
//! 1. Checks the [`SortedResultStore`] (duplicate signals are no-ops)
//! 2. Fetches participant metrics through the [`LedgerGateway`]
//! 3. Sorts ascending, ties by participant id
//! 4. Commits through the [`BatchSubmitter`] (serialized per key,
//!    existence-checked before every attempt, bounded retries)
//! 5. Stores the [`SortedResult`](gridmatch_types::SortedResult) and
//!    broadcasts it
//!
//! The [`RoundClock`] advances the ledger's hour, which is what makes the
//! ledger emit those signals. [`InMemoryLedger`] and [`InMemoryBlobStore`]
//! are in-process stand-ins for the external ledger and blob store.

pub mod blob;
pub mod clock;
pub mod coordinator;
pub mod idempotency;
pub mod ledger;
pub mod locks;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod submitter;

pub use blob::{BlobStore, InMemoryBlobStore};
pub use clock::{RoundClock, round_at, until_next_hour};
pub use coordinator::{Control, SortOutcome, SortingCoordinator};
pub use idempotency::{InMemorySortedResultStore, InsertOutcome, SortedResultStore};
pub use ledger::{
    CommittedSort, LedgerGateway, LedgerTransaction, LedgerViews, SortedCommitArgs, key_args,
};
pub use locks::{KeyGuard, KeyedLocks};
pub use memory::InMemoryLedger;
pub use metrics::{FetchOutcome, MetricFetcher, sort_by_metric};
pub use retry::RetryPolicy;
pub use submitter::BatchSubmitter;
