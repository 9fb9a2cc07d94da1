//! # gridmatch-types
//!
//! Shared types, errors, and configuration for **GridMatch**.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`MatchId`], [`ParticipantId`], [`MarketId`], [`GroupId`]
//! - **Order model**: [`Order`], [`OrderRequest`], [`OrderSide`], [`OrderStatus`]
//! - **Match model**: [`Match`]
//! - **Settlement model**: [`EpochKey`], [`SortRole`], [`SortingRequest`], [`SortedResult`],
//!   [`ParticipantMetric`], [`MeterReading`], [`ContentDigest`]
//! - **Feed events**: [`FeedEvent`] and the [`EventPublisher`] seam
//! - **Ledger receipts**: [`TxReceipt`], [`CommitReceipt`]
//! - **Configuration**: [`NodeConfig`], [`SettlementConfig`], [`RetryConfig`], [`BroadcastConfig`]
//! - **Errors**: [`GridmatchError`] with `GM_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod config;
pub mod constants;
pub mod epoch;
pub mod error;
pub mod event;
pub mod ids;
pub mod order;
pub mod receipt;
pub mod trade;

// Re-export all primary types at crate root for ergonomic imports:
//   use gridmatch_types::{Order, OrderSide, Match, EpochKey, ...};

pub use config::*;
pub use epoch::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use order::*;
pub use receipt::*;
pub use trade::*;

// Constants are accessed via `gridmatch_types::constants::FOO`
// (not re-exported to avoid name collisions).
