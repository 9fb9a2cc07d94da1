//! # gridmatch-ingress
//!
//! **Edge plane**: everything a participant talks to.
//!
//! - [`BroadcastHub`]: non-blocking fan-out of matches and sorted results
//!   to websocket subscribers
//! - [`api::router`]: the HTTP trade ingestion API and subscriber channel
//! - [`node`]: configuration, logging and signal handling for the
//!   `gridmatch-node` binary

pub mod api;
pub mod hub;
pub mod node;

pub use api::{ApiError, AppState, router};
pub use hub::{BroadcastHub, Subscription};
