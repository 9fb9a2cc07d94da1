//! # gridmatch-matchcore
//!
//! **Continuous double-auction matching engine for GridMatch.**
//!
//! MatchCore keeps one order book per market and runs a matching pass on
//! every accepted submission:
//!
//! - **Price-time priority**: best price first, earliest sequence first
//! - **Resting-price clearing**: the order already in the book sets the price
//! - **Atomic passes**: a pass is persisted before the book changes
//! - **Market sharding**: each market has its own writer lock
//! - **Replayable**: the same arrival sequence yields the same matches

pub mod clearing;
pub mod determinism;
pub mod engine;
pub mod matcher;
pub mod orderbook;
pub mod price_level;
pub mod store;

pub use clearing::{Clearing, resting_price};
pub use determinism::{compute_match_root, verify_match_root};
pub use engine::{MatchingEngine, OrderHandle};
pub use matcher::{PassPlan, plan_pass};
pub use orderbook::{BookSnapshot, LevelSummary, OrderBook};
pub use price_level::PriceLevel;
pub use store::{InMemoryOrderStore, OrderStore, PassCommit};
