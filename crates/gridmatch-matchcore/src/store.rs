//! Order and match persistence.
//!
//! [`OrderStore`] is the durable record of orders and matches. The engine
//! writes through [`OrderStore::commit_pass`], which applies every order
//! upsert and match append of one pass atomically: either all of it lands
//! or none of it does.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use gridmatch_types::{GridmatchError, Match, MatchId, MarketId, Order, OrderId, Result};
use parking_lot::RwLock;

/// The writes of one matching pass (or one cancellation).
#[derive(Debug, Clone, Default)]
pub struct PassCommit {
    /// Orders in their new state; inserted or overwritten by id.
    pub orders: Vec<Order>,
    /// New matches, appended in order.
    pub matches: Vec<Match>,
}

impl PassCommit {
    /// Check the write before it is applied.
    ///
    /// # Errors
    /// [`GridmatchError::InvariantViolation`] for an order matched beyond
    /// its amount or a match id repeated within the commit.
    pub fn check(&self) -> Result<()> {
        for order in &self.orders {
            if order.remaining > order.amount {
                return Err(GridmatchError::InvariantViolation {
                    reason: format!(
                        "order {} remaining {} exceeds amount {}",
                        order.id, order.remaining, order.amount
                    ),
                });
            }
        }
        let mut seen = HashSet::with_capacity(self.matches.len());
        for m in &self.matches {
            if !seen.insert(m.id) {
                return Err(GridmatchError::DuplicateMatch(m.id));
            }
        }
        Ok(())
    }
}

/// Durable order/match storage.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Atomically upsert `commit.orders` and append `commit.matches`.
    async fn commit_pass(&self, commit: PassCommit) -> Result<()>;

    async fn order(&self, id: &OrderId) -> Result<Option<Order>>;

    /// All orders of a market, in sequence order.
    async fn orders(&self, market: &MarketId) -> Result<Vec<Order>>;

    /// All matches of a market, in sequence order.
    async fn matches(&self, market: &MarketId) -> Result<Vec<Match>>;

    /// Markets with at least one order.
    async fn markets(&self) -> Result<Vec<MarketId>>;
}

#[derive(Debug, Default)]
struct StoreInner {
    orders: HashMap<OrderId, Order>,
    matches: BTreeMap<MarketId, Vec<Match>>,
    match_ids: HashSet<MatchId>,
}

/// In-process [`OrderStore`].
///
/// `fail_next_commits` makes the next N commits fail with a storage error
/// without applying anything.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    inner: RwLock<StoreInner>,
    fail_commits: AtomicU32,
}

impl InMemoryOrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls to `commit_pass`.
    pub fn fail_next_commits(&self, n: u32) {
        self.fail_commits.store(n, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.fail_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn commit_pass(&self, commit: PassCommit) -> Result<()> {
        if self.take_failure() {
            return Err(GridmatchError::Storage("injected commit failure".into()));
        }
        commit.check()?;

        let mut inner = self.inner.write();
        if let Some(dup) = commit.matches.iter().find(|m| inner.match_ids.contains(&m.id)) {
            return Err(GridmatchError::DuplicateMatch(dup.id));
        }
        for order in commit.orders {
            inner.orders.insert(order.id, order);
        }
        for m in commit.matches {
            inner.match_ids.insert(m.id);
            inner.matches.entry(m.market.clone()).or_default().push(m);
        }
        Ok(())
    }

    async fn order(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.inner.read().orders.get(id).cloned())
    }

    async fn orders(&self, market: &MarketId) -> Result<Vec<Order>> {
        let inner = self.inner.read();
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.market == *market)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.sequence);
        Ok(orders)
    }

    async fn matches(&self, market: &MarketId) -> Result<Vec<Match>> {
        Ok(self
            .inner
            .read()
            .matches
            .get(market)
            .cloned()
            .unwrap_or_default())
    }

    async fn markets(&self) -> Result<Vec<MarketId>> {
        let inner = self.inner.read();
        let markets: std::collections::BTreeSet<MarketId> =
            inner.orders.values().map(|o| o.market.clone()).collect();
        Ok(markets.into_iter().collect())
    }
}
