//! Sorted-result store: the durable idempotency record for settlement.
//!
//! At most one [`SortedResult`] exists per [`EpochKey`]. Writes go through
//! [`SortedResultStore::insert_if_absent`], a conditional insert that never
//! overwrites: a second write for the same key gets the existing result
//! back instead.

use std::collections::BTreeMap;

use async_trait::async_trait;
use gridmatch_types::{EpochKey, Result, SortedResult};
use parking_lot::RwLock;

/// Outcome of a conditional insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The key was already committed; carries the stored result.
    AlreadyPresent(SortedResult),
}

#[async_trait]
pub trait SortedResultStore: Send + Sync {
    async fn get(&self, key: &EpochKey) -> Result<Option<SortedResult>>;

    /// Store `result` unless its key already has one. Atomic check-then-write.
    async fn insert_if_absent(&self, result: SortedResult) -> Result<InsertOutcome>;

    /// Every stored result, in key order.
    async fn all(&self) -> Result<Vec<SortedResult>>;
}

/// In-process [`SortedResultStore`].
#[derive(Debug, Default)]
pub struct InMemorySortedResultStore {
    results: RwLock<BTreeMap<EpochKey, SortedResult>>,
}

impl InMemorySortedResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.results.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.read().is_empty()
    }
}

#[async_trait]
impl SortedResultStore for InMemorySortedResultStore {
    async fn get(&self, key: &EpochKey) -> Result<Option<SortedResult>> {
        Ok(self.results.read().get(key).cloned())
    }

    async fn insert_if_absent(&self, result: SortedResult) -> Result<InsertOutcome> {
        let mut results = self.results.write();
        if let Some(existing) = results.get(&result.key) {
            return Ok(InsertOutcome::AlreadyPresent(existing.clone()));
        }
        results.insert(result.key, result);
        Ok(InsertOutcome::Inserted)
    }

    async fn all(&self) -> Result<Vec<SortedResult>> {
        Ok(self.results.read().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use gridmatch_types::{GroupId, ParticipantId, SortRole};

    use super::*;

    fn result(round: u64, role: SortRole, first: &str) -> SortedResult {
        SortedResult {
            key: EpochKey::new(round, GroupId(1), role),
            ordered: vec![ParticipantId::new(first)],
            excluded: vec![],
            content_digest: None,
            tx_hash: format!("0x{round:x}"),
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn first_insert_wins() {
        let store = InMemorySortedResultStore::new();
        let first = result(5, SortRole::Seller, "0xa");
        assert_eq!(
            store.insert_if_absent(first.clone()).await.unwrap(),
            InsertOutcome::Inserted
        );

        let second = result(5, SortRole::Seller, "0xb");
        match store.insert_if_absent(second).await.unwrap() {
            InsertOutcome::AlreadyPresent(existing) => assert_eq!(existing, first),
            InsertOutcome::Inserted => panic!("second insert must not overwrite"),
        }
        assert_eq!(store.get(&first.key).await.unwrap(), Some(first));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn keys_differ_by_role_and_round() {
        let store = InMemorySortedResultStore::new();
        store.insert_if_absent(result(5, SortRole::Seller, "0xa")).await.unwrap();
        store.insert_if_absent(result(5, SortRole::Buyer, "0xa")).await.unwrap();
        store.insert_if_absent(result(6, SortRole::Seller, "0xa")).await.unwrap();

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].key < w[1].key));
    }

    #[tokio::test]
    async fn empty_store() {
        let store = InMemorySortedResultStore::new();
        assert!(store.is_empty());
        let key = EpochKey::new(0, GroupId(0), SortRole::Buyer);
        assert!(store.get(&key).await.unwrap().is_none());
    }
}
