//! A single price level in the order book.
//!
//! Orders at the same price are stored in arrival order (time priority)
//! using a [`VecDeque`].

use std::collections::VecDeque;

use gridmatch_types::{Order, OrderId};

/// A single price level containing all resting orders at that price.
///
/// The front of the deque has the lowest sequence and is filled first.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: u64,
    pub orders: VecDeque<Order>,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: u64) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
        }
    }

    /// Add an order to the back of this level (lowest time priority).
    pub fn push_back(&mut self, order: Order) {
        self.orders.push_back(order);
    }

    /// Remove and return the front (oldest) order.
    pub fn pop_front(&mut self) -> Option<Order> {
        self.orders.pop_front()
    }

    #[must_use]
    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    /// Mutable access to an order at this level.
    pub fn get_mut(&mut self, order_id: &OrderId) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.id == *order_id)
    }

    /// Total remaining amount across all orders at this level.
    #[must_use]
    pub fn total_remaining(&self) -> u64 {
        self.orders.iter().map(|o| o.remaining).sum()
    }

    /// Remove a specific order by ID.
    pub fn remove_order(&mut self, order_id: &OrderId) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.id == *order_id)?;
        self.orders.remove(pos)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }
}

#[cfg(test)]
mod tests {
    use gridmatch_types::*;

    use super::*;

    #[test]
    fn push_pop_fifo() {
        let mut level = PriceLevel::new(50);
        let o1 = Order::dummy_limit(OrderSide::Buy, 50, 1, 0);
        let o2 = Order::dummy_limit(OrderSide::Buy, 50, 1, 1);
        let id1 = o1.id;

        level.push_back(o1);
        level.push_back(o2);

        assert_eq!(level.len(), 2);
        assert_eq!(level.front().unwrap().id, id1);
        let popped = level.pop_front().unwrap();
        assert_eq!(popped.id, id1, "first in should be first out");
        assert_eq!(level.len(), 1);
    }

    #[test]
    fn total_remaining() {
        let mut level = PriceLevel::new(50);
        level.push_back(Order::dummy_limit(OrderSide::Sell, 50, 5, 0));
        level.push_back(Order::dummy_limit(OrderSide::Sell, 50, 3, 1));
        assert_eq!(level.total_remaining(), 8);
    }

    #[test]
    fn remove_order_by_id() {
        let mut level = PriceLevel::new(50);
        let o1 = Order::dummy_limit(OrderSide::Buy, 50, 1, 0);
        let o2 = Order::dummy_limit(OrderSide::Buy, 50, 1, 1);
        let target = o2.id;
        level.push_back(o1);
        level.push_back(o2);

        assert_eq!(level.remove_order(&target).unwrap().id, target);
        assert_eq!(level.len(), 1);
        assert!(level.remove_order(&OrderId::new()).is_none());
    }

    #[test]
    fn empty_level() {
        let level = PriceLevel::new(50);
        assert!(level.is_empty());
        assert_eq!(level.total_remaining(), 0);
        assert!(level.front().is_none());
    }
}
