//! The continuous limit order book: two price-indexed, time-ordered
//! ladders. Pure data structure — every operation returns a new value or
//! an owned extraction, so [`crate::matcher`] and [`crate::core`] can stay
//! deterministic and replay-safe.

use crate::order::{LimitOrder, Order, Side};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

/// Resting orders at a single price, oldest first.
pub type Level = VecDeque<LimitOrder>;

/// The order book for one trading pair.
///
/// Invariants (spec.md §3):
/// - no empty `Level` is ever retained (a level drops out with its last order)
/// - no order id appears twice
/// - best bid < best ask whenever the book is observed from outside a match
///   (matching always runs to completion before control returns to a reader)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Book {
    /// Price -> level. Iterated in descending price order via `.rev()`.
    bids: BTreeMap<u64, Level>,
    /// Price -> level. Iterated in ascending price order.
    asks: BTreeMap<u64, Level>,
    /// The aggressor order of the most recent execution, if any.
    pub last_trade: Option<Order>,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    fn side_map(&self, side: Side) -> &BTreeMap<u64, Level> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_map_mut(&mut self, side: Side) -> &mut BTreeMap<u64, Level> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Insert `lo` at the tail of its price level on its side.
    pub fn add(&mut self, lo: LimitOrder) {
        let side = lo.side();
        let price = lo.price();
        self.side_map_mut(side)
            .entry(price)
            .or_insert_with(VecDeque::new)
            .push_back(lo);
    }

    /// Remove an order by id, searching both sides. `None` if absent.
    pub fn remove_by_id(&mut self, id: Uuid) -> Option<LimitOrder> {
        for side in [Side::Buy, Side::Sell] {
            if let Some(removed) = Self::remove_from_side(self.side_map_mut(side), id) {
                return Some(removed);
            }
        }
        None
    }

    fn remove_from_side(levels: &mut BTreeMap<u64, Level>, id: Uuid) -> Option<LimitOrder> {
        let mut empty_price = None;
        let mut found = None;
        for (price, level) in levels.iter_mut() {
            if let Some(pos) = level.iter().position(|o| o.id() == id) {
                found = level.remove(pos);
                if level.is_empty() {
                    empty_price = Some(*price);
                }
                break;
            }
        }
        if let Some(price) = empty_price {
            levels.remove(&price);
        }
        found
    }

    /// Best counter order for an incoming order of `side`: the lowest ask
    /// for an incoming Buy, the highest bid for an incoming Sell.
    pub fn best_counter(&self, side: Side) -> Option<(u64, &LimitOrder)> {
        let counter_side = side.opposite();
        let levels = self.side_map(counter_side);
        let (price, level) = match counter_side {
            Side::Sell => levels.iter().next(),     // lowest ask
            Side::Buy => levels.iter().next_back(), // highest bid
        }?;
        level.front().map(|lo| (*price, lo))
    }

    /// Replace the head of the level at `price` on `side` with `new_lo`
    /// (used when a counter partially fills and must keep its queue
    /// position). If `new_lo.remaining_amount == 0` the head is removed
    /// instead, dropping the level if it becomes empty.
    pub fn replace_head(&mut self, side: Side, price: u64, new_lo: LimitOrder) {
        let levels = self.side_map_mut(side);
        if let Some(level) = levels.get_mut(&price) {
            level.pop_front();
            if new_lo.remaining_amount > 0 {
                level.push_front(new_lo);
            }
            if level.is_empty() {
                levels.remove(&price);
            }
        }
    }

    pub fn has_order(&self, id: Uuid) -> bool {
        self.bids
            .values()
            .chain(self.asks.values())
            .any(|level| level.iter().any(|o| o.id() == id))
    }

    pub fn get_order(&self, id: Uuid) -> Option<&LimitOrder> {
        self.bids
            .values()
            .chain(self.asks.values())
            .find_map(|level| level.iter().find(|o| o.id() == id))
    }

    pub fn best_bid(&self) -> Option<u64> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<u64> {
        self.asks.keys().next().copied()
    }

    pub fn spread(&self) -> Option<u64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if ask >= bid => Some(ask - bid),
            _ => None,
        }
    }

    /// No crossing at rest: either one side is empty, or `best_bid < best_ask`.
    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(b), Some(a)) if b >= a)
    }

    /// Bids, descending by price, one `(price, total_remaining)` per level.
    pub fn bid_levels(&self) -> Vec<(u64, u64)> {
        self.bids
            .iter()
            .rev()
            .map(|(p, l)| (*p, l.iter().map(|o| o.remaining_amount).sum()))
            .collect()
    }

    /// Asks, ascending by price, one `(price, total_remaining)` per level.
    pub fn ask_levels(&self) -> Vec<(u64, u64)> {
        self.asks
            .iter()
            .map(|(p, l)| (*p, l.iter().map(|o| o.remaining_amount).sum()))
            .collect()
    }

    pub fn bid_depth(&self) -> u64 {
        self.bids.values().flat_map(|l| l.iter()).map(|o| o.remaining_amount).sum()
    }

    pub fn ask_depth(&self) -> u64 {
        self.asks.values().flat_map(|l| l.iter()).map(|o| o.remaining_amount).sum()
    }

    /// All resting orders, both sides, in no particular cross-level order
    /// (used by `Cleanup` and by recovery's order-history replay).
    pub fn all_orders(&self) -> impl Iterator<Item = &LimitOrder> {
        self.bids.values().chain(self.asks.values()).flat_map(|l| l.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::{AssetId, AssetPair};

    fn order(side: Side, price: u64, amount: u64) -> LimitOrder {
        LimitOrder::new(Order {
            id: Uuid::new_v4(),
            sender_pubkey: [0u8; 32],
            pair: AssetPair::new(AssetId::Native, AssetId::Native),
            side,
            amount,
            price,
            timestamp: 0,
            expiration: 1_000_000,
            matcher_fee: 1,
            version: 1,
            signature: vec![],
        })
    }

    #[test]
    fn add_and_best_counter() {
        let mut book = Book::new();
        book.add(order(Side::Sell, 100, 10));
        book.add(order(Side::Sell, 99, 5));
        let (price, lo) = book.best_counter(Side::Buy).unwrap();
        assert_eq!(price, 99);
        assert_eq!(lo.remaining_amount, 5);
    }

    #[test]
    fn fifo_within_level() {
        let mut book = Book::new();
        let first = order(Side::Buy, 100, 1);
        let first_id = first.id();
        book.add(first);
        book.add(order(Side::Buy, 100, 1));
        let (_, head) = book.best_counter(Side::Sell).unwrap();
        assert_eq!(head.id(), first_id);
    }

    #[test]
    fn remove_drops_empty_level() {
        let mut book = Book::new();
        let lo = order(Side::Buy, 100, 1);
        let id = lo.id();
        book.add(lo);
        assert!(book.best_bid().is_some());
        let removed = book.remove_by_id(id).unwrap();
        assert_eq!(removed.id(), id);
        assert!(book.best_bid().is_none());
    }

    #[test]
    fn replace_head_keeps_queue_position_until_exhausted() {
        let mut book = Book::new();
        let lo = order(Side::Sell, 100, 10);
        book.add(lo.clone());
        book.add(order(Side::Sell, 100, 5));

        let partially_filled = lo.filled_by(4);
        book.replace_head(Side::Sell, 100, partially_filled.clone());
        let (_, head) = book.best_counter(Side::Buy).unwrap();
        assert_eq!(head.remaining_amount, 6);

        let exhausted = partially_filled.filled_by(6);
        book.replace_head(Side::Sell, 100, exhausted);
        let (_, head) = book.best_counter(Side::Buy).unwrap();
        assert_eq!(head.remaining_amount, 5);
    }

    #[test]
    fn no_crossing_detection() {
        let mut book = Book::new();
        book.add(order(Side::Buy, 99, 1));
        book.add(order(Side::Sell, 100, 1));
        assert!(!book.is_crossed());
        book.add(order(Side::Buy, 101, 1));
        assert!(book.is_crossed());
    }
}
