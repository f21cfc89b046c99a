//! Order envelopes and resting order state.

use crate::pair::AssetPair;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "Buy"),
            Side::Sell => write!(f, "Sell"),
        }
    }
}

/// An immutable order envelope, as received (and already signature-checked)
/// by the core. The core only re-validates `expiration` and economic
/// validity of remainders; it trusts everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub sender_pubkey: [u8; 32],
    pub pair: AssetPair,
    pub side: Side,
    pub amount: u64,
    pub price: u64,
    pub timestamp: u64,
    pub expiration: u64,
    pub matcher_fee: u64,
    pub version: u8,
    pub signature: Vec<u8>,
}

/// Resting order state: the immutable envelope plus how much of it is
/// still unfilled.
///
/// Invariants (spec.md §3):
/// - `0 < remaining_amount <= order.amount`
/// - `remaining_fee == ceil(order.matcher_fee * remaining_amount / order.amount)`,
///   except that a fill driving `remaining_amount` to zero always leaves
///   `remaining_fee == 0` — see [`LimitOrder::fee_after_fill`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub order: Order,
    pub remaining_amount: u64,
    pub remaining_fee: u64,
}

impl LimitOrder {
    /// A fresh resting order: fully unfilled.
    pub fn new(order: Order) -> Self {
        let remaining_amount = order.amount;
        let remaining_fee = order.matcher_fee;
        Self {
            order,
            remaining_amount,
            remaining_fee,
        }
    }

    /// `remaining_amount > 0 && order.expiration > now`.
    pub fn is_valid(&self, now: u64) -> bool {
        self.remaining_amount > 0 && self.order.expiration > now
    }

    /// Ceil-rounded fee owed for a given remaining amount, computed fresh
    /// from the order's original totals (used only to *check* the
    /// invariant in tests; the authoritative update path is
    /// [`LimitOrder::fee_after_fill`], which avoids independent rounding
    /// drift across successive partial fills).
    pub fn ceil_fee_for(order: &Order, remaining_amount: u64) -> u64 {
        if order.amount == 0 {
            return 0;
        }
        let num = order.matcher_fee as u128 * remaining_amount as u128;
        let denom = order.amount as u128;
        ((num + denom - 1) / denom) as u64
    }

    /// Fee remaining after reducing `remaining_amount` by `filled`.
    ///
    /// Uses the ceil formula for every partial fill, except that a fill
    /// which exhausts the order forces the remaining fee to exactly zero.
    /// Because the previous `remaining_fee` is carried forward rather than
    /// recomputed from scratch, `old_remaining_fee - new_remaining_fee`
    /// telescopes across the order's whole lifetime to exactly
    /// `order.matcher_fee`, with no separate "already paid" bookkeeping.
    pub fn fee_after_fill(&self, new_remaining_amount: u64) -> u64 {
        if new_remaining_amount == 0 {
            0
        } else {
            Self::ceil_fee_for(&self.order, new_remaining_amount)
        }
    }

    /// Apply a fill of `filled` units, returning the new remaining state.
    /// Panics if `filled > remaining_amount` (a matcher bug, never a data
    /// condition — callers must clamp to `remaining_amount` beforehand).
    pub fn filled_by(&self, filled: u64) -> LimitOrder {
        assert!(
            filled <= self.remaining_amount,
            "fill exceeds remaining amount"
        );
        let new_remaining_amount = self.remaining_amount - filled;
        let new_remaining_fee = self.fee_after_fill(new_remaining_amount);
        LimitOrder {
            order: self.order.clone(),
            remaining_amount: new_remaining_amount,
            remaining_fee: new_remaining_fee,
        }
    }

    pub fn id(&self) -> Uuid {
        self.order.id
    }

    pub fn side(&self) -> Side {
        self.order.side
    }

    pub fn price(&self) -> u64 {
        self.order.price
    }
}
