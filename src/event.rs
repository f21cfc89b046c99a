//! Domain events: the journaled ADT of spec.md §3, plus the snapshot
//! envelope.

use crate::book::Book;
use crate::order::LimitOrder;
use serde::{Deserialize, Serialize};

/// Payload of an `OrderExecuted` event: a single trade between `submitted`
/// (the taker at the moment of this step) and `counter` (the resting
/// maker), at the maker's price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedEvent {
    pub submitted: LimitOrder,
    pub counter: LimitOrder,
    pub submitted_remaining_amount: u64,
    pub submitted_remaining_fee: u64,
    pub counter_remaining_amount: u64,
    pub counter_remaining_fee: u64,
    pub trade_amount: u64,
    pub trade_price: u64,
}

/// A domain event. Field ordering within each variant follows declaration
/// order here, which is also journal wire-format order (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderAdded {
        order: LimitOrder,
    },
    OrderExecuted(ExecutedEvent),
    OrderCanceled {
        order: LimitOrder,
        /// `true` = auto-cancelled (expiry/dust/invalid); `false` =
        /// user-initiated or admin cleanup.
        unmatchable: bool,
    },
}

impl Event {
    /// Deterministically apply this event to `book`, mutating it in place.
    /// Must be pure and must produce an identical book given an identical
    /// event sequence — this is the replay contract (spec.md §4.3).
    pub fn apply(&self, book: &mut Book) {
        match self {
            Event::OrderAdded { order } => {
                book.add(order.clone());
            }
            Event::OrderExecuted(exec) => {
                let side = exec.submitted.side();
                let counter_side = side.opposite();
                let price = exec.counter.price();

                let submitted_after = exec.submitted.filled_by(
                    exec.submitted.remaining_amount - exec.submitted_remaining_amount,
                );
                let counter_after = exec
                    .counter
                    .filled_by(exec.counter.remaining_amount - exec.counter_remaining_amount);

                book.replace_head(counter_side, price, counter_after);

                if exec.submitted_remaining_amount > 0 {
                    // The submitted side is not part of the book yet (it's
                    // the in-flight taker); nothing to do here — the
                    // driver decides whether to re-submit it or add it.
                }

                book.last_trade = Some(submitted_after.order.clone());
            }
            Event::OrderCanceled { order, .. } => {
                book.remove_by_id(order.id());
            }
        }
    }
}

/// A persisted snapshot of the book at a given journal sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub book: Book,
    pub sequence: u64,
}
