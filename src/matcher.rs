//! The pure matching step: given a book and an incoming order, decide
//! whether it rests or executes against the best counter order.
//!
//! `match_one` takes a single step. The driver ([`crate::core`]) is
//! responsible for re-invoking it until no further `Execute` is produced —
//! see spec.md §4.2/§4.3.

use crate::book::Book;
use crate::event::ExecutedEvent;
use crate::order::{LimitOrder, Side};

/// Hard cap on match-loop iterations for a single `Place`. Spec.md §9:
/// "assert a hard upper bound... to fail fast on pathological inputs."
/// A single step can consume at most one resting order, so this bounds
/// well above any realistic book depth without being reachable in normal
/// operation.
pub const MAX_MATCH_ITERATIONS: usize = 100_000;

/// The result of one matching step.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// No crossing counter order exists (or book side is empty): the
    /// submitted order should be added to the book as-is.
    Add,
    /// A trade occurred. The driver must apply the event, decide whether
    /// the counter's remainder is still valid, and if the submitted's
    /// remainder is nonzero and valid, re-invoke `match_one` with it.
    Execute(ExecutedEvent),
}

/// One matching step for `submitted` against `book`. Pure: does not
/// mutate `book`. Side is read from `submitted.order.side`.
pub fn match_one(book: &Book, submitted: &LimitOrder) -> MatchOutcome {
    let side = submitted.side();
    let Some((counter_price, counter)) = book.best_counter(side) else {
        return MatchOutcome::Add;
    };

    let crosses = match side {
        Side::Buy => submitted.price() >= counter_price,
        Side::Sell => submitted.price() <= counter_price,
    };
    if !crosses {
        return MatchOutcome::Add;
    }

    let trade_amount = submitted.remaining_amount.min(counter.remaining_amount);
    let trade_price = counter_price;

    let submitted_after = submitted.filled_by(trade_amount);
    let counter_after = counter.filled_by(trade_amount);

    MatchOutcome::Execute(ExecutedEvent {
        submitted: submitted.clone(),
        counter: counter.clone(),
        submitted_remaining_amount: submitted_after.remaining_amount,
        submitted_remaining_fee: submitted_after.remaining_fee,
        counter_remaining_amount: counter_after.remaining_amount,
        counter_remaining_fee: counter_after.remaining_fee,
        trade_amount,
        trade_price,
    })
}
