//! External collaborator traits (spec.md §6): transaction construction,
//! the unconfirmed-tx pool, the broadcast channel group, and the event
//! bus. The core only ever talks to these through the trait boundary —
//! production implementations (chain-specific tx building, the real UTX,
//! the real p2p layer) live outside this crate's scope.
//!
//! Each trait also ships an in-memory double here, usable both by this
//! crate's own tests and by embedders wiring up a minimal end-to-end setup
//! before the real collaborators exist.

use crate::event::{Event, ExecutedEvent, Snapshot};
use crate::error::TxError;
use crate::pair::AssetPair;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

/// A constructed exchange transaction for a single execution, ready for
/// signing and broadcast. Deliberately minimal — the real shape is chain
/// specific and out of this crate's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx {
    pub id: Uuid,
    pub buy_order_id: Uuid,
    pub sell_order_id: Uuid,
    pub trade_amount: u64,
    pub trade_price: u64,
}

/// Builds a candidate transaction from an execution. Must be pure with
/// respect to book state (spec.md §6) — it may fail (and frequently will,
/// in practice, on balance/validation grounds) but never mutates anything.
pub trait TxBuilder: Send + Sync {
    fn build(&self, executed: &ExecutedEvent) -> Result<Tx, TxError>;
}

/// The unconfirmed-transaction pool, as seen from the core: idempotent
/// admission by tx id.
pub trait Utx: Send + Sync {
    fn put_if_new(&self, tx: &Tx) -> Result<(), TxError>;
}

/// The peer-to-peer broadcast group. Fire-and-forget, non-blocking.
pub trait ChannelGroup: Send + Sync {
    fn broadcast(&self, tx: &Tx);
}

/// Downstream consumer of the domain event stream (history indexers,
/// websocket fan-out, etc.), non-blocking from the core's perspective.
pub trait EventBus: Send + Sync {
    fn publish(&self, pair: &AssetPair, event: &Event);

    /// Recovery step 1 (spec.md §4.3): "Load latest snapshot if any ->
    /// install as initial book, publish snapshot to external subscribers."
    /// Distinct from `publish` because `Snapshot` isn't one of the three
    /// journaled `Event` variants — it carries the whole recovered book,
    /// not a single mutation.
    fn publish_snapshot(&self, pair: &AssetPair, snapshot: &Snapshot);
}

// ===========================================================================
// In-memory doubles
// ===========================================================================

/// Builds a `Tx` unconditionally from the trade terms of an execution.
/// The default collaborator for setups that don't yet have real chain
/// integration.
#[derive(Debug, Default)]
pub struct EchoTxBuilder;

impl TxBuilder for EchoTxBuilder {
    fn build(&self, executed: &ExecutedEvent) -> Result<Tx, TxError> {
        let (buy, sell) = match executed.submitted.side() {
            crate::order::Side::Buy => (&executed.submitted, &executed.counter),
            crate::order::Side::Sell => (&executed.counter, &executed.submitted),
        };
        Ok(Tx {
            id: Uuid::new_v4(),
            buy_order_id: buy.id(),
            sell_order_id: sell.id(),
            trade_amount: executed.trade_amount,
            trade_price: executed.trade_price,
        })
    }
}

/// A `TxBuilder` whose outcomes are scripted in advance, for deterministic
/// tests of the `InvalidTxPolicy` branches (spec.md §4.3 scenario 6).
/// Falls back to `EchoTxBuilder`'s behavior once the script is exhausted.
pub struct ScriptedTxBuilder {
    script: Mutex<VecDeque<Result<Tx, TxError>>>,
    fallback: EchoTxBuilder,
}

impl ScriptedTxBuilder {
    pub fn new(script: Vec<Result<Tx, TxError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: EchoTxBuilder,
        }
    }
}

impl TxBuilder for ScriptedTxBuilder {
    fn build(&self, executed: &ExecutedEvent) -> Result<Tx, TxError> {
        let next = self.script.lock().expect("script mutex poisoned").pop_front();
        match next {
            Some(outcome) => outcome,
            None => self.fallback.build(executed),
        }
    }
}

/// Accepts every transaction exactly once; a second `put_if_new` with the
/// same id still returns `Ok` (idempotent), matching spec.md §6.
#[derive(Debug, Default)]
pub struct AcceptingUtx {
    seen: Mutex<std::collections::HashSet<Uuid>>,
}

impl Utx for AcceptingUtx {
    fn put_if_new(&self, tx: &Tx) -> Result<(), TxError> {
        self.seen.lock().expect("utx mutex poisoned").insert(tx.id);
        Ok(())
    }
}

/// A `ChannelGroup` that records what it was asked to broadcast, for
/// assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingChannelGroup {
    pub sent: Mutex<Vec<Tx>>,
}

impl ChannelGroup for RecordingChannelGroup {
    fn broadcast(&self, tx: &Tx) {
        self.sent.lock().expect("channel mutex poisoned").push(tx.clone());
    }
}

/// Everything a subscriber can receive off a [`BroadcastEventBus`]: either
/// a journaled domain event, or the one-time snapshot published at
/// recovery (spec.md §4.3 Recovery step 1).
#[derive(Debug, Clone)]
pub enum EventBusMessage {
    Event(Event),
    Snapshot(Snapshot),
}

/// An `EventBus` backed by a `tokio::sync::broadcast` channel, mirroring
/// the teacher's `subscribe_trades`/`subscribe_orderbook` pattern
/// (`services/matching/orchestrator.rs`). Lagging subscribers drop old
/// events rather than blocking the publisher.
pub struct BroadcastEventBus {
    sender: broadcast::Sender<(AssetPair, EventBusMessage)>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(AssetPair, EventBusMessage)> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1_024)
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, pair: &AssetPair, event: &Event) {
        // Fire-and-forget: no subscribers is not an error.
        let _ = self.sender.send((*pair, EventBusMessage::Event(event.clone())));
    }

    fn publish_snapshot(&self, pair: &AssetPair, snapshot: &Snapshot) {
        let _ = self
            .sender
            .send((*pair, EventBusMessage::Snapshot(snapshot.clone())));
    }
}
