//! End-to-end tests driving a live `BookCore` through its handle, using
//! in-memory journal/snapshot/collaborator doubles. Covers the six
//! literal scenarios (asserted both on final book state and on the exact
//! event sequence spec.md §8 defines them by), replay determinism,
//! snapshot equivalence, and idempotent cancel.

use dex_matcher_core::collaborators::{
    AcceptingUtx, BroadcastEventBus, EchoTxBuilder, EventBusMessage, RecordingChannelGroup,
    ScriptedTxBuilder,
};
use dex_matcher_core::error::TxError;
use dex_matcher_core::event::Event;
use dex_matcher_core::persistence::{InMemoryJournal, InMemorySnapshotStore, Journal, SnapshotStore};
use dex_matcher_core::{
    AssetId, AssetPair, Book, BookCore, BookCoreConfig, BookCoreHandle, ExecutedEvent, LimitOrder,
    Order, Side, Snapshot,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

fn native_pair() -> AssetPair {
    AssetPair::new(AssetId::Native, AssetId::Issued([7u8; 32]))
}

fn far_future() -> u64 {
    (SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64) + 1_000_000_000
}

fn order_with_sender(side: Side, price: u64, amount: u64, sender_pubkey: [u8; 32]) -> Order {
    Order {
        id: Uuid::new_v4(),
        sender_pubkey,
        pair: native_pair(),
        side,
        amount,
        price,
        timestamp: 0,
        expiration: far_future(),
        matcher_fee: amount / 10 + 1,
        version: 1,
        signature: vec![],
    }
}

fn order(side: Side, price: u64, amount: u64) -> Order {
    order_with_sender(side, price, amount, [0u8; 32])
}

async fn spawn_default() -> (
    BookCoreHandle,
    Arc<RecordingChannelGroup>,
    tokio::sync::broadcast::Receiver<(AssetPair, EventBusMessage)>,
) {
    let event_bus = Arc::new(BroadcastEventBus::default());
    let receiver = event_bus.subscribe();
    let channels = Arc::new(RecordingChannelGroup::default());
    let (handle, _join) = BookCore::spawn(
        native_pair(),
        BookCoreConfig::default(),
        Box::new(InMemoryJournal::new()),
        Box::new(InMemorySnapshotStore::new()),
        Arc::new(EchoTxBuilder),
        Arc::new(AcceptingUtx::default()),
        channels.clone(),
        event_bus,
    )
    .await
    .expect("spawn should recover an empty pair");
    (handle, channels, receiver)
}

/// Pulls the next message off `rx` and unwraps it as a journaled `Event`,
/// panicking with the raw message on a snapshot or a closed channel.
async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<(AssetPair, EventBusMessage)>) -> Event {
    match rx.recv().await.expect("event bus closed unexpectedly") {
        (_, EventBusMessage::Event(event)) => event,
        (_, other @ EventBusMessage::Snapshot(_)) => panic!("expected an Event, got {other:?}"),
    }
}

#[tokio::test]
async fn simple_cross() {
    let (handle, _channels, mut rx) = spawn_default().await;

    let sell = order(Side::Sell, 50, 100);
    let sell_id = sell.id;
    handle.place(sell).await.unwrap();

    let buy = order(Side::Buy, 50, 100);
    let buy_id = buy.id;
    handle.place(buy).await.unwrap();

    match next_event(&mut rx).await {
        Event::OrderAdded { order } => {
            assert_eq!(order.id(), sell_id);
            assert_eq!(order.remaining_amount, 100);
        }
        other => panic!("expected OrderAdded(S1), got {other:?}"),
    }
    match next_event(&mut rx).await {
        Event::OrderExecuted(exec) => {
            assert_eq!(exec.submitted.id(), buy_id);
            assert_eq!(exec.counter.id(), sell_id);
            assert_eq!(exec.trade_amount, 100);
            assert_eq!(exec.trade_price, 50);
            assert_eq!(exec.submitted_remaining_amount, 0);
            assert_eq!(exec.counter_remaining_amount, 0);
        }
        other => panic!("expected OrderExecuted(B1,S1), got {other:?}"),
    }

    let bids = handle.get_bids().await.unwrap();
    let asks = handle.get_asks().await.unwrap();
    assert!(bids.is_empty());
    assert!(asks.is_empty());

    let status = handle.get_market_status().await.unwrap();
    assert_eq!(status.last_side, Some(Side::Buy));
    assert_eq!(status.last_price, Some(50));

    let orders = handle.get_orders().await.unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn partial_fill_of_incoming() {
    let (handle, _channels, mut rx) = spawn_default().await;

    let sell = order(Side::Sell, 100, 50);
    let sell_id = sell.id;
    handle.place(sell).await.unwrap();
    handle.place(order(Side::Buy, 100, 30)).await.unwrap();

    match next_event(&mut rx).await {
        Event::OrderAdded { order } => assert_eq!(order.id(), sell_id),
        other => panic!("expected OrderAdded(S1), got {other:?}"),
    }
    match next_event(&mut rx).await {
        Event::OrderExecuted(exec) => {
            assert_eq!(exec.trade_amount, 30);
            assert_eq!(exec.trade_price, 100);
            assert_eq!(exec.counter_remaining_amount, 20);
            assert_eq!(exec.submitted_remaining_amount, 0);
        }
        other => panic!("expected a partial OrderExecuted, got {other:?}"),
    }

    let asks = handle.get_asks().await.unwrap();
    assert_eq!(asks, vec![(100, 20)]);
    let bids = handle.get_bids().await.unwrap();
    assert!(bids.is_empty());
}

#[tokio::test]
async fn partial_fill_of_resting_walks_price_levels() {
    let (handle, _channels, mut rx) = spawn_default().await;

    handle.place(order(Side::Sell, 100, 30)).await.unwrap();
    handle.place(order(Side::Sell, 101, 50)).await.unwrap();
    handle.place(order(Side::Buy, 101, 60)).await.unwrap();

    // the two resting OrderAdded events precede any execution.
    for _ in 0..2 {
        match next_event(&mut rx).await {
            Event::OrderAdded { .. } => {}
            other => panic!("expected OrderAdded while seeding the book, got {other:?}"),
        }
    }

    match next_event(&mut rx).await {
        Event::OrderExecuted(exec) => {
            assert_eq!(exec.trade_price, 100);
            assert_eq!(exec.trade_amount, 30);
            assert_eq!(exec.counter_remaining_amount, 0);
            assert_eq!(exec.submitted_remaining_amount, 30);
        }
        other => panic!("expected the fill against the 100 level, got {other:?}"),
    }
    match next_event(&mut rx).await {
        Event::OrderExecuted(exec) => {
            assert_eq!(exec.trade_price, 101);
            assert_eq!(exec.trade_amount, 30);
            assert_eq!(exec.counter_remaining_amount, 20);
            assert_eq!(exec.submitted_remaining_amount, 0);
        }
        other => panic!("expected the fill walking to the 101 level, got {other:?}"),
    }

    let asks = handle.get_asks().await.unwrap();
    assert_eq!(asks, vec![(101, 20)]);

    let status = handle.get_market_status().await.unwrap();
    assert_eq!(status.last_price, Some(101));
}

#[tokio::test]
async fn no_cross_both_sides_rest() {
    let (handle, _channels, mut rx) = spawn_default().await;

    let sell = order(Side::Sell, 100, 10);
    let sell_id = sell.id;
    handle.place(sell).await.unwrap();
    let buy = order(Side::Buy, 99, 10);
    let buy_id = buy.id;
    handle.place(buy).await.unwrap();

    match next_event(&mut rx).await {
        Event::OrderAdded { order } => assert_eq!(order.id(), sell_id),
        other => panic!("expected OrderAdded(ask), got {other:?}"),
    }
    match next_event(&mut rx).await {
        Event::OrderAdded { order } => assert_eq!(order.id(), buy_id),
        other => panic!("expected OrderAdded(bid), got {other:?}"),
    }

    let status = handle.get_market_status().await.unwrap();
    assert_eq!(status.bid, Some(99));
    assert_eq!(status.ask, Some(100));
}

#[tokio::test]
async fn expired_order_is_evicted_on_cleanup() {
    let (handle, _channels, mut rx) = spawn_default().await;

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64;
    let mut stale = order(Side::Sell, 100, 10);
    stale.expiration = now + 50;
    let stale_id = stale.id;
    handle.place(stale).await.unwrap();

    match next_event(&mut rx).await {
        Event::OrderAdded { order } => assert_eq!(order.id(), stale_id),
        other => panic!("expected OrderAdded(stale), got {other:?}"),
    }

    handle.cleanup(now + 10_000).await.unwrap();

    match next_event(&mut rx).await {
        Event::OrderCanceled { order, unmatchable } => {
            assert_eq!(order.id(), stale_id);
            assert!(unmatchable, "expiry evictions are unmatchable cancels");
        }
        other => panic!("expected OrderCanceled(stale, unmatchable=true), got {other:?}"),
    }

    let asks = handle.get_asks().await.unwrap();
    assert!(asks.is_empty());
}

#[tokio::test]
async fn tx_failure_cancels_counter_and_retries_submitted() {
    let bid_sender = [1u8; 32];
    let bid = order_with_sender(Side::Buy, 100, 10, bid_sender);
    let bid_id = bid.id;

    let event_bus = Arc::new(BroadcastEventBus::default());
    let mut rx = event_bus.subscribe();
    let channels = Arc::new(RecordingChannelGroup::default());
    let mut rejected_accounts = HashSet::new();
    rejected_accounts.insert(bid_sender);
    let tx_builder = Arc::new(ScriptedTxBuilder::new(vec![Err(TxError::AccountBalance(
        rejected_accounts,
    ))]));

    let (handle, _join) = BookCore::spawn(
        native_pair(),
        BookCoreConfig::default(),
        Box::new(InMemoryJournal::new()),
        Box::new(InMemorySnapshotStore::new()),
        tx_builder,
        Arc::new(AcceptingUtx::default()),
        channels,
        event_bus,
    )
    .await
    .unwrap();

    handle.place(bid).await.unwrap();

    let sell = order(Side::Sell, 100, 10);
    let sell_id = sell.id;
    handle.place(sell).await.unwrap();

    match next_event(&mut rx).await {
        Event::OrderAdded { order } => assert_eq!(order.id(), bid_id),
        other => panic!("expected OrderAdded(B1), got {other:?}"),
    }
    match next_event(&mut rx).await {
        Event::OrderCanceled { order, unmatchable } => {
            assert_eq!(order.id(), bid_id);
            assert!(!unmatchable, "counter eviction from a tx failure is not the auto-expiry kind");
        }
        other => panic!("expected OrderCanceled(B1,unmatchable=false), got {other:?}"),
    }
    match next_event(&mut rx).await {
        Event::OrderAdded { order } => assert_eq!(order.id(), sell_id),
        other => panic!("expected S1 to re-try and rest as OrderAdded(S1), got {other:?}"),
    }

    let bids = handle.get_bids().await.unwrap();
    assert!(bids.is_empty(), "counter (bid) should be evicted by the invalid-tx policy");
    let asks = handle.get_asks().await.unwrap();
    assert_eq!(asks, vec![(100, 10)], "submitted (sell) should rest after the counter is evicted");
}

/// spec.md §9's open question: `AccountBalanceError` naming both senders.
/// The policy cancels the counter first, then aborts — the submitted order
/// is not retried and never reaches the book.
#[tokio::test]
async fn tx_failure_both_senders_cancels_counter_then_aborts() {
    let shared_sender = [9u8; 32];
    let bid = order_with_sender(Side::Buy, 100, 10, shared_sender);
    let bid_id = bid.id;
    let sell = order_with_sender(Side::Sell, 100, 10, shared_sender);

    let event_bus = Arc::new(BroadcastEventBus::default());
    let mut rx = event_bus.subscribe();
    let channels = Arc::new(RecordingChannelGroup::default());
    let mut rejected_accounts = HashSet::new();
    rejected_accounts.insert(shared_sender);
    let tx_builder = Arc::new(ScriptedTxBuilder::new(vec![Err(TxError::AccountBalance(
        rejected_accounts,
    ))]));

    let (handle, _join) = BookCore::spawn(
        native_pair(),
        BookCoreConfig::default(),
        Box::new(InMemoryJournal::new()),
        Box::new(InMemorySnapshotStore::new()),
        tx_builder,
        Arc::new(AcceptingUtx::default()),
        channels,
        event_bus,
    )
    .await
    .unwrap();

    handle.place(bid).await.unwrap();
    handle.place(sell).await.unwrap();

    match next_event(&mut rx).await {
        Event::OrderAdded { order } => assert_eq!(order.id(), bid_id),
        other => panic!("expected OrderAdded(bid), got {other:?}"),
    }
    match next_event(&mut rx).await {
        Event::OrderCanceled { order, unmatchable } => {
            assert_eq!(order.id(), bid_id);
            assert!(!unmatchable);
        }
        other => panic!("expected OrderCanceled(bid,unmatchable=false), got {other:?}"),
    }

    // the submitted sell is aborted outright: no OrderAdded, no OrderExecuted.
    let bids = handle.get_bids().await.unwrap();
    let asks = handle.get_asks().await.unwrap();
    assert!(bids.is_empty());
    assert!(asks.is_empty(), "submitted order must not rest once both senders are rejected");
}

#[tokio::test]
async fn delete_book_drains_and_publishes_cancels_without_journaling() {
    let (handle, _channels, mut rx) = spawn_default().await;

    let bid = order(Side::Buy, 99, 10);
    let bid_id = bid.id;
    handle.place(bid).await.unwrap();
    let ask = order(Side::Sell, 100, 5);
    let ask_id = ask.id;
    handle.place(ask).await.unwrap();

    // drain the placement events before triggering the delete.
    for _ in 0..2 {
        next_event(&mut rx).await;
    }

    handle.delete_book().await.unwrap();

    let mut canceled_ids = HashSet::new();
    for _ in 0..2 {
        match next_event(&mut rx).await {
            Event::OrderCanceled { order, unmatchable } => {
                assert!(!unmatchable, "DeleteBook drains are not auto-eviction cancels");
                canceled_ids.insert(order.id());
            }
            other => panic!("expected an OrderCanceled drain event, got {other:?}"),
        }
    }
    assert_eq!(canceled_ids, HashSet::from([bid_id, ask_id]));

    // the actor stops itself once DeleteBook is handled (spec.md §4.3 item
    // 4); the mailbox no longer answers further commands.
    let after = handle.get_bids().await;
    assert!(after.is_err(), "actor should have stopped after DeleteBook");
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let (handle, _channels, _rx) = spawn_default().await;

    let resting = order(Side::Buy, 100, 10);
    let id = resting.id;
    handle.place(resting).await.unwrap();

    handle.cancel(id).await.unwrap();
    let second = handle.cancel(id).await;
    assert!(second.is_err(), "cancelling an already-cancelled id must fail");
}

#[tokio::test]
async fn book_never_crosses_after_a_command_completes() {
    let (handle, _channels, _rx) = spawn_default().await;

    handle.place(order(Side::Sell, 100, 10)).await.unwrap();
    handle.place(order(Side::Buy, 105, 4)).await.unwrap();

    let bids = handle.get_bids().await.unwrap();
    let asks = handle.get_asks().await.unwrap();
    assert!(bids.is_empty());
    assert_eq!(asks, vec![(100, 6)]);
}

/// spec.md §8: "apply_all(empty_book, journal_events) equals the
/// in-memory book at the sequence corresponding to those events, for any
/// prefix." Builds a journal directly (no actor involved) and checks that
/// replaying any prefix of it into a fresh `Book` reproduces exactly the
/// state that prefix of events describes.
#[tokio::test]
async fn replay_determinism_holds_for_any_prefix() {
    let mut journal = InMemoryJournal::new();

    let sell = LimitOrder::new(order(Side::Sell, 100, 30));
    journal
        .append(&Event::OrderAdded { order: sell.clone() })
        .await
        .unwrap();

    let buy = LimitOrder::new(order(Side::Buy, 100, 10));
    let counter_after = sell.filled_by(10);
    let submitted_after = buy.filled_by(10);
    journal
        .append(&Event::OrderExecuted(ExecutedEvent {
            submitted: buy.clone(),
            counter: sell.clone(),
            submitted_remaining_amount: submitted_after.remaining_amount,
            submitted_remaining_fee: submitted_after.remaining_fee,
            counter_remaining_amount: counter_after.remaining_amount,
            counter_remaining_fee: counter_after.remaining_fee,
            trade_amount: 10,
            trade_price: 100,
        }))
        .await
        .unwrap();

    let rest = LimitOrder::new(order(Side::Buy, 99, 5));
    journal
        .append(&Event::OrderAdded { order: rest.clone() })
        .await
        .unwrap();

    let all = journal.replay_from(0).await.unwrap();
    assert_eq!(all.len(), 3);

    let apply_prefix = |n: usize| -> Book {
        let mut book = Book::new();
        for (_, event) in all.iter().take(n) {
            event.apply(&mut book);
        }
        book
    };

    let after_1 = apply_prefix(1);
    assert_eq!(after_1.ask_levels(), vec![(100, 30)]);
    assert!(after_1.bid_levels().is_empty());

    let after_2 = apply_prefix(2);
    assert_eq!(after_2.ask_levels(), vec![(100, 20)]);
    assert!(after_2.bid_levels().is_empty());

    let after_3 = apply_prefix(3);
    assert_eq!(after_3.ask_levels(), vec![(100, 20)]);
    assert_eq!(after_3.bid_levels(), vec![(99, 5)]);
}

/// spec.md §8: "apply_all(snapshot.book, journal_events_after_snapshot)
/// equals live book at the latest sequence." Takes a snapshot mid-journal,
/// appends more events, and checks that snapshot + suffix matches a full
/// from-empty replay.
#[tokio::test]
async fn snapshot_plus_suffix_equals_full_replay() {
    let mut journal = InMemoryJournal::new();

    let sell = LimitOrder::new(order(Side::Sell, 100, 30));
    journal
        .append(&Event::OrderAdded { order: sell.clone() })
        .await
        .unwrap();
    let resting_bid = LimitOrder::new(order(Side::Buy, 99, 5));
    let snapshot_seq = journal
        .append(&Event::OrderAdded {
            order: resting_bid.clone(),
        })
        .await
        .unwrap();

    let mut book_at_snapshot = Book::new();
    for (_, event) in journal.replay_from(0).await.unwrap() {
        event.apply(&mut book_at_snapshot);
    }
    let mut store = InMemorySnapshotStore::new();
    store
        .save(&Snapshot {
            book: book_at_snapshot,
            sequence: snapshot_seq,
        })
        .await
        .unwrap();

    let later_bid = LimitOrder::new(order(Side::Buy, 98, 3));
    journal
        .append(&Event::OrderAdded {
            order: later_bid.clone(),
        })
        .await
        .unwrap();

    let mut live_book = Book::new();
    for (_, event) in journal.replay_from(0).await.unwrap() {
        event.apply(&mut live_book);
    }

    let snapshot = store.load_latest().await.unwrap().unwrap();
    let mut rebuilt = snapshot.book;
    for (_, event) in journal.replay_from(snapshot.sequence + 1).await.unwrap() {
        event.apply(&mut rebuilt);
    }

    assert_eq!(rebuilt.bid_levels(), live_book.bid_levels());
    assert_eq!(rebuilt.ask_levels(), live_book.ask_levels());
}
