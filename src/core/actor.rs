//! The serializing driver: the single-owner event loop that receives
//! commands, runs the match loop, persists events, and handles recovery
//! and periodic cleanup (spec.md §4.3).

use super::{Command, CommandEnvelope, Reply};
use crate::book::Book;
use crate::collaborators::{ChannelGroup, EventBus, TxBuilder, Utx};
use crate::config::BookCoreConfig;
use crate::core::BookCoreHandle;
use crate::error::{CancelError, RecoveryError, TxError};
use crate::event::{Event, ExecutedEvent, Snapshot};
use crate::market::MarketStatusPayload;
use crate::matcher::{match_one, MatchOutcome, MAX_MATCH_ITERATIONS};
use crate::order::LimitOrder;
use crate::pair::AssetPair;
use crate::persistence::{Journal, SnapshotStore};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use uuid::Uuid;

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// The single-owner driver for one trading pair's book. Created via
/// [`BookCore::spawn`]; after that, interaction happens only through the
/// returned [`BookCoreHandle`] — nothing else holds a reference to the
/// book, journal, or snapshot store.
pub struct BookCore {
    pair: AssetPair,
    book: Book,
    config: BookCoreConfig,
    journal: Box<dyn Journal>,
    snapshot_store: Box<dyn SnapshotStore>,
    tx_builder: Arc<dyn TxBuilder>,
    utx: Arc<dyn Utx>,
    channels: Arc<dyn ChannelGroup>,
    event_bus: Arc<dyn EventBus>,
    mailbox: mpsc::Receiver<CommandEnvelope>,
    cleanup_handle: Option<JoinHandle<()>>,
    /// Set on an unrecoverable journal failure; the run loop stops after
    /// the in-flight command's reply is sent (spec.md §7: "Fatal errors
    /// stop the actor").
    fatal: bool,
}

impl BookCore {
    /// Recover state, bind the mailbox, and spawn the actor's task plus
    /// its cleanup timer. Recovery failure (a corrupt journal) is fatal
    /// for this pair and is returned to the caller rather than spawned.
    #[allow(clippy::too_many_arguments)]
    pub async fn spawn(
        pair: AssetPair,
        config: BookCoreConfig,
        mut journal: Box<dyn Journal>,
        mut snapshot_store: Box<dyn SnapshotStore>,
        tx_builder: Arc<dyn TxBuilder>,
        utx: Arc<dyn Utx>,
        channels: Arc<dyn ChannelGroup>,
        event_bus: Arc<dyn EventBus>,
    ) -> Result<(BookCoreHandle, JoinHandle<()>), RecoveryError> {
        let book = Self::recover(
            pair,
            journal.as_mut(),
            snapshot_store.as_mut(),
            config.recover_order_history,
            event_bus.as_ref(),
        )
        .await?;

        let (tx, rx) = mpsc::channel(config.mailbox_capacity);
        let handle = BookCoreHandle::new(tx.clone());

        let cleanup_period = Duration::from_millis(config.order_cleanup_interval_ms.max(1));
        let cleanup_tx = tx;
        let cleanup_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_period);
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                interval.tick().await;
                let (reply, _unused) = oneshot::channel();
                if cleanup_tx
                    .try_send(CommandEnvelope {
                        command: Command::Cleanup(now_ms()),
                        reply,
                    })
                    .is_err()
                {
                    tracing::debug!("cleanup tick dropped: mailbox full or actor stopped");
                }
            }
        });

        let core = BookCore {
            pair,
            book,
            config,
            journal,
            snapshot_store,
            tx_builder,
            utx,
            channels,
            event_bus,
            mailbox: rx,
            cleanup_handle: Some(cleanup_handle),
            fatal: false,
        };

        let join = tokio::spawn(core.run());
        Ok((handle, join))
    }

    async fn recover(
        pair: AssetPair,
        journal: &mut dyn Journal,
        snapshot_store: &mut dyn SnapshotStore,
        recover_order_history: bool,
        event_bus: &dyn EventBus,
    ) -> Result<Book, RecoveryError> {
        let (mut book, from_seq) = match snapshot_store.load_latest().await {
            Ok(Some(snapshot)) => {
                tracing::info!(pair = %pair, seq = snapshot.sequence, "recovered from snapshot");
                event_bus.publish_snapshot(&pair, &snapshot);
                let from_seq = snapshot.sequence + 1;
                (snapshot.book, from_seq)
            }
            Ok(None) => (Book::new(), 0),
            Err(err) => {
                tracing::warn!(pair = %pair, error = %err, "snapshot load failed, falling back to full journal replay");
                (Book::new(), 0)
            }
        };

        let events = journal.replay_from(from_seq).await?;
        for (_, event) in &events {
            event.apply(&mut book);
        }
        crate::metrics::record_recovery_replayed(&pair.canonical(), events.len());

        if recover_order_history {
            let resting: Vec<LimitOrder> = book.all_orders().cloned().collect();
            for order in resting {
                event_bus.publish(&pair, &Event::OrderAdded { order });
            }
        }

        Ok(book)
    }

    async fn run(mut self) {
        while let Some(envelope) = self.mailbox.recv().await {
            crate::metrics::record_mailbox_depth(&self.pair.canonical(), self.mailbox.len());
            let CommandEnvelope { command, reply } = envelope;
            let stop_requested = matches!(command, Command::DeleteBook);
            let response = self.dispatch(command).await;
            let _ = reply.send(response);
            if stop_requested || self.fatal {
                break;
            }
        }
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }

    async fn dispatch(&mut self, command: Command) -> Reply {
        match command {
            Command::Place(order) => self.handle_place(order).await,
            Command::Cancel(id) => self.handle_cancel(id).await,
            Command::Cleanup(now) => {
                self.run_cleanup(now).await;
                Reply::Ack
            }
            Command::DeleteBook => self.handle_delete_book().await,
            Command::SaveSnapshot => {
                let seq = self.journal.next_seq().await.saturating_sub(1);
                self.save_snapshot(seq).await;
                Reply::SnapshotSaved
            }
            Command::GetOrders => Reply::Orders(self.book.all_orders().cloned().collect()),
            Command::GetBids => Reply::Bids(self.book.bid_levels()),
            Command::GetAsks => Reply::Asks(self.book.ask_levels()),
            Command::GetMarketStatus => Reply::MarketStatus(MarketStatusPayload::from_book(&self.book)),
            Command::GetOrderBook => Reply::OrderBook(crate::market::OrderBookPayload::from_book(
                self.pair,
                &self.book,
                now_ms(),
            )),
        }
    }

    async fn handle_place(&mut self, order: crate::order::Order) -> Reply {
        let now = now_ms();
        if let Err(err) = self.validate_order(&order, now) {
            crate::metrics::record_order_rejected(&self.pair.canonical(), "placement");
            return Reply::PlacementRejected(err);
        }
        let id = order.id;
        crate::metrics::record_order_placed(&self.pair.canonical());
        let submitted = LimitOrder::new(order);
        let overran = self.run_match_loop(submitted, now).await;
        if overran {
            Reply::PlacementOverran(id, MAX_MATCH_ITERATIONS)
        } else {
            Reply::OrderAccepted(id)
        }
    }

    fn validate_order(
        &self,
        order: &crate::order::Order,
        now: u64,
    ) -> Result<(), crate::error::PlacementError> {
        use crate::error::PlacementError;
        if order.amount == 0 {
            return Err(PlacementError::ZeroAmount);
        }
        if order.expiration <= now {
            return Err(PlacementError::AlreadyExpired(order.id));
        }
        if !self.config.price_in_bounds(order.price) {
            return Err(PlacementError::PriceOutOfBounds {
                price: order.price,
                min: self.config.min_price,
                max: self.config.max_price,
            });
        }
        if !self.config.price_on_tick(order.price) {
            return Err(PlacementError::PriceNotOnTick {
                price: order.price,
                tick: self.config.price_tick,
            });
        }
        Ok(())
    }

    async fn handle_cancel(&mut self, id: Uuid) -> Reply {
        match self.book.get_order(id).cloned() {
            Some(order) => {
                self.process_event(Event::OrderCanceled {
                    order,
                    unmatchable: false,
                })
                .await;
                crate::metrics::record_order_canceled(&self.pair.canonical());
                Reply::OrderCanceled(id)
            }
            None => Reply::OrderCancelRejected(CancelError(id)),
        }
    }

    async fn handle_delete_book(&mut self) -> Reply {
        let resting: Vec<LimitOrder> = self.book.all_orders().cloned().collect();
        for order in resting {
            self.event_bus.publish(
                &self.pair,
                &Event::OrderCanceled {
                    order: order.clone(),
                    unmatchable: false,
                },
            );
            self.book.remove_by_id(order.id());
        }
        let seq = self.journal.next_seq().await.saturating_sub(1);
        if let Err(err) = self.journal.truncate_upto(seq).await {
            tracing::warn!(pair = %self.pair, error = %err, "journal truncate on delete failed");
        }
        if let Err(err) = self.snapshot_store.delete_below(u64::MAX).await {
            tracing::warn!(pair = %self.pair, error = %err, "snapshot cleanup on delete failed");
        }
        Reply::BookDeleted
    }

    /// spec.md §4.3's match loop, re-invoking `match_one` until the
    /// submitted order rests, is exhausted, or is evicted as invalid.
    /// Returns `true` if the loop hit `MAX_MATCH_ITERATIONS` and was cut
    /// short — the caller surfaces this as `CoreError::MatchLoopOverrun`.
    async fn run_match_loop(&mut self, mut submitted: LimitOrder, now: u64) -> bool {
        let mut iterations = 0usize;
        let mut overran = false;
        loop {
            iterations += 1;
            if iterations > MAX_MATCH_ITERATIONS {
                overran = true;
                tracing::error!(pair = %self.pair, cap = MAX_MATCH_ITERATIONS, "match loop exceeded iteration cap");
                crate::metrics::record_match_loop_overrun(&self.pair.canonical());
                break;
            }

            let (sub_rem, cnt_rem) = match match_one(&self.book, &submitted) {
                MatchOutcome::Add => {
                    self.process_event(Event::OrderAdded {
                        order: submitted.clone(),
                    })
                    .await;
                    (None, None)
                }
                MatchOutcome::Execute(exec) => self.handle_execute(exec, now).await,
            };

            if let Some(cnt) = &cnt_rem {
                if !cnt.is_valid(now) {
                    self.process_event(Event::OrderCanceled {
                        order: cnt.clone(),
                        unmatchable: true,
                    })
                    .await;
                }
            }

            match sub_rem {
                Some(sub) if sub.is_valid(now) => {
                    submitted = sub;
                }
                Some(sub) => {
                    self.process_event(Event::OrderCanceled {
                        order: sub,
                        unmatchable: true,
                    })
                    .await;
                    break;
                }
                None => break,
            }

            if self.fatal {
                break;
            }
        }
        crate::metrics::record_match_iterations(&self.pair.canonical(), iterations);
        overran
    }

    /// `handle(event)` of spec.md §4.3 for the `OrderExecuted` case:
    /// build and admit the trade transaction, or fall through to
    /// `InvalidTxPolicy` on failure.
    async fn handle_execute(
        &mut self,
        exec: ExecutedEvent,
        now: u64,
    ) -> (Option<LimitOrder>, Option<LimitOrder>) {
        let trade_amount = exec.trade_amount;
        let built = self
            .tx_builder
            .build(&exec)
            .and_then(|tx| self.utx.put_if_new(&tx).map(|_| tx));

        match built {
            Ok(tx) => {
                self.channels.broadcast(&tx);
                let submitted_after = exec.submitted.filled_by(exec.trade_amount);
                let counter_after = exec.counter.filled_by(exec.trade_amount);
                self.process_event(Event::OrderExecuted(exec)).await;
                crate::metrics::record_trade_executed(&self.pair.canonical(), trade_amount);

                let sub_rem = (submitted_after.remaining_amount > 0).then_some(submitted_after);
                let cnt_rem = (counter_after.remaining_amount > 0).then_some(counter_after);
                (sub_rem, cnt_rem)
            }
            Err(err) => self.apply_invalid_tx_policy(exec, err, now).await,
        }
    }

    /// The `InvalidTxPolicy` table of spec.md §4.3: evict the party whose
    /// state caused the rejection, retry the other against the next
    /// counter.
    async fn apply_invalid_tx_policy(
        &mut self,
        exec: ExecutedEvent,
        err: TxError,
        _now: u64,
    ) -> (Option<LimitOrder>, Option<LimitOrder>) {
        match err {
            TxError::OrderValidation(order) => {
                if order.id == exec.submitted.id() {
                    (None, None)
                } else {
                    self.cancel_resting(exec.counter, false).await;
                    (Some(exec.submitted), None)
                }
            }
            TxError::AccountBalance(accounts) => {
                let counter_in_map = accounts.contains(&exec.counter.order.sender_pubkey);
                let submitted_in_map = accounts.contains(&exec.submitted.order.sender_pubkey);
                if counter_in_map {
                    self.cancel_resting(exec.counter.clone(), false).await;
                }
                if submitted_in_map {
                    (None, None)
                } else {
                    (Some(exec.submitted), None)
                }
            }
            TxError::NegativeAmount => {
                self.process_event(Event::OrderCanceled {
                    order: exec.submitted,
                    unmatchable: true,
                })
                .await;
                (None, None)
            }
            TxError::Other(_) => {
                self.cancel_resting(exec.counter, false).await;
                (Some(exec.submitted), None)
            }
        }
    }

    async fn cancel_resting(&mut self, order: LimitOrder, unmatchable: bool) {
        self.process_event(Event::OrderCanceled { order, unmatchable }).await;
    }

    async fn run_cleanup(&mut self, now: u64) {
        let expired: Vec<LimitOrder> = self
            .book
            .all_orders()
            .filter(|o| !o.is_valid(now))
            .cloned()
            .collect();
        for order in expired {
            self.process_event(Event::OrderCanceled {
                order,
                unmatchable: true,
            })
            .await;
            crate::metrics::record_order_expired(&self.pair.canonical());
            if self.fatal {
                break;
            }
        }
    }

    /// Strict write-ahead (spec.md §5): the event is durable before it is
    /// applied to the book or published. A journal failure is logged and
    /// marks the actor for shutdown rather than applying an unpersisted
    /// event.
    async fn process_event(&mut self, event: Event) {
        match self.journal.append(&event).await {
            Ok(seq) => {
                crate::metrics::record_journal_write(&self.pair.canonical());
                event.apply(&mut self.book);
                self.event_bus.publish(&self.pair, &event);
                if self.config.snapshot_interval > 0 && seq % self.config.snapshot_interval == 0 {
                    self.save_snapshot(seq).await;
                }
            }
            Err(err) => {
                crate::metrics::record_journal_write_failure(&self.pair.canonical());
                tracing::error!(pair = %self.pair, error = %err, "journal append failed; stopping actor");
                self.fatal = true;
            }
        }
    }

    /// On success, truncates the journal up to `seq` and drops superseded
    /// snapshots; a failure is logged and retried at the next interval
    /// (spec.md §4.3 "Snapshot lifecycle").
    async fn save_snapshot(&mut self, seq: u64) {
        let snapshot = Snapshot {
            book: self.book.clone(),
            sequence: seq,
        };
        match self.snapshot_store.save(&snapshot).await {
            Ok(()) => {
                crate::metrics::record_snapshot_saved(&self.pair.canonical());
                if let Err(err) = self.journal.truncate_upto(seq).await {
                    tracing::warn!(pair = %self.pair, error = %err, "journal truncate after snapshot failed");
                }
                if let Err(err) = self.snapshot_store.delete_below(seq).await {
                    tracing::warn!(pair = %self.pair, error = %err, "old snapshot cleanup failed");
                }
            }
            Err(err) => {
                tracing::warn!(pair = %self.pair, error = %err, "snapshot save failed, will retry next interval");
            }
        }
    }
}
