//! The actor-facing surface: commands, replies, and the cloneable handle
//! used to talk to a running [`actor::BookCore`].

pub mod actor;

use crate::error::{CancelError, CoreError, PlacementError};
use crate::market::{MarketStatusPayload, OrderBookPayload};
use crate::order::{LimitOrder, Order};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

pub use actor::BookCore;

/// Commands accepted by a [`BookCore`] mailbox (spec.md §4.3).
#[derive(Debug)]
pub enum Command {
    Place(Order),
    Cancel(Uuid),
    Cleanup(u64),
    DeleteBook,
    SaveSnapshot,
    GetOrders,
    GetBids,
    GetAsks,
    GetMarketStatus,
    GetOrderBook,
}

/// Replies produced for each command.
#[derive(Debug)]
pub enum Reply {
    OrderAccepted(Uuid),
    PlacementRejected(PlacementError),
    /// The match loop hit `MAX_MATCH_ITERATIONS` (spec.md §9's "bounded
    /// iterative loop" fail-fast guard) before the submitted order settled.
    /// Whatever fills already journaled stand; the caller is told its
    /// order was not fully processed.
    PlacementOverran(Uuid, usize),
    OrderCanceled(Uuid),
    OrderCancelRejected(CancelError),
    BookDeleted,
    SnapshotSaved,
    Ack,
    Orders(Vec<LimitOrder>),
    Bids(Vec<(u64, u64)>),
    Asks(Vec<(u64, u64)>),
    MarketStatus(MarketStatusPayload),
    OrderBook(OrderBookPayload),
}

struct CommandEnvelope {
    command: Command,
    reply: oneshot::Sender<Reply>,
}

/// A cloneable, send-only handle to a running [`BookCore`] task. Dropping
/// every handle (and the actor's own retained sender, if any) closes the
/// mailbox and the actor's run loop exits.
#[derive(Clone)]
pub struct BookCoreHandle {
    sender: mpsc::Sender<CommandEnvelope>,
}

impl BookCoreHandle {
    pub(crate) fn new(sender: mpsc::Sender<CommandEnvelope>) -> Self {
        Self { sender }
    }

    async fn call(&self, command: Command) -> Result<Reply, CoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .try_send(CommandEnvelope {
                command,
                reply: reply_tx,
            })
            .map_err(|_| CoreError::MailboxFull)?;
        reply_rx.await.map_err(|_| CoreError::Stopped)
    }

    pub async fn place(&self, order: Order) -> Result<Uuid, CoreError> {
        match self.call(Command::Place(order)).await? {
            Reply::OrderAccepted(id) => Ok(id),
            Reply::PlacementRejected(err) => Err(CoreError::Placement(err)),
            Reply::PlacementOverran(_id, iterations) => Err(CoreError::MatchLoopOverrun(iterations)),
            _ => unreachable!("Place always replies OrderAccepted, PlacementRejected, or PlacementOverran"),
        }
    }

    pub async fn cancel(&self, order_id: Uuid) -> Result<Uuid, CancelError> {
        match self.call(Command::Cancel(order_id)).await {
            Ok(Reply::OrderCanceled(id)) => Ok(id),
            Ok(Reply::OrderCancelRejected(err)) => Err(err),
            _ => unreachable!("Cancel always replies OrderCanceled or OrderCancelRejected"),
        }
    }

    pub async fn cleanup(&self, now: u64) -> Result<(), CoreError> {
        self.call(Command::Cleanup(now)).await.map(|_| ())
    }

    pub async fn delete_book(&self) -> Result<(), CoreError> {
        self.call(Command::DeleteBook).await.map(|_| ())
    }

    pub async fn save_snapshot(&self) -> Result<(), CoreError> {
        self.call(Command::SaveSnapshot).await.map(|_| ())
    }

    pub async fn get_orders(&self) -> Result<Vec<LimitOrder>, CoreError> {
        match self.call(Command::GetOrders).await? {
            Reply::Orders(orders) => Ok(orders),
            _ => unreachable!("GetOrders always replies Orders"),
        }
    }

    pub async fn get_bids(&self) -> Result<Vec<(u64, u64)>, CoreError> {
        match self.call(Command::GetBids).await? {
            Reply::Bids(bids) => Ok(bids),
            _ => unreachable!("GetBids always replies Bids"),
        }
    }

    pub async fn get_asks(&self) -> Result<Vec<(u64, u64)>, CoreError> {
        match self.call(Command::GetAsks).await? {
            Reply::Asks(asks) => Ok(asks),
            _ => unreachable!("GetAsks always replies Asks"),
        }
    }

    pub async fn get_market_status(&self) -> Result<MarketStatusPayload, CoreError> {
        match self.call(Command::GetMarketStatus).await? {
            Reply::MarketStatus(status) => Ok(status),
            _ => unreachable!("GetMarketStatus always replies MarketStatus"),
        }
    }

    pub async fn get_order_book(&self) -> Result<OrderBookPayload, CoreError> {
        match self.call(Command::GetOrderBook).await? {
            Reply::OrderBook(book) => Ok(book),
            _ => unreachable!("GetOrderBook always replies OrderBook"),
        }
    }
}
