//! Per-market order-matching core for a decentralized exchange matcher
//! service: a price-time-priority continuous limit order book, driven by
//! a single-owner actor that persists every state change to an
//! event-sourced journal and survives restart by replay.
//!
//! One [`core::BookCore`] exists per trading pair, addressed by
//! [`pair::AssetPair::canonical`]. Callers spawn a `BookCore`, keep the
//! returned [`core::BookCoreHandle`], and talk to it exclusively through
//! that handle — the book, journal, and snapshot store are never shared.

pub mod book;
pub mod collaborators;
pub mod config;
pub mod core;
pub mod error;
pub mod event;
pub mod market;
pub mod matcher;
pub mod metrics;
pub mod order;
pub mod pair;
pub mod persistence;

pub use book::Book;
pub use collaborators::{BroadcastEventBus, ChannelGroup, EventBus, EventBusMessage, Tx, TxBuilder, Utx};
pub use config::BookCoreConfig;
pub use core::{BookCore, BookCoreHandle, Command, Reply};
pub use error::{CancelError, CoreError, PersistenceError, PlacementError, RecoveryError, TxError};
pub use event::{Event, ExecutedEvent, Snapshot};
pub use market::{MarketStatusPayload, OrderBookPayload};
pub use matcher::{match_one, MatchOutcome, MAX_MATCH_ITERATIONS};
pub use order::{LimitOrder, Order, Side};
pub use pair::{AssetId, AssetPair};
pub use persistence::{FileJournal, FileSnapshotStore, InMemoryJournal, InMemorySnapshotStore, Journal, SnapshotStore};
