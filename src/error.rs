//! Error taxonomy (spec.md §7). One `thiserror` enum per concern rather
//! than a single god-enum, mirroring the teacher's per-module
//! `MatchingError` convention.

use std::collections::HashSet;
use uuid::Uuid;

use crate::order::Order;

/// `Place` rejected before any state change or journal write.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlacementError {
    #[error("order {0} already expired at arrival")]
    AlreadyExpired(Uuid),
    #[error("price {price} outside bounds [{min}, {max}]")]
    PriceOutOfBounds { price: u64, min: u64, max: u64 },
    #[error("price {price} is not a multiple of tick size {tick}")]
    PriceNotOnTick { price: u64, tick: u64 },
    #[error("order amount must be positive")]
    ZeroAmount,
}

/// `Cancel` target absent.
#[derive(Debug, Clone, thiserror::Error)]
#[error("order not found: {0}")]
pub struct CancelError(pub Uuid);

/// Subdivision of spec.md §4.3's `InvalidTxPolicy` table: why a candidate
/// transaction for an execution was rejected downstream.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TxError {
    #[error("order validation failed for {0:?}")]
    OrderValidation(Box<Order>),
    #[error("account balance error for {0} account(s)")]
    AccountBalance(HashSet<[u8; 32]>),
    #[error("negative amount computed for trade")]
    NegativeAmount,
    #[error("transaction rejected: {0}")]
    Other(String),
}

/// Journal/snapshot write failure.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("journal append failed: {0}")]
    JournalWrite(String),
    #[error("snapshot write failed: {0}")]
    SnapshotWrite(String),
    #[error("journal truncation failed: {0}")]
    Truncate(String),
}

/// Recovery-time failure.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("snapshot deserialization failed: {0}")]
    SnapshotCorrupt(String),
    #[error("journal replay failed at sequence {seq}: {reason}")]
    JournalReplay { seq: u64, reason: String },
}

/// Actor-level ambient failures that spec.md's taxonomy doesn't name but a
/// real mailbox-backed service needs: a full mailbox, or a matcher loop
/// that overran its iteration cap.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("mailbox full, retry")]
    MailboxFull,
    #[error("match loop exceeded {0} iterations")]
    MatchLoopOverrun(usize),
    #[error(transparent)]
    Placement(#[from] PlacementError),
    #[error(transparent)]
    Cancel(#[from] CancelError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
    #[error("actor already stopped")]
    Stopped,
}
