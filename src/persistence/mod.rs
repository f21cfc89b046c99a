//! Event-sourced persistence: an append-only [`journal::Journal`] of
//! domain events plus a [`snapshot::SnapshotStore`] of periodic book
//! snapshots. The journal is the source of truth; snapshots are purely an
//! optimization (spec.md §9).

pub mod journal;
pub mod snapshot;

pub use journal::{FileJournal, InMemoryJournal, Journal};
pub use snapshot::{FileSnapshotStore, InMemorySnapshotStore, SnapshotStore};
