//! Append-only event journal with sequence numbers: replay, truncation,
//! and the wire format of spec.md §6.

use crate::error::{PersistenceError, RecoveryError};
use crate::event::Event;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Append-only event log. The journal is the source of truth — snapshots
/// are an optimization layered on top (spec.md §9).
#[async_trait]
pub trait Journal: Send + Sync {
    /// The sequence number that would be assigned to the next appended event.
    async fn next_seq(&self) -> u64;

    /// Durably append `event`, returning its assigned sequence number.
    /// Strict write-ahead: the caller must not apply `event` to the book
    /// until this returns `Ok`.
    async fn append(&mut self, event: &Event) -> Result<u64, PersistenceError>;

    /// All events with sequence number `>= from_seq`, in order.
    async fn replay_from(&self, from_seq: u64) -> Result<Vec<(u64, Event)>, RecoveryError>;

    /// Drop all events with sequence number `<= seq` (called after a
    /// successful snapshot at `seq`).
    async fn truncate_upto(&mut self, seq: u64) -> Result<(), PersistenceError>;
}

/// An in-process journal backed by a `Vec`. Used in tests, and by
/// embedders that supply their own durability out of band.
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    events: Vec<(u64, Event)>,
    next_seq: u64,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Journal for InMemoryJournal {
    async fn next_seq(&self) -> u64 {
        self.next_seq
    }

    async fn append(&mut self, event: &Event) -> Result<u64, PersistenceError> {
        let seq = self.next_seq;
        self.events.push((seq, event.clone()));
        self.next_seq += 1;
        Ok(seq)
    }

    async fn replay_from(&self, from_seq: u64) -> Result<Vec<(u64, Event)>, RecoveryError> {
        Ok(self
            .events
            .iter()
            .filter(|(seq, _)| *seq >= from_seq)
            .cloned()
            .collect())
    }

    async fn truncate_upto(&mut self, seq: u64) -> Result<(), PersistenceError> {
        self.events.retain(|(s, _)| *s > seq);
        Ok(())
    }
}

/// A journal backed by a single append-only file.
///
/// Wire format (spec.md §6): each record is
/// `[len: u32 LE][seq: u64 LE][bincode(Event)]`, where bincode's own
/// enum encoding already writes the variant discriminant first followed by
/// the variant's fields in declaration order — "tag byte, then fields in
/// declaration order".
pub struct FileJournal {
    path: PathBuf,
    next_seq: u64,
}

impl FileJournal {
    /// Open (or create) the journal file at `path`, scanning it to recover
    /// `next_seq`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RecoveryError> {
        let path = path.into();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| RecoveryError::JournalReplay {
                seq: 0,
                reason: e.to_string(),
            })?;
        let existing = Self::read_all(&path).await?;
        let next_seq = existing.last().map(|(seq, _)| seq + 1).unwrap_or(0);
        Ok(Self { path, next_seq })
    }

    async fn read_all(path: &PathBuf) -> Result<Vec<(u64, Event)>, RecoveryError> {
        let mut file = match OpenOptions::new().read(true).open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RecoveryError::JournalReplay {
                    seq: 0,
                    reason: e.to_string(),
                })
            }
        };

        let mut out = Vec::new();
        loop {
            let mut len_buf = [0u8; 4];
            match file.read_exact(&mut len_buf).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    return Err(RecoveryError::JournalReplay {
                        seq: out.last().map(|(s, _)| *s).unwrap_or(0),
                        reason: e.to_string(),
                    })
                }
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut seq_buf = [0u8; 8];
            file.read_exact(&mut seq_buf).await.map_err(|e| RecoveryError::JournalReplay {
                seq: out.last().map(|(s, _)| *s).unwrap_or(0),
                reason: e.to_string(),
            })?;
            let seq = u64::from_le_bytes(seq_buf);

            let mut payload = vec![0u8; len];
            file.read_exact(&mut payload).await.map_err(|e| RecoveryError::JournalReplay {
                seq,
                reason: e.to_string(),
            })?;
            let event: Event = bincode::deserialize(&payload).map_err(|e| RecoveryError::JournalReplay {
                seq,
                reason: e.to_string(),
            })?;
            out.push((seq, event));
        }
        Ok(out)
    }

    async fn rewrite(&self, events: &[(u64, Event)]) -> Result<(), PersistenceError> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .await
                .map_err(|e| PersistenceError::Truncate(e.to_string()))?;
            for (seq, event) in events {
                let payload = bincode::serialize(event)
                    .map_err(|e| PersistenceError::Truncate(e.to_string()))?;
                tmp.write_all(&(payload.len() as u32).to_le_bytes())
                    .await
                    .map_err(|e| PersistenceError::Truncate(e.to_string()))?;
                tmp.write_all(&seq.to_le_bytes())
                    .await
                    .map_err(|e| PersistenceError::Truncate(e.to_string()))?;
                tmp.write_all(&payload)
                    .await
                    .map_err(|e| PersistenceError::Truncate(e.to_string()))?;
            }
            tmp.flush().await.map_err(|e| PersistenceError::Truncate(e.to_string()))?;
        }
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| PersistenceError::Truncate(e.to_string()))
    }
}

#[async_trait]
impl Journal for FileJournal {
    async fn next_seq(&self) -> u64 {
        self.next_seq
    }

    async fn append(&mut self, event: &Event) -> Result<u64, PersistenceError> {
        let seq = self.next_seq;
        let payload = bincode::serialize(event).map_err(|e| PersistenceError::JournalWrite(e.to_string()))?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| PersistenceError::JournalWrite(e.to_string()))?;
        file.write_all(&(payload.len() as u32).to_le_bytes())
            .await
            .map_err(|e| PersistenceError::JournalWrite(e.to_string()))?;
        file.write_all(&seq.to_le_bytes())
            .await
            .map_err(|e| PersistenceError::JournalWrite(e.to_string()))?;
        file.write_all(&payload)
            .await
            .map_err(|e| PersistenceError::JournalWrite(e.to_string()))?;
        file.flush().await.map_err(|e| PersistenceError::JournalWrite(e.to_string()))?;

        self.next_seq += 1;
        Ok(seq)
    }

    async fn replay_from(&self, from_seq: u64) -> Result<Vec<(u64, Event)>, RecoveryError> {
        let all = Self::read_all(&self.path).await?;
        Ok(all.into_iter().filter(|(seq, _)| *seq >= from_seq).collect())
    }

    async fn truncate_upto(&mut self, seq: u64) -> Result<(), PersistenceError> {
        let all = Self::read_all(&self.path)
            .await
            .map_err(|e| PersistenceError::Truncate(e.to_string()))?;
        let kept: Vec<_> = all.into_iter().filter(|(s, _)| *s > seq).collect();
        self.rewrite(&kept).await
    }
}
