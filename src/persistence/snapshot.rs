//! Book snapshot persistence: save/load the latest snapshot, delete
//! snapshots below a cutoff once a newer one is durable.

use crate::error::{PersistenceError, RecoveryError};
use crate::event::Snapshot;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Persists and retrieves book snapshots keyed by journal sequence number.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&mut self, snapshot: &Snapshot) -> Result<(), PersistenceError>;
    async fn load_latest(&self) -> Result<Option<Snapshot>, RecoveryError>;
    async fn delete_below(&mut self, seq: u64) -> Result<(), PersistenceError>;
}

/// An in-process snapshot store backed by a `BTreeMap<sequence, Snapshot>`.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: BTreeMap<u64, Snapshot>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&mut self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        self.snapshots.insert(snapshot.sequence, snapshot.clone());
        Ok(())
    }

    async fn load_latest(&self) -> Result<Option<Snapshot>, RecoveryError> {
        Ok(self.snapshots.values().next_back().cloned())
    }

    async fn delete_below(&mut self, seq: u64) -> Result<(), PersistenceError> {
        self.snapshots.retain(|&s, _| s >= seq);
        Ok(())
    }
}

/// A snapshot store backed by one bincode-encoded file per sequence number
/// under `dir`, named `<seq>.snapshot`.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PersistenceError::SnapshotWrite(e.to_string()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("{seq:020}.snapshot"))
    }

    async fn list_sequences(&self) -> Result<Vec<u64>, std::io::Error> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut seqs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".snapshot") {
                    if let Ok(seq) = stem.parse::<u64>() {
                        seqs.push(seq);
                    }
                }
            }
        }
        seqs.sort_unstable();
        Ok(seqs)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&mut self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let payload =
            bincode::serialize(snapshot).map_err(|e| PersistenceError::SnapshotWrite(e.to_string()))?;
        let tmp_path = self.path_for(snapshot.sequence).with_extension("tmp");
        {
            let mut file = tokio::fs::File::create(&tmp_path)
                .await
                .map_err(|e| PersistenceError::SnapshotWrite(e.to_string()))?;
            file.write_all(&payload)
                .await
                .map_err(|e| PersistenceError::SnapshotWrite(e.to_string()))?;
            file.flush().await.map_err(|e| PersistenceError::SnapshotWrite(e.to_string()))?;
        }
        tokio::fs::rename(&tmp_path, self.path_for(snapshot.sequence))
            .await
            .map_err(|e| PersistenceError::SnapshotWrite(e.to_string()))
    }

    async fn load_latest(&self) -> Result<Option<Snapshot>, RecoveryError> {
        let seqs = self
            .list_sequences()
            .await
            .map_err(|e| RecoveryError::SnapshotCorrupt(e.to_string()))?;
        let Some(latest) = seqs.last() else {
            return Ok(None);
        };
        let mut file = tokio::fs::File::open(self.path_for(*latest))
            .await
            .map_err(|e| RecoveryError::SnapshotCorrupt(e.to_string()))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .await
            .map_err(|e| RecoveryError::SnapshotCorrupt(e.to_string()))?;
        let snapshot: Snapshot =
            bincode::deserialize(&buf).map_err(|e| RecoveryError::SnapshotCorrupt(e.to_string()))?;
        Ok(Some(snapshot))
    }

    async fn delete_below(&mut self, seq: u64) -> Result<(), PersistenceError> {
        let seqs = self
            .list_sequences()
            .await
            .map_err(|e| PersistenceError::SnapshotWrite(e.to_string()))?;
        for s in seqs {
            if s < seq {
                tokio::fs::remove_file(self.path_for(s))
                    .await
                    .map_err(|e| PersistenceError::SnapshotWrite(e.to_string()))?;
            }
        }
        Ok(())
    }
}
