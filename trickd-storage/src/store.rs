//! Write-through durable game store.

use crate::error::StorageError;
use crate::snapshot::SnapshotDir;
use std::path::Path;
use trickd_core::{Game, GameStore, JoinCode, MemoryStore, StoreError, Versioned};

/// A `MemoryStore` whose every accepted write is first persisted to disk.
///
/// The snapshot is written while the store holds the game's lock, so the
/// file on disk never goes backwards and a failed write is never visible.
pub struct DurableStore {
    memory: MemoryStore,
    snapshots: SnapshotDir,
}

impl DurableStore {
    /// Opens the store at `root`, recovering all saved games.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let snapshots = SnapshotDir::open(root)?;
        let memory = MemoryStore::new();

        let records = snapshots.load_all()?;
        let recovered = records.len();
        for record in records {
            memory.restore(record);
        }

        tracing::info!(
            path = %snapshots.path().display(),
            games = recovered,
            active_codes = memory.active_codes(),
            "recovered games"
        );

        Ok(Self { memory, snapshots })
    }

    pub fn snapshots(&self) -> &SnapshotDir {
        &self.snapshots
    }

    fn persist(&self, record: &Versioned<Game>) -> Result<(), StoreError> {
        self.snapshots.write(record).map(|_| ()).map_err(|e| {
            tracing::error!(game_id = %record.value.id, error = %e, "snapshot write failed");
            StoreError::from(e)
        })
    }
}

impl GameStore for DurableStore {
    fn get(&self, id: &str) -> Option<Versioned<Game>> {
        self.memory.get(id)
    }

    fn find_by_code(&self, code: &JoinCode) -> Option<Versioned<Game>> {
        self.memory.find_by_code(code)
    }

    fn insert(&self, game: Game) -> Result<Versioned<Game>, StoreError> {
        self.memory.insert_with(game, |record| self.persist(record))
    }

    fn compare_and_swap(
        &self,
        expected_version: u64,
        game: Game,
    ) -> Result<Versioned<Game>, StoreError> {
        self.memory
            .compare_and_swap_with(expected_version, game, |record| self.persist(record))
    }

    fn len(&self) -> usize {
        self.memory.len()
    }
}
