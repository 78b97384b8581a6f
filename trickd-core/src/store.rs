//! Game storage with optimistic concurrency.
//!
//! Every stored game carries a version that starts at 1 and increases by
//! one per accepted write. Writers present the version they read; the store
//! rejects the write if anyone else got there first.

use crate::error::GameError;
use crate::game::Game;
use crate::validate::JoinCode;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A value together with its store version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Store-level failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("game not found: {0}")]
    NotFound(String),

    #[error("join code {0} is held by another game")]
    CodeTaken(String),

    #[error("game already exists: {0}")]
    Exists(String),

    #[error("version conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for GameError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => GameError::NotFound(id),
            StoreError::Conflict { .. } => GameError::Contention,
            other => GameError::internal(other.to_string()),
        }
    }
}

/// Storage backend for games.
///
/// Implementations must make `compare_and_swap` atomic per game: the
/// version check and the write happen under one lock.
pub trait GameStore: Send + Sync {
    /// Loads the latest snapshot of a game.
    fn get(&self, id: &str) -> Option<Versioned<Game>>;

    /// Looks up the unfinished game holding `code`.
    fn find_by_code(&self, code: &JoinCode) -> Option<Versioned<Game>>;

    /// Stores a new game at version 1.
    fn insert(&self, game: Game) -> Result<Versioned<Game>, StoreError>;

    /// Replaces the game if its stored version is still `expected_version`.
    fn compare_and_swap(
        &self,
        expected_version: u64,
        game: Game,
    ) -> Result<Versioned<Game>, StoreError>;

    /// Number of stored games.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store.
///
/// Records live in a `DashMap`, so a CAS holds only the shard lock of the
/// game being written. The code index only tracks unfinished games; a code
/// is released when its game ends.
#[derive(Debug, Default)]
pub struct MemoryStore {
    games: DashMap<String, Versioned<Game>>,
    codes: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a game, calling `persist` on the new record before it
    /// becomes visible. A failing `persist` leaves the store unchanged.
    pub fn insert_with<F>(&self, game: Game, persist: F) -> Result<Versioned<Game>, StoreError>
    where
        F: FnOnce(&Versioned<Game>) -> Result<(), StoreError>,
    {
        if self.games.contains_key(&game.id) {
            return Err(StoreError::Exists(game.id));
        }

        // The vacant entry holds the code's shard lock until the game is in.
        match self.codes.entry(game.code.as_str().to_string()) {
            Entry::Occupied(_) => Err(StoreError::CodeTaken(game.code.to_string())),
            Entry::Vacant(slot) => {
                let record = Versioned {
                    version: 1,
                    value: game,
                };
                persist(&record)?;
                let id = record.value.id.clone();
                self.games.insert(id.clone(), record.clone());
                slot.insert(id);
                Ok(record)
            }
        }
    }

    /// Compare-and-swap with a write-through hook run under the game's lock.
    pub fn compare_and_swap_with<F>(
        &self,
        expected_version: u64,
        game: Game,
        persist: F,
    ) -> Result<Versioned<Game>, StoreError>
    where
        F: FnOnce(&Versioned<Game>) -> Result<(), StoreError>,
    {
        let record = {
            let mut entry = self
                .games
                .get_mut(&game.id)
                .ok_or_else(|| StoreError::NotFound(game.id.clone()))?;
            if entry.version != expected_version {
                return Err(StoreError::Conflict {
                    expected: expected_version,
                    actual: entry.version,
                });
            }
            let record = Versioned {
                version: expected_version + 1,
                value: game,
            };
            persist(&record)?;
            *entry = record.clone();
            record
        };

        // Code index updates happen after the game lock is released.
        if record.value.is_finished() {
            self.release_code(&record.value);
        }
        Ok(record)
    }

    /// Loads a recovered record as-is. Codes of unfinished games are
    /// re-registered; a clash keeps the most recently updated game.
    pub fn restore(&self, record: Versioned<Game>) {
        let id = record.value.id.clone();
        if !record.value.is_finished() {
            let code = record.value.code.as_str().to_string();
            match self.codes.entry(code) {
                Entry::Vacant(slot) => {
                    slot.insert(id.clone());
                }
                Entry::Occupied(mut slot) => {
                    let newer = self
                        .games
                        .get(slot.get())
                        .map(|held| held.value.updated_at < record.value.updated_at)
                        .unwrap_or(true);
                    tracing::warn!(
                        code = %record.value.code,
                        game_id = %id,
                        holder = %slot.get(),
                        "duplicate join code during recovery"
                    );
                    if newer {
                        slot.insert(id.clone());
                    }
                }
            }
        }
        self.games.insert(id, record);
    }

    fn release_code(&self, game: &Game) {
        self.codes
            .remove_if(game.code.as_str(), |_, holder| *holder == game.id);
    }

    /// Number of codes currently reserved by unfinished games.
    pub fn active_codes(&self) -> usize {
        self.codes.len()
    }
}

impl GameStore for MemoryStore {
    fn get(&self, id: &str) -> Option<Versioned<Game>> {
        self.games.get(id).map(|r| r.value().clone())
    }

    fn find_by_code(&self, code: &JoinCode) -> Option<Versioned<Game>> {
        let id = self.codes.get(code.as_str())?.value().clone();
        self.get(&id)
    }

    fn insert(&self, game: Game) -> Result<Versioned<Game>, StoreError> {
        self.insert_with(game, |_| Ok(()))
    }

    fn compare_and_swap(
        &self,
        expected_version: u64,
        game: Game,
    ) -> Result<Versioned<Game>, StoreError> {
        self.compare_and_swap_with(expected_version, game, |_| Ok(()))
    }

    fn len(&self) -> usize {
        self.games.len()
    }
}
