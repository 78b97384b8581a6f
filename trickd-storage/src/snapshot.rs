//! Per-game snapshot files.
//!
//! Each game lives in `games/<id>.json` as two lines: a header with the
//! game id, version, body size and CRC32C checksum, then the JSON body of
//! the game itself. Writes go to `<id>.json.tmp`, are synced, then renamed
//! over the live file.

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use trickd_core::{Game, Versioned};

const GAMES_DIR: &str = "games";
const SNAPSHOT_EXT: &str = "json";
const TMP_SUFFIX: &str = ".json.tmp";

/// Header line of a snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub game_id: String,
    pub version: u64,
    pub size_bytes: u64,
    pub checksum: String,
}

/// Directory of game snapshots.
#[derive(Debug)]
pub struct SnapshotDir {
    dir: PathBuf,
}

impl SnapshotDir {
    /// Opens or creates `<root>/games`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = root.as_ref().join(GAMES_DIR);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Atomically replaces the snapshot of `record`'s game.
    pub fn write(&self, record: &Versioned<Game>) -> Result<SnapshotMeta, StorageError> {
        let game_id = &record.value.id;
        let body = serde_json::to_vec(&record.value)?;
        let meta = SnapshotMeta {
            game_id: game_id.clone(),
            version: record.version,
            size_bytes: body.len() as u64,
            checksum: checksum(&body),
        };

        let final_path = self.snapshot_path(game_id)?;
        let tmp_path = self.dir.join(format!("{}{}", game_id, TMP_SUFFIX));
        {
            let mut file = File::create(&tmp_path)?;
            serde_json::to_writer(&mut file, &meta)?;
            file.write_all(b"\n")?;
            file.write_all(&body)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;

        tracing::debug!(
            game_id = %game_id,
            version = record.version,
            size_bytes = meta.size_bytes,
            "wrote snapshot"
        );
        Ok(meta)
    }

    /// Reads one game's snapshot, verifying its header.
    pub fn read(&self, game_id: &str) -> Result<Versioned<Game>, StorageError> {
        let path = self.snapshot_path(game_id)?;
        let mut data = String::new();
        File::open(&path)?.read_to_string(&mut data)?;
        let record = parse_snapshot(&data)?;
        if record.value.id != game_id {
            return Err(StorageError::Corruption(format!(
                "snapshot {} holds game {}",
                game_id, record.value.id
            )));
        }
        Ok(record)
    }

    /// Loads every snapshot in the directory.
    ///
    /// Leftover temp files from an interrupted write are removed. Any
    /// unreadable snapshot fails the whole load.
    pub fn load_all(&self) -> Result<Vec<Versioned<Game>>, StorageError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if name.ends_with(TMP_SUFFIX) {
                tracing::warn!(file = %name, "removing incomplete snapshot");
                fs::remove_file(&path)?;
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXT) {
                continue;
            }
            let Some(game_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            records.push(self.read(game_id)?);
        }

        records.sort_by(|a, b| a.value.created_at.cmp(&b.value.created_at));
        Ok(records)
    }

    fn snapshot_path(&self, game_id: &str) -> Result<PathBuf, StorageError> {
        if game_id.is_empty()
            || !game_id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsafe game id: {:?}", game_id),
            )));
        }
        Ok(self.dir.join(format!("{}.{}", game_id, SNAPSHOT_EXT)))
    }
}

fn checksum(data: &[u8]) -> String {
    format!("{:08x}", crc32c::crc32c(data))
}

fn parse_snapshot(data: &str) -> Result<Versioned<Game>, StorageError> {
    let (header, body) = data
        .split_once('\n')
        .ok_or_else(|| StorageError::Corruption("snapshot has no header".to_string()))?;
    let meta: SnapshotMeta = serde_json::from_str(header)?;
    let body = body.strip_suffix('\n').unwrap_or(body);

    if body.len() as u64 != meta.size_bytes {
        return Err(StorageError::Corruption(format!(
            "snapshot {} is {} bytes, header says {}",
            meta.game_id,
            body.len(),
            meta.size_bytes
        )));
    }
    if checksum(body.as_bytes()) != meta.checksum {
        return Err(StorageError::Corruption(format!(
            "snapshot {} checksum mismatch",
            meta.game_id
        )));
    }

    let game: Game = serde_json::from_str(body)?;
    if game.id != meta.game_id {
        return Err(StorageError::Corruption(format!(
            "snapshot header names {}, body holds {}",
            meta.game_id, game.id
        )));
    }
    Ok(Versioned {
        version: meta.version,
        value: game,
    })
}
