use crate::error::LogError;
use crate::index::types::CommitMetadata;
use crate::utils::write_atomic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Commit metadata key holding the first generation not yet in the index
pub const GENERATION_KEY: &str = "translog_generation";

/// Commit metadata key holding the uuid of the log the index is bound to
pub const UUID_KEY: &str = "translog_uuid";

/// Name of the log's own state file
pub const STATE_FILE: &str = "translog.ckp";

/// Position in the log that an index commit already reflects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub generation: u64,
    pub log_uuid: Uuid,
}

impl Checkpoint {
    pub fn write_to(&self, metadata: &mut CommitMetadata) {
        metadata.insert(GENERATION_KEY.to_string(), self.generation.to_string());
        metadata.insert(UUID_KEY.to_string(), self.log_uuid.to_string());
    }

    /// Read the checkpoint stamped on a commit. `None` when the commit was
    /// never stamped; an error when only half of it is there or it does not
    /// parse.
    pub fn from_metadata(metadata: &CommitMetadata) -> Result<Option<Self>, LogError> {
        let generation = metadata.get(GENERATION_KEY);
        let uuid = metadata.get(UUID_KEY);

        match (generation, uuid) {
            (None, None) => Ok(None),
            (Some(generation), Some(uuid)) => {
                let generation = generation.parse().map_err(|_| {
                    LogError::InvalidCheckpoint(format!("bad generation '{}'", generation))
                })?;
                let log_uuid = Uuid::parse_str(uuid)
                    .map_err(|_| LogError::InvalidCheckpoint(format!("bad uuid '{}'", uuid)))?;
                Ok(Some(Self {
                    generation,
                    log_uuid,
                }))
            }
            (Some(_), None) => Err(LogError::InvalidCheckpoint(format!("{} without {}", GENERATION_KEY, UUID_KEY))),
            (None, Some(_)) => Err(LogError::InvalidCheckpoint(format!("{} without {}", UUID_KEY, GENERATION_KEY))),
        }
    }
}

/// The log directory's own bookkeeping, persisted as `translog.ckp`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogState {
    pub store_id: String,
    pub uuid: Uuid,
    /// Generation currently being appended to
    pub generation: u64,
    /// Oldest generation still on disk
    pub min_generation: u64,
}

impl LogState {
    pub fn path(log_path: &Path) -> PathBuf {
        log_path.join(STATE_FILE)
    }

    pub fn read(log_path: &Path) -> Result<Option<Self>, LogError> {
        let path = Self::path(log_path);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LogError::io(&path)(e)),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| LogError::Corrupted {
                path,
                reason: e.to_string(),
            })
    }

    pub fn write(&self, log_path: &Path) -> Result<(), LogError> {
        let path = Self::path(log_path);
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(&path, &json).map_err(LogError::io(&path))
    }
}
