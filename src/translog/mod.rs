//! Write-ahead log of document mutations.
//!
//! The log is a directory of numbered generation files plus a small state
//! file. Every index commit made through [`TransactionLog::commit`] is stamped
//! with a [`Checkpoint`] naming the first generation whose records the commit
//! does not contain; recovery replays exactly those generations.

pub mod checkpoint;
pub mod generation;
pub mod mappings;
pub mod operation;
pub mod record;

pub use checkpoint::{Checkpoint, LogState, GENERATION_KEY, UUID_KEY};
pub use mappings::Mappings;
pub use operation::{to_translog_operation, Operation, Update};
pub use record::{LogRecord, Put};

use crate::config::TranslogConfig;
use crate::error::LogError;
use crate::index::api::{DocumentWriter, Searcher, Writer};
use generation::{generation_path, list_generations, read_generation, GenerationWriter};
use record::encode_frame;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Outcome of a recovery pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Generations read
    pub generations: usize,
    pub records: usize,
    /// Operations applied to the writer
    pub operations: usize,
    /// A commit was made afterwards
    pub committed: bool,
}

/// Records of a contiguous range of generations, oldest first
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub generations: Vec<u64>,
    pub records: Vec<LogRecord>,
}

impl IntoIterator for Snapshot {
    type Item = LogRecord;
    type IntoIter = std::vec::IntoIter<LogRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Append-only log bound to one store's index writer
pub struct TransactionLog {
    log_path: PathBuf,
    mappings: Mappings,
    config: TranslogConfig,
    state: LogState,
    /// `None` once closed
    current: Option<GenerationWriter>,
}

impl TransactionLog {
    /// Open the log of `store_id` in `log_path`.
    ///
    /// With a checkpoint from the index the existing log is resumed: it must
    /// belong to this store, carry the checkpoint's uuid and still hold every
    /// generation from the checkpoint on. Appends go to a fresh generation.
    /// Without a checkpoint any previous log content is discarded.
    pub fn open(
        store_id: &str,
        log_path: &Path,
        mappings: Mappings,
        checkpoint: Option<Checkpoint>,
        config: TranslogConfig,
    ) -> Result<Self, LogError> {
        fs::create_dir_all(log_path).map_err(LogError::io(log_path))?;

        let state = match checkpoint {
            Some(checkpoint) => Self::resume(store_id, log_path, &checkpoint)?,
            None => Self::create(store_id, log_path)?,
        };

        let current = GenerationWriter::create(log_path, &state.uuid, state.generation)?;
        state.write(log_path)?;

        log::info!(
            "opened translog {} for '{}' at generation {} (oldest {})",
            state.uuid,
            store_id,
            state.generation,
            state.min_generation
        );

        Ok(Self {
            log_path: log_path.to_path_buf(),
            mappings,
            config,
            state,
            current: Some(current),
        })
    }

    fn create(store_id: &str, log_path: &Path) -> Result<LogState, LogError> {
        for generation in list_generations(log_path)? {
            let path = generation_path(log_path, generation);
            fs::remove_file(&path).map_err(LogError::io(&path))?;
        }

        Ok(LogState {
            store_id: store_id.to_string(),
            uuid: Uuid::new_v4(),
            generation: 1,
            min_generation: 1,
        })
    }

    fn resume(store_id: &str, log_path: &Path, checkpoint: &Checkpoint) -> Result<LogState, LogError> {
        let mut state = LogState::read(log_path)?.ok_or_else(|| {
            LogError::InvalidCheckpoint(format!(
                "index expects translog {} but {} has no state file",
                checkpoint.log_uuid,
                log_path.display()
            ))
        })?;

        if state.store_id != store_id {
            return Err(LogError::StoreMismatch {
                expected: store_id.to_string(),
                found: state.store_id,
            });
        }
        if state.uuid != checkpoint.log_uuid {
            return Err(LogError::UuidMismatch {
                expected: checkpoint.log_uuid.to_string(),
                found: state.uuid.to_string(),
            });
        }
        if checkpoint.generation < state.min_generation || checkpoint.generation > state.generation {
            return Err(LogError::InvalidCheckpoint(format!(
                "generation {} outside of the log's range {}..={}",
                checkpoint.generation, state.min_generation, state.generation
            )));
        }

        for generation in checkpoint.generation..=state.generation {
            if !generation_path(log_path, generation).exists() {
                return Err(LogError::MissingGeneration(generation));
            }
        }

        state.generation += 1;
        Ok(state)
    }

    pub fn uuid(&self) -> Uuid {
        self.state.uuid
    }

    pub fn store_id(&self) -> &str {
        &self.state.store_id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn mappings(&self) -> &Mappings {
        &self.mappings
    }

    /// Generation new records are appended to
    pub fn current_generation(&self) -> u64 {
        self.state.generation
    }

    pub fn min_generation(&self) -> u64 {
        self.state.min_generation
    }

    pub fn is_closed(&self) -> bool {
        self.current.is_none()
    }

    fn writer(&mut self) -> Result<&mut GenerationWriter, LogError> {
        self.current.as_mut().ok_or(LogError::Closed)
    }

    /// Append one record. Durable on return when `sync_on_append` is set.
    pub fn add_operation(&mut self, record: &LogRecord) -> Result<(), LogError> {
        self.mappings.check_record(record)?;
        let frame = encode_frame(record, self.config.max_record_bytes)?;
        let sync = self.config.sync_on_append;
        self.writer()?.append(&frame, sync)
    }

    /// Fsync everything appended so far
    pub fn sync(&mut self) -> Result<(), LogError> {
        self.writer()?.sync()
    }

    /// Seal the current generation and start the next one.
    ///
    /// Appends only move to the new generation once the state file names it;
    /// on failure they keep going to the current one.
    fn roll_generation(&mut self) -> Result<u64, LogError> {
        self.writer()?.sync()?;

        let next = LogState {
            generation: self.state.generation + 1,
            ..self.state.clone()
        };
        let writer = GenerationWriter::create(&self.log_path, &next.uuid, next.generation)?;
        next.write(&self.log_path)?;

        let generation = next.generation;
        self.current = Some(writer);
        self.state = next;
        Ok(generation)
    }

    /// Commit `writer` and bind the commit to this log.
    ///
    /// Does nothing when the writer has no changes and its last commit is
    /// already stamped by this log. A writer without changes whose last
    /// commit carries no checkpoint of this log is still committed, so a
    /// fresh or foreign-stamped index gets bound to the log on its first
    /// call. If the index commit fails the previous checkpoint stays in
    /// force and no generation is removed.
    pub fn commit<W: Writer + ?Sized>(&mut self, writer: &mut W) -> Result<bool, LogError> {
        self.commit_with(writer, false)
    }

    /// With `force` the checkpoint moves forward even when nothing changed.
    fn commit_with<W: Writer + ?Sized>(&mut self, writer: &mut W, force: bool) -> Result<bool, LogError> {
        if self.is_closed() {
            return Err(LogError::Closed);
        }

        let stamped = Checkpoint::from_metadata(&writer.current_commit_metadata())?
            .is_some_and(|cp| cp.log_uuid == self.state.uuid);
        if stamped && !force && !writer.has_uncommitted_changes() {
            return Ok(false);
        }

        let generation = self.roll_generation()?;
        let checkpoint = Checkpoint {
            generation,
            log_uuid: self.state.uuid,
        };

        let mut metadata = writer.current_commit_metadata();
        checkpoint.write_to(&mut metadata);
        writer.set_commit_metadata(metadata);
        writer
            .commit()
            .map_err(|source| LogError::Writer { phase: "commit", source })?;

        log::debug!("index committed at translog generation {}", generation);
        self.trim(generation);
        Ok(true)
    }

    /// Forget generations the index no longer needs. Failures only cost disk
    /// space, so they are logged and otherwise ignored.
    fn trim(&mut self, committed: u64) {
        let new_min = committed
            .saturating_sub(self.config.retained_generations)
            .max(1);
        let old_min = self.state.min_generation;
        if new_min <= old_min {
            return;
        }

        self.state.min_generation = new_min;
        if let Err(e) = self.state.write(&self.log_path) {
            log::warn!("failed to persist translog state: {}", e);
            self.state.min_generation = old_min;
            return;
        }

        for generation in old_min..new_min {
            let path = generation_path(&self.log_path, generation);
            match fs::remove_file(&path) {
                Ok(()) => log::debug!("removed translog generation {}", generation),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("failed to remove {}: {}", path.display(), e),
            }
        }
    }

    /// Read every record from generation `from` to the current one
    pub fn snapshot(&mut self, from: u64) -> Result<Snapshot, LogError> {
        if from < self.state.min_generation {
            return Err(LogError::MissingGeneration(from));
        }
        self.sync()?;

        let mut snapshot = Snapshot::default();
        for generation in from..=self.state.generation {
            let records = read_generation(
                &self.log_path,
                &self.state.uuid,
                generation,
                self.config.max_record_bytes,
            )?;
            snapshot.generations.push(generation);
            snapshot.records.extend(records);
        }
        Ok(snapshot)
    }

    /// Replay everything the writer's last commit has not seen.
    ///
    /// Safe to run again after a crash part way through: until the closing
    /// commit succeeds the checkpoint still points at the same records.
    pub fn recover_from_translog<W, S>(&mut self, writer: &mut W, searcher: &S) -> Result<RecoveryStats, LogError>
    where
        W: DocumentWriter + ?Sized,
        S: Searcher + ?Sized,
    {
        let checkpoint = Checkpoint::from_metadata(&writer.current_commit_metadata())?
            .ok_or_else(|| LogError::InvalidCheckpoint("index commit carries no translog checkpoint".to_string()))?;
        if checkpoint.log_uuid != self.state.uuid {
            return Err(LogError::UuidMismatch {
                expected: checkpoint.log_uuid.to_string(),
                found: self.state.uuid.to_string(),
            });
        }

        let snapshot = self.snapshot(checkpoint.generation)?;
        let mut stats = RecoveryStats {
            generations: snapshot.generations.len(),
            ..Default::default()
        };

        for record in snapshot {
            stats.records += 1;
            self.mappings.check_record(&record)?;
            for operation in record.into_operations() {
                operation
                    .execute(writer, searcher)
                    .map_err(|source| LogError::Writer { phase: "replay", source })?;
                stats.operations += 1;
            }
        }

        // Even records that changed nothing must not be read again
        if stats.records > 0 {
            stats.committed = self.commit_with(writer, true)?;
        }

        log::info!(
            "recovered {} records ({} operations) from {} translog generations",
            stats.records,
            stats.operations,
            stats.generations
        );
        Ok(stats)
    }

    /// Sync and release the active generation. Further calls are no-ops.
    pub fn close(&mut self) -> Result<(), LogError> {
        match self.current.take() {
            Some(mut writer) => {
                writer.sync()?;
                log::debug!("closed translog {}", self.state.uuid);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for TransactionLog {
    fn drop(&mut self) {
        if let Some(mut writer) = self.current.take() {
            if let Err(e) = writer.sync() {
                log::warn!("failed to sync translog on drop: {}", e);
            }
        }
    }
}

/// Contents of one generation as seen by [`inspect`]
#[derive(Debug, Clone)]
pub struct GenerationDump {
    pub generation: u64,
    pub records: Vec<LogRecord>,
}

/// Read a log directory without opening it for writing
pub fn inspect(log_path: &Path, max_record_bytes: usize) -> Result<(LogState, Vec<GenerationDump>), LogError> {
    let state = LogState::read(log_path)?.ok_or_else(|| {
        LogError::InvalidCheckpoint(format!("{} has no translog state file", log_path.display()))
    })?;

    let mut dumps = Vec::new();
    for generation in list_generations(log_path)? {
        let records = read_generation(log_path, &state.uuid, generation, max_record_bytes)?;
        dumps.push(GenerationDump { generation, records });
    }
    Ok((state, dumps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::Document;
    use tempfile::TempDir;

    fn open_fresh(dir: &TempDir) -> TransactionLog {
        TransactionLog::open(
            "test",
            dir.path(),
            Mappings::dynamic(),
            None,
            TranslogConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_fresh_log_starts_at_generation_one() {
        let dir = TempDir::new().unwrap();
        let log = open_fresh(&dir);
        assert_eq!(log.current_generation(), 1);
        assert_eq!(log.min_generation(), 1);
        assert!(dir.path().join("translog-1.tlog").exists());
        assert!(dir.path().join("translog.ckp").exists());
    }

    #[test]
    fn test_fresh_open_discards_old_generations() {
        let dir = TempDir::new().unwrap();
        let first = {
            let mut log = open_fresh(&dir);
            log.add_operation(&LogRecord::delete("x")).unwrap();
            log.uuid()
        };

        let mut log = open_fresh(&dir);
        assert_ne!(log.uuid(), first);
        assert!(log.snapshot(1).unwrap().records.is_empty());
    }

    #[test]
    fn test_snapshot_sees_appended_records() {
        let dir = TempDir::new().unwrap();
        let mut log = open_fresh(&dir);
        let record = LogRecord::put("a", Document::new("concept"));
        log.add_operation(&record).unwrap();

        let snapshot = log.snapshot(1).unwrap();
        assert_eq!(snapshot.generations, vec![1]);
        assert_eq!(snapshot.records, vec![record]);
    }

    #[test]
    fn test_resume_requires_matching_uuid() {
        let dir = TempDir::new().unwrap();
        open_fresh(&dir).close().unwrap();

        let foreign = Checkpoint {
            generation: 1,
            log_uuid: Uuid::new_v4(),
        };
        let err = TransactionLog::open(
            "test",
            dir.path(),
            Mappings::dynamic(),
            Some(foreign),
            TranslogConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, LogError::UuidMismatch { .. }));
    }

    #[test]
    fn test_resume_requires_same_store() {
        let dir = TempDir::new().unwrap();
        let mut log = open_fresh(&dir);
        let checkpoint = Checkpoint {
            generation: 1,
            log_uuid: log.uuid(),
        };
        log.close().unwrap();

        let err = TransactionLog::open(
            "other",
            dir.path(),
            Mappings::dynamic(),
            Some(checkpoint),
            TranslogConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, LogError::StoreMismatch { .. }));
    }

    #[test]
    fn test_resume_detects_missing_generation() {
        let dir = TempDir::new().unwrap();
        let mut log = open_fresh(&dir);
        let checkpoint = Checkpoint {
            generation: 1,
            log_uuid: log.uuid(),
        };
        log.close().unwrap();
        fs::remove_file(dir.path().join("translog-1.tlog")).unwrap();

        let err = TransactionLog::open(
            "test",
            dir.path(),
            Mappings::dynamic(),
            Some(checkpoint),
            TranslogConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, LogError::MissingGeneration(1)));
    }

    #[test]
    fn test_resume_appends_to_new_generation() {
        let dir = TempDir::new().unwrap();
        let mut log = open_fresh(&dir);
        log.add_operation(&LogRecord::delete("a")).unwrap();
        let checkpoint = Checkpoint {
            generation: 1,
            log_uuid: log.uuid(),
        };
        log.close().unwrap();

        let mut log = TransactionLog::open(
            "test",
            dir.path(),
            Mappings::dynamic(),
            Some(checkpoint),
            TranslogConfig::default(),
        )
        .unwrap();
        assert_eq!(log.current_generation(), 2);
        log.add_operation(&LogRecord::delete("b")).unwrap();

        let snapshot = log.snapshot(1).unwrap();
        assert_eq!(snapshot.generations, vec![1, 2]);
        assert_eq!(
            snapshot.records,
            vec![LogRecord::delete("a"), LogRecord::delete("b")]
        );
    }

    #[test]
    fn test_closed_log_rejects_appends() {
        let dir = TempDir::new().unwrap();
        let mut log = open_fresh(&dir);
        log.close().unwrap();
        log.close().unwrap();
        assert!(matches!(
            log.add_operation(&LogRecord::delete("a")),
            Err(LogError::Closed)
        ));
    }

    #[test]
    fn test_unmapped_record_not_logged() {
        let dir = TempDir::new().unwrap();
        let mut log = TransactionLog::open(
            "test",
            dir.path(),
            Mappings::new(["concept"]),
            None,
            TranslogConfig::default(),
        )
        .unwrap();

        let err = log
            .add_operation(&LogRecord::put("a", Document::new("member")))
            .unwrap_err();
        assert!(matches!(err, LogError::UnmappedType(_)));
        assert!(log.snapshot(1).unwrap().records.is_empty());
    }

    #[test]
    fn test_inspect_lists_generations() {
        let dir = TempDir::new().unwrap();
        let mut log = open_fresh(&dir);
        log.add_operation(&LogRecord::delete("a")).unwrap();
        log.close().unwrap();

        let (state, dumps) = inspect(dir.path(), 1024).unwrap();
        assert_eq!(state.store_id, "test");
        assert_eq!(dumps.len(), 1);
        assert_eq!(dumps[0].records, vec![LogRecord::delete("a")]);
    }
}
