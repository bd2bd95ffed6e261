use crate::config::StoreConfig;
use crate::diff::{DiffCalculator, IndexDiff, ThreeWayIndexDiff};
use crate::error::StoreError;
use crate::index::api::Writer;
use crate::index::types::CommitGeneration;
use crate::index::{StoreCommit, StoreSearcher, StoreWriter};
use crate::translog::{Checkpoint, Mappings, Operation, RecoveryStats, TransactionLog};
use std::io;
use std::path::{Path, PathBuf};

const INDEX_DIR: &str = "index";
const TRANSLOG_DIR: &str = "translog";

/// One store: an index writer and the translog that protects it.
///
/// Layout under the store root:
/// - `index/`: segments and commit points
/// - `translog/`: generation files and log state
/// - `revidx.json`: optional config
pub struct IndexStore {
    id: String,
    root: PathBuf,
    config: StoreConfig,
    writer: StoreWriter,
    translog: TransactionLog,
    /// Searcher over the last commit, dropped whenever a new commit lands
    searcher: Option<StoreSearcher>,
}

impl IndexStore {
    /// Open a store, loading `revidx.json` from `root` if present
    pub fn open(id: &str, root: &Path) -> Result<Self, StoreError> {
        let config = StoreConfig::load(root)?;
        let mappings = Mappings::new(config.document_types.iter().cloned());
        Self::open_with(id, root, mappings, config)
    }

    /// Open a store with explicit mappings and config.
    ///
    /// Does not replay the translog; call [`IndexStore::recover`] before
    /// accepting writes.
    pub fn open_with(
        id: &str,
        root: &Path,
        mappings: Mappings,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        let mut writer = StoreWriter::open(&Self::index_dir(root))?;
        let checkpoint = Checkpoint::from_metadata(&writer.current_commit_metadata())?;
        let fresh = checkpoint.is_none();

        let mut translog = TransactionLog::open(
            id,
            &Self::translog_dir(root),
            mappings,
            checkpoint,
            config.translog.clone(),
        )?;
        if fresh {
            // Bind the index to the new log before anything is written
            translog.commit(&mut writer)?;
        }

        Ok(Self {
            id: id.to_string(),
            root: root.to_path_buf(),
            config,
            writer,
            translog,
            searcher: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        Self::index_dir(&self.root)
    }

    /// Index directory of the store rooted at `root`
    pub fn index_dir(root: &Path) -> PathBuf {
        root.join(INDEX_DIR)
    }

    pub fn translog_dir(root: &Path) -> PathBuf {
        root.join(TRANSLOG_DIR)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn translog(&self) -> &TransactionLog {
        &self.translog
    }

    /// Direct access to the writer, bypassing the translog
    pub fn writer_mut(&mut self) -> &mut StoreWriter {
        &mut self.writer
    }

    /// Replay operations logged after the last commit
    pub fn recover(&mut self) -> Result<RecoveryStats, StoreError> {
        let index_path = self.index_path();
        let searcher = cached_searcher(&mut self.searcher, &index_path)?;
        let stats = self.translog.recover_from_translog(&mut self.writer, searcher)?;
        if stats.committed {
            self.searcher = None;
        }
        Ok(stats)
    }

    /// Log an operation, then apply it to the writer
    pub fn execute(&mut self, operation: &Operation) -> Result<(), StoreError> {
        for record in operation.to_translog_operation()? {
            self.translog.add_operation(&record)?;
        }
        let index_path = self.index_path();
        let searcher = cached_searcher(&mut self.searcher, &index_path)?;
        operation.execute(&mut self.writer, searcher)?;
        Ok(())
    }

    /// Commit the writer through the translog
    pub fn commit(&mut self) -> Result<bool, StoreError> {
        let committed = self.translog.commit(&mut self.writer)?;
        if committed {
            self.searcher = None;
        }
        Ok(committed)
    }

    /// Searcher over the last commit
    pub fn searcher(&mut self) -> io::Result<&StoreSearcher> {
        let index_path = self.index_path();
        cached_searcher(&mut self.searcher, &index_path)
    }

    pub fn last_generation(&self) -> Option<CommitGeneration> {
        self.writer.last_generation()
    }

    pub fn commit_at(&self, generation: CommitGeneration) -> Result<StoreCommit, StoreError> {
        StoreCommit::open(&self.index_path(), generation).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::CommitNotFound(generation),
            _ => StoreError::Io(e),
        })
    }

    pub fn diff_calculator(&self) -> DiffCalculator {
        DiffCalculator::from_config(&self.config.diff)
    }

    /// Diff two commits of this store
    pub fn diff(&self, source: CommitGeneration, target: CommitGeneration) -> Result<IndexDiff, StoreError> {
        let source = self.commit_at(source)?;
        let target = self.commit_at(target)?;
        Ok(self.diff_calculator().calculate_diff(&source, &target)?)
    }

    /// Three-way diff of two commits against their common ancestor, merged
    /// with the configured policy
    pub fn three_way(
        &self,
        ancestor: CommitGeneration,
        source: CommitGeneration,
        target: CommitGeneration,
    ) -> Result<ThreeWayIndexDiff, StoreError> {
        let ancestor = self.commit_at(ancestor)?;
        let source = self.commit_at(source)?;
        let target = self.commit_at(target)?;
        Ok(ThreeWayIndexDiff::calculate_with(
            &self.diff_calculator(),
            &ancestor,
            &source,
            &target,
            self.config.diff.merge_policy,
        )?)
    }

    /// Close the translog. Index changes not committed are not persisted but
    /// stay replayable from the log.
    pub fn close(mut self) -> Result<(), StoreError> {
        self.translog.close()?;
        Ok(())
    }
}

fn cached_searcher<'a>(
    slot: &'a mut Option<StoreSearcher>,
    index_path: &Path,
) -> io::Result<&'a StoreSearcher> {
    let searcher = match slot.take() {
        Some(searcher) => searcher,
        None => StoreSearcher::open_latest(index_path)?,
    };
    Ok(slot.insert(searcher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::api::Searcher;
    use crate::index::types::Document;

    fn open(dir: &Path) -> IndexStore {
        IndexStore::open_with("test", dir, Mappings::dynamic(), StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_fresh_store_is_stamped() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let metadata = store.writer.current_commit_metadata();
        let checkpoint = Checkpoint::from_metadata(&metadata).unwrap().unwrap();
        assert_eq!(checkpoint.log_uuid, store.translog().uuid());
        assert_eq!(store.last_generation(), Some(1));
    }

    #[test]
    fn test_execute_is_visible_after_commit() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path());
        store
            .execute(&Operation::index("d", Document::new("concept").relevant(1)))
            .unwrap();
        assert_eq!(store.searcher().unwrap().count("d").unwrap(), 0);

        assert!(store.commit().unwrap());
        assert_eq!(store.searcher().unwrap().count("d").unwrap(), 1);
        assert!(!store.commit().unwrap());
    }

    #[test]
    fn test_delete_all_is_rejected_before_touching_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path());
        let err = store.execute(&Operation::DeleteAll).unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
        assert!(!store.writer_mut().has_uncommitted_changes());
    }

    #[test]
    fn test_unknown_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        assert!(matches!(store.commit_at(99), Err(StoreError::CommitNotFound(99))));
    }
}
