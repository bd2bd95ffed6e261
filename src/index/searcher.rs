use crate::index::api::{Commit, CommitReader, Searcher, SegmentView};
use crate::index::reader::{SegmentReader, StoreCommit, StoreCommitReader};
use crate::index::types::{CommitGeneration, Document};
use std::io;
use std::path::Path;

/// Point-in-time key lookups over one commit of a store
pub struct StoreSearcher {
    generation: Option<CommitGeneration>,
    reader: Option<StoreCommitReader>,
}

impl StoreSearcher {
    /// Search the latest commit. A store without commits searches as empty.
    pub fn open_latest(index_path: &Path) -> io::Result<Self> {
        match StoreCommit::latest(index_path)? {
            Some(commit) => Self::open(&commit),
            None => Ok(Self {
                generation: None,
                reader: None,
            }),
        }
    }

    pub fn open(commit: &StoreCommit) -> io::Result<Self> {
        Ok(Self {
            generation: Some(commit.generation()),
            reader: Some(commit.open_for_read()?),
        })
    }

    pub fn generation(&self) -> Option<CommitGeneration> {
        self.generation
    }

    fn segments(&self) -> &[SegmentReader] {
        match &self.reader {
            Some(reader) => reader.segments(),
            None => &[],
        }
    }

    /// Keys of all live documents, in segment order
    pub fn live_keys(&self) -> Vec<&str> {
        self.segments()
            .iter()
            .flat_map(|s| s.live_slots().filter_map(move |doc| s.key(doc)))
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.segments()
            .iter()
            .map(|s| s.live_slots().count())
            .sum()
    }
}

impl Searcher for StoreSearcher {
    fn count(&self, key: &str) -> io::Result<usize> {
        Ok(self
            .segments()
            .iter()
            .map(|s| s.live_slots().filter(|&doc| s.key(doc) == Some(key)).count())
            .sum())
    }

    /// Newest live version stored under `key`
    fn get(&self, key: &str) -> io::Result<Option<Document>> {
        for segment in self.segments().iter().rev() {
            let hit = segment
                .live_slots()
                .filter(|&doc| segment.key(doc) == Some(key))
                .last();
            if let Some(doc) = hit {
                return segment.document(doc).map(Some);
            }
        }
        Ok(None)
    }
}
