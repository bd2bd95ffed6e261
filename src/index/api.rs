//! Interfaces between the diff/translog core and whatever index sits under it.
//!
//! The core never owns these values: commits, writers and searchers are
//! created by the caller and only borrowed for one diff or one recovery pass.
//! Readers the core opens itself are always closed before it returns.

use crate::index::types::{CommitMetadata, Document, SegmentManifest};
use roaring::RoaringBitmap;
use std::collections::BTreeSet;
use std::io;

/// Immutable point-in-time snapshot of an index
pub trait Commit {
    type Reader: CommitReader;

    /// Short label for logs and error messages
    fn label(&self) -> String;

    /// Segments of this commit in their on-disk order
    fn segment_manifests(&self) -> &[SegmentManifest];

    /// Every file the commit references
    fn segment_file_names(&self) -> BTreeSet<String> {
        self.segment_manifests()
            .iter()
            .flat_map(|s| s.files().map(str::to_string))
            .collect()
    }

    fn open_for_read(&self) -> io::Result<Self::Reader>;
}

/// Open set of segment readers over one commit
pub trait CommitReader {
    type Segment: SegmentView + Sync;

    fn segments(&self) -> &[Self::Segment];

    /// Release the readers. Consumes the set so it cannot be used afterwards.
    fn close(self) -> io::Result<()>;
}

/// Read access to one segment of an open commit
pub trait SegmentView {
    fn name(&self) -> &str;

    /// Number of physical document slots, deleted ones included
    fn max_doc(&self) -> u32;

    /// Live slots, `None` when nothing in the segment was ever deleted
    fn live_docs(&self) -> Option<&RoaringBitmap>;

    fn is_live(&self, doc: u32) -> bool {
        match self.live_docs() {
            Some(live) => live.contains(doc),
            None => doc < self.max_doc(),
        }
    }

    /// Per-slot values of a numeric field, `None` if no slot stores it
    fn numeric_field(&self, field: &str) -> io::Result<Option<&[i64]>>;
}

/// The index writer as seen by the translog
pub trait Writer {
    fn has_uncommitted_changes(&self) -> bool;

    /// Metadata to store with the next commit
    fn set_commit_metadata(&mut self, metadata: CommitMetadata);

    fn commit(&mut self) -> io::Result<()>;

    /// Metadata of the last successful commit
    fn current_commit_metadata(&self) -> CommitMetadata;
}

/// Document-level mutations that domain operations execute against
pub trait DocumentWriter: Writer {
    /// Replace every live document indexed under `key`
    fn update_document(&mut self, key: &str, document: Document) -> io::Result<()>;

    fn delete_documents(&mut self, key: &str) -> io::Result<()>;

    fn delete_all(&mut self) -> io::Result<()>;
}

/// Read handle passed through to domain operations. The core never looks inside.
pub trait Searcher {
    /// Number of live documents indexed under `key`
    fn count(&self, key: &str) -> io::Result<usize>;

    fn get(&self, key: &str) -> io::Result<Option<Document>>;
}
