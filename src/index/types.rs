use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Logical document identifier, stable across commits and segment merges
pub type DocumentId = u64;

/// Commit generation number (monotonic per index directory)
pub type CommitGeneration = u64;

/// Key/value metadata stamped on an index commit
pub type CommitMetadata = BTreeMap<String, String>;

/// Numeric field holding the comparison key of a relevant write
pub const COMPARE_FIELD: &str = "compare_id";

/// Numeric field holding the comparison key of an administratively ignored write
pub const COMPARE_IGNORE_FIELD: &str = "compare_ignore_id";

/// A stored document. The key it is indexed under lives in the segment, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_type: String,
    #[serde(default)]
    pub numeric: BTreeMap<String, i64>,
    #[serde(default)]
    pub source: serde_json::Value,
}

impl Document {
    pub fn new(doc_type: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            numeric: BTreeMap::new(),
            source: serde_json::Value::Null,
        }
    }

    pub fn with_numeric(mut self, field: impl Into<String>, value: i64) -> Self {
        self.numeric.insert(field.into(), value);
        self
    }

    /// Mark this write as a user-visible change of `id`
    pub fn relevant(self, id: DocumentId) -> Self {
        self.with_numeric(COMPARE_FIELD, id as i64)
    }

    /// Mark this write as an administrative rewrite of `id` that diffs ignore
    pub fn ignored(self, id: DocumentId) -> Self {
        self.with_numeric(COMPARE_IGNORE_FIELD, id as i64)
    }

    pub fn with_source(mut self, source: serde_json::Value) -> Self {
        self.source = source;
        self
    }

    pub fn numeric(&self, field: &str) -> Option<i64> {
        self.numeric.get(field).copied()
    }
}

/// Files making up one segment in a commit.
///
/// The core files are written once and never touched again; deletions only
/// ever produce a new liveness file generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentManifest {
    pub name: String,
    pub max_doc: u32,
    pub core_files: BTreeSet<String>,
    #[serde(default)]
    pub live_docs_file: Option<String>,
    #[serde(default)]
    pub del_count: u32,
}

impl SegmentManifest {
    /// Two manifests describe the same physical segment data
    pub fn same_core(&self, other: &SegmentManifest) -> bool {
        self.name == other.name && self.core_files == other.core_files
    }

    /// Every file referenced by this segment, liveness included
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.core_files
            .iter()
            .map(String::as_str)
            .chain(self.live_docs_file.as_deref())
    }

    pub fn live_count(&self) -> u32 {
        self.max_doc - self.del_count
    }
}

/// Commit point stored as `commits/commit-<generation>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitManifest {
    pub version: u32,
    pub generation: CommitGeneration,
    /// Commit the writer was opened on, if any
    #[serde(default)]
    pub parent: Option<CommitGeneration>,
    pub segments: Vec<SegmentManifest>,
    #[serde(default)]
    pub metadata: CommitMetadata,
    pub created_at: u64,
}

impl CommitManifest {
    pub const VERSION: u32 = 1;

    pub fn live_count(&self) -> u64 {
        self.segments.iter().map(|s| s.live_count() as u64).sum()
    }

    pub fn max_doc(&self) -> u64 {
        self.segments.iter().map(|s| s.max_doc as u64).sum()
    }
}
