//! Reference segmented store: immutable segment files, per-generation
//! liveness bitmaps and JSON commit points.

pub mod api;
pub mod reader;
pub mod searcher;
pub mod stats;
pub mod types;
pub mod writer;

pub use api::*;
pub use reader::{list_commits, SegmentReader, StoreCommit, StoreCommitReader};
pub use searcher::StoreSearcher;
pub use types::*;
pub use writer::StoreWriter;

pub(crate) const SEGMENTS_DIR: &str = "segments";
pub(crate) const COMMITS_DIR: &str = "commits";

pub(crate) const SEGMENT_MAGIC: &[u8; 4] = b"RVSG";
pub(crate) const SEGMENT_VERSION: u32 = 1;
pub(crate) const LIVE_DOCS_MAGIC: &[u8; 4] = b"RVLV";
