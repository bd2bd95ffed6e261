use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::diff::ChangeKind;
use crate::index::types::DocumentId;

/// Errors raised while releasing readers, kept instead of dropped so the
/// caller sees every failure
#[derive(Debug, Default)]
pub struct CloseErrors(Vec<io::Error>);

impl CloseErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gather the failures out of a batch of close attempts
    pub fn collect<I>(results: I) -> Self
    where
        I: IntoIterator<Item = io::Result<()>>,
    {
        Self(results.into_iter().filter_map(Result::err).collect())
    }

    pub fn push(&mut self, err: io::Error) {
        self.0.push(err);
    }

    pub fn extend(&mut self, other: CloseErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[io::Error] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &io::Error> {
        self.0.iter()
    }
}

impl fmt::Display for CloseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for CloseErrors {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.first().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

fn suppressed_suffix(suppressed: &CloseErrors) -> String {
    if suppressed.is_empty() {
        String::new()
    } else {
        format!(" ({} close error(s) suppressed: {})", suppressed.len(), suppressed)
    }
}

/// Which side of a comparison a commit plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitRole {
    Source,
    Target,
}

impl fmt::Display for CommitRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitRole::Source => f.write_str("source"),
            CommitRole::Target => f.write_str("target"),
        }
    }
}

/// Failure of a diff calculation. Never retried automatically.
#[derive(Debug, Error)]
pub enum DiffError {
    #[error("failed to open {role} commit '{commit}': {source}{}", suppressed_suffix(.suppressed))]
    Open {
        role: CommitRole,
        commit: String,
        #[source]
        source: io::Error,
        suppressed: CloseErrors,
    },

    #[error("failed to read segment '{segment}' of the {role} commit: {source}{}", suppressed_suffix(.suppressed))]
    Read {
        role: CommitRole,
        segment: String,
        #[source]
        source: io::Error,
        suppressed: CloseErrors,
    },

    #[error("diff finished but releasing commit readers failed: {0}")]
    Close(#[source] CloseErrors),

    #[error(transparent)]
    MergeConflict(#[from] MergeConflictError),
}

impl DiffError {
    /// Chain cleanup failures onto the primary error
    pub(crate) fn with_suppressed(mut self, more: CloseErrors) -> Self {
        match &mut self {
            DiffError::Open { suppressed, .. } | DiffError::Read { suppressed, .. } => {
                suppressed.extend(more)
            }
            DiffError::Close(errors) => errors.extend(more),
            DiffError::MergeConflict(_) => {}
        }
        self
    }

    /// Close errors raised while unwinding after the primary failure
    pub fn suppressed(&self) -> &[io::Error] {
        match self {
            DiffError::Open { suppressed, .. } | DiffError::Read { suppressed, .. } => {
                suppressed.as_slice()
            }
            DiffError::Close(_) | DiffError::MergeConflict(_) => &[],
        }
    }
}

/// A document is absent from every set of a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("document {0} is not part of this diff")]
pub struct NotFoundError(pub DocumentId);

/// One document classified differently by the two sides of a three-way diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    pub id: DocumentId,
    pub source: ChangeKind,
    pub target: ChangeKind,
}

/// Raised by the strict merge policy only
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} document(s) changed incompatibly on both sides, first is {}", .conflicts.len(), first_conflict(.conflicts))]
pub struct MergeConflictError {
    pub conflicts: Vec<Conflict>,
}

fn first_conflict(conflicts: &[Conflict]) -> String {
    conflicts
        .first()
        .map(|c| format!("{} ({:?} vs {:?})", c.id, c.source, c.target))
        .unwrap_or_default()
}

/// A domain operation that has no translog representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation '{0}' cannot be written to the translog")]
pub struct UnsupportedOperationError(pub &'static str);

/// Translog failures. A failed commit leaves the pre-commit checkpoint
/// authoritative.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("translog I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("index writer failed during {phase}: {source}")]
    Writer {
        phase: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("translog corrupted in '{path}': {reason}")]
    Corrupted { path: PathBuf, reason: String },

    #[error("translog uuid mismatch: index expects {expected}, log is {found}")]
    UuidMismatch { expected: String, found: String },

    #[error("translog belongs to store '{found}', not '{expected}'")]
    StoreMismatch { expected: String, found: String },

    #[error("translog generation {0} is missing")]
    MissingGeneration(u64),

    #[error("invalid translog checkpoint: {0}")]
    InvalidCheckpoint(String),

    #[error("document type '{0}' is not mapped for this store")]
    UnmappedType(String),

    #[error("record of {size} bytes exceeds the {limit} byte limit")]
    RecordTooLarge { size: usize, limit: usize },

    #[error("failed to encode translog record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedOperationError),

    #[error("translog is closed")]
    Closed,
}

impl LogError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> LogError {
        let path = path.into();
        move |source| LogError::Io { path, source }
    }
}

/// Errors surfaced by the store facade and its configuration
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config '{path}': {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Commit generation {0} not found")]
    CommitNotFound(u64),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedOperationError),

    #[error(transparent)]
    Diff(#[from] DiffError),
}
