//! Commit-to-commit diffs.
//!
//! A diff walks every document occurrence of the target commit, records how
//! each one relates to the source commit as a [`ChangeFlag`], and classifies
//! the per-id history into exactly one [`ChangeKind`].

pub mod calculator;
pub mod flag;
pub mod index_diff;
pub mod three_way;

pub use calculator::DiffCalculator;
pub use flag::{classify, ChangeFlag, HistoryShape};
pub use index_diff::{IndexDiff, IndexDiffBuilder};
pub use three_way::{merge, ThreeWayIndexDiff};

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a document differs between two commits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Only the target has it
    New,
    /// Both have it and the target rewrote it
    Changed,
    /// The source has it and the target deleted it
    Detached,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::New => f.write_str("new"),
            ChangeKind::Changed => f.write_str("changed"),
            ChangeKind::Detached => f.write_str("detached"),
        }
    }
}

/// Resolution of ids that the two sides of a three-way diff classify differently
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The target side's kind is kept
    #[default]
    TargetWins,
    /// Any disagreement fails the merge
    Strict,
}
