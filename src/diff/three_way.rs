use crate::diff::calculator::DiffCalculator;
use crate::diff::index_diff::IndexDiff;
use crate::diff::{ChangeKind, MergePolicy};
use crate::error::{Conflict, DiffError, MergeConflictError};
use crate::index::api::Commit;
use crate::index::types::DocumentId;
use roaring::RoaringTreemap;

/// Reconcile two diffs taken from the same ancestor.
///
/// Ids classified by one side only keep that classification. Ids both sides
/// agree on keep the common kind. Disagreements are settled by `policy`.
pub fn merge(
    source: &IndexDiff,
    target: &IndexDiff,
    policy: MergePolicy,
) -> Result<IndexDiff, MergeConflictError> {
    let mut conflicts = Vec::new();
    let mut builder = IndexDiff::builder();

    // Target last so it takes precedence on overlapping ids
    builder.extend(source.iter_changes());
    for (id, kind) in target.iter_changes() {
        if let Ok(theirs) = source.get_change(id) {
            if theirs != kind {
                conflicts.push(Conflict {
                    id,
                    source: theirs,
                    target: kind,
                });
            }
        }
        builder.insert(id, kind);
    }

    if policy == MergePolicy::Strict && !conflicts.is_empty() {
        conflicts.sort_by_key(|c| c.id);
        return Err(MergeConflictError { conflicts });
    }
    if !conflicts.is_empty() {
        log::debug!("{} conflicting ids resolved in favour of the target", conflicts.len());
    }
    Ok(builder.build())
}

/// Diffs of two descendants against their common ancestor, plus their merge
#[derive(Debug, Clone, PartialEq)]
pub struct ThreeWayIndexDiff {
    source_diff: IndexDiff,
    target_diff: IndexDiff,
    merged: IndexDiff,
}

impl ThreeWayIndexDiff {
    /// Compute both one-way diffs concurrently and merge them with the
    /// default policy
    pub fn calculate<A, S, T>(
        calculator: &DiffCalculator,
        ancestor: &A,
        source: &S,
        target: &T,
    ) -> Result<Self, DiffError>
    where
        A: Commit + Sync,
        S: Commit + Sync,
        T: Commit + Sync,
    {
        Self::calculate_with(calculator, ancestor, source, target, MergePolicy::default())
    }

    pub fn calculate_with<A, S, T>(
        calculator: &DiffCalculator,
        ancestor: &A,
        source: &S,
        target: &T,
        policy: MergePolicy,
    ) -> Result<Self, DiffError>
    where
        A: Commit + Sync,
        S: Commit + Sync,
        T: Commit + Sync,
    {
        let (source_diff, target_diff) = rayon::join(
            || calculator.calculate_diff(ancestor, source),
            || calculator.calculate_diff(ancestor, target),
        );
        Self::from_diffs(source_diff?, target_diff?, policy)
    }

    /// Merge two diffs that were computed elsewhere
    pub fn from_diffs(
        source_diff: IndexDiff,
        target_diff: IndexDiff,
        policy: MergePolicy,
    ) -> Result<Self, DiffError> {
        let merged = merge(&source_diff, &target_diff, policy)?;
        Ok(Self {
            source_diff,
            target_diff,
            merged,
        })
    }

    pub fn source_diff(&self) -> &IndexDiff {
        &self.source_diff
    }

    pub fn target_diff(&self) -> &IndexDiff {
        &self.target_diff
    }

    pub fn merged(&self) -> &IndexDiff {
        &self.merged
    }

    pub fn new_ids(&self) -> &RoaringTreemap {
        self.merged.new_ids()
    }

    pub fn changed_ids(&self) -> &RoaringTreemap {
        self.merged.changed_ids()
    }

    pub fn detached_ids(&self) -> &RoaringTreemap {
        self.merged.detached_ids()
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.merged.contains(id)
    }

    pub fn get_change(&self, id: DocumentId) -> Result<ChangeKind, crate::error::NotFoundError> {
        self.merged.get_change(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.merged.iter()
    }

    pub fn len(&self) -> u64 {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }
}
