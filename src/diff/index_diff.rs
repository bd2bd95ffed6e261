use crate::diff::ChangeKind;
use crate::error::NotFoundError;
use crate::index::types::DocumentId;
use roaring::RoaringTreemap;

/// Result of comparing two commits: three disjoint id sets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexDiff {
    new_ids: RoaringTreemap,
    changed_ids: RoaringTreemap,
    detached_ids: RoaringTreemap,
}

impl IndexDiff {
    pub fn builder() -> IndexDiffBuilder {
        IndexDiffBuilder::default()
    }

    pub fn new_ids(&self) -> &RoaringTreemap {
        &self.new_ids
    }

    pub fn changed_ids(&self) -> &RoaringTreemap {
        &self.changed_ids
    }

    pub fn detached_ids(&self) -> &RoaringTreemap {
        &self.detached_ids
    }

    pub fn ids(&self, kind: ChangeKind) -> &RoaringTreemap {
        match kind {
            ChangeKind::New => &self.new_ids,
            ChangeKind::Changed => &self.changed_ids,
            ChangeKind::Detached => &self.detached_ids,
        }
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.new_ids.contains(id) || self.changed_ids.contains(id) || self.detached_ids.contains(id)
    }

    pub fn get_change(&self, id: DocumentId) -> Result<ChangeKind, NotFoundError> {
        if self.new_ids.contains(id) {
            Ok(ChangeKind::New)
        } else if self.changed_ids.contains(id) {
            Ok(ChangeKind::Changed)
        } else if self.detached_ids.contains(id) {
            Ok(ChangeKind::Detached)
        } else {
            Err(NotFoundError(id))
        }
    }

    /// Every id of the diff exactly once, grouped by kind
    pub fn iter(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.new_ids
            .iter()
            .chain(self.changed_ids.iter())
            .chain(self.detached_ids.iter())
    }

    /// Every id with its kind, grouped by kind
    pub fn iter_changes(&self) -> impl Iterator<Item = (DocumentId, ChangeKind)> + '_ {
        tagged(&self.new_ids, ChangeKind::New)
            .chain(tagged(&self.changed_ids, ChangeKind::Changed))
            .chain(tagged(&self.detached_ids, ChangeKind::Detached))
    }

    pub fn len(&self) -> u64 {
        self.new_ids.len() + self.changed_ids.len() + self.detached_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.new_ids.is_empty() && self.changed_ids.is_empty() && self.detached_ids.is_empty()
    }
}

fn tagged(
    set: &RoaringTreemap,
    kind: ChangeKind,
) -> impl Iterator<Item = (DocumentId, ChangeKind)> + '_ {
    set.iter().map(move |id| (id, kind))
}

/// Accumulates classifications. A later insert of the same id replaces the
/// earlier one so the finished sets are always disjoint.
#[derive(Debug, Default)]
pub struct IndexDiffBuilder {
    diff: IndexDiff,
}

impl IndexDiffBuilder {
    pub fn insert(&mut self, id: DocumentId, kind: ChangeKind) -> &mut Self {
        for other in [ChangeKind::New, ChangeKind::Changed, ChangeKind::Detached] {
            if other != kind {
                self.set_mut(other).remove(id);
            }
        }
        self.set_mut(kind).insert(id);
        self
    }

    pub fn extend<I>(&mut self, changes: I) -> &mut Self
    where
        I: IntoIterator<Item = (DocumentId, ChangeKind)>,
    {
        for (id, kind) in changes {
            self.insert(id, kind);
        }
        self
    }

    fn set_mut(&mut self, kind: ChangeKind) -> &mut RoaringTreemap {
        match kind {
            ChangeKind::New => &mut self.diff.new_ids,
            ChangeKind::Changed => &mut self.diff.changed_ids,
            ChangeKind::Detached => &mut self.diff.detached_ids,
        }
    }

    pub fn build(self) -> IndexDiff {
        self.diff
    }
}

impl FromIterator<(DocumentId, ChangeKind)> for IndexDiff {
    fn from_iter<I: IntoIterator<Item = (DocumentId, ChangeKind)>>(iter: I) -> Self {
        let mut builder = IndexDiff::builder();
        builder.extend(iter);
        builder.build()
    }
}
