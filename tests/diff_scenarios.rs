//! Diffs between commits of a real store directory, covering new, changed
//! and detached documents across a linear history and across two branches.

use revidx::diff::{ChangeKind, DiffCalculator, IndexDiff, MergePolicy, ThreeWayIndexDiff};
use revidx::error::DiffError;
use revidx::index::{Document, DocumentWriter, StoreCommit, StoreWriter, Writer};
use std::path::Path;
use tempfile::TempDir;

/// Each call is one batch and ends up as its own segment
fn index(writer: &mut StoreWriter, ids: &[u64]) {
    for &id in ids {
        writer
            .update_document(&id.to_string(), Document::new("concept").relevant(id))
            .unwrap();
    }
    writer.flush().unwrap();
}

/// Administrative rewrite of the same documents
fn ignore(writer: &mut StoreWriter, ids: &[u64]) {
    for &id in ids {
        writer
            .update_document(&id.to_string(), Document::new("concept").ignored(id))
            .unwrap();
    }
    writer.flush().unwrap();
}

fn delete(writer: &mut StoreWriter, ids: &[u64]) {
    for &id in ids {
        writer.delete_documents(&id.to_string()).unwrap();
    }
}

fn tag(writer: &mut StoreWriter) -> StoreCommit {
    writer.commit().unwrap();
    writer.last_commit().unwrap()
}

fn ids(set: &roaring::RoaringTreemap) -> Vec<u64> {
    set.iter().collect()
}

fn assert_diff(diff: &IndexDiff, new: &[u64], changed: &[u64], detached: &[u64]) {
    assert_eq!(ids(diff.new_ids()), new, "new");
    assert_eq!(ids(diff.changed_ids()), changed, "changed");
    assert_eq!(ids(diff.detached_ids()), detached, "detached");
}

struct History {
    _dir: TempDir,
    tags: Vec<StoreCommit>,
    head: StoreCommit,
}

/// Seven commits: v1..v6 plus a head
fn build_history() -> History {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = StoreWriter::open(&dir.path().join("index")).unwrap();
    let mut tags = Vec::new();

    index(&mut writer, &[10, 1, 2]);
    tags.push(tag(&mut writer));

    index(&mut writer, &[3, 4, 6, 7, 1, 2]);
    ignore(&mut writer, &[10]);
    tags.push(tag(&mut writer));

    delete(&mut writer, &[6, 7]);
    ignore(&mut writer, &[4]);
    tags.push(tag(&mut writer));

    index(&mut writer, &[5, 1]);
    delete(&mut writer, &[2]);
    tags.push(tag(&mut writer));

    index(&mut writer, &[3]);
    ignore(&mut writer, &[1]);
    ignore(&mut writer, &[5]);
    tags.push(tag(&mut writer));

    index(&mut writer, &[3]);
    ignore(&mut writer, &[10]);
    tags.push(tag(&mut writer));

    index(&mut writer, &[8, 10]);
    delete(&mut writer, &[1, 5]);
    let head = tag(&mut writer);

    History {
        _dir: dir,
        tags,
        head,
    }
}

impl History {
    fn diff(&self, source: usize, target: Option<usize>) -> IndexDiff {
        let source = &self.tags[source - 1];
        let calculator = DiffCalculator::new();
        match target {
            Some(target) => calculator.calculate_diff(source, &self.tags[target - 1]),
            None => calculator.calculate_diff(source, &self.head),
        }
        .unwrap()
    }
}

#[test]
fn test_linear_history() {
    let history = build_history();
    assert_eq!(history.tags.len(), 6);

    #[rustfmt::skip]
    let cases: &[(usize, Option<usize>, &[u64], &[u64], &[u64])] = &[
        (1, Some(2), &[3, 4, 6, 7], &[1, 2], &[]),
        (1, Some(3), &[3, 4], &[1, 2], &[]),
        (1, Some(4), &[3, 4, 5], &[1], &[2]),
        (1, Some(5), &[3, 4, 5], &[1], &[2]),
        (1, Some(6), &[3, 4, 5], &[1], &[2]),
        (1, None, &[3, 4, 8], &[10], &[1, 2]),
        (2, Some(3), &[], &[], &[6, 7]),
        (2, Some(4), &[5], &[1], &[2, 6, 7]),
        (2, Some(5), &[5], &[1, 3], &[2, 6, 7]),
        (2, Some(6), &[5], &[1, 3], &[2, 6, 7]),
        (2, None, &[8], &[3, 10], &[1, 2, 6, 7]),
        (3, Some(4), &[5], &[1], &[2]),
        (3, Some(5), &[5], &[1, 3], &[2]),
        (3, Some(6), &[5], &[1, 3], &[2]),
        (3, None, &[8], &[3, 10], &[1, 2]),
        (4, Some(5), &[], &[3], &[]),
        (4, Some(6), &[], &[3], &[]),
        (4, None, &[8], &[3, 10], &[1, 5]),
        (5, Some(6), &[], &[3], &[]),
        (5, None, &[8], &[3, 10], &[1, 5]),
        (6, None, &[8], &[10], &[1, 5]),
    ];

    for &(source, target, new, changed, detached) in cases {
        let diff = history.diff(source, target);
        assert_eq!(ids(diff.new_ids()), new, "new ids of v{} -> {:?}", source, target);
        assert_eq!(ids(diff.changed_ids()), changed, "changed ids of v{} -> {:?}", source, target);
        assert_eq!(ids(diff.detached_ids()), detached, "detached ids of v{} -> {:?}", source, target);
    }
}

#[test]
fn test_commit_against_itself_is_empty() {
    let history = build_history();
    for source in 1..=6 {
        assert!(history.diff(source, Some(source)).is_empty());
    }
}

#[test]
fn test_ignored_rewrite_does_not_hide_relevant_change() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = StoreWriter::open(dir.path()).unwrap();

    index(&mut writer, &[1, 2]);
    let before = tag(&mut writer);
    index(&mut writer, &[2]);
    ignore(&mut writer, &[1, 2]);
    let after = tag(&mut writer);

    let diff = DiffCalculator::new().calculate_diff(&before, &after).unwrap();
    assert_diff(&diff, &[], &[2], &[]);
    assert_eq!(diff.get_change(2), Ok(ChangeKind::Changed));
    assert!(diff.get_change(1).is_err());
}

#[test]
fn test_diff_survives_reopening_commits() {
    let dir = tempfile::tempdir().unwrap();
    let index_path = dir.path().join("index");
    let (first, second) = {
        let mut writer = StoreWriter::open(&index_path).unwrap();
        index(&mut writer, &[1, 2]);
        let first = tag(&mut writer).generation();
        index(&mut writer, &[3]);
        delete(&mut writer, &[1]);
        (first, tag(&mut writer).generation())
    };

    let source = StoreCommit::open(&index_path, first).unwrap();
    let target = StoreCommit::open(&index_path, second).unwrap();
    let diff = DiffCalculator::new().calculate_diff(&source, &target).unwrap();
    assert_diff(&diff, &[3], &[], &[1]);
}

struct Branches {
    _dir: TempDir,
    ancestor: StoreCommit,
    source: StoreCommit,
    target: StoreCommit,
}

/// Two writers forked from the same commit, each committing its own branch
fn build_branches() -> Branches {
    let dir = tempfile::tempdir().unwrap();
    let index_path = dir.path().to_path_buf();

    let mut main = StoreWriter::open(&index_path).unwrap();
    index(&mut main, &[1, 2, 3, 6]);
    let ancestor = tag(&mut main);

    let source = branch(&index_path, &ancestor, |w| {
        index(w, &[1, 3, 4]);
        delete(w, &[2, 6]);
    });
    let target = branch(&index_path, &ancestor, |w| {
        index(w, &[1, 2, 5]);
        delete(w, &[3, 6]);
    });

    Branches {
        _dir: dir,
        ancestor,
        source,
        target,
    }
}

fn branch(index_path: &Path, base: &StoreCommit, edit: impl FnOnce(&mut StoreWriter)) -> StoreCommit {
    let mut writer = StoreWriter::open_at(index_path, base.generation()).unwrap();
    edit(&mut writer);
    let commit = tag(&mut writer);
    assert_eq!(commit.manifest().parent, Some(base.generation()));
    commit
}

#[test]
fn test_three_way_target_wins() {
    let b = build_branches();
    let calculator = DiffCalculator::new();
    let three_way = ThreeWayIndexDiff::calculate(&calculator, &b.ancestor, &b.source, &b.target).unwrap();

    assert_diff(three_way.source_diff(), &[4], &[1, 3], &[2, 6]);
    assert_diff(three_way.target_diff(), &[5], &[1, 2], &[3, 6]);
    assert_diff(three_way.merged(), &[4, 5], &[1, 2], &[3, 6]);
    assert_eq!(three_way.len(), 6);

    let direct = calculator.calculate_diff(&b.source, &b.target).unwrap();
    assert_diff(&direct, &[5], &[1, 2], &[]);
}

#[test]
fn test_three_way_strict_reports_conflicts() {
    let b = build_branches();
    let err = ThreeWayIndexDiff::calculate_with(
        &DiffCalculator::new(),
        &b.ancestor,
        &b.source,
        &b.target,
        MergePolicy::Strict,
    )
    .unwrap_err();

    let conflict = match err {
        DiffError::MergeConflict(conflict) => conflict,
        other => panic!("expected a merge conflict, got {other}"),
    };
    let conflicting: Vec<_> = conflict
        .conflicts
        .iter()
        .map(|c| (c.id, c.source, c.target))
        .collect();
    assert_eq!(
        conflicting,
        vec![
            (2, ChangeKind::Detached, ChangeKind::Changed),
            (3, ChangeKind::Changed, ChangeKind::Detached),
        ]
    );
}

#[test]
fn test_three_way_with_target_equal_to_source() {
    let b = build_branches();
    let calculator = DiffCalculator::new();
    let three_way = ThreeWayIndexDiff::calculate(&calculator, &b.ancestor, &b.source, &b.source).unwrap();
    let direct = calculator.calculate_diff(&b.ancestor, &b.source).unwrap();
    assert_eq!(three_way.merged(), &direct);
}
