use crate::config::DiffConfig;
use crate::diff::flag::{classify, ChangeFlag};
use crate::diff::index_diff::IndexDiff;
use crate::error::{CloseErrors, CommitRole, DiffError};
use crate::index::api::{Commit, CommitReader, SegmentView};
use crate::index::types::{DocumentId, SegmentManifest, COMPARE_FIELD, COMPARE_IGNORE_FIELD};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

/// Per-id occurrence history, in target segment order
type History = FxHashMap<DocumentId, Vec<ChangeFlag>>;

/// Computes [`IndexDiff`]s between pairs of commits.
///
/// Stateless apart from the comparison field names, so one calculator can
/// serve any number of concurrent diffs.
#[derive(Debug, Clone)]
pub struct DiffCalculator {
    compare_field: String,
    ignore_field: String,
}

impl Default for DiffCalculator {
    fn default() -> Self {
        Self {
            compare_field: COMPARE_FIELD.to_string(),
            ignore_field: COMPARE_IGNORE_FIELD.to_string(),
        }
    }
}

impl DiffCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DiffConfig) -> Self {
        Self {
            compare_field: config.compare_field.clone(),
            ignore_field: config.ignore_field.clone(),
        }
    }

    /// Classify every document that differs between `source` and `target`.
    ///
    /// Both commits are opened for the duration of the call and always
    /// released before it returns. Failures to release them are reported
    /// either on their own or attached to the error that aborted the diff.
    pub fn calculate_diff<S, T>(&self, source: &S, target: &T) -> Result<IndexDiff, DiffError>
    where
        S: Commit,
        T: Commit,
    {
        let intersection = intersection(source.segment_manifests(), target.segment_manifests());

        let target_reader = target.open_for_read().map_err(|source_err| DiffError::Open {
            role: CommitRole::Target,
            commit: target.label(),
            source: source_err,
            suppressed: CloseErrors::new(),
        })?;

        let source_reader = match source.open_for_read() {
            Ok(reader) => reader,
            Err(err) => {
                return Err(DiffError::Open {
                    role: CommitRole::Source,
                    commit: source.label(),
                    source: err,
                    suppressed: CloseErrors::collect([target_reader.close()]),
                });
            }
        };

        let scanned = self.scan(&source_reader, &target_reader, &intersection);
        let close_errors = CloseErrors::collect([source_reader.close(), target_reader.close()]);

        let history = match scanned {
            Ok(history) => history,
            Err(err) => return Err(err.with_suppressed(close_errors)),
        };
        if !close_errors.is_empty() {
            return Err(DiffError::Close(close_errors));
        }

        let mut builder = IndexDiff::builder();
        for (&id, flags) in &history {
            if let Some(kind) = classify(flags) {
                builder.insert(id, kind);
            }
        }
        let diff = builder.build();

        log::debug!(
            "diff {} -> {}: {} ids scanned, {} new, {} changed, {} detached",
            source.label(),
            target.label(),
            history.len(),
            diff.new_ids().len(),
            diff.changed_ids().len(),
            diff.detached_ids().len()
        );
        Ok(diff)
    }

    /// Walk the target segments in parallel and merge the results back in order
    fn scan<A, B>(&self, source: &A, target: &B, intersection: &FxHashSet<&str>) -> Result<History, DiffError>
    where
        A: CommitReader,
        B: CommitReader,
    {
        let source_segments: FxHashMap<&str, &A::Segment> =
            source.segments().iter().map(|s| (s.name(), s)).collect();

        let per_segment = target
            .segments()
            .par_iter()
            .map(|segment| {
                let name = segment.name();
                self.scan_segment(
                    segment,
                    source_segments.get(name).copied(),
                    intersection.contains(name),
                )
            })
            .collect::<Result<Vec<_>, DiffError>>()?;

        let mut history = History::default();
        for occurrences in per_segment {
            for (id, flag) in occurrences {
                history.entry(id).or_default().push(flag);
            }
        }
        Ok(history)
    }

    fn scan_segment<A, B>(
        &self,
        target: &B,
        source: Option<&A>,
        intersection: bool,
    ) -> Result<Vec<(DocumentId, ChangeFlag)>, DiffError>
    where
        A: SegmentView,
        B: SegmentView,
    {
        let read_error = |err| DiffError::Read {
            role: CommitRole::Target,
            segment: target.name().to_string(),
            source: err,
            suppressed: CloseErrors::new(),
        };
        let compare = target.numeric_field(&self.compare_field).map_err(read_error)?;
        let ignore = target.numeric_field(&self.ignore_field).map_err(read_error)?;
        if compare.is_none() && ignore.is_none() {
            return Ok(Vec::new());
        }

        let value_at = |column: Option<&[i64]>, doc: u32| {
            column.and_then(|c| c.get(doc as usize)).copied().unwrap_or(0)
        };

        let mut occurrences = Vec::new();
        for doc in 0..target.max_doc() {
            let (id, relevant) = match value_at(compare, doc) {
                key if key > 0 => (key as DocumentId, true),
                _ => match value_at(ignore, doc) {
                    key if key > 0 => (key as DocumentId, false),
                    _ => continue,
                },
            };

            occurrences.push((
                id,
                ChangeFlag {
                    intersection,
                    relevant,
                    live_in_source: source.is_some_and(|s| s.is_live(doc)),
                    live_in_target: target.is_live(doc),
                },
            ));
        }
        Ok(occurrences)
    }
}

/// Names of segments whose core files are identical in both commits
fn intersection<'a>(source: &[SegmentManifest], target: &'a [SegmentManifest]) -> FxHashSet<&'a str> {
    let by_name: FxHashMap<&str, &SegmentManifest> =
        source.iter().map(|s| (s.name.as_str(), s)).collect();

    target
        .iter()
        .filter(|t| by_name.get(t.name.as_str()).is_some_and(|s| s.same_core(t)))
        .map(|t| t.name.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::ChangeKind;
    use roaring::RoaringBitmap;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone)]
    struct FakeSegment {
        manifest: SegmentManifest,
        compare: Vec<i64>,
        live: Option<RoaringBitmap>,
        fail_read: bool,
    }

    impl SegmentView for FakeSegment {
        fn name(&self) -> &str {
            &self.manifest.name
        }

        fn max_doc(&self) -> u32 {
            self.manifest.max_doc
        }

        fn live_docs(&self) -> Option<&RoaringBitmap> {
            self.live.as_ref()
        }

        fn numeric_field(&self, field: &str) -> io::Result<Option<&[i64]>> {
            if self.fail_read {
                return Err(io::Error::other("disk on fire"));
            }
            Ok((field == COMPARE_FIELD).then_some(self.compare.as_slice()))
        }
    }

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    struct FakeCommit {
        name: &'static str,
        segments: Vec<FakeSegment>,
        manifests: Vec<SegmentManifest>,
        fail_open: bool,
        fail_close: bool,
        counters: Arc<Counters>,
    }

    impl FakeCommit {
        fn new(name: &'static str, segments: Vec<FakeSegment>) -> Self {
            Self {
                name,
                manifests: segments.iter().map(|s| s.manifest.clone()).collect(),
                segments,
                fail_open: false,
                fail_close: false,
                counters: Arc::default(),
            }
        }
    }

    struct FakeReader {
        segments: Vec<FakeSegment>,
        fail_close: bool,
        counters: Arc<Counters>,
    }

    impl Commit for FakeCommit {
        type Reader = FakeReader;

        fn label(&self) -> String {
            self.name.to_string()
        }

        fn segment_manifests(&self) -> &[SegmentManifest] {
            &self.manifests
        }

        fn open_for_read(&self) -> io::Result<FakeReader> {
            if self.fail_open {
                return Err(io::Error::new(io::ErrorKind::NotFound, "commit vanished"));
            }
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(FakeReader {
                segments: self.segments.clone(),
                fail_close: self.fail_close,
                counters: self.counters.clone(),
            })
        }
    }

    impl CommitReader for FakeReader {
        type Segment = FakeSegment;

        fn segments(&self) -> &[FakeSegment] {
            &self.segments
        }

        fn close(self) -> io::Result<()> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(io::Error::other("close failed"))
            } else {
                Ok(())
            }
        }
    }

    fn segment(name: &str, compare: Vec<i64>, live: Option<&[u32]>) -> FakeSegment {
        FakeSegment {
            manifest: SegmentManifest {
                name: name.to_string(),
                max_doc: compare.len() as u32,
                core_files: [format!("{}.seg", name)].into_iter().collect(),
                live_docs_file: live.map(|_| format!("{}_1.liv", name)),
                del_count: 0,
            },
            compare,
            live: live.map(|docs| docs.iter().copied().collect()),
            fail_read: false,
        }
    }

    #[test]
    fn test_classifies_target_only_and_deleted_documents() {
        let base = segment("_0", vec![1, 2], None);
        let source = FakeCommit::new("source", vec![base.clone()]);
        let target = FakeCommit::new(
            "target",
            vec![segment("_0", vec![1, 2], Some(&[0])), segment("_1", vec![3, 1], None)],
        );

        let diff = DiffCalculator::new().calculate_diff(&source, &target).unwrap();
        assert_eq!(diff.get_change(3), Ok(ChangeKind::New));
        assert_eq!(diff.get_change(1), Ok(ChangeKind::Changed));
        assert_eq!(diff.get_change(2), Ok(ChangeKind::Detached));
    }

    #[test]
    fn test_same_commit_is_empty() {
        let commit = FakeCommit::new("c", vec![segment("_0", vec![1, 0, 2], Some(&[0, 1]))]);
        let diff = DiffCalculator::new().calculate_diff(&commit, &commit).unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn test_target_released_when_source_open_fails() {
        let mut source = FakeCommit::new("source", vec![]);
        source.fail_open = true;
        let target = FakeCommit::new("target", vec![segment("_0", vec![1], None)]);

        let err = DiffCalculator::new().calculate_diff(&source, &target).unwrap_err();
        assert!(matches!(err, DiffError::Open { role: CommitRole::Source, .. }));
        assert_eq!(target.counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(target.counters.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_target_open_failure_opens_nothing_else() {
        let source = FakeCommit::new("source", vec![]);
        let mut target = FakeCommit::new("target", vec![]);
        target.fail_open = true;

        let err = DiffCalculator::new().calculate_diff(&source, &target).unwrap_err();
        assert!(matches!(err, DiffError::Open { role: CommitRole::Target, .. }));
        assert_eq!(source.counters.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_read_failure_closes_both_and_keeps_close_errors() {
        let mut source = FakeCommit::new("source", vec![]);
        source.fail_close = true;
        let mut broken = segment("_0", vec![1], None);
        broken.fail_read = true;
        let target = FakeCommit::new("target", vec![broken]);

        let err = DiffCalculator::new().calculate_diff(&source, &target).unwrap_err();
        assert!(matches!(err, DiffError::Read { .. }));
        assert_eq!(err.suppressed().len(), 1);
        assert_eq!(source.counters.closed.load(Ordering::SeqCst), 1);
        assert_eq!(target.counters.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_failure_is_not_an_empty_diff() {
        let source = FakeCommit::new("source", vec![]);
        let mut target = FakeCommit::new("target", vec![segment("_0", vec![1], None)]);
        target.fail_close = true;

        let err = DiffCalculator::new().calculate_diff(&source, &target).unwrap_err();
        match err {
            DiffError::Close(errors) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_intersection_ignores_liveness_files() {
        let before = segment("_0", vec![1], None);
        let after = segment("_0", vec![1], Some(&[]));
        let other = segment("_1", vec![2], None);

        let source = [before.manifest.clone(), other.manifest.clone()];
        let target = [after.manifest.clone()];
        let names = intersection(&source, &target);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["_0"]);
    }
}
