use crate::index::api::{DocumentWriter, SegmentView, Writer};
use crate::index::reader::{
    commit_file_name, list_commits, read_commit_manifest, SegmentReader, StoreCommit,
};
use crate::index::types::*;
use crate::index::{COMMITS_DIR, LIVE_DOCS_MAGIC, SEGMENT_MAGIC, SEGMENTS_DIR, SEGMENT_VERSION};
use crate::utils::{encode_bytes, encode_varint_u64, sync_dir, unix_now, write_atomic, zigzag_encode};
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A flushed segment as the writer tracks it
struct SegmentState {
    manifest: SegmentManifest,
    /// key -> slots holding it
    slots: FxHashMap<String, Vec<u32>>,
    live: RoaringBitmap,
    /// Liveness changed since the manifest was last written
    dirty: bool,
}

impl SegmentState {
    fn delete(&mut self, key: &str) -> bool {
        let mut removed = false;
        if let Some(slots) = self.slots.get(key) {
            for &slot in slots {
                removed |= self.live.remove(slot);
            }
        }
        self.dirty |= removed;
        removed
    }
}

/// Writer for a store directory.
///
/// Buffered documents become one new segment per flush. Deletes never touch
/// a written segment file; they produce a new liveness generation instead.
/// Segment, liveness and commit numbers are allocated from everything in the
/// directory, so writers forked from old commits never reuse a file name.
pub struct StoreWriter {
    index_path: PathBuf,
    segments: Vec<SegmentState>,
    buffer: Vec<(String, Document)>,
    last_commit: Option<CommitManifest>,
    /// Commit the writer was opened on, used as parent of the first commit
    base: Option<CommitGeneration>,
    pending_metadata: Option<CommitMetadata>,
    dirty: bool,
    next_segment: u64,
    next_live_gen: u64,
    next_commit: CommitGeneration,
}

impl StoreWriter {
    /// Open on the latest commit of `index_path`, creating the directory if needed
    pub fn open(index_path: &Path) -> io::Result<Self> {
        fs::create_dir_all(index_path.join(SEGMENTS_DIR))?;
        fs::create_dir_all(index_path.join(COMMITS_DIR))?;

        let latest = list_commits(index_path)?.last().copied();
        match latest {
            Some(generation) => Self::open_at(index_path, generation),
            None => Self::with_base(index_path, None),
        }
    }

    /// Open on an earlier commit. Commits from this writer branch off that point.
    pub fn open_at(index_path: &Path, generation: CommitGeneration) -> io::Result<Self> {
        let path = index_path.join(COMMITS_DIR).join(commit_file_name(generation));
        let manifest = read_commit_manifest(&path)?;
        Self::with_base(index_path, Some(manifest))
    }

    fn with_base(index_path: &Path, base: Option<CommitManifest>) -> io::Result<Self> {
        let segments_path = index_path.join(SEGMENTS_DIR);
        let mut segments = Vec::new();

        if let Some(manifest) = &base {
            for segment in &manifest.segments {
                let reader = SegmentReader::open(&segments_path, segment)?;
                let mut slots: FxHashMap<String, Vec<u32>> = FxHashMap::default();
                for (slot, key) in reader.keys().iter().enumerate() {
                    slots.entry(key.clone()).or_default().push(slot as u32);
                }
                let live = match reader.live_docs() {
                    Some(live) => live.clone(),
                    None => (0..segment.max_doc).collect(),
                };
                segments.push(SegmentState {
                    manifest: segment.clone(),
                    slots,
                    live,
                    dirty: false,
                });
            }
        }

        let (next_segment, next_live_gen) = scan_segment_numbers(&segments_path)?;
        let next_commit = list_commits(index_path)?.last().map_or(1, |g| g + 1);

        log::debug!(
            "opened writer on {} at commit {:?} ({} segments)",
            index_path.display(),
            base.as_ref().map(|m| m.generation),
            segments.len()
        );

        Ok(Self {
            index_path: index_path.to_path_buf(),
            segments,
            buffer: Vec::new(),
            base: base.as_ref().map(|m| m.generation),
            last_commit: base,
            pending_metadata: None,
            dirty: false,
            next_segment,
            next_live_gen,
            next_commit,
        })
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// The commit this writer last wrote or was opened on
    pub fn last_commit(&self) -> Option<StoreCommit> {
        self.last_commit
            .as_ref()
            .map(|m| StoreCommit::from_manifest(&self.index_path, m.clone()))
    }

    pub fn last_generation(&self) -> Option<CommitGeneration> {
        self.last_commit.as_ref().map(|m| m.generation)
    }

    /// Documents buffered since the last flush
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Write buffered documents as a new segment and persist changed liveness
    pub fn flush(&mut self) -> io::Result<()> {
        let segments_path = self.index_path.join(SEGMENTS_DIR);

        // Another writer on the same directory may have taken numbers since open
        let (next_segment, next_live_gen) = scan_segment_numbers(&segments_path)?;
        self.next_segment = self.next_segment.max(next_segment);
        self.next_live_gen = self.next_live_gen.max(next_live_gen);

        for segment in self.segments.iter_mut().filter(|s| s.dirty) {
            let file_name = format!("{}_{}.liv", segment.manifest.name, self.next_live_gen);
            self.next_live_gen += 1;
            write_live_docs(&segments_path.join(&file_name), &segment.live)?;

            segment.manifest.del_count = segment.manifest.max_doc - segment.live.len() as u32;
            segment.manifest.live_docs_file = Some(file_name);
            segment.dirty = false;
        }

        if !self.buffer.is_empty() {
            let name = format!("_{}", self.next_segment);
            self.next_segment += 1;
            let file_name = format!("{}.seg", name);
            write_segment(&segments_path.join(&file_name), &self.buffer)?;

            let max_doc = self.buffer.len() as u32;
            let mut slots: FxHashMap<String, Vec<u32>> = FxHashMap::default();
            for (slot, (key, _)) in self.buffer.drain(..).enumerate() {
                slots.entry(key).or_default().push(slot as u32);
            }

            log::debug!("flushed segment {} with {} documents", name, max_doc);
            self.segments.push(SegmentState {
                manifest: SegmentManifest {
                    name,
                    max_doc,
                    core_files: [file_name].into_iter().collect(),
                    live_docs_file: None,
                    del_count: 0,
                },
                slots,
                live: (0..max_doc).collect(),
                dirty: false,
            });
        }

        sync_dir(&segments_path)
    }

    fn metadata_changed(&self) -> bool {
        match (&self.pending_metadata, &self.last_commit) {
            (Some(pending), Some(last)) => *pending != last.metadata,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

impl Writer for StoreWriter {
    fn has_uncommitted_changes(&self) -> bool {
        self.dirty || self.last_commit.is_none()
    }

    fn set_commit_metadata(&mut self, metadata: CommitMetadata) {
        self.pending_metadata = Some(metadata);
    }

    fn commit(&mut self) -> io::Result<()> {
        if !self.has_uncommitted_changes() && !self.metadata_changed() {
            return Ok(());
        }

        self.flush()?;
        if let Some(&latest) = list_commits(&self.index_path)?.last() {
            self.next_commit = self.next_commit.max(latest + 1);
        }

        let metadata = match self.pending_metadata.take() {
            Some(metadata) => metadata,
            None => self
                .last_commit
                .as_ref()
                .map(|m| m.metadata.clone())
                .unwrap_or_default(),
        };

        let manifest = CommitManifest {
            version: CommitManifest::VERSION,
            generation: self.next_commit,
            parent: self.last_commit.as_ref().map(|m| m.generation).or(self.base),
            segments: self.segments.iter().map(|s| s.manifest.clone()).collect(),
            metadata,
            created_at: unix_now(),
        };

        let path = self
            .index_path
            .join(COMMITS_DIR)
            .join(commit_file_name(manifest.generation));
        let json = serde_json::to_vec_pretty(&manifest)?;
        write_atomic(&path, &json)?;

        log::info!(
            "committed generation {} ({} segments, {} live documents)",
            manifest.generation,
            manifest.segments.len(),
            manifest.live_count()
        );

        self.next_commit = manifest.generation + 1;
        self.last_commit = Some(manifest);
        self.dirty = false;
        Ok(())
    }

    fn current_commit_metadata(&self) -> CommitMetadata {
        self.last_commit
            .as_ref()
            .map(|m| m.metadata.clone())
            .unwrap_or_default()
    }
}

impl DocumentWriter for StoreWriter {
    fn update_document(&mut self, key: &str, document: Document) -> io::Result<()> {
        self.delete_documents(key)?;
        self.buffer.push((key.to_string(), document));
        Ok(())
    }

    fn delete_documents(&mut self, key: &str) -> io::Result<()> {
        for segment in &mut self.segments {
            segment.delete(key);
        }
        self.buffer.retain(|(k, _)| k != key);
        self.dirty = true;
        Ok(())
    }

    fn delete_all(&mut self) -> io::Result<()> {
        self.segments.clear();
        self.buffer.clear();
        self.dirty = true;
        Ok(())
    }
}

/// Encode buffered documents into a checksummed segment file
fn write_segment(path: &Path, docs: &[(String, Document)]) -> io::Result<()> {
    let mut buf = Vec::new();
    buf.extend_from_slice(SEGMENT_MAGIC);
    buf.extend_from_slice(&SEGMENT_VERSION.to_le_bytes());
    buf.extend_from_slice(&(docs.len() as u32).to_le_bytes());

    for (key, doc) in docs {
        encode_bytes(key.as_bytes(), &mut buf);
        encode_bytes(doc.doc_type.as_bytes(), &mut buf);
        encode_varint_u64(doc.numeric.len() as u64, &mut buf);
        for (field, &value) in &doc.numeric {
            encode_bytes(field.as_bytes(), &mut buf);
            encode_varint_u64(zigzag_encode(value), &mut buf);
        }
        if doc.source.is_null() {
            encode_bytes(&[], &mut buf);
        } else {
            encode_bytes(&serde_json::to_vec(&doc.source)?, &mut buf);
        }
    }

    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    write_atomic(path, &buf)
}

fn write_live_docs(path: &Path, live: &RoaringBitmap) -> io::Result<()> {
    let mut buf = Vec::with_capacity(live.serialized_size() + 8);
    buf.extend_from_slice(LIVE_DOCS_MAGIC);
    live.serialize_into(&mut buf)?;
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    write_atomic(path, &buf)
}

/// Next free segment number and liveness generation in a segments directory
fn scan_segment_numbers(segments_path: &Path) -> io::Result<(u64, u64)> {
    let mut next_segment = 0;
    let mut next_live_gen = 1;

    for entry in fs::read_dir(segments_path)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };

        if let Some(n) = name
            .strip_prefix('_')
            .and_then(|s| s.strip_suffix(".seg"))
            .and_then(|s| s.parse::<u64>().ok())
        {
            next_segment = next_segment.max(n + 1);
        } else if let Some((n, generation)) = name
            .strip_prefix('_')
            .and_then(|s| s.strip_suffix(".liv"))
            .and_then(|s| s.split_once('_'))
        {
            if let (Ok(n), Ok(generation)) = (n.parse::<u64>(), generation.parse::<u64>()) {
                next_segment = next_segment.max(n + 1);
                next_live_gen = next_live_gen.max(generation + 1);
            }
        }
    }

    Ok((next_segment, next_live_gen))
}
