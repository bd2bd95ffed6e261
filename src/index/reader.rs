use crate::index::api::{Commit, CommitReader, SegmentView};
use crate::index::types::*;
use crate::index::{COMMITS_DIR, LIVE_DOCS_MAGIC, SEGMENT_MAGIC, SEGMENTS_DIR, SEGMENT_VERSION};
use crate::utils::{invalid_data, ByteCursor};
use memmap2::Mmap;
use rayon::prelude::*;
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Reader for a single segment.
///
/// Keys and numeric columns are decoded when the segment is opened; stored
/// document sources stay in the mapping until asked for.
pub struct SegmentReader {
    manifest: SegmentManifest,
    data: Mmap,
    /// Byte offset of every document record in `data`
    offsets: Vec<usize>,
    keys: Vec<String>,
    columns: FxHashMap<String, Vec<i64>>,
    live_docs: Option<RoaringBitmap>,
}

impl SegmentReader {
    /// Open a segment from disk
    pub fn open(segments_path: &Path, manifest: &SegmentManifest) -> io::Result<Self> {
        let core_file = manifest
            .core_files
            .iter()
            .find(|f| f.ends_with(".seg"))
            .ok_or_else(|| invalid_data(format!("segment {} has no core file", manifest.name)))?;

        let file = File::open(segments_path.join(core_file))?;
        let data = unsafe { Mmap::map(&file)? };
        let body = verify_checksum(&data, core_file)?;

        let mut cursor = ByteCursor::new(body);
        if cursor.read_slice(4)? != SEGMENT_MAGIC {
            return Err(invalid_data(format!("{} is not a segment file", core_file)));
        }
        let version = cursor.read_u32_le()?;
        if version != SEGMENT_VERSION {
            return Err(invalid_data(format!(
                "{} has unsupported version {}",
                core_file, version
            )));
        }
        let doc_count = cursor.read_u32_le()?;
        if doc_count != manifest.max_doc {
            return Err(invalid_data(format!(
                "{} holds {} documents, manifest says {}",
                core_file, doc_count, manifest.max_doc
            )));
        }

        let mut offsets = Vec::with_capacity(doc_count as usize);
        let mut keys = Vec::with_capacity(doc_count as usize);
        let mut columns: FxHashMap<String, Vec<i64>> = FxHashMap::default();

        for doc in 0..doc_count as usize {
            offsets.push(cursor.position());
            keys.push(cursor.read_str()?.to_string());
            cursor.read_bytes()?; // doc type

            let field_count = cursor.read_varint()?;
            for _ in 0..field_count {
                let field = cursor.read_str()?;
                let value = cursor.read_signed()?;
                columns
                    .entry(field.to_string())
                    .or_insert_with(|| vec![0; doc_count as usize])[doc] = value;
            }

            cursor.read_bytes()?; // source
        }

        let live_docs = match &manifest.live_docs_file {
            Some(name) => Some(read_live_docs(&segments_path.join(name))?),
            None => None,
        };

        Ok(Self {
            manifest: manifest.clone(),
            data,
            offsets,
            keys,
            columns,
            live_docs,
        })
    }

    pub fn manifest(&self) -> &SegmentManifest {
        &self.manifest
    }

    pub fn key(&self, doc: u32) -> Option<&str> {
        self.keys.get(doc as usize).map(String::as_str)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Decode the stored document in slot `doc`
    pub fn document(&self, doc: u32) -> io::Result<Document> {
        let offset = *self
            .offsets
            .get(doc as usize)
            .ok_or_else(|| invalid_data(format!("no slot {} in {}", doc, self.manifest.name)))?;

        let mut cursor = ByteCursor::new(&self.data[offset..]);
        cursor.read_bytes()?; // key
        let doc_type = cursor.read_str()?.to_string();

        let mut document = Document::new(doc_type);
        let field_count = cursor.read_varint()?;
        for _ in 0..field_count {
            let field = cursor.read_str()?.to_string();
            let value = cursor.read_signed()?;
            document.numeric.insert(field, value);
        }

        let source = cursor.read_bytes()?;
        if !source.is_empty() {
            document.source =
                serde_json::from_slice(source).map_err(|e| invalid_data(e.to_string()))?;
        }
        Ok(document)
    }

    /// Live slots in ascending order
    pub fn live_slots(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.manifest.max_doc).filter(move |&doc| self.is_live(doc))
    }
}

impl SegmentView for SegmentReader {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn max_doc(&self) -> u32 {
        self.manifest.max_doc
    }

    fn live_docs(&self) -> Option<&RoaringBitmap> {
        self.live_docs.as_ref()
    }

    fn numeric_field(&self, field: &str) -> io::Result<Option<&[i64]>> {
        Ok(self.columns.get(field).map(Vec::as_slice))
    }
}

/// Strip and check the trailing CRC32 of a file image
fn verify_checksum<'a>(data: &'a [u8], name: &str) -> io::Result<&'a [u8]> {
    if data.len() < 4 {
        return Err(invalid_data(format!("{} is truncated", name)));
    }
    let (body, footer) = data.split_at(data.len() - 4);
    let expected = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(invalid_data(format!(
            "{} checksum mismatch (stored {:08x}, computed {:08x})",
            name, expected, actual
        )));
    }
    Ok(body)
}

/// Read a liveness bitmap file
pub(crate) fn read_live_docs(path: &Path) -> io::Result<RoaringBitmap> {
    let data = fs::read(path)?;
    let name = path.display().to_string();
    let body = verify_checksum(&data, &name)?;
    if body.len() < 4 || &body[..4] != LIVE_DOCS_MAGIC {
        return Err(invalid_data(format!("{} is not a liveness file", name)));
    }
    RoaringBitmap::deserialize_from(&body[4..])
}

/// Commit point of a store directory
#[derive(Debug, Clone)]
pub struct StoreCommit {
    index_path: PathBuf,
    manifest: CommitManifest,
}

impl StoreCommit {
    /// Open the commit with the given generation
    pub fn open(index_path: &Path, generation: CommitGeneration) -> io::Result<Self> {
        let path = index_path.join(COMMITS_DIR).join(commit_file_name(generation));
        let manifest = read_commit_manifest(&path)?;
        Ok(Self {
            index_path: index_path.to_path_buf(),
            manifest,
        })
    }

    pub(crate) fn from_manifest(index_path: &Path, manifest: CommitManifest) -> Self {
        Self {
            index_path: index_path.to_path_buf(),
            manifest,
        }
    }

    /// Most recent commit, `None` for a directory that was never committed
    pub fn latest(index_path: &Path) -> io::Result<Option<Self>> {
        match list_commits(index_path)?.last() {
            Some(&generation) => Self::open(index_path, generation).map(Some),
            None => Ok(None),
        }
    }

    pub fn generation(&self) -> CommitGeneration {
        self.manifest.generation
    }

    pub fn manifest(&self) -> &CommitManifest {
        &self.manifest
    }

    pub fn metadata(&self) -> &CommitMetadata {
        &self.manifest.metadata
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }
}

impl Commit for StoreCommit {
    type Reader = StoreCommitReader;

    fn label(&self) -> String {
        format!("{}@{}", self.index_path.display(), self.manifest.generation)
    }

    fn segment_manifests(&self) -> &[SegmentManifest] {
        &self.manifest.segments
    }

    /// Load all segments in parallel
    fn open_for_read(&self) -> io::Result<StoreCommitReader> {
        let segments_path = self.index_path.join(SEGMENTS_DIR);
        let segments = self
            .manifest
            .segments
            .par_iter()
            .map(|manifest| SegmentReader::open(&segments_path, manifest))
            .collect::<io::Result<Vec<_>>>()?;

        log::debug!(
            "opened {} with {} segments",
            self.label(),
            segments.len()
        );
        Ok(StoreCommitReader { segments })
    }
}

/// Segment readers of one open [`StoreCommit`]
pub struct StoreCommitReader {
    segments: Vec<SegmentReader>,
}

impl CommitReader for StoreCommitReader {
    type Segment = SegmentReader;

    fn segments(&self) -> &[SegmentReader] {
        &self.segments
    }

    fn close(self) -> io::Result<()> {
        // Unmapping cannot fail; dropping the readers is enough
        drop(self.segments);
        Ok(())
    }
}

pub(crate) fn commit_file_name(generation: CommitGeneration) -> String {
    format!("commit-{:08}.json", generation)
}

pub(crate) fn parse_commit_file_name(name: &str) -> Option<CommitGeneration> {
    name.strip_prefix("commit-")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

pub(crate) fn read_commit_manifest(path: &Path) -> io::Result<CommitManifest> {
    let file = File::open(path)?;
    let manifest: CommitManifest = serde_json::from_reader(io::BufReader::new(file))
        .map_err(|e| invalid_data(format!("{}: {}", path.display(), e)))?;
    if manifest.version != CommitManifest::VERSION {
        return Err(invalid_data(format!(
            "{}: unsupported commit version {}",
            path.display(),
            manifest.version
        )));
    }
    Ok(manifest)
}

/// Generations of every commit in a store directory, oldest first
pub fn list_commits(index_path: &Path) -> io::Result<Vec<CommitGeneration>> {
    let commits_path = index_path.join(COMMITS_DIR);
    if !commits_path.exists() {
        return Ok(Vec::new());
    }

    let mut generations = Vec::new();
    for entry in fs::read_dir(&commits_path)? {
        let entry = entry?;
        if let Some(generation) = entry.file_name().to_str().and_then(parse_commit_file_name) {
            generations.push(generation);
        }
    }
    generations.sort_unstable();
    Ok(generations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_file_names() {
        assert_eq!(commit_file_name(12), "commit-00000012.json");
        assert_eq!(parse_commit_file_name("commit-00000012.json"), Some(12));
        assert_eq!(parse_commit_file_name("commit-00000012.json.tmp"), None);
        assert_eq!(parse_commit_file_name("segments"), None);
    }

    #[test]
    fn test_checksum_detects_flipped_byte() {
        let mut data = b"payload".to_vec();
        let crc = crc32fast::hash(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(verify_checksum(&data, "x").unwrap(), b"payload");

        data[0] ^= 0xFF;
        assert!(verify_checksum(&data, "x").is_err());
    }

    #[test]
    fn test_list_commits_on_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_commits(&dir.path().join("nope")).unwrap().is_empty());
    }
}
