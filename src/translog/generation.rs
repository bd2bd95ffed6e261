//! Generation files.
//!
//! Each generation is `translog-<generation>.tlog`: a fixed header followed
//! by record frames.
//!
//! Header layout (32 bytes):
//! - 4 bytes: magic `RVTL`
//! - 4 bytes (LE u32): format version
//! - 16 bytes: log uuid
//! - 8 bytes (LE u64): generation

use crate::error::LogError;
use crate::translog::record::{decode_frames, LogRecord};
use crate::utils::{read_u32_le, read_u64_le, sync_dir};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const HEADER_MAGIC: &[u8; 4] = b"RVTL";
const HEADER_VERSION: u32 = 1;
pub(crate) const HEADER_LEN: usize = 32;

pub fn file_name(generation: u64) -> String {
    format!("translog-{}.tlog", generation)
}

pub fn parse_file_name(name: &str) -> Option<u64> {
    name.strip_prefix("translog-")?
        .strip_suffix(".tlog")?
        .parse()
        .ok()
}

pub fn generation_path(log_path: &Path, generation: u64) -> PathBuf {
    log_path.join(file_name(generation))
}

/// Generations present in a log directory, oldest first
pub fn list_generations(log_path: &Path) -> Result<Vec<u64>, LogError> {
    let mut generations = Vec::new();
    for entry in fs::read_dir(log_path).map_err(LogError::io(log_path))? {
        let entry = entry.map_err(LogError::io(log_path))?;
        if let Some(generation) = entry.file_name().to_str().and_then(parse_file_name) {
            generations.push(generation);
        }
    }
    generations.sort_unstable();
    Ok(generations)
}

fn encode_header(uuid: &Uuid, generation: u64) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(HEADER_MAGIC);
    header.extend_from_slice(&HEADER_VERSION.to_le_bytes());
    header.extend_from_slice(uuid.as_bytes());
    header.extend_from_slice(&generation.to_le_bytes());
    header
}

/// Append handle on the newest generation
pub struct GenerationWriter {
    path: PathBuf,
    generation: u64,
    file: BufWriter<File>,
    records: u64,
}

impl GenerationWriter {
    /// Create the file for `generation` and write its header.
    ///
    /// A leftover file holding nothing but a header is reset. One that
    /// already holds records is never truncated.
    pub fn create(log_path: &Path, uuid: &Uuid, generation: u64) -> Result<Self, LogError> {
        let path = generation_path(log_path, generation);
        match fs::metadata(&path) {
            Ok(meta) if meta.len() > HEADER_LEN as u64 => {
                return Err(LogError::Corrupted {
                    path,
                    reason: format!("generation {} already holds records", generation),
                });
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(LogError::io(&path)(e)),
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(LogError::io(&path))?;

        let mut file = BufWriter::new(file);
        file.write_all(&encode_header(uuid, generation))
            .and_then(|_| file.flush())
            .and_then(|_| file.get_ref().sync_all())
            .map_err(LogError::io(&path))?;
        sync_dir(log_path).map_err(LogError::io(log_path))?;

        log::debug!("created translog generation {}", generation);
        Ok(Self {
            path,
            generation,
            file,
            records: 0,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Records appended through this handle
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn append(&mut self, frame: &[u8], sync: bool) -> Result<(), LogError> {
        self.file
            .write_all(frame)
            .map_err(LogError::io(&self.path))?;
        self.records += 1;
        if sync {
            self.sync()?;
        }
        Ok(())
    }

    /// Flush buffered frames and fsync the file
    pub fn sync(&mut self) -> Result<(), LogError> {
        self.file
            .flush()
            .and_then(|_| self.file.get_ref().sync_data())
            .map_err(LogError::io(&self.path))
    }
}

/// Read every record of one generation.
///
/// The header must name `uuid` and `generation`. An incomplete frame at the
/// end of the file is a write torn by a crash and is dropped with a warning.
pub fn read_generation(
    log_path: &Path,
    uuid: &Uuid,
    generation: u64,
    max_record_bytes: usize,
) -> Result<Vec<LogRecord>, LogError> {
    let path = generation_path(log_path, generation);
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LogError::MissingGeneration(generation));
        }
        Err(e) => return Err(LogError::io(&path)(e)),
    };

    let corrupted = |reason: String| LogError::Corrupted {
        path: path.clone(),
        reason,
    };

    if data.len() < HEADER_LEN {
        return Err(corrupted(format!("header truncated to {} bytes", data.len())));
    }
    let mut header = &data[..HEADER_LEN];
    if &header[..4] != HEADER_MAGIC {
        return Err(corrupted("not a translog file".to_string()));
    }
    header = &header[4..];
    let version = read_u32_le(&mut header).map_err(LogError::io(&path))?;
    if version != HEADER_VERSION {
        return Err(corrupted(format!("unsupported version {}", version)));
    }
    let found_uuid = Uuid::from_slice(&header[..16]).map_err(|e| corrupted(e.to_string()))?;
    header = &header[16..];
    let found_generation = read_u64_le(&mut header).map_err(LogError::io(&path))?;

    if found_uuid != *uuid {
        return Err(LogError::UuidMismatch {
            expected: uuid.to_string(),
            found: found_uuid.to_string(),
        });
    }
    if found_generation != generation {
        return Err(corrupted(format!(
            "header names generation {}",
            found_generation
        )));
    }

    let decoded = decode_frames(&data[HEADER_LEN..], &path, max_record_bytes)?;
    if let Some(offset) = decoded.torn_at {
        log::warn!(
            "ignoring torn record at offset {} of {}",
            offset + HEADER_LEN,
            path.display()
        );
    }
    Ok(decoded.records)
}
