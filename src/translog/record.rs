//! Log records and their on-disk framing.
//!
//! Every record is one frame:
//! - 4 bytes (little-endian u32): payload length
//! - 4 bytes (little-endian u32): CRC32 of the payload
//! - N bytes: JSON-encoded [`LogRecord`]

use crate::error::LogError;
use crate::index::types::Document;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub(crate) const FRAME_HEADER_LEN: usize = 8;

/// A document written under a key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Put {
    pub key: String,
    pub payload: Document,
}

/// One logged mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LogRecord {
    Put(Put),
    Delete { key: String },
    BulkPut { puts: Vec<Put> },
}

impl LogRecord {
    pub fn put(key: impl Into<String>, payload: Document) -> Self {
        LogRecord::Put(Put {
            key: key.into(),
            payload,
        })
    }

    pub fn delete(key: impl Into<String>) -> Self {
        LogRecord::Delete { key: key.into() }
    }

    /// Documents carried by this record
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        let puts: &[Put] = match self {
            LogRecord::Put(put) => std::slice::from_ref(put),
            LogRecord::Delete { .. } => &[],
            LogRecord::BulkPut { puts } => puts,
        };
        puts.iter().map(|p| &p.payload)
    }
}

/// Encode a record as a checksummed frame
pub fn encode_frame(record: &LogRecord, limit: usize) -> Result<Vec<u8>, LogError> {
    let json = serde_json::to_vec(record)?;
    if json.len() > limit {
        return Err(LogError::RecordTooLarge {
            size: json.len(),
            limit,
        });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + json.len());
    frame.extend_from_slice(&(json.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&json).to_le_bytes());
    frame.extend_from_slice(&json);
    Ok(frame)
}

/// Frames decoded from one buffer
#[derive(Debug, Default)]
pub struct DecodedFrames {
    pub records: Vec<LogRecord>,
    /// Offset of an incomplete frame at the end of the buffer
    pub torn_at: Option<usize>,
}

/// Decode every frame in `data`.
///
/// A frame cut short by the end of the buffer ends decoding and is reported
/// through `torn_at`; a frame that is complete but fails its checksum, or
/// does not parse, is corruption.
pub fn decode_frames(data: &[u8], path: &Path, limit: usize) -> Result<DecodedFrames, LogError> {
    let corrupted = |offset: usize, reason: String| LogError::Corrupted {
        path: path.to_path_buf(),
        reason: format!("{} at offset {}", reason, offset),
    };

    let mut decoded = DecodedFrames::default();
    let mut pos = 0;

    while pos < data.len() {
        if data.len() - pos < FRAME_HEADER_LEN {
            decoded.torn_at = Some(pos);
            break;
        }

        let header = &data[pos..pos + FRAME_HEADER_LEN];
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        // Sanity check before trusting the length
        if len > limit {
            return Err(corrupted(pos, format!("frame length {} exceeds limit", len)));
        }

        let start = pos + FRAME_HEADER_LEN;
        if data.len() - start < len {
            decoded.torn_at = Some(pos);
            break;
        }

        let payload = &data[start..start + len];
        if crc32fast::hash(payload) != crc {
            return Err(corrupted(pos, "checksum mismatch".to_string()));
        }
        let record = serde_json::from_slice(payload)
            .map_err(|e| corrupted(pos, format!("undecodable record ({})", e)))?;
        decoded.records.push(record);
        pos = start + len;
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 1024 * 1024;

    fn records() -> Vec<LogRecord> {
        vec![
            LogRecord::put("tl1", Document::new("concept").relevant(1)),
            LogRecord::delete("tl1"),
            LogRecord::BulkPut {
                puts: vec![
                    Put {
                        key: "a".to_string(),
                        payload: Document::new("concept"),
                    },
                    Put {
                        key: "b".to_string(),
                        payload: Document::new("description"),
                    },
                ],
            },
        ]
    }

    fn encode_all(records: &[LogRecord]) -> Vec<u8> {
        records
            .iter()
            .flat_map(|r| encode_frame(r, LIMIT).unwrap())
            .collect()
    }

    #[test]
    fn test_records_are_tagged_json() {
        let json = serde_json::to_value(LogRecord::delete("x")).unwrap();
        assert_eq!(json["type"], "Delete");
        assert_eq!(json["key"], "x");
    }

    #[test]
    fn test_decode_in_order() {
        let data = encode_all(&records());
        let decoded = decode_frames(&data, Path::new("t"), LIMIT).unwrap();
        assert_eq!(decoded.records, records());
        assert_eq!(decoded.torn_at, None);
    }

    #[test]
    fn test_truncated_tail_is_reported_not_fatal() {
        let data = encode_all(&records());
        let first_len = encode_frame(&records()[0], LIMIT).unwrap().len();

        for cut in [first_len + 3, first_len + FRAME_HEADER_LEN + 2, data.len() - 1] {
            let decoded = decode_frames(&data[..cut], Path::new("t"), LIMIT).unwrap();
            assert!(!decoded.records.is_empty());
            assert!(decoded.torn_at.is_some());
        }
    }

    #[test]
    fn test_checksum_mismatch_is_corruption() {
        let mut data = encode_all(&records());
        let last = data.len() - 2;
        data[last] ^= 0x55;

        let err = decode_frames(&data, Path::new("t"), LIMIT).unwrap_err();
        assert!(matches!(err, LogError::Corrupted { .. }));
    }

    #[test]
    fn test_oversized_record_rejected() {
        let record = LogRecord::put("k", Document::new("concept"));
        let err = encode_frame(&record, 4).unwrap_err();
        assert!(matches!(err, LogError::RecordTooLarge { limit: 4, .. }));
    }

    #[test]
    fn test_documents_of_each_record() {
        let counts: Vec<_> = records().iter().map(|r| r.documents().count()).collect();
        assert_eq!(counts, vec![1, 0, 2]);
    }
}
