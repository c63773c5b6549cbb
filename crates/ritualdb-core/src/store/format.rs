//! On-disk encoding of store files.
//!
//! Primary file: `MAGIC | u32 header length | header | body`, both parts rkyv
//! archives. The write-ahead log is a sequence of frames, each a u32 LE length
//! followed by an archived [`WalFrame`]. The shared-memory file holds a single
//! archived [`ShmHeader`].

use super::{RowId, Value};
use crate::catalog::EntityShape;
use crate::error::Error;
use rkyv::{Archive, Deserialize, Serialize};

/// Magic prefix of a primary store file.
pub const STORE_MAGIC: [u8; 8] = *b"RITUALDB";

/// Current primary file format.
pub const STORE_FORMAT: u32 = 1;

/// Length prefix size for header and WAL frames.
const LEN_PREFIX: usize = 4;

/// Header of a primary store file.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct StoreHeader {
    /// File format number.
    pub format: u32,
    /// Schema version the store is formatted for, as `major.minor.patch`.
    pub version: String,
    /// Hex structural checksum of that schema version.
    pub checksum: String,
    /// Checkpoint generation. WAL frames from other generations are stale.
    pub generation: u64,
}

/// One field value of a stored row.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct StoredValue {
    /// Field name.
    pub name: String,
    /// Field value.
    pub value: Value,
}

/// A stored row.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct StoredRow {
    /// Row id.
    pub id: RowId,
    /// Field values in name order.
    pub values: Vec<StoredValue>,
}

/// A stored entity table.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct StoredTable {
    /// Entity shape the rows conform to.
    pub shape: EntityShape,
    /// Rows in id order.
    pub rows: Vec<StoredRow>,
}

/// Body of a primary store file.
#[derive(Debug, Clone, PartialEq, Default, Archive, Serialize, Deserialize)]
pub struct StoreBody {
    /// Tables in name order.
    pub tables: Vec<StoredTable>,
}

/// A logged row mutation.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum WalOp {
    /// Insert or replace a row.
    Put {
        /// Entity name.
        entity: String,
        /// Full row contents.
        row: StoredRow,
    },
    /// Delete a row.
    Delete {
        /// Entity name.
        entity: String,
        /// Row id.
        id: RowId,
    },
}

/// One write-ahead log frame.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct WalFrame {
    /// Generation of the snapshot this frame applies to.
    pub generation: u64,
    /// Position of the frame within its generation, starting at 0.
    pub sequence: u64,
    /// The mutation.
    pub op: WalOp,
}

/// Shared-memory index describing the committed WAL prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Archive, Serialize, Deserialize)]
pub struct ShmHeader {
    /// Snapshot generation.
    pub generation: u64,
    /// Number of committed frames.
    pub frames: u64,
    /// Committed WAL length in bytes.
    pub wal_len: u64,
}

macro_rules! archive_codec {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $ty {
                /// Serialize to bytes using rkyv.
                pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
                    rkyv::to_bytes::<rkyv::rancor::Error>(self)
                        .map(|v| v.to_vec())
                        .map_err(|e| Error::Serialization(e.to_string()))
                }

                /// Deserialize from bytes using rkyv.
                ///
                /// The input is copied into an aligned buffer first, so slices
                /// taken at arbitrary file offsets are accepted.
                pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
                    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
                    aligned.extend_from_slice(bytes);
                    rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
                        .map_err(|e| Error::Deserialization(e.to_string()))
                }
            }
        )*
    };
}

archive_codec!(StoreHeader, StoreBody, WalFrame, ShmHeader);

/// Encode a primary store file.
pub fn encode_primary(header: &StoreHeader, body: &StoreBody) -> Result<Vec<u8>, Error> {
    let header_bytes = header.to_bytes()?;
    let body_bytes = body.to_bytes()?;

    let mut out =
        Vec::with_capacity(STORE_MAGIC.len() + LEN_PREFIX + header_bytes.len() + body_bytes.len());
    out.extend_from_slice(&STORE_MAGIC);
    out.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&body_bytes);
    Ok(out)
}

fn split_primary(bytes: &[u8]) -> Result<(&[u8], &[u8]), Error> {
    let rest = bytes
        .strip_prefix(&STORE_MAGIC[..])
        .ok_or_else(|| Error::InvalidData("not a store file".to_string()))?;
    if rest.len() < LEN_PREFIX {
        return Err(Error::InvalidData("truncated store header".to_string()));
    }
    let (len_bytes, rest) = rest.split_at(LEN_PREFIX);
    let header_len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
        as usize;
    if rest.len() < header_len {
        return Err(Error::InvalidData("truncated store header".to_string()));
    }
    Ok(rest.split_at(header_len))
}

/// Decode only the header of a primary store file.
pub fn decode_header(bytes: &[u8]) -> Result<StoreHeader, Error> {
    let (header, _) = split_primary(bytes)?;
    let header = StoreHeader::from_bytes(header)?;
    if header.format != STORE_FORMAT {
        return Err(Error::InvalidData(format!(
            "unsupported store format {}",
            header.format
        )));
    }
    Ok(header)
}

/// Decode a whole primary store file.
pub fn decode_primary(bytes: &[u8]) -> Result<(StoreHeader, StoreBody), Error> {
    let header = decode_header(bytes)?;
    let (_, body) = split_primary(bytes)?;
    Ok((header, StoreBody::from_bytes(body)?))
}

/// Encode a WAL frame with its length prefix.
pub fn encode_frame(frame: &WalFrame) -> Result<Vec<u8>, Error> {
    let bytes = frame.to_bytes()?;
    let mut out = Vec::with_capacity(LEN_PREFIX + bytes.len());
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&bytes);
    Ok(out)
}

/// Result of scanning a write-ahead log.
#[derive(Debug, Default)]
pub struct WalScan {
    /// Frames decoded from the intact prefix, paired with their end offset.
    pub frames: Vec<(WalFrame, u64)>,
    /// Length of the intact prefix in bytes.
    pub valid_len: u64,
    /// Whether bytes beyond the intact prefix were found.
    pub torn: bool,
}

/// Scan a WAL, stopping at the first incomplete or undecodable frame.
pub fn scan_wal(bytes: &[u8]) -> WalScan {
    let mut scan = WalScan::default();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let remaining = &bytes[offset..];
        if remaining.len() < LEN_PREFIX {
            break;
        }
        let len = u32::from_le_bytes([remaining[0], remaining[1], remaining[2], remaining[3]])
            as usize;
        let Some(body) = remaining.get(LEN_PREFIX..LEN_PREFIX + len) else {
            break;
        };
        let Ok(frame) = WalFrame::from_bytes(body) else {
            break;
        };
        offset += LEN_PREFIX + len;
        scan.frames.push((frame, offset as u64));
    }

    scan.valid_len = offset as u64;
    scan.torn = offset < bytes.len();
    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDef, FieldType, ScalarType};

    fn header() -> StoreHeader {
        StoreHeader {
            format: STORE_FORMAT,
            version: "1.0.0".to_string(),
            checksum: "00".repeat(32),
            generation: 3,
        }
    }

    fn frame(sequence: u64) -> WalFrame {
        WalFrame {
            generation: 3,
            sequence,
            op: WalOp::Put {
                entity: "Habit".to_string(),
                row: StoredRow {
                    id: [sequence as u8; 16],
                    values: vec![StoredValue {
                        name: "name".to_string(),
                        value: Value::String("Read".to_string()),
                    }],
                },
            },
        }
    }

    #[test]
    fn test_primary_file() {
        let body = StoreBody {
            tables: vec![StoredTable {
                shape: crate::catalog::EntityShape::new("Habit")
                    .with_field(FieldDef::new("name", FieldType::scalar(ScalarType::String))),
                rows: Vec::new(),
            }],
        };
        let bytes = encode_primary(&header(), &body).unwrap();

        assert!(bytes.starts_with(&STORE_MAGIC));
        assert_eq!(decode_header(&bytes).unwrap(), header());
        let (h, b) = decode_primary(&bytes).unwrap();
        assert_eq!(h.generation, 3);
        assert_eq!(b, body);
    }

    #[test]
    fn test_rejects_foreign_file() {
        assert!(matches!(
            decode_header(b"SQLite format 3\0"),
            Err(Error::InvalidData(_))
        ));
        assert!(matches!(decode_header(b"RITUALDB\x40"), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_scan_wal_torn_tail() {
        let mut wal = encode_frame(&frame(0)).unwrap();
        wal.extend(encode_frame(&frame(1)).unwrap());
        let intact = wal.len() as u64;

        let partial = encode_frame(&frame(2)).unwrap();
        wal.extend_from_slice(&partial[..partial.len() / 2]);

        let scan = scan_wal(&wal);
        assert_eq!(scan.frames.len(), 2);
        assert_eq!(scan.valid_len, intact);
        assert!(scan.torn);
        assert_eq!(scan.frames[1].0.sequence, 1);
    }

    #[test]
    fn test_scan_empty_wal() {
        let scan = scan_wal(&[]);
        assert!(scan.frames.is_empty());
        assert!(!scan.torn);
    }
}
