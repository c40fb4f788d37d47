use chrono::{DateTime, Utc};
use crc32fast::Hasher;
use uuid::Uuid;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::core::types::DocId;

pub use crate::compression::compress::CompressionType;

/// Unique segment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub Uuid);

impl SegmentId {
    pub fn new() -> Self {
        SegmentId(Uuid::new_v4())
    }

    pub fn parse(name: &str) -> Option<Self> {
        Uuid::parse_str(name).ok().map(SegmentId)
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Segment description recorded in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub id: SegmentId,
    pub doc_count: u32,
    pub min_doc_id: DocId,
    pub max_doc_id: DocId,
    pub term_count: u64,
    pub created_at: DateTime<Utc>,
    pub idx_bytes: u64,
    pub seg_bytes: u64,
    pub compression: CompressionType,
}

impl SegmentMeta {
    pub fn size_bytes(&self) -> u64 {
        self.idx_bytes + self.seg_bytes
    }
}

pub const IDX_MAGIC: &[u8; 8] = b"INKDXIDX";
pub const SEG_MAGIC: &[u8; 8] = b"INKDXSEG";
pub const FORMAT_VERSION: u32 = 1;

/// Fixed prefix of every segment and manifest file:
/// magic (8) | version (u32 LE) | crc32 of body (u32 LE) | body
pub struct FileHeader;

impl FileHeader {
    pub const SIZE: usize = 16;

    pub fn frame(magic: &[u8; 8], body: &[u8]) -> Vec<u8> {
        let mut hasher = Hasher::new();
        hasher.update(body);

        let mut out = Vec::with_capacity(Self::SIZE + body.len());
        out.extend_from_slice(magic);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&hasher.finalize().to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    /// Verify magic, version and checksum; returns the body
    pub fn verify<'a>(magic: &[u8; 8], data: &'a [u8], what: &str) -> Result<&'a [u8]> {
        if data.len() < Self::SIZE || &data[..8] != magic {
            return Err(Error::corrupt(format!("{}: bad magic", what)));
        }

        let version = read_u32_le(data, 8)?;
        if version != FORMAT_VERSION {
            return Err(Error::corrupt(format!("{}: unsupported format version {}", what, version)));
        }

        let expected = read_u32_le(data, 12)?;
        let body = &data[Self::SIZE..];
        let mut hasher = Hasher::new();
        hasher.update(body);
        if hasher.finalize() != expected {
            return Err(Error::corrupt(format!("{}: checksum mismatch", what)));
        }
        Ok(body)
    }
}

pub(crate) fn read_u32_le(data: &[u8], at: usize) -> Result<u32> {
    let bytes: [u8; 4] = data.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::corrupt("truncated file"))?;
    Ok(u32::from_le_bytes(bytes))
}

pub(crate) fn read_u64_le(data: &[u8], at: usize) -> Result<u64> {
    let bytes: [u8; 8] = data.get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::corrupt("truncated file"))?;
    Ok(u64::from_le_bytes(bytes))
}
