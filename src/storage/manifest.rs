use std::fs;
use chrono::{DateTime, Utc};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::storage::layout::StorageLayout;
use crate::storage::segment::{FileHeader, SegmentId, SegmentMeta};

pub const MANIFEST_MAGIC: &[u8; 8] = b"INKDXMAN";

/// Live segment set of one commit generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub generation: u64,
    pub next_doc_id: u64,
    pub segments: Vec<ManifestEntry>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub meta: SegmentMeta,
    /// Serialized `RoaringBitmap` of deleted ordinals
    pub deletes: Vec<u8>,
}

impl ManifestEntry {
    pub fn new(meta: SegmentMeta, deletes: &RoaringBitmap) -> Result<Self> {
        let mut bytes = Vec::with_capacity(deletes.serialized_size());
        deletes.serialize_into(&mut bytes)?;
        Ok(ManifestEntry { meta, deletes: bytes })
    }

    pub fn deleted(&self) -> Result<RoaringBitmap> {
        RoaringBitmap::deserialize_from(&self.deletes[..])
            .map_err(|e| Error::corrupt(format!("deletion set of segment {}: {}", self.meta.id, e)))
    }
}

impl Manifest {
    pub fn empty() -> Self {
        Manifest {
            generation: 0,
            next_doc_id: 0,
            segments: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn segment_ids(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.segments.iter().map(|e| e.meta.id)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)?;
        Ok(FileHeader::frame(MANIFEST_MAGIC, &body))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let body = FileHeader::verify(MANIFEST_MAGIC, data, "manifest")?;
        bincode::deserialize(body).map_err(|e| Error::corrupt(format!("manifest: {}", e)))
    }

    /// Load the committed manifest; `None` for a fresh directory
    pub fn load(storage: &StorageLayout) -> Result<Option<Self>> {
        let path = storage.manifest_path();
        if !path.exists() {
            return Ok(None);
        }

        let data = fs::read(path)?;
        Self::decode(&data).map(Some)
    }

    /// Atomically replace the manifest on disk
    pub fn store(&self, storage: &StorageLayout, sync: bool) -> Result<()> {
        let data = self.encode()?;
        storage.write_atomic(&storage.manifest_path(), &data, sync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocId;
    use crate::storage::segment::CompressionType;

    fn meta() -> SegmentMeta {
        SegmentMeta {
            id: SegmentId::new(),
            doc_count: 3,
            min_doc_id: DocId(0),
            max_doc_id: DocId(2),
            term_count: 7,
            created_at: Utc::now(),
            idx_bytes: 10,
            seg_bytes: 20,
            compression: CompressionType::Lz4,
        }
    }

    #[test]
    fn stored_manifest_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        assert!(Manifest::load(&layout).unwrap().is_none());

        let mut deletes = RoaringBitmap::new();
        deletes.insert(1);
        let mut manifest = Manifest::empty();
        manifest.generation = 4;
        manifest.next_doc_id = 3;
        manifest.segments.push(ManifestEntry::new(meta(), &deletes).unwrap());
        manifest.store(&layout, true).unwrap();

        let loaded = Manifest::load(&layout).unwrap().unwrap();
        assert_eq!(loaded, manifest);
        assert!(loaded.segments[0].deleted().unwrap().contains(1));
    }

    #[test]
    fn truncated_manifest_is_corrupt() {
        let bytes = Manifest::empty().encode().unwrap();
        let err = Manifest::decode(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(err.is_corrupt());
    }
}
