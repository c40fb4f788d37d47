use std::collections::BTreeMap;
use std::fs;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use crate::compression::compress::{CompressedBlock, CompressionType};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, FieldValue, StoredDocument};
use crate::index::posting::PostingList;
use crate::index::term_dict::TermDictionary;
use crate::mmap::mmap_file::{MmapFile, MmapSlice};
use crate::storage::layout::StorageLayout;
use crate::storage::segment::{read_u64_le, FileHeader, SegmentId, SegmentMeta, IDX_MAGIC, SEG_MAGIC};
use crate::storage::segment_writer::{IdxHeader, SegHeader, StoredBlock};

/// Read-only view of one immutable segment
/// Shared as `Arc<SegmentReader>`; once retired, files are removed when the last reference drops
pub struct SegmentReader {
    pub meta: SegmentMeta,
    idx: MmapFile,
    seg: MmapFile,
    dictionary: TermDictionary<MmapSlice>,
    postings: Range<usize>,
    doc_ids: Vec<DocId>,
    field_lengths: BTreeMap<String, Vec<u32>>,
    numeric: BTreeMap<String, Vec<Option<f64>>>,
    compression: CompressionType,
    blocks: Vec<StoredBlock>,
    stored_start: usize,
    retired: AtomicBool,
    paths: [PathBuf; 2],
}

impl SegmentReader {
    /// Map both files and verify their checksums
    pub fn open(storage: &StorageLayout, meta: SegmentMeta) -> Result<Arc<Self>> {
        let idx_path = storage.index_path(&meta.id);
        let seg_path = storage.segment_path(&meta.id);
        let missing = |e: Error| {
            if e.kind == ErrorKind::Io {
                Error::corrupt(format!("segment {}: {}", meta.id, e.context))
            } else {
                e
            }
        };
        let idx = MmapFile::open_read_only(&idx_path).map_err(missing)?;
        let seg = MmapFile::open_read_only(&seg_path).map_err(missing)?;

        let what = format!("index file of segment {}", meta.id);
        FileHeader::verify(IDX_MAGIC, idx.data(), &what)?;
        let (header, header_end) = read_header::<IdxHeader>(idx.data(), &what)?;

        let fst_range = header_end..header_end + header.fst_len as usize;
        let postings = fst_range.end..fst_range.end + header.postings_len as usize;
        if postings.end != idx.len() {
            return Err(Error::corrupt(format!("{}: section lengths do not add up", what)));
        }
        let dictionary = TermDictionary::open(idx.slice(fst_range).map_err(Error::into_corrupt)?)?;

        let what = format!("stored fields of segment {}", meta.id);
        FileHeader::verify(SEG_MAGIC, seg.data(), &what)?;
        let (stored, stored_start) = read_header::<SegHeader>(seg.data(), &what)?;

        let doc_count = meta.doc_count as usize;
        if header.doc_ids.len() != doc_count || stored.blocks.len() != doc_count {
            return Err(Error::corrupt(format!("segment {}: document count mismatch", meta.id)));
        }
        let columns_ok = header.field_lengths.values().all(|c| c.len() == doc_count)
            && header.numeric.values().all(|c| c.len() == doc_count);
        if !columns_ok {
            return Err(Error::corrupt(format!("segment {}: column length mismatch", meta.id)));
        }

        Ok(Arc::new(SegmentReader {
            meta,
            idx,
            seg,
            dictionary,
            postings,
            doc_ids: header.doc_ids,
            field_lengths: header.field_lengths,
            numeric: header.numeric,
            compression: stored.compression,
            blocks: stored.blocks,
            stored_start,
            retired: AtomicBool::new(false),
            paths: [idx_path, seg_path],
        }))
    }

    pub fn id(&self) -> SegmentId {
        self.meta.id
    }

    pub fn doc_count(&self) -> u32 {
        self.meta.doc_count
    }

    pub fn doc_id(&self, ordinal: u32) -> Option<DocId> {
        self.doc_ids.get(ordinal as usize).copied()
    }

    /// Ordinal of a global id; ids are stored ascending
    pub fn ordinal_of(&self, doc_id: DocId) -> Option<u32> {
        self.doc_ids.binary_search(&doc_id).ok().map(|i| i as u32)
    }

    pub fn dictionary(&self) -> &TermDictionary<MmapSlice> {
        &self.dictionary
    }

    /// Decode the posting list stored at a dictionary offset
    pub fn postings_at(&self, offset: u64) -> Result<PostingList> {
        let blob = &self.idx.data()[self.postings.clone()];
        let start = offset as usize;
        if start >= blob.len() {
            return Err(Error::corrupt(format!("segment {}: posting offset {} out of range", self.meta.id, offset)));
        }
        PostingList::decode(&blob[start..]).map_err(Error::into_corrupt)
    }

    pub fn postings(&self, field: &str, token: &str) -> Result<Option<PostingList>> {
        match self.dictionary.get(field, token) {
            Some(offset) => self.postings_at(offset).map(Some),
            None => Ok(None),
        }
    }

    /// Indexed token count of `field` in a document (BM25 length)
    pub fn field_length(&self, field: &str, ordinal: u32) -> u32 {
        self.field_lengths.get(field)
            .and_then(|c| c.get(ordinal as usize))
            .copied()
            .unwrap_or(0)
    }

    /// Fields with a length column (the indexed fields at build time)
    pub fn meta_fields(&self) -> Vec<String> {
        self.field_lengths.keys().cloned().collect()
    }

    pub fn field_length_column(&self, field: &str) -> Option<&[u32]> {
        self.field_lengths.get(field).map(|c| c.as_slice())
    }

    pub fn numeric_fields(&self) -> Vec<String> {
        self.numeric.keys().cloned().collect()
    }

    pub fn numeric_value(&self, field: &str, ordinal: u32) -> Option<f64> {
        self.numeric.get(field)
            .and_then(|c| c.get(ordinal as usize))
            .copied()
            .flatten()
    }

    pub fn stored_fields(&self, ordinal: u32) -> Result<BTreeMap<String, FieldValue>> {
        let block = self.blocks.get(ordinal as usize)
            .ok_or_else(|| Error::not_found(format!("ordinal {} in segment {}", ordinal, self.meta.id)))?;

        let start = self.stored_start + block.offset as usize;
        let end = start + block.len as usize;
        let data = self.seg.data().get(start..end)
            .ok_or_else(|| Error::corrupt(format!("segment {}: stored block out of range", self.meta.id)))?;

        let raw = CompressedBlock::decompress_raw(data, block.original_size as usize, self.compression)
            .map_err(Error::into_corrupt)?;
        bincode::deserialize(&raw).map_err(|e| Error::corrupt(format!("stored document: {}", e)))
    }

    pub fn document(&self, ordinal: u32) -> Result<StoredDocument> {
        let id = self.doc_id(ordinal)
            .ok_or_else(|| Error::not_found(format!("ordinal {} in segment {}", ordinal, self.meta.id)))?;
        Ok(StoredDocument { id, fields: self.stored_fields(ordinal)? })
    }

    /// Superseded by a merge; files go away with the last reference
    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

impl Drop for SegmentReader {
    fn drop(&mut self) {
        if !self.is_retired() {
            return;
        }
        for path in &self.paths {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove retired segment file");
            }
        }
        debug!(segment = %self.meta.id, "retired segment reclaimed");
    }
}

impl std::fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReader")
            .field("id", &self.meta.id)
            .field("doc_count", &self.meta.doc_count)
            .field("retired", &self.is_retired())
            .finish()
    }
}

/// Reads `header_len u64 | bincode header` right after the file header
fn read_header<T: serde::de::DeserializeOwned>(data: &[u8], what: &str) -> Result<(T, usize)> {
    let len = read_u64_le(data, FileHeader::SIZE)? as usize;
    let start = FileHeader::SIZE + 8;
    let bytes = data.get(start..start + len)
        .ok_or_else(|| Error::corrupt(format!("{}: truncated header", what)))?;
    let header = bincode::deserialize(bytes)
        .map_err(|e| Error::corrupt(format!("{}: {}", what, e)))?;
    Ok((header, start + len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::AnalyzerConfig;
    use crate::core::types::Document;
    use crate::index::inverted::FieldAnalyzers;
    use crate::schema::schema::Schema;
    use crate::storage::segment_writer::{PendingDocument, SegmentWriter};

    fn schema() -> Schema {
        Schema::new()
            .add_text_field("body", AnalyzerConfig::default())
            .add_keyword_field("path")
            .add_numeric_field("size")
    }

    fn build(layout: &StorageLayout, compression: CompressionType) -> SegmentMeta {
        let schema = schema();
        let analyzers = FieldAnalyzers::from_schema(&schema);
        let docs = vec![
            PendingDocument {
                id: DocId(4),
                doc: Document::new().with_text("body", "the quick brown fox").with_text("path", "/a").with_number("size", 10.0),
            },
            PendingDocument {
                id: DocId(9),
                doc: Document::new().with_text("body", "the lazy dog").with_text("path", "/b"),
            },
        ];
        SegmentWriter::new(layout, &schema, &analyzers, compression, true)
            .build(&docs, None)
            .unwrap()
    }

    #[test]
    fn built_segment_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();

        for compression in [CompressionType::None, CompressionType::Lz4, CompressionType::Zstd] {
            let meta = build(&layout, compression);
            let reader = SegmentReader::open(&layout, meta).unwrap();

            assert_eq!(reader.doc_count(), 2);
            assert_eq!(reader.ordinal_of(DocId(9)), Some(1));
            assert_eq!(reader.ordinal_of(DocId(5)), None);

            let the = reader.postings("body", "the").unwrap().unwrap();
            assert_eq!(the.ordinals(), vec![0, 1]);
            let fox = reader.postings("body", "fox").unwrap().unwrap();
            assert_eq!(fox.postings[0].positions, vec![3]);
            assert!(reader.postings("body", "cat").unwrap().is_none());

            assert_eq!(reader.field_length("body", 0), 4);
            assert_eq!(reader.numeric_value("size", 0), Some(10.0));
            assert_eq!(reader.numeric_value("size", 1), None);

            let doc = reader.document(1).unwrap();
            assert_eq!(doc.id, DocId(9));
            assert_eq!(doc.text("body"), Some("the lazy dog"));
        }
    }

    #[test]
    fn corrupted_index_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let meta = build(&layout, CompressionType::Lz4);

        let path = layout.index_path(&meta.id);
        let mut bytes = fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x5a;
        fs::write(&path, bytes).unwrap();

        assert!(SegmentReader::open(&layout, meta).unwrap_err().is_corrupt());
    }

    #[test]
    fn retired_segment_files_removed_on_last_drop() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let meta = build(&layout, CompressionType::Lz4);
        let id = meta.id;

        let reader = SegmentReader::open(&layout, meta).unwrap();
        let held = Arc::clone(&reader);
        reader.retire();
        drop(reader);
        assert!(layout.segment_path(&id).exists());
        drop(held);
        assert!(!layout.segment_path(&id).exists());
        assert!(!layout.index_path(&id).exists());
    }
}
