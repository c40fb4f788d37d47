use std::collections::BTreeMap;
use std::fs;
use chrono::Utc;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::compression::compress::{CompressedBlock, CompressionType};
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, Document, FieldValue};
use crate::index::inverted::{AnalyzedDocument, FieldAnalyzers, InvertedIndex};
use crate::index::term_dict::TermDictionaryBuilder;
use crate::schema::schema::Schema;
use crate::storage::layout::StorageLayout;
use crate::storage::segment::{FileHeader, SegmentId, SegmentMeta, IDX_MAGIC, SEG_MAGIC};

/// A buffered document with the id the writer assigned to it
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDocument {
    pub id: DocId,
    pub doc: Document,
}

/// Header of an `.idx` file, followed by the fst bytes and the postings blob
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct IdxHeader {
    pub doc_ids: Vec<DocId>,
    pub field_lengths: BTreeMap<String, Vec<u32>>,
    pub numeric: BTreeMap<String, Vec<Option<f64>>>,
    pub fst_len: u64,
    pub postings_len: u64,
}

/// Location of one document's compressed stored fields inside a `.seg` file
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct StoredBlock {
    pub offset: u64,
    pub len: u32,
    pub original_size: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SegHeader {
    pub compression: CompressionType,
    pub blocks: Vec<StoredBlock>,
}

/// Everything a segment holds, in ordinal order; produced by a batch or a merge
#[derive(Debug, Default)]
pub struct SegmentData {
    pub doc_ids: Vec<DocId>,
    pub index: InvertedIndex,
    pub field_lengths: BTreeMap<String, Vec<u32>>,
    pub numeric: BTreeMap<String, Vec<Option<f64>>>,
    pub stored: Vec<BTreeMap<String, FieldValue>>,
}

pub struct SegmentWriter<'a> {
    pub storage: &'a StorageLayout,
    pub schema: &'a Schema,
    pub analyzers: &'a FieldAnalyzers,
    pub compression: CompressionType,
    pub sync: bool,
}

impl<'a> SegmentWriter<'a> {
    pub fn new(
        storage: &'a StorageLayout,
        schema: &'a Schema,
        analyzers: &'a FieldAnalyzers,
        compression: CompressionType,
        sync: bool,
    ) -> Self {
        SegmentWriter { storage, schema, analyzers, compression, sync }
    }

    /// Analyze a batch and write it as one new segment
    /// Note: `docs` must be in ascending id order; nothing is visible until a manifest lists it
    pub fn build(&self, docs: &[PendingDocument], pool: Option<&ThreadPool>) -> Result<SegmentMeta> {
        if docs.is_empty() {
            return Err(Error::write("cannot build an empty segment"));
        }
        for doc in docs {
            self.schema.check_document(&doc.doc)?;
        }
        if docs.windows(2).any(|w| w[0].id >= w[1].id) {
            return Err(Error::write("batch document ids are not ascending"));
        }

        let analyzed: Vec<AnalyzedDocument> = match pool {
            Some(pool) => pool.install(|| {
                docs.par_iter().map(|d| self.analyzers.analyze(&d.doc)).collect()
            }),
            None => docs.iter().map(|d| self.analyzers.analyze(&d.doc)).collect(),
        };

        let mut data = SegmentData::default();
        for field in self.analyzers.fields() {
            data.field_lengths.insert(field.to_string(), Vec::with_capacity(docs.len()));
        }
        for field in self.schema.numeric_fields() {
            data.numeric.insert(field.name.clone(), Vec::with_capacity(docs.len()));
        }

        for (ordinal, (pending, analyzed)) in docs.iter().zip(analyzed).enumerate() {
            for (field, lengths) in data.field_lengths.iter_mut() {
                lengths.push(analyzed.field_lengths.get(field).copied().unwrap_or(0));
            }
            for (field, column) in data.numeric.iter_mut() {
                column.push(pending.doc.get_field(field).and_then(FieldValue::as_number));
            }

            let stored = pending.doc.fields.iter()
                .filter(|(name, _)| self.schema.field(name).is_some_and(|f| f.stored))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            data.stored.push(stored);

            data.doc_ids.push(pending.id);
            data.index.add_document(ordinal as u32, analyzed)?;
        }

        self.write(data)
    }

    /// Serialize both files to `*.tmp`, fsync and rename into place
    pub fn write(&self, data: SegmentData) -> Result<SegmentMeta> {
        let id = SegmentId::new();
        let doc_count = data.doc_ids.len() as u32;
        let (min_doc_id, max_doc_id) = match (data.doc_ids.first(), data.doc_ids.last()) {
            (Some(&min), Some(&max)) => (min, max),
            _ => return Err(Error::write("cannot write an empty segment")),
        };
        let term_count = data.index.term_count() as u64;

        let idx_bytes = self.encode_index(&data)?;
        let seg_bytes = self.encode_stored(&data.stored)?;

        let idx_path = self.storage.index_path(&id);
        let seg_path = self.storage.segment_path(&id);
        let written = self.storage.write_atomic(&idx_path, &idx_bytes, self.sync)
            .and_then(|_| self.storage.write_atomic(&seg_path, &seg_bytes, self.sync));
        if let Err(e) = written {
            let _ = fs::remove_file(&idx_path);
            return Err(e.into_write());
        }

        debug!(segment = %id, docs = doc_count, terms = term_count, "segment written");

        Ok(SegmentMeta {
            id,
            doc_count,
            min_doc_id,
            max_doc_id,
            term_count,
            created_at: Utc::now(),
            idx_bytes: idx_bytes.len() as u64,
            seg_bytes: seg_bytes.len() as u64,
            compression: self.compression,
        })
    }

    // [ magic | version | crc ]
    // [ header_len u64 | IdxHeader ]
    // [ fst term dictionary ]
    // [ postings blob ]
    fn encode_index(&self, data: &SegmentData) -> Result<Vec<u8>> {
        let mut dict = TermDictionaryBuilder::new();
        let mut postings = Vec::new();
        for (key, list) in &data.index.postings {
            dict.insert(key, postings.len() as u64)?;
            list.encode(&mut postings)?;
        }
        let fst = dict.finish()?;

        let header = IdxHeader {
            doc_ids: data.doc_ids.clone(),
            field_lengths: data.field_lengths.clone(),
            numeric: data.numeric.clone(),
            fst_len: fst.len() as u64,
            postings_len: postings.len() as u64,
        };
        let header = bincode::serialize(&header)?;

        let mut body = Vec::with_capacity(8 + header.len() + fst.len() + postings.len());
        body.extend_from_slice(&(header.len() as u64).to_le_bytes());
        body.extend_from_slice(&header);
        body.extend_from_slice(&fst);
        body.extend_from_slice(&postings);
        Ok(FileHeader::frame(IDX_MAGIC, &body))
    }

    // [ magic | version | crc ]
    // [ header_len u64 | SegHeader ]
    // [ DOCUMENT 0 ] [ DOCUMENT 1 ] ...
    fn encode_stored(&self, stored: &[BTreeMap<String, FieldValue>]) -> Result<Vec<u8>> {
        let mut blocks = Vec::with_capacity(stored.len());
        let mut payload = Vec::new();

        for fields in stored {
            let raw = bincode::serialize(fields)?;
            let compressed = CompressedBlock::compress(&raw, self.compression)?;
            blocks.push(StoredBlock {
                offset: payload.len() as u64,
                len: compressed.data.len() as u32,
                original_size: raw.len() as u32,
            });
            payload.extend_from_slice(&compressed.data);
        }

        let header = bincode::serialize(&SegHeader { compression: self.compression, blocks })?;
        let mut body = Vec::with_capacity(8 + header.len() + payload.len());
        body.extend_from_slice(&(header.len() as u64).to_le_bytes());
        body.extend_from_slice(&header);
        body.extend_from_slice(&payload);
        Ok(FileHeader::frame(SEG_MAGIC, &body))
    }
}
