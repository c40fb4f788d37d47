use std::mem;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, info};
use crate::core::error::{Error, Result};
use crate::core::index::IndexState;
use crate::core::types::{DocId, Document};
use crate::index::term_dict::term_key;
use crate::mvcc::controller::{SegmentView, Snapshot};
use crate::schema::schema::FieldType;
use crate::storage::segment::SegmentId;
use crate::storage::segment_reader::SegmentReader;
use crate::storage::segment_writer::{PendingDocument, SegmentWriter};
use crate::writer::merger::{self, MergeMode, MergeOutcome};

/// What one commit published
#[derive(Debug, Clone, PartialEq)]
pub struct CommitInfo {
    pub generation: u64,
    pub version: u64,
    /// The new segment, if any documents were buffered
    pub segment: Option<SegmentId>,
    pub documents: usize,
}

/// Single writer with MVCC
///
/// Buffers added documents until `commit`. Deletes of committed documents are
/// published to new readers at once and persisted by the next commit.
pub struct IndexWriter {
    state: Arc<IndexState>,
    buffer: Vec<PendingDocument>,
    pending_deletes: bool,      // Deletes published but not yet in a manifest
    open: bool,
}

impl IndexWriter {
    pub(crate) fn new(state: Arc<IndexState>) -> Self {
        IndexWriter {
            state,
            buffer: Vec::new(),
            pending_deletes: false,
            open: true,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.open {
            return Err(Error::invalid_state("index writer is closed"));
        }
        Ok(())
    }

    pub fn add_document(&mut self, doc: Document) -> Result<DocId> {
        self.ensure_open()?;
        self.state.schema.check_document(&doc)?;

        let id = DocId(self.state.next_doc_id.fetch_add(1, Ordering::SeqCst));
        self.buffer.push(PendingDocument { id, doc });
        Ok(id)
    }

    /// `false` when the document is already deleted
    pub fn delete_document(&mut self, doc_id: DocId) -> Result<bool> {
        self.ensure_open()?;
        if doc_id.0 >= self.state.next_doc_id.load(Ordering::SeqCst) {
            return Err(Error::not_found(format!("document {} was never added", doc_id)));
        }

        if let Some(i) = self.buffer.iter().position(|p| p.id == doc_id) {
            self.buffer.remove(i);
            return Ok(true);
        }

        let mut deleted = false;
        let published = self.state.mvcc.transition(|base| {
            let Some((segment, ordinal)) = base.locate(doc_id) else {
                return Ok(None);
            };
            let Some(view) = base.segments[segment].with_deleted(ordinal) else {
                return Ok(None);
            };
            let mut segments = base.segments.clone();
            segments[segment] = view;
            deleted = true;
            Ok(Some(Snapshot::new(base.generation, base.next_doc_id, segments)))
        })?;

        if deleted {
            self.pending_deletes = true;
            self.state.cache.evict_before(published.version);
            debug!(doc = %doc_id, version = published.version, "document deleted");
        }
        Ok(deleted)
    }

    pub fn update_document(&mut self, doc_id: DocId, doc: Document) -> Result<DocId> {
        self.ensure_open()?;
        self.state.schema.check_document(&doc)?;
        self.delete_document(doc_id)?;
        self.add_document(doc)
    }

    /// Delete every document whose `field` holds the term `value`; returns how many
    pub fn delete_by_term(&mut self, field: &str, value: &str) -> Result<u64> {
        self.ensure_open()?;
        let token = self.key_token(field, value)?;
        let key = term_key(field, &token);

        let before = self.buffer.len();
        let analyzers = &self.state.analyzers;
        self.buffer.retain(|p| !analyzers.analyze(&p.doc).terms.contains_key(&key));
        let mut removed = (before - self.buffer.len()) as u64;

        let mut committed = 0u64;
        let published = self.state.mvcc.transition(|base| {
            let mut segments = base.segments.clone();
            let mut changed = false;
            for view in segments.iter_mut() {
                let Some(list) = view.reader.postings(field, &token)? else {
                    continue;
                };
                if let Some((next, count)) = view.with_deleted_many(list.ordinals()) {
                    *view = next;
                    committed += count as u64;
                    changed = true;
                }
            }
            if !changed {
                return Ok(None);
            }
            Ok(Some(Snapshot::new(base.generation, base.next_doc_id, segments)))
        })?;

        if committed > 0 {
            self.pending_deletes = true;
            self.state.cache.evict_before(published.version);
        }
        removed += committed;
        debug!(field, value, removed, "deleted by term");
        Ok(removed)
    }

    /// Replace whatever document carries `value` in the key field with `doc`
    pub fn update_by_key(&mut self, field: &str, value: &str, doc: Document) -> Result<DocId> {
        self.ensure_open()?;
        self.state.schema.check_document(&doc)?;
        self.delete_by_term(field, value)?;
        self.add_document(doc)
    }

    /// The single indexed token `value` analyzes to in `field`
    fn key_token(&self, field: &str, value: &str) -> Result<String> {
        let definition = self.state.schema.field(field)
            .ok_or_else(|| Error::invalid_argument(format!("unknown field {}", field)))?;
        if !matches!(definition.field_type, FieldType::Text | FieldType::Keyword) {
            return Err(Error::invalid_argument(format!("field {} is not searchable by term", field)));
        }
        let analyzer = self.state.analyzers.get(field)
            .ok_or_else(|| Error::invalid_argument(format!("field {} has no analyzer", field)))?;

        let mut tokens = analyzer.analyze(value).map(|t| t.text);
        match (tokens.next(), tokens.next()) {
            (Some(token), None) => Ok(token),
            _ => Err(Error::invalid_argument(format!(
                "'{}' does not analyze to a single term in field {}", value, field
            ))),
        }
    }

    /// Build the buffered batch into a segment and publish it with its manifest
    ///
    /// On failure the committed state is untouched and the buffer is kept for a retry.
    pub fn commit(&mut self) -> Result<CommitInfo> {
        self.ensure_open()?;
        let start = Instant::now();
        let state = &self.state;

        if self.buffer.is_empty() && !self.pending_deletes {
            let current = state.mvcc.current_snapshot();
            return Ok(CommitInfo {
                generation: current.generation,
                version: current.version,
                segment: None,
                documents: 0,
            });
        }

        let meta = if self.buffer.is_empty() {
            None
        } else {
            let writer = SegmentWriter::new(
                &state.storage,
                &state.schema,
                &state.analyzers,
                state.config.writer.compression,
                state.config.sync_on_commit,
            );
            let parallel = self.buffer.len() >= state.config.writer.parallel_threshold;
            let pool = state.analysis_pool.as_ref().filter(|_| parallel);
            Some(writer.build(&self.buffer, pool).map_err(Error::into_write)?)
        };

        let reader = match meta {
            Some(meta) => Some(SegmentReader::open(&state.storage, meta).map_err(Error::into_write)?),
            None => None,
        };

        let next_doc_id = state.next_doc_id.load(Ordering::SeqCst);
        let published = state.mvcc.transition(|base| {
            let mut segments = base.segments.clone();
            if let Some(reader) = &reader {
                segments.push(SegmentView::new(Arc::clone(reader), Arc::default()));
            }
            let next = Snapshot::new(base.generation + 1, next_doc_id.max(base.next_doc_id), segments);
            next.to_manifest(next.generation)?
                .store(&state.storage, state.config.sync_on_commit)?;
            Ok(Some(next))
        });

        let published = match published {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if let Some(reader) = &reader {
                    reader.retire();
                }
                return Err(e.into_commit());
            }
        };

        let documents = mem::take(&mut self.buffer).len();
        self.pending_deletes = false;
        state.cache.evict_before(published.version);

        info!(
            generation = published.generation,
            version = published.version,
            documents,
            segments = published.segments.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "commit published"
        );
        state.notify_merge();

        Ok(CommitInfo {
            generation: published.generation,
            version: published.version,
            segment: reader.map(|r| r.id()),
            documents,
        })
    }

    /// Drop buffered documents; their ids stay consumed
    pub fn rollback(&mut self) -> Result<usize> {
        self.ensure_open()?;
        let dropped = mem::take(&mut self.buffer).len();
        debug!(dropped, "buffer rolled back");
        Ok(dropped)
    }

    /// Merge every segment into one, synchronously
    pub fn force_merge(&mut self) -> Result<Option<MergeOutcome>> {
        self.ensure_open()?;
        let outcome = merger::merge(&self.state, MergeMode::All)?;
        if outcome.is_some() {
            // The merge manifest already carries every published delete
            self.pending_deletes = false;
        }
        Ok(outcome)
    }

    /// Further operations fail with `InvalidState`; uncommitted documents are dropped
    pub fn close(&mut self) {
        if self.open {
            self.open = false;
            self.buffer.clear();
            self.state.writer_active.store(false, Ordering::Release);
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::AnalyzerConfig;
    use crate::core::config::Config;
    use crate::core::error::ErrorKind;
    use crate::core::index::Index;
    use crate::schema::schema::Schema;
    use crate::search::results::SortBy;

    fn open(dir: &std::path::Path) -> Index {
        let schema = Schema::new()
            .add_text_field("body", AnalyzerConfig::default())
            .add_keyword_field("path");
        Index::open_or_create_with_config(dir, schema, Config::default().with_background_merge(false)).unwrap()
    }

    fn doc(path: &str, body: &str) -> Document {
        Document::new().with_text("path", path).with_text("body", body)
    }

    #[test]
    fn commit_makes_buffered_documents_visible() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        let mut writer = index.new_writer().unwrap();

        assert_eq!(writer.add_document(doc("a", "hello world")).unwrap(), DocId(0));
        assert_eq!(writer.add_document(doc("b", "hello")).unwrap(), DocId(1));
        assert_eq!(index.new_reader().unwrap().num_docs(), 0);

        let info = writer.commit().unwrap();
        assert_eq!(info.documents, 2);
        assert_eq!(info.generation, 1);
        assert!(info.segment.is_some());
        assert_eq!(index.new_reader().unwrap().num_docs(), 2);
    }

    #[test]
    fn empty_commit_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        let mut writer = index.new_writer().unwrap();
        let info = writer.commit().unwrap();
        assert_eq!(info.segment, None);
        assert_eq!(info.generation, 0);
    }

    #[test]
    fn invalid_document_is_rejected_before_buffering() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        let mut writer = index.new_writer().unwrap();
        let err = writer.add_document(Document::new().with_number("body", 1.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Write);
        assert_eq!(writer.buffered(), 0);
    }

    #[test]
    fn delete_is_visible_to_new_readers_only() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        let mut writer = index.new_writer().unwrap();
        writer.add_document(doc("a", "fox")).unwrap();
        writer.commit().unwrap();

        let before = index.new_reader().unwrap();
        assert!(writer.delete_document(DocId(0)).unwrap());
        assert!(!writer.delete_document(DocId(0)).unwrap());
        assert!(writer.delete_document(DocId(7)).unwrap_err().is_not_found());

        assert_eq!(before.search("fox", 10, 0, SortBy::Relevance).unwrap().total_matches, 1);
        assert_eq!(index.new_reader().unwrap().search("fox", 10, 0, SortBy::Relevance).unwrap().total_matches, 0);
    }

    #[test]
    fn deleting_a_buffered_document_drops_it() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        let mut writer = index.new_writer().unwrap();
        let id = writer.add_document(doc("a", "fox")).unwrap();
        assert!(writer.delete_document(id).unwrap());
        assert_eq!(writer.buffered(), 0);
    }

    #[test]
    fn update_by_key_replaces_committed_and_buffered() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        let mut writer = index.new_writer().unwrap();
        writer.add_document(doc("notes/a.md", "first draft")).unwrap();
        writer.commit().unwrap();

        writer.update_by_key("path", "notes/a.md", doc("notes/a.md", "second draft")).unwrap();
        let id = writer.update_by_key("path", "notes/a.md", doc("notes/a.md", "final draft")).unwrap();
        writer.commit().unwrap();

        let reader = index.new_reader().unwrap();
        assert_eq!(reader.num_docs(), 1);
        let results = reader.search("draft", 10, 0, SortBy::Relevance).unwrap();
        assert_eq!(results.doc_ids(), vec![id]);
        assert_eq!(reader.document(id).unwrap().text("body"), Some("final draft"));
    }

    #[test]
    fn delete_by_term_needs_one_token() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        let mut writer = index.new_writer().unwrap();
        let err = writer.delete_by_term("body", "two words").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert_eq!(writer.delete_by_term("nope", "x").unwrap_err().kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn rollback_consumes_ids() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        let mut writer = index.new_writer().unwrap();
        writer.add_document(doc("a", "one")).unwrap();
        assert_eq!(writer.rollback().unwrap(), 1);
        assert_eq!(writer.add_document(doc("b", "two")).unwrap(), DocId(1));
    }

    #[test]
    fn closed_writer_rejects_operations() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        let mut writer = index.new_writer().unwrap();
        writer.close();
        assert_eq!(writer.add_document(doc("a", "x")).unwrap_err().kind, ErrorKind::InvalidState);
        assert_eq!(writer.commit().unwrap_err().kind, ErrorKind::InvalidState);
        assert!(index.new_writer().is_ok());
    }

    #[test]
    fn deletes_survive_reopen_after_commit() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = open(dir.path());
            let mut writer = index.new_writer().unwrap();
            writer.add_document(doc("a", "kept")).unwrap();
            writer.add_document(doc("b", "removed")).unwrap();
            writer.commit().unwrap();
            writer.delete_document(DocId(1)).unwrap();
            writer.commit().unwrap();
        }
        let index = open(dir.path());
        let reader = index.new_reader().unwrap();
        assert_eq!(reader.num_docs(), 1);
        assert_eq!(reader.num_deleted(), 1);

        let mut writer = index.new_writer().unwrap();
        assert_eq!(writer.add_document(doc("c", "new")).unwrap(), DocId(2));
    }
}
