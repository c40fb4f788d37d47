use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{info, warn};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::IndexStats;
use crate::index::inverted::FieldAnalyzers;
use crate::mvcc::controller::{MVCCController, SegmentView, Snapshot};
use crate::query::cache::QueryCache;
use crate::query::parser::QueryParser;
use crate::reader::index_reader::IndexReader;
use crate::schema::schema::Schema;
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::manifest::Manifest;
use crate::storage::merge_policy::{MergePolicy, TieredMergePolicy};
use crate::storage::segment::SegmentId;
use crate::storage::segment_reader::SegmentReader;
use crate::writer::index_writer::IndexWriter;
use crate::writer::merger::{self, MergeMode, MergeOutcome, MergeScheduler, MergeSignal};

/// State shared by the index handle, its writer, readers and the merge thread
pub(crate) struct IndexState {
    pub config: Config,
    pub schema: Schema,
    pub analyzers: FieldAnalyzers,
    pub parser: QueryParser,
    pub storage: StorageLayout,
    pub mvcc: MVCCController,
    pub cache: QueryCache,
    pub merge_policy: Box<dyn MergePolicy>,
    pub merge_lock: Mutex<()>,              // One merge at a time
    pub writer_active: AtomicBool,
    pub next_doc_id: AtomicU64,             // Next id to hand out, buffered documents included
    pub analysis_pool: Option<ThreadPool>,
    pub merge_signal: Option<Sender<MergeSignal>>,
    _lock: FileLock,
}

impl IndexState {
    /// Ask the background merger to look at the current snapshot
    pub fn notify_merge(&self) {
        if let Some(sender) = &self.merge_signal {
            if sender.send(MergeSignal::Check).is_err() {
                warn!("merge scheduler is gone; skipping merge trigger");
            }
        }
    }
}

/// An open index directory
///
/// Holds the directory lock for its lifetime. Readers and the writer keep the
/// shared state alive on their own, so they may outlive the handle.
pub struct Index {
    pub(crate) state: Arc<IndexState>,
    scheduler: Option<MergeScheduler>,
}

impl Index {
    pub fn open_or_create<P: AsRef<Path>>(path: P, schema: Schema) -> Result<Self> {
        Self::open_or_create_with_config(path, schema, Config::default())
    }

    pub fn open_or_create_with_config<P: AsRef<Path>>(path: P, schema: Schema, config: Config) -> Result<Self> {
        schema.validate()?;
        let storage = StorageLayout::new(path.as_ref().to_path_buf())?;
        let lock = FileLock::acquire(&storage)?;

        Self::check_schema(&storage, &schema, config.sync_on_commit)?;

        let manifest = Manifest::load(&storage)?.unwrap_or_else(Manifest::empty);
        let mut views = Vec::with_capacity(manifest.segments.len());
        for entry in &manifest.segments {
            let reader = SegmentReader::open(&storage, entry.meta.clone())?;
            let deletes = entry.deleted().map_err(Error::into_corrupt)?;
            views.push(SegmentView::new(reader, Arc::new(deletes)));
        }

        let live: HashSet<SegmentId> = manifest.segment_ids().collect();
        match storage.collect_garbage(&live) {
            Ok(0) => {}
            Ok(removed) => info!(removed, "removed leftover files"),
            Err(e) => warn!(error = %e, "garbage collection failed"),
        }

        let snapshot = Snapshot::new(manifest.generation, manifest.next_doc_id, views);
        info!(
            path = %storage.base_dir.display(),
            generation = snapshot.generation,
            segments = snapshot.segments.len(),
            docs = snapshot.num_docs(),
            "index opened"
        );

        let analysis_pool = if config.writer.analysis_threads > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.writer.analysis_threads)
                .thread_name(|i| format!("inkdex-analysis-{}", i))
                .build()
                .map_err(|e| Error::new(ErrorKind::Internal, format!("analysis pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        let (sender, receiver) = if config.merge.background {
            let (sender, receiver) = channel::unbounded();
            (Some(sender), Some(receiver))
        } else {
            (None, None)
        };

        let state = Arc::new(IndexState {
            analyzers: FieldAnalyzers::from_schema(&schema),
            parser: QueryParser::new(schema.clone(), &config.query),
            cache: QueryCache::new(config.cache_size),
            merge_policy: Box::new(TieredMergePolicy::from_config(&config.merge)),
            merge_lock: Mutex::new(()),
            writer_active: AtomicBool::new(false),
            next_doc_id: AtomicU64::new(manifest.next_doc_id),
            mvcc: MVCCController::new(snapshot),
            analysis_pool,
            merge_signal: sender.clone(),
            storage,
            schema,
            config,
            _lock: lock,
        });

        let scheduler = match (sender, receiver) {
            (Some(sender), Some(receiver)) => Some(MergeScheduler::start(Arc::clone(&state), sender, receiver)?),
            _ => None,
        };

        Ok(Index { state, scheduler })
    }

    /// The schema is persisted once and must match on every later open
    fn check_schema(storage: &StorageLayout, schema: &Schema, sync: bool) -> Result<()> {
        let path = storage.schema_path();
        if path.exists() {
            let stored: Schema = serde_json::from_slice(&fs::read(&path)?).map_err(|e| Error::corrupt(format!("schema.json: {}", e)))?;
            if &stored != schema {
                return Err(Error::invalid_argument(format!(
                    "schema does not match the index at {}",
                    storage.base_dir.display()
                )));
            }
            return Ok(());
        }

        let data = serde_json::to_vec_pretty(schema)?;
        storage.write_atomic(&path, &data, sync)
    }

    /// The single writer; a second live writer fails with `InvalidState`
    pub fn new_writer(&self) -> Result<IndexWriter> {
        if self.state.writer_active.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return Err(Error::invalid_state("an index writer is already open"));
        }
        Ok(IndexWriter::new(Arc::clone(&self.state)))
    }

    /// Reader over the snapshot current at this moment
    pub fn new_reader(&self) -> Result<IndexReader> {
        Ok(IndexReader::new(Arc::clone(&self.state)))
    }

    /// Run the merge policy once, synchronously
    pub fn merge_now(&self) -> Result<Option<MergeOutcome>> {
        merger::merge(&self.state, MergeMode::Policy)
    }

    pub fn stats(&self) -> IndexStats {
        let snapshot = self.state.mvcc.current_snapshot();
        IndexStats {
            version: snapshot.version,
            generation: snapshot.generation,
            snapshot_time: snapshot.timestamp,
            segment_count: snapshot.segments.len(),
            live_documents: snapshot.num_docs(),
            deleted_documents: snapshot.num_deleted(),
            disk_bytes: self.state.storage.disk_usage(),
            cache: self.state.cache.stats(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.state.schema
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    pub fn path(&self) -> PathBuf {
        self.state.storage.base_dir.clone()
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::analysis::analyzer::AnalyzerConfig;
    use crate::core::types::{DocId, Document};
    use crate::search::results::{CancellationToken, SearchRequest, SortBy, SortOrder};

    fn schema() -> Schema {
        Schema::new().add_text_field("body", AnalyzerConfig::default())
    }

    fn quiet() -> Config {
        Config::default().with_background_merge(false)
    }

    fn add_all(index: &Index, bodies: &[&str]) {
        let mut writer = index.new_writer().unwrap();
        for body in bodies {
            writer.add_document(Document::new().with_text("body", body)).unwrap();
        }
        writer.commit().unwrap();
    }

    #[test]
    fn second_open_of_a_locked_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _index = Index::open_or_create(dir.path(), schema()).unwrap();
        let err = Index::open_or_create(dir.path(), schema()).err().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        drop(Index::open_or_create(dir.path(), schema()).unwrap());

        let other = schema().add_keyword_field("path");
        let err = Index::open_or_create(dir.path(), other).err().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(Index::open_or_create(dir.path(), schema()).is_ok());
    }

    #[test]
    fn only_one_writer_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open_or_create(dir.path(), schema()).unwrap();
        let writer = index.new_writer().unwrap();
        assert_eq!(index.new_writer().err().unwrap().kind, ErrorKind::InvalidState);
        drop(writer);
        assert!(index.new_writer().is_ok());
    }

    #[test]
    fn terms_and_phrases_over_two_documents() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open_or_create_with_config(dir.path(), schema(), quiet()).unwrap();
        add_all(&index, &["the quick brown fox", "the lazy dog"]);
        let reader = index.new_reader().unwrap();

        let fox = reader.search("fox", 10, 0, SortBy::Relevance).unwrap();
        assert_eq!(fox.doc_ids(), vec![DocId(0)]);

        let the = reader.search("the", 10, 0, SortBy::Relevance).unwrap();
        assert_eq!(the.total_matches, 2);
        assert!(the.hits[0].score >= the.hits[1].score);
        // Equal tf, the shorter document wins
        assert_eq!(the.hits[0].doc_id, DocId(1));

        let phrase = reader.search("\"quick brown\"", 10, 0, SortBy::Relevance).unwrap();
        assert_eq!(phrase.doc_ids(), vec![DocId(0)]);
        let reversed = reader.search("\"brown quick\"", 10, 0, SortBy::Relevance).unwrap();
        assert_eq!(reversed.total_matches, 0);
    }

    #[test]
    fn every_committed_document_is_findable_by_its_key() {
        let dir = tempfile::tempdir().unwrap();
        let schema = schema().add_keyword_field("path");
        let index = Index::open_or_create_with_config(dir.path(), schema, quiet()).unwrap();

        let mut writer = index.new_writer().unwrap();
        let mut ids = Vec::new();
        for i in 0..40 {
            let doc = Document::new()
                .with_text("path", &format!("docs/{}.md", i))
                .with_text("body", "shared words everywhere");
            ids.push(writer.add_document(doc).unwrap());
            if i % 10 == 9 {
                writer.commit().unwrap();
            }
        }

        let reader = index.new_reader().unwrap();
        assert_eq!(reader.segment_count(), 4);
        for (i, id) in ids.iter().enumerate() {
            let results = reader.search(&format!("path:\"docs/{}.md\"", i), 10, 0, SortBy::Relevance).unwrap();
            assert_eq!(results.doc_ids(), vec![*id]);
        }
    }

    #[test]
    fn open_readers_keep_their_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open_or_create_with_config(dir.path(), schema(), quiet()).unwrap();
        add_all(&index, &["alpha", "alpha beta"]);

        let old = index.new_reader().unwrap();
        let mut writer = index.new_writer().unwrap();
        writer.delete_document(DocId(0)).unwrap();
        writer.add_document(Document::new().with_text("body", "alpha gamma")).unwrap();
        writer.commit().unwrap();

        let new = index.new_reader().unwrap();
        assert_eq!(old.search("alpha", 10, 0, SortBy::Relevance).unwrap().doc_ids().len(), 2);
        let mut found = new.search("alpha", 10, 0, SortBy::Relevance).unwrap().doc_ids();
        found.sort();
        assert_eq!(found, vec![DocId(1), DocId(2)]);
        assert!(old.version() < new.version());
    }

    #[test]
    fn pages_are_contiguous_slices_of_one_order() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open_or_create_with_config(dir.path(), schema(), quiet()).unwrap();
        let bodies: Vec<String> = (0..25).map(|i| format!("word {}", "word ".repeat(i % 4))).collect();
        let refs: Vec<&str> = bodies.iter().map(String::as_str).collect();
        add_all(&index, &refs[..12]);
        add_all(&index, &refs[12..]);

        let reader = index.new_reader().unwrap();
        let all = reader.search("word", 30, 0, SortBy::Relevance).unwrap().doc_ids();
        let first = reader.search("word", 10, 0, SortBy::Relevance).unwrap();
        let second = reader.search("word", 10, 10, SortBy::Relevance).unwrap();
        assert_eq!(first.total_matches, 25);
        assert_eq!(first.doc_ids(), all[..10].to_vec());
        assert_eq!(second.doc_ids(), all[10..20].to_vec());
    }

    #[test]
    fn failed_commit_leaves_committed_state_intact() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open_or_create_with_config(dir.path(), schema(), quiet()).unwrap();
        add_all(&index, &["before failure"]);

        let idx_dir = dir.path().join("idx");
        let saved = dir.path().join("idx.saved");
        fs::rename(&idx_dir, &saved).unwrap();
        fs::write(&idx_dir, b"not a directory").unwrap();

        let mut writer = index.new_writer().unwrap();
        writer.add_document(Document::new().with_text("body", "after failure")).unwrap();
        let err = writer.commit().unwrap_err();
        assert!(err.is_write_failure());

        let reader = index.new_reader().unwrap();
        assert_eq!(reader.num_docs(), 1);
        assert_eq!(reader.search("failure", 10, 0, SortBy::Relevance).unwrap().doc_ids(), vec![DocId(0)]);
        assert_eq!(writer.buffered(), 1);

        fs::remove_file(&idx_dir).unwrap();
        fs::rename(&saved, &idx_dir).unwrap();
        writer.commit().unwrap();
        assert_eq!(index.new_reader().unwrap().num_docs(), 2);
    }

    #[test]
    fn corrupt_manifest_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = Index::open_or_create_with_config(dir.path(), schema(), quiet()).unwrap();
            add_all(&index, &["soon corrupt"]);
        }
        let manifest = dir.path().join("meta").join("manifest.bin");
        let mut bytes = fs::read(&manifest).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&manifest, bytes).unwrap();

        let err = Index::open_or_create(dir.path(), schema()).err().unwrap();
        assert!(err.is_corrupt());
    }

    #[test]
    fn leftover_temporary_files_are_ignored_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = Index::open_or_create_with_config(dir.path(), schema(), quiet()).unwrap();
            add_all(&index, &["durable"]);
        }
        let manifest_tmp = dir.path().join("meta").join("manifest.bin.tmp");
        let segment_tmp = dir.path().join("idx").join("half-written.idx.tmp");
        fs::write(&manifest_tmp, b"garbage").unwrap();
        fs::write(&segment_tmp, b"garbage").unwrap();

        let index = Index::open_or_create_with_config(dir.path(), schema(), quiet()).unwrap();
        assert_eq!(index.new_reader().unwrap().num_docs(), 1);
        assert!(!manifest_tmp.exists());
        assert!(!segment_tmp.exists());
    }

    #[test]
    fn identical_content_gives_identical_postings() {
        let bodies = ["to be or not to be", "that is the question"];
        let mut lists = Vec::new();
        for _ in 0..2 {
            let dir = tempfile::tempdir().unwrap();
            let index = Index::open_or_create_with_config(dir.path(), schema(), quiet()).unwrap();
            add_all(&index, &bodies);
            let reader = index.new_reader().unwrap();
            let segment = &reader.snapshot().segments[0].reader;
            lists.push((
                segment.postings("body", "be").unwrap(),
                segment.postings("body", "question").unwrap(),
            ));
        }
        assert_eq!(lists[0], lists[1]);
        assert!(lists[0].0.is_some());
    }

    #[test]
    fn range_filter_and_field_sort() {
        let dir = tempfile::tempdir().unwrap();
        let schema = schema().add_numeric_field("year");
        let index = Index::open_or_create_with_config(dir.path(), schema, quiet()).unwrap();
        let mut writer = index.new_writer().unwrap();
        for (body, year) in [("paper", 1999.0), ("paper", 2005.0), ("paper", 2010.0), ("note", 2007.0)] {
            writer.add_document(Document::new().with_text("body", body).with_number("year", year)).unwrap();
        }
        writer.commit().unwrap();

        let reader = index.new_reader().unwrap();
        let ranged = reader.search("paper AND year:[2000 TO 2010]", 10, 0, SortBy::field("year", SortOrder::Descending)).unwrap();
        assert_eq!(ranged.doc_ids(), vec![DocId(2), DocId(1)]);

        let exclusive = reader.search("year:{2005 TO 2010}", 10, 0, SortBy::Relevance).unwrap();
        assert_eq!(exclusive.doc_ids(), vec![DocId(3)]);
    }

    #[test]
    fn cancelled_and_expired_searches() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open_or_create_with_config(dir.path(), schema(), quiet()).unwrap();
        add_all(&index, &["anything"]);
        let reader = index.new_reader().unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let err = reader.search_with(&SearchRequest::new("anything").with_cancellation(token)).unwrap_err();
        assert!(err.is_cancelled());

        let err = reader.search_with(&SearchRequest::new("anything").with_timeout(Duration::ZERO)).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(reader.search("anything", 10, 0, SortBy::Relevance).unwrap().total_matches, 1);
    }

    #[test]
    fn background_merge_bounds_segment_count() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default().with_merge_thresholds(2, 0.5);
        let index = Index::open_or_create_with_config(dir.path(), schema(), config).unwrap();
        for i in 0..6 {
            add_all(&index, &[&format!("batch {}", i)]);
        }

        let mut segments = usize::MAX;
        for _ in 0..500 {
            segments = index.stats().segment_count;
            if segments <= 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(segments <= 2);
        assert_eq!(index.new_reader().unwrap().search("batch", 10, 0, SortBy::Relevance).unwrap().total_matches, 6);
    }

    #[test]
    fn stats_reflect_the_current_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open_or_create_with_config(dir.path(), schema(), quiet()).unwrap();
        add_all(&index, &["one", "two", "three"]);
        let mut writer = index.new_writer().unwrap();
        writer.delete_document(DocId(2)).unwrap();

        let stats = index.stats();
        assert_eq!(stats.segment_count, 1);
        assert_eq!(stats.live_documents, 2);
        assert_eq!(stats.deleted_documents, 1);
        assert_eq!(stats.generation, 1);
        assert!(stats.disk_bytes > 0);

        writer.commit().unwrap();
        assert_eq!(index.stats().generation, 2);
        assert!(index.merge_now().unwrap().is_none());
    }
}
