use std::sync::Arc;
use tracing::trace;
use crate::core::error::{Error, Result};
use crate::core::index::IndexState;
use crate::core::types::{DocId, StoredDocument};
use crate::mvcc::controller::Snapshot;
use crate::query::ast::Query;
use crate::query::cache::QueryKey;
use crate::scoring::scorer::BM25Scorer;
use crate::search::executor::QueryExecutor;
use crate::search::highlight::{HighlightFragment, Highlighter};
use crate::search::results::{SearchRequest, SearchResults, SortBy};

/// Point-in-time view of the index
///
/// Holds the snapshot current when it was opened; later commits, deletes and
/// merges are invisible to it. Cheap to open, any number may coexist.
pub struct IndexReader {
    state: Arc<IndexState>,
    snapshot: Arc<Snapshot>,
}

impl IndexReader {
    pub(crate) fn new(state: Arc<IndexState>) -> Self {
        let snapshot = state.mvcc.current_snapshot();
        IndexReader { state, snapshot }
    }

    fn executor(&self) -> QueryExecutor<'_> {
        QueryExecutor::new(
            &self.snapshot,
            &self.state.schema,
            &self.state.analyzers,
            &self.state.config.query,
            BM25Scorer::from_params(&self.state.config.scoring),
        )
    }

    pub fn parse(&self, query: &str) -> Result<Query> {
        self.state.parser.parse(query)
    }

    pub fn search(&self, query: &str, limit: usize, offset: usize, sort: SortBy) -> Result<SearchResults> {
        self.search_with(&SearchRequest::new(query).with_limit(limit).with_offset(offset).with_sort(sort))
    }

    pub fn search_with(&self, request: &SearchRequest) -> Result<SearchResults> {
        let query = self.parse(&request.query)?;
        self.execute(&query, request)
    }

    /// Run an already built query
    pub fn search_query(&self, query: &Query, limit: usize, offset: usize, sort: SortBy) -> Result<SearchResults> {
        let request = SearchRequest::new("").with_limit(limit).with_offset(offset).with_sort(sort);
        self.execute(query, &request)
    }

    fn execute(&self, query: &Query, request: &SearchRequest) -> Result<SearchResults> {
        let key = QueryKey {
            version: self.snapshot.version,
            query: format!("{:?}", query),
            limit: request.limit,
            offset: request.offset,
            sort: request.sort.clone(),
        };
        if let Some(results) = self.state.cache.get(&key) {
            trace!(version = key.version, "query cache hit");
            return Ok(results);
        }

        let results = self.executor().execute(query, request)?;
        self.state.cache.put(key, results.clone());
        Ok(results)
    }

    /// Fragments of the stored text fields of `doc_id` with the words `query` matched
    pub fn highlight(&self, doc_id: DocId, query: &str) -> Result<Vec<HighlightFragment>> {
        let query = self.parse(query)?;
        let executor = self.executor();
        Highlighter::new(&executor, &self.state.config.highlight).highlight(doc_id, &query)
    }

    pub fn document(&self, doc_id: DocId) -> Result<StoredDocument> {
        let (segment, ordinal) = self.snapshot.locate(doc_id)
            .filter(|&(segment, ordinal)| !self.snapshot.segments[segment].is_deleted(ordinal))
            .ok_or_else(|| Error::not_found(format!("document {}", doc_id)))?;
        self.snapshot.segments[segment].reader.document(ordinal)
    }

    pub fn num_docs(&self) -> u64 {
        self.snapshot.num_docs()
    }

    pub fn num_deleted(&self) -> u64 {
        self.snapshot.num_deleted()
    }

    pub fn segment_count(&self) -> usize {
        self.snapshot.segments.len()
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::AnalyzerConfig;
    use crate::core::config::Config;
    use crate::core::index::Index;
    use crate::core::types::Document;
    use crate::schema::schema::Schema;

    fn index(dir: &std::path::Path) -> Index {
        let schema = Schema::new().add_text_field("body", AnalyzerConfig::default());
        let index = Index::open_or_create_with_config(dir, schema, Config::default().with_background_merge(false)).unwrap();
        let mut writer = index.new_writer().unwrap();
        for body in ["the quick brown fox", "the lazy dog", "a fox and a dog"] {
            writer.add_document(Document::new().with_text("body", body)).unwrap();
        }
        writer.commit().unwrap();
        index
    }

    #[test]
    fn repeated_search_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path());
        let reader = index.new_reader().unwrap();

        let first = reader.search("fox", 10, 0, SortBy::Relevance).unwrap();
        let second = reader.search("fox", 10, 0, SortBy::Relevance).unwrap();
        assert_eq!(first, second);
        assert_eq!(index.stats().cache.hit_count, 1);
    }

    #[test]
    fn zero_limit_counts_matches_without_hits() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path());
        let reader = index.new_reader().unwrap();
        let counted = reader.search("fox", 0, 0, SortBy::Relevance).unwrap();
        assert!(counted.hits.is_empty());
        assert_eq!(counted.total_matches, 2);
        assert_eq!(counted.total_matches, reader.search("fox", 10, 0, SortBy::Relevance).unwrap().total_matches);
        assert!(reader.search("(fox", 0, 0, SortBy::Relevance).unwrap_err().is_query_syntax());
    }

    #[test]
    fn document_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path());
        let reader = index.new_reader().unwrap();
        assert_eq!(reader.document(DocId(1)).unwrap().text("body"), Some("the lazy dog"));
        assert!(reader.document(DocId(9)).unwrap_err().is_not_found());
    }

    #[test]
    fn highlight_marks_matched_words() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path());
        let reader = index.new_reader().unwrap();

        let fragments = reader.highlight(DocId(0), "quick fox").unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].render("<em>", "</em>"), "the <em>quick</em> brown <em>fox</em>");
        assert!(reader.highlight(DocId(1), "fox").unwrap().is_empty());
    }
}
