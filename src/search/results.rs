use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, FieldValue};

/// Search results container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub total_matches: u64,   // Live documents matching, not just this page
    pub hits: Vec<Hit>,
}

impl SearchResults {
    pub fn empty() -> Self {
        SearchResults { total_matches: 0, hits: Vec::new() }
    }

    pub fn doc_ids(&self) -> Vec<DocId> {
        self.hits.iter().map(|h| h.doc_id).collect()
    }
}

/// One ranked document with its stored fields and the terms that matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub doc_id: DocId,
    pub score: f32,
    pub fields: BTreeMap<String, FieldValue>,
    pub matches: Vec<TermMatch>,
}

/// Positions of an indexed term inside one field of a hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermMatch {
    pub field: String,
    pub term: String,
    pub positions: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortBy {
    #[default]
    Relevance,
    /// Numeric field; documents without a value sort last
    Field { name: String, order: SortOrder },
}

impl SortBy {
    pub fn field(name: &str, order: SortOrder) -> Self {
        SortBy::Field { name: name.to_string(), order }
    }
}

/// Cooperative cancellation flag shared with a running search
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }
}

/// A query string with paging, ordering and cancellation
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    pub offset: usize,
    pub sort: SortBy,
    pub cancel: Option<CancellationToken>,
    pub deadline: Option<Instant>,
}

impl SearchRequest {
    pub fn new(query: &str) -> Self {
        SearchRequest {
            query: query.to_string(),
            limit: 10,
            offset: 0,
            sort: SortBy::Relevance,
            cancel: None,
            deadline: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_sort(mut self, sort: SortBy) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// A timeout too large to represent means no deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    pub fn check_interrupted(&self) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(Error::new(ErrorKind::Cancelled, "search cancelled".to_string()));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::new(ErrorKind::Cancelled, "search deadline exceeded".to_string()));
        }
        Ok(())
    }
}

/// Ranking key of a candidate
#[derive(Debug, Clone, Copy)]
pub enum RankKey {
    Score,
    Field { value: Option<f64>, order: SortOrder },
}

/// A matching document before stored fields are loaded
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub doc_id: DocId,
    pub score: f32,
    pub segment: usize,
    pub ordinal: u32,
    pub key: RankKey,
}

impl Candidate {
    /// `Less` when `self` ranks before `other`; DocId breaks every tie
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        let primary = match (self.key, other.key) {
            (RankKey::Field { value: a, order }, RankKey::Field { value: b, .. }) => match (a, b) {
                (Some(a), Some(b)) => match order {
                    SortOrder::Ascending => a.total_cmp(&b),
                    SortOrder::Descending => b.total_cmp(&a),
                },
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            _ => other.score.total_cmp(&self.score),
        };
        primary.then_with(|| self.doc_id.cmp(&other.doc_id))
    }
}

// Heap order: the worst-ranked candidate is the greatest, so `pop` evicts it
impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

/// Top-K collector for efficient result collection
pub struct TopKCollector {
    pub heap: BinaryHeap<Candidate>,
    pub k: usize,
    pub total_collected: u64,  // Track total documents processed
}

impl TopKCollector {
    pub fn new(k: usize) -> Self {
        TopKCollector {
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4096)),
            k,
            total_collected: 0,
        }
    }

    pub fn collect(&mut self, candidate: Candidate) {
        self.total_collected += 1;
        if self.k == 0 {
            return;
        }

        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate.rank_cmp(worst) == Ordering::Less {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    /// Best first
    pub fn into_sorted(self) -> Vec<Candidate> {
        self.heap.into_sorted_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(doc: u64, score: f32) -> Candidate {
        Candidate { doc_id: DocId(doc), score, segment: 0, ordinal: doc as u32, key: RankKey::Score }
    }

    fn valued(doc: u64, value: Option<f64>, order: SortOrder) -> Candidate {
        Candidate { doc_id: DocId(doc), score: 1.0, segment: 0, ordinal: doc as u32, key: RankKey::Field { value, order } }
    }

    #[test]
    fn keeps_best_k_with_doc_id_tie_break() {
        let mut collector = TopKCollector::new(3);
        for (doc, score) in [(5, 1.0), (1, 2.0), (3, 1.0), (2, 1.0), (4, 3.0)] {
            collector.collect(scored(doc, score));
        }
        assert_eq!(collector.total_collected, 5);
        let ids: Vec<u64> = collector.into_sorted().iter().map(|c| c.doc_id.0).collect();
        assert_eq!(ids, vec![4, 1, 2]);
    }

    #[test]
    fn field_order_puts_missing_values_last() {
        let mut collector = TopKCollector::new(10);
        collector.collect(valued(1, None, SortOrder::Descending));
        collector.collect(valued(2, Some(5.0), SortOrder::Descending));
        collector.collect(valued(3, Some(9.0), SortOrder::Descending));
        collector.collect(valued(4, Some(5.0), SortOrder::Descending));
        let ids: Vec<u64> = collector.into_sorted().iter().map(|c| c.doc_id.0).collect();
        assert_eq!(ids, vec![3, 2, 4, 1]);
    }

    #[test]
    fn cancelled_request_reports_cancelled() {
        let token = CancellationToken::new();
        let request = SearchRequest::new("fox").with_cancellation(token.clone());
        assert!(request.check_interrupted().is_ok());
        token.cancel();
        assert!(request.check_interrupted().unwrap_err().is_cancelled());
    }

    #[test]
    fn unbounded_timeout_means_no_deadline() {
        let request = SearchRequest::new("fox").with_timeout(Duration::MAX);
        assert!(request.deadline.is_none());
        assert!(request.check_interrupted().is_ok());
    }
}
