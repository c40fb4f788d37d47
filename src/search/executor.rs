use std::time::Instant;
use tracing::debug;
use crate::core::config::QueryConfig;
use crate::core::error::{Error, Result};
use crate::index::inverted::FieldAnalyzers;
use crate::mvcc::controller::Snapshot;
use crate::query::ast::Query;
use crate::query::matcher::MatchContext;
use crate::query::planner::{LogicalPlan, QueryPlanner};
use crate::schema::schema::{FieldType, Schema};
use crate::scoring::scorer::BM25Scorer;
use crate::search::results::{Candidate, Hit, RankKey, SearchRequest, SearchResults, SortBy, SortOrder, TopKCollector};

/// Candidates visited between cancellation checks
const CHECK_INTERVAL: u64 = 1024;

/// Executes a parsed query against one snapshot
pub struct QueryExecutor<'a> {
    pub snapshot: &'a Snapshot,
    pub schema: &'a Schema,
    pub analyzers: &'a FieldAnalyzers,
    pub query_config: &'a QueryConfig,
    pub scorer: BM25Scorer,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(
        snapshot: &'a Snapshot,
        schema: &'a Schema,
        analyzers: &'a FieldAnalyzers,
        query_config: &'a QueryConfig,
        scorer: BM25Scorer,
    ) -> Self {
        QueryExecutor { snapshot, schema, analyzers, query_config, scorer }
    }

    pub fn plan(&self, query: &Query) -> Result<LogicalPlan> {
        QueryPlanner::new(self.schema, self.analyzers, self.query_config).plan(query, self.snapshot)
    }

    /// Uncancellable match context, for single-document lookups
    pub fn context(&self) -> MatchContext<'_> {
        MatchContext::new(self.snapshot, &self.scorer, None)
    }

    pub fn execute(&self, query: &Query, request: &SearchRequest) -> Result<SearchResults> {
        let start = Instant::now();
        request.check_interrupted()?;

        let sort_field = self.sort_field(&request.sort)?;
        let plan = self.plan(query)?;
        debug!(?plan, version = self.snapshot.version, "planned query");

        let context = MatchContext::new(self.snapshot, &self.scorer, Some(request));
        let mut collector = TopKCollector::new(request.offset.saturating_add(request.limit));
        let mut visited = 0u64;

        for (segment, view) in self.snapshot.segments.iter().enumerate() {
            context.check_interrupted()?;
            let mut scorer = context.build(&plan, segment)?;

            let mut doc = scorer.doc();
            while let Some(ordinal) = doc {
                visited += 1;
                if visited % CHECK_INTERVAL == 0 {
                    context.check_interrupted()?;
                }

                if !view.is_deleted(ordinal) {
                    let doc_id = view.reader.doc_id(ordinal)
                        .ok_or_else(|| Error::corrupt(format!("ordinal {} outside segment {}", ordinal, view.reader.id())))?;
                    let key = match sort_field {
                        Some((name, order)) => RankKey::Field { value: view.reader.numeric_value(name, ordinal), order },
                        None => RankKey::Score,
                    };
                    collector.collect(Candidate { doc_id, score: scorer.score(), segment, ordinal, key });
                }
                doc = scorer.advance();
            }
        }

        let total_matches = collector.total_collected;
        let mut hits = Vec::new();
        for candidate in collector.into_sorted().into_iter().skip(request.offset) {
            let reader = &self.snapshot.segments[candidate.segment].reader;
            hits.push(Hit {
                doc_id: candidate.doc_id,
                score: candidate.score,
                fields: reader.stored_fields(candidate.ordinal)?,
                matches: context.matches_at(&plan, candidate.segment, candidate.ordinal)?.unwrap_or_default(),
            });
        }

        debug!(
            total_matches,
            hits = hits.len(),
            visited,
            elapsed_us = start.elapsed().as_micros() as u64,
            "search finished"
        );
        Ok(SearchResults { total_matches, hits })
    }

    fn sort_field<'s>(&self, sort: &'s SortBy) -> Result<Option<(&'s str, SortOrder)>> {
        match sort {
            SortBy::Relevance => Ok(None),
            SortBy::Field { name, order } => match self.schema.field(name) {
                Some(field) if field.field_type == FieldType::Numeric => Ok(Some((name.as_str(), *order))),
                Some(_) => Err(Error::invalid_argument(format!("sort field {} is not numeric", name))),
                None => Err(Error::invalid_argument(format!("unknown sort field {}", name))),
            },
        }
    }
}
