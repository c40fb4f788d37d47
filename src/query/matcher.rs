use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use crate::core::error::Result;
use crate::index::posting::{PostingCursor, PostingList};
use crate::mvcc::controller::Snapshot;
use crate::query::ast::RangeQuery;
use crate::query::planner::LogicalPlan;
use crate::scoring::scorer::{DocStats, Scorer};
use crate::search::results::{SearchRequest, TermMatch};
use crate::storage::segment_reader::SegmentReader;

/// Doc-at-a-time iterator over the matching ordinals of one segment
/// Note: ordinals only move forward; `score` and `collect_matches` describe the current ordinal
pub trait DocScorer {
    /// Current ordinal, `None` once exhausted
    fn doc(&self) -> Option<u32>;

    fn advance(&mut self) -> Option<u32>;

    /// Move to the first match >= target
    fn seek(&mut self, target: u32) -> Option<u32>;

    fn score(&mut self) -> f32;

    fn collect_matches(&mut self, out: &mut Vec<TermMatch>);
}

/// A term's posting lists in every segment of the snapshot and its live document frequency
pub struct TermEntry {
    pub lists: Vec<Option<Arc<PostingList>>>,
    pub live_df: u64,
}

/// Per-search state: snapshot statistics plus posting lists fetched so far
pub struct MatchContext<'a> {
    pub snapshot: &'a Snapshot,
    pub scorer: &'a dyn Scorer,
    pub request: Option<&'a SearchRequest>,
    terms: RefCell<HashMap<(String, String), Arc<TermEntry>>>,
}

impl<'a> MatchContext<'a> {
    pub fn new(snapshot: &'a Snapshot, scorer: &'a dyn Scorer, request: Option<&'a SearchRequest>) -> Self {
        MatchContext {
            snapshot,
            scorer,
            request,
            terms: RefCell::new(HashMap::new()),
        }
    }

    pub fn check_interrupted(&self) -> Result<()> {
        match self.request {
            Some(request) => request.check_interrupted(),
            None => Ok(()),
        }
    }

    /// Fetch (once per search) the term's postings from every segment
    pub fn term(&self, field: &str, token: &str) -> Result<Arc<TermEntry>> {
        let key = (field.to_string(), token.to_string());
        if let Some(entry) = self.terms.borrow().get(&key) {
            return Ok(Arc::clone(entry));
        }

        let mut lists = Vec::with_capacity(self.snapshot.segments.len());
        let mut live_df = 0u64;
        for view in &self.snapshot.segments {
            self.check_interrupted()?;
            let list = view.reader.postings(field, token)?;
            if let Some(list) = &list {
                live_df += if view.deletes.is_empty() {
                    list.doc_freq() as u64
                } else {
                    list.postings.iter().filter(|p| !view.is_deleted(p.ordinal)).count() as u64
                };
            }
            lists.push(list.map(Arc::new));
        }

        let entry = Arc::new(TermEntry { lists, live_df });
        self.terms.borrow_mut().insert(key, Arc::clone(&entry));
        Ok(entry)
    }

    pub fn idf(&self, live_df: u64) -> f32 {
        self.scorer.idf(self.snapshot.stats.live_docs, live_df)
    }

    /// Scorer for `plan` over one segment of the snapshot
    pub fn build(&self, plan: &LogicalPlan, segment: usize) -> Result<Box<dyn DocScorer + 'a>> {
        let snapshot = self.snapshot;
        let reader: &'a SegmentReader = &snapshot.segments[segment].reader;

        match plan {
            LogicalPlan::Term { field, token } => {
                let entry = self.term(field, token)?;
                let Some(list) = &entry.lists[segment] else {
                    return Ok(Box::new(EmptyScorer));
                };
                Ok(Box::new(TermScorer {
                    cursor: PostingCursor::new(Arc::clone(list)),
                    field: field.clone(),
                    token: token.clone(),
                    idf: self.idf(entry.live_df),
                    field_stats: FieldStats::new(snapshot, reader, field),
                    scorer: self.scorer,
                }))
            }
            LogicalPlan::Phrase { field, terms, slop } => {
                let mut cursors = Vec::with_capacity(terms.len());
                let mut idf = 0.0;
                for (token, _) in terms {
                    let entry = self.term(field, token)?;
                    idf += self.idf(entry.live_df);
                    match &entry.lists[segment] {
                        Some(list) => cursors.push(PostingCursor::new(Arc::clone(list))),
                        None => return Ok(Box::new(EmptyScorer)),
                    }
                }
                Ok(Box::new(PhraseScorer::new(
                    cursors,
                    terms.clone(),
                    *slop,
                    field.clone(),
                    idf,
                    FieldStats::new(snapshot, reader, field),
                    self.scorer,
                )))
            }
            LogicalPlan::Bool { must, should, must_not } => {
                let mut required = Vec::with_capacity(must.len());
                for plan in must {
                    let scorer = self.build(plan, segment)?;
                    if scorer.doc().is_none() {
                        return Ok(Box::new(EmptyScorer));
                    }
                    required.push(scorer);
                }
                let optional = self.build_live(should, segment)?;
                let excluded = self.build_live(must_not, segment)?;

                let required = match required.len() {
                    0 => None,
                    1 => required.pop(),
                    _ => Some(ConjunctionScorer::boxed(required)),
                };
                let optional = disjunction(optional);

                let base: Box<dyn DocScorer + 'a> = match (required, optional) {
                    (Some(required), Some(optional)) => Box::new(ReqOptScorer { required, optional }),
                    (Some(required), None) => required,
                    (None, Some(optional)) => optional,
                    (None, None) => return Ok(Box::new(EmptyScorer)),
                };

                Ok(match disjunction(excluded) {
                    Some(excluded) => ExclusionScorer::boxed(base, excluded),
                    None => base,
                })
            }
            LogicalPlan::Range(query) => Ok(Box::new(RangeScorer::new(reader, query.clone()))),
            LogicalPlan::MatchAll => Ok(Box::new(AllScorer { current: first(reader.doc_count()), doc_count: reader.doc_count() })),
            LogicalPlan::Empty => Ok(Box::new(EmptyScorer)),
        }
    }

    /// Scorers that match at least one ordinal
    fn build_live(&self, plans: &[LogicalPlan], segment: usize) -> Result<Vec<Box<dyn DocScorer + 'a>>> {
        let mut scorers = Vec::with_capacity(plans.len());
        for plan in plans {
            let scorer = self.build(plan, segment)?;
            if scorer.doc().is_some() {
                scorers.push(scorer);
            }
        }
        Ok(scorers)
    }

    /// Term matches of `plan` at one ordinal, or `None` if it does not match there
    pub fn matches_at(&self, plan: &LogicalPlan, segment: usize, ordinal: u32) -> Result<Option<Vec<TermMatch>>> {
        let mut scorer = self.build(plan, segment)?;
        if scorer.seek(ordinal) != Some(ordinal) {
            return Ok(None);
        }

        let mut raw = Vec::new();
        scorer.collect_matches(&mut raw);

        let mut merged: BTreeMap<(String, String), Vec<u32>> = BTreeMap::new();
        for m in raw {
            merged.entry((m.field, m.term)).or_default().extend(m.positions);
        }
        Ok(Some(merged.into_iter()
            .map(|((field, term), mut positions)| {
                positions.sort_unstable();
                positions.dedup();
                TermMatch { field, term, positions }
            })
            .collect()))
    }
}

fn first(doc_count: u32) -> Option<u32> {
    if doc_count > 0 { Some(0) } else { None }
}

fn disjunction<'a>(mut scorers: Vec<Box<dyn DocScorer + 'a>>) -> Option<Box<dyn DocScorer + 'a>> {
    match scorers.len() {
        0 => None,
        1 => scorers.pop(),
        _ => Some(DisjunctionScorer::boxed(scorers)),
    }
}

/// Field length column and live average for BM25 normalization
struct FieldStats<'a> {
    lengths: Option<&'a [u32]>,
    avg_length: f32,
}

impl<'a> FieldStats<'a> {
    fn new(snapshot: &Snapshot, reader: &'a SegmentReader, field: &str) -> Self {
        FieldStats {
            lengths: reader.field_length_column(field),
            avg_length: snapshot.stats.avg_field_length(field),
        }
    }

    fn doc_stats(&self, ordinal: u32) -> DocStats {
        DocStats {
            doc_length: self.lengths.and_then(|l| l.get(ordinal as usize)).copied().unwrap_or(0),
            avg_doc_length: self.avg_length,
        }
    }
}

struct EmptyScorer;

impl DocScorer for EmptyScorer {
    fn doc(&self) -> Option<u32> { None }
    fn advance(&mut self) -> Option<u32> { None }
    fn seek(&mut self, _target: u32) -> Option<u32> { None }
    fn score(&mut self) -> f32 { 0.0 }
    fn collect_matches(&mut self, _out: &mut Vec<TermMatch>) {}
}

/// Constant score 1.0 over every ordinal
struct AllScorer {
    current: Option<u32>,
    doc_count: u32,
}

impl DocScorer for AllScorer {
    fn doc(&self) -> Option<u32> {
        self.current
    }

    fn advance(&mut self) -> Option<u32> {
        self.current = self.current.and_then(|c| c.checked_add(1)).filter(|&c| c < self.doc_count);
        self.current
    }

    fn seek(&mut self, target: u32) -> Option<u32> {
        if let Some(current) = self.current {
            if target > current {
                self.current = Some(target).filter(|&t| t < self.doc_count);
            }
        }
        self.current
    }

    fn score(&mut self) -> f32 {
        1.0
    }

    fn collect_matches(&mut self, _out: &mut Vec<TermMatch>) {}
}

/// Constant score 1.0 over ordinals whose numeric value lies in the range
struct RangeScorer<'a> {
    reader: &'a SegmentReader,
    query: RangeQuery,
    current: Option<u32>,
}

impl<'a> RangeScorer<'a> {
    fn new(reader: &'a SegmentReader, query: RangeQuery) -> Self {
        let mut scorer = RangeScorer { reader, query, current: None };
        scorer.current = scorer.find_from(0);
        scorer
    }

    fn find_from(&self, start: u32) -> Option<u32> {
        (start..self.reader.doc_count()).find(|&ordinal| {
            self.reader.numeric_value(&self.query.field, ordinal)
                .is_some_and(|value| self.query.contains(value))
        })
    }
}

impl<'a> DocScorer for RangeScorer<'a> {
    fn doc(&self) -> Option<u32> {
        self.current
    }

    fn advance(&mut self) -> Option<u32> {
        self.current = self.current.and_then(|c| c.checked_add(1)).and_then(|next| self.find_from(next));
        self.current
    }

    fn seek(&mut self, target: u32) -> Option<u32> {
        if self.current.is_some_and(|c| c < target) {
            self.current = self.find_from(target);
        }
        self.current
    }

    fn score(&mut self) -> f32 {
        1.0
    }

    fn collect_matches(&mut self, _out: &mut Vec<TermMatch>) {}
}

/// BM25 over one posting list
struct TermScorer<'a> {
    cursor: PostingCursor,
    field: String,
    token: String,
    idf: f32,
    field_stats: FieldStats<'a>,
    scorer: &'a dyn Scorer,
}

impl<'a> DocScorer for TermScorer<'a> {
    fn doc(&self) -> Option<u32> {
        self.cursor.doc()
    }

    fn advance(&mut self) -> Option<u32> {
        self.cursor.advance()
    }

    fn seek(&mut self, target: u32) -> Option<u32> {
        self.cursor.seek(target)
    }

    fn score(&mut self) -> f32 {
        match self.cursor.posting() {
            Some(posting) => self.scorer.score(
                posting.term_freq as f32,
                self.idf,
                &self.field_stats.doc_stats(posting.ordinal),
            ),
            None => 0.0,
        }
    }

    fn collect_matches(&mut self, out: &mut Vec<TermMatch>) {
        if let Some(posting) = self.cursor.posting() {
            out.push(TermMatch {
                field: self.field.clone(),
                term: self.token.clone(),
                positions: posting.positions.clone(),
            });
        }
    }
}

/// All terms present with positions `p_i` such that |(p_i - p_0) - offset_i| <= slop
struct PhraseScorer<'a> {
    cursors: Vec<PostingCursor>,
    terms: Vec<(String, u32)>,
    slop: u32,
    field: String,
    idf: f32,
    field_stats: FieldStats<'a>,
    scorer: &'a dyn Scorer,
    current: Option<u32>,
    freq: u32,
}

impl<'a> PhraseScorer<'a> {
    fn new(
        cursors: Vec<PostingCursor>,
        terms: Vec<(String, u32)>,
        slop: u32,
        field: String,
        idf: f32,
        field_stats: FieldStats<'a>,
        scorer: &'a dyn Scorer,
    ) -> Self {
        let mut phrase = PhraseScorer {
            cursors,
            terms,
            slop,
            field,
            idf,
            field_stats,
            scorer,
            current: None,
            freq: 0,
        };
        phrase.current = phrase.settle(Some(0));
        phrase
    }

    /// First ordinal >= target where every term occurs and positions line up
    fn settle(&mut self, mut target: Option<u32>) -> Option<u32> {
        while let Some(start) = target {
            let doc = align(&mut self.cursors, start)?;
            let freq = self.visit_matches(|_, _| {});
            if freq > 0 {
                self.freq = freq;
                return Some(doc);
            }
            target = doc.checked_add(1);
        }
        None
    }

    /// Call `visit(term index, position)` for each matched occurrence; returns the phrase frequency
    fn visit_matches<F: FnMut(usize, u32)>(&self, mut visit: F) -> u32 {
        let mut lists = Vec::with_capacity(self.cursors.len());
        for cursor in &self.cursors {
            match cursor.posting() {
                Some(posting) => lists.push(&posting.positions),
                None => return 0,
            }
        }

        let slop = self.slop as i64;
        let mut freq = 0;
        let mut matched = Vec::with_capacity(lists.len());

        'start: for &p0 in lists[0] {
            matched.clear();
            matched.push(p0);
            for (i, positions) in lists.iter().enumerate().skip(1) {
                let expected = p0 as i64 + self.terms[i].1 as i64;
                let low = (expected - slop).max(0);
                let at = positions.partition_point(|&p| (p as i64) < low);
                match positions.get(at) {
                    Some(&p) if (p as i64) <= expected + slop => matched.push(p),
                    _ => continue 'start,
                }
            }
            freq += 1;
            for (i, &p) in matched.iter().enumerate() {
                visit(i, p);
            }
        }
        freq
    }
}

/// Leap-frog every cursor to a common ordinal >= target
fn align(cursors: &mut [PostingCursor], target: u32) -> Option<u32> {
    let mut doc = target;
    'align: loop {
        for cursor in cursors.iter_mut() {
            let found = cursor.seek(doc)?;
            if found > doc {
                doc = found;
                continue 'align;
            }
        }
        return Some(doc);
    }
}

impl<'a> DocScorer for PhraseScorer<'a> {
    fn doc(&self) -> Option<u32> {
        self.current
    }

    fn advance(&mut self) -> Option<u32> {
        let next = self.current.and_then(|c| c.checked_add(1));
        self.current = self.settle(next);
        self.current
    }

    fn seek(&mut self, target: u32) -> Option<u32> {
        if self.current.is_some_and(|c| c < target) {
            self.current = self.settle(Some(target));
        }
        self.current
    }

    fn score(&mut self) -> f32 {
        match self.current {
            Some(ordinal) => self.scorer.score(self.freq as f32, self.idf, &self.field_stats.doc_stats(ordinal)),
            None => 0.0,
        }
    }

    fn collect_matches(&mut self, out: &mut Vec<TermMatch>) {
        if self.current.is_none() {
            return;
        }
        let mut positions: Vec<Vec<u32>> = vec![Vec::new(); self.terms.len()];
        self.visit_matches(|i, p| positions[i].push(p));

        for ((term, _), positions) in self.terms.iter().zip(positions) {
            out.push(TermMatch { field: self.field.clone(), term: term.clone(), positions });
        }
    }
}

/// Intersection; scores sum
struct ConjunctionScorer<'a> {
    children: Vec<Box<dyn DocScorer + 'a>>,
    current: Option<u32>,
}

impl<'a> ConjunctionScorer<'a> {
    fn boxed(children: Vec<Box<dyn DocScorer + 'a>>) -> Box<dyn DocScorer + 'a> {
        let mut scorer = ConjunctionScorer { children, current: None };
        scorer.current = scorer.settle(0);
        Box::new(scorer)
    }

    fn settle(&mut self, target: u32) -> Option<u32> {
        let mut doc = target;
        'align: loop {
            for child in self.children.iter_mut() {
                let found = child.seek(doc)?;
                if found > doc {
                    doc = found;
                    continue 'align;
                }
            }
            return Some(doc);
        }
    }
}

impl<'a> DocScorer for ConjunctionScorer<'a> {
    fn doc(&self) -> Option<u32> {
        self.current
    }

    fn advance(&mut self) -> Option<u32> {
        self.current = match self.current.and_then(|c| c.checked_add(1)) {
            Some(next) => self.settle(next),
            None => None,
        };
        self.current
    }

    fn seek(&mut self, target: u32) -> Option<u32> {
        if self.current.is_some_and(|c| c < target) {
            self.current = self.settle(target);
        }
        self.current
    }

    fn score(&mut self) -> f32 {
        self.children.iter_mut().map(|c| c.score()).sum()
    }

    fn collect_matches(&mut self, out: &mut Vec<TermMatch>) {
        for child in self.children.iter_mut() {
            child.collect_matches(out);
        }
    }
}

/// Union; scores of the children positioned on the current ordinal sum
struct DisjunctionScorer<'a> {
    children: Vec<Box<dyn DocScorer + 'a>>,
    current: Option<u32>,
}

impl<'a> DisjunctionScorer<'a> {
    fn boxed(children: Vec<Box<dyn DocScorer + 'a>>) -> Box<dyn DocScorer + 'a> {
        let mut scorer = DisjunctionScorer { children, current: None };
        scorer.refresh();
        Box::new(scorer)
    }

    fn refresh(&mut self) {
        self.current = self.children.iter().filter_map(|c| c.doc()).min();
    }
}

impl<'a> DocScorer for DisjunctionScorer<'a> {
    fn doc(&self) -> Option<u32> {
        self.current
    }

    fn advance(&mut self) -> Option<u32> {
        let current = self.current?;
        for child in self.children.iter_mut() {
            if child.doc() == Some(current) {
                child.advance();
            }
        }
        self.refresh();
        self.current
    }

    fn seek(&mut self, target: u32) -> Option<u32> {
        if self.current.is_some_and(|c| c < target) {
            for child in self.children.iter_mut() {
                if child.doc().is_some_and(|d| d < target) {
                    child.seek(target);
                }
            }
            self.refresh();
        }
        self.current
    }

    fn score(&mut self) -> f32 {
        let Some(current) = self.current else {
            return 0.0;
        };
        self.children.iter_mut()
            .filter(|c| c.doc() == Some(current))
            .map(|c| c.score())
            .sum()
    }

    fn collect_matches(&mut self, out: &mut Vec<TermMatch>) {
        let Some(current) = self.current else {
            return;
        };
        for child in self.children.iter_mut().filter(|c| c.doc() == Some(current)) {
            child.collect_matches(out);
        }
    }
}

/// Required clauses decide the match; optional ones only add score
struct ReqOptScorer<'a> {
    required: Box<dyn DocScorer + 'a>,
    optional: Box<dyn DocScorer + 'a>,
}

impl<'a> ReqOptScorer<'a> {
    fn optional_matches(&mut self) -> bool {
        match self.required.doc() {
            Some(doc) => self.optional.seek(doc) == Some(doc),
            None => false,
        }
    }
}

impl<'a> DocScorer for ReqOptScorer<'a> {
    fn doc(&self) -> Option<u32> {
        self.required.doc()
    }

    fn advance(&mut self) -> Option<u32> {
        self.required.advance()
    }

    fn seek(&mut self, target: u32) -> Option<u32> {
        self.required.seek(target)
    }

    fn score(&mut self) -> f32 {
        let mut score = self.required.score();
        if self.optional_matches() {
            score += self.optional.score();
        }
        score
    }

    fn collect_matches(&mut self, out: &mut Vec<TermMatch>) {
        self.required.collect_matches(out);
        if self.optional_matches() {
            self.optional.collect_matches(out);
        }
    }
}

/// Required matches minus excluded ones
struct ExclusionScorer<'a> {
    required: Box<dyn DocScorer + 'a>,
    excluded: Box<dyn DocScorer + 'a>,
}

impl<'a> ExclusionScorer<'a> {
    fn boxed(required: Box<dyn DocScorer + 'a>, excluded: Box<dyn DocScorer + 'a>) -> Box<dyn DocScorer + 'a> {
        let mut scorer = ExclusionScorer { required, excluded };
        let start = scorer.required.doc();
        scorer.settle(start);
        Box::new(scorer)
    }

    fn settle(&mut self, mut doc: Option<u32>) -> Option<u32> {
        while let Some(d) = doc {
            if self.excluded.seek(d) != Some(d) {
                break;
            }
            doc = self.required.advance();
        }
        doc
    }
}

impl<'a> DocScorer for ExclusionScorer<'a> {
    fn doc(&self) -> Option<u32> {
        self.required.doc()
    }

    fn advance(&mut self) -> Option<u32> {
        let next = self.required.advance();
        self.settle(next)
    }

    fn seek(&mut self, target: u32) -> Option<u32> {
        let next = self.required.seek(target);
        self.settle(next)
    }

    fn score(&mut self) -> f32 {
        self.required.score()
    }

    fn collect_matches(&mut self, out: &mut Vec<TermMatch>) {
        self.required.collect_matches(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::AnalyzerConfig;
    use crate::core::types::{DocId, Document};
    use crate::index::inverted::FieldAnalyzers;
    use crate::mvcc::controller::SegmentView;
    use crate::schema::schema::Schema;
    use crate::scoring::scorer::BM25Scorer;
    use crate::storage::layout::StorageLayout;
    use crate::storage::segment::CompressionType;
    use crate::storage::segment_reader::SegmentReader;
    use crate::storage::segment_writer::{PendingDocument, SegmentWriter};
    use roaring::RoaringBitmap;

    const BODIES: [&str; 5] = [
        "the quick brown fox",
        "the lazy dog",
        "quick brown dogs and a quick fox",
        "brown fox quick",
        "a fox",
    ];

    fn snapshot(dir: &std::path::Path, deleted: &[u32]) -> Snapshot {
        let schema = Schema::new()
            .add_text_field("body", AnalyzerConfig::default())
            .add_numeric_field("size");
        let analyzers = FieldAnalyzers::from_schema(&schema);
        let layout = StorageLayout::new(dir.to_path_buf()).unwrap();
        let docs: Vec<PendingDocument> = BODIES.iter().enumerate()
            .map(|(i, body)| PendingDocument {
                id: DocId(i as u64),
                doc: Document::new().with_text("body", body).with_number("size", i as f64 * 10.0),
            })
            .collect();
        let meta = SegmentWriter::new(&layout, &schema, &analyzers, CompressionType::None, false)
            .build(&docs, None)
            .unwrap();
        let reader = SegmentReader::open(&layout, meta).unwrap();
        let deletes: RoaringBitmap = deleted.iter().copied().collect();
        Snapshot::new(1, BODIES.len() as u64, vec![SegmentView::new(reader, Arc::new(deletes))])
    }

    fn term(token: &str) -> LogicalPlan {
        LogicalPlan::Term { field: "body".into(), token: token.into() }
    }

    fn ordinals(context: &MatchContext, plan: &LogicalPlan) -> Vec<u32> {
        let mut scorer = context.build(plan, 0).unwrap();
        let mut out = Vec::new();
        let mut doc = scorer.doc();
        while let Some(d) = doc {
            out.push(d);
            doc = scorer.advance();
        }
        out
    }

    #[test]
    fn boolean_combinations() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = snapshot(dir.path(), &[]);
        let scorer = BM25Scorer::default();
        let context = MatchContext::new(&snapshot, &scorer, None);

        let and = LogicalPlan::Bool { must: vec![term("quick"), term("fox")], should: vec![], must_not: vec![] };
        assert_eq!(ordinals(&context, &and), vec![0, 2, 3]);

        let or = LogicalPlan::Bool { must: vec![], should: vec![term("dog"), term("dogs")], must_not: vec![] };
        assert_eq!(ordinals(&context, &or), vec![1, 2]);

        let not = LogicalPlan::Bool { must: vec![term("fox")], should: vec![], must_not: vec![term("quick")] };
        assert_eq!(ordinals(&context, &not), vec![4]);

        let all_but = LogicalPlan::Bool { must: vec![LogicalPlan::MatchAll], should: vec![], must_not: vec![term("the")] };
        assert_eq!(ordinals(&context, &all_but), vec![2, 3, 4]);
    }

    #[test]
    fn phrase_positions_and_slop() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = snapshot(dir.path(), &[]);
        let scorer = BM25Scorer::default();
        let context = MatchContext::new(&snapshot, &scorer, None);

        let exact = LogicalPlan::Phrase { field: "body".into(), terms: vec![("quick".into(), 0), ("brown".into(), 1)], slop: 0 };
        assert_eq!(ordinals(&context, &exact), vec![0, 2]);

        let gap = LogicalPlan::Phrase { field: "body".into(), terms: vec![("quick".into(), 0), ("fox".into(), 1)], slop: 0 };
        assert_eq!(ordinals(&context, &gap), vec![2]);

        let sloppy = LogicalPlan::Phrase { field: "body".into(), terms: vec![("quick".into(), 0), ("fox".into(), 1)], slop: 1 };
        assert_eq!(ordinals(&context, &sloppy), vec![0, 2]);

        // "brown fox quick": fox sits two positions away from where the phrase expects it
        let reordered = LogicalPlan::Phrase { field: "body".into(), terms: vec![("quick".into(), 0), ("fox".into(), 1)], slop: 2 };
        assert_eq!(ordinals(&context, &reordered), vec![0, 2, 3]);

        let matches = context.matches_at(&exact, 0, 2).unwrap().unwrap();
        assert_eq!(matches, vec![
            TermMatch { field: "body".into(), term: "brown".into(), positions: vec![1] },
            TermMatch { field: "body".into(), term: "quick".into(), positions: vec![0] },
        ]);
        assert!(context.matches_at(&exact, 0, 1).unwrap().is_none());
    }

    #[test]
    fn ranges_and_scores() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = snapshot(dir.path(), &[]);
        let scorer = BM25Scorer::default();
        let context = MatchContext::new(&snapshot, &scorer, None);

        let range = LogicalPlan::Range(RangeQuery {
            field: "size".into(), lower: Some(10.0), upper: Some(30.0), include_lower: false, include_upper: true,
        });
        assert_eq!(ordinals(&context, &range), vec![2, 3]);

        // Shortest field wins among single occurrences of "fox"
        let mut fox = context.build(&term("fox"), 0).unwrap();
        let mut scores = Vec::new();
        while let Some(d) = fox.doc() {
            scores.push((d, fox.score()));
            fox.advance();
        }
        let best = scores.iter().max_by(|a, b| a.1.total_cmp(&b.1)).unwrap();
        assert_eq!(best.0, 4);
    }

    #[test]
    fn deleted_documents_leave_document_frequency() {
        let dir = tempfile::tempdir().unwrap();
        let live = snapshot(dir.path(), &[]);
        let dir2 = tempfile::tempdir().unwrap();
        let pruned = snapshot(dir2.path(), &[0, 3]);
        let scorer = BM25Scorer::default();

        assert_eq!(MatchContext::new(&live, &scorer, None).term("body", "fox").unwrap().live_df, 4);
        assert_eq!(MatchContext::new(&pruned, &scorer, None).term("body", "fox").unwrap().live_df, 2);
    }
}
