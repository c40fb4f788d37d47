use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use serde::{Serialize, Deserialize};
use crate::core::config::HighlightConfig;
use crate::core::error::{Error, Result};
use crate::core::types::DocId;
use crate::query::ast::Query;
use crate::search::executor::QueryExecutor;

/// A window of stored text around matched words
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightFragment {
    pub field: String,
    pub text: String,
    /// Byte ranges into `text`, ascending and disjoint
    pub spans: Vec<Range<usize>>,
}

impl HighlightFragment {
    /// Wrap every span in `pre`/`post`
    pub fn render(&self, pre: &str, post: &str) -> String {
        let mut out = String::with_capacity(self.text.len() + self.spans.len() * (pre.len() + post.len()));
        let mut cursor = 0;
        for span in &self.spans {
            out.push_str(&self.text[cursor..span.start]);
            out.push_str(pre);
            out.push_str(&self.text[span.clone()]);
            out.push_str(post);
            cursor = span.end;
        }
        out.push_str(&self.text[cursor..]);
        out
    }
}

/// Maps the match positions of a query back to byte spans of the stored text
pub struct Highlighter<'a> {
    pub executor: &'a QueryExecutor<'a>,
    pub config: &'a HighlightConfig,
}

impl<'a> Highlighter<'a> {
    pub fn new(executor: &'a QueryExecutor<'a>, config: &'a HighlightConfig) -> Self {
        Highlighter { executor, config }
    }

    /// Fragments per stored field; empty when the document does not match `query`
    pub fn highlight(&self, doc_id: DocId, query: &Query) -> Result<Vec<HighlightFragment>> {
        let snapshot = self.executor.snapshot;
        let (segment, ordinal) = snapshot.locate(doc_id)
            .filter(|&(segment, ordinal)| !snapshot.segments[segment].is_deleted(ordinal))
            .ok_or_else(|| Error::not_found(format!("document {}", doc_id)))?;

        let plan = self.executor.plan(query)?;
        let Some(matches) = self.executor.context().matches_at(&plan, segment, ordinal)? else {
            return Ok(Vec::new());
        };

        let mut positions: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();
        for m in matches {
            positions.entry(m.field).or_default().extend(m.positions);
        }

        let stored = snapshot.segments[segment].reader.stored_fields(ordinal)?;
        let mut fragments = Vec::new();
        for (field, matched) in positions {
            let Some(text) = stored.get(&field).and_then(|v| v.as_text()) else {
                continue;
            };
            let Some(analyzer) = self.executor.analyzers.get(&field) else {
                continue;
            };

            let mut spans: Vec<Range<usize>> = analyzer.analyze(text)
                .filter(|token| matched.contains(&token.position))
                .map(|token| token.span())
                .collect();
            spans.sort_by_key(|s| s.start);
            spans.dedup_by(|next, prev| next.start < prev.end);

            fragments.extend(build_fragments(&field, text, &spans, self.config));
        }
        Ok(fragments)
    }
}

/// Greedy windows of at most `fragment_size` characters, each holding whole spans
fn build_fragments(field: &str, text: &str, spans: &[Range<usize>], config: &HighlightConfig) -> Vec<HighlightFragment> {
    let size = config.fragment_size.max(1);
    let mut fragments = Vec::new();
    let mut i = 0;

    while i < spans.len() && fragments.len() < config.max_fragments {
        let (start, end) = window(text, &spans[i], size);

        let mut local = Vec::new();
        while i < spans.len() && spans[i].start >= start && spans[i].end <= end {
            local.push(spans[i].start - start..spans[i].end - start);
            i += 1;
        }
        if local.is_empty() {
            i += 1;
            continue;
        }

        fragments.push(HighlightFragment {
            field: field.to_string(),
            text: text[start..end].to_string(),
            spans: local,
        });
    }
    fragments
}

/// Byte window of `size` characters with `span` roughly centered
fn window(text: &str, span: &Range<usize>, size: usize) -> (usize, usize) {
    let span_chars = text[span.clone()].chars().count();
    if span_chars >= size {
        return (span.start, span.end);
    }

    let mut start = back_chars(text, span.start, (size - span_chars) / 2);
    let end = forward_chars(text, start, size);

    // Near the end of the text: spend the unused budget on leading context
    let used = text[start..end].chars().count();
    if used < size {
        start = back_chars(text, start, size - used);
    }
    (start, end)
}

fn back_chars(text: &str, from: usize, n: usize) -> usize {
    if n == 0 {
        return from;
    }
    text[..from].char_indices().rev().take(n).last().map(|(i, _)| i).unwrap_or(from)
}

fn forward_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..].char_indices().nth(n).map(|(i, _)| from + i).unwrap_or(text.len())
}
