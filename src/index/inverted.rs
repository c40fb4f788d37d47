use std::collections::BTreeMap;
use crate::analysis::analyzer::Analyzer;
use crate::core::error::Result;
use crate::core::types::Document;
use crate::index::posting::{Posting, PostingList};
use crate::index::term_dict::term_key;
use crate::schema::schema::Schema;

/// Analyzers of every indexed field, built once per batch or reader
#[derive(Debug, Clone)]
pub struct FieldAnalyzers {
    analyzers: Vec<(String, Analyzer)>,
}

impl FieldAnalyzers {
    pub fn from_schema(schema: &Schema) -> Self {
        FieldAnalyzers {
            analyzers: schema.indexed_fields()
                .map(|f| (f.name.clone(), f.build_analyzer()))
                .collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Analyzer> {
        self.analyzers.iter().find(|(name, _)| name == field).map(|(_, a)| a)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.analyzers.iter().map(|(name, _)| name.as_str())
    }

    /// Tokenize every indexed field of `doc`; pure, so safe to run in parallel
    pub fn analyze(&self, doc: &Document) -> AnalyzedDocument {
        let mut analyzed = AnalyzedDocument::default();

        for (field, analyzer) in &self.analyzers {
            let Some(text) = doc.get_field(field).and_then(|v| v.as_text()) else {
                continue;
            };

            let mut length = 0u32;
            for token in analyzer.analyze(text) {
                analyzed.terms
                    .entry(term_key(field, &token.text))
                    .or_insert_with(Vec::new)
                    .push(token.position);
                length += 1;
            }
            analyzed.field_lengths.insert(field.clone(), length);
        }

        analyzed
    }
}

/// Term positions of one document, keyed by term key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzedDocument {
    pub terms: BTreeMap<Vec<u8>, Vec<u32>>,
    pub field_lengths: BTreeMap<String, u32>,
}

/// In-memory inverted index for one segment under construction
/// Note: BTreeMap keeps term keys in the byte order the fst builder needs
#[derive(Debug, Default)]
pub struct InvertedIndex {
    pub postings: BTreeMap<Vec<u8>, PostingList>,
    pub doc_count: u32,
    pub total_tokens: u64,
}

impl InvertedIndex {
    pub fn new() -> Self {
        InvertedIndex::default()
    }

    /// Documents must be added in increasing ordinal order
    pub fn add_document(&mut self, ordinal: u32, analyzed: AnalyzedDocument) -> Result<()> {
        for (key, positions) in analyzed.terms {
            let posting = Posting {
                ordinal,
                term_freq: positions.len() as u32,
                positions,
            };
            self.postings.entry(key).or_insert_with(PostingList::new).push(posting)?;
        }

        self.doc_count += 1;
        self.total_tokens += analyzed.field_lengths.values().map(|&l| l as u64).sum::<u64>();
        Ok(())
    }

    /// Append one already built posting; per key, ordinals must increase
    pub fn add_posting(&mut self, key: &[u8], posting: Posting) -> Result<()> {
        if let Some(list) = self.postings.get_mut(key) {
            return list.push(posting);
        }
        let mut list = PostingList::new();
        list.push(posting)?;
        self.postings.insert(key.to_vec(), list);
        Ok(())
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }
}
