use std::collections::BTreeSet;
use rust_stemmers::Algorithm;
use serde::{Serialize, Deserialize};
use crate::analysis::filter::TokenFilter;
use crate::analysis::filters::lowercase::LowercaseFilter;
use crate::analysis::filters::stemmer::StemmerFilter;
use crate::analysis::filters::stopword::{StopWordFilter, ENGLISH_STOP_WORDS};
use crate::analysis::token::Token;
use crate::analysis::tokenizer::{KeywordTokenizer, StandardTokenizer, Tokenizer};

/// Stemming algorithm applied after case folding and stopword removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StemmerKind {
    None,
    Porter,
    French,
    German,
    Spanish,
    Italian,
    Portuguese,
    Russian,
}

impl StemmerKind {
    fn algorithm(self) -> Option<Algorithm> {
        match self {
            StemmerKind::None => None,
            StemmerKind::Porter => Some(Algorithm::English),
            StemmerKind::French => Some(Algorithm::French),
            StemmerKind::German => Some(Algorithm::German),
            StemmerKind::Spanish => Some(Algorithm::Spanish),
            StemmerKind::Italian => Some(Algorithm::Italian),
            StemmerKind::Portuguese => Some(Algorithm::Portuguese),
            StemmerKind::Russian => Some(Algorithm::Russian),
        }
    }
}

/// Declarative analyzer options; persisted with the schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub lowercase: bool,
    pub stopwords: BTreeSet<String>,
    pub stemmer: StemmerKind,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            lowercase: true,
            stopwords: BTreeSet::new(),
            stemmer: StemmerKind::None,
        }
    }
}

impl AnalyzerConfig {
    /// Lowercase, English stopwords, Porter stemming
    pub fn stemming() -> Self {
        AnalyzerConfig {
            lowercase: true,
            stopwords: ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
            stemmer: StemmerKind::Porter,
        }
    }

    pub fn with_stopwords<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stopwords = words.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stemmer(mut self, stemmer: StemmerKind) -> Self {
        self.stemmer = stemmer;
        self
    }

    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }
}

/// Text analysis pipeline
pub struct Analyzer {
    pub tokenizer: Box<dyn Tokenizer>,
    pub filters: Vec<Box<dyn TokenFilter>>,
    pub name: String,
}

/// Lazy, finite stream of analyzed tokens
pub struct TokenStream<'a> {
    tokens: Box<dyn Iterator<Item = Token> + 'a>,
    filters: &'a [Box<dyn TokenFilter>],
}

impl<'a> Iterator for TokenStream<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        'outer: loop {
            let mut token = self.tokens.next()?;
            for filter in self.filters {
                match filter.apply(token) {
                    Some(t) => token = t,
                    None => continue 'outer,
                }
            }
            return Some(token);
        }
    }
}

impl Analyzer {
    pub fn new(name: String, tokenizer: Box<dyn Tokenizer>) -> Self {
        Analyzer {
            tokenizer,
            filters: Vec::new(),
            name,
        }
    }

    pub fn add_filter(mut self, filter: Box<dyn TokenFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn analyze<'a>(&'a self, text: &'a str) -> TokenStream<'a> {
        TokenStream {
            tokens: self.tokenizer.tokenize(text),
            filters: &self.filters,
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        let mut analyzer = Analyzer::new("standard".to_string(),
                                         Box::new(StandardTokenizer::default()));
        if config.lowercase {
            analyzer = analyzer.add_filter(Box::new(LowercaseFilter));
        }
        if !config.stopwords.is_empty() {
            analyzer = analyzer.add_filter(Box::new(StopWordFilter::new(config.stopwords.clone())));
        }
        if let Some(algorithm) = config.stemmer.algorithm() {
            analyzer = analyzer.add_filter(Box::new(StemmerFilter::new(algorithm)));
        }
        analyzer
    }

    /// Single verbatim token; used for keyword fields
    pub fn keyword() -> Self {
        Analyzer::new("keyword".to_string(), Box::new(KeywordTokenizer))
    }

    /// Create standard analyzer for English
    pub fn standard_english() -> Self {
        Analyzer::from_config(&AnalyzerConfig::stemming())
    }
}

impl Clone for Analyzer {
    fn clone(&self) -> Self {
        Analyzer {
            tokenizer: self.tokenizer.clone_box(),
            filters: self.filters.iter().map(|f| f.clone_box()).collect(),
            name: self.name.clone(),
        }
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let filters: Vec<&str> = self.filters.iter().map(|f| f.name()).collect();
        f.debug_struct("Analyzer")
            .field("name", &self.name)
            .field("tokenizer", &self.tokenizer.name())
            .field("filters", &filters)
            .finish()
    }
}
