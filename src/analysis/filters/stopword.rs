use std::collections::BTreeSet;
use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;

pub struct StopWordFilter {
    pub stop_words: BTreeSet<String>,
}

pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for",
    "from", "has", "he", "in", "is", "it", "its", "of", "on",
    "that", "the", "to", "was", "will", "with",
];

impl StopWordFilter {
    pub fn new(stop_words: BTreeSet<String>) -> Self {
        StopWordFilter { stop_words }
    }

    pub fn english() -> Self {
        StopWordFilter::new(ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()).collect())
    }
}

impl TokenFilter for StopWordFilter {
    fn apply(&self, token: Token) -> Option<Token> {
        if self.stop_words.contains(&token.text) {
            None
        } else {
            Some(token)
        }
    }

    fn name(&self) -> &str {
        "stop_words"
    }

    fn clone_box(&self) -> Box<dyn TokenFilter> {
        Box::new(StopWordFilter {
            stop_words: self.stop_words.clone(),
        })
    }
}
