use rust_stemmers::{Algorithm, Stemmer};
use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;

/// Snowball stemming; the English algorithm is the Porter2 stemmer
pub struct StemmerFilter {
    pub algorithm: Algorithm,
    stemmer: Stemmer,
}

impl StemmerFilter {
    pub fn new(algorithm: Algorithm) -> Self {
        StemmerFilter { algorithm, stemmer: Stemmer::create(algorithm) }
    }
}

impl TokenFilter for StemmerFilter {
    fn apply(&self, mut token: Token) -> Option<Token> {
        let stemmed = self.stemmer.stem(&token.text).into_owned();
        token.text = stemmed;
        Some(token)
    }

    fn name(&self) -> &str {
        "stemmer"
    }

    fn clone_box(&self) -> Box<dyn TokenFilter> {
        Box::new(StemmerFilter::new(self.algorithm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_and_keeps_offsets() {
        let filter = StemmerFilter::new(Algorithm::English);
        let token = filter.apply(Token::new("running".to_string(), 3, 10)).unwrap();
        assert_eq!(token.text, "run");
        assert_eq!(token.position, 3);
        assert_eq!(token.span(), 10..17);
    }
}
