use crate::analysis::token::Token;
use unicode_segmentation::UnicodeSegmentation;

pub trait Tokenizer: Send + Sync {
    /// Lazily split `text`; calling again on the same text restarts the sequence
    fn tokenize<'a>(&self, text: &'a str) -> Box<dyn Iterator<Item = Token> + 'a>;

    fn name(&self) -> &str;

    fn clone_box(&self) -> Box<dyn Tokenizer>;
}

/// Standard Unicode tokenizer
#[derive(Clone)]
pub struct StandardTokenizer {
    pub max_token_length: usize,
}

impl Default for StandardTokenizer {
    fn default() -> Self {
        StandardTokenizer {
            max_token_length: 255,
        }
    }
}

impl Tokenizer for StandardTokenizer {
    fn tokenize<'a>(&self, text: &'a str) -> Box<dyn Iterator<Item = Token> + 'a> {
        let max_len = self.max_token_length;
        let mut position = 0u32;

        // UAX#29 word boundaries; punctuation and whitespace never become words
        let words = text
            .unicode_word_indices()
            .filter(move |(_, word)| word.len() <= max_len)
            .map(move |(offset, word)| {
                let token = Token::new(word.to_string(), position, offset);
                position += 1;
                token
            });

        Box::new(words)
    }

    fn name(&self) -> &str {
        "standard"
    }

    fn clone_box(&self) -> Box<dyn Tokenizer> {
        Box::new(self.clone())
    }
}

/// Emits the whole value as a single token (identifier-like fields)
#[derive(Clone, Default)]
pub struct KeywordTokenizer;

impl Tokenizer for KeywordTokenizer {
    fn tokenize<'a>(&self, text: &'a str) -> Box<dyn Iterator<Item = Token> + 'a> {
        if text.is_empty() {
            return Box::new(std::iter::empty());
        }
        Box::new(std::iter::once(Token::new(text.to_string(), 0, 0)))
    }

    fn name(&self) -> &str {
        "keyword"
    }

    fn clone_box(&self) -> Box<dyn Tokenizer> {
        Box::new(KeywordTokenizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_point_into_original_text() {
        let text = "The  quick, brown fox!";
        let tokens: Vec<Token> = StandardTokenizer::default().tokenize(text).collect();

        let words: Vec<&str> = tokens.iter().map(|t| &text[t.span()]).collect();
        assert_eq!(words, vec!["The", "quick", "brown", "fox"]);
        let positions: Vec<u32> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }

    #[test]
    fn overlong_words_are_dropped() {
        let long = "x".repeat(300);
        let text = format!("short {} tail", long);
        let tokens: Vec<Token> = StandardTokenizer::default().tokenize(&text).collect();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].text, "tail");
        assert_eq!(tokens[1].position, 1);
    }

    #[test]
    fn keyword_keeps_value_verbatim() {
        let tokens: Vec<Token> = KeywordTokenizer.tokenize("/docs/A b.txt").collect();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "/docs/A b.txt");
        assert_eq!(KeywordTokenizer.tokenize("").count(), 0);
    }
}
