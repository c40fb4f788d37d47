use serde::{Serialize, Deserialize};

/// Token representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,      // Normalized token text (the term)
    pub position: u32,     // Word position in the field value (for phrase queries)
    pub offset: usize,     // Byte offset in original text
    pub length: usize,     // Byte length of the original word
}

impl Token {
    pub fn new(text: String, position: u32, offset: usize) -> Self {
        let length = text.len();
        Token {
            text,
            position,
            offset,
            length,
        }
    }

    /// Byte span of the original word, unaffected by normalization
    pub fn span(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.length
    }
}
