use fst::{IntoStreamer, Map, MapBuilder, Streamer};
use regex::Regex;
use crate::core::error::{Error, ErrorKind, Result};
use crate::search::fuzzy::FuzzyAutomaton;

/// Separates the field name from the token inside a term key
pub const FIELD_SEPARATOR: u8 = 0;

/// `field ++ 0x00 ++ token`; the terms of one field form a contiguous range
pub fn term_key(field: &str, token: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(field.len() + 1 + token.len());
    key.extend_from_slice(field.as_bytes());
    key.push(FIELD_SEPARATOR);
    key.extend_from_slice(token.as_bytes());
    key
}

/// Sorted-insert builder for the on-disk dictionary
pub struct TermDictionaryBuilder {
    builder: MapBuilder<Vec<u8>>,
    count: usize,
}

impl TermDictionaryBuilder {
    pub fn new() -> Self {
        TermDictionaryBuilder {
            builder: MapBuilder::memory(),
            count: 0,
        }
    }

    /// Keys must be inserted in strictly increasing byte order
    pub fn insert(&mut self, key: &[u8], posting_offset: u64) -> Result<()> {
        self.builder.insert(key, posting_offset)?;
        self.count += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        Ok(self.builder.into_inner()?)
    }
}

impl Default for TermDictionaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// FST term dictionary: term key -> offset of its posting list
pub struct TermDictionary<D = Vec<u8>> {
    map: Map<D>,
}

impl<D: AsRef<[u8]>> TermDictionary<D> {
    pub fn open(data: D) -> Result<Self> {
        let map = Map::new(data)
            .map_err(|e| Error::new(ErrorKind::CorruptIndex, format!("term dictionary: {}", e)))?;
        Ok(TermDictionary { map })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, field: &str, token: &str) -> Option<u64> {
        self.map.get(term_key(field, token))
    }

    pub fn as_fst(&self) -> &Map<D> {
        &self.map
    }

    /// Visit the field's terms starting at `from`; stop when `visit` returns false
    fn scan_field<F>(&self, field: &str, from: &str, mut visit: F)
    where
        F: FnMut(&str, u64) -> bool,
    {
        let lower = term_key(field, from);
        let mut upper = field.as_bytes().to_vec();
        upper.push(FIELD_SEPARATOR + 1);

        let mut stream = self.map.range().ge(&lower).lt(&upper).into_stream();
        while let Some((key, offset)) = stream.next() {
            let token = match std::str::from_utf8(&key[field.len() + 1..]) {
                Ok(token) => token,
                Err(_) => continue,
            };
            if !visit(token, offset) {
                break;
            }
        }
    }

    pub fn prefix(&self, field: &str, prefix: &str, limit: usize) -> Vec<(String, u64)> {
        let mut terms = Vec::new();
        self.scan_field(field, prefix, |token, offset| {
            if !token.starts_with(prefix) || terms.len() >= limit {
                return false;
            }
            terms.push((token.to_string(), offset));
            true
        });
        terms
    }

    /// `regex` must be anchored; it is matched against the bare token
    pub fn regex(&self, field: &str, regex: &Regex, literal_prefix: &str, limit: usize) -> Vec<(String, u64)> {
        let mut terms = Vec::new();
        self.scan_field(field, literal_prefix, |token, offset| {
            if !token.starts_with(literal_prefix) || terms.len() >= limit {
                return false;
            }
            if regex.is_match(token) {
                terms.push((token.to_string(), offset));
            }
            true
        });
        terms
    }

    pub fn fuzzy(&self, field: &str, automaton: &FuzzyAutomaton, limit: usize) -> Vec<(String, u64)> {
        let mut terms = Vec::new();
        self.scan_field(field, "", |token, offset| {
            if terms.len() >= limit {
                return false;
            }
            if automaton.matches(token) {
                terms.push((token.to_string(), offset));
            }
            true
        });
        terms
    }
}
