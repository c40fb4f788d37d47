use std::sync::Arc;
use crate::compression::delta::DeltaEncoder;
use crate::compression::vbyte::VByteEncoder;
use crate::core::error::{Error, ErrorKind, Result};
use crate::index::skiplist::SkipList;

/// One document's occurrences of a term, addressed by segment-local ordinal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub ordinal: u32,
    pub term_freq: u32,       // Term frequency in document
    pub positions: Vec<u32>,  // Token positions for phrase queries and highlighting
}

/// Posting list for a term
/// Note: strictly increasing ordinals; ordinal order equals DocId order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    pub postings: Vec<Posting>,
}

impl PostingList {
    pub fn new() -> Self {
        PostingList {
            postings: Vec::new(),
        }
    }

    /// Append a posting; ordinals must arrive in increasing order
    pub fn push(&mut self, posting: Posting) -> Result<()> {
        if let Some(last) = self.postings.last() {
            if posting.ordinal <= last.ordinal {
                return Err(Error::new(
                    ErrorKind::Internal,
                    format!("posting ordinal {} after {}", posting.ordinal, last.ordinal),
                ));
            }
        }
        self.postings.push(posting);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn doc_freq(&self) -> u32 {
        self.postings.len() as u32
    }

    pub fn total_freq(&self) -> u64 {
        self.postings.iter().map(|p| p.term_freq as u64).sum()
    }

    pub fn ordinals(&self) -> Vec<u32> {
        self.postings.iter().map(|p| p.ordinal).collect()
    }

    /// Layout: count, then per posting (ordinal gap, tf, position gaps)
    pub fn encode(&self, output: &mut Vec<u8>) -> Result<()> {
        VByteEncoder::encode_u32(output, self.postings.len() as u32);

        let mut prev: Option<u32> = None;
        for posting in &self.postings {
            let gap = match prev {
                Some(p) => posting.ordinal - p,
                None => posting.ordinal,
            };
            VByteEncoder::encode_u32(output, gap);
            VByteEncoder::encode_u32(output, posting.term_freq);
            DeltaEncoder::encode_into(output, &posting.positions, 0)?;
            prev = Some(posting.ordinal);
        }
        Ok(())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let count = VByteEncoder::read_u32(data, &mut pos)? as usize;
        let mut postings = Vec::with_capacity(count);

        let mut prev: Option<u32> = None;
        for _ in 0..count {
            let gap = VByteEncoder::read_u32(data, &mut pos)?;
            let ordinal = match prev {
                Some(p) if gap == 0 => {
                    return Err(Error::new(ErrorKind::Parse, format!("repeated ordinal {}", p)));
                }
                Some(p) => p.checked_add(gap)
                    .ok_or_else(|| Error::new(ErrorKind::Parse, "ordinal overflow".to_string()))?,
                None => gap,
            };
            let term_freq = VByteEncoder::read_u32(data, &mut pos)?;
            let positions = DeltaEncoder::decode_from(data, &mut pos, term_freq as usize, 0)?;
            postings.push(Posting { ordinal, term_freq, positions });
            prev = Some(ordinal);
        }

        Ok(PostingList { postings })
    }
}

/// Forward cursor over a decoded posting list with skip-assisted `seek`
pub struct PostingCursor {
    list: Arc<PostingList>,
    skips: SkipList,
    index: usize,
}

impl PostingCursor {
    pub fn new(list: Arc<PostingList>) -> Self {
        let skips = SkipList::build(&list.ordinals());
        PostingCursor { list, skips, index: 0 }
    }

    /// Current ordinal, `None` once exhausted
    pub fn doc(&self) -> Option<u32> {
        self.list.postings.get(self.index).map(|p| p.ordinal)
    }

    pub fn posting(&self) -> Option<&Posting> {
        self.list.postings.get(self.index)
    }

    pub fn advance(&mut self) -> Option<u32> {
        if self.index < self.list.postings.len() {
            self.index += 1;
        }
        self.doc()
    }

    /// Move to the first ordinal >= target (never backwards)
    pub fn seek(&mut self, target: u32) -> Option<u32> {
        match self.doc() {
            Some(doc) if doc >= target => return Some(doc),
            None => return None,
            _ => {}
        }
        self.index = self.skips.seek(target, self.index);
        self.doc()
    }

    pub fn doc_freq(&self) -> u32 {
        self.list.doc_freq()
    }

    pub fn list(&self) -> &Arc<PostingList> {
        &self.list
    }
}
