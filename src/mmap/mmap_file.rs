use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use crate::core::error::{Error, ErrorKind, Result};

/// Memory-mapped file for zero-copy reads
#[derive(Clone)]
pub struct MmapFile {
    mmap: Arc<Mmap>,
}

impl MmapFile {
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let len = file.metadata()?.len() as usize;

        // Segment files are immutable once renamed into place
        let mmap = unsafe { MmapOptions::new().len(len).map(&file)? };

        Ok(MmapFile { mmap: Arc::new(mmap) })
    }

    pub fn data(&self) -> &[u8] {
        &self.mmap[..]
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Bounds-checked sub-slice sharing the same mapping
    pub fn slice(&self, range: Range<usize>) -> Result<MmapSlice> {
        if range.start > range.end || range.end > self.len() {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("range {:?} outside mapped file of {} bytes", range, self.len()),
            ));
        }
        Ok(MmapSlice { mmap: Arc::clone(&self.mmap), range })
    }
}

/// Owned view into a mapping; backs the fst term dictionary
#[derive(Clone)]
pub struct MmapSlice {
    mmap: Arc<Mmap>,
    range: Range<usize>,
}

impl AsRef<[u8]> for MmapSlice {
    fn as_ref(&self) -> &[u8] {
        &self.mmap[self.range.clone()]
    }
}
