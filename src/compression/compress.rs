use crate::core::error::{Error, ErrorKind, Result};
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    Lz4,      // Fast compression, ratio 2-3x
    Zstd,     // Better ratio, slower
}

/// Compressed block storage for stored fields
#[derive(Debug, Serialize, Deserialize)]
pub struct CompressedBlock {
    pub data: Vec<u8>,
    pub original_size: usize,
    pub compression: CompressionType,
}

impl CompressedBlock {
    pub fn compress(data: &[u8], compression: CompressionType) -> Result<Self> {
        let compressed = match compression {
            CompressionType::None => data.to_vec(),
            CompressionType::Lz4 => lz4_flex::block::compress(data),
            CompressionType::Zstd => zstd::encode_all(data, 3)?,  // Level 3 is balanced
        };

        Ok(CompressedBlock {
            data: compressed,
            original_size: data.len(),
            compression,
        })
    }

    pub fn decompress(&self) -> Result<Vec<u8>> {
        Self::decompress_raw(&self.data, self.original_size, self.compression)
    }

    /// Decompress bytes borrowed from a mapped file
    pub fn decompress_raw(data: &[u8], original_size: usize, compression: CompressionType) -> Result<Vec<u8>> {
        let out = match compression {
            CompressionType::None => data.to_vec(),
            CompressionType::Lz4 => lz4_flex::block::decompress(data, original_size)
                .map_err(|e| Error::new(ErrorKind::Parse, e.to_string()))?,
            CompressionType::Zstd => zstd::decode_all(data)
                .map_err(|e| Error::new(ErrorKind::Parse, e.to_string()))?,
        };
        if out.len() != original_size {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("decompressed {} bytes, expected {}", out.len(), original_size),
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_codec_restores_input() {
        let text = "the quick brown fox jumps over the lazy dog ".repeat(20);
        for codec in [CompressionType::None, CompressionType::Lz4, CompressionType::Zstd] {
            let block = CompressedBlock::compress(text.as_bytes(), codec).unwrap();
            assert_eq!(block.decompress().unwrap(), text.as_bytes());
        }
    }

    #[test]
    fn wrong_size_is_a_parse_error() {
        let block = CompressedBlock::compress(b"abcdef", CompressionType::None).unwrap();
        assert!(CompressedBlock::decompress_raw(&block.data, 3, CompressionType::None).is_err());
    }
}
