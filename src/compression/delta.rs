use crate::compression::vbyte::VByteEncoder;
use crate::core::error::{Error, ErrorKind, Result};

/// Delta + VByte encoding for strictly increasing integers (ordinals, positions)
pub struct DeltaEncoder;

impl DeltaEncoder {
    /// Append `nums` as gaps from `base`; the first gap is taken from `base` itself
    pub fn encode_into(output: &mut Vec<u8>, nums: &[u32], base: u32) -> Result<()> {
        let mut prev = base;
        for (i, &num) in nums.iter().enumerate() {
            if num < prev || (i > 0 && num == prev) {
                return Err(Error::new(
                    ErrorKind::Internal,
                    format!("delta input not strictly increasing at index {}", i),
                ));
            }
            VByteEncoder::encode_u32(output, num - prev);
            prev = num;
        }
        Ok(())
    }

    pub fn encode_u32_list(nums: &[u32]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(nums.len());
        Self::encode_into(&mut output, nums, 0)?;
        Ok(output)
    }

    /// Read `count` values written by `encode_into` starting at `*pos`
    pub fn decode_from(data: &[u8], pos: &mut usize, count: usize, base: u32) -> Result<Vec<u32>> {
        let mut nums = Vec::with_capacity(count);
        let mut prev = base;
        for _ in 0..count {
            let gap = VByteEncoder::read_u32(data, pos)?;
            prev = prev.checked_add(gap)
                .ok_or_else(|| Error::new(ErrorKind::Parse, "delta overflow".to_string()))?;
            nums.push(prev);
        }
        Ok(nums)
    }

    pub fn decode_u32_list(data: &[u8]) -> Result<Vec<u32>> {
        let mut prev = 0u32;
        VByteEncoder::decode_u32_list(data)?
            .into_iter()
            .map(|gap| {
                prev = prev.checked_add(gap)
                    .ok_or_else(|| Error::new(ErrorKind::Parse, "delta overflow".to_string()))?;
                Ok(prev)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaps_are_small_for_dense_lists() {
        let ids: Vec<u32> = (1_000_000..1_000_100).collect();
        let encoded = DeltaEncoder::encode_u32_list(&ids).unwrap();
        // one multi-byte first gap, then single-byte gaps
        assert!(encoded.len() < 110);
        assert_eq!(DeltaEncoder::decode_u32_list(&encoded).unwrap(), ids);
    }

    #[test]
    fn unsorted_input_is_rejected() {
        assert!(DeltaEncoder::encode_u32_list(&[3, 2]).is_err());
        assert!(DeltaEncoder::encode_u32_list(&[3, 3]).is_err());
    }
}
