use crate::core::error::{Error, ErrorKind, Result};

/// Variable byte encoding for integers (best for small integers)
pub struct VByteEncoder;

impl VByteEncoder {
    /// Values < 128 use 1 byte, < 16384 use 2 bytes, etc.
    pub fn encode_u32(output: &mut Vec<u8>, value: u32) {
        Self::encode_u64(output, value as u64)
    }

    pub fn encode_u64(output: &mut Vec<u8>, mut value: u64) {
        while value >= 128 {
            output.push((value & 127) as u8 | 128);  // Set continuation bit
            value >>= 7;
        }
        output.push(value as u8);
    }

    pub fn encode_u32_list(nums: &[u32]) -> Vec<u8> {
        let mut output = Vec::with_capacity(nums.len());
        for &num in nums {
            Self::encode_u32(&mut output, num);
        }
        output
    }

    /// Decode single u32 value, returns (value, bytes_consumed)
    pub fn decode_u32(input: &[u8]) -> Result<(u32, usize)> {
        let (value, consumed) = Self::decode_u64(input)?;
        let value = u32::try_from(value)
            .map_err(|_| Error::new(ErrorKind::Parse, "VByte overflow".to_string()))?;
        Ok((value, consumed))
    }

    pub fn decode_u64(input: &[u8]) -> Result<(u64, usize)> {
        let mut value = 0u64;
        let mut shift = 0;

        for (i, &byte) in input.iter().enumerate() {
            value |= ((byte & 127) as u64) << shift;

            if byte & 128 == 0 {  // No continuation bit
                return Ok((value, i + 1));
            }

            shift += 7;
            if shift > 63 {
                return Err(Error::new(ErrorKind::Parse, "VByte overflow".to_string()));
            }
        }

        Err(Error::new(ErrorKind::Parse, "Incomplete VByte".to_string()))
    }

    /// Decode at `*pos` and advance it
    pub fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32> {
        let rest = data.get(*pos..)
            .ok_or_else(|| Error::new(ErrorKind::Parse, "VByte read past end".to_string()))?;
        let (value, consumed) = Self::decode_u32(rest)?;
        *pos += consumed;
        Ok(value)
    }

    pub fn decode_u32_list(data: &[u8]) -> Result<Vec<u32>> {
        let mut nums = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            nums.push(Self::read_u32(data, &mut pos)?);
        }

        Ok(nums)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_take_one_byte() {
        let mut out = Vec::new();
        VByteEncoder::encode_u32(&mut out, 127);
        assert_eq!(out.len(), 1);
        VByteEncoder::encode_u32(&mut out, 300);
        assert_eq!(out.len(), 3);
        assert_eq!(VByteEncoder::decode_u32_list(&out).unwrap(), vec![127, 300]);
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert!(VByteEncoder::decode_u32(&[0x80, 0x80]).is_err());
        let mut pos = 5;
        assert!(VByteEncoder::read_u32(&[1, 2], &mut pos).is_err());
    }
}
