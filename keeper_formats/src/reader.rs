//! Little-endian cursor over an in-memory byte block.
//!
//! Every format in this crate is decoded from a fully loaded (or memory
//! mapped) buffer, so the cursor borrows a slice instead of wrapping an
//! `io::Read`. Reads never panic: running off the end yields
//! [`FormatError::UnexpectedEndOfData`].

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{FormatError, Result};

/// Order in which [`ByteCursor::read_bits`] consumes the bits of a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    #[default]
    LsbFirst,
    /// Bit 7 first. The 4-bit font images are packed this way (first pixel in
    /// the high nibble).
    MsbFirst,
}

#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    position: usize,
    bit_offset: u8,
    bit_order: BitOrder,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteCursor {
            data,
            position: 0,
            bit_offset: 0,
            bit_order: BitOrder::default(),
        }
    }

    pub fn with_bit_order(mut self, bit_order: BitOrder) -> Self {
        self.bit_order = bit_order;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.data.len()
    }

    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            return Err(FormatError::InvalidLength {
                offset: self.position,
                length: position as i64,
            });
        }
        self.position = position;
        self.bit_offset = 0;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    /// Converts a length field read from the file into a usable size.
    pub fn checked_len(&self, length: i64) -> Result<usize> {
        usize::try_from(length).map_err(|_| FormatError::InvalidLength {
            offset: self.position,
            length,
        })
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        self.take(count)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_vec3(&mut self) -> Result<[f32; 3]> {
        Ok([self.read_f32()?, self.read_f32()?, self.read_f32()?])
    }

    /// Reads a u32 count and converts it to `usize`.
    pub fn read_count(&mut self) -> Result<usize> {
        let raw = self.read_u32()?;
        usize::try_from(raw).map_err(|_| FormatError::InvalidLength {
            offset: self.position - 4,
            length: i64::from(raw),
        })
    }

    pub fn read_tag(&mut self) -> Result<[u8; 4]> {
        let bytes = self.take(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Fixed-length string field, cut at the first NUL.
    pub fn read_string(&mut self, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// NUL-terminated string; the terminator is consumed.
    pub fn read_c_string(&mut self) -> Result<String> {
        self.align();
        let rest = &self.data[self.position..];
        let Some(end) = rest.iter().position(|&b| b == 0) else {
            return Err(FormatError::UnexpectedEndOfData {
                offset: self.position,
                needed: rest.len() + 1,
                available: rest.len(),
            });
        };
        let text = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.position += end + 1;
        Ok(text)
    }

    /// u32 byte length followed by that many bytes, NUL padding removed.
    pub fn read_prefixed_string(&mut self) -> Result<String> {
        let len = self.read_count()?;
        self.read_string(len)
    }

    /// Fixed field of `max_chars` UTF-16LE code units, ending at the first NUL.
    pub fn read_varying_length_string(&mut self, max_chars: usize) -> Result<String> {
        let byte_len = max_chars
            .checked_mul(2)
            .ok_or_else(|| FormatError::InvalidLength {
                offset: self.position,
                length: max_chars as i64,
            })?;
        let bytes = self.take(byte_len)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(LittleEndian::read_u16)
            .take_while(|&unit| unit != 0)
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }

    /// Reads `count` bits (1..=32) as one value, honouring the cursor's
    /// [`BitOrder`]. Consecutive calls continue inside the same byte.
    pub fn read_bits(&mut self, count: u32) -> Result<u32> {
        if count == 0 || count > 32 {
            return Err(FormatError::InvalidLength {
                offset: self.position,
                length: i64::from(count),
            });
        }

        let mut value: u64 = 0;
        for index in 0..count {
            let Some(&byte) = self.data.get(self.position) else {
                return Err(FormatError::UnexpectedEndOfData {
                    offset: self.position,
                    needed: 1,
                    available: 0,
                });
            };
            match self.bit_order {
                BitOrder::LsbFirst => {
                    let bit = (byte >> self.bit_offset) & 1;
                    value |= u64::from(bit) << index;
                }
                BitOrder::MsbFirst => {
                    let bit = (byte >> (7 - self.bit_offset)) & 1;
                    value = (value << 1) | u64::from(bit);
                }
            }
            self.bit_offset += 1;
            if self.bit_offset == 8 {
                self.bit_offset = 0;
                self.position += 1;
            }
        }
        Ok(value as u32)
    }

    // Byte reads after a partial bit read start at the next whole byte.
    fn align(&mut self) {
        if self.bit_offset != 0 {
            self.bit_offset = 0;
            self.position += 1;
        }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        self.align();
        let available = self.data.len() - self.position;
        if count > available {
            return Err(FormatError::UnexpectedEndOfData {
                offset: self.position,
                needed: count,
                available,
            });
        }
        let start = self.position;
        self.position += count;
        Ok(&self.data[start..self.position])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_primitives() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x1234u16.to_le_bytes());
        data.extend_from_slice(&(-2i32).to_le_bytes());
        data.extend_from_slice(&1.5f32.to_le_bytes());
        data.extend_from_slice(&0x0102_0304_0506_0708u64.to_le_bytes());

        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_u16().unwrap(), 0x1234);
        assert_eq!(cursor.read_i32().unwrap(), -2);
        assert_eq!(cursor.read_f32().unwrap(), 1.5);
        assert_eq!(cursor.read_u64().unwrap(), 0x0102_0304_0506_0708);
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn reading_to_the_end_succeeds_and_one_more_byte_fails() {
        let data = [1u8, 2, 3, 4];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_u32().unwrap(), 0x0403_0201);
        assert_eq!(cursor.remaining(), 0);

        let err = cursor.read_u8().unwrap_err();
        assert!(matches!(
            err,
            FormatError::UnexpectedEndOfData {
                offset: 4,
                needed: 1,
                available: 0
            }
        ));
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn strings_are_trimmed_at_nul() {
        let mut data = Vec::new();
        data.extend_from_slice(b"ab\0\0");
        data.extend_from_slice(b"name\0");
        data.extend_from_slice(&6u32.to_le_bytes());
        data.extend_from_slice(b"bank\0\0");
        for unit in "Hi".encode_utf16() {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        data.extend_from_slice(&[0u8; 4]);

        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_string(4).unwrap(), "ab");
        assert_eq!(cursor.read_c_string().unwrap(), "name");
        assert_eq!(cursor.read_prefixed_string().unwrap(), "bank");
        assert_eq!(cursor.read_varying_length_string(4).unwrap(), "Hi");
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn unterminated_c_string_is_an_error() {
        let mut cursor = ByteCursor::new(b"abc");
        assert!(matches!(
            cursor.read_c_string(),
            Err(FormatError::UnexpectedEndOfData { .. })
        ));
    }

    #[test]
    fn bits_follow_the_configured_order() {
        let data = [0b1010_0011u8, 0xFF];

        let mut lsb = ByteCursor::new(&data);
        assert_eq!(lsb.read_bits(4).unwrap(), 0b0011);
        assert_eq!(lsb.read_bits(4).unwrap(), 0b1010);

        let mut msb = ByteCursor::new(&data).with_bit_order(BitOrder::MsbFirst);
        assert_eq!(msb.read_bits(4).unwrap(), 0b1010);
        assert_eq!(msb.read_bits(1).unwrap(), 0);
        // Byte reads skip the rest of a partially consumed byte.
        assert_eq!(msb.read_u8().unwrap(), 0xFF);
        assert!(msb.read_bits(1).is_err());
    }

    #[test]
    fn rejects_bad_lengths_and_positions() {
        let data = [0u8; 8];
        let mut cursor = ByteCursor::new(&data);
        assert!(matches!(
            cursor.read_bits(33),
            Err(FormatError::InvalidLength { .. })
        ));
        assert!(matches!(
            cursor.checked_len(-1),
            Err(FormatError::InvalidLength { length: -1, .. })
        ));
        assert!(cursor.set_position(9).is_err());
        cursor.set_position(8).unwrap();
        assert!(cursor.skip(1).is_err());
    }
}
