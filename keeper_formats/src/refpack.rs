//! RefPack, the LZ77 variant used for compressed WAD entries.
//!
//! Stream layout: a flags byte, the `0xFB` marker, an optional compressed
//! size, the big-endian decompressed size, then a command stream. Every
//! command copies some literal bytes from the input and then (except for
//! literal runs and the stop command) a back reference from the output.

use crate::error::{FormatError, Result};
use crate::reader::ByteCursor;

const MARKER: u8 = 0xFB;
const FLAG_COMPRESSED_SIZE: u8 = 0x01;
const FLAG_WIDE_SIZES: u8 = 0x80;

/// Decompresses a full RefPack stream.
///
/// The output length must match the size declared in the stream header.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    let mut cursor = ByteCursor::new(input);
    let flags = cursor.read_u8()?;
    let marker = cursor.read_u8()?;
    if marker != MARKER {
        return Err(FormatError::malformed(
            format!("RefPack marker {MARKER:#04x}"),
            format!("{marker:#04x}"),
        ));
    }

    let size_width = if flags & FLAG_WIDE_SIZES != 0 { 4 } else { 3 };
    if flags & FLAG_COMPRESSED_SIZE != 0 {
        cursor.skip(size_width)?;
    }
    let expected = read_be(&mut cursor, size_width)?;

    let mut out = Vec::with_capacity(expected.min(input.len().saturating_mul(16)));
    loop {
        let b0 = cursor.read_u8()?;
        let (literals, copy) = match b0 {
            0x00..=0x7F => {
                let b1 = usize::from(cursor.read_u8()?);
                let b0 = usize::from(b0);
                let offset = ((b0 & 0x60) << 3) + b1 + 1;
                let count = ((b0 & 0x1C) >> 2) + 3;
                (b0 & 0x03, Some((offset, count)))
            }
            0x80..=0xBF => {
                let b1 = usize::from(cursor.read_u8()?);
                let b2 = usize::from(cursor.read_u8()?);
                let offset = ((b1 & 0x3F) << 8) + b2 + 1;
                let count = (usize::from(b0) & 0x3F) + 4;
                (b1 >> 6, Some((offset, count)))
            }
            0xC0..=0xDF => {
                let b1 = usize::from(cursor.read_u8()?);
                let b2 = usize::from(cursor.read_u8()?);
                let b3 = usize::from(cursor.read_u8()?);
                let b0 = usize::from(b0);
                let offset = ((b0 & 0x10) << 12) + (b1 << 8) + b2 + 1;
                let count = ((b0 & 0x0C) << 6) + b3 + 5;
                (b0 & 0x03, Some((offset, count)))
            }
            0xE0..=0xFB => (((usize::from(b0) & 0x1F) << 2) + 4, None),
            0xFC..=0xFF => (usize::from(b0) & 0x03, None),
        };

        out.extend_from_slice(cursor.read_bytes(literals)?);

        if let Some((offset, count)) = copy {
            if offset > out.len() {
                return Err(FormatError::IndexOutOfRange {
                    what: "RefPack back reference",
                    index: offset,
                    limit: out.len(),
                });
            }
            // Byte by byte: source and destination may overlap.
            let start = out.len() - offset;
            for index in start..start + count {
                let byte = out[index];
                out.push(byte);
            }
        }

        if b0 >= 0xFC {
            break;
        }
        if out.len() > expected {
            break;
        }
    }

    if out.len() != expected {
        return Err(FormatError::InvalidLength {
            offset: cursor.position(),
            length: out.len() as i64,
        });
    }
    Ok(out)
}

fn read_be(cursor: &mut ByteCursor<'_>, width: usize) -> Result<usize> {
    let bytes = cursor.read_bytes(width)?;
    Ok(bytes
        .iter()
        .fold(0usize, |value, &byte| (value << 8) | usize::from(byte)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_run_then_overlapping_copy() {
        let mut stream = vec![0x10, MARKER, 0, 0, 10];
        stream.push(0xE0); // 4 literals
        stream.extend_from_slice(b"ABCA");
        stream.extend_from_slice(&[0x0C, 0x02]); // copy 6 from 3 back
        stream.push(0xFC);
        assert_eq!(decompress(&stream).unwrap(), b"ABCABCABCA");
    }

    #[test]
    fn medium_copy_and_stop_literals() {
        let mut stream = vec![0x10, MARKER, 0, 0, 6];
        stream.extend_from_slice(&[0x80, 0x40, 0x00]); // 1 literal, copy 4 from 1 back
        stream.push(b'Z');
        stream.push(0xFD); // stop with 1 literal
        stream.push(b'!');
        assert_eq!(decompress(&stream).unwrap(), b"ZZZZZ!");
    }

    #[test]
    fn compressed_size_field_is_skipped() {
        let stream = [0x11, MARKER, 0, 0, 9, 0, 0, 2, 0xFE, b'o', b'k'];
        assert_eq!(decompress(&stream).unwrap(), b"ok");
    }

    #[test]
    fn reference_before_start_fails() {
        let stream = [0x10, MARKER, 0, 0, 4, 0x00, 0x05];
        assert!(matches!(
            decompress(&stream),
            Err(FormatError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn size_mismatch_fails() {
        let stream = [0x10, MARKER, 0, 0, 3, 0xFD, b'x'];
        assert!(matches!(
            decompress(&stream),
            Err(FormatError::InvalidLength { length: 1, .. })
        ));
    }

    #[test]
    fn missing_marker_is_malformed() {
        assert!(matches!(
            decompress(&[0x10, 0x00, 0, 0, 0]),
            Err(FormatError::MalformedContainer { .. })
        ));
    }
}
