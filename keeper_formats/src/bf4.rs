//! BF4 bitmap fonts (`F4FB`).
//!
//! Glyph bitmaps are 4 bits per pixel, packed with the first pixel in the
//! high nibble and no padding between rows. Level `0` is fully transparent.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::error::{FormatError, Result};
use crate::reader::{BitOrder, ByteCursor};

const MAGIC: &[u8; 4] = b"F4FB";

/// Number of grey levels in a glyph bitmap.
pub const PALETTE_SIZE: usize = 16;

/// Grey value of palette index `index` (`0..16`).
pub fn palette_level(index: u8) -> u8 {
    ((u16::from(index.min(15)) + 1) * 16 - 1) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GlyphEncoding {
    Raw,
    Rle4,
    OneBit,
}

impl GlyphEncoding {
    fn from_raw(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(GlyphEncoding::Raw),
            1 => Ok(GlyphEncoding::Rle4),
            2 => Ok(GlyphEncoding::OneBit),
            other => Err(FormatError::unsupported("BF4 glyph encoding", u32::from(other))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Bf4Glyph {
    /// UTF-16 code unit this glyph renders.
    pub code: u16,
    pub unknown1: u16,
    pub data_size: i32,
    pub total_size: u32,
    pub encoding: GlyphEncoding,
    pub unknown2: [u8; 3],
    pub width: u16,
    pub height: u16,
    pub offset_x: i8,
    pub offset_y: i8,
    pub outer_width: i16,
    /// One palette index per pixel, row major. `None` for zero-sized glyphs.
    #[serde(skip)]
    pub pixels: Option<Vec<u8>>,
}

impl Bf4Glyph {
    pub fn character(&self) -> Option<char> {
        char::from_u32(u32::from(self.code))
    }

    pub fn has_bitmap(&self) -> bool {
        self.pixels.is_some()
    }

    /// Expands the palette indices to RGBA, with index 0 transparent.
    pub fn as_rgba8888(&self) -> Option<Vec<u8>> {
        let pixels = self.pixels.as_ref()?;
        let mut rgba = Vec::with_capacity(pixels.len() * 4);
        for &index in pixels {
            let level = palette_level(index);
            let alpha = if index == 0 { 0 } else { 0xFF };
            rgba.extend_from_slice(&[level, level, level, alpha]);
        }
        Some(rgba)
    }

    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let code = cursor.read_u16()?;
        let unknown1 = cursor.read_u16()?;
        let data_size = cursor.read_i32()?;
        let total_size = cursor.read_u32()?;
        let encoding = GlyphEncoding::from_raw(cursor.read_u8()?)?;
        let unknown2 = [cursor.read_u8()?, cursor.read_u8()?, cursor.read_u8()?];
        let width = cursor.read_u16()?;
        let height = cursor.read_u16()?;
        let offset_x = cursor.read_i8()?;
        let offset_y = cursor.read_i8()?;
        let outer_width = cursor.read_i16()?;

        let pixels = if width > 0 && height > 0 {
            let size = cursor.checked_len(i64::from(data_size))?;
            let payload = cursor.read_bytes(size)?;
            Some(decode_pixels(
                payload,
                encoding,
                usize::from(width),
                usize::from(height),
            )?)
        } else {
            None
        };

        Ok(Bf4Glyph {
            code,
            unknown1,
            data_size,
            total_size,
            encoding,
            unknown2,
            width,
            height,
            offset_x,
            offset_y,
            outer_width,
            pixels,
        })
    }
}

/// Decoded font, glyphs sorted by code unit.
#[derive(Debug, Clone, Serialize)]
pub struct Bf4File {
    /// Header values widened by every decoded glyph.
    pub max_width: u16,
    pub max_height: u16,
    pub max_code_point: u16,
    /// Glyphs that carry a bitmap.
    pub glyph_count: usize,
    pub total_width: u64,
    pub avg_width: u64,
    pub glyphs: Vec<Bf4Glyph>,
}

impl Bf4File {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("reading BF4 {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("parsing BF4 {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(bytes);
        let magic = cursor.read_tag()?;
        if &magic != MAGIC {
            return Err(FormatError::malformed(
                "F4FB",
                String::from_utf8_lossy(&magic).into_owned(),
            ));
        }
        // The header maxima are known to be unreliable.
        let mut max_width = u16::from(cursor.read_u8()?);
        let mut max_height = u16::from(cursor.read_u8()?);
        let offset_count = usize::from(cursor.read_u16()?);

        let mut offsets = Vec::with_capacity(offset_count);
        for _ in 0..offset_count {
            offsets.push(cursor.read_count()?);
        }

        let mut glyphs = Vec::with_capacity(offset_count);
        let mut max_code_point = 0;
        let mut glyph_count = 0;
        let mut total_width = 0u64;
        for offset in offsets {
            cursor.set_position(offset)?;
            let glyph = Bf4Glyph::read(&mut cursor)?;
            if glyph.has_bitmap() {
                max_width = max_width.max(glyph.width);
                max_height = max_height.max(glyph.height);
                max_code_point = max_code_point.max(glyph.code);
                total_width += u64::from(glyph.width);
                glyph_count += 1;
            }
            glyphs.push(glyph);
        }
        glyphs.sort_by_key(|glyph| glyph.code);

        let avg_width = if glyph_count == 0 {
            0
        } else {
            total_width.div_ceil(glyph_count as u64)
        };

        Ok(Bf4File {
            max_width,
            max_height,
            max_code_point,
            glyph_count,
            total_width,
            avg_width,
            glyphs,
        })
    }

    pub fn glyph(&self, code: u16) -> Option<&Bf4Glyph> {
        self.glyphs
            .binary_search_by_key(&code, |glyph| glyph.code)
            .ok()
            .map(|index| &self.glyphs[index])
    }
}

/// Decodes one glyph payload into `width * height` palette indices.
///
/// The working buffer is the payload zero-padded to at least the row-padded
/// bitmap size (`ceil(width / 2)` bytes per row), so short payloads decode to
/// transparent trailing pixels and RLE runs may spill into the padding of the
/// last row.
pub fn decode_pixels(
    payload: &[u8],
    encoding: GlyphEncoding,
    width: usize,
    height: usize,
) -> Result<Vec<u8>> {
    let pixel_count = width * height;
    let mut buffer = payload.to_vec();
    let padded_len = width.div_ceil(2) * height;
    if buffer.len() < padded_len {
        buffer.resize(padded_len, 0);
    }

    let mut pixels = match encoding {
        GlyphEncoding::Raw => read_nibbles(&buffer, pixel_count)?,
        GlyphEncoding::Rle4 => decode_rle4(&buffer, buffer.len() * 2)?,
        GlyphEncoding::OneBit => decode_one_bit(&buffer, pixel_count)?,
    };
    pixels.resize(pixel_count, 0);
    Ok(pixels)
}

fn read_nibbles(buffer: &[u8], count: usize) -> Result<Vec<u8>> {
    let mut cursor = ByteCursor::new(buffer).with_bit_order(BitOrder::MsbFirst);
    (0..count).map(|_| Ok(cursor.read_bits(4)? as u8)).collect()
}

/// A zero nibble introduces a run: a zero count ends the stream, otherwise
/// the next nibble is repeated `count` times. Any other nibble is literal.
fn decode_rle4(buffer: &[u8], capacity: usize) -> Result<Vec<u8>> {
    let mut cursor = ByteCursor::new(buffer).with_bit_order(BitOrder::MsbFirst);
    let mut out = Vec::with_capacity(capacity);
    loop {
        let value = cursor.read_bits(4)? as u8;
        if value != 0 {
            push_nibbles(&mut out, value, 1, capacity)?;
            continue;
        }
        let count = cursor.read_bits(4)? as usize;
        if count == 0 {
            break;
        }
        let value = cursor.read_bits(4)? as u8;
        push_nibbles(&mut out, value, count, capacity)?;
    }
    Ok(out)
}

fn push_nibbles(out: &mut Vec<u8>, value: u8, count: usize, capacity: usize) -> Result<()> {
    if out.len() + count > capacity {
        return Err(FormatError::IndexOutOfRange {
            what: "RLE4 output nibble",
            index: out.len() + count - 1,
            limit: capacity,
        });
    }
    out.extend(std::iter::repeat_n(value, count));
    Ok(())
}

fn decode_one_bit(buffer: &[u8], count: usize) -> Result<Vec<u8>> {
    let mut cursor = ByteCursor::new(buffer).with_bit_order(BitOrder::MsbFirst);
    (0..count)
        .map(|_| Ok(if cursor.read_bits(1)? == 1 { 15 } else { 0 }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct GlyphFixture<'a> {
        code: u16,
        encoding: u8,
        width: u16,
        height: u16,
        payload: &'a [u8],
    }

    fn glyph_record(fixture: &GlyphFixture<'_>) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&fixture.code.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(fixture.payload.len() as i32).to_le_bytes());
        out.extend_from_slice(&(24 + fixture.payload.len() as u32).to_le_bytes());
        out.push(fixture.encoding);
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(&fixture.width.to_le_bytes());
        out.extend_from_slice(&fixture.height.to_le_bytes());
        out.push(1u8);
        out.push((-2i8) as u8);
        out.extend_from_slice(&(fixture.width as i16 + 1).to_le_bytes());
        out.extend_from_slice(fixture.payload);
        out
    }

    fn font(glyphs: &[GlyphFixture<'_>]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.push(1);
        out.push(1);
        out.extend_from_slice(&(glyphs.len() as u16).to_le_bytes());

        let records: Vec<Vec<u8>> = glyphs.iter().map(glyph_record).collect();
        let mut offset = 8 + 4 * records.len();
        for record in &records {
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            offset += record.len();
        }
        for record in records {
            out.extend_from_slice(&record);
        }
        out
    }

    #[test]
    fn rle4_run_expands_to_repeated_pixels() {
        let pixels = decode_pixels(&[0x03, 0x50, 0x00], GlyphEncoding::Rle4, 3, 1).unwrap();
        assert_eq!(pixels, vec![5, 5, 5]);
    }

    #[test]
    fn rle4_mixes_literals_and_runs() {
        // 7, run(2 x 9), end
        let pixels = decode_pixels(&[0x70, 0x29, 0x00], GlyphEncoding::Rle4, 2, 2).unwrap();
        assert_eq!(pixels, vec![7, 9, 9, 0]);
    }

    #[test]
    fn rle4_run_may_fill_row_padding_of_odd_width_glyph() {
        // run of 7 into a 3x2 glyph, whose rows pad to 2 bytes each
        let pixels = decode_pixels(&[0x07, 0x50, 0x00], GlyphEncoding::Rle4, 3, 2).unwrap();
        assert_eq!(pixels, vec![5; 6]);
    }

    #[test]
    fn rle4_overflowing_buffer_is_rejected() {
        // run of 15 nibbles into a 3 byte (6 nibble) buffer
        let err = decode_pixels(&[0x0F, 0x10, 0x00], GlyphEncoding::Rle4, 1, 1).unwrap_err();
        assert!(matches!(err, FormatError::IndexOutOfRange { .. }));
    }

    #[test]
    fn raw_odd_width_rows_are_contiguous() {
        // 3x2 glyph: nibbles 1 2 3 / 4 5 6
        let pixels = decode_pixels(&[0x12, 0x34, 0x56], GlyphEncoding::Raw, 3, 2).unwrap();
        assert_eq!(pixels, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn one_bit_pixels_map_to_full_intensity() {
        let pixels = decode_pixels(&[0b1010_0000], GlyphEncoding::OneBit, 4, 1).unwrap();
        assert_eq!(pixels, vec![15, 0, 15, 0]);
    }

    #[test]
    fn decoding_is_deterministic() {
        let payload = [0x04, 0xA3, 0xB0, 0x00];
        let first = decode_pixels(&payload, GlyphEncoding::Rle4, 3, 2).unwrap();
        let second = decode_pixels(&payload, GlyphEncoding::Rle4, 3, 2).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec![10, 10, 10, 10, 3, 11]);
    }

    #[test]
    fn palette_spans_full_range() {
        assert_eq!(palette_level(0), 15);
        assert_eq!(palette_level(7), 127);
        assert_eq!(palette_level(15), 255);
    }

    #[test]
    fn parses_font_sorted_with_statistics() {
        let bytes = font(&[
            GlyphFixture { code: u16::from(b'b'), encoding: 0, width: 3, height: 1, payload: &[0x12, 0x30] },
            GlyphFixture { code: u16::from(b' '), encoding: 0, width: 0, height: 0, payload: &[] },
            GlyphFixture { code: u16::from(b'a'), encoding: 1, width: 4, height: 2, payload: &[0x03, 0x50, 0x00] },
        ]);
        let font = Bf4File::from_bytes(&bytes).expect("font parses");

        let codes: Vec<u16> = font.glyphs.iter().map(|glyph| glyph.code).collect();
        assert_eq!(codes, vec![u16::from(b' '), u16::from(b'a'), u16::from(b'b')]);

        assert_eq!(font.glyph_count, 2);
        assert_eq!(font.max_width, 4);
        assert_eq!(font.max_height, 2);
        assert_eq!(font.max_code_point, u16::from(b'b'));
        assert_eq!(font.total_width, 7);
        assert_eq!(font.avg_width, 4);

        let space = font.glyph(u16::from(b' ')).unwrap();
        assert!(!space.has_bitmap());
        assert_eq!(space.as_rgba8888(), None);

        let a = font.glyph(u16::from(b'a')).unwrap();
        assert_eq!(a.character(), Some('a'));
        assert_eq!(a.encoding, GlyphEncoding::Rle4);
        assert_eq!(a.offset_y, -2);
        assert_eq!(a.pixels.as_deref(), Some(&[5, 5, 5, 0, 0, 0, 0, 0][..]));

        let rgba = a.as_rgba8888().unwrap();
        assert_eq!(&rgba[0..4], &[95, 95, 95, 255]);
        assert_eq!(&rgba[12..16], &[15, 15, 15, 0]);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = Bf4File::from_bytes(b"F4FX\0\0\0\0").unwrap_err();
        assert!(matches!(err, FormatError::MalformedContainer { .. }));
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let bytes = font(&[GlyphFixture { code: 65, encoding: 9, width: 1, height: 1, payload: &[0] }]);
        assert!(matches!(
            Bf4File::from_bytes(&bytes),
            Err(FormatError::UnsupportedVariant { value: 9, .. })
        ));
    }
}
