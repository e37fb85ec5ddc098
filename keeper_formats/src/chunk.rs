use std::fmt;

use crate::error::{FormatError, Result};
use crate::reader::ByteCursor;

/// Four ASCII bytes opening a structural section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Tag(*bytes)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

/// Reads the next four bytes and fails unless they spell `expected`.
pub fn expect_tag(cursor: &mut ByteCursor<'_>, expected: Tag) -> Result<()> {
    let found = Tag(cursor.read_tag()?);
    if found != expected {
        return Err(FormatError::malformed(
            expected.to_string(),
            found.to_string(),
        ));
    }
    Ok(())
}

/// Like [`expect_tag`], then skips the u32 section size that follows every
/// tag in the chunked formats.
pub fn expect_section(cursor: &mut ByteCursor<'_>, expected: Tag) -> Result<()> {
    expect_tag(cursor, expected)?;
    cursor.skip(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_reports_both_tags() {
        let mut cursor = ByteCursor::new(b"MATLxxxx");
        let err = expect_tag(&mut cursor, Tag::new(b"HEAD")).unwrap_err();
        match err {
            FormatError::MalformedContainer { expected, found } => {
                assert_eq!(expected, "HEAD");
                assert_eq!(found, "MATL");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn section_skips_size_field() {
        let mut data = b"MESH".to_vec();
        data.extend_from_slice(&123u32.to_le_bytes());
        data.push(7);
        let mut cursor = ByteCursor::new(&data);
        expect_section(&mut cursor, Tag::new(b"MESH")).unwrap();
        assert_eq!(cursor.read_u8().unwrap(), 7);
    }

    #[test]
    fn non_printable_tags_are_escaped() {
        assert_eq!(Tag([b'A', 0, b'B', 0xff]).to_string(), "A\\x00B\\xff");
    }
}
