//! Sound bank map: links sound banks to the SDT archives holding them.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::error::{FormatError, Result};
use crate::reader::ByteCursor;

const HEADER_ID: [u32; 4] = [0xE961_2C01, 0x11D2_31D0, 0xA000_09B4, 0x03F2_93C9];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankMapEntry {
    pub unknown1: u32,
    pub unknown2: i32,
    pub unknown3: u16,
    pub unknown4: u8,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BankMapFile {
    pub unknown1: u32,
    pub unknown2: u32,
    pub entries: Vec<BankMapEntry>,
}

impl BankMapFile {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("reading bank map {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("parsing bank map {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(bytes);
        for expected in HEADER_ID {
            let found = cursor.read_u32()?;
            if found != expected {
                return Err(FormatError::malformed(
                    format!("bank map id {expected:#010x}"),
                    format!("{found:#010x}"),
                ));
            }
        }

        let unknown1 = cursor.read_u32()?;
        let unknown2 = cursor.read_u32()?;
        let count = cursor.read_count()?;

        // Fixed 11 byte records first, names follow in the same order.
        let mut entries = Vec::with_capacity(count.min(cursor.remaining() / 11));
        for _ in 0..count {
            entries.push(BankMapEntry {
                unknown1: cursor.read_u32()?,
                unknown2: cursor.read_i32()?,
                unknown3: cursor.read_u16()?,
                unknown4: cursor.read_u8()?,
                name: String::new(),
            });
        }
        for entry in &mut entries {
            entry.name = cursor.read_prefixed_string()?.trim().to_string();
        }

        Ok(BankMapFile {
            unknown1,
            unknown2,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(ids: [u32; 4], count: u32) -> Vec<u8> {
        let mut out = Vec::new();
        for id in ids {
            out.extend_from_slice(&id.to_le_bytes());
        }
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&32769u32.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out
    }

    #[test]
    fn parses_entries_and_names() {
        let mut bytes = header(HEADER_ID, 2);
        for (a, b, c, d) in [(7u32, -1i32, 3u16, 9u8), (8, 2, 4, 0)] {
            bytes.extend_from_slice(&a.to_le_bytes());
            bytes.extend_from_slice(&b.to_le_bytes());
            bytes.extend_from_slice(&c.to_le_bytes());
            bytes.push(d);
        }
        for name in ["Global.sdt\0", " Speech.sdt \0"] {
            bytes.extend_from_slice(&(name.len() as u32).to_le_bytes());
            bytes.extend_from_slice(name.as_bytes());
        }

        let map = BankMapFile::from_bytes(&bytes).unwrap();
        assert_eq!(map.unknown1, 1);
        assert_eq!(map.unknown2, 32769);
        assert_eq!(map.entries.len(), 2);
        assert_eq!(map.entries[0].unknown2, -1);
        assert_eq!(map.entries[0].unknown4, 9);
        assert_eq!(map.entries[0].name, "Global.sdt");
        assert_eq!(map.entries[1].name, "Speech.sdt");
    }

    #[test]
    fn wrong_id_fails_before_reading_entries() {
        // Count claims a huge table but the id check comes first.
        let mut ids = HEADER_ID;
        ids[2] = 0xA000_09B5;
        let bytes = header(ids, u32::MAX);
        let err = BankMapFile::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, FormatError::MalformedContainer { .. }));
    }

    #[test]
    fn truncated_names_report_end_of_data() {
        let mut bytes = header(HEADER_ID, 1);
        bytes.extend_from_slice(&[0u8; 11]);
        bytes.extend_from_slice(&20u32.to_le_bytes());
        bytes.extend_from_slice(b"short");
        assert!(matches!(
            BankMapFile::from_bytes(&bytes),
            Err(FormatError::UnexpectedEndOfData { .. })
        ));
    }
}
