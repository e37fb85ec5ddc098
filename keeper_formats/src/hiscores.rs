use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::error::Result;
use crate::reader::ByteCursor;

const FIELD_CHARS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HiScoresEntry {
    pub score: u32,
    pub name: String,
    pub level: String,
}

/// High score table: headerless `score, name, level` records until EOF.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HiScoresFile {
    pub entries: Vec<HiScoresEntry>,
}

impl HiScoresFile {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("reading hiscores {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("parsing hiscores {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(bytes);
        let mut entries = Vec::new();
        while cursor.has_remaining() {
            entries.push(HiScoresEntry {
                score: cursor.read_u32()?,
                name: cursor.read_varying_length_string(FIELD_CHARS)?.trim().to_string(),
                level: cursor.read_varying_length_string(FIELD_CHARS)?.trim().to_string(),
            });
        }
        Ok(HiScoresFile { entries })
    }
}
