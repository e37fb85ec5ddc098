//! SDT sound archives.
//!
//! A table of absolute offsets, each pointing at a small header followed by
//! the sample data. The header layout past the name is kept opaque.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::FormatError;
use crate::reader::ByteCursor;
use crate::wad::sanitized_path;

const NAME_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SdtEntry {
    pub name: String,
    pub header_size: u32,
    /// Start of the sample data.
    pub data_offset: usize,
    pub data_size: usize,
}

#[derive(Debug)]
pub struct SdtArchive {
    path: PathBuf,
    bytes: Vec<u8>,
    entries: Vec<SdtEntry>,
}

impl SdtArchive {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path).with_context(|| format!("reading SDT {}", path.display()))?;
        let entries =
            parse_entries(&bytes).with_context(|| format!("parsing SDT {}", path.display()))?;
        Ok(SdtArchive {
            path,
            bytes,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[SdtEntry] {
        &self.entries
    }

    pub fn find_entry(&self, name: &str) -> Option<&SdtEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    pub fn read_entry(&self, entry: &SdtEntry) -> &[u8] {
        &self.bytes[entry.data_offset..entry.data_offset + entry.data_size]
    }

    /// Writes every sample below `dest_dir`; returns the written paths.
    ///
    /// Unnamed samples and names already taken (ignoring case) are written as
    /// `sample_NNNN` instead.
    pub fn extract_all<P: AsRef<Path>>(&self, dest_dir: P) -> Result<Vec<PathBuf>> {
        let dest_dir = dest_dir.as_ref();
        fs::create_dir_all(dest_dir)
            .with_context(|| format!("creating {}", dest_dir.display()))?;

        let mut taken = HashSet::new();
        let mut written = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.iter().enumerate() {
            let mut relative = sanitized_path(&entry.name);
            let key = relative.to_string_lossy().to_ascii_lowercase();
            if relative.as_os_str().is_empty() || !taken.insert(key) {
                relative = PathBuf::from(format!("sample_{index:04}"));
            }
            let dest_path = dest_dir.join(relative);
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            fs::write(&dest_path, self.read_entry(entry))
                .with_context(|| format!("writing {}", dest_path.display()))?;
            written.push(dest_path);
        }
        Ok(written)
    }
}

fn parse_entries(bytes: &[u8]) -> crate::Result<Vec<SdtEntry>> {
    let mut cursor = ByteCursor::new(bytes);
    let count = cursor.read_count()?;
    let mut offsets = Vec::with_capacity(count.min(cursor.remaining() / 4));
    for _ in 0..count {
        offsets.push(cursor.read_count()?);
    }

    let mut entries = Vec::with_capacity(offsets.len());
    for offset in offsets {
        cursor.set_position(offset)?;
        let header_size = cursor.read_u32()?;
        let data_size = cursor.read_count()?;
        let name = cursor.read_string(NAME_LEN)?;

        let data_offset = offset
            .checked_add(header_size as usize)
            .filter(|&start| start <= bytes.len())
            .ok_or(FormatError::InvalidLength {
                offset,
                length: i64::from(header_size),
            })?;
        if data_size > bytes.len() - data_offset {
            return Err(FormatError::UnexpectedEndOfData {
                offset: data_offset,
                needed: data_size,
                available: bytes.len() - data_offset,
            });
        }

        entries.push(SdtEntry {
            name,
            header_size,
            data_offset,
            data_size,
        });
    }
    Ok(entries)
}
