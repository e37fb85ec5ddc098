//! Engine texture cache: `EngineTextures.dir` indexes records stored in
//! `EngineTextures.dat`.
//!
//! Records are kept in their cached encoding; decoding the pixels is left to
//! the consumer.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use memmap2::{Mmap, MmapOptions};
use serde::Serialize;
use tempfile::{NamedTempFile, TempPath};

use crate::error::FormatError;
use crate::reader::ByteCursor;
use crate::wad::sanitized_path;

const DIR_MAGIC: &[u8; 4] = b"TCHC";
const RECORD_HEADER_SIZE: usize = 12;
/// res x, res y and flags are counted in the record size.
const RECORD_SIZE_PREFIX: u32 = 8;
const ALPHA_FLAG: u32 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextureEntry {
    pub name: String,
    /// Offset of the record inside the `.dat` file.
    pub offset: usize,
    pub width: u32,
    pub height: u32,
    pub res_x: u16,
    pub res_y: u16,
    pub flags: u32,
    pub alpha: bool,
    /// Encoded payload length.
    pub data_size: usize,
}

impl TextureEntry {
    fn payload_offset(&self) -> usize {
        self.offset + RECORD_HEADER_SIZE + RECORD_SIZE_PREFIX as usize
    }
}

#[derive(Debug)]
pub struct TextureCache {
    dat_path: PathBuf,
    version: u32,
    mmap: Mmap,
    entries: Vec<TextureEntry>,
}

impl TextureCache {
    /// Opens `EngineTextures.dat`; the index is read from the `.dir` file
    /// next to it.
    pub fn open<P: AsRef<Path>>(dat_path: P) -> Result<Self> {
        let dat_path = dat_path.as_ref().to_path_buf();
        let dir_path = dat_path.with_extension("dir");

        let dir_bytes = fs::read(&dir_path)
            .with_context(|| format!("reading texture index {}", dir_path.display()))?;
        let file = File::open(&dat_path)
            .with_context(|| format!("opening texture cache {}", dat_path.display()))?;
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("memory-mapping texture cache {}", dat_path.display()))?;

        let (version, entries) = parse_cache(&dir_bytes, &mmap)
            .with_context(|| format!("parsing texture cache {}", dat_path.display()))?;
        log::debug!(
            "opened {} (version {version}, {} textures)",
            dat_path.display(),
            entries.len()
        );

        Ok(TextureCache {
            dat_path,
            version,
            mmap,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dat_path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn entries(&self) -> &[TextureEntry] {
        &self.entries
    }

    pub fn find(&self, name: &str) -> Option<&TextureEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    /// Encoded payload of a record.
    pub fn read_entry(&self, entry: &TextureEntry) -> &[u8] {
        let start = entry.payload_offset();
        &self.mmap[start..start + entry.data_size]
    }

    /// Whole record (header and payload) as stored in the cache.
    pub fn raw_record(&self, entry: &TextureEntry) -> &[u8] {
        &self.mmap[entry.offset..entry.payload_offset() + entry.data_size]
    }

    pub fn extract_file<P: AsRef<Path>>(&self, name: &str, dest_dir: P) -> Result<Option<PathBuf>> {
        let Some(entry) = self.find(name) else {
            return Ok(None);
        };
        self.extract_entry(entry, dest_dir).map(Some)
    }

    /// Writes the raw record of `entry` to `dest_dir/<name>`.
    pub fn extract_entry<P: AsRef<Path>>(&self, entry: &TextureEntry, dest_dir: P) -> Result<PathBuf> {
        let dest_path = dest_dir.as_ref().join(sanitized_path(&entry.name));
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&dest_path, self.raw_record(entry))
            .with_context(|| format!("writing {}", dest_path.display()))?;
        Ok(dest_path)
    }

    /// Copies a record to a temporary file that is removed when the returned
    /// path is dropped.
    pub fn extract_temp(&self, name: &str) -> Result<Option<TempPath>> {
        let Some(entry) = self.find(name) else {
            return Ok(None);
        };
        let mut file = NamedTempFile::new().context("creating temporary texture file")?;
        file.write_all(self.raw_record(entry))
            .with_context(|| format!("writing temporary copy of {}", entry.name))?;
        Ok(Some(file.into_temp_path()))
    }
}

fn parse_cache(dir: &[u8], dat: &[u8]) -> crate::Result<(u32, Vec<TextureEntry>)> {
    let mut cursor = ByteCursor::new(dir);
    let magic = cursor.read_tag()?;
    if &magic != DIR_MAGIC {
        return Err(FormatError::malformed(
            "TCHC",
            String::from_utf8_lossy(&magic).into_owned(),
        ));
    }
    let version = cursor.read_u32()?;
    let count = cursor.read_count()?;
    let _unknown = cursor.read_u32()?;

    let mut entries = Vec::with_capacity(count.min(cursor.remaining()));
    while cursor.has_remaining() {
        let name = cursor.read_c_string()?;
        let offset = cursor.read_count()?;
        entries.push(read_record(dat, name, offset)?);
    }
    if entries.len() != count {
        log::warn!(
            "texture index declares {count} entries, found {}",
            entries.len()
        );
    }
    Ok((version, entries))
}

fn read_record(dat: &[u8], name: String, offset: usize) -> crate::Result<TextureEntry> {
    let mut cursor = ByteCursor::new(dat);
    cursor.set_position(offset)?;
    let width = cursor.read_u32()?;
    let height = cursor.read_u32()?;
    let size = cursor.read_u32()?;
    let res_x = cursor.read_u16()?;
    let res_y = cursor.read_u16()?;
    let flags = cursor.read_u32()?;

    let data_size = size
        .checked_sub(RECORD_SIZE_PREFIX)
        .ok_or(FormatError::InvalidLength {
            offset: offset + 8,
            length: i64::from(size),
        })? as usize;
    if data_size > cursor.remaining() {
        return Err(FormatError::UnexpectedEndOfData {
            offset: cursor.position(),
            needed: data_size,
            available: cursor.remaining(),
        });
    }

    Ok(TextureEntry {
        name,
        offset,
        width,
        height,
        res_x,
        res_y,
        flags,
        alpha: flags & ALPHA_FLAG != 0,
        data_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(width: u32, height: u32, flags: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32 + 8).to_le_bytes());
        out.extend_from_slice(&width.to_le_bytes()[..2]);
        out.extend_from_slice(&height.to_le_bytes()[..2]);
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn write_cache(dir: &Path, declared: u32) -> PathBuf {
        let mut dat = record(8, 4, 0x80, b"pixels");
        let second = dat.len();
        dat.extend(record(16, 16, 0, b"xy"));

        let mut index = Vec::new();
        index.extend_from_slice(DIR_MAGIC);
        index.extend_from_slice(&1u32.to_le_bytes());
        index.extend_from_slice(&declared.to_le_bytes());
        index.extend_from_slice(&0u32.to_le_bytes());
        for (name, offset) in [("Floor_Lava0", 0usize), ("Wall_Rock1", second)] {
            index.extend_from_slice(name.as_bytes());
            index.push(0);
            index.extend_from_slice(&(offset as u32).to_le_bytes());
        }

        let dat_path = dir.join("EngineTextures.dat");
        fs::write(&dat_path, dat).unwrap();
        fs::write(dir.join("EngineTextures.dir"), index).unwrap();
        dat_path
    }

    #[test]
    fn indexes_records_and_reads_payloads() {
        let dir = TempDir::new().unwrap();
        let cache = TextureCache::open(write_cache(dir.path(), 2)).unwrap();
        assert_eq!(cache.version(), 1);
        assert_eq!(cache.entries().len(), 2);

        let lava = cache.find("floor_lava0").unwrap();
        assert_eq!((lava.width, lava.height), (8, 4));
        assert!(lava.alpha);
        assert_eq!(cache.read_entry(lava), b"pixels");

        let rock = cache.find("Wall_Rock1").unwrap();
        assert!(!rock.alpha);
        assert_eq!(cache.read_entry(rock), b"xy");
        assert!(cache.find("Missing").is_none());
    }

    #[test]
    fn extracts_to_directory_and_temp_file() {
        let dir = TempDir::new().unwrap();
        let cache = TextureCache::open(write_cache(dir.path(), 2)).unwrap();
        let out = TempDir::new().unwrap();

        let written = cache.extract_file("Wall_Rock1", out.path()).unwrap().unwrap();
        assert_eq!(fs::read(&written).unwrap().len(), 20 + 2);
        assert!(cache.extract_file("nope", out.path()).unwrap().is_none());

        let temp = cache.extract_temp("Floor_Lava0").unwrap().unwrap();
        let temp_path = temp.to_path_buf();
        assert_eq!(fs::read(&temp_path).unwrap().len(), 20 + 6);
        drop(temp);
        assert!(!temp_path.exists());
    }

    #[test]
    fn declared_count_mismatch_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let cache = TextureCache::open(write_cache(dir.path(), 5)).unwrap();
        assert_eq!(cache.entries().len(), 2);
    }

    #[test]
    fn record_past_end_fails() {
        let dat = record(1, 1, 0, b"abc");
        let err = read_record(&dat[..dat.len() - 1], "t".into(), 0).unwrap_err();
        assert!(matches!(err, FormatError::UnexpectedEndOfData { .. }));
    }
}
