use std::fs::{self, File};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use memmap2::{Mmap, MmapOptions};
use serde::Serialize;

use crate::error::FormatError;
use crate::reader::ByteCursor;
use crate::refpack;

const MAGIC: &[u8; 4] = b"DWFB";
const HEADER_FIELDS_OFFSET: usize = 0x48;
const ENTRIES_OFFSET: usize = 0x58;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WadCompression {
    Stored,
    RefPack,
}

impl WadCompression {
    fn from_raw(raw: u32) -> crate::Result<Self> {
        match raw {
            0 => Ok(WadCompression::Stored),
            4 => Ok(WadCompression::RefPack),
            other => Err(FormatError::unsupported("WAD compression", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WadEntry {
    /// Path inside the archive with `/` separators.
    pub name: String,
    pub offset: u64,
    pub compressed_size: u32,
    pub size: u32,
    pub compression: WadCompression,
}

impl WadEntry {
    pub fn data_range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.compressed_size as usize
    }
}

/// Memory-mapped `DWFB` archive.
#[derive(Debug)]
pub struct WadArchive {
    path: PathBuf,
    mmap: Mmap,
    version: u32,
    entries: Vec<WadEntry>,
}

impl WadArchive {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf)
            .with_context(|| format!("opening WAD archive at {}", path_buf.display()))?;
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("memory-mapping WAD archive {}", path_buf.display()))?;

        let (version, entries) = parse_entries(&mmap)
            .with_context(|| format!("parsing WAD archive {}", path_buf.display()))?;
        log::debug!(
            "opened {} (version {version}, {} entries)",
            path_buf.display(),
            entries.len()
        );

        Ok(WadArchive {
            path: path_buf,
            mmap,
            version,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn entries(&self) -> &[WadEntry] {
        &self.entries
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn find_entry(&self, name: &str) -> Option<&WadEntry> {
        let wanted = name.replace('\\', "/");
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(&wanted))
    }

    /// Stored bytes of an entry, before any decompression.
    pub fn raw_entry_bytes(&self, entry: &WadEntry) -> &[u8] {
        &self.mmap[entry.data_range()]
    }

    pub fn read_entry(&self, entry: &WadEntry) -> crate::Result<Vec<u8>> {
        let raw = self.raw_entry_bytes(entry);
        match entry.compression {
            WadCompression::Stored => Ok(raw.to_vec()),
            WadCompression::RefPack => {
                let data = refpack::decompress(raw)?;
                if data.len() != entry.size as usize {
                    return Err(FormatError::InvalidLength {
                        offset: entry.offset as usize,
                        length: data.len() as i64,
                    });
                }
                Ok(data)
            }
        }
    }

    /// Decoded contents of `name`, `None` when the archive has no such file.
    pub fn get_file_data(&self, name: &str) -> crate::Result<Option<Vec<u8>>> {
        self.find_entry(name)
            .map(|entry| self.read_entry(entry))
            .transpose()
    }

    /// Writes `name` below `dest_dir`, keeping its archive-relative path.
    pub fn extract_file_data<P: AsRef<Path>>(
        &self,
        name: &str,
        dest_dir: P,
    ) -> Result<Option<PathBuf>> {
        let Some(entry) = self.find_entry(name) else {
            return Ok(None);
        };
        self.extract_entry(entry, dest_dir).map(Some)
    }

    pub fn extract_entry<P: AsRef<Path>>(&self, entry: &WadEntry, dest_dir: P) -> Result<PathBuf> {
        let dest_path = dest_dir.as_ref().join(sanitized_path(&entry.name));
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let data = self
            .read_entry(entry)
            .with_context(|| format!("decoding {}", entry.name))?;
        fs::write(&dest_path, data).with_context(|| format!("writing {}", dest_path.display()))?;
        Ok(dest_path)
    }

    /// Extracts every entry; returns the number of files written.
    pub fn extract_all<P: AsRef<Path>>(&self, dest_dir: P) -> Result<usize> {
        let dest_dir = dest_dir.as_ref();
        for entry in &self.entries {
            self.extract_entry(entry, dest_dir)?;
        }
        Ok(self.entries.len())
    }
}

/// Archive name as a relative path that cannot climb out of the destination.
pub fn sanitized_path(name: &str) -> PathBuf {
    let raw = PathBuf::from(name.replace('\\', "/"));
    let mut relative = PathBuf::new();
    for component in raw.components() {
        if let Component::Normal(part) = component {
            relative.push(part);
        }
    }
    relative
}

fn parse_entries(bytes: &[u8]) -> crate::Result<(u32, Vec<WadEntry>)> {
    let mut cursor = ByteCursor::new(bytes);
    let magic = cursor.read_tag()?;
    if &magic != MAGIC {
        return Err(FormatError::malformed(
            "DWFB",
            String::from_utf8_lossy(&magic).into_owned(),
        ));
    }
    let version = cursor.read_u32()?;

    cursor.set_position(HEADER_FIELDS_OFFSET)?;
    let file_count = cursor.read_count()?;
    let _name_table_offset = cursor.read_u32()?;
    let _name_table_size = cursor.read_u32()?;
    let _unknown = cursor.read_u32()?;

    cursor.set_position(ENTRIES_OFFSET)?;
    let mut entries = Vec::with_capacity(file_count.min(cursor.remaining() / 40));
    for _ in 0..file_count {
        let _unknown = cursor.read_u32()?;
        let name_offset = cursor.read_count()?;
        let name_size = cursor.read_count()?;
        let data_offset = cursor.read_count()?;
        let compressed_size = cursor.read_u32()?;
        let compression = WadCompression::from_raw(cursor.read_u32()?)?;
        let size = cursor.read_u32()?;
        cursor.skip(12)?;

        let in_bounds = data_offset
            .checked_add(compressed_size as usize)
            .is_some_and(|end| end <= bytes.len());
        if !in_bounds {
            return Err(FormatError::InvalidLength {
                offset: data_offset,
                length: i64::from(compressed_size),
            });
        }

        let mut names = ByteCursor::new(bytes);
        names.set_position(name_offset)?;
        let name = names.read_string(name_size)?.replace('\\', "/");

        entries.push(WadEntry {
            name,
            offset: data_offset as u64,
            compressed_size,
            size,
            compression,
        });
    }

    Ok((version, entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    struct Stored<'a> {
        name: &'a str,
        data: &'a [u8],
        compression: u32,
        size: u32,
    }

    fn build_wad(files: &[Stored<'_>]) -> Vec<u8> {
        let entries_end = ENTRIES_OFFSET + files.len() * 40;
        let mut names = Vec::new();
        let mut name_spans = Vec::new();
        for file in files {
            name_spans.push((entries_end + names.len(), file.name.len() + 1));
            names.extend_from_slice(file.name.as_bytes());
            names.push(0);
        }
        let data_start = entries_end + names.len();

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&2u32.to_le_bytes());
        out.resize(HEADER_FIELDS_OFFSET, 0);
        out.extend_from_slice(&(files.len() as u32).to_le_bytes());
        out.extend_from_slice(&(entries_end as u32).to_le_bytes());
        out.extend_from_slice(&(names.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());

        let mut data_offset = data_start;
        for (file, &(name_offset, name_size)) in files.iter().zip(&name_spans) {
            for value in [
                0,
                name_offset as u32,
                name_size as u32,
                data_offset as u32,
                file.data.len() as u32,
                file.compression,
                file.size,
                0,
                0,
                0,
            ] {
                out.extend_from_slice(&value.to_le_bytes());
            }
            data_offset += file.data.len();
        }
        out.extend_from_slice(&names);
        for file in files {
            out.extend_from_slice(file.data);
        }
        out
    }

    fn write_temp(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn reads_stored_and_compressed_entries() {
        let packed = [0x10, 0xFB, 0, 0, 4, 0xE0, b'D', b'A', b'T', b'A', 0xFC];
        let file = write_temp(&build_wad(&[
            Stored { name: "Meshes\\Imp.kmf", data: b"KMSH", compression: 0, size: 4 },
            Stored { name: "Text.bin", data: &packed, compression: 4, size: 4 },
        ]));

        let archive = WadArchive::open(file.path()).unwrap();
        assert_eq!(archive.version(), 2);
        assert_eq!(archive.entry_count(), 2);
        assert_eq!(
            archive.file_names().collect::<Vec<_>>(),
            vec!["Meshes/Imp.kmf", "Text.bin"]
        );

        let entry = archive.find_entry("meshes/imp.KMF").expect("case-insensitive lookup");
        assert_eq!(entry.compression, WadCompression::Stored);
        assert_eq!(archive.get_file_data("MESHES\\IMP.KMF").unwrap().unwrap(), b"KMSH");
        assert_eq!(archive.get_file_data("text.bin").unwrap().unwrap(), b"DATA");
        assert!(archive.get_file_data("missing.kmf").unwrap().is_none());
    }

    #[test]
    fn extracts_below_destination() {
        let file = write_temp(&build_wad(&[
            Stored { name: "Sprite\\Cursor.png", data: b"png", compression: 0, size: 3 },
            Stored { name: "..\\escape.txt", data: b"no", compression: 0, size: 2 },
        ]));
        let archive = WadArchive::open(file.path()).unwrap();
        let dest = TempDir::new().unwrap();

        let written = archive
            .extract_file_data("sprite/cursor.png", dest.path())
            .unwrap()
            .unwrap();
        assert_eq!(written, dest.path().join("Sprite").join("Cursor.png"));
        assert_eq!(fs::read(&written).unwrap(), b"png");
        assert!(archive.extract_file_data("nope", dest.path()).unwrap().is_none());

        assert_eq!(archive.extract_all(dest.path()).unwrap(), 2);
        assert!(dest.path().join("escape.txt").exists());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = build_wad(&[]);
        bytes[0..4].copy_from_slice(b"PKWA");
        let file = write_temp(&bytes);
        let err = WadArchive::open(file.path()).unwrap_err();
        let format = err.downcast_ref::<FormatError>().expect("format error");
        assert!(matches!(format, FormatError::MalformedContainer { .. }));
    }

    #[test]
    fn entry_past_end_of_file_is_rejected() {
        let mut bytes = build_wad(&[Stored { name: "a", data: b"abcd", compression: 0, size: 4 }]);
        bytes.truncate(bytes.len() - 1);
        let file = write_temp(&bytes);
        assert!(WadArchive::open(file.path()).is_err());
    }

    #[test]
    fn sanitized_path_drops_parent_and_root_components() {
        assert_eq!(sanitized_path("\\a\\..\\b.txt"), PathBuf::from("a/b.txt"));
        assert_eq!(sanitized_path("Data/x.wad"), PathBuf::from("Data/x.wad"));
    }
}
