pub mod bank_map;
pub mod bf4;
pub mod chunk;
pub mod error;
pub mod export;
pub mod hiscores;
pub mod kmf;
pub mod reader;
pub mod refpack;
pub mod sdt;
pub mod texture_cache;
pub mod wad;

pub use bank_map::{BankMapEntry, BankMapFile};
pub use bf4::{Bf4File, Bf4Glyph, GlyphEncoding};
pub use chunk::Tag;
pub use error::{FormatError, Result};
pub use export::ModelExport;
pub use hiscores::{HiScoresEntry, HiScoresFile};
pub use kmf::{KmfFile, ModelDocument, ModelType};
pub use reader::{BitOrder, ByteCursor};
pub use sdt::{SdtArchive, SdtEntry};
pub use texture_cache::{TextureCache, TextureEntry};
pub use wad::{WadArchive, WadCompression, WadEntry};
