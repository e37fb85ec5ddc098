use std::fmt;

use serde::Serialize;

/// One asset category the converter produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ConvertProcess {
    Textures,
    Models,
    MouseCursors,
    MusicAndSounds,
    InterfaceTexts,
    Paths,
    HiScores,
    Fonts,
    MapThumbnails,
}

impl ConvertProcess {
    /// Declaration order; also the order tasks are registered in.
    pub const ALL: [ConvertProcess; 9] = [
        ConvertProcess::Textures,
        ConvertProcess::Models,
        ConvertProcess::MouseCursors,
        ConvertProcess::MusicAndSounds,
        ConvertProcess::InterfaceTexts,
        ConvertProcess::Paths,
        ConvertProcess::HiScores,
        ConvertProcess::Fonts,
        ConvertProcess::MapThumbnails,
    ];

    /// Output format version. Bumping it forces the category to be rebuilt on
    /// the next run.
    pub fn version(self) -> u32 {
        match self {
            ConvertProcess::Textures => 6,
            ConvertProcess::Models => 6,
            ConvertProcess::MouseCursors => 4,
            ConvertProcess::MusicAndSounds => 4,
            ConvertProcess::InterfaceTexts => 3,
            ConvertProcess::Paths => 4,
            ConvertProcess::HiScores => 2,
            ConvertProcess::Fonts => 3,
            ConvertProcess::MapThumbnails => 3,
        }
    }

    pub fn dependencies(self) -> &'static [ConvertProcess] {
        match self {
            ConvertProcess::Models | ConvertProcess::MapThumbnails => &[ConvertProcess::Textures],
            _ => &[],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ConvertProcess::Textures => "Textures",
            ConvertProcess::Models => "Models",
            ConvertProcess::MouseCursors => "MouseCursors",
            ConvertProcess::MusicAndSounds => "MusicAndSounds",
            ConvertProcess::InterfaceTexts => "InterfaceTexts",
            ConvertProcess::Paths => "Paths",
            ConvertProcess::HiScores => "HiScores",
            ConvertProcess::Fonts => "Fonts",
            ConvertProcess::MapThumbnails => "MapThumbnails",
        }
    }

    /// Key under which the converted version is recorded in the settings.
    pub fn setting_name(self) -> String {
        format!("{}Version", self.name())
    }
}

impl fmt::Display for ConvertProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_and_dependencies_match_the_converter_table() {
        let table: Vec<(ConvertProcess, u32, &[ConvertProcess])> = ConvertProcess::ALL
            .iter()
            .map(|&process| (process, process.version(), process.dependencies()))
            .collect();
        assert_eq!(table[0], (ConvertProcess::Textures, 6, &[][..]));
        assert_eq!(
            table[1],
            (ConvertProcess::Models, 6, &[ConvertProcess::Textures][..])
        );
        assert_eq!(
            table[8],
            (ConvertProcess::MapThumbnails, 3, &[ConvertProcess::Textures][..])
        );
        assert_eq!(ConvertProcess::HiScores.version(), 2);
    }

    #[test]
    fn setting_names_are_pascal_case() {
        assert_eq!(ConvertProcess::Textures.setting_name(), "TexturesVersion");
        assert_eq!(ConvertProcess::MouseCursors.setting_name(), "MouseCursorsVersion");
        assert_eq!(ConvertProcess::MusicAndSounds.to_string(), "MusicAndSounds");
    }
}
