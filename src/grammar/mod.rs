//! Grammar registry: every format constant for one engine generation.
//!
//! A [`Grammar`] bundles the tag width and header layout, cipher keys, file
//! naming, dispatch table, rank tables and index-table layout.  The four
//! shipped grammars live in [`tables`] and are selected by [`GrammarId`].
//! Nothing outside this module hard-codes a tag.

pub mod tables;

use std::fmt;
use std::str::FromStr;

use crate::dispatch::{BlockType, DispatchTable};
use crate::error::Error;
use crate::index::{ROOM_DISK, ROOM_FILE, ROOM_OFFSET};
use crate::order::normalize_tag;

// ── GrammarId ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrammarId {
    V4,
    V5,
    V6,
    V7,
}

impl GrammarId {
    pub const ALL: [GrammarId; 4] = [GrammarId::V4, GrammarId::V5, GrammarId::V6, GrammarId::V7];

    pub fn name(self) -> &'static str {
        match self {
            GrammarId::V4 => "v4",
            GrammarId::V5 => "v5",
            GrammarId::V6 => "v6",
            GrammarId::V7 => "v7",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "v4" | "4" => Some(GrammarId::V4),
            "v5" | "5" => Some(GrammarId::V5),
            "v6" | "6" => Some(GrammarId::V6),
            "v7" | "7" => Some(GrammarId::V7),
            _          => None,
        }
    }

    pub fn grammar(self) -> &'static Grammar {
        match self {
            GrammarId::V4 => &tables::V4,
            GrammarId::V5 => &tables::V5,
            GrammarId::V6 => &tables::V6,
            GrammarId::V7 => &tables::V7,
        }
    }
}

impl fmt::Display for GrammarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GrammarId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GrammarId::from_name(s).ok_or_else(|| Error::UnknownGrammar(s.to_owned()))
    }
}

// ── Layout constants ─────────────────────────────────────────────────────────

/// Where the size field sits relative to the tag, and its endianness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    /// `u32 LE size` then a 2-byte tag (v4).
    SizeThenTagLe,
    /// 4-byte tag then `u32 BE size` (v5 and later).
    TagThenSizeBe,
}

impl HeaderLayout {
    pub fn tag_width(self) -> usize {
        match self {
            HeaderLayout::SizeThenTagLe => 2,
            HeaderLayout::TagThenSizeBe => 4,
        }
    }

    pub fn header_len(self) -> u64 {
        4 + self.tag_width() as u64
    }
}

/// Row layout of the index-file resource tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryLayout {
    /// `count × (u8, u32)` pairs (v4).
    Interleaved,
    /// `count × u8` followed by `count × u32` (v5 and later).
    Columns,
}

/// Physical file names of one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileNaming {
    /// `000.LFL` + `DISK01.LEC`, `DISK02.LEC`, ...
    Lfl,
    /// `<base>.000` + `<base>.001`, ...
    Numbered,
    /// `<base>.LA0` + `<base>.LA1`, ...
    La,
}

impl FileNaming {
    pub fn index_file(self, base: &str) -> String {
        match self {
            FileNaming::Lfl      => "000.LFL".to_owned(),
            FileNaming::Numbered => format!("{base}.000"),
            FileNaming::La       => format!("{base}.LA0"),
        }
    }

    pub fn data_file(self, base: &str, disk: u32) -> String {
        match self {
            FileNaming::Lfl      => format!("DISK{disk:02}.LEC"),
            FileNaming::Numbered => format!("{base}.{disk:03}"),
            FileNaming::La       => format!("{base}.LA{disk}"),
        }
    }

    /// Recover the game base name from an index file name.
    pub fn base_name(self, index_file: &str) -> Option<String> {
        let (stem, ext) = index_file.rsplit_once('.')?;
        let ok = match self {
            FileNaming::Lfl      => return Some(String::new()),
            FileNaming::Numbered => ext == "000",
            FileNaming::La       => ext.eq_ignore_ascii_case("LA0"),
        };
        ok.then(|| stem.to_owned())
    }
}

/// Which kind of physical file a stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Index,
    Data,
}

/// A resource index that legitimately shares its directory entry with
/// another one in shipped games.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDuplicate {
    pub lookup:  &'static str,
    pub index:   u32,
    pub same_as: u32,
}

// ── Grammar ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Grammar {
    pub id:               GrammarId,
    pub layout:           HeaderLayout,
    pub index_cipher:     Option<u8>,
    pub data_cipher:      Option<u8>,
    pub naming:           FileNaming,
    pub dispatch:         DispatchTable,
    /// Container tag (normalized) → canonical child order.
    pub ranks:            &'static [(&'static str, &'static [&'static str])],
    /// Top-level block order of the index file.
    pub index_rank:       &'static [&'static str],
    /// Top-level block order of a data file.
    pub data_rank:        &'static [&'static str],
    /// Container tag → children that must be present on encode.
    pub required:         &'static [(&'static str, &'static [&'static str])],
    pub directory_layout: DirectoryLayout,
    /// Room directory carries real room offsets rather than zeros.
    pub room_dir_offsets: bool,
    /// Bytes between a room-file header and its first child (the v4 room
    /// number).
    pub room_file_prefix: usize,
    pub known_duplicates: &'static [KnownDuplicate],
}

impl Grammar {
    pub fn name(&self) -> &'static str {
        self.id.name()
    }

    pub fn cipher(&self, kind: FileKind) -> Option<u8> {
        match kind {
            FileKind::Index => self.index_cipher,
            FileKind::Data  => self.data_cipher,
        }
    }

    pub fn root_rank(&self, kind: FileKind) -> &'static [&'static str] {
        match kind {
            FileKind::Index => self.index_rank,
            FileKind::Data  => self.data_rank,
        }
    }

    /// Rank table for a container, looked up by its normalized tag.
    pub fn rank_table(&self, tag: &str) -> Option<&'static [&'static str]> {
        let family = normalize_tag(tag);
        self.ranks.iter().find(|(t, _)| *t == family).map(|(_, r)| *r)
    }

    pub fn required_children(&self, tag: &str) -> &'static [&'static str] {
        let family = normalize_tag(tag);
        self.required
            .iter()
            .find(|(t, _)| *t == family)
            .map(|(_, r)| *r)
            .unwrap_or(&[])
    }

    /// Every sub-map name this grammar registers into.
    pub fn lookup_names(&self) -> Vec<&'static str> {
        let mut names = vec![ROOM_FILE, ROOM_OFFSET, ROOM_DISK];
        let types = self.dispatch.exact.iter().map(|(_, t)| *t)
            .chain(self.dispatch.patterns.iter().map(|(_, t)| *t));
        for t in types {
            if let BlockType::Resource { lookup } | BlockType::ResourceDirectory { lookup } = t {
                if !names.contains(&lookup) {
                    names.push(lookup);
                }
            }
        }
        names
    }

    pub fn known_duplicate(&self, lookup: &str, index: u32) -> Option<&KnownDuplicate> {
        self.known_duplicates.iter().find(|d| d.lookup == lookup && d.index == index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grammar_names_round_trip() {
        for id in GrammarId::ALL {
            assert_eq!(GrammarId::from_name(id.name()), Some(id));
            assert_eq!(id.grammar().id, id);
        }
        assert!("v9".parse::<GrammarId>().is_err());
    }

    #[test]
    fn file_naming_per_generation() {
        assert_eq!(FileNaming::Lfl.data_file("", 2), "DISK02.LEC");
        assert_eq!(FileNaming::Numbered.index_file("MONKEY2"), "MONKEY2.000");
        assert_eq!(FileNaming::Numbered.data_file("MONKEY2", 1), "MONKEY2.001");
        assert_eq!(FileNaming::La.data_file("DIG", 2), "DIG.LA2");
        assert_eq!(FileNaming::Numbered.base_name("TENTACLE.000").as_deref(), Some("TENTACLE"));
        assert_eq!(FileNaming::La.base_name("DIG.LA0").as_deref(), Some("DIG"));
        assert_eq!(FileNaming::Numbered.base_name("TENTACLE.001"), None);
    }

    #[test]
    fn numbered_containers_share_a_rank_table() {
        let g = GrammarId::V5.grammar();
        assert_eq!(g.rank_table("IM00"), g.rank_table("IM03"));
        assert!(g.rank_table("ROOM").is_some());
        assert!(g.rank_table("RMHD").is_none());
    }

    #[test]
    fn lookup_names_cover_directories() {
        let names = GrammarId::V7.grammar().lookup_names();
        for n in ["LFLF", "ROOM_OFFSET", "ROOM_DISK", "SCRP", "SOUN", "COST", "CHAR"] {
            assert!(names.contains(&n), "missing {n}");
        }
        assert_eq!(names.iter().filter(|n| **n == "COST").count(), 1);
    }
}
