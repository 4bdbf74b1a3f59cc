//! Tag dispatch: from a 2- or 4-byte tag to the kind of block it introduces.
//!
//! Resolution is three-tiered: an exact match in the grammar's static table,
//! then the first matching fallback pattern, then the grammar-wide default.
//! The same table serves blocks read from an archive stream and entries
//! found while loading a decomposed tree; the tree side adds an ignore set
//! for sidecar files.

use byteorder::{ByteOrder, LittleEndian};
use tracing::warn;

use crate::block::Tag;
use crate::tree::naming::{self, EntryName};

/// Width of an index number stored inside a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWidth {
    U8,
    U16,
}

impl IndexWidth {
    pub fn len(self) -> usize {
        match self {
            IndexWidth::U8  => 1,
            IndexWidth::U16 => 2,
        }
    }
}

/// Where a payload-numbered block keeps its own number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSource {
    /// For containers: the tag of the header child holding the number.
    pub child:  Option<&'static str>,
    pub offset: usize,
    pub width:  IndexWidth,
}

impl IndexSource {
    pub fn read(&self, payload: &[u8]) -> Option<u32> {
        let bytes = payload.get(self.offset..self.offset + self.width.len())?;
        Some(match self.width {
            IndexWidth::U8  => u32::from(bytes[0]),
            IndexWidth::U16 => u32::from(LittleEndian::read_u16(bytes)),
        })
    }
}

/// Every kind of block a grammar can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// Opaque payload.
    Leaf,
    /// Anonymous ordered children.
    Container,
    /// Leaf numbered through the room-relative key chain.
    Resource { lookup: &'static str },
    /// Leaf numbered by bytes of its own payload.
    Numbered { lookup: &'static str, source: IndexSource },
    /// Container numbered by bytes of one of its children.
    NumberedContainer { lookup: &'static str, source: IndexSource },
    /// Room-like container, numbered by `(disk, start offset)`.
    RoomFile,
    /// The room block itself; anchors room-relative offsets.
    Room,
    /// Per-disk table of room offsets, filled after its siblings.
    RoomOffsets,
    /// Index-file table of room disks (and offsets).
    RoomDirectory,
    /// Index-file table of resource locations.
    ResourceDirectory { lookup: &'static str },
}

/// How a block's body is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Leaf,
    Container,
    /// Regenerated from the index map on encode.
    Table,
}

impl BlockType {
    pub fn shape(self) -> Shape {
        match self {
            BlockType::Leaf
            | BlockType::Resource { .. }
            | BlockType::Numbered { .. } => Shape::Leaf,
            BlockType::Container
            | BlockType::NumberedContainer { .. }
            | BlockType::RoomFile
            | BlockType::Room => Shape::Container,
            BlockType::RoomOffsets
            | BlockType::RoomDirectory
            | BlockType::ResourceDirectory { .. } => Shape::Table,
        }
    }

    /// Sub-map (and unknown-counter) name for globally indexed kinds.
    pub fn lookup_name(self) -> Option<&'static str> {
        match self {
            BlockType::Resource { lookup }
            | BlockType::Numbered { lookup, .. }
            | BlockType::NumberedContainer { lookup, .. } => Some(lookup),
            BlockType::RoomFile => Some(crate::index::ROOM_FILE),
            _ => None,
        }
    }

    pub fn is_indexed(self) -> bool {
        self.lookup_name().is_some()
    }

    /// Index comes from the map (decode) or the entry name (tree load),
    /// rather than from the block's own bytes.
    pub fn is_map_indexed(self) -> bool {
        matches!(self, BlockType::Resource { .. } | BlockType::RoomFile)
    }
}

/// Fallback tag pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagPattern {
    /// A family prefix followed only by digits: `IM00`, `IM01`, ...
    Numbered(&'static str),
}

impl TagPattern {
    pub fn matches(&self, tag: &str) -> bool {
        match self {
            TagPattern::Numbered(family) => tag
                .strip_prefix(family)
                .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchTable {
    pub exact:    &'static [(&'static str, BlockType)],
    pub patterns: &'static [(TagPattern, BlockType)],
    pub default:  BlockType,
}

impl DispatchTable {
    pub fn resolve(&self, tag: &Tag) -> BlockType {
        let name = tag.as_str();
        if let Some((_, t)) = self.exact.iter().find(|(t, _)| *t == name) {
            return *t;
        }
        if let Some((_, t)) = self.patterns.iter().find(|(p, _)| p.matches(&name)) {
            return *t;
        }
        self.default
    }
}

// ── Tree context ─────────────────────────────────────────────────────────────

/// Files in a tree directory that are metadata, never blocks.
pub const TREE_IGNORE: &[&str] = &[naming::ORDER_FILE, naming::MANIFEST_FILE];

/// Outcome of dispatching one directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEntry {
    Block { name: EntryName, block_type: BlockType },
    Ignored,
    Unrecognized,
}

impl DispatchTable {
    /// Dispatch a file or directory name found while loading a tree.
    ///
    /// Unrecognized names are logged and reported as such; the caller skips
    /// them.
    pub fn resolve_entry(&self, file_name: &str, is_dir: bool, tag_width: usize) -> TreeEntry {
        if TREE_IGNORE.contains(&file_name) {
            return TreeEntry::Ignored;
        }
        let Some(name) = naming::parse(file_name, is_dir, tag_width) else {
            warn!(entry = file_name, "skipping unrecognized tree entry");
            return TreeEntry::Unrecognized;
        };
        let resolved = self.resolve(&name.tag);
        let block_type = match (name.ext, resolved.shape()) {
            (naming::Ext::Dir, Shape::Container)
            | (naming::Ext::Dump, Shape::Leaf)
            | (naming::Ext::Table, Shape::Table) => resolved,
            // A table that failed to parse on unpack was kept verbatim.
            (naming::Ext::Dump, Shape::Table) => BlockType::Leaf,
            _ => {
                warn!(entry = file_name, kind = ?resolved, "tree entry does not match its block kind; skipping");
                return TreeEntry::Unrecognized;
            }
        };
        TreeEntry::Block { name, block_type }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarId;

    fn tag(s: &str) -> Tag {
        s.parse().unwrap()
    }

    #[test]
    fn exact_then_pattern_then_default() {
        let d = &GrammarId::V5.grammar().dispatch;
        assert_eq!(d.resolve(&tag("LFLF")), BlockType::RoomFile);
        assert_eq!(d.resolve(&tag("IM07")), BlockType::Container);
        assert_eq!(d.resolve(&tag("IMHD")), BlockType::Leaf);
        assert_eq!(d.resolve(&tag("ZP01")), BlockType::Leaf);
        assert_eq!(d.resolve(&tag("DSCR")), BlockType::ResourceDirectory { lookup: "SCRP" });
    }

    #[test]
    fn lookup_name_may_differ_from_tag() {
        let d = &GrammarId::V7.grammar().dispatch;
        assert_eq!(d.resolve(&tag("AKOS")).lookup_name(), Some("COST"));
    }

    #[test]
    fn numbered_pattern_needs_digits() {
        let p = TagPattern::Numbered("IM");
        assert!(p.matches("IM00"));
        assert!(p.matches("IM12"));
        assert!(!p.matches("IMHD"));
        assert!(!p.matches("IM"));
    }

    #[test]
    fn payload_index_sources() {
        let u8src = IndexSource { child: None, offset: 0, width: IndexWidth::U8 };
        let u16src = IndexSource { child: None, offset: 1, width: IndexWidth::U16 };
        assert_eq!(u8src.read(&[200, 1]), Some(200));
        assert_eq!(u16src.read(&[0, 0x34, 0x12]), Some(0x1234));
        assert_eq!(u16src.read(&[0, 1]), None);
    }

    #[test]
    fn tree_entries() {
        let d = &GrammarId::V5.grammar().dispatch;
        assert_eq!(d.resolve_entry("order.json", false, 4), TreeEntry::Ignored);
        assert_eq!(d.resolve_entry("notes.txt", false, 4), TreeEntry::Unrecognized);
        assert_eq!(d.resolve_entry("ROOM.dmp", false, 4), TreeEntry::Unrecognized);
        match d.resolve_entry("SCRP_0012.dmp", false, 4) {
            TreeEntry::Block { name, block_type } => {
                assert_eq!(block_type, BlockType::Resource { lookup: "SCRP" });
                assert_eq!(name.index, Some(12));
            }
            other => panic!("unexpected {other:?}"),
        }
        match d.resolve_entry("DSCR.dmp", false, 4) {
            TreeEntry::Block { block_type, .. } => assert_eq!(block_type, BlockType::Leaf),
            other => panic!("unexpected {other:?}"),
        }
    }
}
