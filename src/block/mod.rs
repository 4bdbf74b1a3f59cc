//! Block model: tags, headers and the polymorphic tree node.
//!
//! A [`Block`] is one tag+length record.  What it can do is decided by
//! composition rather than by type: its [`Body`] is a leaf payload, a
//! [`Container`] of children, or a table regenerated from the index map,
//! and an optional [`Indexed`] capability carries its stable number.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use crate::dispatch::BlockType;
use crate::grammar::HeaderLayout;
use crate::order::Container;

// ── Tag ──────────────────────────────────────────────────────────────────────

/// Fixed-width block identifier, 2 or 4 bytes depending on the grammar.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    bytes: [u8; 4],
    width: u8,
}

impl Tag {
    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        if b.is_empty() || b.len() > 4 {
            return None;
        }
        let mut bytes = [0u8; 4];
        bytes[..b.len()].copy_from_slice(b);
        Some(Self { bytes, width: b.len() as u8 })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.width as usize]
    }

    pub fn width(&self) -> usize {
        self.width as usize
    }

    /// Tags made of ASCII letters and digits are used verbatim in names.
    pub fn is_plain(&self) -> bool {
        self.as_bytes().iter().all(u8::is_ascii_alphanumeric)
    }

    /// The tag as text; anything but a plain tag is spelled `x<hex>`.
    pub fn as_str(&self) -> Cow<'_, str> {
        if self.is_plain() {
            // Plain tags are ASCII.
            Cow::Borrowed(std::str::from_utf8(self.as_bytes()).unwrap_or_default())
        } else {
            Cow::Owned(format!("x{}", hex::encode(self.as_bytes())))
        }
    }

    pub fn file_stem(&self) -> String {
        self.as_str().into_owned()
    }

    pub fn from_file_stem(s: &str, width: usize) -> Option<Self> {
        if s.len() == width && s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Tag::from_bytes(s.as_bytes());
        }
        let hex_part = s.strip_prefix('x')?;
        if hex_part.len() != width * 2 {
            return None;
        }
        Tag::from_bytes(&hex::decode(hex_part).ok()?)
    }
}

impl FromStr for Tag {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::from_bytes(s.as_bytes()).ok_or("tag must be 1 to 4 bytes")
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.as_str())
    }
}

impl PartialEq<&str> for Tag {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

// ── BlockHeader ──────────────────────────────────────────────────────────────

/// Tag plus declared size; the size counts the header itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub tag:  Tag,
    pub size: u32,
}

impl BlockHeader {
    pub fn read<R: Read>(mut reader: R, layout: HeaderLayout) -> io::Result<Self> {
        let mut tag = [0u8; 4];
        let width = layout.tag_width();
        let size = match layout {
            HeaderLayout::SizeThenTagLe => {
                let size = reader.read_u32::<LittleEndian>()?;
                reader.read_exact(&mut tag[..width])?;
                size
            }
            HeaderLayout::TagThenSizeBe => {
                reader.read_exact(&mut tag[..width])?;
                reader.read_u32::<BigEndian>()?
            }
        };
        let tag = Tag { bytes: tag, width: width as u8 };
        Ok(Self { tag, size })
    }

    pub fn write<W: Write>(&self, mut writer: W, layout: HeaderLayout) -> io::Result<()> {
        if self.tag.width() != layout.tag_width() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("tag {} does not fit a {}-byte header tag", self.tag, layout.tag_width()),
            ));
        }
        match layout {
            HeaderLayout::SizeThenTagLe => {
                writer.write_u32::<LittleEndian>(self.size)?;
                writer.write_all(self.tag.as_bytes())?;
            }
            HeaderLayout::TagThenSizeBe => {
                writer.write_all(self.tag.as_bytes())?;
                writer.write_u32::<BigEndian>(self.size)?;
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self, layout: HeaderLayout) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(layout.header_len() as usize);
        self.write(&mut out, layout)?;
        Ok(out)
    }
}

// ── Block ────────────────────────────────────────────────────────────────────

/// Stable-number capability of a globally indexed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Indexed {
    pub index:   Option<u32>,
    pub unknown: bool,
}

impl Indexed {
    pub fn known(index: u32) -> Self {
        Self { index: Some(index), unknown: false }
    }

    pub fn unknown(synthetic: u32) -> Self {
        Self { index: Some(synthetic), unknown: true }
    }
}

/// Persistent state of a regenerated table block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableInfo {
    /// Entry count seen on unpack; encode never writes fewer.
    #[serde(default)]
    pub min_entries: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Leaf(Vec<u8>),
    Container(Container),
    Table(TableInfo),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub tag:        Tag,
    pub block_type: BlockType,
    pub body:       Body,
    pub indexed:    Option<Indexed>,
}

impl Block {
    fn new(tag: Tag, block_type: BlockType, body: Body) -> Self {
        let indexed = block_type.is_indexed().then(Indexed::default);
        Self { tag, block_type, body, indexed }
    }

    pub fn leaf(tag: Tag, block_type: BlockType, payload: Vec<u8>) -> Self {
        Self::new(tag, block_type, Body::Leaf(payload))
    }

    pub fn container(tag: Tag, block_type: BlockType, container: Container) -> Self {
        Self::new(tag, block_type, Body::Container(container))
    }

    pub fn table(tag: Tag, block_type: BlockType, info: TableInfo) -> Self {
        Self::new(tag, block_type, Body::Table(info))
    }

    pub fn with_index(mut self, indexed: Indexed) -> Self {
        self.indexed = Some(indexed);
        self
    }

    /// Stable number, unless it was synthesised.
    pub fn stable_index(&self) -> Option<u32> {
        self.indexed.filter(|i| !i.unknown).and_then(|i| i.index)
    }

    pub fn is_unknown(&self) -> bool {
        self.indexed.is_some_and(|i| i.unknown)
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Leaf(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match &self.body {
            Body::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_container_mut(&mut self) -> Option<&mut Container> {
        match &mut self.body {
            Body::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Block] {
        self.as_container().map_or(&[], Container::children)
    }

    pub fn find_child(&self, tag: &str) -> Option<&Block> {
        self.children().iter().find(|c| c.tag == tag)
    }

    /// Number carried in the block's own bytes, for payload-numbered kinds.
    pub fn payload_index(&self) -> Option<u32> {
        match self.block_type {
            BlockType::Numbered { source, .. } => source.read(self.payload()?),
            BlockType::NumberedContainer { source, .. } => {
                let header = self.find_child(source.child?)?;
                source.read(header.payload()?)
            }
            _ => None,
        }
    }

    /// Short human-readable identity used in logs and errors.
    pub fn describe(&self) -> String {
        match self.indexed {
            Some(Indexed { index: Some(i), unknown: false }) => format!("{} {}", self.tag, i),
            Some(Indexed { index: Some(i), unknown: true })  => format!("{} unk_{:03}", self.tag, i),
            _ => self.tag.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{IndexSource, IndexWidth};
    use std::io::Cursor;

    #[test]
    fn header_layouts() {
        let h = BlockHeader { tag: "LFLF".parse().unwrap(), size: 0x0102_0304 };
        assert_eq!(h.to_bytes(HeaderLayout::TagThenSizeBe).unwrap(), b"LFLF\x01\x02\x03\x04");
        let back = BlockHeader::read(Cursor::new(b"LFLF\x01\x02\x03\x04"), HeaderLayout::TagThenSizeBe).unwrap();
        assert_eq!(back, h);

        let h = BlockHeader { tag: "LF".parse().unwrap(), size: 6 };
        assert_eq!(h.to_bytes(HeaderLayout::SizeThenTagLe).unwrap(), b"\x06\x00\x00\x00LF");
        let back = BlockHeader::read(Cursor::new(b"\x06\x00\x00\x00LF"), HeaderLayout::SizeThenTagLe).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn header_rejects_wrong_tag_width() {
        let h = BlockHeader { tag: "ROOM".parse().unwrap(), size: 8 };
        assert!(h.to_bytes(HeaderLayout::SizeThenTagLe).is_err());
    }

    #[test]
    fn odd_tags_get_hex_names() {
        let tag = Tag::from_bytes(&[0x00, b'A', 0xFF, b'_']).unwrap();
        assert_eq!(tag.file_stem(), "x0041ff5f");
        assert_eq!(Tag::from_file_stem("x0041ff5f", 4), Some(tag));
        assert_eq!(Tag::from_file_stem("0R", 2).unwrap().as_bytes(), b"0R");
    }

    #[test]
    fn payload_numbers() {
        let source = IndexSource { child: None, offset: 0, width: IndexWidth::U8 };
        let lscr = Block::leaf("LSCR".parse().unwrap(), BlockType::Numbered { lookup: "LSCR", source }, vec![201, 0]);
        assert_eq!(lscr.payload_index(), Some(201));
        assert_eq!(lscr.indexed, Some(Indexed::default()));
        assert_eq!(lscr.stable_index(), None);

        let lscr = lscr.with_index(Indexed::known(201));
        assert_eq!(lscr.stable_index(), Some(201));
        assert_eq!(lscr.describe(), "LSCR 201");

        let unk = Block::leaf("SCRP".parse().unwrap(), BlockType::Resource { lookup: "SCRP" }, vec![])
            .with_index(Indexed::unknown(3));
        assert!(unk.is_unknown());
        assert_eq!(unk.stable_index(), None);
        assert_eq!(unk.describe(), "SCRP unk_003");
    }
}
