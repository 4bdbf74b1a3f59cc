//! Block stream engine: reader and writer for one physical file.
//!
//! # Reader
//! [`ScummReader`] walks a file front to back.  Every header is resolved
//! through the grammar's dispatch table; containers recurse, leaves keep
//! their payload, and table blocks are parsed into the
//! [`GlobalIndexMap`](crate::index::GlobalIndexMap).  Globally indexed
//! blocks look their stable number up by key as they are met, so the index
//! file must be read before any data file.
//!
//! # Writer
//! [`ScummWriter`] serialises a tree with backpatching: each container
//! reserves its header, writes its children, then overwrites the header
//! with the measured size.  While writing it registers every room file,
//! room and resource it places, which is what the index tables are rebuilt
//! from.  Room offset tables are reserved in place and filled once their
//! siblings are written.
//!
//! # Cipher
//! Both sides sit on a [`CipherStream`]; nothing here ever sees enciphered
//! bytes.

pub mod patch;

pub use patch::{PatchWrite, Reservation};

use byteorder::{ByteOrder, LittleEndian};
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::{debug, warn};

use crate::block::{Block, BlockHeader, Body, Indexed, Tag};
use crate::context::Context;
use crate::crypto::CipherStream;
use crate::directory;
use crate::dispatch::{BlockType, Shape};
use crate::error::{Error, IoContext, Result};
use crate::grammar::{FileKind, Grammar, HeaderLayout};
use crate::index::{IndexKey, ROOM_DISK, ROOM_FILE, ROOM_OFFSET};
use crate::order::Container;

/// Row width of a room offset table.
const ROOM_OFFSET_ROW: usize = 5;

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct ScummReader<R: Read + Seek> {
    stream: CipherStream<R>,
    layout: HeaderLayout,
}

impl<R: Read + Seek> ScummReader<R> {
    pub fn new(inner: R, grammar: &Grammar, kind: FileKind) -> Self {
        Self { stream: CipherStream::new(inner, grammar.cipher(kind)), layout: grammar.layout }
    }

    /// Decode the whole file into a root container named `name`.
    pub fn read_root(&mut self, ctx: &mut Context, kind: FileKind, name: &str) -> Result<Container> {
        let end = self.stream.seek(SeekFrom::End(0)).at(0)?;
        self.stream.seek(SeekFrom::Start(0)).at(0)?;
        let mut root = Container::new(name, ctx.grammar.root_rank(kind));
        self.read_children(ctx, &mut root, end)?;
        Ok(root)
    }

    fn read_children(&mut self, ctx: &mut Context, container: &mut Container, end: u64) -> Result<()> {
        let header_len = self.layout.header_len();
        loop {
            let start = self.stream.position();
            if start >= end {
                return Ok(());
            }
            if end - start < header_len {
                return Err(Error::Malformed {
                    offset: start,
                    reason: format!("{} stray bytes at the end of {}", end - start, container.name()),
                });
            }
            let header = BlockHeader::read(&mut self.stream, self.layout).at(start)?;
            let size = u64::from(header.size);
            if size < header_len || size > end - start {
                return Err(Error::Malformed {
                    offset: start,
                    reason: format!(
                        "block {} declares {size} bytes but {} remain in {}",
                        header.tag,
                        end - start,
                        container.name()
                    ),
                });
            }
            let block = self.read_block(ctx, header, start)?;
            debug!(block = %block.describe(), offset = start, size, "decoded");
            container.push_decoded(block)?;
        }
    }

    fn read_bytes(&mut self, at: u64, len: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.stream.read_exact(&mut buf).at(at)?;
        Ok(buf)
    }

    fn read_block(&mut self, ctx: &mut Context, header: BlockHeader, start: u64) -> Result<Block> {
        let tag = header.tag;
        let block_type = ctx.grammar.dispatch.resolve(&tag);
        let body = start + self.layout.header_len();
        let end = start + u64::from(header.size);

        match block_type.shape() {
            Shape::Leaf => {
                let payload = self.read_bytes(body, end - body)?;
                Ok(number_leaf(ctx, Block::leaf(tag, block_type, payload), start))
            }
            Shape::Table => {
                let payload = self.read_bytes(body, end - body)?;
                match directory::decode_table(ctx, block_type, &payload) {
                    Some(info) => Ok(Block::table(tag, block_type, info)),
                    None => {
                        warn!(%tag, offset = start, "table does not parse; keeping its bytes verbatim");
                        Ok(Block::leaf(tag, BlockType::Leaf, payload))
                    }
                }
            }
            Shape::Container => self.read_container(ctx, tag, block_type, start, end),
        }
    }

    fn read_container(
        &mut self,
        ctx:        &mut Context,
        tag:        Tag,
        block_type: BlockType,
        start:      u64,
        end:        u64,
    ) -> Result<Block> {
        let rank = ctx.grammar.rank_table(&tag.as_str()).unwrap_or(&[]);
        let mut container = Container::new(tag.file_stem(), rank);
        let mut indexed = None;
        let mut scope = None;

        if block_type == BlockType::RoomFile {
            let at = self.stream.position();
            let prefix_len = ctx.grammar.room_file_prefix as u64;
            if end - at < prefix_len {
                return Err(Error::Malformed { offset: start, reason: format!("{tag} is too short for its header") });
            }
            let prefix = self.read_bytes(at, prefix_len)?;
            let key = ctx.room_file_key(start);
            let room = ctx.resolve(ROOM_FILE, Ok(key), &tag.as_str());
            if prefix.len() >= 2 {
                let stored = u32::from(LittleEndian::read_u16(&prefix));
                if room.unknown || room.index != Some(stored) {
                    warn!(%tag, offset = start, stored, "room number in the header disagrees with the room offset table");
                }
            }
            indexed = Some(room);
            scope = Some(ctx.enter_room(start));
        }

        let result = self.read_children(ctx, &mut container, end);
        if let Some(previous) = scope {
            ctx.leave_room(previous);
        }
        result?;

        let mut block = Block::container(tag, block_type, container);
        if let BlockType::NumberedContainer { lookup, source } = block_type {
            indexed = Some(match block.payload_index() {
                Some(index) => Indexed::known(index),
                None => {
                    let cause = Error::StructuralMismatch {
                        container: block.describe(),
                        missing:   source.child.unwrap_or("number").to_owned(),
                    };
                    ctx.unresolved(lookup, &block.describe(), &cause)
                }
            });
        }
        if let Some(i) = indexed {
            block = block.with_index(i);
        }
        Ok(block)
    }
}

/// Assign the stable number of a freshly decoded leaf.
fn number_leaf(ctx: &mut Context, block: Block, start: u64) -> Block {
    match block.block_type {
        BlockType::Resource { lookup } => {
            let key = ctx.room_key(start);
            let indexed = ctx.resolve(lookup, key, &block.describe());
            block.with_index(indexed)
        }
        BlockType::Numbered { lookup, .. } => {
            let indexed = match block.payload_index() {
                Some(index) => Indexed::known(index),
                None => {
                    let cause = Error::Malformed { offset: start, reason: "payload too short for its number".into() };
                    ctx.unresolved(lookup, &block.describe(), &cause)
                }
            };
            block.with_index(indexed)
        }
        _ => block,
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ScummWriter<W: Write + Seek> {
    stream: CipherStream<W>,
    layout: HeaderLayout,
}

impl<W: Write + Seek> ScummWriter<W> {
    pub fn new(inner: W, grammar: &Grammar, kind: FileKind) -> Self {
        Self { stream: CipherStream::new(inner, grammar.cipher(kind)), layout: grammar.layout }
    }

    pub fn position(&self) -> u64 {
        self.stream.position()
    }

    /// Encode every child of `root` and flush.
    pub fn write_root(&mut self, ctx: &mut Context, root: &Container) -> Result<()> {
        self.write_children(ctx, root)?;
        let at = self.stream.position();
        self.stream.flush().at(at)
    }

    pub fn into_inner(self) -> W {
        self.stream.into_inner()
    }

    /// Header plus payload, ready to write.
    fn framed(&self, tag: Tag, payload: &[u8], at: u64) -> Result<Vec<u8>> {
        let size = self.layout.header_len() + payload.len() as u64;
        let size = u32::try_from(size)
            .map_err(|_| Error::Malformed { offset: at, reason: format!("{tag} is larger than 4 GiB") })?;
        let mut bytes = BlockHeader { tag, size }.to_bytes(self.layout).at(at)?;
        bytes.extend_from_slice(payload);
        Ok(bytes)
    }

    fn write_children(&mut self, ctx: &mut Context, container: &Container) -> Result<()> {
        let room_files = container
            .children()
            .iter()
            .filter(|c| c.block_type == BlockType::RoomFile)
            .count();
        let mut deferred: Vec<(Reservation, Tag, usize)> = Vec::new();

        for child in container.children() {
            match (&child.body, child.block_type) {
                (Body::Table(info), BlockType::RoomOffsets) => {
                    let slots = room_files.max(info.min_entries as usize);
                    let len = self.layout.header_len() as usize + 1 + slots * ROOM_OFFSET_ROW;
                    let at = self.stream.position();
                    let r = self.stream.reserve(len).at(at)?;
                    deferred.push((r, child.tag, slots));
                }
                _ => self.write_block(ctx, child)?,
            }
        }

        for (r, tag, slots) in deferred {
            let payload = directory::encode_room_offsets(ctx, slots, r.at)?;
            let bytes = self.framed(tag, &payload, r.at)?;
            self.stream.fill(r, &bytes).at(r.at)?;
            debug!(%tag, offset = r.at, slots, "filled room offset table");
        }
        Ok(())
    }

    fn write_block(&mut self, ctx: &mut Context, block: &Block) -> Result<()> {
        let start = self.stream.position();
        match &block.body {
            Body::Leaf(payload) => {
                let bytes = self.framed(block.tag, payload, start)?;
                self.stream.write_all(&bytes).at(start)?;
                register_leaf(ctx, block, start);
            }
            Body::Table(info) => {
                // Room offset tables never get here; `write_children` defers them.
                let payload = directory::encode_directory(ctx, block.block_type, *info, start)?;
                let bytes = self.framed(block.tag, &payload, start)?;
                self.stream.write_all(&bytes).at(start)?;
            }
            Body::Container(c) => self.write_container(ctx, block, c, start)?,
        }
        debug!(block = %block.describe(), offset = start, size = self.stream.position() - start, "encoded");
        Ok(())
    }

    fn write_container(&mut self, ctx: &mut Context, block: &Block, c: &Container, start: u64) -> Result<()> {
        for required in ctx.grammar.required_children(&block.tag.as_str()) {
            if !c.contains_class(required) {
                return Err(Error::StructuralMismatch {
                    container: ctx.describe_scope(&block.describe()),
                    missing:   (*required).to_owned(),
                });
            }
        }

        let header = self.stream.reserve(self.layout.header_len() as usize).at(start)?;
        let mut scope = None;
        match block.block_type {
            BlockType::RoomFile => {
                let prefix_len = ctx.grammar.room_file_prefix;
                if prefix_len > 0 {
                    let number = block.indexed.and_then(|i| i.index).unwrap_or(0);
                    let number = u16::try_from(number).map_err(|_| Error::Malformed {
                        offset: start,
                        reason: format!("room number {number} does not fit the {} header", block.tag),
                    })?;
                    let mut prefix = vec![0u8; prefix_len];
                    let n = prefix_len.min(2);
                    prefix[..n].copy_from_slice(&number.to_le_bytes()[..n]);
                    self.stream.write_all(&prefix).at(start)?;
                }
                match block.stable_index() {
                    Some(room) => {
                        let key = ctx.room_file_key(start);
                        let disk = ctx.disk();
                        ctx.index.map(ROOM_FILE, key, room);
                        ctx.index.map(ROOM_DISK, IndexKey::room(room), disk);
                    }
                    None => {
                        ctx.unresolved += 1;
                        warn!(block = %block.describe(), "room file has no room number; its resources stay out of the index");
                    }
                }
                scope = Some(ctx.enter_room(start));
            }
            BlockType::Room => match ctx.current_room() {
                Ok(room) => {
                    let offset = u32::try_from(start)
                        .map_err(|_| Error::Malformed { offset: start, reason: "room beyond 4 GiB".into() })?;
                    ctx.index.map(ROOM_OFFSET, IndexKey::room(room), offset);
                }
                Err(e) => warn!(offset = start, "{e}; room offset not recorded"),
            },
            _ => {}
        }

        let result = self.write_children(ctx, c);
        if let Some(previous) = scope {
            ctx.leave_room(previous);
        }
        result?;

        let end = self.stream.position();
        let size = u32::try_from(end - start)
            .map_err(|_| Error::Malformed { offset: start, reason: format!("{} is larger than 4 GiB", block.tag) })?;
        let bytes = BlockHeader { tag: block.tag, size }.to_bytes(self.layout).at(start)?;
        self.stream.fill(header, &bytes).at(start)
    }
}

/// Record where a resource leaf was written.  Blocks with a synthesised
/// number never enter the map.
fn register_leaf(ctx: &mut Context, block: &Block, start: u64) {
    let BlockType::Resource { lookup } = block.block_type else { return };
    let Some(index) = block.stable_index() else {
        debug!(block = %block.describe(), "unknown resource left out of the index");
        return;
    };
    match ctx.room_key(start) {
        Ok(key) => {
            if let Some(previous) = ctx.index.map(lookup, key, index).filter(|p| *p != index) {
                warn!(lookup, %key, previous, index, "two resources written at one key; the later one wins");
            }
        }
        Err(e) => {
            ctx.unresolved += 1;
            warn!(block = %block.describe(), "{e}; resource left out of the index");
        }
    }
}
