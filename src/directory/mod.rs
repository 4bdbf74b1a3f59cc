//! Index tables.
//!
//! Two families of table blocks are never stored in the tree as bytes:
//!
//! * the per-disk room offset table (`LOFF`, v4 `FO`): `u8 count`, then
//!   `count × (u8 room, u32 LE offset)` where the offset is the absolute
//!   position of the room block inside its data file;
//! * the index-file directories (`DROO`, `DSCR`, ..., v4 `0R`, `0S`, ...):
//!   `u16 LE count`, then one `(u8, u32 LE)` row per number, stored either
//!   interleaved (v4) or as a `u8` column followed by a `u32` column.
//!
//! Decoding a table fills the [`GlobalIndexMap`](crate::index::GlobalIndexMap);
//! encoding rebuilds the rows from whatever the map holds at that point.
//! An all-zero row is an unused slot in both directions.

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::{debug, warn};

use crate::block::TableInfo;
use crate::context::Context;
use crate::dispatch::BlockType;
use crate::error::{Error, Result};
use crate::grammar::DirectoryLayout;
use crate::index::{IndexKey, ROOM_DISK, ROOM_FILE, ROOM_OFFSET};

/// One row: `(room or disk, offset)`.
pub type Row = (u8, u32);

const ROW_LEN: usize = 5;

// ── Parsing ──────────────────────────────────────────────────────────────────

/// Rows of a room offset table, or `None` unless the payload is exactly one
/// well-formed table.
pub fn parse_room_offsets(payload: &[u8]) -> Option<Vec<Row>> {
    let (&count, mut rest) = payload.split_first()?;
    if rest.len() != count as usize * ROW_LEN {
        return None;
    }
    (0..count)
        .map(|_| Some((rest.read_u8().ok()?, rest.read_u32::<LittleEndian>().ok()?)))
        .collect()
}

/// Rows of a directory table, or `None` unless the payload is exactly one
/// well-formed table.
pub fn parse_directory(payload: &[u8], layout: DirectoryLayout) -> Option<Vec<Row>> {
    let mut r = payload;
    let count = r.read_u16::<LittleEndian>().ok()? as usize;
    if r.len() != count * ROW_LEN {
        return None;
    }
    match layout {
        DirectoryLayout::Interleaved => (0..count)
            .map(|_| Some((r.read_u8().ok()?, r.read_u32::<LittleEndian>().ok()?)))
            .collect(),
        DirectoryLayout::Columns => {
            let (bytes, mut offsets) = r.split_at(count);
            bytes
                .iter()
                .map(|b| Some((*b, offsets.read_u32::<LittleEndian>().ok()?)))
                .collect()
        }
    }
}

fn is_unused(row: Row) -> bool {
    row == (0, 0)
}

// ── Decode ───────────────────────────────────────────────────────────────────

/// Register the contents of a table block.  Returns `None` when the payload
/// does not parse, in which case nothing is registered and the caller keeps
/// the bytes verbatim.
pub fn decode_table(ctx: &mut Context, block_type: BlockType, payload: &[u8]) -> Option<TableInfo> {
    match block_type {
        BlockType::RoomOffsets => {
            let rows = parse_room_offsets(payload)?;
            register_room_offsets(ctx, &rows);
            Some(TableInfo { min_entries: rows.len() as u32 })
        }
        BlockType::RoomDirectory => {
            let rows = parse_directory(payload, ctx.grammar.directory_layout)?;
            for (room, (disk, _)) in rows.iter().enumerate() {
                if *disk != 0 {
                    ctx.index.map(ROOM_DISK, IndexKey::room(room as u32), u32::from(*disk));
                }
            }
            Some(TableInfo { min_entries: rows.len() as u32 })
        }
        BlockType::ResourceDirectory { lookup } => {
            let rows = parse_directory(payload, ctx.grammar.directory_layout)?;
            register_resources(ctx, lookup, &rows);
            Some(TableInfo { min_entries: rows.len() as u32 })
        }
        _ => None,
    }
}

fn register_room_offsets(ctx: &mut Context, rows: &[Row]) {
    let skip = ctx.grammar.layout.header_len() + ctx.grammar.room_file_prefix as u64;
    for &(room, offset) in rows.iter().filter(|r| !is_unused(**r)) {
        let room = u32::from(room);
        ctx.index.map(ROOM_OFFSET, IndexKey::room(room), offset);
        match u64::from(offset).checked_sub(skip) {
            Some(start) => {
                let key = ctx.room_file_key(start);
                ctx.index.map(ROOM_FILE, key, room);
            }
            None => warn!(room, offset, "room offset points inside the file header; ignoring"),
        }
    }
}

fn register_resources(ctx: &mut Context, lookup: &'static str, rows: &[Row]) {
    for (index, &(room, offset)) in rows.iter().enumerate() {
        if is_unused((room, offset)) {
            continue;
        }
        let index = index as u32;
        let key = IndexKey::in_room(u32::from(room), i64::from(offset));
        let Some(previous) = ctx.index.map(lookup, key, index) else { continue };
        if previous == index {
            continue;
        }
        match ctx.grammar.known_duplicate(lookup, index) {
            Some(dup) if dup.same_as == previous => {
                ctx.index.map(lookup, key, previous);
                debug!(lookup, index, same_as = previous, "known directory alias");
            }
            _ => warn!(lookup, %key, previous, index, "duplicate directory key; the later entry wins"),
        }
    }
}

// ── Encode ───────────────────────────────────────────────────────────────────

fn too_large(offset: u64, what: &str) -> Error {
    Error::Malformed { offset, reason: format!("{what} does not fit the table format") }
}

/// Payload of a room offset table with `slots` entries for the current disk.
pub fn encode_room_offsets(ctx: &Context, slots: usize, at: u64) -> Result<Vec<u8>> {
    let disk = ctx.disk();
    let mut rows = Vec::with_capacity(slots);
    // Keys are (disk, start) so this is already in file order.
    for (key, room) in ctx.index.items(ROOM_FILE).into_iter().filter(|(k, _)| k.major == disk) {
        match ctx.index.lookup(ROOM_OFFSET, IndexKey::room(room)) {
            Ok(offset) => {
                let room = u8::try_from(room).map_err(|_| too_large(at, "room number"))?;
                rows.push((room, offset));
            }
            Err(e) => warn!(%key, room, "{e}; leaving the slot empty"),
        }
    }
    if rows.len() > slots {
        return Err(Error::Malformed {
            offset: at,
            reason: format!("{} rooms registered on disk {disk} but only {slots} slots reserved", rows.len()),
        });
    }
    rows.resize(slots, (0, 0));

    let count = u8::try_from(slots).map_err(|_| too_large(at, "room count"))?;
    let mut out = Vec::with_capacity(1 + slots * ROW_LEN);
    out.push(count);
    for (room, offset) in rows {
        out.push(room);
        out.extend_from_slice(&offset.to_le_bytes());
    }
    Ok(out)
}

/// Payload of an index-file directory rebuilt from the map.
pub fn encode_directory(ctx: &Context, block_type: BlockType, info: TableInfo, at: u64) -> Result<Vec<u8>> {
    // The count is a u16, so the last slot is u16::MAX - 1.
    fn put(rows: &mut Vec<Row>, slot: u32, row: Row, at: u64) -> Result<()> {
        if slot >= u32::from(u16::MAX) {
            return Err(too_large(at, &format!("entry number {slot}")));
        }
        let slot = slot as usize;
        if rows.len() <= slot {
            rows.resize(slot + 1, (0, 0));
        }
        rows[slot] = row;
        Ok(())
    }

    let mut rows: Vec<Row> = Vec::new();

    match block_type {
        BlockType::RoomDirectory => {
            for (key, disk) in ctx.index.items(ROOM_DISK) {
                let disk = u8::try_from(disk).map_err(|_| too_large(at, "disk number"))?;
                let offset = if ctx.grammar.room_dir_offsets {
                    ctx.index.lookup(ROOM_OFFSET, key).unwrap_or(0)
                } else {
                    0
                };
                put(&mut rows, key.major, (disk, offset), at)?;
            }
        }
        BlockType::ResourceDirectory { lookup } => {
            for (key, index) in ctx.index.items(lookup) {
                let room = u8::try_from(key.major).map_err(|_| too_large(at, "room number"))?;
                let offset = u32::try_from(key.minor).map_err(|_| too_large(at, "resource offset"))?;
                put(&mut rows, index, (room, offset), at)?;
            }
            for dup in ctx.grammar.known_duplicates.iter().filter(|d| d.lookup == lookup) {
                if let Some(row) = rows.get(dup.same_as as usize).copied().filter(|r| !is_unused(*r)) {
                    put(&mut rows, dup.index, row, at)?;
                }
            }
        }
        other => {
            return Err(Error::Malformed { offset: at, reason: format!("{other:?} is not a directory") });
        }
    }
    if rows.len() < info.min_entries as usize {
        rows.resize(info.min_entries as usize, (0, 0));
    }

    let count = u16::try_from(rows.len()).map_err(|_| too_large(at, "entry count"))?;
    let mut out = Vec::with_capacity(2 + rows.len() * ROW_LEN);
    out.extend_from_slice(&count.to_le_bytes());
    match ctx.grammar.directory_layout {
        DirectoryLayout::Interleaved => {
            for (b, offset) in &rows {
                out.push(*b);
                out.extend_from_slice(&offset.to_le_bytes());
            }
        }
        DirectoryLayout::Columns => {
            out.extend(rows.iter().map(|(b, _)| *b));
            for (_, offset) in &rows {
                out.extend_from_slice(&offset.to_le_bytes());
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Grammar, GrammarId, KnownDuplicate};

    fn columns(rows: &[Row]) -> Vec<u8> {
        let mut out = (rows.len() as u16).to_le_bytes().to_vec();
        out.extend(rows.iter().map(|r| r.0));
        for r in rows {
            out.extend_from_slice(&r.1.to_le_bytes());
        }
        out
    }

    #[test]
    fn parse_requires_an_exact_fit() {
        let payload = columns(&[(1, 10), (2, 20)]);
        assert_eq!(parse_directory(&payload, DirectoryLayout::Columns), Some(vec![(1, 10), (2, 20)]));
        let mut longer = payload.clone();
        longer.push(0);
        assert_eq!(parse_directory(&longer, DirectoryLayout::Columns), None);
        assert_eq!(parse_room_offsets(&[1, 3, 8, 0, 0]), None);
        assert_eq!(parse_room_offsets(&[1, 3, 8, 0, 0, 0]), Some(vec![(3, 8)]));
    }

    #[test]
    fn interleaved_and_column_layouts_differ() {
        let inter = [1u8, 0, 7, 1, 0, 0, 0];
        assert_eq!(parse_directory(&inter, DirectoryLayout::Interleaved), Some(vec![(7, 1)]));
        let cols = [1u8, 0, 7, 1, 0, 0, 0];
        assert_eq!(parse_directory(&cols, DirectoryLayout::Columns), Some(vec![(7, 1)]));
        let two = columns(&[(1, 2), (3, 4)]);
        assert_ne!(parse_directory(&two, DirectoryLayout::Interleaved), parse_directory(&two, DirectoryLayout::Columns));
    }

    #[test]
    fn room_offsets_register_both_sub_maps() {
        let mut ctx = Context::new(GrammarId::V5.grammar());
        ctx.set_disk(2);
        let info = decode_table(&mut ctx, BlockType::RoomOffsets, &[1, 5, 16, 0, 0, 0]).unwrap();
        assert_eq!(info.min_entries, 1);
        assert_eq!(ctx.index.lookup(ROOM_OFFSET, IndexKey::room(5)).unwrap(), 16);
        assert_eq!(ctx.index.lookup(ROOM_FILE, IndexKey::located(2, 8)).unwrap(), 5);
    }

    #[test]
    fn v4_room_file_start_skips_the_room_number() {
        let mut ctx = Context::new(GrammarId::V4.grammar());
        ctx.set_disk(1);
        decode_table(&mut ctx, BlockType::RoomOffsets, &[1, 1, 14, 0, 0, 0]).unwrap();
        assert_eq!(ctx.index.lookup(ROOM_FILE, IndexKey::located(1, 6)).unwrap(), 1);
    }

    #[test]
    fn directory_is_rebuilt_from_the_map_and_padded() {
        let mut ctx = Context::new(GrammarId::V5.grammar());
        let payload = columns(&[(0, 0), (1, 32), (0, 0), (2, 8)]);
        let info = decode_table(&mut ctx, BlockType::ResourceDirectory { lookup: "SCRP" }, &payload).unwrap();
        assert_eq!(ctx.index.len("SCRP"), 2);
        let out = encode_directory(&ctx, BlockType::ResourceDirectory { lookup: "SCRP" }, info, 0).unwrap();
        assert_eq!(out, payload);

        let wider = TableInfo { min_entries: 6 };
        let out = encode_directory(&ctx, BlockType::ResourceDirectory { lookup: "SCRP" }, wider, 0).unwrap();
        assert_eq!(parse_directory(&out, DirectoryLayout::Columns).unwrap().len(), 6);
    }

    #[test]
    fn entry_number_beyond_the_count_field_is_rejected() {
        let mut ctx = Context::new(GrammarId::V5.grammar());
        ctx.index.map("SCRP", IndexKey::in_room(1, 8), 4_000_000_000);
        match encode_directory(&ctx, BlockType::ResourceDirectory { lookup: "SCRP" }, TableInfo::default(), 40) {
            Err(Error::Malformed { offset, .. }) => assert_eq!(offset, 40),
            other => panic!("unexpected {other:?}"),
        }

        let mut ctx = Context::new(GrammarId::V5.grammar());
        ctx.index.map("SCRP", IndexKey::in_room(1, 8), u32::from(u16::MAX) - 1);
        let out = encode_directory(&ctx, BlockType::ResourceDirectory { lookup: "SCRP" }, TableInfo::default(), 0).unwrap();
        assert_eq!(&out[..2], &u16::MAX.to_le_bytes());
    }

    #[test]
    fn room_offsets_are_not_a_directory() {
        let ctx = Context::new(GrammarId::V5.grammar());
        assert!(encode_directory(&ctx, BlockType::RoomOffsets, TableInfo::default(), 0).is_err());
    }

    #[test]
    fn room_directory_round_trip() {
        let mut ctx = Context::new(GrammarId::V5.grammar());
        let payload = columns(&[(0, 0), (1, 0), (2, 0)]);
        let info = decode_table(&mut ctx, BlockType::RoomDirectory, &payload).unwrap();
        assert_eq!(ctx.index.lookup(ROOM_DISK, IndexKey::room(2)).unwrap(), 2);
        assert_eq!(encode_directory(&ctx, BlockType::RoomDirectory, info, 0).unwrap(), payload);
    }

    #[test]
    fn known_duplicate_is_re_emitted() {
        static DUPS: &[KnownDuplicate] = &[KnownDuplicate { lookup: "SOUN", index: 3, same_as: 1 }];
        let grammar = Grammar { known_duplicates: DUPS, ..GrammarId::V5.grammar().clone() };
        let mut ctx = Context::new(&grammar);
        let payload = columns(&[(0, 0), (4, 100), (0, 0), (4, 100)]);
        let info = decode_table(&mut ctx, BlockType::ResourceDirectory { lookup: "SOUN" }, &payload).unwrap();
        assert_eq!(ctx.index.lookup("SOUN", IndexKey::in_room(4, 100)).unwrap(), 1);
        let out = encode_directory(&ctx, BlockType::ResourceDirectory { lookup: "SOUN" }, info, 0).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn unexpected_duplicate_keeps_the_later_entry() {
        let mut ctx = Context::new(GrammarId::V5.grammar());
        let payload = columns(&[(0, 0), (4, 100), (4, 100)]);
        decode_table(&mut ctx, BlockType::ResourceDirectory { lookup: "SOUN" }, &payload).unwrap();
        assert_eq!(ctx.index.lookup("SOUN", IndexKey::in_room(4, 100)).unwrap(), 2);
    }

    #[test]
    fn room_offsets_fill_only_the_current_disk() {
        let mut ctx = Context::new(GrammarId::V5.grammar());
        ctx.index.map(ROOM_FILE, IndexKey::located(1, 17), 2);
        ctx.index.map(ROOM_FILE, IndexKey::located(2, 17), 9);
        ctx.index.map(ROOM_OFFSET, IndexKey::room(2), 25);
        ctx.index.map(ROOM_OFFSET, IndexKey::room(9), 25);
        ctx.set_disk(1);
        let out = encode_room_offsets(&ctx, 2, 8).unwrap();
        assert_eq!(out, vec![2, 2, 25, 0, 0, 0, 0, 0, 0, 0, 0]);
    }
}
