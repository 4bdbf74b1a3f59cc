//! Global index map and unknown-resource counter.
//!
//! The index file of a SCUMM game stores, for every numbered resource, the
//! room it lives in and its offset inside that room.  Decoding the index
//! file fills a [`GlobalIndexMap`] with `key -> stable index` entries; the
//! data files then look their blocks up by key.  Packing runs the other way:
//! every block registers its freshly written key, and the index tables are
//! rebuilt from [`GlobalIndexMap::items`] at the end.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{Error, Result};

/// Sub-map holding `(disk, room-file start) -> room number`.
pub const ROOM_FILE: &str = "LFLF";
/// Sub-map holding `room -> absolute offset of the room block`.
pub const ROOM_OFFSET: &str = "ROOM_OFFSET";
/// Sub-map holding `room -> disk number`.
pub const ROOM_DISK: &str = "ROOM_DISK";

/// Two-part key used by every sub-map.
///
/// `major` is a disk number, a room number, or the whole key (see the
/// constructors); `minor` is a byte offset where one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct IndexKey {
    pub major: u32,
    pub minor: i64,
}

impl IndexKey {
    /// Absolute offset inside numbered physical file `disk`.
    pub fn located(disk: u32, offset: u64) -> Self {
        Self { major: disk, minor: offset as i64 }
    }

    /// Offset relative to the start of room `room`.
    pub fn in_room(room: u32, offset: i64) -> Self {
        Self { major: room, minor: offset }
    }

    /// A bare room number.
    pub fn room(room: u32) -> Self {
        Self { major: room, minor: 0 }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.major, self.minor)
    }
}

/// `lookup name -> (key -> stable index)`.  Last write wins.
#[derive(Debug, Default, Clone, Serialize)]
pub struct GlobalIndexMap {
    maps: HashMap<&'static str, BTreeMap<IndexKey, u32>>,
}

impl GlobalIndexMap {
    /// Create a map with one empty sub-map per name.
    pub fn with_names<I: IntoIterator<Item = &'static str>>(names: I) -> Self {
        let mut map = Self::default();
        for name in names {
            map.declare(name);
        }
        map
    }

    pub fn declare(&mut self, name: &'static str) {
        self.maps.entry(name).or_default();
    }

    pub fn lookup(&self, name: &'static str, key: IndexKey) -> Result<u32> {
        self.maps
            .get(name)
            .and_then(|m| m.get(&key))
            .copied()
            .ok_or(Error::UnresolvedIndex { lookup: name, key })
    }

    /// Upsert; returns the index previously stored under `key`, if any.
    pub fn map(&mut self, name: &'static str, key: IndexKey, index: u32) -> Option<u32> {
        self.maps.entry(name).or_default().insert(key, index)
    }

    /// Snapshot of one sub-map in key order.
    pub fn items(&self, name: &str) -> Vec<(IndexKey, u32)> {
        self.maps
            .get(name)
            .map(|m| m.iter().map(|(k, v)| (*k, *v)).collect())
            .unwrap_or_default()
    }

    pub fn len(&self, name: &str) -> usize {
        self.maps.get(name).map_or(0, BTreeMap::len)
    }

    /// Declared names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.maps.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Synthetic numbering for blocks whose lookup failed.
#[derive(Debug, Default, Clone)]
pub struct UnknownCounter {
    counts: HashMap<&'static str, u32>,
}

impl UnknownCounter {
    /// Strictly increasing per name, starting at 1.
    pub fn next(&mut self, name: &'static str) -> u32 {
        let c = self.counts.entry(name).or_insert(0);
        *c += 1;
        *c
    }

    /// Make sure later synthetic numbers do not collide with `seen`.
    pub fn observe(&mut self, name: &'static str, seen: u32) {
        let c = self.counts.entry(name).or_insert(0);
        if *c < seen {
            *c = seen;
        }
    }

    pub fn issued(&self, name: &str) -> u32 {
        self.counts.get(name).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_of_missing_key_is_unresolved() {
        let map = GlobalIndexMap::with_names(["SCRP"]);
        match map.lookup("SCRP", IndexKey::in_room(1, 42)) {
            Err(Error::UnresolvedIndex { lookup, key }) => {
                assert_eq!(lookup, "SCRP");
                assert_eq!(key, IndexKey::in_room(1, 42));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn last_write_wins() {
        let mut map = GlobalIndexMap::default();
        assert_eq!(map.map("COST", IndexKey::in_room(3, 10), 5), None);
        assert_eq!(map.map("COST", IndexKey::in_room(3, 10), 6), Some(5));
        assert_eq!(map.lookup("COST", IndexKey::in_room(3, 10)).unwrap(), 6);
        assert_eq!(map.len("COST"), 1);
    }

    #[test]
    fn disk_number_keeps_identical_offsets_apart() {
        let mut map = GlobalIndexMap::with_names([ROOM_FILE]);
        map.map(ROOM_FILE, IndexKey::located(1, 1000), 10);
        map.map(ROOM_FILE, IndexKey::located(2, 1000), 20);
        assert_eq!(map.lookup(ROOM_FILE, IndexKey::located(1, 1000)).unwrap(), 10);
        assert_eq!(map.lookup(ROOM_FILE, IndexKey::located(2, 1000)).unwrap(), 20);
        assert!(map.lookup(ROOM_FILE, IndexKey::located(3, 1000)).is_err());
    }

    #[test]
    fn items_are_sorted_by_key() {
        let mut map = GlobalIndexMap::default();
        map.map("SOUN", IndexKey::in_room(2, 0), 1);
        map.map("SOUN", IndexKey::in_room(1, 50), 2);
        map.map("SOUN", IndexKey::in_room(1, 8), 3);
        let keys: Vec<_> = map.items("SOUN").into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![
            IndexKey::in_room(1, 8),
            IndexKey::in_room(1, 50),
            IndexKey::in_room(2, 0),
        ]);
        assert!(map.items("CHAR").is_empty());
    }

    #[test]
    fn unknown_counter_is_monotonic_per_name() {
        let mut unk = UnknownCounter::default();
        let scrp: Vec<u32> = (0..4).map(|_| unk.next("SCRP")).collect();
        assert_eq!(scrp, vec![1, 2, 3, 4]);
        assert_eq!(unk.next("SOUN"), 1);
        unk.observe("SOUN", 7);
        assert_eq!(unk.next("SOUN"), 8);
        unk.observe("SOUN", 2);
        assert_eq!(unk.next("SOUN"), 9);
    }
}
