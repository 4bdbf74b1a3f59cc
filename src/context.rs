//! Per-run state threaded through every decode and encode call.
//!
//! One [`Context`] is created per unpack or pack run and owns the index
//! map, the unknown counter and the disk-spanning number.  Nothing here is
//! shared or global; a run that needs the state takes `&mut Context`.

use tracing::warn;

use crate::block::Indexed;
use crate::error::{Error, Result};
use crate::grammar::Grammar;
use crate::index::{GlobalIndexMap, IndexKey, UnknownCounter, ROOM_FILE, ROOM_OFFSET};

pub struct Context<'g> {
    pub grammar:  &'g Grammar,
    pub index:    GlobalIndexMap,
    pub unknowns: UnknownCounter,
    /// 1-based number of the physical file being processed; 0 for the
    /// index file.
    disk:         u32,
    /// Start offset of the innermost room-file container, if any.
    room_start:   Option<u64>,
    /// Count of blocks that fell back to a synthetic number.
    pub unresolved: usize,
}

impl<'g> Context<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        Self {
            grammar,
            index:      GlobalIndexMap::with_names(grammar.lookup_names()),
            unknowns:   UnknownCounter::default(),
            disk:       0,
            room_start: None,
            unresolved: 0,
        }
    }

    pub fn disk(&self) -> u32 { self.disk }

    /// Switch to physical file `disk` (1-based).
    pub fn set_disk(&mut self, disk: u32) {
        self.disk = disk;
        self.room_start = None;
    }

    /// Enter a room-file container starting at `start`; returns the scope to
    /// restore on exit.
    pub fn enter_room(&mut self, start: u64) -> Option<u64> {
        self.room_start.replace(start)
    }

    pub fn leave_room(&mut self, previous: Option<u64>) {
        self.room_start = previous;
    }

    /// Key of the enclosing room file in the room-file sub-map.
    pub fn room_file_key(&self, start: u64) -> IndexKey {
        IndexKey::located(self.disk, start)
    }

    /// Number of the room enclosing the current position.
    pub fn current_room(&self) -> Result<u32> {
        let start = self.room_start.ok_or(Error::UnresolvedIndex {
            lookup: ROOM_FILE,
            key:    IndexKey::located(self.disk, 0),
        })?;
        self.index.lookup(ROOM_FILE, self.room_file_key(start))
    }

    /// Room-relative key of a block at `location`:
    /// `room = room_file[(disk, room_start)]`,
    /// `key = (room, location - room_offset[room])`.
    pub fn room_key(&self, location: u64) -> Result<IndexKey> {
        let room = self.current_room()?;
        let room_offset = self.index.lookup(ROOM_OFFSET, IndexKey::room(room))?;
        Ok(IndexKey::in_room(room, location as i64 - i64::from(room_offset)))
    }

    /// Resolve `key` in `lookup`, falling back to a synthetic number.
    pub fn resolve(&mut self, lookup: &'static str, key: Result<IndexKey>, what: &str) -> Indexed {
        match key.and_then(|k| self.index.lookup(lookup, k)) {
            Ok(index) => Indexed::known(index),
            Err(e) => self.unresolved(lookup, what, &e),
        }
    }

    /// Record a failed lookup and hand out the next synthetic number.
    pub fn unresolved(&mut self, lookup: &'static str, what: &str, cause: &Error) -> Indexed {
        let synthetic = self.unknowns.next(lookup);
        self.unresolved += 1;
        warn!(block = what, synthetic, "{cause}; keeping bytes under a synthetic number");
        Indexed::unknown(synthetic)
    }

    /// Human-readable position, for structural errors.
    pub fn describe_scope(&self, what: &str) -> String {
        match self.current_room() {
            Ok(room) => format!("{what} in room {room} (disk {})", self.disk),
            Err(_)   => format!("{what} (disk {})", self.disk),
        }
    }
}
