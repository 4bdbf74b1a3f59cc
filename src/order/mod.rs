//! Ordering engine.
//!
//! A container keeps its children in a single total order: first by the
//! grammar's rank table, then, inside a group of equal rank, by the order
//! recorded in the container's `order.json` sidecar.  Children without a
//! recorded position keep their load order after the recorded ones.  This
//! is what lets an edited tree pack back into the original byte layout.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

use crate::block::{Block, Tag};
use crate::error::{Error, FsContext, Result};

/// Collapse numbered sub-tags onto their family: `IM01` → `IM`,
/// `ZP02` → `ZP`.  Tags without a trailing number are returned unchanged.
pub fn normalize_tag(tag: &str) -> &str {
    let family = tag.trim_end_matches(|c: char| c.is_ascii_digit());
    if family.is_empty() { tag } else { family }
}

// ── Order sidecar ────────────────────────────────────────────────────────────

/// One recorded position: a stable index, or a synthetic one written as
/// `{"unk": n}` so the two numbering spaces never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderEntry {
    Index(u32),
    Unknown { unk: u32 },
}

impl OrderEntry {
    pub fn of(block: &Block) -> Option<Self> {
        let indexed = block.indexed?;
        let index = indexed.index?;
        Some(if indexed.unknown { OrderEntry::Unknown { unk: index } } else { OrderEntry::Index(index) })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderGroup {
    pub tag:   String,
    pub order: Vec<OrderEntry>,
}

/// Recorded positions of indexed children, per normalized tag class.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderOverrides {
    pub groups: Vec<OrderGroup>,
}

impl OrderOverrides {
    pub fn get(&self, class: &str) -> Option<&[OrderEntry]> {
        self.groups.iter().find(|g| g.tag == class).map(|g| g.order.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.order.is_empty())
    }

    /// Numbers of `children` in their current order, grouped by class.
    pub fn from_children(children: &[Block]) -> Self {
        let mut groups: Vec<OrderGroup> = Vec::new();
        for child in children {
            let Some(index) = OrderEntry::of(child) else { continue };
            let tag = child.tag.as_str();
            let class = normalize_tag(&tag);
            match groups.iter_mut().find(|g| g.tag == class) {
                Some(g) => g.order.push(index),
                None => groups.push(OrderGroup { tag: class.to_owned(), order: vec![index] }),
            }
        }
        Self { groups }
    }

    /// `Ok(None)` when the sidecar does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::MalformedOrderSidecar { path: path.to_owned(), reason: e.to_string() }),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| Error::MalformedOrderSidecar { path: path.to_owned(), reason: e.to_string() })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::Fs { path: path.to_owned(), source: io::Error::new(io::ErrorKind::Other, e) })?;
        fs::write(path, json).on(path)
    }
}

// ── Container ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Container {
    name:      String,
    rank:      &'static [&'static str],
    children:  Vec<Block>,
    overrides: OrderOverrides,
}

impl PartialEq for Container {
    /// Two containers are equal when their children are; rank tables and
    /// sidecar state are load-time context.
    fn eq(&self, other: &Self) -> bool {
        self.children == other.children
    }
}

impl Container {
    pub fn new(name: impl Into<String>, rank: &'static [&'static str]) -> Self {
        Self { name: name.into(), rank, children: Vec::new(), overrides: OrderOverrides::default() }
    }

    pub fn with_overrides(mut self, overrides: OrderOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn children(&self) -> &[Block] { &self.children }

    pub fn len(&self) -> usize { self.children.len() }

    pub fn is_empty(&self) -> bool { self.children.is_empty() }

    pub fn rank_of(&self, tag: &Tag) -> Result<usize> {
        let text = tag.as_str();
        let class = normalize_tag(&text);
        self.rank
            .iter()
            .position(|r| *r == class)
            .ok_or_else(|| Error::UnknownTagForContainer { container: self.name.clone(), tag: text.to_string() })
    }

    /// Insert `child` at the position the rank table and the recorded order
    /// give it.
    pub fn append(&mut self, child: Block) -> Result<()> {
        let new_rank = self.rank_of(&child.tag)?;
        let tag = child.tag.as_str();
        let order = self.overrides.get(normalize_tag(&tag));
        let new_pos = order.zip(OrderEntry::of(&child)).and_then(|(o, e)| o.iter().position(|x| *x == e));

        let mut insert_at = self.children.len();
        for (i, existing) in self.children.iter().enumerate() {
            let rank = self.rank_of(&existing.tag)?;
            if rank > new_rank {
                insert_at = i;
                break;
            }
            if rank < new_rank {
                continue;
            }
            let (Some(order), Some(new_pos)) = (order, new_pos) else { continue };
            match OrderEntry::of(existing).and_then(|e| order.iter().position(|x| *x == e)) {
                // An unordered sibling always yields to an ordered newcomer.
                None => {
                    insert_at = i;
                    break;
                }
                Some(pos) if pos > new_pos => {
                    insert_at = i;
                    break;
                }
                Some(_) => {}
            }
        }
        drop(tag);
        self.children.insert(insert_at, child);
        Ok(())
    }

    /// Append in stream order.  The tag must still be ranked; a child that
    /// breaks canonical order is kept where it is but reported, since
    /// repacking from a tree will move it.
    pub fn push_decoded(&mut self, child: Block) -> Result<()> {
        let rank = self.rank_of(&child.tag)?;
        if let Some(last) = self.children.last() {
            if self.rank_of(&last.tag)? > rank {
                warn!(
                    container = %self.name,
                    tag = %child.tag,
                    after = %last.tag,
                    "child out of canonical order; a repack will move it"
                );
            }
        }
        self.children.push(child);
        Ok(())
    }

    /// Sidecar describing the current order of indexed children.
    pub fn order_sidecar(&self) -> OrderOverrides {
        OrderOverrides::from_children(&self.children)
    }

    pub fn contains_class(&self, class: &str) -> bool {
        self.children.iter().any(|c| normalize_tag(&c.tag.as_str()) == class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Indexed;
    use crate::dispatch::BlockType;
    use proptest::prelude::*;

    const RANK: &[&str] = &["A", "B"];

    fn leaf(tag: &str) -> Block {
        Block::leaf(tag.parse().unwrap(), BlockType::Leaf, vec![])
    }

    fn indexed(tag: &str, index: u32) -> Block {
        Block::leaf(tag.parse().unwrap(), BlockType::Resource { lookup: "A" }, vec![])
            .with_index(Indexed::known(index))
    }

    fn unknown(tag: &str, synthetic: u32) -> Block {
        Block::leaf(tag.parse().unwrap(), BlockType::Resource { lookup: "A" }, vec![])
            .with_index(Indexed::unknown(synthetic))
    }

    fn group(tag: &str, order: &[u32]) -> OrderGroup {
        OrderGroup { tag: tag.into(), order: order.iter().map(|i| OrderEntry::Index(*i)).collect() }
    }

    fn summary(c: &Container) -> Vec<String> {
        c.children().iter().map(Block::describe).collect()
    }

    #[test]
    fn normalizes_numbered_tags() {
        assert_eq!(normalize_tag("IM01"), "IM");
        assert_eq!(normalize_tag("ZP02"), "ZP");
        assert_eq!(normalize_tag("IMHD"), "IMHD");
        assert_eq!(normalize_tag("0R"), "0R");
        assert_eq!(normalize_tag("0000"), "0000");
    }

    #[test]
    fn recorded_order_wins_within_a_rank() {
        let overrides = OrderOverrides { groups: vec![group("A", &[1, 2])] };
        let mut c = Container::new("T", RANK).with_overrides(overrides);
        c.append(indexed("A", 2)).unwrap();
        c.append(leaf("B")).unwrap();
        c.append(indexed("A", 1)).unwrap();
        assert_eq!(summary(&c), vec!["A 1", "A 2", "B"]);
    }

    #[test]
    fn rank_only_keeps_load_order_within_a_group() {
        let mut c = Container::new("T", &["X", "Y", "Z"]);
        c.append(indexed("X", 9)).unwrap();
        c.append(leaf("Z")).unwrap();
        c.append(leaf("Y")).unwrap();
        c.append(indexed("X", 4)).unwrap();
        assert_eq!(summary(&c), vec!["X 9", "X 4", "Y", "Z"]);
    }

    #[test]
    fn unordered_children_follow_ordered_ones() {
        let overrides = OrderOverrides { groups: vec![group("A", &[5, 3])] };
        let mut c = Container::new("T", RANK).with_overrides(overrides);
        c.append(indexed("A", 7)).unwrap();
        c.append(indexed("A", 3)).unwrap();
        c.append(indexed("A", 8)).unwrap();
        c.append(indexed("A", 5)).unwrap();
        assert_eq!(summary(&c), vec!["A 5", "A 3", "A 7", "A 8"]);
    }

    #[test]
    fn unranked_tag_is_fatal() {
        let mut c = Container::new("ROOM", RANK);
        match c.append(leaf("Q")) {
            Err(Error::UnknownTagForContainer { container, tag }) => {
                assert_eq!(container, "ROOM");
                assert_eq!(tag, "Q");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(c.push_decoded(leaf("Q")).is_err());
    }

    #[test]
    fn sidecar_keeps_synthetic_numbers_apart() {
        let children = vec![indexed("A", 4), leaf("B"), unknown("A", 4), indexed("A", 2)];
        let o = OrderOverrides::from_children(&children);
        let order = vec![OrderEntry::Index(4), OrderEntry::Unknown { unk: 4 }, OrderEntry::Index(2)];
        assert_eq!(o.groups, vec![OrderGroup { tag: "A".into(), order }]);
    }

    #[test]
    fn synthetic_numbers_keep_their_recorded_place() {
        let recorded = OrderOverrides::from_children(&[indexed("A", 12), unknown("A", 1), indexed("A", 3)]);
        let mut c = Container::new("T", RANK).with_overrides(recorded);
        c.append(unknown("A", 1)).unwrap();
        c.append(indexed("A", 3)).unwrap();
        c.append(indexed("A", 12)).unwrap();
        assert_eq!(summary(&c), vec!["A 12", "A unk_001", "A 3"]);
    }

    #[test]
    fn sidecar_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order.json");
        assert_eq!(OrderOverrides::load(&path).unwrap(), None);

        let mut o = OrderOverrides { groups: vec![group("OBIM", &[12, 3])] };
        o.groups[0].order.push(OrderEntry::Unknown { unk: 1 });
        o.save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"unk\": 1"), "{text}");
        assert_eq!(OrderOverrides::load(&path).unwrap(), Some(o));

        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(OrderOverrides::load(&path), Err(Error::MalformedOrderSidecar { .. })));
    }

    proptest! {
        #[test]
        fn any_insertion_order_reproduces_the_recorded_order(
            perm in Just((1u32..=8).collect::<Vec<_>>()).prop_shuffle(),
            recorded in Just((1u32..=8).collect::<Vec<_>>()).prop_shuffle(),
        ) {
            let overrides = OrderOverrides { groups: vec![group("A", &recorded)] };
            let mut c = Container::new("T", RANK).with_overrides(overrides);
            c.append(leaf("B")).unwrap();
            for i in &perm {
                c.append(indexed("A", *i)).unwrap();
            }
            let got: Vec<u32> = c.children().iter().filter_map(Block::stable_index).collect();
            prop_assert_eq!(got, recorded);
            prop_assert!(c.children().last().unwrap().tag == "B");
        }
    }
}
