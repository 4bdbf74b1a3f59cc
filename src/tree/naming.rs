//! Entry names of the decomposed tree.
//!
//! `TAG` for anonymous blocks, `TAG_0012` for numbered ones, `TAG_unk_003`
//! for blocks whose number had to be synthesised.  Leaves end in `.dmp`,
//! regenerated tables in `.json`, containers are directories.  A further
//! `_nnn` suffix separates siblings that would otherwise share a name.

use crate::block::Tag;

pub const ORDER_FILE:    &str = "order.json";
pub const MANIFEST_FILE: &str = "manifest.json";

pub const DUMP_EXT:  &str = "dmp";
pub const TABLE_EXT: &str = "json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ext {
    Dir,
    Dump,
    Table,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryName {
    pub tag:     Tag,
    /// First number after the tag: a stable index or a sibling sequence.
    pub index:   Option<u32>,
    pub unknown: bool,
    pub ext:     Ext,
}

pub fn parse(file_name: &str, is_dir: bool, tag_width: usize) -> Option<EntryName> {
    let (stem, ext) = if is_dir {
        (file_name, Ext::Dir)
    } else {
        let (stem, ext) = file_name.rsplit_once('.')?;
        let ext = match ext {
            DUMP_EXT  => Ext::Dump,
            TABLE_EXT => Ext::Table,
            _         => return None,
        };
        (stem, ext)
    };

    let mut parts = stem.split('_');
    let tag = Tag::from_file_stem(parts.next()?, tag_width)?;
    let mut unknown = false;
    let mut index = None;
    if let Some(part) = parts.next() {
        let digits = if part == "unk" {
            unknown = true;
            parts.next()?
        } else {
            part
        };
        index = Some(digits.parse::<u32>().ok()?);
    }
    for rest in parts {
        rest.parse::<u32>().ok()?;
    }
    Some(EntryName { tag, index, unknown, ext })
}

/// Stem for a block: `TAG`, `TAG_0012` or `TAG_unk_003`.
pub fn stem(tag: &Tag, index: Option<u32>, unknown: bool) -> String {
    let t = tag.file_stem();
    match (index, unknown) {
        (Some(i), true)  => format!("{t}_unk_{i:03}"),
        (Some(i), false) => format!("{t}_{i:04}"),
        (None, _)        => t,
    }
}

/// One `_` separated part of an entry stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NamePart<'a> {
    Number(u64),
    Text(&'a str),
}

/// Sort key comparing all-digit stem parts by value, so `ZP01_1000`
/// follows `ZP01_999`.  The extension only breaks ties.
pub fn sort_key(file_name: &str) -> (Vec<NamePart<'_>>, &str) {
    let (stem, ext) = file_name.rsplit_once('.').unwrap_or((file_name, ""));
    let parts = stem
        .split('_')
        .map(|part| match part.parse::<u64>() {
            Ok(n) if part.bytes().all(|b| b.is_ascii_digit()) => NamePart::Number(n),
            _ => NamePart::Text(part),
        })
        .collect();
    (parts, ext)
}

/// Append a sibling sequence number.
pub fn with_seq(stem: &str, seq: u32) -> String {
    format!("{stem}_{seq:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_form() {
        let n = parse("LFLF_0007", true, 4).unwrap();
        assert_eq!(n.tag.as_str(), "LFLF");
        assert_eq!((n.index, n.unknown, n.ext), (Some(7), false, Ext::Dir));

        let n = parse("SOUN_unk_002.dmp", false, 4).unwrap();
        assert_eq!((n.index, n.unknown, n.ext), (Some(2), true, Ext::Dump));

        let n = parse("LOFF.json", false, 4).unwrap();
        assert_eq!((n.index, n.ext), (None, Ext::Table));

        let n = parse("OBIM_0012_002", true, 4).unwrap();
        assert_eq!(n.index, Some(12));

        let n = parse("0R.json", false, 2).unwrap();
        assert_eq!(n.tag.as_str(), "0R");
    }

    #[test]
    fn rejects_foreign_names() {
        assert!(parse("README.md", false, 4).is_none());
        assert!(parse("SCRP_abc.dmp", false, 4).is_none());
        assert!(parse("SCRP.dmp", false, 2).is_none());
        assert!(parse(".DS_Store", false, 4).is_none());
    }

    #[test]
    fn sequence_numbers_sort_by_value() {
        let mut names = vec!["ZP01_1000.dmp", "ZP01_999.dmp", "ZP01.dmp", "ZP01_002.dmp"];
        names.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        assert_eq!(names, vec!["ZP01.dmp", "ZP01_002.dmp", "ZP01_999.dmp", "ZP01_1000.dmp"]);
    }

    #[test]
    fn stems_round_trip() {
        let tag: Tag = "SCRP".parse().unwrap();
        let s = stem(&tag, Some(12), false);
        assert_eq!(s, "SCRP_0012");
        let n = parse(&format!("{s}.dmp"), false, 4).unwrap();
        assert_eq!(n.index, Some(12));

        let s = with_seq(&stem(&tag, Some(3), true), 2);
        assert_eq!(s, "SCRP_unk_003_002");
        let n = parse(&s, true, 4).unwrap();
        assert_eq!((n.index, n.unknown), (Some(3), true));
    }
}
