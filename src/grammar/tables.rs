//! Static format tables for the four supported SCUMM generations.

use super::{DirectoryLayout, FileNaming, Grammar, GrammarId, HeaderLayout};
use crate::crypto::SCUMM_XOR_KEY;
use crate::dispatch::{BlockType, DispatchTable, IndexSource, IndexWidth, TagPattern};

const fn resource(lookup: &'static str) -> BlockType {
    BlockType::Resource { lookup }
}

const fn directory(lookup: &'static str) -> BlockType {
    BlockType::ResourceDirectory { lookup }
}

const fn numbered(lookup: &'static str, width: IndexWidth) -> BlockType {
    BlockType::Numbered { lookup, source: IndexSource { child: None, offset: 0, width } }
}

const fn object(lookup: &'static str, header: &'static str) -> BlockType {
    BlockType::NumberedContainer {
        lookup,
        source: IndexSource { child: Some(header), offset: 0, width: IndexWidth::U16 },
    }
}

// ── v4 ───────────────────────────────────────────────────────────────────────

const V4_EXACT: &[(&str, BlockType)] = &[
    ("LE", BlockType::Container),
    ("FO", BlockType::RoomOffsets),
    ("LF", BlockType::RoomFile),
    ("RO", BlockType::Room),
    ("SC", resource("SC")),
    ("SO", resource("SO")),
    ("CO", resource("CO")),
    ("CH", resource("CH")),
    ("OI", numbered("OI", IndexWidth::U16)),
    ("OC", numbered("OC", IndexWidth::U16)),
    ("LS", numbered("LS", IndexWidth::U8)),
    ("0R", BlockType::RoomDirectory),
    ("0S", directory("SC")),
    ("0N", directory("SO")),
    ("0C", directory("CO")),
];

const V4_RANKS: &[(&str, &[&str])] = &[
    ("LE", &["FO", "LF"]),
    ("LF", &["RO", "SC", "SO", "CO", "CH"]),
    ("RO", &["HD", "CC", "SP", "BX", "PA", "SA", "BM", "OI", "NL", "SL", "OC", "EX", "EN", "LC", "LS"]),
];

const V4_REQUIRED: &[(&str, &[&str])] = &[
    ("LE", &["FO"]),
    ("LF", &["RO"]),
    ("RO", &["HD", "EX", "EN"]),
];

pub static V4: Grammar = Grammar {
    id:               GrammarId::V4,
    layout:           HeaderLayout::SizeThenTagLe,
    index_cipher:     None,
    data_cipher:      Some(SCUMM_XOR_KEY),
    naming:           FileNaming::Lfl,
    dispatch:         DispatchTable { exact: V4_EXACT, patterns: &[], default: BlockType::Leaf },
    ranks:            V4_RANKS,
    index_rank:       &["RN", "0R", "0S", "0N", "0C", "0O"],
    data_rank:        &["LE"],
    required:         V4_REQUIRED,
    directory_layout: DirectoryLayout::Interleaved,
    room_dir_offsets: true,
    room_file_prefix: 2,
    known_duplicates: &[],
};

// ── v5 ───────────────────────────────────────────────────────────────────────

const V5_EXACT: &[(&str, BlockType)] = &[
    ("LECF", BlockType::Container),
    ("LOFF", BlockType::RoomOffsets),
    ("LFLF", BlockType::RoomFile),
    ("ROOM", BlockType::Room),
    ("RMIM", BlockType::Container),
    ("OBIM", object("OBIM", "IMHD")),
    ("OBCD", object("OBCD", "CDHD")),
    ("LSCR", numbered("LSCR", IndexWidth::U8)),
    ("SCRP", resource("SCRP")),
    ("SOUN", resource("SOUN")),
    ("COST", resource("COST")),
    ("CHAR", resource("CHAR")),
    ("DROO", BlockType::RoomDirectory),
    ("DSCR", directory("SCRP")),
    ("DSOU", directory("SOUN")),
    ("DCOS", directory("COST")),
    ("DCHR", directory("CHAR")),
];

const IMAGE_PATTERNS: &[(TagPattern, BlockType)] = &[
    (TagPattern::Numbered("IM"), BlockType::Container),
];

const V5_RANKS: &[(&str, &[&str])] = &[
    ("LECF", &["LOFF", "LFLF"]),
    ("LFLF", &["ROOM", "SCRP", "SOUN", "COST", "CHAR"]),
    ("ROOM", &[
        "RMHD", "CYCL", "TRNS", "EPAL", "BOXD", "BOXM", "CLUT", "SCAL",
        "RMIM", "OBIM", "OBCD", "EXCD", "ENCD", "NLSC", "LSCR",
    ]),
    ("RMIM", &["RMIH", "IM"]),
    ("IM", &["SMAP", "BOMP", "ZP"]),
    ("OBIM", &["IMHD", "IM"]),
    ("OBCD", &["CDHD", "VERB", "OBNA"]),
];

const V5_REQUIRED: &[(&str, &[&str])] = &[
    ("LECF", &["LOFF"]),
    ("LFLF", &["ROOM"]),
    ("ROOM", &["RMHD", "EXCD", "ENCD"]),
    ("OBIM", &["IMHD"]),
    ("OBCD", &["CDHD"]),
];

pub static V5: Grammar = Grammar {
    id:               GrammarId::V5,
    layout:           HeaderLayout::TagThenSizeBe,
    index_cipher:     Some(SCUMM_XOR_KEY),
    data_cipher:      Some(SCUMM_XOR_KEY),
    naming:           FileNaming::Numbered,
    dispatch:         DispatchTable { exact: V5_EXACT, patterns: IMAGE_PATTERNS, default: BlockType::Leaf },
    ranks:            V5_RANKS,
    index_rank:       &["RNAM", "MAXS", "DROO", "DSCR", "DSOU", "DCOS", "DCHR", "DOBJ"],
    data_rank:        &["LECF"],
    required:         V5_REQUIRED,
    directory_layout: DirectoryLayout::Columns,
    room_dir_offsets: false,
    room_file_prefix: 0,
    known_duplicates: &[],
};

// ── v6 ───────────────────────────────────────────────────────────────────────

const V6_EXACT: &[(&str, BlockType)] = &[
    ("LECF", BlockType::Container),
    ("LOFF", BlockType::RoomOffsets),
    ("LFLF", BlockType::RoomFile),
    ("ROOM", BlockType::Room),
    ("RMIM", BlockType::Container),
    ("PALS", BlockType::Container),
    ("WRAP", BlockType::Container),
    ("OBIM", object("OBIM", "IMHD")),
    ("OBCD", object("OBCD", "CDHD")),
    ("LSCR", numbered("LSCR", IndexWidth::U16)),
    ("SCRP", resource("SCRP")),
    ("SOUN", resource("SOUN")),
    ("COST", resource("COST")),
    ("CHAR", resource("CHAR")),
    ("DROO", BlockType::RoomDirectory),
    ("DSCR", directory("SCRP")),
    ("DSOU", directory("SOUN")),
    ("DCOS", directory("COST")),
    ("DCHR", directory("CHAR")),
];

const V6_ROOM: &[&str] = &[
    "RMHD", "CYCL", "TRNS", "PALS", "RMIM", "OBIM", "OBCD",
    "EXCD", "ENCD", "NLSC", "LSCR", "BOXD", "BOXM", "SCAL",
];

const V6_RANKS: &[(&str, &[&str])] = &[
    ("LECF", &["LOFF", "LFLF"]),
    ("LFLF", &["ROOM", "SCRP", "SOUN", "COST", "CHAR"]),
    ("ROOM", V6_ROOM),
    ("PALS", &["WRAP"]),
    ("WRAP", &["OFFS", "APAL"]),
    ("RMIM", &["RMIH", "IM"]),
    ("IM", &["SMAP", "BOMP", "ZP"]),
    ("OBIM", &["IMHD", "IM"]),
    ("OBCD", &["CDHD", "VERB", "OBNA"]),
];

pub static V6: Grammar = Grammar {
    id:               GrammarId::V6,
    layout:           HeaderLayout::TagThenSizeBe,
    index_cipher:     Some(SCUMM_XOR_KEY),
    data_cipher:      Some(SCUMM_XOR_KEY),
    naming:           FileNaming::Numbered,
    dispatch:         DispatchTable { exact: V6_EXACT, patterns: IMAGE_PATTERNS, default: BlockType::Leaf },
    ranks:            V6_RANKS,
    index_rank:       &["RNAM", "MAXS", "DROO", "DSCR", "DSOU", "DCOS", "DCHR", "DOBJ", "AARY"],
    data_rank:        &["LECF"],
    required:         V5_REQUIRED,
    directory_layout: DirectoryLayout::Columns,
    room_dir_offsets: false,
    room_file_prefix: 0,
    known_duplicates: &[],
};

// ── v7 ───────────────────────────────────────────────────────────────────────

const V7_EXACT: &[(&str, BlockType)] = &[
    ("LECF", BlockType::Container),
    ("LOFF", BlockType::RoomOffsets),
    ("LFLF", BlockType::RoomFile),
    ("ROOM", BlockType::Room),
    ("RMIM", BlockType::Container),
    ("PALS", BlockType::Container),
    ("WRAP", BlockType::Container),
    ("OBIM", object("OBIM", "IMHD")),
    ("OBCD", object("OBCD", "CDHD")),
    ("LSCR", numbered("LSCR", IndexWidth::U16)),
    ("SCRP", resource("SCRP")),
    ("SOUN", resource("SOUN")),
    ("AKOS", resource("COST")),
    ("COST", resource("COST")),
    ("CHAR", resource("CHAR")),
    ("DROO", BlockType::RoomDirectory),
    ("DSCR", directory("SCRP")),
    ("DSOU", directory("SOUN")),
    ("DCOS", directory("COST")),
    ("DCHR", directory("CHAR")),
];

const V7_RANKS: &[(&str, &[&str])] = &[
    ("LECF", &["LOFF", "LFLF"]),
    ("LFLF", &["ROOM", "SCRP", "SOUN", "AKOS", "COST", "CHAR"]),
    ("ROOM", V6_ROOM),
    ("PALS", &["WRAP"]),
    ("WRAP", &["OFFS", "APAL"]),
    ("RMIM", &["RMIH", "IM"]),
    ("IM", &["SMAP", "BOMP", "ZP"]),
    ("OBIM", &["IMHD", "IM"]),
    ("OBCD", &["CDHD", "VERB", "OBNA"]),
];

pub static V7: Grammar = Grammar {
    id:               GrammarId::V7,
    layout:           HeaderLayout::TagThenSizeBe,
    index_cipher:     None,
    data_cipher:      None,
    naming:           FileNaming::La,
    dispatch:         DispatchTable { exact: V7_EXACT, patterns: IMAGE_PATTERNS, default: BlockType::Leaf },
    ranks:            V7_RANKS,
    index_rank:       &["RNAM", "MAXS", "DROO", "DSCR", "DSOU", "DCOS", "DCHR", "DOBJ", "AARY", "ANAM"],
    data_rank:        &["LECF"],
    required:         V5_REQUIRED,
    directory_layout: DirectoryLayout::Columns,
    room_dir_offsets: false,
    room_file_prefix: 0,
    known_duplicates: &[],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::normalize_tag;

    fn all() -> [&'static Grammar; 4] {
        [&V4, &V5, &V6, &V7]
    }

    #[test]
    fn every_rank_table_lists_each_class_once() {
        for g in all() {
            for (container, rank) in g.ranks {
                for (i, tag) in rank.iter().enumerate() {
                    assert!(!rank[i + 1..].contains(tag), "{}: {container} repeats {tag}", g.name());
                    assert_eq!(normalize_tag(tag), *tag, "{}: {container} lists un-normalized {tag}", g.name());
                }
            }
        }
    }

    #[test]
    fn every_container_kind_has_a_rank_table() {
        for g in all() {
            for (tag, t) in g.dispatch.exact {
                if t.shape() == crate::dispatch::Shape::Container {
                    assert!(g.rank_table(tag).is_some(), "{}: no rank table for {tag}", g.name());
                }
            }
        }
    }

    #[test]
    fn required_children_are_ranked() {
        for g in all() {
            for (container, req) in g.required {
                let rank = g.rank_table(container).expect("required rule for unranked container");
                for tag in *req {
                    assert!(rank.contains(tag), "{}: {container} requires unranked {tag}", g.name());
                }
            }
        }
    }
}
