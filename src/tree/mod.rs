//! Decomposed directory tree: save and load.
//!
//! Every container becomes a directory, every leaf a `.dmp` file holding
//! its raw payload, and every regenerated table a small `.json` file.
//! Containers with indexed children carry an `order.json` sidecar so that
//! loading reproduces the original sibling order.
//!
//! Loading never trusts directory listing order: entries are sorted by
//! name and then placed with [`Container::append`].

pub mod naming;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

use crate::block::{Block, Body, Indexed, TableInfo};
use crate::context::Context;
use crate::dispatch::{BlockType, TreeEntry};
use crate::error::{Error, FsContext, Result};
use crate::order::{Container, OrderOverrides};
use naming::{EntryName, Ext};

// ── Save ─────────────────────────────────────────────────────────────────────

/// Write the children of `root` into `dir`, which is created if needed.
pub fn save_tree(dir: &Path, root: &Container) -> Result<()> {
    fs::create_dir_all(dir).on(dir)?;
    save_children(dir, root)
}

fn save_children(dir: &Path, container: &Container) -> Result<()> {
    let mut seen: HashMap<String, u32> = HashMap::new();
    for child in container.children() {
        let stem = child_stem(child);
        let seq = seen.entry(stem.clone()).or_insert(0);
        *seq += 1;
        let name = if *seq == 1 { stem } else { naming::with_seq(&stem, *seq) };

        match &child.body {
            Body::Leaf(payload) => {
                let path = dir.join(format!("{name}.{}", naming::DUMP_EXT));
                fs::write(&path, payload).on(&path)?;
            }
            Body::Table(info) => {
                let path = dir.join(format!("{name}.{}", naming::TABLE_EXT));
                write_json(&path, info)?;
            }
            Body::Container(c) => {
                let sub = dir.join(&name);
                fs::create_dir(&sub).on(&sub)?;
                save_children(&sub, c)?;
            }
        }
    }

    let sidecar = container.order_sidecar();
    if !sidecar.is_empty() {
        sidecar.save(&dir.join(naming::ORDER_FILE))?;
    }
    Ok(())
}

fn child_stem(block: &Block) -> String {
    match block.indexed {
        Some(Indexed { index: Some(i), unknown }) => naming::stem(&block.tag, Some(i), unknown),
        _ => naming::stem(&block.tag, None, false),
    }
}

pub(crate) fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::Fs { path: path.to_owned(), source: io::Error::new(io::ErrorKind::InvalidData, e) })?;
    fs::write(path, json).on(path)
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read(path).on(path)?;
    serde_json::from_slice(&text)
        .map_err(|e| Error::Fs { path: path.to_owned(), source: io::Error::new(io::ErrorKind::InvalidData, e) })
}

// ── Load ─────────────────────────────────────────────────────────────────────

/// Rebuild a root container from `dir`.
pub fn load_tree(ctx: &mut Context, dir: &Path, name: &str, rank: &'static [&'static str]) -> Result<Container> {
    load_container(ctx, dir, name, rank)
}

fn load_container(
    ctx:  &mut Context,
    dir:  &Path,
    name: &str,
    rank: &'static [&'static str],
) -> Result<Container> {
    let sidecar = dir.join(naming::ORDER_FILE);
    let overrides = match OrderOverrides::load(&sidecar) {
        Ok(o) => o.unwrap_or_default(),
        Err(e) if !e.is_fatal() => {
            warn!("{e}; using canonical order only");
            OrderOverrides::default()
        }
        Err(e) => return Err(e),
    };
    let mut container = Container::new(name, rank).with_overrides(overrides);

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).on(dir)? {
        let entry = entry.on(dir)?;
        let is_dir = entry.file_type().on(&entry.path())?.is_dir();
        match entry.file_name().into_string() {
            Ok(file_name) => entries.push((file_name, is_dir)),
            Err(raw) => warn!(entry = ?raw, "skipping tree entry with a non UTF-8 name"),
        }
    }
    entries.sort_by(|a, b| naming::sort_key(&a.0).cmp(&naming::sort_key(&b.0)).then_with(|| a.cmp(b)));

    let tag_width = ctx.grammar.layout.tag_width();
    for (file_name, is_dir) in entries {
        let TreeEntry::Block { name, block_type } = ctx.grammar.dispatch.resolve_entry(&file_name, is_dir, tag_width)
        else {
            continue;
        };
        let path = dir.join(&file_name);
        let block = load_block(ctx, &path, &name, block_type)?;
        debug!(block = %block.describe(), path = %path.display(), "loaded");
        container.append(block)?;
    }
    Ok(container)
}

fn load_block(ctx: &mut Context, path: &Path, name: &EntryName, block_type: BlockType) -> Result<Block> {
    let tag = name.tag;
    let block = match name.ext {
        Ext::Dump => Block::leaf(tag, block_type, fs::read(path).on(path)?),
        Ext::Table => Block::table(tag, block_type, read_json::<TableInfo>(path)?),
        Ext::Dir => {
            let rank = ctx.grammar.rank_table(&tag.as_str()).unwrap_or(&[]);
            let child = load_container(ctx, path, &tag.file_stem(), rank)?;
            Block::container(tag, block_type, child)
        }
    };
    let Some(lookup) = block_type.lookup_name() else { return Ok(block) };

    let indexed = match (name.index, name.unknown) {
        (Some(i), true) => {
            ctx.unknowns.observe(lookup, i);
            Indexed::unknown(i)
        }
        _ if block_type.is_map_indexed() => match name.index {
            Some(i) => Indexed::known(i),
            None => {
                let cause = Error::Malformed { offset: 0, reason: format!("{} carries no number", path.display()) };
                ctx.unresolved(lookup, &block.describe(), &cause)
            }
        },
        _ => match block.payload_index() {
            Some(i) => Indexed::known(i),
            None => {
                let cause = Error::Malformed { offset: 0, reason: format!("{} carries no readable number", path.display()) };
                ctx.unresolved(lookup, &block.describe(), &cause)
            }
        },
    };
    Ok(block.with_index(indexed))
}
