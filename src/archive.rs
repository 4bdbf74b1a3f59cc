//! High-level [`Archive`] API: a whole game, index file plus data files.
//!
//! ```no_run
//! use scummpack::archive::{pack, unpack, PackOptions};
//! use scummpack::grammar::GrammarId;
//! use std::path::Path;
//!
//! unpack(GrammarId::V5, Path::new("MONKEY2.000"), Path::new("monkey2"))?;
//! // ... edit files under monkey2/ ...
//! pack(Path::new("monkey2"), Path::new("build"), &PackOptions::default())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Decoding reads the index file first, then the data files in ascending
//! order; encoding writes the data files first and the index file last, so
//! the index tables are rebuilt from what was actually written.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::context::Context;
use crate::error::{Error, FsContext, Result};
use crate::grammar::{FileKind, FileNaming, Grammar, GrammarId};
use crate::index::GlobalIndexMap;
use crate::io_stream::{ScummReader, ScummWriter};
use crate::order::Container;
use crate::tree::{self, naming::MANIFEST_FILE};

/// Tree directory holding the index-file root.
pub const INDEX_DIR: &str = "index";

/// Tree directory holding the root of data file `disk` (1-based).
pub fn disk_dir(disk: u32) -> String {
    format!("disk_{disk:02}")
}

// ── Manifest ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name:  String,
    pub size:  u64,
    /// CRC-32, big-endian hex.
    pub crc32: String,
}

/// `manifest.json` at the top of an unpacked tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub grammar:     String,
    pub base_name:   String,
    pub disks:       u32,
    pub unpacked_at: String,
    #[serde(default)]
    pub files:       Vec<SourceFile>,
}

impl Manifest {
    pub fn load(tree: &Path) -> Result<Option<Self>> {
        let path = tree.join(MANIFEST_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        tree::read_json(&path).map(Some)
    }

    pub fn source(&self, name: &str) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.name == name)
    }
}

fn checksum(path: &Path) -> Result<SourceFile> {
    let mut reader = BufReader::new(File::open(path).on(path)?);
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = reader.read(&mut buf).on(path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok(SourceFile {
        name:  file_name(path)?.to_owned(),
        size,
        crc32: hex::encode(hasher.finalize().to_be_bytes()),
    })
}

fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| invalid(path, "not a file name"))
}

fn invalid(path: &Path, reason: &str) -> Error {
    Error::Fs { path: path.to_owned(), source: io::Error::new(io::ErrorKind::InvalidInput, reason.to_owned()) }
}

// ── Archive ───────────────────────────────────────────────────────────────────

/// A decoded game: the index-file root and one root per data file.
#[derive(Debug, Clone, PartialEq)]
pub struct Archive {
    pub grammar: GrammarId,
    pub index:   Container,
    pub disks:   Vec<Container>,
}

impl Archive {
    /// Decode an index file and its data files, in that order.
    pub fn decode<R: Read + Seek>(ctx: &mut Context, index: R, disks: Vec<R>) -> Result<Self> {
        let index = Self::decode_index(ctx, index)?;
        let disks = disks
            .into_iter()
            .zip(1u32..)
            .map(|(r, disk)| Self::decode_disk(ctx, disk, r))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { grammar: ctx.grammar.id, index, disks })
    }

    pub fn decode_index<R: Read + Seek>(ctx: &mut Context, index: R) -> Result<Container> {
        ctx.set_disk(0);
        ScummReader::new(index, ctx.grammar, FileKind::Index).read_root(ctx, FileKind::Index, INDEX_DIR)
    }

    pub fn decode_disk<R: Read + Seek>(ctx: &mut Context, disk: u32, data: R) -> Result<Container> {
        ctx.set_disk(disk);
        ScummReader::new(data, ctx.grammar, FileKind::Data).read_root(ctx, FileKind::Data, &disk_dir(disk))
    }

    /// Encode data files in ascending order, then the index file.
    pub fn encode<W: Write + Seek>(&self, ctx: &mut Context, index: W, disks: Vec<W>) -> Result<(W, Vec<W>)> {
        if disks.len() != self.disks.len() {
            return Err(Error::Malformed {
                offset: 0,
                reason: format!("{} data files to write but {} outputs given", self.disks.len(), disks.len()),
            });
        }
        let disks = disks
            .into_iter()
            .zip(1u32..)
            .map(|(w, disk)| self.encode_disk(ctx, disk, w))
            .collect::<Result<Vec<_>>>()?;
        let index = self.encode_index(ctx, index)?;
        Ok((index, disks))
    }

    pub fn encode_disk<W: Write + Seek>(&self, ctx: &mut Context, disk: u32, out: W) -> Result<W> {
        let root = disk.checked_sub(1).and_then(|i| self.disks.get(i as usize)).ok_or_else(|| Error::Malformed {
            offset: 0,
            reason: format!("archive has no data file {disk}"),
        })?;
        ctx.set_disk(disk);
        let mut w = ScummWriter::new(out, ctx.grammar, FileKind::Data);
        w.write_root(ctx, root)?;
        Ok(w.into_inner())
    }

    pub fn encode_index<W: Write + Seek>(&self, ctx: &mut Context, out: W) -> Result<W> {
        ctx.set_disk(0);
        let mut w = ScummWriter::new(out, ctx.grammar, FileKind::Index);
        w.write_root(ctx, &self.index)?;
        Ok(w.into_inner())
    }

    pub fn save_tree(&self, dir: &Path) -> Result<()> {
        tree::save_tree(&dir.join(INDEX_DIR), &self.index)?;
        for (root, disk) in self.disks.iter().zip(1u32..) {
            tree::save_tree(&dir.join(disk_dir(disk)), root)?;
        }
        Ok(())
    }

    /// Load `index/` and every consecutive `disk_NN/` under `dir`.
    pub fn load_tree(ctx: &mut Context, dir: &Path) -> Result<Self> {
        let grammar = ctx.grammar;
        let index_dir = dir.join(INDEX_DIR);
        if !index_dir.is_dir() {
            return Err(invalid(&index_dir, "tree has no index directory"));
        }
        let index = tree::load_tree(ctx, &index_dir, INDEX_DIR, grammar.index_rank)?;
        let mut disks = Vec::new();
        for disk in 1u32.. {
            let path = dir.join(disk_dir(disk));
            if !path.is_dir() {
                break;
            }
            disks.push(tree::load_tree(ctx, &path, &disk_dir(disk), grammar.data_rank)?);
        }
        Ok(Self { grammar: grammar.id, index, disks })
    }
}

// ── File-level operations ─────────────────────────────────────────────────────

/// Data files sitting next to `index_path`, in disk order.
pub fn discover_disks(grammar: &Grammar, index_path: &Path) -> Result<(String, Vec<PathBuf>)> {
    let name = file_name(index_path)?;
    let base = grammar
        .naming
        .base_name(name)
        .ok_or_else(|| invalid(index_path, &format!("not a {} index file name", grammar.name())))?;
    let dir = index_path.parent().unwrap_or(Path::new(""));
    let disks = (1u32..)
        .map(|disk| dir.join(grammar.naming.data_file(&base, disk)))
        .take_while(|p| p.is_file())
        .collect();
    Ok((base, disks))
}

#[derive(Debug, Clone)]
pub struct UnpackReport {
    pub output:     PathBuf,
    pub disks:      u32,
    pub unresolved: usize,
}

/// Decode a game into a fresh tree at `out`.
///
/// The tree is built in a temporary directory next to `out` and moved into
/// place only when everything succeeded.  `out` must not exist or be empty.
pub fn unpack(grammar: GrammarId, index_path: &Path, out: &Path) -> Result<UnpackReport> {
    let g = grammar.grammar();
    let (base_name, disk_paths) = discover_disks(g, index_path)?;
    if disk_paths.is_empty() {
        warn!(index = %index_path.display(), "no data files found next to the index file");
    }
    if out.exists() && fs::read_dir(out).on(out)?.next().is_some() {
        return Err(Error::Fs { path: out.to_owned(), source: io::Error::from(io::ErrorKind::AlreadyExists) });
    }

    let mut ctx = Context::new(g);
    info!(file = %index_path.display(), grammar = %grammar, "decoding index");
    let index = Archive::decode_index(&mut ctx, open(index_path)?).map_err(|e| e.in_file(index_path))?;
    let mut disks = Vec::with_capacity(disk_paths.len());
    for (path, disk) in disk_paths.iter().zip(1u32..) {
        info!(file = %path.display(), disk, "decoding data file");
        disks.push(Archive::decode_disk(&mut ctx, disk, open(path)?).map_err(|e| e.in_file(path))?);
    }
    let archive = Archive { grammar, index, disks };

    let mut files = vec![checksum(index_path)?];
    for path in &disk_paths {
        files.push(checksum(path)?);
    }
    let manifest = Manifest {
        grammar: grammar.name().to_owned(),
        base_name,
        disks: disk_paths.len() as u32,
        unpacked_at: Utc::now().to_rfc3339(),
        files,
    };

    let parent = out.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let staging = tempfile::Builder::new().prefix(".scummpack-").tempdir_in(parent).on(parent)?;
    archive.save_tree(staging.path())?;
    tree::write_json(&staging.path().join(MANIFEST_FILE), &manifest)?;
    if out.exists() {
        fs::remove_dir(out).on(out)?;
    }
    let staged = staging.into_path();
    fs::rename(&staged, out).on(out)?;

    if ctx.unresolved > 0 {
        warn!(count = ctx.unresolved, "blocks kept under synthetic numbers; a repack may not be byte-identical");
    }
    info!(out = %out.display(), disks = manifest.disks, "unpacked");
    Ok(UnpackReport { output: out.to_owned(), disks: manifest.disks, unresolved: ctx.unresolved })
}

fn open(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path).on(path)?))
}

/// Overrides for [`pack`]; anything unset comes from the tree's manifest.
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    pub grammar:   Option<GrammarId>,
    pub base_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PackReport {
    pub files:      Vec<PathBuf>,
    pub unresolved: usize,
    /// `Some(true)` when every written file matches the checksum recorded at
    /// unpack time; `None` without a manifest to compare against.
    pub identical:  Option<bool>,
}

/// Encode the tree at `tree_dir` into game files inside `out_dir`.
///
/// Every file goes to a temporary name first; nothing is renamed into
/// place unless all of them were written.
pub fn pack(tree_dir: &Path, out_dir: &Path, opts: &PackOptions) -> Result<PackReport> {
    let manifest = Manifest::load(tree_dir)?;
    let recorded = match &manifest {
        Some(m) => Some(m.grammar.parse::<GrammarId>()?),
        None => None,
    };
    let grammar = match (opts.grammar, recorded) {
        (Some(asked), Some(found)) if asked != found => {
            warn!(%asked, %found, "grammar differs from the one recorded at unpack time");
            asked
        }
        (Some(g), _) | (None, Some(g)) => g,
        (None, None) => return Err(invalid(tree_dir, "no manifest; a grammar must be given")),
    };
    let g = grammar.grammar();
    let base_name = opts
        .base_name
        .clone()
        .or_else(|| manifest.as_ref().map(|m| m.base_name.clone()))
        .unwrap_or_default();
    if base_name.is_empty() && g.naming != FileNaming::Lfl {
        return Err(invalid(tree_dir, "no base name recorded; pass one explicitly"));
    }

    let mut ctx = Context::new(g);
    let archive = Archive::load_tree(&mut ctx, tree_dir)?;
    if let Some(m) = &manifest {
        if m.disks as usize != archive.disks.len() {
            warn!(recorded = m.disks, found = archive.disks.len(), "number of data directories changed");
        }
    }
    fs::create_dir_all(out_dir).on(out_dir)?;

    let mut staged: Vec<(NamedTempFile, PathBuf)> = Vec::new();
    for disk in 1..=archive.disks.len() as u32 {
        let target = out_dir.join(g.naming.data_file(&base_name, disk));
        info!(file = %target.display(), disk, "encoding data file");
        let mut tmp = NamedTempFile::new_in(out_dir).on(out_dir)?;
        archive
            .encode_disk(&mut ctx, disk, BufWriter::new(tmp.as_file_mut()))
            .map_err(|e| e.in_file(&target))?;
        staged.push((tmp, target));
    }
    let target = out_dir.join(g.naming.index_file(&base_name));
    info!(file = %target.display(), "encoding index");
    let mut tmp = NamedTempFile::new_in(out_dir).on(out_dir)?;
    archive
        .encode_index(&mut ctx, BufWriter::new(tmp.as_file_mut()))
        .map_err(|e| e.in_file(&target))?;
    staged.push((tmp, target));

    let mut files = Vec::with_capacity(staged.len());
    for (tmp, target) in staged {
        tmp.persist(&target).map_err(|e| Error::Fs { path: target.clone(), source: e.error })?;
        files.push(target);
    }

    let identical = match &manifest {
        Some(m) => Some(compare_with_manifest(m, &files)?),
        None => None,
    };
    if ctx.unresolved > 0 {
        warn!(count = ctx.unresolved, "blocks could not be indexed while packing");
    }
    info!(files = files.len(), identical = ?identical, "packed");
    Ok(PackReport { files, unresolved: ctx.unresolved, identical })
}

fn compare_with_manifest(manifest: &Manifest, files: &[PathBuf]) -> Result<bool> {
    let mut identical = files.len() == manifest.files.len();
    for path in files {
        let written = checksum(path)?;
        match manifest.source(&written.name) {
            Some(src) if *src == written => {}
            Some(src) => {
                identical = false;
                warn!(file = %written.name, recorded = %src.crc32, written = %written.crc32, "output differs from the source file");
            }
            None => identical = false,
        }
    }
    Ok(identical)
}

/// Decode only the index file of a game and return what it registers.
pub fn read_index(grammar: GrammarId, index_path: &Path) -> Result<(Container, GlobalIndexMap)> {
    let mut ctx = Context::new(grammar.grammar());
    let root = Archive::decode_index(&mut ctx, open(index_path)?).map_err(|e| e.in_file(index_path))?;
    Ok((root, ctx.index))
}
