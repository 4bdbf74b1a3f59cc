use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::index::IndexKey;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A globally indexed block has no entry in the index map.  Recovered by
    /// the caller; never aborts a run on its own.
    #[error("No stable index for {lookup} at {key}")]
    UnresolvedIndex { lookup: &'static str, key: IndexKey },

    #[error("Container {container} has no rank for tag {tag}; the grammar table is incomplete")]
    UnknownTagForContainer { container: String, tag: String },

    #[error("Malformed order sidecar {path}: {reason}")]
    MalformedOrderSidecar { path: PathBuf, reason: String },

    #[error("{container} is missing required block {missing}")]
    StructuralMismatch { container: String, missing: String },

    #[error("Malformed archive at offset {offset}: {reason}")]
    Malformed { offset: u64, reason: String },

    #[error("Unknown grammar '{0}' (expected one of v4, v5, v6, v7)")]
    UnknownGrammar(String),

    #[error("I/O error at offset {offset}: {source}")]
    Io { offset: u64, #[source] source: io::Error },

    #[error("{path}: {source}")]
    Fs { path: PathBuf, #[source] source: io::Error },

    #[error("{path}: {source}")]
    File { path: PathBuf, #[source] source: Box<Error> },
}

impl Error {
    /// Fatal errors abort the whole run; everything else is reported and
    /// processing continues.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::UnresolvedIndex { .. } | Error::MalformedOrderSidecar { .. })
    }

    pub fn in_file(self, path: &Path) -> Error {
        match self {
            e @ Error::File { .. } => e,
            e => Error::File { path: path.to_owned(), source: Box::new(e) },
        }
    }
}

/// Attach a stream offset to raw I/O failures.
pub trait IoContext<T> {
    fn at(self, offset: u64) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, offset: u64) -> Result<T> {
        self.map_err(|source| Error::Io { offset, source })
    }
}

/// Attach a filesystem path to raw I/O failures.
pub trait FsContext<T> {
    fn on(self, path: &Path) -> Result<T>;
}

impl<T> FsContext<T> for io::Result<T> {
    fn on(self, path: &Path) -> Result<T> {
        self.map_err(|source| Error::Fs { path: path.to_owned(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_and_fatal_kinds() {
        let unresolved = Error::UnresolvedIndex { lookup: "SCRP", key: IndexKey::in_room(1, 8) };
        let sidecar = Error::MalformedOrderSidecar { path: "order.json".into(), reason: "eof".into() };
        assert!(!unresolved.is_fatal());
        assert!(!sidecar.is_fatal());

        let missing = Error::StructuralMismatch { container: "ROOM".into(), missing: "RMHD".into() };
        assert!(missing.is_fatal());
        let wrapped = missing.in_file(Path::new("TEST.001"));
        assert!(wrapped.is_fatal());
        assert!(matches!(wrapped.in_file(Path::new("other")), Error::File { path, .. } if path == Path::new("TEST.001")));
    }
}
