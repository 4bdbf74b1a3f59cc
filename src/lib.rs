//! Lossless converter between SCUMM resource archives and editable trees.

pub mod archive;
pub mod block;
pub mod context;
pub mod crypto;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod grammar;
pub mod index;
pub mod io_stream;
pub mod order;
pub mod tree;

pub use archive::{pack, unpack, Archive, Manifest, PackOptions};
pub use block::{Block, BlockHeader, Body, Tag};
pub use context::Context;
pub use error::{Error, Result};
pub use grammar::{Grammar, GrammarId};
pub use index::{GlobalIndexMap, IndexKey, UnknownCounter};
pub use order::Container;
