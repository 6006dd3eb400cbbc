//! Readers for the GGPK archive format and the bundle/index scheme that
//! superseded it.
//!
//! A [`Ggpk`] walks the record graph of a `Content.ggpk` file. An [`Index`]
//! parses the `_.index.bin` manifest bundle and resolves file paths back to
//! the data bundles listed in it. [`bundled::open`] covers the compound
//! case of a GGPK file stored inside the bundle system.

pub mod bundle;
pub mod bundled;
mod error;
mod ext;
pub mod ggpk;
pub mod hash;
pub mod index;
pub mod oodle;
pub mod record;
pub mod tree;

pub use {
    bundle::{Bundle, BundleFactory, BundleHeader, DriveBundleFactory, DynBundle, ReadSeek},
    error::Error,
    ggpk::{Ggpk, Node, NodeId},
    index::{HashAlgorithm, Index},
    tree::{DirectoryTree, TreeNode},
};

/// Compression scheme applied to each bundle chunk.
///
/// Values not listed here are passed through to the decompressor untouched;
/// only `None` changes how the codec treats chunk payloads.
#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display, strum::FromRepr)]
pub enum Compressor {
    None = 3,
    Kraken = 8,
    Mermaid = 9,
    Selkie = 11,
    Hydra = 12,
    Leviathan = 13,
}
