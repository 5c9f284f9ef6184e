#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `fstree` models the filesystem being packed into a SquashFS image: a
//! forest of inode-bearing nodes rooted at `/`, built up by the directory
//! scanner and the pseudo-file parser, then frozen by [`Tree::post_process`]
//! into the deterministic shape the image writer serializes.
//!
//! # Design
//!
//! Nodes live in an arena (`Vec<Node>`) and reference each other by 32-bit
//! [`NodeId`]; parent and child relations are indices, so growth never
//! invalidates a reference and a node handle stays `Copy`. Directory
//! children are sorted byte-lexicographically during post-processing, inode
//! numbers are assigned in a pre-order walk of the sorted tree, hard-link
//! aliases collapse onto their target's inode, and uid/gid values move into
//! a sorted, deduplicated id table.
//!
//! # Invariants
//!
//! - Names within a directory are unique; `.` and `..` never appear.
//! - Paths are canonical: no empty components, no trailing slash except the
//!   root itself.
//! - Inode numbers are contiguous from 1 in deterministic traversal order.
//! - A hard-link alias resolves to exactly one concrete node and inherits
//!   its inode number; the target's link count reflects every alias.
//!
//! # Errors
//!
//! All operations return [`TreeError`]; tree construction halts on the first
//! conflict, which the caller surfaces with the offending path.

mod error;
mod ids;
mod node;
mod sort;
mod tree;
mod xattr;

pub use error::TreeError;
pub use ids::IdTable;
pub use node::{FileData, Node, NodeAttrs, NodeId, NodeKind, NodePayload};
pub use sort::SortOrder;
pub use tree::{Tree, TreeTotals};
pub use xattr::{XattrBuilder, XattrNamespace, XattrPair, XattrSet, XattrTable};
