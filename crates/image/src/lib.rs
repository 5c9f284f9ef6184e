#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `image` turns a frozen filesystem tree and the block pipeline's output
//! into a complete SquashFS 4.0 image: compressed metadata streams for the
//! inode and directory tables, chunk-indexed lookup tables for fragments,
//! ids, the optional NFS export table and xattrs, and the 96-byte superblock
//! stamped last.
//!
//! # Design
//!
//! [`Builder`] is the top-level entry point: it ingests host directory scans
//! and pseudo-file operations into one tree, streams every regular file
//! through [`blocks::Processor`], then serializes the tables in a fixed
//! order — data, inodes, directories, fragments, ids, export, xattrs — and
//! rewrites the superblock in place. The output file lives behind a guard
//! that deletes the partial image on every failure path.
//!
//! # Invariants
//!
//! - Metadata streams are chunked at exactly 8 KiB of uncompressed payload;
//!   each chunk carries a 16-bit header whose top bit marks raw storage.
//!   References into a stream are `(chunk_start << 16) | intra_offset`.
//!   Metadata writes happen strictly after all data writes.
//! - Directory runs never exceed 256 entries and restart whenever the
//!   referenced inode chunk changes or the inode delta leaves `i16` range.
//! - The image is a pure function of the tree, the file bodies, and the
//!   configuration; worker count never changes a byte.

mod builder;
mod dirtable;
mod error;
mod inode;
mod layout;
mod metadata;
mod output;
mod superblock;
mod tables;
mod writer;

pub use builder::{BuildConfig, BuildSummary, Builder};
pub use error::ImageError;
pub use metadata::{MetaRef, METADATA_CHUNK};
pub use superblock::{flags, Superblock, SUPERBLOCK_SIZE};
