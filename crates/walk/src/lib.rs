#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `walk` enumerates a host directory tree for packing: each yielded entry
//! carries a relative path, stat-like attributes, and the kind-specific
//! payload the filesystem tree needs (symlink target, device numbers, or an
//! openable file path). Children are sorted byte-lexicographically per
//! directory, so two scans of the same tree always agree.
//!
//! # Design
//!
//! The scanner is an iterator over an explicit directory stack; symlinks are
//! never followed. Filters mirror the pseudo-file `glob` option set: a kind
//! whitelist, stay-within-filesystem, non-recursive, and fnmatch-style
//! patterns applied to the basename or the full relative path. Attribute
//! preservation is per-field — host mode/uid/gid/mtime are either kept or
//! replaced by caller-supplied values before the entry is yielded.
//!
//! # Errors
//!
//! Every failure carries the path it happened on; a scan stops at the first
//! error.

mod entry;
mod error;
mod pattern;
mod scan;

pub use entry::{EntryKind, ScanAttrs, ScanEntry};
pub use error::WalkError;
pub use pattern::Pattern;
pub use scan::{DirScanner, KindMask, ScanOptions};
