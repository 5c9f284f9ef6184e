//! Scanned-entry shapes handed to the tree builder.

use std::path::PathBuf;

/// Stat-like attributes of a scanned entry, after preservation filters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScanAttrs {
    /// Permission bits (12 bits).
    pub mode: u16,
    /// Owner id.
    pub uid: u32,
    /// Group id.
    pub gid: u32,
    /// Modification time, seconds since the epoch (clamped to `u32`).
    pub mtime: u32,
}

/// Kind-specific payload of a scanned entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EntryKind {
    /// A directory.
    Directory,
    /// A regular file, openable at the scanner-provided source path.
    File {
        /// Size reported by the host, a packing hint only.
        size: u64,
    },
    /// A symlink and its target, stored verbatim.
    Symlink {
        /// Link target.
        target: String,
    },
    /// Character device.
    CharDevice {
        /// Major number.
        major: u32,
        /// Minor number.
        minor: u32,
    },
    /// Block device.
    BlockDevice {
        /// Major number.
        major: u32,
        /// Minor number.
        minor: u32,
    },
    /// Named pipe.
    Fifo,
    /// Unix socket.
    Socket,
}

/// One scanned filesystem object.
#[derive(Clone, Debug)]
pub struct ScanEntry {
    /// Path relative to the scan root, `/`-separated, no leading slash.
    pub path: String,
    /// Kind and payload.
    pub kind: EntryKind,
    /// Attributes after preservation filters.
    pub attrs: ScanAttrs,
    /// Absolute host path, used to open file bodies and read xattrs.
    pub source: PathBuf,
    /// Extended attributes as full `namespace.name` keys, when enabled.
    pub xattrs: Vec<(String, Vec<u8>)>,
}
