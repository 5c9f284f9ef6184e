//! The deterministic directory scanner.

use std::fs;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

use crate::entry::{EntryKind, ScanAttrs, ScanEntry};
use crate::pattern::Pattern;
use crate::WalkError;

/// Whitelist of entry kinds, in `find -type` letters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KindMask(u8);

impl KindMask {
    const BLOCK: u8 = 1 << 0;
    const CHAR: u8 = 1 << 1;
    const DIR: u8 = 1 << 2;
    const FIFO: u8 = 1 << 3;
    const FILE: u8 = 1 << 4;
    const SYMLINK: u8 = 1 << 5;
    const SOCKET: u8 = 1 << 6;

    /// Every kind enabled (the default).
    #[must_use]
    pub const fn all() -> Self {
        Self(0x7f)
    }

    /// No kind enabled.
    #[must_use]
    pub const fn none() -> Self {
        Self(0)
    }

    /// Enables the kind named by a `find -type` letter.
    ///
    /// Returns `None` for letters outside `b c d p f l s`.
    #[must_use]
    pub fn with_letter(self, letter: char) -> Option<Self> {
        let bit = match letter {
            'b' => Self::BLOCK,
            'c' => Self::CHAR,
            'd' => Self::DIR,
            'p' => Self::FIFO,
            'f' => Self::FILE,
            'l' => Self::SYMLINK,
            's' => Self::SOCKET,
            _ => return None,
        };
        Some(Self(self.0 | bit))
    }

    fn admits(self, kind: &EntryKind) -> bool {
        let bit = match kind {
            EntryKind::BlockDevice { .. } => Self::BLOCK,
            EntryKind::CharDevice { .. } => Self::CHAR,
            EntryKind::Directory => Self::DIR,
            EntryKind::Fifo => Self::FIFO,
            EntryKind::File { .. } => Self::FILE,
            EntryKind::Symlink { .. } => Self::SYMLINK,
            EntryKind::Socket => Self::SOCKET,
        };
        self.0 & bit != 0
    }
}

impl Default for KindMask {
    fn default() -> Self {
        Self::all()
    }
}

/// Scan configuration, mirroring the pseudo-file `glob` option set.
#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Kinds to yield; others are skipped (directories are still descended).
    pub kinds: KindMask,
    /// Do not cross filesystem boundaries (`-xdev`).
    pub one_file_system: bool,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Keep host mtimes (`-keeptime`); otherwise `default_mtime` applies.
    pub keep_time: bool,
    /// Substitute mtime when host times are discarded.
    pub default_mtime: u32,
    /// Replace every entry's mode; `None` keeps the host value.
    pub mode_override: Option<u16>,
    /// Replace every entry's uid; `None` keeps the host value.
    pub uid_override: Option<u32>,
    /// Replace every entry's gid; `None` keeps the host value.
    pub gid_override: Option<u32>,
    /// Pattern filter; non-matching entries are skipped.
    pub pattern: Option<Pattern>,
    /// Apply the pattern to the full relative path instead of the basename.
    pub match_full_path: bool,
    /// Collect extended attributes for each entry.
    pub read_xattrs: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            kinds: KindMask::all(),
            one_file_system: false,
            recursive: true,
            keep_time: true,
            default_mtime: 0,
            mode_override: None,
            uid_override: None,
            gid_override: None,
            pattern: None,
            match_full_path: false,
            read_xattrs: false,
        }
    }
}

/// Iterator over a host directory tree, yielding sorted entries.
#[derive(Debug)]
pub struct DirScanner {
    options: ScanOptions,
    root_dev: u64,
    /// Directories still to read: (absolute path, relative path).
    stack: Vec<(PathBuf, String)>,
    /// Entries of the directory read most recently, reversed for pop order.
    ready: Vec<ScanEntry>,
    finished: bool,
}

impl DirScanner {
    /// Opens a scan rooted at `root`.
    ///
    /// # Errors
    ///
    /// [`WalkError::RootNotDirectory`] when `root` is not a directory, or an
    /// I/O error from the initial stat.
    pub fn new(root: &Path, options: ScanOptions) -> Result<Self, WalkError> {
        let meta = fs::symlink_metadata(root).map_err(|e| WalkError::io(root, e))?;
        if !meta.is_dir() {
            return Err(WalkError::RootNotDirectory { path: root.to_path_buf() });
        }
        Ok(Self {
            options,
            root_dev: meta.dev(),
            stack: vec![(root.to_path_buf(), String::new())],
            ready: Vec::new(),
            finished: false,
        })
    }

    /// Attributes of the scan root itself, after preservation filters; the
    /// caller applies them to the tree root.
    ///
    /// # Errors
    ///
    /// An I/O error from stating the root.
    pub fn root_attrs(root: &Path, options: &ScanOptions) -> Result<ScanAttrs, WalkError> {
        let meta = fs::symlink_metadata(root).map_err(|e| WalkError::io(root, e))?;
        Ok(filtered_attrs(&meta, options))
    }

    fn read_directory(&mut self, dir: PathBuf, rel: String) -> Result<(), WalkError> {
        let mut names: Vec<String> = Vec::new();
        let iter = fs::read_dir(&dir).map_err(|e| WalkError::io(&dir, e))?;
        for item in iter {
            let item = item.map_err(|e| WalkError::io(&dir, e))?;
            match item.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(_) => {
                    return Err(WalkError::NonUnicodeName { path: item.path() });
                }
            }
        }
        names.sort_unstable();

        let mut produced = Vec::with_capacity(names.len());
        let mut subdirs = Vec::new();
        for name in names {
            let source = dir.join(&name);
            let rel_path = if rel.is_empty() { name } else { format!("{rel}/{name}") };
            let meta = fs::symlink_metadata(&source).map_err(|e| WalkError::io(&source, e))?;

            let descend = meta.is_dir()
                && self.options.recursive
                && !(self.options.one_file_system && meta.dev() != self.root_dev);
            if descend {
                subdirs.push((source.clone(), rel_path.clone()));
            }
            if self.options.one_file_system && meta.dev() != self.root_dev {
                continue;
            }

            let Some(kind) = entry_kind(&source, &meta)? else {
                continue;
            };
            if !self.options.kinds.admits(&kind) {
                continue;
            }
            if let Some(pattern) = &self.options.pattern {
                let subject = if self.options.match_full_path {
                    rel_path.as_str()
                } else {
                    basename(&rel_path)
                };
                if !pattern.matches(subject) {
                    continue;
                }
            }

            let xattrs = if self.options.read_xattrs {
                read_xattrs(&source)?
            } else {
                Vec::new()
            };
            produced.push(ScanEntry {
                path: rel_path,
                kind,
                attrs: filtered_attrs(&meta, &self.options),
                source,
                xattrs,
            });
        }

        // Reversed so Vec::pop yields name order, and subdirectories visit
        // first-by-name when the stack pops.
        produced.reverse();
        self.ready = produced;
        self.stack.extend(subdirs.into_iter().rev());
        Ok(())
    }
}

impl Iterator for DirScanner {
    type Item = Result<ScanEntry, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if let Some(entry) = self.ready.pop() {
                return Some(Ok(entry));
            }
            let Some((dir, rel)) = self.stack.pop() else {
                self.finished = true;
                return None;
            };
            if let Err(error) = self.read_directory(dir, rel) {
                self.finished = true;
                return Some(Err(error));
            }
        }
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn filtered_attrs(meta: &fs::Metadata, options: &ScanOptions) -> ScanAttrs {
    ScanAttrs {
        mode: options.mode_override.unwrap_or((meta.mode() & 0o7777) as u16),
        uid: options.uid_override.unwrap_or(meta.uid()),
        gid: options.gid_override.unwrap_or(meta.gid()),
        mtime: if options.keep_time {
            u32::try_from(meta.mtime()).unwrap_or(0)
        } else {
            options.default_mtime
        },
    }
}

fn entry_kind(path: &Path, meta: &fs::Metadata) -> Result<Option<EntryKind>, WalkError> {
    let file_type = meta.file_type();
    if file_type.is_dir() {
        return Ok(Some(EntryKind::Directory));
    }
    if file_type.is_file() {
        return Ok(Some(EntryKind::File { size: meta.len() }));
    }
    if file_type.is_symlink() {
        let target = fs::read_link(path).map_err(|e| WalkError::io(path, e))?;
        let Some(target) = target.to_str().map(str::to_owned) else {
            return Err(WalkError::NonUnicodeName { path: path.to_path_buf() });
        };
        return Ok(Some(EntryKind::Symlink { target }));
    }
    let (major, minor) = split_dev(meta.rdev());
    if file_type.is_char_device() {
        return Ok(Some(EntryKind::CharDevice { major, minor }));
    }
    if file_type.is_block_device() {
        return Ok(Some(EntryKind::BlockDevice { major, minor }));
    }
    if file_type.is_fifo() {
        return Ok(Some(EntryKind::Fifo));
    }
    if file_type.is_socket() {
        return Ok(Some(EntryKind::Socket));
    }
    Ok(None)
}

/// Splits a Linux `dev_t` into (major, minor).
fn split_dev(rdev: u64) -> (u32, u32) {
    let major = ((rdev >> 8) & 0xfff) | ((rdev >> 32) & 0xffff_f000);
    let minor = (rdev & 0xff) | ((rdev >> 12) & 0xffff_ff00);
    (major as u32, minor as u32)
}

#[cfg(feature = "xattr")]
fn read_xattrs(path: &Path) -> Result<Vec<(String, Vec<u8>)>, WalkError> {
    let mut pairs = Vec::new();
    let names = xattr::list(path).map_err(|e| WalkError::io(path, e))?;
    for name in names {
        let Some(key) = name.to_str().map(str::to_owned) else {
            return Err(WalkError::NonUnicodeName { path: path.to_path_buf() });
        };
        let value = xattr::get(path, &name)
            .map_err(|e| WalkError::io(path, e))?
            .unwrap_or_default();
        pairs.push((key, value));
    }
    pairs.sort();
    Ok(pairs)
}

#[cfg(not(feature = "xattr"))]
fn read_xattrs(_path: &Path) -> Result<Vec<(String, Vec<u8>)>, WalkError> {
    Ok(Vec::new())
}
