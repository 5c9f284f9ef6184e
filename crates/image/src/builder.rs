//! The top-level build orchestration: ingest, pack, write, stamp.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use blocks::{PackConfig, Processor};
use compress::{sniff, BlockCompressor, Codec};
use fstree::{FileData, NodeAttrs, NodePayload, SortOrder, Tree};
use pseudo::{GlobSpec, PseudoOp};
use tracing::{debug, info};
use walk::{DirScanner, EntryKind, Pattern, ScanEntry, ScanOptions};

use crate::output::OutputGuard;
use crate::superblock::Superblock;
use crate::writer;
use crate::ImageError;

/// Build configuration.
#[derive(Clone, Debug)]
pub struct BuildConfig {
    /// Data block size; a power of two in 4 KiB..=1 MiB.
    pub block_size: u32,
    /// Compression codec for data and metadata alike.
    pub codec: Codec,
    /// Codec level; `None` takes the codec default.
    pub level: Option<u32>,
    /// Compression workers; 0 runs inline.
    pub workers: usize,
    /// Pack file tails into shared fragment blocks.
    pub fragments: bool,
    /// Elide duplicate data through the signature index.
    pub dedup: bool,
    /// Emit the NFS export table.
    pub exportable: bool,
    /// Force every owner id.
    pub force_uid: Option<u32>,
    /// Force every group id.
    pub force_gid: Option<u32>,
    /// Superblock modification time; fixed so output is reproducible.
    pub mtime: u32,
    /// Compress inode/directory/lookup metadata.
    pub compress_inodes: bool,
    /// Compress data blocks.
    pub compress_data: bool,
    /// Compress fragment blocks.
    pub compress_fragments: bool,
    /// Compress the xattr streams.
    pub compress_xattrs: bool,
    /// Pad the archive to a 4 KiB boundary.
    pub pad_to_4k: bool,
    /// Transparently decode gzip/zstd-compressed input files.
    pub transparent_input: bool,
    /// Read host xattrs during directory scans.
    pub scan_xattrs: bool,
    /// Externally supplied packing priorities.
    pub sort: Option<SortOrder>,
}

impl BuildConfig {
    /// The conventional defaults: 128 KiB blocks, gzip, every feature on.
    #[must_use]
    pub fn new() -> Self {
        Self {
            block_size: 128 * 1024,
            codec: Codec::Gzip,
            level: None,
            workers: blocks::default_workers(),
            fragments: true,
            dedup: true,
            exportable: false,
            force_uid: None,
            force_gid: None,
            mtime: 0,
            compress_inodes: true,
            compress_data: true,
            compress_fragments: true,
            compress_xattrs: true,
            pad_to_4k: true,
            transparent_input: false,
            scan_xattrs: true,
            sort: None,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What a finished build reports.
#[derive(Clone, Copy, Debug)]
pub struct BuildSummary {
    /// The stamped superblock.
    pub superblock: Superblock,
    /// Final file size including padding.
    pub padded_size: u64,
    /// Regular files packed.
    pub file_count: usize,
}

/// Builds one image from directory scans and/or pseudo-file operations.
#[derive(Debug)]
pub struct Builder {
    cfg: BuildConfig,
    tree: Tree,
}

impl Builder {
    /// Starts an empty build.
    ///
    /// # Errors
    ///
    /// Rejects an invalid block size or an unavailable codec up front,
    /// before any input is read.
    pub fn new(cfg: BuildConfig) -> Result<Self, ImageError> {
        PackConfig::new(cfg.block_size).validate()?;
        match cfg.level {
            Some(level) => BlockCompressor::with_level(cfg.codec, level)?,
            None => BlockCompressor::new(cfg.codec)?,
        };
        Ok(Self { cfg, tree: Tree::new() })
    }

    /// Direct access to the tree for callers assembling it by hand.
    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    /// Scans `root` into the tree root, applying the source directory's own
    /// attributes to `/`.
    ///
    /// # Errors
    ///
    /// Scan failures (with the host path) and tree conflicts.
    pub fn add_source_dir(&mut self, root: &Path, options: ScanOptions) -> Result<(), ImageError> {
        let root_attrs = DirScanner::root_attrs(root, &options)?;
        self.tree.add(
            "/",
            NodeAttrs {
                mode: root_attrs.mode,
                uid: root_attrs.uid,
                gid: root_attrs.gid,
                mtime: root_attrs.mtime,
            },
            NodePayload::Directory { children: Vec::new() },
        )?;
        let mut count = 0usize;
        for entry in DirScanner::new(root, options)? {
            let entry = entry?;
            self.add_scan_entry("", entry)?;
            count += 1;
        }
        debug!(root = %root.display(), entries = count, "directory scan ingested");
        Ok(())
    }

    /// Applies parsed pseudo-file operations, expanding `glob` lines
    /// through the scanner.
    ///
    /// # Errors
    ///
    /// Tree conflicts and scan failures.
    pub fn add_pseudo_ops(&mut self, ops: &[PseudoOp]) -> Result<(), ImageError> {
        for op in ops {
            match op {
                PseudoOp::Glob { path, spec } => self.expand_glob(path, spec)?,
                other => pseudo::apply(&mut self.tree, other)?,
            }
        }
        Ok(())
    }

    fn expand_glob(&mut self, target: &str, spec: &GlobSpec) -> Result<(), ImageError> {
        let base = spec
            .base
            .clone()
            .unwrap_or_else(|| PathBuf::from(target));
        let options = ScanOptions {
            kinds: spec.kinds,
            one_file_system: spec.one_file_system,
            recursive: spec.recursive,
            keep_time: spec.keep_time,
            default_mtime: self.cfg.mtime,
            mode_override: spec.mode,
            uid_override: spec.uid,
            gid_override: spec.gid,
            pattern: spec
                .pattern
                .as_ref()
                .map(|(text, _)| Pattern::new(text.clone())),
            match_full_path: spec.pattern.as_ref().is_some_and(|(_, full)| *full),
            read_xattrs: false,
        };
        let prefix = target.trim_end_matches('/').to_owned();
        for entry in DirScanner::new(&base, options)? {
            self.add_scan_entry(&prefix, entry?)?;
        }
        Ok(())
    }

    fn add_scan_entry(&mut self, prefix: &str, entry: ScanEntry) -> Result<(), ImageError> {
        let path = if prefix.is_empty() {
            format!("/{}", entry.path)
        } else {
            format!("{}/{}", prefix, entry.path)
        };
        let attrs = NodeAttrs {
            mode: entry.attrs.mode,
            uid: entry.attrs.uid,
            gid: entry.attrs.gid,
            mtime: entry.attrs.mtime,
        };
        let payload = match entry.kind {
            EntryKind::Directory => NodePayload::Directory { children: Vec::new() },
            EntryKind::File { .. } => NodePayload::File {
                data: FileData::Host(entry.source.clone()),
                no_fragment: false,
            },
            EntryKind::Symlink { target } => NodePayload::Symlink { target },
            EntryKind::CharDevice { major, minor } => NodePayload::CharDevice { major, minor },
            EntryKind::BlockDevice { major, minor } => NodePayload::BlockDevice { major, minor },
            EntryKind::Fifo => NodePayload::Fifo,
            EntryKind::Socket => NodePayload::Socket,
        };
        let id = self.tree.add(&path, attrs, payload)?;

        if self.cfg.scan_xattrs && !entry.xattrs.is_empty() {
            let mut builder = fstree::XattrBuilder::begin();
            for (key, value) in &entry.xattrs {
                // system.* keys (ACLs and friends) have no stored namespace
                // tag and are skipped.
                if builder.add(key, value).is_err() {
                    continue;
                }
            }
            let index = builder.end(self.tree.xattrs_mut())?;
            self.tree.node_mut(id).xattr = index;
        }
        Ok(())
    }

    /// Runs the whole build and writes the image at `output`.
    ///
    /// On any failure the partially written file is removed.
    ///
    /// # Errors
    ///
    /// Everything in [`ImageError`]; the first failure wins and the output
    /// is deleted.
    pub fn build(mut self, output: &Path) -> Result<BuildSummary, ImageError> {
        self.tree.override_owners(self.cfg.force_uid, self.cfg.force_gid);
        self.tree.post_process()?;
        if let Some(sort) = self.cfg.sort.take() {
            self.tree.apply_sort_order(&sort);
        }

        let compressor = match self.cfg.level {
            Some(level) => BlockCompressor::with_level(self.cfg.codec, level)?,
            None => BlockCompressor::new(self.cfg.codec)?,
        };
        let (guard, file) = OutputGuard::create(output)?;

        let pack_cfg = PackConfig {
            block_size: self.cfg.block_size,
            workers: self.cfg.workers,
            max_backlog: 0,
            fragments: self.cfg.fragments,
            dedup: self.cfg.dedup,
            compress_data: self.cfg.compress_data,
            compress_fragments: self.cfg.compress_fragments,
        };
        let mut processor = Processor::new(
            file,
            crate::superblock::SUPERBLOCK_SIZE as u64,
            pack_cfg,
            compressor,
        )?;

        let files: Vec<_> = self.tree.files().to_vec();
        for id in files {
            let node = self.tree.node(id);
            let NodePayload::File { data, no_fragment } = &node.payload else {
                return Err(ImageError::Internal("packing list entry is not a file"));
            };
            match data {
                FileData::Inline(bytes) => {
                    processor.submit_file(&mut Cursor::new(bytes.clone()), *no_fragment)?;
                }
                FileData::Host(path) => {
                    let (mut stream, _size) =
                        sniff::open_for_reading(path, self.cfg.transparent_input).map_err(
                            |source| ImageError::InputIo { path: path.clone(), source },
                        )?;
                    let no_fragment = *no_fragment;
                    processor.submit_file(&mut stream, no_fragment).map_err(|e| {
                        attach_input_path(e, path)
                    })?;
                }
            }
        }
        let (mut file, pack) = processor.finish()?;

        let outcome = writer::write_image(&mut file, &self.tree, &pack, &self.cfg, &compressor)?;
        guard.commit();

        info!(
            output = %output.display(),
            bytes = outcome.padded_size,
            inodes = outcome.superblock.inode_count,
            "image written"
        );
        Ok(BuildSummary {
            superblock: outcome.superblock,
            padded_size: outcome.padded_size,
            file_count: pack.files.len(),
        })
    }
}

/// Read failures during a submit happened on the input stream; label them
/// with the file being packed.
fn attach_input_path(error: blocks::PackError, path: &Path) -> ImageError {
    match error {
        blocks::PackError::Io(source) => ImageError::InputIo { path: path.to_path_buf(), source },
        other => ImageError::Pack(other),
    }
}
