//! The 96-byte little-endian superblock.

use compress::Codec;

use crate::ImageError;

/// On-disk magic, `"hsqs"` read little-endian.
pub const MAGIC: u32 = 0x7371_7368;
/// Serialized superblock size.
pub const SUPERBLOCK_SIZE: usize = 96;
/// Table offset value meaning "table absent".
pub const TABLE_ABSENT: u64 = u64::MAX;

/// Superblock flag bits.
pub mod flags {
    /// Inode table chunks are stored raw.
    pub const UNCOMPRESSED_INODES: u16 = 0x0001;
    /// Data blocks are stored raw.
    pub const UNCOMPRESSED_DATA: u16 = 0x0002;
    /// Fragment blocks are stored raw.
    pub const UNCOMPRESSED_FRAGMENTS: u16 = 0x0008;
    /// No fragment blocks were generated.
    pub const NO_FRAGMENTS: u16 = 0x0010;
    /// Tails always went into fragments, even block-sized ones.
    pub const ALWAYS_FRAGMENTS: u16 = 0x0020;
    /// Duplicate checking was performed.
    pub const DUPLICATES: u16 = 0x0040;
    /// An NFS export table is present.
    pub const EXPORTABLE: u16 = 0x0080;
    /// Xattr chunks are stored raw.
    pub const UNCOMPRESSED_XATTRS: u16 = 0x0100;
    /// No xattrs anywhere in the archive.
    pub const NO_XATTRS: u16 = 0x0200;
    /// Compressor options follow the superblock.
    pub const COMPRESSOR_OPTIONS: u16 = 0x0400;
    /// Id table chunks are stored raw.
    pub const UNCOMPRESSED_IDS: u16 = 0x0800;
}

/// The fixed header at offset 0, stamped after every table is in place.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Superblock {
    /// Number of inodes.
    pub inode_count: u32,
    /// Image modification time.
    pub mod_time: u32,
    /// Data block size.
    pub block_size: u32,
    /// Fragment-table entries.
    pub frag_count: u32,
    /// Compression codec id.
    pub compressor: Codec,
    /// Flag bits.
    pub flags: u16,
    /// Id-table entries.
    pub id_count: u16,
    /// Metadata reference of the root directory inode.
    pub root_inode: u64,
    /// Bytes used by the archive (before device padding).
    pub bytes_used: u64,
    /// Id table index offset.
    pub id_table: u64,
    /// Xattr table offset, [`TABLE_ABSENT`] when absent.
    pub xattr_table: u64,
    /// Inode table offset.
    pub inode_table: u64,
    /// Directory table offset.
    pub dir_table: u64,
    /// Fragment table index offset, [`TABLE_ABSENT`] when absent.
    pub frag_table: u64,
    /// Export table index offset, [`TABLE_ABSENT`] when absent.
    pub export_table: u64,
}

impl Superblock {
    /// Serializes the superblock.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut out = [0u8; SUPERBLOCK_SIZE];
        let mut w = FieldWriter { out: &mut out, at: 0 };
        w.u32(MAGIC);
        w.u32(self.inode_count);
        w.u32(self.mod_time);
        w.u32(self.block_size);
        w.u32(self.frag_count);
        w.u16(self.compressor.id());
        w.u16(self.block_size.trailing_zeros() as u16);
        w.u16(self.flags);
        w.u16(self.id_count);
        w.u16(4); // version major
        w.u16(0); // version minor
        w.u64(self.root_inode);
        w.u64(self.bytes_used);
        w.u64(self.id_table);
        w.u64(self.xattr_table);
        w.u64(self.inode_table);
        w.u64(self.dir_table);
        w.u64(self.frag_table);
        w.u64(self.export_table);
        out
    }

    /// Parses a superblock, verifying magic, version, and the block-size /
    /// block-log agreement.
    ///
    /// # Errors
    ///
    /// [`ImageError::Internal`] describing the first malformed field.
    pub fn parse(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() < SUPERBLOCK_SIZE {
            return Err(ImageError::Internal("superblock truncated"));
        }
        let mut r = FieldReader { bytes, at: 0 };
        if r.u32() != MAGIC {
            return Err(ImageError::Internal("bad superblock magic"));
        }
        let inode_count = r.u32();
        let mod_time = r.u32();
        let block_size = r.u32();
        let frag_count = r.u32();
        let compressor = Codec::from_id(r.u16())
            .ok_or(ImageError::Internal("unknown compressor id"))?;
        let block_log = r.u16();
        let flags = r.u16();
        let id_count = r.u16();
        if (r.u16(), r.u16()) != (4, 0) {
            return Err(ImageError::Internal("unsupported format version"));
        }
        if !block_size.is_power_of_two() || u32::from(block_log) != block_size.trailing_zeros() {
            return Err(ImageError::Internal("block size and block log disagree"));
        }
        Ok(Self {
            inode_count,
            mod_time,
            block_size,
            frag_count,
            compressor,
            flags,
            id_count,
            root_inode: r.u64(),
            bytes_used: r.u64(),
            id_table: r.u64(),
            xattr_table: r.u64(),
            inode_table: r.u64(),
            dir_table: r.u64(),
            frag_table: r.u64(),
            export_table: r.u64(),
        })
    }
}

struct FieldWriter<'a> {
    out: &'a mut [u8],
    at: usize,
}

impl FieldWriter<'_> {
    fn u16(&mut self, v: u16) {
        self.out[self.at..self.at + 2].copy_from_slice(&v.to_le_bytes());
        self.at += 2;
    }
    fn u32(&mut self, v: u32) {
        self.out[self.at..self.at + 4].copy_from_slice(&v.to_le_bytes());
        self.at += 4;
    }
    fn u64(&mut self, v: u64) {
        self.out[self.at..self.at + 8].copy_from_slice(&v.to_le_bytes());
        self.at += 8;
    }
}

struct FieldReader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl FieldReader<'_> {
    fn u16(&mut self) -> u16 {
        let v = u16::from_le_bytes([self.bytes[self.at], self.bytes[self.at + 1]]);
        self.at += 2;
        v
    }
    fn u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.bytes[self.at..self.at + 4]);
        self.at += 4;
        u32::from_le_bytes(buf)
    }
    fn u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.bytes[self.at..self.at + 8]);
        self.at += 8;
        u64::from_le_bytes(buf)
    }
}
