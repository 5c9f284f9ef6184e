//! A minimal image reader, enough to verify the writer's output the way a
//! reference unpacker would: superblock, metadata streams, directory walks,
//! file contents, and the lookup tables.

use std::collections::HashMap;
use std::path::Path;

use compress::BlockCompressor;
use image::{flags, MetaRef, Superblock};

const CHUNK_UNCOMPRESSED: u16 = 0x8000;
const NO_FRAGMENT: u32 = u32::MAX;

/// A decoded metadata stream with the chunk-offset map needed to resolve
/// `(block << 16) | offset` references.
pub struct MetaStream {
    data: Vec<u8>,
    chunk_starts: HashMap<u32, usize>,
}

impl MetaStream {
    pub fn resolve(&self, reference: MetaRef) -> usize {
        // An empty-directory listing may reference the stream's end, where
        // no chunk was ever emitted.
        self.chunk_starts.get(&reference.block).copied().unwrap_or(self.data.len())
            + usize::from(reference.offset)
    }
}

/// One parsed inode.
#[derive(Clone, Debug)]
pub struct Inode {
    pub kind: u16,
    pub mode: u16,
    pub uid_idx: u16,
    pub gid_idx: u16,
    pub mtime: u32,
    pub inode_num: u32,
    pub payload: InodePayload,
}

#[derive(Clone, Debug)]
pub enum InodePayload {
    Dir {
        start: MetaRef,
        nlink: u32,
        listing_size: u32,
        parent: u32,
    },
    File {
        blocks_start: u64,
        file_size: u64,
        sparse: u64,
        nlink: u32,
        fragment: Option<(u32, u32)>,
        block_words: Vec<u32>,
        xattr: Option<u32>,
    },
    Symlink {
        target: String,
    },
    Device {
        rdev: u32,
    },
    Ipc,
}

#[derive(Clone, Debug)]
pub struct DirEnt {
    pub name: String,
    pub inode_num: u32,
    pub entry_type: u16,
    pub reference: MetaRef,
}

pub struct Image {
    pub bytes: Vec<u8>,
    pub sb: Superblock,
    compressor: BlockCompressor,
    inodes: MetaStream,
    dirs: MetaStream,
}

impl Image {
    pub fn open(path: &Path) -> Self {
        let bytes = std::fs::read(path).expect("read image");
        let sb = Superblock::parse(&bytes).expect("parse superblock");
        let compressor = BlockCompressor::new(sb.compressor).expect("codec available");

        let dir_end = first_table_after(&bytes, &sb);
        let inodes = decode_stream(&bytes, sb.inode_table, sb.dir_table, &compressor);
        let dirs = decode_stream(&bytes, sb.dir_table, dir_end, &compressor);
        Self { bytes, sb, compressor, inodes, dirs }
    }

    pub fn root(&self) -> Inode {
        self.inode_at(MetaRef::decode(self.sb.root_inode))
    }

    pub fn inode_at(&self, reference: MetaRef) -> Inode {
        let at = self.inodes.resolve(reference);
        parse_inode(&self.inodes.data[at..], self.sb.block_size)
    }

    /// Walks an absolute path from the root.
    pub fn lookup(&self, path: &str) -> Option<Inode> {
        let mut current = self.root();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let entries = self.read_dir(&current);
            let entry = entries.iter().find(|e| e.name == component)?;
            current = self.inode_at(entry.reference);
        }
        Some(current)
    }

    pub fn read_dir(&self, dir: &Inode) -> Vec<DirEnt> {
        let InodePayload::Dir { start, listing_size, .. } = dir.payload else {
            panic!("not a directory: {dir:?}");
        };
        let mut remaining = listing_size as usize - 3;
        let mut at = self.dirs.resolve(start);
        let data = &self.dirs.data;
        let mut entries = Vec::new();
        while remaining > 0 {
            let count = read_u32(data, at) as usize + 1;
            let inode_block = read_u32(data, at + 4);
            let base_inode = read_u32(data, at + 8);
            at += 12;
            remaining -= 12;
            for _ in 0..count {
                let offset = read_u16(data, at);
                let delta = read_u16(data, at + 2) as i16;
                let entry_type = read_u16(data, at + 4);
                let name_len = read_u16(data, at + 6) as usize + 1;
                let name =
                    String::from_utf8(data[at + 8..at + 8 + name_len].to_vec()).expect("utf8");
                entries.push(DirEnt {
                    name,
                    inode_num: (i64::from(base_inode) + i64::from(delta)) as u32,
                    entry_type,
                    reference: MetaRef { block: inode_block, offset },
                });
                at += 8 + name_len;
                remaining -= 8 + name_len;
            }
        }
        entries
    }

    pub fn read_file(&self, inode: &Inode) -> Vec<u8> {
        let InodePayload::File {
            blocks_start,
            file_size,
            fragment,
            ref block_words,
            ..
        } = inode.payload
        else {
            panic!("not a file: {inode:?}");
        };
        let block_size = self.sb.block_size as usize;
        let mut out = Vec::with_capacity(file_size as usize);
        let mut at = blocks_start;
        for (index, &word) in block_words.iter().enumerate() {
            let is_last = index == block_words.len() - 1 && fragment.is_none();
            let expected = if is_last && file_size as usize % block_size != 0 {
                file_size as usize % block_size
            } else {
                block_size
            };
            if word == 0 {
                out.extend(std::iter::repeat_n(0u8, expected));
                continue;
            }
            let stored = (word & 0x00ff_ffff) as usize;
            let raw = word & (1 << 24) != 0;
            let data = &self.bytes[at as usize..at as usize + stored];
            if raw {
                out.extend_from_slice(data);
            } else {
                let mut chunk = Vec::new();
                self.compressor.decompress(data, &mut chunk, block_size).expect("block");
                out.extend_from_slice(&chunk);
            }
            at += stored as u64;
        }
        if let Some((frag_index, frag_offset)) = fragment {
            let tail_len = file_size as usize % block_size;
            let fragment_block = self.fragment_block(frag_index);
            out.extend_from_slice(
                &fragment_block[frag_offset as usize..frag_offset as usize + tail_len],
            );
        }
        assert_eq!(out.len() as u64, file_size);
        out
    }

    pub fn fragments(&self) -> Vec<(u64, u32)> {
        if self.sb.frag_count == 0 {
            return Vec::new();
        }
        let entries = self.lookup_table(self.sb.frag_table, self.sb.frag_count as usize * 16);
        entries
            .chunks(16)
            .map(|e| (read_u64(e, 0), read_u32(e, 8)))
            .collect()
    }

    pub fn fragment_block(&self, index: u32) -> Vec<u8> {
        let (start, word) = self.fragments()[index as usize];
        let stored = (word & 0x00ff_ffff) as usize;
        let raw = word & (1 << 24) != 0;
        let data = &self.bytes[start as usize..start as usize + stored];
        if raw {
            data.to_vec()
        } else {
            let mut out = Vec::new();
            self.compressor
                .decompress(data, &mut out, self.sb.block_size as usize)
                .expect("fragment");
            out
        }
    }

    pub fn ids(&self) -> Vec<u32> {
        let entries = self.lookup_table(self.sb.id_table, self.sb.id_count as usize * 4);
        entries.chunks(4).map(|e| read_u32(e, 0)).collect()
    }

    pub fn export_refs(&self) -> Vec<u64> {
        assert!(self.sb.flags & flags::EXPORTABLE != 0);
        let entries =
            self.lookup_table(self.sb.export_table, self.sb.inode_count as usize * 8);
        entries.chunks(8).map(|e| read_u64(e, 0)).collect()
    }

    /// Reads a chunk-indexed lookup table of `total` entry bytes.
    fn lookup_table(&self, index_start: u64, total: usize) -> Vec<u8> {
        let chunk_count = total.div_ceil(8192);
        let mut out = Vec::with_capacity(total);
        for i in 0..chunk_count {
            let offset = read_u64(&self.bytes, index_start as usize + i * 8);
            let (chunk, _) = decode_chunk(&self.bytes, offset as usize, &self.compressor);
            out.extend_from_slice(&chunk);
        }
        out.truncate(total);
        out
    }
}

fn first_table_after(bytes: &[u8], sb: &Superblock) -> u64 {
    // The directory stream ends where the next table's first chunk begins;
    // every later table is reached through an index of absolute offsets.
    if sb.frag_count > 0 {
        return read_u64(bytes, sb.frag_table as usize);
    }
    read_u64(bytes, sb.id_table as usize)
}

fn decode_stream(
    bytes: &[u8],
    start: u64,
    end: u64,
    compressor: &BlockCompressor,
) -> MetaStream {
    let mut data = Vec::new();
    let mut chunk_starts = HashMap::new();
    let mut at = start as usize;
    while (at as u64) < end {
        chunk_starts.insert((at as u64 - start) as u32, data.len());
        let (chunk, consumed) = decode_chunk(bytes, at, compressor);
        data.extend_from_slice(&chunk);
        at += consumed;
    }
    MetaStream { data, chunk_starts }
}

fn decode_chunk(bytes: &[u8], at: usize, compressor: &BlockCompressor) -> (Vec<u8>, usize) {
    let header = read_u16(bytes, at);
    let stored = usize::from(header & !CHUNK_UNCOMPRESSED);
    let payload = &bytes[at + 2..at + 2 + stored];
    let chunk = if header & CHUNK_UNCOMPRESSED != 0 {
        payload.to_vec()
    } else {
        let mut out = Vec::new();
        compressor.decompress(payload, &mut out, 8192).expect("metadata chunk");
        out
    };
    (chunk, 2 + stored)
}

fn parse_inode(data: &[u8], block_size: u32) -> Inode {
    let kind = read_u16(data, 0);
    let header = Inode {
        kind,
        mode: read_u16(data, 2),
        uid_idx: read_u16(data, 4),
        gid_idx: read_u16(data, 6),
        mtime: read_u32(data, 8),
        inode_num: read_u32(data, 12),
        payload: InodePayload::Ipc,
    };
    let body = &data[16..];
    let payload = match kind {
        1 => InodePayload::Dir {
            start: MetaRef { block: read_u32(body, 0), offset: read_u16(body, 10) },
            nlink: read_u32(body, 4),
            listing_size: u32::from(read_u16(body, 8)),
            parent: read_u32(body, 12),
        },
        8 => {
            InodePayload::Dir {
                start: MetaRef { block: read_u32(body, 8), offset: read_u16(body, 18) },
                nlink: read_u32(body, 0),
                listing_size: read_u32(body, 4),
                parent: read_u32(body, 12),
            }
        }
        2 => {
            let blocks_start = u64::from(read_u32(body, 0));
            let frag_index = read_u32(body, 4);
            let frag_offset = read_u32(body, 8);
            let file_size = u64::from(read_u32(body, 12));
            let fragment = (frag_index != NO_FRAGMENT).then_some((frag_index, frag_offset));
            let words = block_word_count(file_size, fragment.is_some(), block_size);
            InodePayload::File {
                blocks_start,
                file_size,
                sparse: 0,
                nlink: 1,
                fragment,
                block_words: read_words(body, 16, words),
                xattr: None,
            }
        }
        9 => {
            let blocks_start = read_u64(body, 0);
            let file_size = read_u64(body, 8);
            let sparse = read_u64(body, 16);
            let nlink = read_u32(body, 24);
            let frag_index = read_u32(body, 28);
            let frag_offset = read_u32(body, 32);
            let xattr = read_u32(body, 36);
            let fragment = (frag_index != NO_FRAGMENT).then_some((frag_index, frag_offset));
            let words = block_word_count(file_size, fragment.is_some(), block_size);
            InodePayload::File {
                blocks_start,
                file_size,
                sparse,
                nlink,
                fragment,
                block_words: read_words(body, 40, words),
                xattr: (xattr != u32::MAX).then_some(xattr),
            }
        }
        3 | 10 => {
            let len = read_u32(body, 4) as usize;
            InodePayload::Symlink {
                target: String::from_utf8(body[8..8 + len].to_vec()).expect("utf8 target"),
            }
        }
        4 | 5 | 11 | 12 => InodePayload::Device { rdev: read_u32(body, 4) },
        6 | 7 | 13 | 14 => InodePayload::Ipc,
        other => panic!("unknown inode type {other}"),
    };
    Inode { payload, ..header }
}

fn block_word_count(file_size: u64, has_fragment: bool, block_size: u32) -> usize {
    let bs = u64::from(block_size);
    if has_fragment {
        (file_size / bs) as usize
    } else {
        (file_size.div_ceil(bs)) as usize
    }
}

fn read_words(data: &[u8], at: usize, count: usize) -> Vec<u32> {
    (0..count).map(|i| read_u32(data, at + i * 4)).collect()
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(data[at..at + 4].try_into().unwrap())
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(data[at..at + 8].try_into().unwrap())
}
