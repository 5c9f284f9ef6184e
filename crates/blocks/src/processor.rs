//! The block processor: producer-side splitting, the worker pool, and the
//! ordered drain that writes the data region.

use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use compress::BlockCompressor;
use tracing::{debug, trace};
use xxhash_rust::xxh32::Xxh32;

use crate::dedup::{self, Candidate, DedupIndex, Signature};
use crate::desc::{BlockDesc, FragmentEntry, PackResult, PackedFile};
use crate::fragment::FragmentAssembler;
use crate::PackError;

/// Smallest accepted block size (4 KiB).
pub const MIN_BLOCK_SIZE: u32 = 4096;
/// Largest accepted block size (1 MiB).
pub const MAX_BLOCK_SIZE: u32 = 1 << 20;

/// Pipeline configuration.
#[derive(Clone, Copy, Debug)]
pub struct PackConfig {
    /// Data block size; a power of two in 4 KiB..=1 MiB.
    pub block_size: u32,
    /// Worker threads; 0 runs every stage inline on the caller's thread.
    pub workers: usize,
    /// Bound on queued work items; 0 derives one from the worker count.
    pub max_backlog: usize,
    /// Pack trailing partial blocks into shared fragment blocks.
    pub fragments: bool,
    /// Elide identical output through the signature index.
    pub dedup: bool,
    /// Compress data blocks; raw storage otherwise.
    pub compress_data: bool,
    /// Compress fragment blocks; raw storage otherwise.
    pub compress_fragments: bool,
}

impl PackConfig {
    /// A configuration with the conventional defaults: fragments and
    /// duplicate checking on, one worker per available core.
    #[must_use]
    pub fn new(block_size: u32) -> Self {
        Self {
            block_size,
            workers: crate::default_workers(),
            max_backlog: 0,
            fragments: true,
            dedup: true,
            compress_data: true,
            compress_fragments: true,
        }
    }

    /// Validates the block size constraint.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::BlockSize`] unless the size is a power of two in
    /// 4 KiB..=1 MiB.
    pub fn validate(&self) -> Result<(), PackError> {
        let size = self.block_size;
        if !size.is_power_of_two() || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&size) {
            return Err(PackError::BlockSize { size });
        }
        Ok(())
    }

    fn backlog(&self) -> usize {
        if self.max_backlog > 0 {
            self.max_backlog
        } else {
            self.workers * 2 + 8
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Target {
    File(usize),
    Fragment(u32),
}

struct WorkItem {
    seq: u64,
    target: Target,
    data: Vec<u8>,
    sparse_ok: bool,
    compress: bool,
}

struct Payload {
    /// `None` for a sparse block; otherwise the bytes to store.
    bytes: Option<Vec<u8>>,
    uncompressed: u32,
    compressed: bool,
}

struct Outcome {
    seq: u64,
    target: Target,
    payload: Result<Payload, PackError>,
}

/// Compression stage, shared verbatim by workers and the inline path.
fn run_job(
    compressor: &BlockCompressor,
    scratch: &mut Vec<u8>,
    data: Vec<u8>,
    sparse_ok: bool,
    compress: bool,
) -> Result<Payload, PackError> {
    let uncompressed = data.len() as u32;
    if sparse_ok && data.iter().all(|&b| b == 0) {
        return Ok(Payload { bytes: None, uncompressed, compressed: false });
    }
    if !compress {
        return Ok(Payload { bytes: Some(data), uncompressed, compressed: false });
    }
    match compressor.compress(&data, scratch)? {
        Some(n) => Ok(Payload {
            bytes: Some(scratch[..n].to_vec()),
            uncompressed,
            compressed: true,
        }),
        None => Ok(Payload { bytes: Some(data), uncompressed, compressed: false }),
    }
}

struct WorkerPool {
    work_tx: Option<SyncSender<WorkItem>>,
    done_rx: Receiver<Outcome>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn spawn(workers: usize, backlog: usize, compressor: BlockCompressor) -> Self {
        let (work_tx, work_rx) = mpsc::sync_channel::<WorkItem>(backlog);
        let (done_tx, done_rx) = mpsc::channel::<Outcome>();
        let shared_rx = Arc::new(Mutex::new(work_rx));

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let rx = Arc::clone(&shared_rx);
            let tx = done_tx.clone();
            handles.push(std::thread::spawn(move || {
                let mut scratch = Vec::new();
                loop {
                    let item = {
                        let Ok(guard) = rx.lock() else { return };
                        guard.recv()
                    };
                    let Ok(item) = item else { return };
                    let payload =
                        run_job(&compressor, &mut scratch, item.data, item.sparse_ok, item.compress);
                    let outcome = Outcome { seq: item.seq, target: item.target, payload };
                    if tx.send(outcome).is_err() {
                        return;
                    }
                }
            }));
        }
        Self { work_tx: Some(work_tx), done_rx, handles }
    }
}

/// Per-file bookkeeping alongside the public descriptor list.
struct FileTrack {
    packed: PackedFile,
    expected: Option<usize>,
    drained: usize,
    stored_len: u64,
    start_set: bool,
    hasher: Xxh32,
}

impl FileTrack {
    fn new() -> Self {
        Self {
            packed: PackedFile::default(),
            expected: None,
            drained: 0,
            stored_len: 0,
            start_set: false,
            hasher: Xxh32::new(0),
        }
    }
}

/// The block processor.
///
/// Owns the output stream for the duration of packing; [`Processor::finish`]
/// hands it back together with the [`PackResult`].
pub struct Processor<W> {
    out: W,
    cfg: PackConfig,
    compressor: BlockCompressor,
    pool: Option<WorkerPool>,
    scratch: Vec<u8>,
    files: Vec<FileTrack>,
    assembler: FragmentAssembler,
    fragments: Vec<FragmentEntry>,
    file_runs: DedupIndex,
    frag_blocks: DedupIndex,
    next_seq: u64,
    next_drain: u64,
    pending: BTreeMap<u64, Outcome>,
    data_offset: u64,
    error: Option<PackError>,
    failed: bool,
}

impl<W: Write + Read + Seek> Processor<W> {
    /// Creates a processor writing the data region of `out` starting at
    /// `data_start` (the byte just past the superblock).
    ///
    /// # Errors
    ///
    /// Returns [`PackError::BlockSize`] for an invalid block size.
    pub fn new(
        out: W,
        data_start: u64,
        cfg: PackConfig,
        compressor: BlockCompressor,
    ) -> Result<Self, PackError> {
        cfg.validate()?;
        let pool = (cfg.workers > 0)
            .then(|| WorkerPool::spawn(cfg.workers, cfg.backlog(), compressor));
        Ok(Self {
            out,
            cfg,
            compressor,
            pool,
            scratch: Vec::new(),
            files: Vec::new(),
            assembler: FragmentAssembler::new(cfg.block_size as usize),
            fragments: Vec::new(),
            file_runs: DedupIndex::default(),
            frag_blocks: DedupIndex::default(),
            next_seq: 0,
            next_drain: 0,
            pending: BTreeMap::new(),
            data_offset: data_start,
            error: None,
            failed: false,
        })
    }

    /// Streams one file body through the pipeline.
    ///
    /// Returns the file's index; descriptors become available once
    /// [`Processor::finish`] returns. With `no_fragment` set (or fragments
    /// disabled) a trailing partial block is stored as a final data block
    /// instead of entering the fragment assembler.
    ///
    /// # Errors
    ///
    /// I/O errors from `source` or the output, plus any worker error
    /// recorded since the previous call.
    pub fn submit_file(
        &mut self,
        source: &mut dyn Read,
        no_fragment: bool,
    ) -> Result<usize, PackError> {
        self.check_failed()?;

        let index = self.files.len();
        self.files.push(FileTrack::new());
        let block_size = self.cfg.block_size as usize;

        let mut file_size = 0u64;
        let mut submitted = 0usize;
        let mut tail: Option<Vec<u8>> = None;
        loop {
            let mut chunk = vec![0u8; block_size];
            let got = read_full(source, &mut chunk)?;
            if got == 0 {
                break;
            }
            file_size += got as u64;
            if got == block_size {
                self.submit_work(Target::File(index), chunk, true)?;
                submitted += 1;
            } else {
                chunk.truncate(got);
                tail = Some(chunk);
                break;
            }
        }

        if let Some(tail) = tail {
            if self.cfg.fragments && !no_fragment {
                let (location, flushed) = self.assembler.place(&tail);
                if let Some((frag_index, bytes)) = flushed {
                    self.submit_fragment(frag_index, bytes)?;
                }
                self.files[index].packed.fragment = Some(location);
            } else {
                self.submit_work(Target::File(index), tail, true)?;
                submitted += 1;
            }
        }

        self.files[index].packed.file_size = file_size;
        self.files[index].expected = Some(submitted);
        self.maybe_complete_file(index)?;
        self.drain_ready()?;
        self.check_failed()?;
        trace!(index, file_size, blocks = submitted, "file submitted");
        Ok(index)
    }

    /// Completes the in-flight fragment block and drains every outstanding
    /// work item; returns once all submitted descriptors are recorded.
    ///
    /// # Errors
    ///
    /// The first error recorded by any worker, or an output I/O failure.
    pub fn flush(&mut self) -> Result<(), PackError> {
        self.check_failed()?;
        if let Some((frag_index, bytes)) = self.assembler.flush() {
            self.submit_fragment(frag_index, bytes)?;
        }
        self.drain_until(self.next_seq)?;
        self.check_failed()
    }

    /// Flushes, shuts the worker pool down, and returns the output stream
    /// with the pipeline's results.
    ///
    /// # Errors
    ///
    /// Propagates [`Processor::flush`] errors and worker panics.
    pub fn finish(mut self) -> Result<(W, PackResult), PackError> {
        self.flush()?;

        if let Some(mut pool) = self.pool.take() {
            drop(pool.work_tx.take());
            for handle in pool.handles {
                if handle.join().is_err() && self.error.is_none() {
                    self.error = Some(PackError::WorkerPanicked);
                }
            }
        }
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        let result = PackResult {
            files: self.files.into_iter().map(|t| t.packed).collect(),
            fragments: self.fragments,
            data_end: self.data_offset,
        };
        debug!(
            files = result.files.len(),
            fragments = result.fragments.len(),
            data_end = result.data_end,
            "data region complete"
        );
        Ok((self.out, result))
    }

    fn check_failed(&mut self) -> Result<(), PackError> {
        if let Some(error) = self.error.take() {
            self.failed = true;
            return Err(error);
        }
        if self.failed {
            return Err(PackError::Aborted);
        }
        Ok(())
    }

    fn submit_fragment(&mut self, frag_index: u32, bytes: Vec<u8>) -> Result<(), PackError> {
        if frag_index == u32::MAX {
            return Err(PackError::FragmentOverflow { limit: u32::MAX });
        }
        self.submit_work(Target::Fragment(frag_index), bytes, false)
    }

    fn submit_work(
        &mut self,
        target: Target,
        data: Vec<u8>,
        sparse_ok: bool,
    ) -> Result<(), PackError> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let compress = match target {
            Target::File(_) => self.cfg.compress_data,
            Target::Fragment(_) => self.cfg.compress_fragments,
        };

        if self.pool.is_some() {
            self.drain_ready()?;
            let item = WorkItem { seq, target, data, sparse_ok, compress };
            let sent = self
                .pool
                .as_ref()
                .and_then(|pool| pool.work_tx.as_ref())
                // Blocks when the backlog is full: producer backpressure.
                .is_some_and(|tx| tx.send(item).is_ok());
            if !sent {
                return Err(PackError::WorkerPanicked);
            }
            return Ok(());
        }

        let payload = run_job(&self.compressor, &mut self.scratch, data, sparse_ok, compress);
        self.handle_outcome(Outcome { seq, target, payload })
    }

    fn drain_ready(&mut self) -> Result<(), PackError> {
        if let Some(pool) = &self.pool {
            while let Ok(outcome) = pool.done_rx.try_recv() {
                self.pending.insert(outcome.seq, outcome);
            }
        }
        self.process_pending()
    }

    fn drain_until(&mut self, until: u64) -> Result<(), PackError> {
        self.process_pending()?;
        while self.next_drain < until {
            let received = {
                let Some(pool) = &self.pool else {
                    // Inline mode completes everything synchronously.
                    return Ok(());
                };
                pool.done_rx.recv()
            };
            match received {
                Ok(outcome) => {
                    self.pending.insert(outcome.seq, outcome);
                    self.process_pending()?;
                }
                Err(_) => {
                    if self.error.is_none() {
                        self.error = Some(PackError::WorkerPanicked);
                    }
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn process_pending(&mut self) -> Result<(), PackError> {
        while let Some(outcome) = self.pending.remove(&self.next_drain) {
            self.handle_outcome(outcome)?;
        }
        Ok(())
    }

    fn handle_outcome(&mut self, outcome: Outcome) -> Result<(), PackError> {
        debug_assert_eq!(outcome.seq, self.next_drain);
        self.next_drain = outcome.seq + 1;

        if self.error.is_some() {
            return Ok(());
        }
        let payload = match outcome.payload {
            Ok(payload) => payload,
            Err(error) => {
                // First error wins; everything after it is discarded.
                self.error = Some(error);
                return Ok(());
            }
        };

        match outcome.target {
            Target::File(index) => self.record_file_block(index, payload)?,
            Target::Fragment(frag_index) => self.record_fragment(frag_index, payload)?,
        }
        Ok(())
    }

    fn record_file_block(&mut self, index: usize, payload: Payload) -> Result<(), PackError> {
        let Some(bytes) = payload.bytes else {
            let track = &mut self.files[index];
            track.packed.blocks.push(BlockDesc::sparse(payload.uncompressed));
            track.packed.sparse_bytes += u64::from(payload.uncompressed);
            track.drained += 1;
            return self.maybe_complete_file(index);
        };

        {
            let track = &mut self.files[index];
            if !track.start_set {
                track.packed.blocks_start = self.data_offset;
                track.start_set = true;
            }
            track.hasher.update(&bytes);
            track.stored_len += bytes.len() as u64;
            track.packed.blocks.push(BlockDesc {
                uncompressed: payload.uncompressed,
                stored: bytes.len() as u32,
                compressed: payload.compressed,
            });
            track.drained += 1;
        }
        self.write_data(&bytes)?;
        self.maybe_complete_file(index)
    }

    fn record_fragment(&mut self, frag_index: u32, payload: Payload) -> Result<(), PackError> {
        let bytes = match payload.bytes {
            Some(bytes) => bytes,
            // Fragment blocks never take the sparse path.
            None => return Ok(()),
        };
        debug_assert_eq!(frag_index as usize, self.fragments.len());

        if self.cfg.dedup {
            let sig = Signature::of(&bytes);
            let candidates: Vec<Candidate> = self.frag_blocks.candidates(sig).to_vec();
            for candidate in candidates {
                if candidate.compressed == payload.compressed
                    && dedup::region_matches(&mut self.out, candidate.start, &bytes)?
                {
                    trace!(frag_index, start = candidate.start, "fragment block deduplicated");
                    self.fragments.push(FragmentEntry {
                        start: candidate.start,
                        stored: bytes.len() as u32,
                        compressed: payload.compressed,
                    });
                    return Ok(());
                }
            }
            self.frag_blocks.record(
                sig,
                Candidate { start: self.data_offset, compressed: payload.compressed },
            );
        }

        self.fragments.push(FragmentEntry {
            start: self.data_offset,
            stored: bytes.len() as u32,
            compressed: payload.compressed,
        });
        self.write_data(&bytes)
    }

    fn maybe_complete_file(&mut self, index: usize) -> Result<(), PackError> {
        let track = &self.files[index];
        if track.expected != Some(track.drained) {
            return Ok(());
        }
        let stored_len = track.stored_len;
        if !self.cfg.dedup || stored_len == 0 {
            return Ok(());
        }

        // The file's stored blocks are the region written last, so pointing
        // the inode at an identical earlier run and rewinding the write
        // position elides the whole body.
        let sig = Signature { len: stored_len, hash: self.files[index].hasher.digest() };
        let start = self.files[index].packed.blocks_start;
        let candidates: Vec<Candidate> = self.file_runs.candidates(sig).to_vec();
        for candidate in candidates {
            if dedup::regions_match(&mut self.out, candidate.start, start, stored_len)? {
                debug!(index, start = candidate.start, stored_len, "file body deduplicated");
                self.files[index].packed.blocks_start = candidate.start;
                self.data_offset -= stored_len;
                return Ok(());
            }
        }
        self.file_runs.record(sig, Candidate { start, compressed: true });
        Ok(())
    }

    fn write_data(&mut self, bytes: &[u8]) -> Result<(), PackError> {
        self.out.seek(SeekFrom::Start(self.data_offset))?;
        self.out.write_all(bytes)?;
        self.data_offset += bytes.len() as u64;
        Ok(())
    }
}

/// Fills `buf` from `source`, returning how many bytes arrived before EOF.
fn read_full(source: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use compress::Codec;
    use std::io::Cursor;

    fn compressor() -> BlockCompressor {
        BlockCompressor::new(Codec::Gzip).unwrap()
    }

    fn inline_cfg(block_size: u32) -> PackConfig {
        let mut cfg = PackConfig::new(block_size);
        cfg.workers = 0;
        cfg
    }

    fn pack(
        cfg: PackConfig,
        bodies: &[&[u8]],
    ) -> (Vec<u8>, PackResult) {
        let out = Cursor::new(Vec::new());
        let mut proc = Processor::new(out, 96, cfg, compressor()).unwrap();
        for body in bodies {
            proc.submit_file(&mut Cursor::new(body.to_vec()), false).unwrap();
        }
        let (out, result) = proc.finish().unwrap();
        (out.into_inner(), result)
    }

    #[test]
    fn block_size_must_be_a_power_of_two_in_range() {
        for bad in [0u32, 1024, 4095, 6000, 1 << 21] {
            assert!(PackConfig::new(bad).validate().is_err(), "{bad}");
        }
        for good in [4096u32, 131072, 1 << 20] {
            assert!(PackConfig::new(good).validate().is_ok());
        }
    }

    #[test]
    fn small_file_lands_in_a_fragment() {
        let (_, result) = pack(inline_cfg(4096), &[b"hello"]);
        let file = &result.files[0];
        assert_eq!(file.file_size, 5);
        assert!(file.blocks.is_empty());
        let frag = file.fragment.expect("tail packed as fragment");
        assert_eq!((frag.index, frag.offset), (0, 0));
        assert_eq!(result.fragments.len(), 1);
    }

    #[test]
    fn block_multiple_file_has_no_fragment() {
        let body = vec![0xA5u8; 8192];
        let (_, result) = pack(inline_cfg(4096), &[&body]);
        let file = &result.files[0];
        assert_eq!(file.blocks.len(), 2);
        assert!(file.fragment.is_none());
        assert!(result.fragments.is_empty());
    }

    #[test]
    fn no_fragment_flag_stores_tail_as_block() {
        let out = Cursor::new(Vec::new());
        let mut proc = Processor::new(out, 96, inline_cfg(4096), compressor()).unwrap();
        proc.submit_file(&mut Cursor::new(b"tail".to_vec()), true).unwrap();
        let (_, result) = proc.finish().unwrap();
        let file = &result.files[0];
        assert!(file.fragment.is_none());
        assert_eq!(file.blocks.len(), 1);
        assert_eq!(file.blocks[0].uncompressed, 4);
    }

    #[test]
    fn all_zero_file_is_fully_sparse() {
        let body = vec![0u8; 1 << 20];
        let mut cfg = inline_cfg(131072);
        cfg.fragments = true;
        let (out, result) = pack(cfg, &[&body]);
        let file = &result.files[0];
        assert_eq!(file.blocks.len(), 8);
        assert!(file.blocks.iter().all(BlockDesc::is_sparse));
        assert_eq!(file.sparse_bytes, 1 << 20);
        // Nothing written past the data start.
        assert_eq!(result.data_end, 96);
        assert!(out.is_empty());
    }

    #[test]
    fn identical_files_share_their_run() {
        let body: Vec<u8> = (0..65536u32).flat_map(|v| v.to_le_bytes()).collect();
        let (_, result) = pack(inline_cfg(4096), &[&body, &body]);
        let [a, b] = &result.files[..] else { panic!() };
        assert_eq!(a.blocks_start, b.blocks_start);
        assert_eq!(a.blocks, b.blocks);
        // The data region holds one copy.
        let one_copy: u64 = a.blocks.iter().map(|d| u64::from(d.stored)).sum();
        assert_eq!(result.data_end, 96 + one_copy);
    }

    #[test]
    fn dedup_disabled_stores_both_copies() {
        let body = vec![0x5Au8; 8192];
        let mut cfg = inline_cfg(4096);
        cfg.dedup = false;
        let (_, result) = pack(cfg, &[&body, &body]);
        let [a, b] = &result.files[..] else { panic!() };
        assert_ne!(a.blocks_start, b.blocks_start);
    }

    #[test]
    fn tails_share_one_fragment_block_entry() {
        // Two distinct tails pack into the same fragment block at different
        // offsets; the fragment table has a single entry.
        let (_, result) = pack(inline_cfg(4096), &[b"first tail", b"second tail"]);
        assert_eq!(result.fragments.len(), 1);
        let a = result.files[0].fragment.unwrap();
        let b = result.files[1].fragment.unwrap();
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 0);
        assert_eq!(b.offset, 10);
    }

    #[test]
    fn fragment_blocks_flush_when_full() {
        let tail_a = vec![0x41u8; 3000];
        let tail_b = vec![0x42u8; 3000];
        let (_, result) = pack(inline_cfg(4096), &[&tail_a, &tail_b]);
        // 3000 + 3000 > 4096: the first buffer flushed as fragment 0 and the
        // second tail opened fragment 1 (completed at flush).
        assert_eq!(result.fragments.len(), 2);
        assert_eq!(result.files[0].fragment.unwrap().index, 0);
        assert_eq!(result.files[1].fragment.unwrap().index, 1);
    }

    #[test]
    fn descriptors_follow_submission_order() {
        let mut body = vec![0u8; 4096];
        body.extend_from_slice(&[1u8; 4096]);
        body.extend_from_slice(&vec![2u8; 4096]);
        let (_, result) = pack(inline_cfg(4096), &[&body]);
        let blocks = &result.files[0].blocks;
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].is_sparse());
        assert!(!blocks[1].is_sparse());
        assert_eq!(blocks[1].uncompressed, 4096);
        assert_eq!(blocks[2].uncompressed, 4096);
    }

    #[test]
    fn empty_file_has_no_blocks_or_fragment() {
        let (_, result) = pack(inline_cfg(4096), &[b""]);
        let file = &result.files[0];
        assert_eq!(file.file_size, 0);
        assert!(file.blocks.is_empty());
        assert!(file.fragment.is_none());
    }

    #[test]
    fn worker_parity_with_inline() {
        let bodies: Vec<Vec<u8>> = vec![
            (0..50000u32).flat_map(|v| v.to_le_bytes()).collect(),
            vec![0u8; 20000],
            b"short".to_vec(),
            (0..9000u16).flat_map(|v| v.to_be_bytes()).collect(),
        ];
        let body_refs: Vec<&[u8]> = bodies.iter().map(Vec::as_slice).collect();

        let (inline_bytes, inline_result) = pack(inline_cfg(4096), &body_refs);
        for workers in [1usize, 2, 4, 8] {
            let mut cfg = PackConfig::new(4096);
            cfg.workers = workers;
            let (bytes, result) = pack(cfg, &body_refs);
            assert_eq!(bytes, inline_bytes, "workers={workers}");
            assert_eq!(result.data_end, inline_result.data_end);
            for (a, b) in result.files.iter().zip(&inline_result.files) {
                assert_eq!(a.blocks, b.blocks);
                assert_eq!(a.blocks_start, b.blocks_start);
                assert_eq!(a.fragment, b.fragment);
            }
        }
    }

    #[test]
    fn read_error_carries_through() {
        struct FailingReader;
        impl Read for FailingReader {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk on fire"))
            }
        }

        let out = Cursor::new(Vec::new());
        let mut proc = Processor::new(out, 96, inline_cfg(4096), compressor()).unwrap();
        let err = proc.submit_file(&mut FailingReader, false).unwrap_err();
        assert!(matches!(err, PackError::Io(_)));
    }
}
