//! Windowed, cached byte access to a [`BlockSource`].

use crate::cache::BlockCache;
use crate::error::{ProbeError, Result};
use crate::io::DeviceWindow;
use crate::traits::BlockSource;
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use std::io;

pub const DEFAULT_BLOCK_SIZE: usize = 4096;
pub const DEFAULT_CACHE_BLOCKS: usize = 1024;

/// Counters describing how reads were served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Blocks served from the cache.
    pub hits: u64,
    /// Blocks that had to be fetched.
    pub misses: u64,
    /// Calls made into the underlying source.
    pub source_reads: u64,
}

/// Reads byte ranges of the probed window through a block cache.
///
/// Offsets are relative to the start of the window. Negative offsets
/// count back from the end of the window, so `read(-512, 512)` returns
/// the last sector. Repeated reads of the same range are served from
/// memory until [`clear_cache`](Self::clear_cache) or a write touching it.
pub struct ByteReader {
    source: Box<dyn BlockSource>,
    begin: u64,
    size: u64,
    block_size: usize,
    cache: BlockCache,
    stats: CacheStats,
}

impl ByteReader {
    pub fn new(source: Box<dyn BlockSource>, window: DeviceWindow) -> Result<Self> {
        Self::with_capacity(source, window, DEFAULT_CACHE_BLOCKS)
    }

    pub fn with_capacity(
        source: Box<dyn BlockSource>,
        window: DeviceWindow,
        cache_blocks: usize,
    ) -> Result<Self> {
        let device_size = source.size();
        let available = device_size.checked_sub(window.offset).ok_or(ProbeError::OutOfBounds {
            offset: window.offset as i64,
            length: 0,
            size: device_size,
        })?;
        let size = match window.size {
            Some(size) if size > available => {
                return Err(ProbeError::OutOfBounds {
                    offset: window.offset as i64,
                    length: usize::try_from(size).unwrap_or(usize::MAX),
                    size: device_size,
                });
            }
            Some(size) => size,
            None => available,
        };

        Ok(Self {
            source,
            begin: window.offset,
            size,
            block_size: DEFAULT_BLOCK_SIZE,
            cache: BlockCache::new(cache_blocks),
            stats: CacheStats::default(),
        })
    }

    /// Size of the probed window in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn is_writable(&self) -> bool {
        self.source.is_writable()
    }

    /// Returns `length` bytes at `offset`.
    ///
    /// Fails with [`ProbeError::OutOfBounds`] when any part of the range
    /// falls outside the window; a short read from the source is an
    /// [`ProbeError::Io`].
    pub fn read(&mut self, offset: i64, length: usize) -> Result<Bytes> {
        let start = self.resolve(offset, length)?;
        if length == 0 {
            return Ok(Bytes::new());
        }

        let bs = self.block_size as u64;
        let end = start + length as u64;
        let first = start / bs;
        let last = (end - 1) / bs;
        let blocks = self.load_blocks(first, last)?;

        let head = (start - first * bs) as usize;
        if blocks.len() == 1 {
            return Ok(blocks[0].slice(head..head + length));
        }

        let mut out = BytesMut::with_capacity(length);
        for (i, block) in blocks.iter().enumerate() {
            let from = if i == 0 { head } else { 0 };
            let to = if i == blocks.len() - 1 {
                (end - last * bs) as usize
            } else {
                block.len()
            };
            out.extend_from_slice(&block[from..to]);
        }
        Ok(out.freeze())
    }

    /// Overwrites `length` bytes at `offset` with zeros.
    pub fn zero(&mut self, offset: u64, length: usize) -> Result<()> {
        let start = self.resolve(offset as i64, length)?;
        if length == 0 {
            return Ok(());
        }

        let zeros = vec![0u8; length];
        self.source
            .write_at(self.begin + start, &zeros)
            .map_err(|e| ProbeError::io(start, e))?;

        let bs = self.block_size as u64;
        self.cache
            .invalidate(start / bs, (start + length as u64 - 1) / bs);
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.source.sync().map_err(|e| ProbeError::io(0, e))
    }

    pub fn clear_cache(&mut self) {
        tracing::trace!(blocks = self.cache.len(), "dropping cached blocks");
        self.cache.clear();
    }

    fn resolve(&self, offset: i64, length: usize) -> Result<u64> {
        let out_of_bounds = || ProbeError::OutOfBounds {
            offset,
            length,
            size: self.size,
        };

        let start = if offset < 0 {
            self.size
                .checked_sub(offset.unsigned_abs())
                .ok_or_else(out_of_bounds)?
        } else {
            offset as u64
        };

        match start.checked_add(length as u64) {
            Some(end) if end <= self.size => Ok(start),
            _ => Err(out_of_bounds()),
        }
    }

    /// Collects blocks `first..=last`, fetching each contiguous run of
    /// missing blocks with a single source read.
    fn load_blocks(&mut self, first: u64, last: u64) -> Result<Vec<Bytes>> {
        let mut blocks = Vec::with_capacity((last - first + 1) as usize);
        let mut index = first;

        while index <= last {
            if let Some(block) = self.cache.get(index) {
                self.stats.hits += 1;
                blocks.push(block);
                index += 1;
                continue;
            }

            let mut run_end = index;
            while run_end < last && !self.cache.contains(run_end + 1) {
                run_end += 1;
            }
            self.stats.misses += run_end - index + 1;

            let data = self.fetch(index, run_end)?;
            let bs = self.block_size;
            for (n, chunk_start) in (0..data.len()).step_by(bs).enumerate() {
                let chunk_end = (chunk_start + bs).min(data.len());
                let block = data.slice(chunk_start..chunk_end);
                self.cache.insert(index + n as u64, block.clone());
                blocks.push(block);
            }
            index = run_end + 1;
        }

        Ok(blocks)
    }

    fn fetch(&mut self, first: u64, last: u64) -> Result<Bytes> {
        let bs = self.block_size as u64;
        let start = first * bs;
        let end = ((last + 1) * bs).min(self.size);
        let mut buffer = vec![0u8; (end - start) as usize];

        self.stats.source_reads += 1;
        tracing::trace!(offset = start, length = buffer.len(), "device read");

        let mut filled = 0;
        while filled < buffer.len() {
            let at = start + filled as u64;
            match self.source.read_at(self.begin + at, &mut buffer[filled..]) {
                Ok(0) => {
                    return Err(ProbeError::io(
                        at,
                        io::Error::new(io::ErrorKind::UnexpectedEof, "device ended early"),
                    ));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(ProbeError::io(at, e)),
            }
        }

        Ok(Bytes::from(buffer))
    }
}
