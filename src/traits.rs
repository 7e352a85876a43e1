//! Core traits defining the two seams of the probing engine.
//!
//! [`BlockSource`] abstracts the device being probed so the same engine
//! works on block devices, disk images and in-memory buffers.
//! [`Recognizer`] is implemented once per on-disk format and plugged into
//! a [`Chain`](crate::Chain).

use crate::error::Result;
use crate::recognizer::{Magic, MagicHit, ProbeContext, ProbeVerdict};
use crate::types::Usage;
use std::io;

/// A seekable source of raw device bytes, optionally writable.
///
/// # Example
///
/// ```ignore
/// struct Nbd { /* ... */ }
///
/// impl BlockSource for Nbd {
///     fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
///         // Fetch from the remote export
///     }
///
///     fn size(&self) -> u64 {
///         // Export size in bytes
///     }
/// }
/// ```
pub trait BlockSource: Send {
    /// Reads bytes at `offset` into `buffer`.
    ///
    /// Returns the number of bytes read, which may be less than
    /// `buffer.len()`; zero means end of source.
    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize>;

    /// Writes all of `data` at `offset`.
    fn write_at(&mut self, _offset: u64, _data: &[u8]) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "device is opened read-only",
        ))
    }

    /// Flushes pending writes to stable storage.
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Total size of the source in bytes.
    fn size(&self) -> u64;

    fn is_writable(&self) -> bool {
        false
    }
}

impl<T: BlockSource + ?Sized> BlockSource for Box<T> {
    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(offset, buffer)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        (**self).write_at(offset, data)
    }

    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }

    fn size(&self) -> u64 {
        (**self).size()
    }

    fn is_writable(&self) -> bool {
        (**self).is_writable()
    }
}

/// Identification logic for one on-disk format.
///
/// The session tests [`magics`](Recognizer::magics) first; `probe` runs
/// only on a magic hit (or always, for a recognizer without magics) and
/// must read nothing beyond a bounded region around its metadata.
/// Recognizers are shared by every session in the process, so they must
/// be immutable.
pub trait Recognizer: Send + Sync {
    /// Type name reported as `TYPE` or `PTTYPE`.
    fn name(&self) -> &'static str;

    /// Usage class; `None` for partition tables.
    fn usage(&self) -> Option<Usage>;

    /// Candidate magic strings, tried in order. The first hit wins.
    fn magics(&self) -> &[Magic] {
        &[]
    }

    /// Devices smaller than this are never tested.
    fn min_size(&self) -> u64 {
        0
    }

    /// Validates the structure behind the magic and records its fields.
    fn probe(&self, ctx: &mut ProbeContext<'_>, hit: Option<&MagicHit>) -> Result<ProbeVerdict>;
}
