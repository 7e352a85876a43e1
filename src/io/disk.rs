//! File-backed block source for physical disks and image files.

use crate::traits::BlockSource;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A block source backed by an open file or block device node.
///
/// The file may be opened by the caller and handed over with
/// [`DiskDevice::from_file`]; the device takes ownership and releases it
/// on drop.
///
/// # Example
///
/// ```ignore
/// use blkprobe::io::DiskDevice;
/// use blkprobe::BlockSource;
///
/// let mut disk = DiskDevice::open("/dev/sda")?;
/// let mut sector = vec![0u8; 512];
/// disk.read_at(0, &mut sector)?;
/// ```
pub struct DiskDevice {
    file: File,
    size: u64,
    writable: bool,
}

impl DiskDevice {
    /// Opens `path` read-only.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::open_with(path.as_ref(), false)
    }

    /// Opens `path` for reading and writing; required for a real wipe.
    pub fn open_writable(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::open_with(path.as_ref(), true)
    }

    /// Takes ownership of an already opened file.
    ///
    /// `writable` must reflect how the file was opened; writes through a
    /// read-only descriptor fail with the OS error.
    pub fn from_file(mut file: File, writable: bool) -> io::Result<Self> {
        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        advise_random(&file);

        Ok(Self {
            file,
            size,
            writable,
        })
    }

    fn open_with(path: &Path, writable: bool) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(writable).open(path)?;
        Self::from_file(file, writable)
    }
}

#[cfg(target_os = "linux")]
fn advise_random(file: &File) {
    use rustix::fs::{Advice, fadvise};

    // Recognizers jump between the head and the tail of the device.
    let _ = fadvise(file, 0, None, Advice::Random);
}

#[cfg(not(target_os = "linux"))]
fn advise_random(_file: &File) {}

impl BlockSource for DiskDevice {
    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read(buffer)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "device is opened read-only",
            ));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)
    }

    fn sync(&mut self) -> io::Result<()> {
        if self.writable {
            self.file.flush()?;
            self.file.sync_all()?;
        }
        Ok(())
    }

    #[inline]
    fn size(&self) -> u64 {
        self.size
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}
