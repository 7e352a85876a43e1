//! Read-only memory-mapped block source for regular image files.

use crate::traits::BlockSource;
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::Path;

pub struct MmapDevice {
    mmap: Mmap,
    size: u64,
}

impl MmapDevice {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let size = file.seek(SeekFrom::End(0))?;

        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot mmap empty file",
            ));
        }

        // SAFETY: the mapping is read-only and lives no longer than `self`.
        // Concurrent truncation by another process is outside our control.
        let mmap = unsafe { Mmap::map(&file) }?;

        if mmap.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "mmap returned empty mapping (block device not supported)",
            ));
        }

        #[cfg(target_os = "linux")]
        {
            use memmap2::Advice;
            let _ = mmap.advise(Advice::Random);
        }

        Ok(Self { mmap, size })
    }

    #[inline]
    pub fn slice(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        if start >= self.mmap.len() {
            return None;
        }
        let end = start.saturating_add(len).min(self.mmap.len());
        Some(&self.mmap[start..end])
    }
}

impl BlockSource for MmapDevice {
    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        match self.slice(offset, buffer.len()) {
            Some(slice) => {
                let len = slice.len();
                buffer[..len].copy_from_slice(slice);
                Ok(len)
            }
            None => Ok(0),
        }
    }

    #[inline]
    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_mmap_device_basic() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let test_data = b"Hello, World! This is test data for MmapDevice.";
        temp_file.write_all(test_data).unwrap();
        temp_file.flush().unwrap();

        let mut device = MmapDevice::open(temp_file.path()).unwrap();
        assert_eq!(device.size(), test_data.len() as u64);
        assert_eq!(device.slice(0, 13).unwrap(), b"Hello, World!");

        let mut tail = vec![0u8; 32];
        let n = device.read_at(40, &mut tail).unwrap();
        assert_eq!(n, test_data.len() - 40);
        assert_eq!(device.read_at(4096, &mut tail).unwrap(), 0);
    }

    #[test]
    fn test_mmap_device_empty_file() {
        let temp_file = NamedTempFile::new().unwrap();
        assert!(MmapDevice::open(temp_file.path()).is_err());
    }

    #[test]
    fn test_mmap_device_is_read_only() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(&[1u8; 16]).unwrap();
        temp_file.flush().unwrap();

        let mut device = MmapDevice::open(temp_file.path()).unwrap();
        assert!(!device.is_writable());
        assert!(device.write_at(0, &[0]).is_err());
    }
}
