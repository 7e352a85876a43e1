//! Block sources for devices, image files and memory buffers.

mod disk;
mod memory;
mod mmap;

pub use disk::DiskDevice;
pub use memory::MemoryDevice;
pub use mmap::MmapDevice;

use crate::traits::BlockSource;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpenMode {
    #[default]
    ReadOnly,
    ReadWrite,
}

/// A device opened from a path.
///
/// Read-only opens try a memory mapping first and fall back to plain file
/// I/O, which is what block device nodes always get.
pub enum Device {
    Mmap(MmapDevice),
    Disk(DiskDevice),
}

impl Device {
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> io::Result<Self> {
        let path = path.as_ref();
        match mode {
            OpenMode::ReadWrite => Ok(Device::Disk(DiskDevice::open_writable(path)?)),
            OpenMode::ReadOnly => match MmapDevice::open(path) {
                Ok(device) => Ok(Device::Mmap(device)),
                Err(err) => {
                    tracing::trace!(path = %path.display(), error = %err, "mmap unavailable, using file reads");
                    Ok(Device::Disk(DiskDevice::open(path)?))
                }
            },
        }
    }

    #[inline]
    pub fn is_mmap(&self) -> bool {
        matches!(self, Device::Mmap(_))
    }
}

impl BlockSource for Device {
    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        match self {
            Device::Mmap(d) => d.read_at(offset, buffer),
            Device::Disk(d) => d.read_at(offset, buffer),
        }
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        match self {
            Device::Mmap(d) => d.write_at(offset, data),
            Device::Disk(d) => d.write_at(offset, data),
        }
    }

    fn sync(&mut self) -> io::Result<()> {
        match self {
            Device::Mmap(d) => d.sync(),
            Device::Disk(d) => d.sync(),
        }
    }

    #[inline]
    fn size(&self) -> u64 {
        match self {
            Device::Mmap(d) => d.size(),
            Device::Disk(d) => d.size(),
        }
    }

    fn is_writable(&self) -> bool {
        match self {
            Device::Mmap(d) => d.is_writable(),
            Device::Disk(d) => d.is_writable(),
        }
    }
}

/// The byte range of a device that probing is confined to.
///
/// `size: None` extends the window to the end of the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceWindow {
    pub offset: u64,
    pub size: Option<u64>,
}

impl DeviceWindow {
    pub fn new(offset: u64, size: Option<u64>) -> Self {
        Self { offset, size }
    }
}
