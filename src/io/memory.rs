use crate::traits::BlockSource;
use std::io;

/// An in-memory device image.
///
/// Used for probing buffers that never touch a file, such as images
/// assembled by tests or fuzzers.
#[derive(Debug, Clone, Default)]
pub struct MemoryDevice {
    data: Vec<u8>,
    writable: bool,
}

impl MemoryDevice {
    /// Wraps `data` as a read-only device.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            writable: false,
        }
    }

    /// Wraps `data` as a writable device.
    pub fn writable(data: Vec<u8>) -> Self {
        Self {
            data,
            writable: true,
        }
    }

    /// A read-only device of `size` zero bytes.
    pub fn zeroed(size: usize) -> Self {
        Self::new(vec![0; size])
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl BlockSource for MemoryDevice {
    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.data.len() {
            return Ok(0);
        }
        let end = start.saturating_add(buffer.len()).min(self.data.len());
        let len = end - start;
        buffer[..len].copy_from_slice(&self.data[start..end]);
        Ok(len)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "device is opened read-only",
            ));
        }
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset overflow"))?;
        let end = start
            .checked_add(data.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::WriteZero, "write past end of device"))?;
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    #[inline]
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_read_at_end() {
        let mut device = MemoryDevice::new(vec![7; 10]);
        let mut buffer = [0u8; 8];
        assert_eq!(device.read_at(6, &mut buffer).unwrap(), 4);
        assert_eq!(&buffer[..4], &[7; 4]);
        assert_eq!(device.read_at(10, &mut buffer).unwrap(), 0);
    }

    #[test]
    fn write_respects_mode_and_bounds() {
        let mut ro = MemoryDevice::zeroed(16);
        assert!(ro.write_at(0, &[1]).is_err());

        let mut rw = MemoryDevice::writable(vec![0; 16]);
        rw.write_at(14, &[1, 2]).unwrap();
        assert_eq!(&rw.as_slice()[14..], &[1, 2]);
        assert!(rw.write_at(15, &[1, 2]).is_err());
    }
}
