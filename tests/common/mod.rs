//! Shared image builders and test recognizers.

#![allow(dead_code)]

use blkprobe::{Magic, MagicHit, ProbeContext, ProbeVerdict, Recognizer, Result, Usage};
use std::io::{self, Write};
use tempfile::NamedTempFile;

pub const MIB: usize = 1024 * 1024;

pub const EXT_UUID: [u8; 16] = [
    0x3e, 0x6b, 0xe9, 0xde, 0x80, 0x1c, 0x4a, 0x3d, 0x9b, 0x2a, 0x4f, 0x51, 0x2e, 0x2c, 0x41, 0x9b,
];

// ============================================================================
// Recognizers
// ============================================================================

/// A recognizer matching a fixed magic, used to drive the engine.
pub struct TestRecognizer {
    name: &'static str,
    magics: Vec<Magic>,
    extent: Option<(u64, u64)>,
    content_size: Option<u64>,
    label: Option<&'static str>,
}

impl TestRecognizer {
    pub fn new(name: &'static str, magic: &'static [u8], offset: i64) -> Self {
        Self {
            name,
            magics: vec![Magic::new(magic, offset)],
            extent: None,
            content_size: None,
            label: None,
        }
    }

    pub fn with_extent(mut self, offset: u64, length: u64) -> Self {
        self.extent = Some((offset, length));
        self
    }

    pub fn with_content_size(mut self, size: u64) -> Self {
        self.content_size = Some(size);
        self
    }

    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }
}

impl Recognizer for TestRecognizer {
    fn name(&self) -> &'static str {
        self.name
    }

    fn usage(&self) -> Option<Usage> {
        Some(Usage::Filesystem)
    }

    fn magics(&self) -> &[Magic] {
        &self.magics
    }

    fn probe(&self, ctx: &mut ProbeContext<'_>, _hit: Option<&MagicHit>) -> Result<ProbeVerdict> {
        if let Some(label) = self.label {
            ctx.set_label(label.as_bytes());
        }
        if let Some((offset, length)) = self.extent {
            ctx.set_extent(offset, length);
        }
        if let Some(size) = self.content_size {
            ctx.set_content_size(size);
        }
        Ok(ProbeVerdict::Match)
    }
}

// ============================================================================
// Sources
// ============================================================================

/// An in-memory source whose reads fail at or beyond `fail_from`.
pub struct FailingSource {
    pub data: Vec<u8>,
    pub fail_from: u64,
}

impl blkprobe::BlockSource for FailingSource {
    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        if offset + buffer.len() as u64 > self.fail_from {
            return Err(io::Error::other("injected read failure"));
        }
        let start = offset as usize;
        let end = (start + buffer.len()).min(self.data.len());
        buffer[..end - start].copy_from_slice(&self.data[start..end]);
        Ok(end - start)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

pub fn write_temp_image(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    file
}

// ============================================================================
// Superblock images
// ============================================================================

fn put(data: &mut [u8], offset: usize, bytes: &[u8]) {
    data[offset..offset + bytes.len()].copy_from_slice(bytes);
}

/// An ext superblock with 4 KiB blocks covering the whole image.
pub fn ext_image(size: usize, compat: u32, incompat: u32, ro_compat: u32) -> Vec<u8> {
    let mut data = vec![0u8; size];
    let sb = 1024;
    put(&mut data, sb + 4, &((size / 4096) as u32).to_le_bytes());
    put(&mut data, sb + 24, &2u32.to_le_bytes());
    put(&mut data, sb + 0x38, &0xEF53u16.to_le_bytes());
    put(&mut data, sb + 62, &0u16.to_le_bytes());
    put(&mut data, sb + 76, &1u32.to_le_bytes());
    put(&mut data, sb + 92, &compat.to_le_bytes());
    put(&mut data, sb + 96, &incompat.to_le_bytes());
    put(&mut data, sb + 100, &ro_compat.to_le_bytes());
    put(&mut data, sb + 104, &EXT_UUID);
    put(&mut data, sb + 120, b"rootfs");
    data
}

/// ext4: journal plus extents and flex_bg.
pub fn ext4_image(size: usize) -> Vec<u8> {
    ext_image(size, 0x0004, 0x0002 | 0x0040 | 0x0200, 0x0001)
}

/// Sets `metadata_csum` and stores the superblock crc32c.
pub fn seal_ext_checksum(data: &mut [u8]) {
    let sb = 1024;
    let ro_compat = u32::from_le_bytes(data[sb + 100..sb + 104].try_into().unwrap()) | 0x0400;
    put(data, sb + 100, &ro_compat.to_le_bytes());
    let sum = !crc32c::crc32c(&data[sb..sb + 0x3FC]);
    put(data, sb + 0x3FC, &sum.to_le_bytes());
}

pub fn ext3_image(size: usize) -> Vec<u8> {
    ext_image(size, 0x0004, 0x0002, 0x0001)
}

pub fn ext2_image(size: usize) -> Vec<u8> {
    ext_image(size, 0, 0x0002, 0x0001)
}

/// A FAT16 volume of 64 Ki sectors.
pub fn vfat_image(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    put(&mut data, 0, &[0xEB, 0x3C, 0x90]);
    put(&mut data, 3, b"MSDOS5.0");
    put(&mut data, 11, &512u16.to_le_bytes());
    data[13] = 4;
    put(&mut data, 14, &4u16.to_le_bytes());
    data[16] = 2;
    put(&mut data, 17, &512u16.to_le_bytes());
    data[21] = 0xF8;
    put(&mut data, 22, &64u16.to_le_bytes());
    put(&mut data, 32, &65_536u32.to_le_bytes());
    data[38] = 0x29;
    put(&mut data, 39, &[0xEF, 0xBE, 0xAD, 0xDE]);
    put(&mut data, 43, b"BOOT       ");
    put(&mut data, 54, b"FAT16   ");
    put(&mut data, 510, &[0x55, 0xAA]);
    data
}

pub fn ntfs_image(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    put(&mut data, 0, &[0xEB, 0x52, 0x90]);
    put(&mut data, 3, b"NTFS    ");
    put(&mut data, 11, &512u16.to_le_bytes());
    data[13] = 8;
    data[21] = 0xF8;
    put(&mut data, 40, &((size / 512) as u64).to_le_bytes());
    put(&mut data, 48, &4u64.to_le_bytes());
    data[64] = 0xF6;
    put(&mut data, 72, &0x1A2B_3C4D_5E6F_7081u64.to_le_bytes());
    put(&mut data, 510, &[0x55, 0xAA]);
    data
}

/// A version 1 swap area with 4 KiB pages.
pub fn swap_image(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    put(&mut data, 1024, &1u32.to_le_bytes());
    put(&mut data, 1028, &((size / 4096 - 1) as u32).to_le_bytes());
    put(&mut data, 1036, &[0x5A; 16]);
    put(&mut data, 1052, b"swap0");
    put(&mut data, 4086, b"SWAPSPACE2");
    data
}

pub const LUKS_UUID: &str = "5d3c1b8e-2f4a-4c6b-9e1d-7a8b9c0d1e2f";

pub fn luks_image(size: usize, version: u16) -> Vec<u8> {
    let mut data = vec![0u8; size];
    put(&mut data, 0, b"LUKS\xba\xbe");
    put(&mut data, 6, &version.to_be_bytes());
    if version == 1 {
        put(&mut data, 8, b"aes");
        put(&mut data, 40, b"xts-plain64");
    } else {
        put(&mut data, 24, b"vault");
        put(&mut data, 208, b"backup");
    }
    put(&mut data, 168, LUKS_UUID.as_bytes());
    data
}

/// An MD superblock at `offset` (0 for v1.1, 4096 for v1.2).
pub fn put_md_superblock(data: &mut [u8], offset: usize) {
    put(data, offset, &0xa92b_4efcu32.to_le_bytes());
    put(data, offset + 4, &1u32.to_le_bytes());
    put(data, offset + 16, &[0x77; 16]);
    put(data, offset + 32, b"host:md0");
    put(data, offset + 72, &1u32.to_le_bytes());
    put(data, offset + 80, &2048u64.to_le_bytes());
    put(data, offset + 92, &2u32.to_le_bytes());
    put(data, offset + 144, &((offset / 512) as u64).to_le_bytes());
    seal_md_superblock(data, offset);
}

/// Recomputes `sb_csum` for a superblock with no device roles.
pub fn seal_md_superblock(data: &mut [u8], offset: usize) {
    let mut sum: u64 = 0;
    for (i, word) in data[offset..offset + 256].chunks_exact(4).enumerate() {
        if i * 4 != 216 {
            sum += u64::from(u32::from_le_bytes(word.try_into().unwrap()));
        }
    }
    let csum = (sum as u32).wrapping_add((sum >> 32) as u32);
    put(data, offset + 216, &csum.to_le_bytes());
}

pub fn md_image(size: usize, offset: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    put_md_superblock(&mut data, offset);
    data
}

// ============================================================================
// Partition table images
// ============================================================================

pub const DISK_ID: u32 = 0xA1B2_C3D4;

pub fn mbr_image(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    put(&mut data, 440, &DISK_ID.to_le_bytes());
    data[446] = 0x80;
    data[446 + 4] = 0x83;
    put(&mut data, 446 + 8, &2048u32.to_le_bytes());
    put(&mut data, 446 + 12, &4096u32.to_le_bytes());
    data[462 + 4] = 0x82;
    put(&mut data, 462 + 8, &6144u32.to_le_bytes());
    put(&mut data, 462 + 12, &1024u32.to_le_bytes());
    put(&mut data, 510, &[0x55, 0xAA]);
    data
}

/// Disk GUID `0d3b0a5c-1e27-4a98-8a4c-77c0c6b15e7f` in on-disk order.
pub const DISK_GUID: [u8; 16] = [
    0x5c, 0x0a, 0x3b, 0x0d, 0x27, 0x1e, 0x98, 0x4a, 0x8a, 0x4c, 0x77, 0xc0, 0xc6, 0xb1, 0x5e, 0x7f,
];
pub const DISK_GUID_STR: &str = "0d3b0a5c-1e27-4a98-8a4c-77c0c6b15e7f";

/// Linux filesystem data `0fc63daf-8483-4772-8e79-3d69d8477de4`.
const LINUX_FS_GUID: [u8; 16] = [
    0xaf, 0x3d, 0xc6, 0x0f, 0x83, 0x84, 0x72, 0x47, 0x8e, 0x79, 0x3d, 0x69, 0xd8, 0x47, 0x7d, 0xe4,
];
pub const LINUX_FS_GUID_STR: &str = "0fc63daf-8483-4772-8e79-3d69d8477de4";

const GPT_ENTRIES: usize = 128;
const GPT_ENTRY_SIZE: usize = 128;

fn gpt_entries() -> Vec<u8> {
    let mut entries = vec![0u8; GPT_ENTRIES * GPT_ENTRY_SIZE];
    put(&mut entries, 0, &LINUX_FS_GUID);
    put(&mut entries, 16, &[0x42; 16]);
    put(&mut entries, 32, &40u64.to_le_bytes());
    put(&mut entries, 40, &1000u64.to_le_bytes());
    for (i, c) in "root".encode_utf16().enumerate() {
        put(&mut entries, 56 + i * 2, &c.to_le_bytes());
    }
    entries
}

fn gpt_header(my_lba: u64, alternate: u64, entries_lba: u64, last_lba: u64, entries_crc: u32) -> Vec<u8> {
    let mut header = vec![0u8; 512];
    put(&mut header, 0, b"EFI PART");
    put(&mut header, 8, &0x0001_0000u32.to_le_bytes());
    put(&mut header, 12, &92u32.to_le_bytes());
    put(&mut header, 24, &my_lba.to_le_bytes());
    put(&mut header, 32, &alternate.to_le_bytes());
    put(&mut header, 40, &34u64.to_le_bytes());
    put(&mut header, 48, &(last_lba - 33).to_le_bytes());
    put(&mut header, 56, &DISK_GUID);
    put(&mut header, 72, &entries_lba.to_le_bytes());
    put(&mut header, 80, &(GPT_ENTRIES as u32).to_le_bytes());
    put(&mut header, 84, &(GPT_ENTRY_SIZE as u32).to_le_bytes());
    put(&mut header, 88, &entries_crc.to_le_bytes());
    let crc = crc32fast::hash(&header[..92]);
    put(&mut header, 16, &crc.to_le_bytes());
    header
}

/// A GPT disk with protective MBR, primary and backup headers.
pub fn gpt_image(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    let last_lba = (size / 512 - 1) as u64;

    data[446 + 4] = 0xEE;
    put(&mut data, 446 + 8, &1u32.to_le_bytes());
    put(&mut data, 446 + 12, &(last_lba as u32).to_le_bytes());
    put(&mut data, 510, &[0x55, 0xAA]);

    let entries = gpt_entries();
    let entries_crc = crc32fast::hash(&entries);

    put(&mut data, 512, &gpt_header(1, last_lba, 2, last_lba, entries_crc));
    put(&mut data, 1024, &entries);

    let backup_entries_lba = last_lba - 32;
    put(&mut data, (backup_entries_lba * 512) as usize, &entries);
    put(
        &mut data,
        (last_lba * 512) as usize,
        &gpt_header(last_lba, 1, backup_entries_lba, last_lba, entries_crc),
    );
    data
}
