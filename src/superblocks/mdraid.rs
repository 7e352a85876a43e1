//! Linux MD RAID members with version 1.1 and 1.2 superblocks.

use crate::error::Result;
use crate::recognizer::{Magic, MagicHit, ProbeContext, ProbeVerdict};
use crate::traits::Recognizer;
use crate::types::Usage;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};

const MD_SB_MAGIC: [u8; 4] = 0xa92b_4efc_u32.to_le_bytes();
const SUPERBLOCK_SIZE: usize = 256;
const CSUM_OFFSET: usize = 216;
/// Devices a 4 KiB superblock has room for.
const MAX_DEVS: u32 = 1920;

const MAGICS: &[Magic] = &[
    // v1.1: start of device
    Magic::new(&MD_SB_MAGIC, 0),
    // v1.2: 4 KiB from the start
    Magic::new(&MD_SB_MAGIC, 4096),
];

#[derive(Debug, Clone)]
pub struct MdSuperblock {
    pub major_version: u32,
    pub set_uuid: [u8; 16],
    pub set_name: [u8; 32],
    pub level: u32,
    pub size: u64,
    pub raid_disks: u32,
    pub data_offset: u64,
    pub data_size: u64,
    pub super_offset: u64,
    pub sb_csum: u32,
    pub max_dev: u32,
}

impl MdSuperblock {
    pub fn parse(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);

        cursor.set_position(4);
        let major_version = cursor.read_u32::<LittleEndian>()?;

        cursor.set_position(16);
        let mut set_uuid = [0u8; 16];
        let mut set_name = [0u8; 32];
        cursor.read_exact(&mut set_uuid)?;
        cursor.read_exact(&mut set_name)?;

        cursor.set_position(72);
        let level = cursor.read_u32::<LittleEndian>()?;
        cursor.set_position(80);
        let size = cursor.read_u64::<LittleEndian>()?;
        cursor.set_position(92);
        let raid_disks = cursor.read_u32::<LittleEndian>()?;

        cursor.set_position(128);
        let data_offset = cursor.read_u64::<LittleEndian>()?;
        let data_size = cursor.read_u64::<LittleEndian>()?;
        let super_offset = cursor.read_u64::<LittleEndian>()?;

        cursor.set_position(CSUM_OFFSET as u64);
        let sb_csum = cursor.read_u32::<LittleEndian>()?;
        let max_dev = cursor.read_u32::<LittleEndian>()?;

        Ok(Self {
            major_version,
            set_uuid,
            set_name,
            level,
            size,
            raid_disks,
            data_offset,
            data_size,
            super_offset,
            sb_csum,
            max_dev,
        })
    }

    /// Bytes covered by the checksum: the fixed part plus one u16 role per device.
    pub fn checksum_len(&self) -> Option<usize> {
        (self.max_dev <= MAX_DEVS).then(|| SUPERBLOCK_SIZE + self.max_dev as usize * 2)
    }
}

/// Sums the superblock as little-endian u32 words with `sb_csum` taken as
/// zero, then folds the carry back into the low word.
pub fn superblock_checksum(data: &[u8]) -> u32 {
    let mut words = data.chunks_exact(4);
    let mut sum: u64 = 0;
    for (i, word) in words.by_ref().enumerate() {
        if i * 4 != CSUM_OFFSET {
            sum += u64::from(LittleEndian::read_u32(word));
        }
    }
    if let [lo, hi, ..] = *words.remainder() {
        sum += u64::from(u16::from_le_bytes([lo, hi]));
    }
    (sum as u32).wrapping_add((sum >> 32) as u32)
}

pub struct MdRaidRecognizer;

impl Recognizer for MdRaidRecognizer {
    fn name(&self) -> &'static str {
        "linux_raid_member"
    }

    fn usage(&self) -> Option<Usage> {
        Some(Usage::Raid)
    }

    fn magics(&self) -> &[Magic] {
        MAGICS
    }

    fn probe(&self, ctx: &mut ProbeContext<'_>, hit: Option<&MagicHit>) -> Result<ProbeVerdict> {
        let Some(hit) = hit else {
            return Ok(ProbeVerdict::NoMatch);
        };
        let data = ctx.read(hit.offset as i64, SUPERBLOCK_SIZE)?;
        let Ok(sb) = MdSuperblock::parse(&data) else {
            return Ok(ProbeVerdict::NoMatch);
        };

        // The superblock records its own location in 512-byte sectors.
        if sb.major_version != 1 || sb.super_offset != hit.offset >> 9 {
            tracing::trace!(
                major = sb.major_version,
                super_offset = sb.super_offset,
                "md: superblock location mismatch"
            );
            return Ok(ProbeVerdict::NoMatch);
        }

        let Some(csum_len) = sb.checksum_len() else {
            return Ok(ProbeVerdict::NoMatch);
        };
        let covered = ctx.read(hit.offset as i64, csum_len)?;
        if superblock_checksum(&covered) != sb.sb_csum && !ctx.accept_bad_checksum() {
            tracing::trace!(stored = sb.sb_csum, "md: superblock checksum mismatch");
            return Ok(ProbeVerdict::NoMatch);
        }

        ctx.set_label(&sb.set_name);
        ctx.set_uuid(&sb.set_uuid);
        ctx.set_version(if hit.offset == 0 { "1.1" } else { "1.2" });
        if sb.size > 0 {
            ctx.set_content_size(sb.size.saturating_mul(512));
        }
        ctx.set_extent(hit.offset, SUPERBLOCK_SIZE as u64);

        Ok(ProbeVerdict::Match)
    }
}
