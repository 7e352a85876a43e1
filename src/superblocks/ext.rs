//! ext2, ext3 and ext4.
//!
//! The three share one superblock layout. Which type a volume is follows
//! from its feature bits, so each type is a separate recognizer that
//! accepts only the feature combinations belonging to it.

use crate::error::Result;
use crate::recognizer::{Magic, MagicHit, ProbeContext, ProbeVerdict};
use crate::traits::Recognizer;
use crate::types::Usage;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor};

pub const SUPERBLOCK_OFFSET: u64 = 1024;
pub const SUPERBLOCK_SIZE: usize = 1024;
const MAGIC_OFFSET: i64 = SUPERBLOCK_OFFSET as i64 + 0x38;

const COMPAT_HAS_JOURNAL: u32 = 0x0004;

const INCOMPAT_FILETYPE: u32 = 0x0002;
const INCOMPAT_RECOVER: u32 = 0x0004;
const INCOMPAT_JOURNAL_DEV: u32 = 0x0008;
const INCOMPAT_META_BG: u32 = 0x0010;
const INCOMPAT_64BIT: u32 = 0x0080;

const RO_COMPAT_SPARSE_SUPER: u32 = 0x0001;
const RO_COMPAT_LARGE_FILE: u32 = 0x0002;
const RO_COMPAT_BTREE_DIR: u32 = 0x0004;
const RO_COMPAT_METADATA_CSUM: u32 = 0x0400;

const CHECKSUM_OFFSET: usize = 0x3FC;

const EXT2_INCOMPAT_SUPP: u32 = INCOMPAT_FILETYPE | INCOMPAT_META_BG;
const EXT3_INCOMPAT_SUPP: u32 = INCOMPAT_FILETYPE | INCOMPAT_RECOVER | INCOMPAT_META_BG;
const EXT2_RO_COMPAT_SUPP: u32 = RO_COMPAT_SPARSE_SUPER | RO_COMPAT_LARGE_FILE | RO_COMPAT_BTREE_DIR;

const MAGICS: &[Magic] = &[Magic::new(&[0x53, 0xEF], MAGIC_OFFSET)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtKind {
    Ext2,
    Ext3,
    Ext4,
}

#[derive(Debug, Clone)]
pub struct ExtSuperblock {
    pub blocks_count: u64,
    pub log_block_size: u32,
    pub rev_level: u32,
    pub minor_rev_level: u16,
    pub feature_compat: u32,
    pub feature_incompat: u32,
    pub feature_ro_compat: u32,
    pub uuid: [u8; 16],
    pub volume_name: [u8; 16],
    pub checksum: u32,
}

impl ExtSuperblock {
    pub fn parse(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);

        cursor.set_position(4);
        let blocks_count_lo = cursor.read_u32::<LittleEndian>()?;

        cursor.set_position(24);
        let log_block_size = cursor.read_u32::<LittleEndian>()?;

        cursor.set_position(62);
        let minor_rev_level = cursor.read_u16::<LittleEndian>()?;

        cursor.set_position(76);
        let rev_level = cursor.read_u32::<LittleEndian>()?;

        cursor.set_position(92);
        let feature_compat = cursor.read_u32::<LittleEndian>()?;
        let feature_incompat = cursor.read_u32::<LittleEndian>()?;
        let feature_ro_compat = cursor.read_u32::<LittleEndian>()?;

        let mut uuid = [0u8; 16];
        let mut volume_name = [0u8; 16];
        io::Read::read_exact(&mut cursor, &mut uuid)?;
        io::Read::read_exact(&mut cursor, &mut volume_name)?;

        cursor.set_position(0x150);
        let blocks_count_hi = cursor.read_u32::<LittleEndian>()?;

        cursor.set_position(CHECKSUM_OFFSET as u64);
        let checksum = cursor.read_u32::<LittleEndian>()?;

        let blocks_count = if feature_incompat & INCOMPAT_64BIT != 0 {
            (u64::from(blocks_count_hi) << 32) | u64::from(blocks_count_lo)
        } else {
            u64::from(blocks_count_lo)
        };

        Ok(Self {
            blocks_count,
            log_block_size,
            rev_level,
            minor_rev_level,
            feature_compat,
            feature_incompat,
            feature_ro_compat,
            uuid,
            volume_name,
            checksum,
        })
    }

    /// Block size in bytes, if the encoded shift is sane (1 KiB to 64 KiB).
    pub fn block_size(&self) -> Option<u64> {
        (self.log_block_size <= 6).then(|| 1024u64 << self.log_block_size)
    }

    /// Checks the crc32c over the superblock when `metadata_csum` is set.
    /// Superblocks without the feature carry no checksum and always pass.
    pub fn checksum_matches(&self, raw: &[u8]) -> bool {
        if self.feature_ro_compat & RO_COMPAT_METADATA_CSUM == 0 {
            return true;
        }
        raw.get(..CHECKSUM_OFFSET)
            .is_some_and(|covered| !crc32c::crc32c(covered) == self.checksum)
    }

    fn has_journal(&self) -> bool {
        self.feature_compat & COMPAT_HAS_JOURNAL != 0
    }

    /// Which of the three types this superblock describes, if any.
    pub fn kind(&self) -> Option<ExtKind> {
        if self.feature_incompat & INCOMPAT_JOURNAL_DEV != 0 {
            return None;
        }

        let ro_unsupported = self.feature_ro_compat & !EXT2_RO_COMPAT_SUPP != 0;
        if self.has_journal() {
            let incompat_unsupported = self.feature_incompat & !EXT3_INCOMPAT_SUPP != 0;
            if ro_unsupported || incompat_unsupported {
                Some(ExtKind::Ext4)
            } else {
                Some(ExtKind::Ext3)
            }
        } else {
            let incompat_unsupported = self.feature_incompat & !EXT2_INCOMPAT_SUPP != 0;
            if ro_unsupported || incompat_unsupported {
                Some(ExtKind::Ext4)
            } else {
                Some(ExtKind::Ext2)
            }
        }
    }
}

pub struct ExtRecognizer {
    kind: ExtKind,
}

impl ExtRecognizer {
    pub const fn new(kind: ExtKind) -> Self {
        Self { kind }
    }
}

impl Recognizer for ExtRecognizer {
    fn name(&self) -> &'static str {
        match self.kind {
            ExtKind::Ext2 => "ext2",
            ExtKind::Ext3 => "ext3",
            ExtKind::Ext4 => "ext4",
        }
    }

    fn usage(&self) -> Option<Usage> {
        Some(Usage::Filesystem)
    }

    fn magics(&self) -> &[Magic] {
        MAGICS
    }

    fn probe(&self, ctx: &mut ProbeContext<'_>, _hit: Option<&MagicHit>) -> Result<ProbeVerdict> {
        let data = ctx.read(SUPERBLOCK_OFFSET as i64, SUPERBLOCK_SIZE)?;
        let Ok(sb) = ExtSuperblock::parse(&data) else {
            return Ok(ProbeVerdict::NoMatch);
        };
        let Some(block_size) = sb.block_size() else {
            tracing::trace!(log_block_size = sb.log_block_size, "ext: bad block size");
            return Ok(ProbeVerdict::NoMatch);
        };
        if sb.kind() != Some(self.kind) {
            return Ok(ProbeVerdict::NoMatch);
        }
        if !sb.checksum_matches(&data) && !ctx.accept_bad_checksum() {
            tracing::trace!(stored = sb.checksum, "ext: superblock checksum mismatch");
            return Ok(ProbeVerdict::NoMatch);
        }

        ctx.set_label(&sb.volume_name);
        ctx.set_uuid(&sb.uuid);
        if self.kind == ExtKind::Ext3 {
            ctx.set_sec_type("ext2");
        }
        ctx.set_version(format!("{}.{}", sb.rev_level, sb.minor_rev_level));
        ctx.set_fs_geometry(block_size, sb.blocks_count);
        ctx.set_extent(SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE as u64);

        Ok(ProbeVerdict::Match)
    }
}
