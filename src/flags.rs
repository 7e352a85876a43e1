//! Per-chain flag bitmasks selecting which fields recognizers report.

use crate::error::{ProbeError, Result};
use crate::types::ChainKind;
use bitflags::bitflags;

bitflags! {
    /// Fields the superblocks chain reports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SuperblockFlags: u32 {
        /// Normalized `LABEL`.
        const LABEL    = 1 << 1;
        /// Undecoded `LABEL_RAW`.
        const LABELRAW = 1 << 2;
        /// Normalized `UUID`.
        const UUID     = 1 << 3;
        /// Undecoded `UUID_RAW`.
        const UUIDRAW  = 1 << 4;
        const TYPE     = 1 << 5;
        /// Secondary type, e.g. `ext2` for an ext3 volume.
        const SECTYPE  = 1 << 6;
        const USAGE    = 1 << 7;
        const VERSION  = 1 << 8;
        /// `SBMAGIC` and `SBMAGIC_OFFSET`.
        const MAGIC    = 1 << 9;
        /// Accept superblocks whose checksum does not verify.
        const BADCSUM  = 1 << 10;
        /// `FSSIZE`, `FSLASTBLOCK` and `FSBLOCKSIZE`.
        const FSINFO   = 1 << 11;
    }
}

bitflags! {
    /// Fields and behavior of the partitions chain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartitionFlags: u32 {
        /// Accept a GPT header even without a protective MBR.
        const FORCE_GPT     = 1 << 1;
        /// Decode individual partition entries.
        const ENTRY_DETAILS = 1 << 2;
        /// `PTMAGIC` and `PTMAGIC_OFFSET`.
        const MAGIC         = 1 << 3;
    }
}

impl SuperblockFlags {
    pub const DEFAULT: Self = Self::LABEL
        .union(Self::UUID)
        .union(Self::TYPE)
        .union(Self::SECTYPE);

    /// Validates a raw bitmask coming from configuration or the CLI.
    pub fn from_raw(bits: u32) -> Result<Self> {
        Self::from_bits(bits).ok_or(ProbeError::InvalidFlags {
            chain: ChainKind::Superblocks.name(),
            bits,
        })
    }
}

impl Default for SuperblockFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl PartitionFlags {
    pub const DEFAULT: Self = Self::empty();

    pub fn from_raw(bits: u32) -> Result<Self> {
        Self::from_bits(bits).ok_or(ProbeError::InvalidFlags {
            chain: ChainKind::Partitions.name(),
            bits,
        })
    }
}

impl Default for PartitionFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}
