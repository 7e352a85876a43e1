//! Value types shared by the probing engine.

use crate::results::FieldEntry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Usage class of a superblock recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Usage {
    Filesystem,
    Raid,
    Crypto,
    Other,
}

impl Usage {
    pub const ALL: [Usage; 4] = [Usage::Filesystem, Usage::Raid, Usage::Crypto, Usage::Other];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Usage::Filesystem => "filesystem",
            Usage::Raid => "raid",
            Usage::Crypto => "crypto",
            Usage::Other => "other",
        }
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Usage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Usage::ALL
            .into_iter()
            .find(|u| u.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown usage '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Superblocks,
    Partitions,
}

impl ChainKind {
    /// Chains in probing order.
    pub const ORDER: [ChainKind; 2] = [ChainKind::Superblocks, ChainKind::Partitions];

    pub const fn name(&self) -> &'static str {
        match self {
            ChainKind::Superblocks => "superblocks",
            ChainKind::Partitions => "partitions",
        }
    }
}

/// A byte range of the probed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Region {
    pub offset: u64,
    pub length: u64,
}

impl Region {
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    #[inline]
    pub const fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.length > 0
            && other.length > 0
            && self.offset < other.end()
            && other.offset < self.end()
    }
}

/// One entry of a partition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionEntry {
    /// 1-based partition number.
    pub number: u32,
    /// Start offset in bytes.
    pub start: u64,
    /// Length in bytes.
    pub size: u64,
    /// MBR type byte as `0x83`, or the GPT type GUID.
    pub type_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub bootable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionTable {
    pub pt_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub entries: Vec<PartitionEntry>,
}

/// A signature accepted by a recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub chain: ChainKind,
    pub type_name: &'static str,
    pub usage: Option<Usage>,
    pub label: Option<String>,
    pub uuid: Option<String>,
    pub sec_type: Option<&'static str>,
    pub version: Option<String>,
    /// Location of the magic bytes; this is what a wipe erases.
    pub magic: Option<Region>,
    /// Bytes of metadata the signature claims; used for conflict checks.
    pub extent: Region,
    /// Size of the content the signature describes, if it declares one.
    pub content_size: Option<u64>,
    pub partitions: Option<PartitionTable>,
    pub(crate) fields: Vec<FieldEntry>,
}

impl Match {
    /// Fields reported for this signature, in the order they were set.
    pub fn fields(&self) -> &[FieldEntry] {
        &self.fields
    }

    /// Two matches conflict when they name different types and claim
    /// overlapping bytes.
    pub fn conflicts_with(&self, other: &Match) -> bool {
        self.type_name != other.type_name && self.extent.overlaps(&other.extent)
    }
}
