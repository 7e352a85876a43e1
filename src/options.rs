//! Session configuration, loadable from JSON.

use crate::chain::FilterMode;
use crate::error::{ProbeError, Result};
use crate::flags::{PartitionFlags, SuperblockFlags};
use crate::io::DeviceWindow;
use crate::reader::DEFAULT_CACHE_BLOCKS;
use crate::types::Usage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Recognizer selection applied to a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "kebab-case")]
pub enum Filter {
    Type { mode: FilterMode, names: Vec<String> },
    Usage { mode: FilterMode, usages: Vec<Usage> },
}

/// Options for a probing session.
///
/// Flag fields hold raw bitmasks and are validated when a session is
/// built.
///
/// ```
/// use blkprobe::{ProbeOptions, PartitionFlags};
///
/// let options = ProbeOptions::default()
///     .with_partitions(true)
///     .with_partitions_flags(PartitionFlags::ENTRY_DETAILS);
/// assert!(options.partitions);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeOptions {
    /// Probe the superblocks chain
    pub superblocks: bool,
    /// Probe the partitions chain
    pub partitions: bool,
    pub superblocks_flags: u32,
    pub partitions_flags: u32,
    pub superblocks_filter: Option<Filter>,
    pub partitions_filter: Option<Filter>,
    /// Byte range of the device to probe
    pub window: DeviceWindow,
    /// Capacity of the block cache, in blocks
    pub cache_blocks: usize,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            superblocks: true,
            partitions: false,
            superblocks_flags: SuperblockFlags::DEFAULT.bits(),
            partitions_flags: PartitionFlags::DEFAULT.bits(),
            superblocks_filter: None,
            partitions_filter: None,
            window: DeviceWindow::default(),
            cache_blocks: DEFAULT_CACHE_BLOCKS,
        }
    }
}

impl ProbeOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ProbeError::Config(e.to_string()))
    }

    /// Reads options from a JSON file; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ProbeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn superblock_flags(&self) -> Result<SuperblockFlags> {
        SuperblockFlags::from_raw(self.superblocks_flags)
    }

    pub fn partition_flags(&self) -> Result<PartitionFlags> {
        PartitionFlags::from_raw(self.partitions_flags)
    }

    pub fn with_superblocks(mut self, enabled: bool) -> Self {
        self.superblocks = enabled;
        self
    }

    pub fn with_partitions(mut self, enabled: bool) -> Self {
        self.partitions = enabled;
        self
    }

    pub fn with_superblocks_flags(mut self, flags: SuperblockFlags) -> Self {
        self.superblocks_flags = flags.bits();
        self
    }

    pub fn with_partitions_flags(mut self, flags: PartitionFlags) -> Self {
        self.partitions_flags = flags.bits();
        self
    }

    pub fn with_superblocks_filter(mut self, filter: Filter) -> Self {
        self.superblocks_filter = Some(filter);
        self
    }

    pub fn with_partitions_filter(mut self, filter: Filter) -> Self {
        self.partitions_filter = Some(filter);
        self
    }

    pub fn with_window(mut self, window: DeviceWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_cache_blocks(mut self, blocks: usize) -> Self {
        self.cache_blocks = blocks;
        self
    }
}
