//! Block device probing.
//!
//! Identifies filesystems, RAID members, encrypted containers and
//! partition tables by reading their on-disk metadata, without mounting
//! or otherwise trusting the device.
//!
//! ```
//! use blkprobe::{MemoryDevice, ProbeStatus, Session};
//!
//! let mut image = vec![0u8; 4 << 20];
//! image[1080..1082].copy_from_slice(&0xEF53u16.to_le_bytes());
//! image[1024 + 24] = 2; // 4 KiB blocks
//! image[1024 + 4..1024 + 8].copy_from_slice(&1024u32.to_le_bytes());
//!
//! let mut session = Session::new(MemoryDevice::new(image))?;
//! assert_eq!(session.do_safeprobe()?, ProbeStatus::Matched);
//! assert_eq!(session.lookup_value("TYPE")?.as_deref(), Some("ext2"));
//! assert_eq!(session.lookup_value("SIZE")?.as_deref(), Some("4194304"));
//! # Ok::<(), blkprobe::ProbeError>(())
//! ```

mod cache;
pub mod chain;
pub mod error;
pub mod flags;
pub mod io;
pub mod logging;
pub mod options;
pub mod partitions;
pub mod reader;
pub mod recognizer;
pub mod results;
pub mod session;
pub mod superblocks;
pub mod traits;
pub mod types;
pub mod wipe;

pub use chain::{Chain, FilterMode, Registry};
pub use error::{ProbeError, Result};
pub use flags::{PartitionFlags, SuperblockFlags};
pub use io::{Device, DeviceWindow, DiskDevice, MemoryDevice, MmapDevice, OpenMode};
pub use options::{Filter, ProbeOptions};
pub use reader::{ByteReader, CacheStats};
pub use recognizer::{Magic, MagicHit, ProbeContext, ProbeVerdict};
pub use results::{FieldEntry, ProbeResults};
pub use session::{ProbeStatus, Session};
pub use traits::{BlockSource, Recognizer};
pub use types::{ChainKind, Match, PartitionEntry, PartitionTable, Region, Usage};
pub use wipe::WipeRegion;
