//! Linux swap areas.
//!
//! The signature sits in the last ten bytes of the first page, so its
//! offset depends on the page size the area was created with.

use crate::error::Result;
use crate::recognizer::{Magic, MagicHit, ProbeContext, ProbeVerdict};
use crate::traits::Recognizer;
use crate::types::Usage;
use byteorder::{ByteOrder, LittleEndian};

const HEADER_OFFSET: u64 = 1024;
const HEADER_SIZE: usize = 44;
const SIGNATURE_LEN: u64 = 10;

const MAGICS: &[Magic] = &[
    Magic::new(b"SWAPSPACE2", 0x0ff6),
    Magic::new(b"SWAPSPACE2", 0x1ff6),
    Magic::new(b"SWAPSPACE2", 0x3ff6),
    Magic::new(b"SWAPSPACE2", 0x7ff6),
    Magic::new(b"SWAPSPACE2", 0xfff6),
    Magic::new(b"SWAP-SPACE", 0x0ff6),
    Magic::new(b"SWAP-SPACE", 0x1ff6),
    Magic::new(b"SWAP-SPACE", 0x3ff6),
    Magic::new(b"SWAP-SPACE", 0x7ff6),
    Magic::new(b"SWAP-SPACE", 0xfff6),
];

/// Version 1 header following the boot block.
#[derive(Debug, Clone)]
pub struct SwapHeader {
    pub version: u32,
    pub last_page: u32,
    pub uuid: [u8; 16],
    pub volume_name: [u8; 16],
}

impl SwapHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_SIZE {
            return None;
        }
        let mut uuid = [0u8; 16];
        let mut volume_name = [0u8; 16];
        uuid.copy_from_slice(&data[12..28]);
        volume_name.copy_from_slice(&data[28..44]);

        Some(Self {
            version: LittleEndian::read_u32(&data[0..4]),
            last_page: LittleEndian::read_u32(&data[4..8]),
            uuid,
            volume_name,
        })
    }
}

pub struct SwapRecognizer;

impl Recognizer for SwapRecognizer {
    fn name(&self) -> &'static str {
        "swap"
    }

    fn usage(&self) -> Option<Usage> {
        Some(Usage::Other)
    }

    fn magics(&self) -> &[Magic] {
        MAGICS
    }

    fn probe(&self, ctx: &mut ProbeContext<'_>, hit: Option<&MagicHit>) -> Result<ProbeVerdict> {
        let Some(hit) = hit else {
            return Ok(ProbeVerdict::NoMatch);
        };
        let page_size = hit.offset + SIGNATURE_LEN;

        if hit.bytes == b"SWAP-SPACE" {
            ctx.set_version("0");
            ctx.set_extent(hit.offset, SIGNATURE_LEN);
            return Ok(ProbeVerdict::Match);
        }

        let data = ctx.read(HEADER_OFFSET as i64, HEADER_SIZE)?;
        let Some(header) = SwapHeader::parse(&data) else {
            return Ok(ProbeVerdict::NoMatch);
        };
        // Areas created on big-endian machines store the header swapped.
        if header.version != 1 && header.version.swap_bytes() != 1 {
            tracing::trace!(version = header.version, "swap: unsupported header version");
            return Ok(ProbeVerdict::NoMatch);
        }

        ctx.set_label(&header.volume_name);
        ctx.set_uuid(&header.uuid);
        ctx.set_version("1");

        let last_page = if header.version == 1 {
            header.last_page
        } else {
            header.last_page.swap_bytes()
        };
        if last_page > 0 {
            ctx.set_fs_geometry(page_size, u64::from(last_page) + 1);
        }
        ctx.set_extent(HEADER_OFFSET, page_size - HEADER_OFFSET);

        Ok(ProbeVerdict::Match)
    }
}
