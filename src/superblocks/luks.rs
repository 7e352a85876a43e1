//! LUKS1 and LUKS2 encrypted containers (primary header only).

use crate::error::Result;
use crate::recognizer::{Magic, MagicHit, ProbeContext, ProbeVerdict};
use crate::traits::Recognizer;
use crate::types::Usage;

const LUKS_MAGIC: &[u8] = b"LUKS\xba\xbe";
const LUKS1_HEADER_SIZE: u64 = 592;
const LUKS2_HEADER_SIZE: usize = 4096;

const UUID_OFFSET: usize = 168;
const UUID_LEN: usize = 40;
const LABEL_OFFSET: usize = 24;
const LABEL_LEN: usize = 48;
const SUBSYSTEM_OFFSET: usize = 208;
const SUBSYSTEM_LEN: usize = 48;

const MAGICS: &[Magic] = &[Magic::new(LUKS_MAGIC, 0)];

pub struct LuksRecognizer;

fn c_string(raw: &[u8]) -> &[u8] {
    raw.split(|&b| b == 0).next().unwrap_or_default()
}

impl Recognizer for LuksRecognizer {
    fn name(&self) -> &'static str {
        "crypto_LUKS"
    }

    fn usage(&self) -> Option<Usage> {
        Some(Usage::Crypto)
    }

    fn magics(&self) -> &[Magic] {
        MAGICS
    }

    fn probe(&self, ctx: &mut ProbeContext<'_>, _hit: Option<&MagicHit>) -> Result<ProbeVerdict> {
        let version: [u8; 2] = ctx.read_array(6)?;
        let version = u16::from_be_bytes(version);

        let header_len = match version {
            1 => LUKS1_HEADER_SIZE as usize,
            2 => LUKS2_HEADER_SIZE,
            _ => {
                tracing::trace!(version, "luks: unsupported header version");
                return Ok(ProbeVerdict::NoMatch);
            }
        };
        let header = ctx.read(0, header_len)?;

        let uuid = c_string(&header[UUID_OFFSET..UUID_OFFSET + UUID_LEN]);
        if let Ok(text) = std::str::from_utf8(uuid) {
            ctx.set_uuid_formatted(text.trim().to_string(), uuid);
        }

        if version == 2 {
            ctx.set_label(&header[LABEL_OFFSET..LABEL_OFFSET + LABEL_LEN]);
            let subsystem = c_string(&header[SUBSYSTEM_OFFSET..SUBSYSTEM_OFFSET + SUBSYSTEM_LEN]);
            if !subsystem.is_empty() {
                ctx.set_value("SUBSYSTEM", String::from_utf8_lossy(subsystem));
            }
        }

        ctx.set_version(version.to_string());
        ctx.set_extent(0, header_len as u64);
        Ok(ProbeVerdict::Match)
    }
}
