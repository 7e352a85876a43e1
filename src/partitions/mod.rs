//! Partition table recognizers.

mod dos;
mod gpt;

pub use dos::DosRecognizer;
pub use gpt::GptRecognizer;

use crate::chain::Chain;

/// Sector size assumed for LBA arithmetic.
pub const SECTOR_SIZE: u64 = 512;

pub(crate) const MBR_SIGNATURE: [u8; 2] = [0x55, 0xAA];
pub(crate) const MBR_TABLE_OFFSET: usize = 446;
pub(crate) const MBR_ENTRY_SIZE: usize = 16;
pub(crate) const GPT_PROTECTIVE_TYPE: u8 = 0xEE;

pub(crate) fn register_all(chain: &mut Chain) {
    chain.register(GptRecognizer);
    chain.register(DosRecognizer);
}

/// Partition type bytes of the four primary MBR entries.
pub(crate) fn mbr_types(sector: &[u8]) -> [u8; 4] {
    let mut types = [0u8; 4];
    for (i, t) in types.iter_mut().enumerate() {
        let entry = MBR_TABLE_OFFSET + i * MBR_ENTRY_SIZE;
        *t = sector.get(entry + 4).copied().unwrap_or(0);
    }
    types
}
