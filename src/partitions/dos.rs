//! MBR (DOS) partition tables.

use super::{
    GPT_PROTECTIVE_TYPE, MBR_ENTRY_SIZE, MBR_SIGNATURE, MBR_TABLE_OFFSET, SECTOR_SIZE, mbr_types,
};
use crate::error::Result;
use crate::flags::PartitionFlags;
use crate::recognizer::{Magic, MagicHit, ProbeContext, ProbeVerdict};
use crate::traits::Recognizer;
use crate::types::{PartitionEntry, PartitionTable, Usage};
use byteorder::{ByteOrder, LittleEndian};

const DISK_ID_OFFSET: usize = 440;

const MAGICS: &[Magic] = &[Magic::new(&MBR_SIGNATURE, 510)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbrEntry {
    pub boot_indicator: u8,
    pub sys_type: u8,
    pub start_sector: u32,
    pub sectors: u32,
}

impl MbrEntry {
    fn parse(raw: &[u8]) -> Self {
        Self {
            boot_indicator: raw[0],
            sys_type: raw[4],
            start_sector: LittleEndian::read_u32(&raw[8..12]),
            sectors: LittleEndian::read_u32(&raw[12..16]),
        }
    }

    pub fn is_used(&self) -> bool {
        self.sys_type != 0 && self.sectors != 0
    }
}

pub fn mbr_entries(sector: &[u8]) -> [MbrEntry; 4] {
    std::array::from_fn(|i| {
        let offset = MBR_TABLE_OFFSET + i * MBR_ENTRY_SIZE;
        MbrEntry::parse(&sector[offset..offset + MBR_ENTRY_SIZE])
    })
}

/// FAT and NTFS boot sectors also end in 55 AA.
fn looks_like_boot_sector(sector: &[u8]) -> bool {
    &sector[3..11] == b"NTFS    "
        || sector[54..57] == *b"FAT"
        || sector[82..87] == *b"FAT32"
}

pub struct DosRecognizer;

impl Recognizer for DosRecognizer {
    fn name(&self) -> &'static str {
        "dos"
    }

    fn usage(&self) -> Option<Usage> {
        None
    }

    fn magics(&self) -> &[Magic] {
        MAGICS
    }

    fn probe(&self, ctx: &mut ProbeContext<'_>, _hit: Option<&MagicHit>) -> Result<ProbeVerdict> {
        let sector = ctx.read(0, SECTOR_SIZE as usize)?;

        if looks_like_boot_sector(&sector) {
            tracing::trace!("dos: filesystem boot sector, not a partition table");
            return Ok(ProbeVerdict::NoMatch);
        }
        if mbr_types(&sector).contains(&GPT_PROTECTIVE_TYPE) {
            return Ok(ProbeVerdict::NoMatch);
        }

        let entries = mbr_entries(&sector);
        if entries
            .iter()
            .any(|e| e.boot_indicator != 0x00 && e.boot_indicator != 0x80)
        {
            tracing::trace!("dos: invalid boot indicator");
            return Ok(ProbeVerdict::NoMatch);
        }

        let disk_id = LittleEndian::read_u32(&sector[DISK_ID_OFFSET..DISK_ID_OFFSET + 4]);
        let details = ctx
            .partition_flags()
            .contains(PartitionFlags::ENTRY_DETAILS);
        let entries = if details {
            entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.is_used())
                .map(|(i, e)| PartitionEntry {
                    number: i as u32 + 1,
                    start: u64::from(e.start_sector) * SECTOR_SIZE,
                    size: u64::from(e.sectors) * SECTOR_SIZE,
                    type_code: format!("0x{:02x}", e.sys_type),
                    uuid: (disk_id != 0).then(|| format!("{disk_id:08x}-{:02x}", i + 1)),
                    name: None,
                    bootable: e.boot_indicator == 0x80,
                })
                .collect()
        } else {
            Vec::new()
        };

        ctx.set_extent(DISK_ID_OFFSET as u64, SECTOR_SIZE - DISK_ID_OFFSET as u64);
        ctx.set_partition_table(PartitionTable {
            pt_type: "dos",
            id: (disk_id != 0).then(|| format!("{disk_id:08x}")),
            entries,
        });

        Ok(ProbeVerdict::Match)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mbr() -> Vec<u8> {
        let mut sector = vec![0u8; 512];
        sector[510..512].copy_from_slice(&MBR_SIGNATURE);
        sector[446] = 0x80;
        sector[446 + 4] = 0x83;
        sector[446 + 8..446 + 12].copy_from_slice(&2048u32.to_le_bytes());
        sector[446 + 12..446 + 16].copy_from_slice(&8192u32.to_le_bytes());
        sector
    }

    #[test]
    fn parses_primary_entries() {
        let entries = mbr_entries(&mbr());
        assert!(entries[0].is_used());
        assert_eq!(entries[0].start_sector, 2048);
        assert_eq!(entries[0].sectors, 8192);
        assert!(!entries[1].is_used());
    }

    #[test]
    fn boot_sectors_are_recognized() {
        let mut sector = mbr();
        assert!(!looks_like_boot_sector(&sector));
        sector[3..11].copy_from_slice(b"NTFS    ");
        assert!(looks_like_boot_sector(&sector));

        let mut sector = mbr();
        sector[82..90].copy_from_slice(b"FAT32   ");
        assert!(looks_like_boot_sector(&sector));
    }
}
