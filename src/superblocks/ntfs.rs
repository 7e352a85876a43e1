//! NTFS boot sector.

use crate::error::Result;
use crate::recognizer::{Magic, MagicHit, ProbeContext, ProbeVerdict};
use crate::traits::Recognizer;
use crate::types::Usage;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor};

const BOOT_SECTOR_SIZE: usize = 512;
const MAX_CLUSTER_SIZE: u64 = 2 * 1024 * 1024;

const MAGICS: &[Magic] = &[Magic::new(b"NTFS    ", 3)];

#[derive(Debug, Clone)]
pub struct NtfsBootSector {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u32,
    pub reserved_sectors: u16,
    pub fats: u8,
    pub root_entries: u16,
    pub sectors16: u16,
    pub fat_length: u16,
    pub total_sectors: u64,
    pub mft_cluster: u64,
    pub clusters_per_mft_record: i8,
    pub volume_serial: u64,
}

impl NtfsBootSector {
    pub fn parse(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);

        cursor.set_position(11);
        let bytes_per_sector = cursor.read_u16::<LittleEndian>()?;
        let raw_spc = cursor.read_u8()?;
        let reserved_sectors = cursor.read_u16::<LittleEndian>()?;
        let fats = cursor.read_u8()?;
        let root_entries = cursor.read_u16::<LittleEndian>()?;
        let sectors16 = cursor.read_u16::<LittleEndian>()?;
        cursor.set_position(22);
        let fat_length = cursor.read_u16::<LittleEndian>()?;

        cursor.set_position(40);
        let total_sectors = cursor.read_u64::<LittleEndian>()?;
        let mft_cluster = cursor.read_u64::<LittleEndian>()?;
        cursor.set_position(64);
        let clusters_per_mft_record = cursor.read_i8()?;
        cursor.set_position(72);
        let volume_serial = cursor.read_u64::<LittleEndian>()?;

        // Values above 128 encode the cluster size as a negative shift.
        let sectors_per_cluster = if raw_spc > 128 {
            1u32.checked_shl(256 - u32::from(raw_spc)).unwrap_or(0)
        } else {
            u32::from(raw_spc)
        };

        Ok(Self {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            fats,
            root_entries,
            sectors16,
            fat_length,
            total_sectors,
            mft_cluster,
            clusters_per_mft_record,
            volume_serial,
        })
    }

    pub fn cluster_size(&self) -> u64 {
        u64::from(self.bytes_per_sector) * u64::from(self.sectors_per_cluster)
    }

    pub fn mft_record_size(&self) -> u64 {
        let cpr = self.clusters_per_mft_record;
        if cpr > 0 {
            self.cluster_size() * cpr as u64
        } else {
            1u64.checked_shl(u32::from(cpr.unsigned_abs())).unwrap_or(0)
        }
    }

    pub fn is_valid(&self) -> bool {
        let bps = self.bytes_per_sector;
        let cluster = self.cluster_size();
        let record = self.mft_record_size();

        bps.is_power_of_two()
            && (256..=4096).contains(&bps)
            && self.sectors_per_cluster.is_power_of_two()
            && cluster <= MAX_CLUSTER_SIZE
            && self.reserved_sectors == 0
            && self.fats == 0
            && self.root_entries == 0
            && self.sectors16 == 0
            && self.fat_length == 0
            && self.total_sectors != 0
            && self.mft_cluster != 0
            && record.is_power_of_two()
            && record >= u64::from(bps)
    }
}

pub struct NtfsRecognizer;

impl Recognizer for NtfsRecognizer {
    fn name(&self) -> &'static str {
        "ntfs"
    }

    fn usage(&self) -> Option<Usage> {
        Some(Usage::Filesystem)
    }

    fn magics(&self) -> &[Magic] {
        MAGICS
    }

    fn probe(&self, ctx: &mut ProbeContext<'_>, _hit: Option<&MagicHit>) -> Result<ProbeVerdict> {
        let data = ctx.read(0, BOOT_SECTOR_SIZE)?;
        let Ok(bs) = NtfsBootSector::parse(&data) else {
            return Ok(ProbeVerdict::NoMatch);
        };
        if !bs.is_valid() {
            tracing::trace!("ntfs: invalid boot sector");
            return Ok(ProbeVerdict::NoMatch);
        }

        let serial = bs.volume_serial.to_le_bytes();
        ctx.set_uuid_formatted(format!("{:016X}", bs.volume_serial), &serial);
        ctx.set_content_size(bs.total_sectors.saturating_mul(u64::from(bs.bytes_per_sector)));
        ctx.set_extent(0, BOOT_SECTOR_SIZE as u64);

        Ok(ProbeVerdict::Match)
    }
}
