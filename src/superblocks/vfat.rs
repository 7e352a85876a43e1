//! FAT12, FAT16 and FAT32.

use crate::error::Result;
use crate::recognizer::{Magic, MagicHit, ProbeContext, ProbeVerdict};
use crate::traits::Recognizer;
use crate::types::Usage;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};

const BOOT_SECTOR_SIZE: usize = 512;
const NO_NAME: &[u8] = b"NO NAME    ";
const FAT12_MAX_CLUSTERS: u64 = 4084;

const MAGICS: &[Magic] = &[
    Magic::new(b"FAT32   ", 0x52),
    Magic::new(b"FAT16   ", 0x36),
    Magic::new(b"FAT12   ", 0x36),
    Magic::new(b"FAT     ", 0x36),
];

/// The BIOS parameter block plus the FAT12/16 or FAT32 extension.
#[derive(Debug, Clone)]
pub struct BootSector {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fats: u8,
    pub root_entries: u16,
    pub total_sectors: u64,
    pub media: u8,
    pub fat_length: u32,
    pub is_fat32: bool,
    pub serial: [u8; 4],
    pub label: [u8; 11],
}

impl BootSector {
    pub fn parse(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);

        cursor.set_position(11);
        let bytes_per_sector = cursor.read_u16::<LittleEndian>()?;
        let sectors_per_cluster = cursor.read_u8()?;
        let reserved_sectors = cursor.read_u16::<LittleEndian>()?;
        let fats = cursor.read_u8()?;
        let root_entries = cursor.read_u16::<LittleEndian>()?;
        let total_sectors16 = cursor.read_u16::<LittleEndian>()?;
        let media = cursor.read_u8()?;
        let fat_length16 = cursor.read_u16::<LittleEndian>()?;

        cursor.set_position(32);
        let total_sectors32 = cursor.read_u32::<LittleEndian>()?;
        let fat_length32 = cursor.read_u32::<LittleEndian>()?;

        let is_fat32 = fat_length16 == 0;
        let (fat_length, ext_offset) = if is_fat32 {
            (fat_length32, 67)
        } else {
            (u32::from(fat_length16), 39)
        };

        cursor.set_position(ext_offset);
        let mut serial = [0u8; 4];
        let mut label = [0u8; 11];
        cursor.read_exact(&mut serial)?;
        cursor.read_exact(&mut label)?;

        let total_sectors = if total_sectors16 != 0 {
            u64::from(total_sectors16)
        } else {
            u64::from(total_sectors32)
        };

        Ok(Self {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            fats,
            root_entries,
            total_sectors,
            media,
            fat_length,
            is_fat32,
            serial,
            label,
        })
    }

    pub fn is_valid(&self) -> bool {
        let bps = self.bytes_per_sector;
        (self.media == 0xF0 || self.media >= 0xF8)
            && self.sectors_per_cluster.is_power_of_two()
            && bps.is_power_of_two()
            && (512..=4096).contains(&bps)
            && self.reserved_sectors != 0
            && self.fats != 0
            && self.fat_length != 0
            && self.total_sectors != 0
    }

    pub fn cluster_count(&self) -> u64 {
        let bps = u64::from(self.bytes_per_sector);
        let root_dir_sectors = (u64::from(self.root_entries) * 32).div_ceil(bps);
        let meta = u64::from(self.reserved_sectors)
            + u64::from(self.fats) * u64::from(self.fat_length)
            + root_dir_sectors;
        self.total_sectors.saturating_sub(meta) / u64::from(self.sectors_per_cluster)
    }

    pub fn version(&self) -> &'static str {
        if self.is_fat32 {
            "FAT32"
        } else if self.cluster_count() <= FAT12_MAX_CLUSTERS {
            "FAT12"
        } else {
            "FAT16"
        }
    }

    pub fn size(&self) -> u64 {
        self.total_sectors * u64::from(self.bytes_per_sector)
    }
}

pub struct VfatRecognizer;

impl Recognizer for VfatRecognizer {
    fn name(&self) -> &'static str {
        "vfat"
    }

    fn usage(&self) -> Option<Usage> {
        Some(Usage::Filesystem)
    }

    fn magics(&self) -> &[Magic] {
        MAGICS
    }

    fn probe(&self, ctx: &mut ProbeContext<'_>, hit: Option<&MagicHit>) -> Result<ProbeVerdict> {
        let data = ctx.read(0, BOOT_SECTOR_SIZE)?;
        let Ok(bs) = BootSector::parse(&data) else {
            return Ok(ProbeVerdict::NoMatch);
        };
        if !bs.is_valid() {
            tracing::trace!("vfat: invalid BIOS parameter block");
            return Ok(ProbeVerdict::NoMatch);
        }
        // The FAT32 type string must sit in the FAT32 extension and vice versa.
        if hit.is_some_and(|h| (h.offset == 0x52) != bs.is_fat32) {
            return Ok(ProbeVerdict::NoMatch);
        }

        if bs.label != NO_NAME {
            ctx.set_label(&bs.label);
        }
        let serial = u32::from_le_bytes(bs.serial);
        ctx.set_uuid_formatted(
            format!("{:04X}-{:04X}", serial >> 16, serial & 0xFFFF),
            &bs.serial,
        );

        let version = bs.version();
        if version != "FAT32" {
            ctx.set_sec_type("msdos");
        }
        ctx.set_version(version);
        ctx.set_content_size(bs.size());
        ctx.set_extent(0, BOOT_SECTOR_SIZE as u64);

        Ok(ProbeVerdict::Match)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fat16_boot_sector() -> Vec<u8> {
        let mut data = vec![0u8; BOOT_SECTOR_SIZE];
        data[11..13].copy_from_slice(&512u16.to_le_bytes());
        data[13] = 4;
        data[14..16].copy_from_slice(&4u16.to_le_bytes());
        data[16] = 2;
        data[17..19].copy_from_slice(&512u16.to_le_bytes());
        data[21] = 0xF8;
        data[22..24].copy_from_slice(&64u16.to_le_bytes());
        data[32..36].copy_from_slice(&65_536u32.to_le_bytes());
        data[39..43].copy_from_slice(&[0x78, 0x56, 0x34, 0x12]);
        data[43..54].copy_from_slice(b"DATA       ");
        data[54..62].copy_from_slice(b"FAT16   ");
        data
    }

    #[test]
    fn parses_fat16() {
        let bs = BootSector::parse(&fat16_boot_sector()).unwrap();
        assert!(bs.is_valid());
        assert!(!bs.is_fat32);
        assert_eq!(bs.version(), "FAT16");
        assert_eq!(bs.size(), 65_536 * 512);
        assert_eq!(&bs.label, b"DATA       ");
    }

    #[test]
    fn small_volume_is_fat12() {
        let mut data = fat16_boot_sector();
        data[19..21].copy_from_slice(&2880u16.to_le_bytes());
        data[22..24].copy_from_slice(&9u16.to_le_bytes());
        data[13] = 1;
        let bs = BootSector::parse(&data).unwrap();
        assert_eq!(bs.total_sectors, 2880);
        assert_eq!(bs.version(), "FAT12");
    }

    #[test]
    fn bad_media_byte_is_invalid() {
        let mut data = fat16_boot_sector();
        data[21] = 0x12;
        assert!(!BootSector::parse(&data).unwrap().is_valid());
    }
}
