//! GUID partition tables.

use super::{GPT_PROTECTIVE_TYPE, MBR_SIGNATURE, SECTOR_SIZE, mbr_types};
use crate::error::Result;
use crate::flags::PartitionFlags;
use crate::recognizer::{Magic, MagicHit, ProbeContext, ProbeVerdict};
use crate::traits::Recognizer;
use crate::types::{PartitionEntry, PartitionTable, Usage};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};
use uuid::Uuid;

const GPT_SIGNATURE: &[u8] = b"EFI PART";
const HEADER_MIN_SIZE: u32 = 92;
const ENTRY_MIN_SIZE: u32 = 128;
/// Upper bound on the entry array we are willing to read.
const MAX_ENTRIES_BYTES: u64 = 1024 * 1024;

const MAGICS: &[Magic] = &[
    Magic::new(GPT_SIGNATURE, SECTOR_SIZE as i64),
    Magic::new(GPT_SIGNATURE, -(SECTOR_SIZE as i64)),
];

#[derive(Debug, Clone)]
pub struct GptHeader {
    pub header_size: u32,
    pub header_crc32: u32,
    pub my_lba: u64,
    pub alternate_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: [u8; 16],
    pub entries_lba: u64,
    pub num_entries: u32,
    pub entry_size: u32,
    pub entries_crc32: u32,
}

impl GptHeader {
    pub fn parse(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);

        cursor.set_position(12);
        let header_size = cursor.read_u32::<LittleEndian>()?;
        let header_crc32 = cursor.read_u32::<LittleEndian>()?;
        cursor.set_position(24);
        let my_lba = cursor.read_u64::<LittleEndian>()?;
        let alternate_lba = cursor.read_u64::<LittleEndian>()?;
        let first_usable_lba = cursor.read_u64::<LittleEndian>()?;
        let last_usable_lba = cursor.read_u64::<LittleEndian>()?;
        let mut disk_guid = [0u8; 16];
        cursor.read_exact(&mut disk_guid)?;
        let entries_lba = cursor.read_u64::<LittleEndian>()?;
        let num_entries = cursor.read_u32::<LittleEndian>()?;
        let entry_size = cursor.read_u32::<LittleEndian>()?;
        let entries_crc32 = cursor.read_u32::<LittleEndian>()?;

        Ok(Self {
            header_size,
            header_crc32,
            my_lba,
            alternate_lba,
            first_usable_lba,
            last_usable_lba,
            disk_guid,
            entries_lba,
            num_entries,
            entry_size,
            entries_crc32,
        })
    }

    pub fn entries_len(&self) -> u64 {
        u64::from(self.num_entries) * u64::from(self.entry_size)
    }
}

/// CRC32 of the header with its own checksum field zeroed.
pub fn header_checksum(sector: &[u8], header_size: usize) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&sector[..16]);
    hasher.update(&[0u8; 4]);
    hasher.update(&sector[20..header_size]);
    hasher.finalize()
}

/// Mixed-endian GUID as printed by every GPT tool.
fn guid_string(raw: &[u8; 16]) -> String {
    Uuid::from_bytes_le(*raw).hyphenated().to_string()
}

fn parse_entries(data: &[u8], entry_size: usize) -> Vec<PartitionEntry> {
    data.chunks_exact(entry_size)
        .enumerate()
        .filter_map(|(i, raw)| {
            let mut type_guid = [0u8; 16];
            let mut unique_guid = [0u8; 16];
            type_guid.copy_from_slice(&raw[..16]);
            unique_guid.copy_from_slice(&raw[16..32]);
            if type_guid == [0u8; 16] {
                return None;
            }

            let mut cursor = Cursor::new(&raw[32..56]);
            let first_lba = cursor.read_u64::<LittleEndian>().ok()?;
            let last_lba = cursor.read_u64::<LittleEndian>().ok()?;
            let attributes = cursor.read_u64::<LittleEndian>().ok()?;

            let name: Vec<u16> = raw[56..128]
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .take_while(|&c| c != 0)
                .collect();
            let name = String::from_utf16_lossy(&name);

            Some(PartitionEntry {
                number: i as u32 + 1,
                start: first_lba.saturating_mul(SECTOR_SIZE),
                size: last_lba
                    .saturating_sub(first_lba)
                    .saturating_add(1)
                    .saturating_mul(SECTOR_SIZE),
                type_code: guid_string(&type_guid),
                uuid: Some(guid_string(&unique_guid)),
                name: (!name.is_empty()).then_some(name),
                // Legacy BIOS bootable attribute
                bootable: attributes & (1 << 2) != 0,
            })
        })
        .collect()
}

pub struct GptRecognizer;

impl GptRecognizer {
    /// Reads and validates the header stored at `lba`.
    fn load_header(ctx: &mut ProbeContext<'_>, lba: u64) -> Result<Option<GptHeader>> {
        let sector = ctx.read((lba * SECTOR_SIZE) as i64, SECTOR_SIZE as usize)?;
        if &sector[..8] != GPT_SIGNATURE {
            return Ok(None);
        }
        let Ok(header) = GptHeader::parse(&sector) else {
            return Ok(None);
        };

        if header.header_size < HEADER_MIN_SIZE || u64::from(header.header_size) > SECTOR_SIZE {
            return Ok(None);
        }
        if header_checksum(&sector, header.header_size as usize) != header.header_crc32 {
            tracing::trace!(lba, "gpt: header checksum mismatch");
            return Ok(None);
        }

        let last_lba = ctx.device_size() / SECTOR_SIZE - 1;
        if header.my_lba != lba
            || header.first_usable_lba > header.last_usable_lba
            || header.last_usable_lba > last_lba
        {
            tracing::trace!(lba, "gpt: header geometry mismatch");
            return Ok(None);
        }
        Ok(Some(header))
    }

    fn has_protective_mbr(ctx: &mut ProbeContext<'_>) -> Result<bool> {
        let sector = ctx.read(0, SECTOR_SIZE as usize)?;
        Ok(sector[510..512] == MBR_SIGNATURE
            && mbr_types(&sector).contains(&GPT_PROTECTIVE_TYPE))
    }
}

impl Recognizer for GptRecognizer {
    fn name(&self) -> &'static str {
        "gpt"
    }

    fn usage(&self) -> Option<Usage> {
        None
    }

    fn magics(&self) -> &[Magic] {
        MAGICS
    }

    fn min_size(&self) -> u64 {
        3 * SECTOR_SIZE
    }

    fn probe(&self, ctx: &mut ProbeContext<'_>, _hit: Option<&MagicHit>) -> Result<ProbeVerdict> {
        let flags = ctx.partition_flags();
        if !flags.contains(PartitionFlags::FORCE_GPT) && !Self::has_protective_mbr(ctx)? {
            tracing::trace!("gpt: no protective MBR");
            return Ok(ProbeVerdict::NoMatch);
        }

        let last_lba = ctx.device_size() / SECTOR_SIZE - 1;
        let header = match Self::load_header(ctx, 1)? {
            Some(header) => header,
            None => match Self::load_header(ctx, last_lba)? {
                Some(header) => header,
                None => return Ok(ProbeVerdict::NoMatch),
            },
        };

        if header.entry_size < ENTRY_MIN_SIZE
            || header.entry_size % 8 != 0
            || header.entries_len() > MAX_ENTRIES_BYTES
        {
            return Ok(ProbeVerdict::NoMatch);
        }
        let Some(entries_offset) = header
            .entries_lba
            .checked_mul(SECTOR_SIZE)
            .and_then(|offset| i64::try_from(offset).ok())
        else {
            return Ok(ProbeVerdict::NoMatch);
        };
        let entries = ctx.read(entries_offset, header.entries_len() as usize)?;
        if crc32fast::hash(&entries) != header.entries_crc32 {
            tracing::trace!("gpt: entry array checksum mismatch");
            return Ok(ProbeVerdict::NoMatch);
        }

        let header_offset = header.my_lba * SECTOR_SIZE;
        ctx.set_magic(header_offset, GPT_SIGNATURE.len() as u64);
        ctx.set_extent(header_offset, SECTOR_SIZE);

        let entries = if flags.contains(PartitionFlags::ENTRY_DETAILS) {
            parse_entries(&entries, header.entry_size as usize)
        } else {
            Vec::new()
        };
        ctx.set_partition_table(PartitionTable {
            pt_type: "gpt",
            id: Some(guid_string(&header.disk_guid)),
            entries,
        });

        Ok(ProbeVerdict::Match)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_uses_mixed_endian() {
        let raw = [
            0x28, 0x73, 0x2A, 0xC1, 0x1F, 0xF8, 0xD2, 0x11, 0xBA, 0x4B, 0x00, 0xA0, 0xC9, 0x3E,
            0xC9, 0x3B,
        ];
        assert_eq!(guid_string(&raw), "c12a7328-f81f-11d2-ba4b-00a0c93ec93b");
    }

    #[test]
    fn checksum_ignores_crc_field() {
        let mut sector = vec![0u8; 512];
        sector[..8].copy_from_slice(GPT_SIGNATURE);
        sector[12..16].copy_from_slice(&92u32.to_le_bytes());
        let crc = header_checksum(&sector, 92);
        sector[16..20].copy_from_slice(&crc.to_le_bytes());
        assert_eq!(header_checksum(&sector, 92), crc);
    }

    #[test]
    fn entries_skip_unused_slots() {
        let mut data = vec![0u8; 256];
        data[128] = 0xAF;
        data[128 + 32..128 + 40].copy_from_slice(&2048u64.to_le_bytes());
        data[128 + 40..128 + 48].copy_from_slice(&4095u64.to_le_bytes());
        data[128 + 56..128 + 58].copy_from_slice(&u16::from(b'r').to_le_bytes());

        let entries = parse_entries(&data, 128);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].number, 2);
        assert_eq!(entries[0].start, 2048 * 512);
        assert_eq!(entries[0].size, 2048 * 512);
        assert_eq!(entries[0].name.as_deref(), Some("r"));
    }
}
