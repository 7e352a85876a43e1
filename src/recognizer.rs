//! Magic matching and the context handed to [`Recognizer::probe`].

use crate::error::{ProbeError, Result};
use crate::flags::{PartitionFlags, SuperblockFlags};
use crate::reader::ByteReader;
use crate::results::FieldEntry;
use crate::traits::Recognizer;
use crate::types::{ChainKind, Match, PartitionTable, Region};
use bytes::Bytes;
use uuid::Uuid;

/// A byte string expected at a fixed offset.
///
/// Negative offsets count back from the end of the device window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Magic {
    pub bytes: &'static [u8],
    pub offset: i64,
}

impl Magic {
    pub const fn new(bytes: &'static [u8], offset: i64) -> Self {
        Self { bytes, offset }
    }
}

/// Where a recognizer's magic was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicHit {
    /// Index into [`Recognizer::magics`].
    pub index: usize,
    /// Absolute offset within the window.
    pub offset: u64,
    pub bytes: &'static [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Match,
    NoMatch,
}

/// Bounded device access and field sink for one recognizer invocation.
///
/// Setters check the chain's flag bitmask before formatting anything, so
/// a recognizer can call them unconditionally.
pub struct ProbeContext<'a> {
    reader: &'a mut ByteReader,
    chain: ChainKind,
    sb_flags: SuperblockFlags,
    pt_flags: PartitionFlags,
    fields: Vec<FieldEntry>,
    label: Option<String>,
    uuid: Option<String>,
    sec_type: Option<&'static str>,
    version: Option<String>,
    magic: Option<Region>,
    extent: Option<Region>,
    content_size: Option<u64>,
    partitions: Option<PartitionTable>,
}

impl<'a> ProbeContext<'a> {
    pub(crate) fn new(
        reader: &'a mut ByteReader,
        chain: ChainKind,
        sb_flags: SuperblockFlags,
        pt_flags: PartitionFlags,
    ) -> Self {
        Self {
            reader,
            chain,
            sb_flags,
            pt_flags,
            fields: Vec::new(),
            label: None,
            uuid: None,
            sec_type: None,
            version: None,
            magic: None,
            extent: None,
            content_size: None,
            partitions: None,
        }
    }

    pub fn read(&mut self, offset: i64, length: usize) -> Result<Bytes> {
        self.reader.read(offset, length)
    }

    pub fn read_array<const N: usize>(&mut self, offset: i64) -> Result<[u8; N]> {
        let bytes = self.reader.read(offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Size of the probed window.
    pub fn device_size(&self) -> u64 {
        self.reader.size()
    }

    pub fn superblock_flags(&self) -> SuperblockFlags {
        self.sb_flags
    }

    pub fn partition_flags(&self) -> PartitionFlags {
        self.pt_flags
    }

    /// Records a label stored as a NUL-padded byte string.
    pub fn set_label(&mut self, raw: &[u8]) {
        let wants_label = self.sb_flags.contains(SuperblockFlags::LABEL);
        let wants_raw = self.sb_flags.contains(SuperblockFlags::LABELRAW);
        if !wants_label && !wants_raw {
            return;
        }

        let raw = raw.split(|&b| b == 0).next().unwrap_or_default();
        if raw.is_empty() {
            return;
        }
        if wants_raw {
            self.push("LABEL_RAW", String::from_utf8_lossy(raw).into_owned());
        }
        if wants_label {
            let label = String::from_utf8_lossy(raw).trim_end().to_string();
            if !label.is_empty() {
                self.label = Some(label.clone());
                self.push("LABEL", label);
            }
        }
    }

    /// Records a 16-byte big-endian UUID; all-zero UUIDs are ignored.
    pub fn set_uuid(&mut self, raw: &[u8; 16]) {
        let uuid = Uuid::from_bytes(*raw);
        if uuid.is_nil() {
            return;
        }
        self.set_uuid_formatted(uuid.hyphenated().to_string(), raw);
    }

    /// Records an identifier whose textual form is format specific,
    /// such as a FAT volume serial.
    pub fn set_uuid_formatted(&mut self, uuid: String, raw: &[u8]) {
        if self.sb_flags.contains(SuperblockFlags::UUIDRAW) {
            self.push("UUID_RAW", hex::encode(raw));
        }
        if self.sb_flags.contains(SuperblockFlags::UUID) && !uuid.is_empty() {
            self.uuid = Some(uuid.clone());
            self.push("UUID", uuid);
        }
    }

    pub fn set_sec_type(&mut self, sec_type: &'static str) {
        self.sec_type = Some(sec_type);
        if self.sb_flags.contains(SuperblockFlags::SECTYPE) {
            self.push("SEC_TYPE", sec_type);
        }
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        let version = version.into();
        if self.sb_flags.contains(SuperblockFlags::VERSION) {
            self.push("VERSION", version.clone());
        }
        self.version = Some(version);
    }

    /// Records the size of the content the signature describes.
    pub fn set_content_size(&mut self, size: u64) {
        self.content_size = Some(size);
        if self.sb_flags.contains(SuperblockFlags::FSINFO) {
            self.push("FSSIZE", size.to_string());
        }
    }

    /// Records filesystem geometry; the content size follows from it.
    pub fn set_fs_geometry(&mut self, block_size: u64, blocks: u64) {
        self.set_content_size(block_size.saturating_mul(blocks));
        if self.sb_flags.contains(SuperblockFlags::FSINFO) {
            self.push("FSLASTBLOCK", blocks.to_string());
            self.push("FSBLOCKSIZE", block_size.to_string());
        }
    }

    /// Returns whether a superblock with a failed checksum may still match.
    pub fn accept_bad_checksum(&mut self) -> bool {
        if self.sb_flags.contains(SuperblockFlags::BADCSUM) {
            self.push("SBBADCSUM", "1");
            true
        } else {
            false
        }
    }

    /// Bytes of metadata the signature occupies.
    pub fn set_extent(&mut self, offset: u64, length: u64) {
        self.extent = Some(Region::new(offset, length));
    }

    /// Overrides the wipe region when the accepted copy is not the one
    /// whose magic was hit first.
    pub fn set_magic(&mut self, offset: u64, length: u64) {
        self.magic = Some(Region::new(offset, length));
    }

    pub fn set_partition_table(&mut self, table: PartitionTable) {
        if let Some(id) = &table.id {
            self.push("PTUUID", id.clone());
        }
        self.partitions = Some(table);
    }

    /// Records a format-specific field.
    pub fn set_value(&mut self, name: &str, value: impl Into<String>) {
        self.push(name, value.into());
    }

    fn push(&mut self, name: &str, value: impl Into<String>) {
        self.fields.push(FieldEntry::new(name, value));
    }

    fn finish(mut self, recognizer: &dyn Recognizer, hit: Option<&MagicHit>) -> Match {
        let magic = self
            .magic
            .or_else(|| hit.map(|h| Region::new(h.offset, h.bytes.len() as u64)));
        let extent = self.extent.or(magic).unwrap_or(Region::new(0, 0));
        let usage = recognizer.usage();

        match self.chain {
            ChainKind::Superblocks => {
                if self.sb_flags.contains(SuperblockFlags::TYPE) {
                    self.push("TYPE", recognizer.name());
                }
                if self.sb_flags.contains(SuperblockFlags::USAGE) {
                    if let Some(usage) = usage {
                        self.push("USAGE", usage.as_str());
                    }
                }
                if self.sb_flags.contains(SuperblockFlags::MAGIC) {
                    self.push_magic("SBMAGIC", hit, magic);
                }
            }
            ChainKind::Partitions => {
                self.push("PTTYPE", recognizer.name());
                if self.pt_flags.contains(PartitionFlags::MAGIC) {
                    self.push_magic("PTMAGIC", hit, magic);
                }
            }
        }

        Match {
            chain: self.chain,
            type_name: recognizer.name(),
            usage,
            label: self.label,
            uuid: self.uuid,
            sec_type: self.sec_type,
            version: self.version,
            magic,
            extent,
            content_size: self.content_size,
            partitions: self.partitions,
            fields: self.fields,
        }
    }

    fn push_magic(&mut self, name: &str, hit: Option<&MagicHit>, region: Option<Region>) {
        if let (Some(hit), Some(region)) = (hit, region) {
            self.push(name, hit.bytes.escape_ascii().to_string());
            self.push(&format!("{name}_OFFSET"), region.offset.to_string());
        }
    }
}

/// Runs one recognizer against the window.
///
/// Reads that fall outside the window mean "not this format"; any other
/// device error is reported as a scan failure of the recognizer.
pub(crate) fn run(
    recognizer: &dyn Recognizer,
    reader: &mut ByteReader,
    chain: ChainKind,
    sb_flags: SuperblockFlags,
    pt_flags: PartitionFlags,
) -> Result<Option<Match>> {
    let name = recognizer.name();
    if reader.size() < recognizer.min_size() {
        return Ok(None);
    }

    let hit = if recognizer.magics().is_empty() {
        None
    } else {
        match find_magic(recognizer, reader).map_err(|e| as_scan_error(name, e))? {
            Some(hit) => Some(hit),
            None => return Ok(None),
        }
    };

    let mut ctx = ProbeContext::new(reader, chain, sb_flags, pt_flags);
    match recognizer.probe(&mut ctx, hit.as_ref()) {
        Ok(ProbeVerdict::Match) => {
            tracing::debug!(recognizer = name, offset = hit.map(|h| h.offset), "signature matched");
            Ok(Some(ctx.finish(recognizer, hit.as_ref())))
        }
        Ok(ProbeVerdict::NoMatch) => Ok(None),
        Err(err) if err.is_out_of_bounds() => {
            tracing::trace!(recognizer = name, error = %err, "metadata outside window");
            Ok(None)
        }
        Err(err) => Err(as_scan_error(name, err)),
    }
}

fn find_magic(recognizer: &dyn Recognizer, reader: &mut ByteReader) -> Result<Option<MagicHit>> {
    let size = reader.size();
    for (index, magic) in recognizer.magics().iter().enumerate() {
        match reader.read(magic.offset, magic.bytes.len()) {
            Ok(bytes) if bytes[..] == *magic.bytes => {
                let offset = if magic.offset < 0 {
                    size - magic.offset.unsigned_abs()
                } else {
                    magic.offset as u64
                };
                return Ok(Some(MagicHit {
                    index,
                    offset,
                    bytes: magic.bytes,
                }));
            }
            Ok(_) => {}
            Err(err) if err.is_out_of_bounds() => {}
            Err(err) => return Err(err),
        }
    }
    Ok(None)
}

fn as_scan_error(recognizer: &'static str, err: ProbeError) -> ProbeError {
    match err {
        ProbeError::Io { offset, source } => ProbeError::Scan {
            recognizer,
            offset,
            source,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{DeviceWindow, MemoryDevice};
    use crate::types::Usage;

    struct Tagged;

    impl Recognizer for Tagged {
        fn name(&self) -> &'static str {
            "tagged"
        }

        fn usage(&self) -> Option<Usage> {
            Some(Usage::Other)
        }

        fn magics(&self) -> &[Magic] {
            const MAGICS: &[Magic] = &[Magic::new(b"TAG0", 0), Magic::new(b"TAG1", -8)];
            MAGICS
        }

        fn probe(&self, ctx: &mut ProbeContext<'_>, _hit: Option<&MagicHit>) -> Result<ProbeVerdict> {
            let label: [u8; 8] = ctx.read_array(16)?;
            ctx.set_label(&label);
            ctx.set_uuid(&[0x11; 16]);
            Ok(ProbeVerdict::Match)
        }
    }

    fn reader_with(data: Vec<u8>) -> ByteReader {
        ByteReader::new(Box::new(MemoryDevice::new(data)), DeviceWindow::default()).unwrap()
    }

    fn image() -> Vec<u8> {
        let mut data = vec![0u8; 64];
        data[56..60].copy_from_slice(b"TAG1");
        data[16..24].copy_from_slice(b"disk  \0\0");
        data
    }

    #[test]
    fn tail_magic_resolves_to_absolute_offset() {
        let mut reader = reader_with(image());
        let m = run(
            &Tagged,
            &mut reader,
            ChainKind::Superblocks,
            SuperblockFlags::all(),
            PartitionFlags::empty(),
        )
        .unwrap()
        .unwrap();

        assert_eq!(m.magic, Some(Region::new(56, 4)));
        assert_eq!(m.label.as_deref(), Some("disk"));
        let get = |name: &str| m.fields().iter().find(|f| f.name == name).map(|f| f.value.as_str());
        assert_eq!(get("LABEL_RAW"), Some("disk  "));
        assert_eq!(get("UUID"), Some("11111111-1111-1111-1111-111111111111"));
        assert_eq!(get("UUID_RAW"), Some("11111111111111111111111111111111"));
        assert_eq!(get("TYPE"), Some("tagged"));
        assert_eq!(get("USAGE"), Some("other"));
        assert_eq!(get("SBMAGIC"), Some("TAG1"));
        assert_eq!(get("SBMAGIC_OFFSET"), Some("56"));
    }

    #[test]
    fn flags_gate_fields() {
        let mut reader = reader_with(image());
        let m = run(
            &Tagged,
            &mut reader,
            ChainKind::Superblocks,
            SuperblockFlags::TYPE,
            PartitionFlags::empty(),
        )
        .unwrap()
        .unwrap();

        let names: Vec<_> = m.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["TYPE"]);
        assert!(m.label.is_none());
    }

    #[test]
    fn missing_magic_is_no_match() {
        let mut reader = reader_with(vec![0u8; 64]);
        let result = run(
            &Tagged,
            &mut reader,
            ChainKind::Superblocks,
            SuperblockFlags::DEFAULT,
            PartitionFlags::empty(),
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn short_device_reads_are_no_match() {
        let mut data = vec![0u8; 20];
        data[..4].copy_from_slice(b"TAG0");
        let mut reader = reader_with(data);
        let result = run(
            &Tagged,
            &mut reader,
            ChainKind::Superblocks,
            SuperblockFlags::DEFAULT,
            PartitionFlags::empty(),
        )
        .unwrap();
        assert!(result.is_none());
    }
}
