//! Partition table recognizer tests

mod common;

use blkprobe::{
    FilterMode, MemoryDevice, PartitionEntry, PartitionFlags, ProbeOptions, ProbeStatus, Session,
};
use common::*;
use rstest::*;

// ============================================================================
// Helpers
// ============================================================================

fn partitions_session(data: Vec<u8>, flags: PartitionFlags) -> Session {
    let options = ProbeOptions::default()
        .with_partitions(true)
        .with_partitions_flags(flags);
    Session::from_options(MemoryDevice::new(data), &options).unwrap()
}

fn value(session: &Session, name: &str) -> Option<String> {
    session.lookup_value(name).unwrap()
}

#[fixture]
fn gpt_disk() -> Vec<u8> {
    gpt_image(4 * MIB)
}

// ============================================================================
// GPT
// ============================================================================

#[rstest]
fn gpt_primary_header(gpt_disk: Vec<u8>) {
    let mut session = partitions_session(gpt_disk, PartitionFlags::MAGIC);

    assert_eq!(session.do_safeprobe().unwrap(), ProbeStatus::Matched);
    assert_eq!(value(&session, "PTTYPE").as_deref(), Some("gpt"));
    assert_eq!(value(&session, "PTUUID").as_deref(), Some(DISK_GUID_STR));
    assert_eq!(value(&session, "PTMAGIC").as_deref(), Some("EFI PART"));
    assert_eq!(value(&session, "PTMAGIC_OFFSET").as_deref(), Some("512"));
    assert_eq!(value(&session, "TYPE"), None);
}

#[rstest]
fn gpt_falls_back_to_backup_header(mut gpt_disk: Vec<u8>) {
    gpt_disk[512 + 16] ^= 0xFF;
    let last_header = gpt_disk.len() - 512;
    let mut session = partitions_session(gpt_disk, PartitionFlags::MAGIC);

    assert_eq!(session.do_safeprobe().unwrap(), ProbeStatus::Matched);
    assert_eq!(value(&session, "PTTYPE").as_deref(), Some("gpt"));
    assert_eq!(
        value(&session, "PTMAGIC_OFFSET").as_deref(),
        Some(last_header.to_string().as_str())
    );
}

#[rstest]
fn gpt_with_both_headers_corrupt(mut gpt_disk: Vec<u8>) {
    gpt_disk[512 + 16] ^= 0xFF;
    let last_header = gpt_disk.len() - 512;
    gpt_disk[last_header + 16] ^= 0xFF;
    let mut session = partitions_session(gpt_disk, PartitionFlags::empty());

    assert_eq!(session.do_safeprobe().unwrap(), ProbeStatus::NothingFound);
}

#[rstest]
fn gpt_entry_checksum_is_verified(mut gpt_disk: Vec<u8>) {
    gpt_disk[1024 + 32] ^= 0x01;
    let last_header = gpt_disk.len() - 512;
    let backup_entries = last_header - 32 * 512;
    gpt_disk[backup_entries + 32] ^= 0x01;
    let mut session = partitions_session(gpt_disk, PartitionFlags::empty());

    assert_eq!(session.do_safeprobe().unwrap(), ProbeStatus::NothingFound);
}

#[rstest]
fn gpt_requires_protective_mbr(mut gpt_disk: Vec<u8>) {
    gpt_disk[..512].fill(0);

    let mut session = partitions_session(gpt_disk.clone(), PartitionFlags::empty());
    assert_eq!(session.do_safeprobe().unwrap(), ProbeStatus::NothingFound);

    let mut forced = partitions_session(gpt_disk, PartitionFlags::FORCE_GPT);
    assert_eq!(forced.do_safeprobe().unwrap(), ProbeStatus::Matched);
    assert_eq!(value(&forced, "PTTYPE").as_deref(), Some("gpt"));
}

#[rstest]
fn gpt_entry_details(gpt_disk: Vec<u8>) {
    let mut session = partitions_session(gpt_disk, PartitionFlags::ENTRY_DETAILS);
    session.do_safeprobe().unwrap();

    let table = session.partitions().unwrap();
    assert_eq!(table.pt_type, "gpt");
    assert_eq!(table.id.as_deref(), Some(DISK_GUID_STR));
    assert_eq!(
        table.entries,
        [PartitionEntry {
            number: 1,
            start: 40 * 512,
            size: 961 * 512,
            type_code: LINUX_FS_GUID_STR.to_string(),
            uuid: Some("42424242-4242-4242-4242-424242424242".to_string()),
            name: Some("root".to_string()),
            bootable: false,
        }]
    );
}

#[rstest]
fn gpt_entries_omitted_by_default(gpt_disk: Vec<u8>) {
    let mut session = partitions_session(gpt_disk, PartitionFlags::empty());
    session.do_safeprobe().unwrap();
    assert!(session.partitions().unwrap().entries.is_empty());
}

#[test]
fn gpt_needs_room_for_both_headers() {
    let mut data = vec![0u8; 1024];
    data[512..520].copy_from_slice(b"EFI PART");
    let mut session = partitions_session(data, PartitionFlags::FORCE_GPT);
    assert_eq!(session.do_safeprobe().unwrap(), ProbeStatus::NothingFound);
}

// ============================================================================
// DOS
// ============================================================================

#[test]
fn dos_table() {
    let mut session = partitions_session(mbr_image(4 * MIB), PartitionFlags::MAGIC);

    assert_eq!(session.do_safeprobe().unwrap(), ProbeStatus::Matched);
    assert_eq!(value(&session, "PTTYPE").as_deref(), Some("dos"));
    assert_eq!(value(&session, "PTUUID").as_deref(), Some("a1b2c3d4"));
    assert_eq!(value(&session, "PTMAGIC").as_deref(), Some("U\\xaa"));
    assert_eq!(value(&session, "PTMAGIC_OFFSET").as_deref(), Some("510"));
}

#[test]
fn dos_entry_details() {
    let mut session = partitions_session(mbr_image(4 * MIB), PartitionFlags::ENTRY_DETAILS);
    session.do_safeprobe().unwrap();

    let table = session.partitions().unwrap();
    assert_eq!(table.entries.len(), 2);

    let root = &table.entries[0];
    assert_eq!(root.number, 1);
    assert_eq!(root.start, 2048 * 512);
    assert_eq!(root.size, 4096 * 512);
    assert_eq!(root.type_code, "0x83");
    assert_eq!(root.uuid.as_deref(), Some("a1b2c3d4-01"));
    assert!(root.bootable);

    let swap = &table.entries[1];
    assert_eq!(swap.number, 2);
    assert_eq!(swap.type_code, "0x82");
    assert_eq!(swap.uuid.as_deref(), Some("a1b2c3d4-02"));
    assert!(!swap.bootable);
}

#[test]
fn dos_rejects_bad_boot_indicator() {
    let mut image = mbr_image(MIB);
    image[446] = 0x17;
    let mut session = partitions_session(image, PartitionFlags::empty());
    assert_eq!(session.do_safeprobe().unwrap(), ProbeStatus::NothingFound);
}

#[rstest]
#[case::vfat(vfat_image(MIB), "vfat")]
#[case::ntfs(ntfs_image(MIB), "ntfs")]
fn boot_sector_is_not_a_partition_table(#[case] image: Vec<u8>, #[case] type_name: &str) {
    let mut session = partitions_session(image, PartitionFlags::empty());

    assert_eq!(session.do_safeprobe().unwrap(), ProbeStatus::Matched);
    assert_eq!(value(&session, "TYPE").as_deref(), Some(type_name));
    assert_eq!(value(&session, "PTTYPE"), None);
}

#[rstest]
fn dos_defers_to_gpt(gpt_disk: Vec<u8>) {
    let mut session = partitions_session(gpt_disk, PartitionFlags::empty());
    session.do_fullprobe().unwrap();

    let types: Vec<_> = session.matches().iter().map(|m| m.type_name).collect();
    assert_eq!(types, ["gpt"]);
}

// ============================================================================
// Chain control
// ============================================================================

#[rstest]
fn partitions_chain_off_by_default(gpt_disk: Vec<u8>) {
    let mut session = Session::new(MemoryDevice::new(gpt_disk)).unwrap();
    assert_eq!(session.do_safeprobe().unwrap(), ProbeStatus::NothingFound);
}

#[rstest]
fn type_filter_on_partitions(gpt_disk: Vec<u8>) {
    let mut session = partitions_session(gpt_disk, PartitionFlags::empty());
    session
        .filter_partitions_type(FilterMode::NotIn, &["gpt"])
        .unwrap();
    assert_eq!(session.do_safeprobe().unwrap(), ProbeStatus::NothingFound);

    session.reset_partitions_filter().unwrap();
    assert_eq!(session.do_safeprobe().unwrap(), ProbeStatus::Matched);
}

#[test]
fn filesystem_inside_partitioned_disk_layers() {
    let mut image = ext4_image(4 * MIB);
    image[..512].copy_from_slice(&mbr_image(512));
    let mut session = partitions_session(image, PartitionFlags::empty());

    assert_eq!(session.do_safeprobe().unwrap(), ProbeStatus::Matched);
    assert_eq!(value(&session, "TYPE").as_deref(), Some("ext4"));
    assert_eq!(value(&session, "PTTYPE").as_deref(), Some("dos"));
}
