//! Recognizers for filesystems, RAID members, encrypted containers and swap.

mod ext;
mod luks;
mod mdraid;
mod ntfs;
mod swap;
mod vfat;

pub use ext::{ExtKind, ExtRecognizer};
pub use luks::LuksRecognizer;
pub use mdraid::MdRaidRecognizer;
pub use ntfs::NtfsRecognizer;
pub use swap::SwapRecognizer;
pub use vfat::VfatRecognizer;

use crate::chain::Chain;

/// Registers the built-in superblock recognizers, most specific first.
///
/// RAID and crypto containers come before filesystems because a RAID
/// member may also carry a valid-looking filesystem at its data offset.
pub(crate) fn register_all(chain: &mut Chain) {
    chain.register(MdRaidRecognizer);
    chain.register(LuksRecognizer);
    chain.register(ExtRecognizer::new(ExtKind::Ext4));
    chain.register(ExtRecognizer::new(ExtKind::Ext3));
    chain.register(ExtRecognizer::new(ExtKind::Ext2));
    chain.register(VfatRecognizer);
    chain.register(NtfsRecognizer);
    chain.register(SwapRecognizer);
}
