#![no_main]

use blkprobe::{MemoryDevice, PartitionFlags, ProbeOptions, Session, SuperblockFlags};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let options = ProbeOptions::default()
        .with_partitions(true)
        .with_superblocks_flags(SuperblockFlags::all())
        .with_partitions_flags(PartitionFlags::all());
    let Ok(mut session) = Session::from_options(MemoryDevice::new(data.to_vec()), &options) else {
        return;
    };
    let _ = session.do_safeprobe();
    let _ = session.do_fullprobe();
    let _ = session.probe_results();
});
