#![no_main]

use blkprobe::{MemoryDevice, ProbeOptions, ProbeStatus, Session};
use libfuzzer_sys::fuzz_target;

// Wiping every signature must terminate, and a fresh scan afterwards must
// not find a magic in any region that was zeroed.
fuzz_target!(|data: &[u8]| {
    let options = ProbeOptions::default().with_partitions(true);
    let Ok(mut session) = Session::from_options(MemoryDevice::writable(data.to_vec()), &options)
    else {
        return;
    };

    let mut wiped = Vec::new();
    while let Ok(ProbeStatus::Matched) = session.do_probe() {
        match session.do_wipe(false) {
            Ok(region) => wiped.push((region.offset, region.length)),
            Err(_) => return,
        }
    }

    if session.reset_probe().is_err() {
        return;
    }
    while let Ok(ProbeStatus::Matched) = session.do_probe() {
        for found in session.matches() {
            if let Some(magic) = found.magic {
                assert!(
                    !wiped.contains(&(magic.offset, magic.length)),
                    "{} found again at {} after wipe",
                    found.type_name,
                    magic.offset
                );
            }
        }
    }
});
