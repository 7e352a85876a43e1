//! Subscriber setup for the command-line tool.
//!
//! The library only emits `tracing` events; nothing is printed unless a
//! binary installs a subscriber through [`init`].

use tracing_subscriber::{EnvFilter, fmt};

/// Installs a stderr subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `verbose` selects `debug` over
/// `info` for this crate.
pub fn init(verbose: bool) {
    let default_directive = if verbose {
        "blkprobe=debug"
    } else {
        "blkprobe=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
