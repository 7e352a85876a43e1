//! Erasure of a matched signature's magic bytes.

use crate::error::{ProbeError, Result};
use crate::reader::ByteReader;
use crate::types::Match;
use serde::Serialize;
use std::io;

/// The region a wipe zeroed, or would zero in a dry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WipeRegion {
    pub type_name: &'static str,
    pub offset: u64,
    pub length: u64,
    pub dry_run: bool,
}

/// Zeroes the magic of `signature` and flushes, unless `dry_run`.
///
/// Only the magic bytes are written; the rest of the metadata is left as is.
pub(crate) fn wipe_signature(
    reader: &mut ByteReader,
    signature: &Match,
    dry_run: bool,
) -> Result<WipeRegion> {
    let magic = signature
        .magic
        .ok_or(ProbeError::State("matched signature has no magic to wipe"))?;

    let region = WipeRegion {
        type_name: signature.type_name,
        offset: magic.offset,
        length: magic.length,
        dry_run,
    };
    if dry_run {
        tracing::debug!(type_name = region.type_name, offset = region.offset, length = region.length, "dry-run wipe");
        return Ok(region);
    }

    if !reader.is_writable() {
        return Err(ProbeError::io(
            magic.offset,
            io::Error::new(io::ErrorKind::PermissionDenied, "device is not open for writing"),
        ));
    }

    let length = usize::try_from(magic.length)
        .map_err(|_| ProbeError::State("magic region too large"))?;
    reader.zero(magic.offset, length)?;
    reader.sync()?;

    tracing::debug!(type_name = region.type_name, offset = region.offset, length = region.length, "wiped signature");
    Ok(region)
}
