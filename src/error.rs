use thiserror::Error;

/// Errors returned by probing sessions.
///
/// "No signature found" is not an error: probing calls report it as
/// [`ProbeStatus::NothingFound`](crate::ProbeStatus::NothingFound).
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("I/O error at offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Read of {length} bytes at offset {offset} is outside device of {size} bytes")]
    OutOfBounds { offset: i64, length: usize, size: u64 },

    #[error("Invalid handle: probe session is closed")]
    InvalidHandle,

    #[error("Scan failed in {recognizer} at offset {offset}: {source}")]
    Scan {
        recognizer: &'static str,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Ambiguous result: conflicting signatures {}", .types.join(", "))]
    Ambiguous { types: Vec<String> },

    #[error("Invalid state: {0}")]
    State(&'static str),

    #[error("Invalid {chain} flags: {bits:#x}")]
    InvalidFlags { chain: &'static str, bits: u32 },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ProbeError {
    pub(crate) fn io(offset: u64, source: std::io::Error) -> Self {
        Self::Io { offset, source }
    }

    /// True for errors raised because a read fell outside the device window.
    #[must_use]
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, Self::OutOfBounds { .. })
    }

    /// True when the error is a conflicting-signatures report from a safe probe.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProbeError>;
