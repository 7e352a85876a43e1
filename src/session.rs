//! Probing sessions: chain traversal, probing strategies and results.

use crate::chain::{ChainState, FilterMode, Registry};
use crate::error::{ProbeError, Result};
use crate::flags::{PartitionFlags, SuperblockFlags};
use crate::io::{Device, DeviceWindow, OpenMode};
use crate::options::{Filter, ProbeOptions};
use crate::reader::{ByteReader, CacheStats, DEFAULT_CACHE_BLOCKS};
use crate::recognizer;
use crate::results::ProbeResults;
use crate::traits::{BlockSource, Recognizer};
use crate::types::{ChainKind, Match, PartitionTable, Usage};
use crate::wipe::{self, WipeRegion};
use std::path::Path;
use std::sync::Arc;

/// Outcome of a probing call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Matched,
    NothingFound,
}

/// Position of the next recognizer a single-step probe will try.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Cursor {
    chain: usize,
    index: usize,
}

/// A probing session bound to one device.
///
/// The session owns its [`BlockSource`] exclusively. Dropping the session
/// closes it; [`close`](Self::close) does the same but reports flush errors.
///
/// # Example
///
/// ```
/// use blkprobe::{MemoryDevice, ProbeStatus, Session};
///
/// let mut session = Session::new(MemoryDevice::zeroed(1 << 20))?;
/// assert_eq!(session.do_safeprobe()?, ProbeStatus::NothingFound);
/// assert_eq!(session.lookup_value("SIZE")?.as_deref(), Some("1048576"));
/// # Ok::<(), blkprobe::ProbeError>(())
/// ```
pub struct Session {
    reader: Option<ByteReader>,
    registry: Arc<Registry>,
    superblocks: ChainState,
    partitions: ChainState,
    sb_flags: SuperblockFlags,
    pt_flags: PartitionFlags,
    cursor: Cursor,
    last_step: Option<Cursor>,
    matches: Vec<Match>,
    probed: bool,
    ambiguities: usize,
}

impl Session {
    /// Creates a session over the whole source with default options.
    pub fn new(source: impl BlockSource + 'static) -> Result<Self> {
        Self::from_options(source, &ProbeOptions::default())
    }

    pub fn with_window(source: impl BlockSource + 'static, window: DeviceWindow) -> Result<Self> {
        Self::from_options(source, &ProbeOptions::default().with_window(window))
    }

    /// Creates a session that probes with a custom registry.
    pub fn with_registry(source: impl BlockSource + 'static, registry: Arc<Registry>) -> Result<Self> {
        Self::with_registry_options(source, registry, &ProbeOptions::default())
    }

    pub fn with_registry_options(
        source: impl BlockSource + 'static,
        registry: Arc<Registry>,
        options: &ProbeOptions,
    ) -> Result<Self> {
        Self::build(Box::new(source), registry, options)
    }

    pub fn from_options(source: impl BlockSource + 'static, options: &ProbeOptions) -> Result<Self> {
        Self::build(Box::new(source), Registry::builtin(), options)
    }

    /// Opens a device or image file.
    pub fn open_path(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        Self::open_path_with_options(path, mode, &ProbeOptions::default())
    }

    pub fn open_path_with_options(
        path: impl AsRef<Path>,
        mode: OpenMode,
        options: &ProbeOptions,
    ) -> Result<Self> {
        let device = Device::open(path, mode).map_err(|e| ProbeError::io(0, e))?;
        Self::from_options(device, options)
    }

    fn build(
        source: Box<dyn BlockSource>,
        registry: Arc<Registry>,
        options: &ProbeOptions,
    ) -> Result<Self> {
        let sb_flags = options.superblock_flags()?;
        let pt_flags = options.partition_flags()?;
        let cache_blocks = if options.cache_blocks == 0 {
            DEFAULT_CACHE_BLOCKS
        } else {
            options.cache_blocks
        };
        let reader = ByteReader::with_capacity(source, options.window, cache_blocks)?;

        let mut session = Self {
            superblocks: ChainState::new(options.superblocks, registry.superblocks().len()),
            partitions: ChainState::new(options.partitions, registry.partitions().len()),
            reader: Some(reader),
            registry,
            sb_flags,
            pt_flags,
            cursor: Cursor::default(),
            last_step: None,
            matches: Vec::new(),
            probed: false,
            ambiguities: 0,
        };
        if let Some(filter) = &options.superblocks_filter {
            session.apply_filter(ChainKind::Superblocks, filter);
        }
        if let Some(filter) = &options.partitions_filter {
            session.apply_filter(ChainKind::Partitions, filter);
        }
        Ok(session)
    }

    /// Flushes pending writes and releases the device.
    ///
    /// The device is released even when the flush fails. Closing an
    /// already closed session is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.matches.clear();
        self.probed = false;
        match self.reader.take() {
            Some(mut reader) => reader.sync(),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.reader.is_some() {
            Ok(())
        } else {
            Err(ProbeError::InvalidHandle)
        }
    }

    fn state_mut(&mut self, kind: ChainKind) -> &mut ChainState {
        match kind {
            ChainKind::Superblocks => &mut self.superblocks,
            ChainKind::Partitions => &mut self.partitions,
        }
    }

    fn state(&self, kind: ChainKind) -> &ChainState {
        match kind {
            ChainKind::Superblocks => &self.superblocks,
            ChainKind::Partitions => &self.partitions,
        }
    }

    pub fn enable_superblocks(&mut self, enable: bool) -> Result<()> {
        self.ensure_open()?;
        self.superblocks.enabled = enable;
        Ok(())
    }

    pub fn enable_partitions(&mut self, enable: bool) -> Result<()> {
        self.ensure_open()?;
        self.partitions.enabled = enable;
        Ok(())
    }

    pub fn set_superblocks_flags(&mut self, flags: SuperblockFlags) -> Result<()> {
        self.ensure_open()?;
        self.sb_flags = flags;
        Ok(())
    }

    pub fn set_partitions_flags(&mut self, flags: PartitionFlags) -> Result<()> {
        self.ensure_open()?;
        self.pt_flags = flags;
        Ok(())
    }

    pub fn superblocks_flags(&self) -> SuperblockFlags {
        self.sb_flags
    }

    pub fn partitions_flags(&self) -> PartitionFlags {
        self.pt_flags
    }

    /// Restricts the superblocks chain to (or away from) the named types.
    pub fn filter_superblocks_type(&mut self, mode: FilterMode, names: &[&str]) -> Result<()> {
        self.ensure_open()?;
        let registry = Arc::clone(&self.registry);
        self.superblocks.filter_types(registry.superblocks(), mode, names);
        self.log_filter(ChainKind::Superblocks);
        Ok(())
    }

    pub fn filter_superblocks_usage(&mut self, mode: FilterMode, usages: &[Usage]) -> Result<()> {
        self.ensure_open()?;
        let registry = Arc::clone(&self.registry);
        self.superblocks.filter_usage(registry.superblocks(), mode, usages);
        self.log_filter(ChainKind::Superblocks);
        Ok(())
    }

    pub fn reset_superblocks_filter(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.superblocks.reset_filter();
        Ok(())
    }

    pub fn filter_partitions_type(&mut self, mode: FilterMode, names: &[&str]) -> Result<()> {
        self.ensure_open()?;
        let registry = Arc::clone(&self.registry);
        self.partitions.filter_types(registry.partitions(), mode, names);
        self.log_filter(ChainKind::Partitions);
        Ok(())
    }

    pub fn reset_partitions_filter(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.partitions.reset_filter();
        Ok(())
    }

    fn apply_filter(&mut self, kind: ChainKind, filter: &Filter) {
        let registry = Arc::clone(&self.registry);
        let chain = registry.chain(kind);
        let state = self.state_mut(kind);
        match filter {
            Filter::Type { mode, names } => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                state.filter_types(chain, *mode, &names);
            }
            Filter::Usage { mode, usages } => state.filter_usage(chain, *mode, usages),
        }
        self.log_filter(kind);
    }

    fn log_filter(&self, kind: ChainKind) {
        let chain = self.registry.chain(kind);
        let state = self.state(kind);
        tracing::debug!(
            chain = chain.kind().name(),
            filtered = state.is_filtered(),
            "chain filter updated"
        );
    }

    /// Tries recognizers one at a time, resuming where the previous call
    /// stopped, and returns at the first match.
    ///
    /// Once every recognizer has been tried this keeps returning
    /// [`ProbeStatus::NothingFound`] until [`reset_probe`](Self::reset_probe).
    pub fn do_probe(&mut self) -> Result<ProbeStatus> {
        self.ensure_open()?;
        self.matches.clear();
        self.probed = true;
        self.last_step = None;

        let registry = Arc::clone(&self.registry);
        while let Some(&kind) = ChainKind::ORDER.get(self.cursor.chain) {
            let chain = registry.chain(kind);
            if !self.state(kind).enabled || self.cursor.index >= chain.len() {
                self.cursor = Cursor {
                    chain: self.cursor.chain + 1,
                    index: 0,
                };
                continue;
            }

            let position = self.cursor;
            self.cursor.index += 1;
            if self.state(kind).is_skipped(position.index) {
                continue;
            }

            let recognizer = &chain.recognizers()[position.index];
            if let Some(found) = self.run_one(kind, recognizer.as_ref())? {
                self.matches.push(found);
                self.last_step = Some(position);
                return Ok(ProbeStatus::Matched);
            }
        }

        Ok(ProbeStatus::NothingFound)
    }

    /// Runs every enabled recognizer and fails with
    /// [`ProbeError::Ambiguous`] when two different types claim
    /// overlapping bytes. The step cursor starts over afterwards.
    pub fn do_safeprobe(&mut self) -> Result<ProbeStatus> {
        let found = self.scan_all()?;

        let (types, conflicts) = conflicting_types(&found);
        if conflicts > 0 {
            self.ambiguities = conflicts;
            tracing::debug!(types = ?types, "ambiguous probing result");
            return Err(ProbeError::Ambiguous { types });
        }

        self.matches = found;
        Ok(self.status())
    }

    /// Runs every enabled recognizer and reports all matches, merging
    /// their fields.
    pub fn do_fullprobe(&mut self) -> Result<ProbeStatus> {
        self.matches = self.scan_all()?;
        Ok(self.status())
    }

    fn scan_all(&mut self) -> Result<Vec<Match>> {
        self.ensure_open()?;
        self.matches.clear();
        self.probed = true;
        self.ambiguities = 0;
        self.last_step = None;
        self.cursor = Cursor::default();

        let registry = Arc::clone(&self.registry);
        let mut found = Vec::new();
        for kind in ChainKind::ORDER {
            if !self.state(kind).enabled {
                continue;
            }
            for (index, recognizer) in registry.chain(kind).recognizers().iter().enumerate() {
                if self.state(kind).is_skipped(index) {
                    continue;
                }
                if let Some(m) = self.run_one(kind, recognizer.as_ref())? {
                    found.push(m);
                }
            }
        }
        Ok(found)
    }

    fn run_one(&mut self, kind: ChainKind, recognizer: &dyn Recognizer) -> Result<Option<Match>> {
        let (sb_flags, pt_flags) = (self.sb_flags, self.pt_flags);
        let reader = self.reader.as_mut().ok_or(ProbeError::InvalidHandle)?;
        recognizer::run(recognizer, reader, kind, sb_flags, pt_flags)
    }

    fn status(&self) -> ProbeStatus {
        if self.matches.is_empty() {
            ProbeStatus::NothingFound
        } else {
            ProbeStatus::Matched
        }
    }

    /// Fields of the current result plus `SIZE`.
    ///
    /// Returns an owned copy that stays valid across later probing calls.
    pub fn probe_results(&self) -> Result<ProbeResults> {
        let reader = self.reader.as_ref().ok_or(ProbeError::InvalidHandle)?;
        let mut results = ProbeResults::new(reader.size());
        for m in &self.matches {
            results.merge(m.fields());
            if let Some(size) = m.content_size {
                results.set_size(size);
            }
        }
        Ok(results)
    }

    /// Looks up one field by exact name; `None` before any probe has run.
    pub fn lookup_value(&self, name: &str) -> Result<Option<String>> {
        let results = self.probe_results()?;
        if !self.probed {
            return Ok(None);
        }
        Ok(results.get(name).map(str::to_owned))
    }

    /// Matches adopted by the last probing call, in chain order.
    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    /// Partition table of the most recent partitions-chain match.
    pub fn partitions(&self) -> Option<&PartitionTable> {
        self.matches.iter().rev().find_map(|m| m.partitions.as_ref())
    }

    /// Number of conflicting pairs found by the last safe probe.
    pub fn ambiguity_count(&self) -> usize {
        self.ambiguities
    }

    pub fn cache_stats(&self) -> Result<CacheStats> {
        self.reader
            .as_ref()
            .map(ByteReader::stats)
            .ok_or(ProbeError::InvalidHandle)
    }

    /// Size of the probed window.
    pub fn device_size(&self) -> Result<u64> {
        self.reader
            .as_ref()
            .map(ByteReader::size)
            .ok_or(ProbeError::InvalidHandle)
    }

    /// Forgets the cursor, results and cached blocks.
    pub fn reset_probe(&mut self) -> Result<()> {
        let reader = self.reader.as_mut().ok_or(ProbeError::InvalidHandle)?;
        reader.clear_cache();
        self.cursor = Cursor::default();
        self.last_step = None;
        self.matches.clear();
        self.probed = false;
        self.ambiguities = 0;
        Ok(())
    }

    /// Erases the magic of the most recent match.
    ///
    /// A real wipe also steps the cursor back so the next
    /// [`do_probe`](Self::do_probe) re-examines the same format, which may
    /// carry further copies of its magic.
    pub fn do_wipe(&mut self, dry_run: bool) -> Result<WipeRegion> {
        let reader = self.reader.as_mut().ok_or(ProbeError::InvalidHandle)?;
        let last = self
            .matches
            .last()
            .ok_or(ProbeError::State("no signature matched; nothing to wipe"))?;

        let region = wipe::wipe_signature(reader, last, dry_run)?;
        if !dry_run {
            if let Some(position) = self.last_step.take() {
                self.cursor = position;
            }
        }
        Ok(region)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::debug!(error = %err, "flush on drop failed");
        }
    }
}

/// Type names involved in conflicts, and the number of conflicting pairs.
fn conflicting_types(matches: &[Match]) -> (Vec<String>, usize) {
    let mut types: Vec<String> = Vec::new();
    let mut conflicts = 0;
    for (i, a) in matches.iter().enumerate() {
        for b in &matches[i + 1..] {
            if a.conflicts_with(b) {
                conflicts += 1;
                for name in [a.type_name, b.type_name] {
                    if !types.iter().any(|t| t == name) {
                        types.push(name.to_string());
                    }
                }
            }
        }
    }
    (types, conflicts)
}
