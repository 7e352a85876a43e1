//! Ordered recognizer chains and the process-wide registry.

use crate::partitions;
use crate::superblocks;
use crate::traits::Recognizer;
use crate::types::{ChainKind, Usage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, LazyLock};

static BUILTIN: LazyLock<Arc<Registry>> = LazyLock::new(|| Arc::new(Registry::builtin_uncached()));

/// An ordered list of recognizers of one category.
///
/// Order is significant: single-step probing reports the first match.
#[derive(Clone)]
pub struct Chain {
    kind: ChainKind,
    recognizers: Vec<Arc<dyn Recognizer>>,
}

impl Chain {
    pub fn new(kind: ChainKind) -> Self {
        Self {
            kind,
            recognizers: Vec::new(),
        }
    }

    pub fn register(&mut self, recognizer: impl Recognizer + 'static) {
        self.recognizers.push(Arc::new(recognizer));
    }

    #[inline]
    pub fn kind(&self) -> ChainKind {
        self.kind
    }

    pub fn recognizers(&self) -> &[Arc<dyn Recognizer>] {
        &self.recognizers
    }

    pub fn len(&self) -> usize {
        self.recognizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recognizers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.recognizers.iter().map(|r| r.name())
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("kind", &self.kind)
            .field("recognizers", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// The superblocks and partitions chains.
///
/// Built once and shared read-only by every session; see
/// [`Registry::builtin`].
///
/// # Example
///
/// ```
/// use blkprobe::Registry;
///
/// let registry = Registry::builtin();
/// assert!(registry.superblocks().names().any(|n| n == "ext4"));
/// assert!(registry.partitions().names().any(|n| n == "gpt"));
/// ```
#[derive(Debug, Clone)]
pub struct Registry {
    superblocks: Chain,
    partitions: Chain,
}

impl Registry {
    /// Creates a registry with two empty chains.
    pub fn new() -> Self {
        Self {
            superblocks: Chain::new(ChainKind::Superblocks),
            partitions: Chain::new(ChainKind::Partitions),
        }
    }

    /// The shared registry holding every built-in recognizer.
    pub fn builtin() -> Arc<Registry> {
        Arc::clone(&BUILTIN)
    }

    fn builtin_uncached() -> Self {
        let mut registry = Self::new();
        superblocks::register_all(&mut registry.superblocks);
        partitions::register_all(&mut registry.partitions);
        registry
    }

    pub fn register_superblock(&mut self, recognizer: impl Recognizer + 'static) {
        self.superblocks.register(recognizer);
    }

    pub fn register_partition(&mut self, recognizer: impl Recognizer + 'static) {
        self.partitions.register(recognizer);
    }

    pub fn chain(&self, kind: ChainKind) -> &Chain {
        match kind {
            ChainKind::Superblocks => &self.superblocks,
            ChainKind::Partitions => &self.partitions,
        }
    }

    pub fn superblocks(&self) -> &Chain {
        &self.superblocks
    }

    pub fn partitions(&self) -> &Chain {
        &self.partitions
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// How a filter's list selects recognizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterMode {
    /// Probe only recognizers in the list.
    OnlyIn,
    /// Probe every recognizer except those in the list.
    NotIn,
}

/// Per-session state of one chain.
#[derive(Debug, Clone)]
pub(crate) struct ChainState {
    pub enabled: bool,
    skipped: Vec<bool>,
}

impl ChainState {
    pub fn new(enabled: bool, chain_len: usize) -> Self {
        Self {
            enabled,
            skipped: vec![false; chain_len],
        }
    }

    #[inline]
    pub fn is_skipped(&self, index: usize) -> bool {
        self.skipped.get(index).copied().unwrap_or(false)
    }

    pub fn is_filtered(&self) -> bool {
        self.skipped.iter().any(|&s| s)
    }

    /// Replaces the filter with one selecting recognizers by `pred`.
    pub fn apply_filter(
        &mut self,
        chain: &Chain,
        mode: FilterMode,
        pred: impl Fn(&dyn Recognizer) -> bool,
    ) {
        self.skipped = chain
            .recognizers()
            .iter()
            .map(|r| {
                let listed = pred(r.as_ref());
                match mode {
                    FilterMode::OnlyIn => !listed,
                    FilterMode::NotIn => listed,
                }
            })
            .collect();
    }

    pub fn filter_types(&mut self, chain: &Chain, mode: FilterMode, names: &[&str]) {
        self.apply_filter(chain, mode, |r| names.contains(&r.name()));
    }

    pub fn filter_usage(&mut self, chain: &Chain, mode: FilterMode, usages: &[Usage]) {
        self.apply_filter(chain, mode, |r| r.usage().is_some_and(|u| usages.contains(&u)));
    }

    pub fn reset_filter(&mut self) {
        self.skipped.iter_mut().for_each(|s| *s = false);
    }
}
