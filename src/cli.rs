use blkprobe::{Filter, FilterMode, ProbeOptions, Usage};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "blkprobe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Low-level probing of filesystem, RAID, crypto and partition table signatures", long_about = None)]
pub struct Cli {
    /// Devices or image files to probe
    #[arg(required = true)]
    pub devices: Vec<PathBuf>,

    /// Probing strategy
    #[arg(short, long, value_enum, default_value_t = ProbeMode::Safe)]
    pub mode: ProbeMode,

    /// Also probe partition tables
    #[arg(short, long)]
    pub partitions: bool,

    /// Skip filesystem, RAID and crypto signatures
    #[arg(long)]
    pub no_superblocks: bool,

    /// Raw superblocks flag bitmask
    #[arg(long, value_name = "BITS")]
    pub sb_flags: Option<u32>,

    /// Raw partitions flag bitmask
    #[arg(long, value_name = "BITS")]
    pub pt_flags: Option<u32>,

    /// Restrict to usage classes; prefix with "no" to exclude (e.g. noraid,nocrypto)
    #[arg(short, long, value_delimiter = ',')]
    pub usage: Option<Vec<String>>,

    /// Start of the probed window in bytes
    #[arg(short = 'O', long, default_value_t = 0)]
    pub offset: u64,

    /// Length of the probed window in bytes
    #[arg(short = 'S', long)]
    pub size: Option<u64>,

    /// Erase every detected signature
    #[arg(long)]
    pub wipe: bool,

    /// Report what --wipe would erase without writing
    #[arg(long, requires = "wipe")]
    pub dry_run: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// JSON file with probing options
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProbeMode {
    /// Fail on conflicting signatures
    Safe,
    /// Report every signature found
    Full,
    /// Stop at the first signature
    Normal,
}

/// Parses a blkid-style usage list such as `filesystem,raid` or
/// `nocrypto,noother`. Mixing included and excluded classes is an error.
pub fn parse_usage_filter(list: &[String]) -> Result<Filter, String> {
    let mut mode = None;
    let mut usages = Vec::with_capacity(list.len());

    for item in list {
        let (item_mode, name) = match item.strip_prefix("no") {
            Some(rest) => (FilterMode::NotIn, rest),
            None => (FilterMode::OnlyIn, item.as_str()),
        };
        if mode.is_some_and(|m| m != item_mode) {
            return Err(format!("cannot mix included and excluded usages: {}", list.join(",")));
        }
        mode = Some(item_mode);
        usages.push(name.parse::<Usage>()?);
    }

    Ok(Filter::Usage {
        mode: mode.unwrap_or(FilterMode::OnlyIn),
        usages,
    })
}

impl Cli {
    /// Applies command-line overrides on top of `base`.
    pub fn apply_to(&self, mut options: ProbeOptions) -> Result<ProbeOptions, String> {
        if self.partitions {
            options.partitions = true;
        }
        if self.no_superblocks {
            options.superblocks = false;
        }
        if let Some(bits) = self.sb_flags {
            options.superblocks_flags = bits;
        }
        if let Some(bits) = self.pt_flags {
            options.partitions_flags = bits;
        }
        if let Some(list) = &self.usage {
            options.superblocks_filter = Some(parse_usage_filter(list)?);
        }
        if self.offset != 0 || self.size.is_some() {
            options.window.offset = self.offset;
            options.window.size = self.size;
        }
        Ok(options)
    }
}
