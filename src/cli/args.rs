//! Command-line arguments of the `lzma2` binary.
//!
//! [`Args`] is parsed with `clap`; [`Args::stream_options`] turns it into
//! validated [`StreamOptions`]. Numeric preset shorthands (`-0` … `-9`) are
//! rewritten by [`expand_preset_flags`] before parsing.

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};

use crate::cli::arg_utils::{expand_preset_flags, parse_size_arg};
use crate::config::{default_affinity, AFFINITY_MAX, PRESET_DEFAULT};
use crate::options::{DictMode, MatchFinder, Mode, ParallelConfig, StreamOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Store,
    Fast,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MatchFinderArg {
    Hc4,
    Bt4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DictModeArg {
    None,
    Sync,
    Async,
}

#[derive(Debug, Parser)]
#[command(
    name = "lzma2",
    version,
    about = "Compress or decompress LZMA2 chunk streams",
    after_help = "Presets: -0 (fastest) .. -9 (smallest), default -6.\n\
                  Streams carry no dictionary size: decompress with the same preset or --dict."
)]
pub struct Args {
    /// Compress (default)
    #[arg(short = 'z', long, conflicts_with = "decompress")]
    pub compress: bool,

    /// Decompress
    #[arg(short, long)]
    pub decompress: bool,

    /// Write to standard output
    #[arg(short = 'c', long = "stdout")]
    pub stdout: bool,

    /// Overwrite existing output files
    #[arg(short, long)]
    pub force: bool,

    /// Keep input files (default)
    #[arg(short, long)]
    pub keep: bool,

    /// Remove input files after success
    #[arg(long = "rm", conflicts_with = "keep")]
    pub remove: bool,

    /// Compression preset
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=9))]
    pub preset: Option<u32>,

    /// Dictionary size (e.g. 8M)
    #[arg(long, value_parser = parse_size_arg)]
    pub dict: Option<usize>,

    /// Literal context bits
    #[arg(long)]
    pub lc: Option<u32>,

    /// Literal position bits
    #[arg(long)]
    pub lp: Option<u32>,

    /// Position bits
    #[arg(long)]
    pub pb: Option<u32>,

    /// Encoder mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Match finder
    #[arg(long, value_enum)]
    pub mf: Option<MatchFinderArg>,

    /// Nice match length
    #[arg(long)]
    pub nice: Option<usize>,

    /// Match finder search depth (0 = automatic)
    #[arg(long)]
    pub depth: Option<u32>,

    /// Worker threads; 1 disables the parallel pipeline
    #[arg(short = 'T', long)]
    pub threads: Option<usize>,

    /// Parallel block size (e.g. 4M)
    #[arg(long, value_parser = parse_size_arg)]
    pub block_size: Option<usize>,

    /// How blocks share the dictionary in parallel mode
    #[arg(long, value_enum, default_value_t = DictModeArg::Sync)]
    pub dict_mode: DictModeArg,

    /// Pick lc/lp/pb by trial on the first block
    #[arg(long)]
    pub tune: bool,

    /// More messages (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Fewer messages (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,

    /// Input files; standard input when absent or `-`
    pub files: Vec<PathBuf>,
}

impl Args {
    /// Parse `args` (program name first), accepting the numeric preset
    /// shorthands.
    pub fn try_parse_args<I>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = OsString>,
    {
        Args::try_parse_from(expand_preset_flags(args))
    }

    /// Notification level: 2 by default, raised by `-v`, lowered by `-q`.
    pub fn display_level(&self) -> u32 {
        (2 + u32::from(self.verbose)).saturating_sub(u32::from(self.quiet))
    }

    /// Worker count from `-T`, then `env_workers`, then the CPU count.
    pub fn affinity(&self, env_workers: Option<usize>) -> usize {
        match self.threads.or(env_workers) {
            Some(0) | None => default_affinity(),
            Some(n) => n.min(AFFINITY_MAX),
        }
    }

    /// Validated stream options for these arguments.
    pub fn stream_options(&self, env_workers: Option<usize>) -> anyhow::Result<StreamOptions> {
        let preset = self.preset.unwrap_or(PRESET_DEFAULT);
        let mut o = StreamOptions::with_preset(preset).context("invalid preset")?;

        if let Some(dict) = self.dict {
            o.set_dict_size(dict).context("invalid --dict")?;
        }
        if self.lc.is_some() || self.lp.is_some() {
            let cur = o.props();
            o.set_lc_lp(self.lc.unwrap_or(cur.lc), self.lp.unwrap_or(cur.lp))
                .context("invalid --lc/--lp")?;
        }
        if let Some(pb) = self.pb {
            o.set_pb(pb).context("invalid --pb")?;
        }
        if let Some(mode) = self.mode {
            o.set_mode(match mode {
                ModeArg::Store => Mode::Uncompressed,
                ModeArg::Fast => Mode::Fast,
                ModeArg::Normal => Mode::Normal,
            });
        }
        if let Some(mf) = self.mf {
            o.set_match_finder(match mf {
                MatchFinderArg::Hc4 => MatchFinder::Hc4,
                MatchFinderArg::Bt4 => MatchFinder::Bt4,
            });
        }
        if let Some(nice) = self.nice {
            o.set_nice_len(nice).context("invalid --nice")?;
        }
        if let Some(depth) = self.depth {
            o.set_depth_limit(depth);
        }

        let affinity = self.affinity(env_workers);
        if affinity > 1 {
            let mut p = ParallelConfig::new();
            p.set_affinity(affinity).context("invalid --threads")?;
            p.set_block_size(self.block_size).context("invalid --block-size")?;
            p.set_dict_mode(match self.dict_mode {
                DictModeArg::None => DictMode::None,
                DictModeArg::Sync => DictMode::Sync,
                DictModeArg::Async => DictMode::Async,
            });
            o.set_parallel(Some(p));
        }
        Ok(o)
    }
}
