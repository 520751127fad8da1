//! Encoder and decoder options.
//!
//! [`StreamOptions`] holds everything needed to build a single-stream encoder
//! or decoder; the optional [`ParallelConfig`] switches the `io` frontends to
//! the block-parallel pipeline. Every setter validates its argument and
//! returns [`Lzma2Error::Configuration`] instead of clamping.

use std::fmt;
use std::sync::{Arc, OnceLock};

use rayon::prelude::*;

use crate::config::{default_affinity, AFFINITY_MAX, BUFFER_POOL_LIMIT_DEFAULT, GB, KB, MB, PRESET_DEFAULT};
use crate::error::{Lzma2Error, Result};
use crate::frame::writer::ChunkEncoder;
use crate::frame::reader;
use crate::io::manager::ParallelManager;
use crate::lzma::{LzmaProps, LC_LP_MAX, PB_MAX};

// ─────────────────────────────────────────────────────────────────────────────
// Limits
// ─────────────────────────────────────────────────────────────────────────────

pub const DICT_SIZE_MIN: usize = 4 * KB;
pub const DICT_SIZE_MAX: usize = 1_610_604_270;
pub const NICE_LEN_MIN: usize = 8;
pub const NICE_LEN_MAX: usize = 273;
pub const PRESET_MIN: u32 = 0;
pub const PRESET_MAX: u32 = 9;
pub const PARALLEL_BLOCK_SIZE_MIN: usize = 64 * KB;
pub const PARALLEL_BLOCK_SIZE_MAX: usize = 256 * MB;

const PRESET_DICT_SIZES: [usize; 10] = [
    256 * KB,
    MB,
    2 * MB,
    4 * MB,
    4 * MB,
    8 * MB,
    8 * MB,
    16 * MB,
    32 * MB,
    64 * MB,
];
const PRESET_FAST_DEPTHS: [u32; 4] = [4, 8, 24, 48];

// ─────────────────────────────────────────────────────────────────────────────
// Enums
// ─────────────────────────────────────────────────────────────────────────────

/// Compression mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Store every chunk raw.
    Uncompressed,
    /// Greedy parsing with one byte of look-ahead.
    Fast,
    /// Price-based optimal parsing.
    Normal,
}

/// Match finder used by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchFinder {
    /// Hash chains.
    Hc4,
    /// Binary trees.
    Bt4,
}

/// How dictionary history crosses block boundaries in parallel mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DictMode {
    /// Every block starts with an empty dictionary.
    None,
    /// The tail of block k is copied as the preset of block k+1 before the
    /// job is submitted.
    #[default]
    Sync,
    /// The worker of block k+1 assembles its preset itself from raw blocks
    /// the session retains.
    Async,
}

// ─────────────────────────────────────────────────────────────────────────────
// ParallelConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Settings for the block-parallel encoder and decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelConfig {
    block_size: Option<usize>,
    dict_mode: DictMode,
    affinity: usize,
    buffer_pool_limit: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        ParallelConfig {
            block_size: None,
            dict_mode: DictMode::default(),
            affinity: default_affinity(),
            buffer_pool_limit: BUFFER_POOL_LIMIT_DEFAULT,
        }
    }
}

impl ParallelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit block size, or `None` when derived from the dictionary size.
    pub fn block_size(&self) -> Option<usize> {
        self.block_size
    }

    /// Set the block size; `None` restores the derived default.
    pub fn set_block_size(&mut self, size: Option<usize>) -> Result<()> {
        if let Some(s) = size {
            if !(PARALLEL_BLOCK_SIZE_MIN..=PARALLEL_BLOCK_SIZE_MAX).contains(&s) {
                return Err(Lzma2Error::config(format!(
                    "block size {s} outside [{PARALLEL_BLOCK_SIZE_MIN}, {PARALLEL_BLOCK_SIZE_MAX}]"
                )));
            }
        }
        self.block_size = size;
        Ok(())
    }

    pub fn dict_mode(&self) -> DictMode {
        self.dict_mode
    }

    pub fn set_dict_mode(&mut self, mode: DictMode) {
        self.dict_mode = mode;
    }

    /// Maximum number of workers one session runs at the same time.
    pub fn affinity(&self) -> usize {
        self.affinity
    }

    pub fn set_affinity(&mut self, affinity: usize) -> Result<()> {
        if !(1..=AFFINITY_MAX).contains(&affinity) {
            return Err(Lzma2Error::config(format!(
                "affinity {affinity} outside [1, {AFFINITY_MAX}]"
            )));
        }
        self.affinity = affinity;
        Ok(())
    }

    /// Ceiling on pooled buffer memory, in bytes.
    pub fn buffer_pool_limit(&self) -> usize {
        self.buffer_pool_limit
    }

    pub fn set_buffer_pool_limit(&mut self, limit: usize) -> Result<()> {
        if limit == 0 {
            return Err(Lzma2Error::config("buffer pool limit must be positive"));
        }
        self.buffer_pool_limit = limit;
        Ok(())
    }

    /// Block size used with a dictionary of `dict_size` bytes.
    ///
    /// The derived default is `4 × dict_size` clamped into [1 MiB, 256 MiB],
    /// never below `dict_size`, rounded up to a whole MiB.
    pub fn block_size_for(&self, dict_size: usize) -> usize {
        if let Some(s) = self.block_size {
            return s;
        }
        let size = dict_size
            .saturating_mul(4)
            .clamp(MB, PARALLEL_BLOCK_SIZE_MAX)
            .max(dict_size);
        size.div_ceil(MB) * MB
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StreamOptions
// ─────────────────────────────────────────────────────────────────────────────

/// Options for one compressed stream.
pub struct StreamOptions {
    dict_size: usize,
    preset_dict: Option<Arc<[u8]>>,
    props: LzmaProps,
    mode: Mode,
    nice_len: usize,
    mf: MatchFinder,
    depth_limit: u32,
    parallel: Option<ParallelConfig>,
    manager: OnceLock<Arc<ParallelManager>>,
}

impl Clone for StreamOptions {
    /// Copies the stream settings only; the clone has no parallel
    /// configuration and no parallel manager.
    fn clone(&self) -> Self {
        StreamOptions {
            dict_size: self.dict_size,
            preset_dict: self.preset_dict.clone(),
            props: self.props,
            mode: self.mode,
            nice_len: self.nice_len,
            mf: self.mf,
            depth_limit: self.depth_limit,
            parallel: None,
            manager: OnceLock::new(),
        }
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("dict_size", &self.dict_size)
            .field("preset_dict_len", &self.preset_dict.as_ref().map(|p| p.len()))
            .field("props", &self.props)
            .field("mode", &self.mode)
            .field("nice_len", &self.nice_len)
            .field("mf", &self.mf)
            .field("depth_limit", &self.depth_limit)
            .field("parallel", &self.parallel)
            .finish()
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::preset_unchecked(PRESET_DEFAULT)
    }
}

impl StreamOptions {
    /// Options of the default preset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options of preset `preset` (0..=9).
    pub fn with_preset(preset: u32) -> Result<Self> {
        let mut o = Self::default();
        o.set_preset(preset)?;
        Ok(o)
    }

    fn preset_unchecked(preset: u32) -> Self {
        let mut o = StreamOptions {
            dict_size: 0,
            preset_dict: None,
            props: LzmaProps::DEFAULT,
            mode: Mode::Normal,
            nice_len: 64,
            mf: MatchFinder::Bt4,
            depth_limit: 0,
            parallel: None,
            manager: OnceLock::new(),
        };
        o.apply_preset(preset);
        o
    }

    fn apply_preset(&mut self, preset: u32) {
        let p = preset as usize;
        self.props = LzmaProps::DEFAULT;
        self.dict_size = PRESET_DICT_SIZES[p];
        if p <= 3 {
            self.mode = Mode::Fast;
            self.mf = MatchFinder::Hc4;
            self.nice_len = if p <= 1 { 128 } else { NICE_LEN_MAX };
            self.depth_limit = PRESET_FAST_DEPTHS[p];
        } else {
            self.mode = Mode::Normal;
            self.mf = MatchFinder::Bt4;
            self.nice_len = match p {
                4 => 16,
                5 => 32,
                _ => 64,
            };
            self.depth_limit = 0;
        }
    }

    /// Reset dictionary size, properties, mode, nice length, match finder and
    /// depth limit to preset `preset`. The preset dictionary and the parallel
    /// settings are kept.
    pub fn set_preset(&mut self, preset: u32) -> Result<()> {
        if !(PRESET_MIN..=PRESET_MAX).contains(&preset) {
            return Err(Lzma2Error::config(format!("unsupported preset: {preset}")));
        }
        self.apply_preset(preset);
        self.manager = OnceLock::new();
        Ok(())
    }

    pub fn dict_size(&self) -> usize {
        self.dict_size
    }

    pub fn set_dict_size(&mut self, dict_size: usize) -> Result<()> {
        if !(DICT_SIZE_MIN..=DICT_SIZE_MAX).contains(&dict_size) {
            return Err(Lzma2Error::config(format!(
                "dictionary size {dict_size} outside [{DICT_SIZE_MIN}, {DICT_SIZE_MAX}]"
            )));
        }
        self.dict_size = dict_size;
        // The manager sized its blocks for the old dictionary.
        self.manager = OnceLock::new();
        Ok(())
    }

    /// Preset dictionary shared by the encoder and the decoder.
    pub fn preset_dict(&self) -> Option<&[u8]> {
        self.preset_dict.as_deref()
    }

    /// Set or clear the preset dictionary. An empty slice clears it.
    pub fn set_preset_dict(&mut self, dict: Option<&[u8]>) {
        self.preset_dict = dict.filter(|d| !d.is_empty()).map(Arc::from);
    }

    pub(crate) fn preset_dict_arc(&self) -> Option<Arc<[u8]>> {
        self.preset_dict.clone()
    }

    pub fn props(&self) -> LzmaProps {
        self.props
    }

    /// Set `lc`, `lp` and `pb` together.
    pub fn set_props(&mut self, props: LzmaProps) -> Result<()> {
        if props.lc > LC_LP_MAX || props.lp > LC_LP_MAX || props.lc + props.lp > LC_LP_MAX {
            return Err(Lzma2Error::config(format!(
                "lc + lp must not exceed {LC_LP_MAX} (lc = {}, lp = {})",
                props.lc, props.lp
            )));
        }
        if props.pb > PB_MAX {
            return Err(Lzma2Error::config(format!("pb {} exceeds {PB_MAX}", props.pb)));
        }
        self.props = props;
        Ok(())
    }

    /// Set literal context and literal position bits.
    pub fn set_lc_lp(&mut self, lc: u32, lp: u32) -> Result<()> {
        self.set_props(LzmaProps { lc, lp, ..self.props })
    }

    pub fn set_pb(&mut self, pb: u32) -> Result<()> {
        self.set_props(LzmaProps { pb, ..self.props })
    }

    /// Properties byte `(pb * 5 + lp) * 9 + lc`.
    pub fn props_byte(&self) -> u8 {
        self.props.to_byte()
    }

    pub fn set_props_byte(&mut self, byte: u8) -> Result<()> {
        let props = LzmaProps::from_byte(byte)
            .ok_or_else(|| Lzma2Error::config(format!("invalid properties byte {byte:#04x}")))?;
        self.props = props;
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn nice_len(&self) -> usize {
        self.nice_len
    }

    pub fn set_nice_len(&mut self, nice_len: usize) -> Result<()> {
        if !(NICE_LEN_MIN..=NICE_LEN_MAX).contains(&nice_len) {
            return Err(Lzma2Error::config(format!(
                "nice length {nice_len} outside [{NICE_LEN_MIN}, {NICE_LEN_MAX}]"
            )));
        }
        self.nice_len = nice_len;
        Ok(())
    }

    pub fn match_finder(&self) -> MatchFinder {
        self.mf
    }

    pub fn set_match_finder(&mut self, mf: MatchFinder) {
        self.mf = mf;
    }

    /// Match finder search depth; 0 picks a default from the nice length.
    pub fn depth_limit(&self) -> u32 {
        self.depth_limit
    }

    pub fn set_depth_limit(&mut self, depth: u32) {
        self.depth_limit = depth;
    }

    pub fn parallel(&self) -> Option<&ParallelConfig> {
        self.parallel.as_ref()
    }

    /// Enable or disable the parallel pipeline. Any manager built for the
    /// previous configuration is dropped.
    pub fn set_parallel(&mut self, config: Option<ParallelConfig>) {
        self.parallel = config;
        self.manager = OnceLock::new();
    }

    /// Manager shared by every parallel stream built from these options,
    /// created on first use. `None` without a parallel configuration.
    pub fn parallel_manager(&self) -> Result<Option<Arc<ParallelManager>>> {
        if self.parallel.is_none() {
            return Ok(None);
        }
        if let Some(m) = self.manager.get() {
            return Ok(Some(Arc::clone(m)));
        }
        let m = Arc::new(ParallelManager::new(self)?);
        // A racing caller may have won; both managers are equivalent.
        Ok(Some(Arc::clone(self.manager.get_or_init(|| m))))
    }

    /// Encoder memory usage in KiB.
    pub fn encoder_memory_usage(&self) -> usize {
        ChunkEncoder::memory_usage(self)
    }

    /// Decoder memory usage in KiB.
    pub fn decoder_memory_usage(&self) -> usize {
        reader::memory_usage(self.dict_size)
    }

    /// Try every `(lc, lp, pb)` with `lc + lp <= 4` on `sample`, keep the
    /// combination giving the smallest stream and return that size.
    pub fn find_best_props(&mut self, sample: &[u8]) -> Result<usize> {
        let mut trial = self.clone();
        trial.dict_size = self.dict_size.min(sample.len()).max(DICT_SIZE_MIN);

        let candidates: Vec<LzmaProps> = (0..=PB_MAX)
            .flat_map(|pb| {
                (0..=LC_LP_MAX).flat_map(move |lc| {
                    (0..=LC_LP_MAX - lc).map(move |lp| LzmaProps { lc, lp, pb })
                })
            })
            .collect();

        let (size, best) = candidates
            .par_iter()
            .enumerate()
            .map(|(i, &props)| {
                let mut o = trial.clone();
                o.props = props;
                let mut enc = ChunkEncoder::new(&o);
                let mut out = Vec::new();
                enc.write(sample, &mut out)?;
                enc.finish(&mut out)?;
                Ok((out.len(), i))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .min()
            .ok_or_else(|| Lzma2Error::config("no property candidates"))?;

        self.props = candidates[best];
        Ok(size)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Display
// ─────────────────────────────────────────────────────────────────────────────

impl fmt::Display for StreamOptions {
    /// Short summary such as `23:lc4 FAST`: the dictionary size (as its log2
    /// when a power of two), non-default properties and non-normal modes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.dict_size;
        if d.is_power_of_two() {
            write!(f, "{}", d.trailing_zeros())?;
        } else if d % GB == 0 {
            write!(f, "{}G", d / GB)?;
        } else if d % MB == 0 {
            write!(f, "{}M", d / MB)?;
        } else if d % KB == 0 {
            write!(f, "{}K", d / KB)?;
        } else {
            write!(f, "{d}")?;
        }
        let def = LzmaProps::DEFAULT;
        if self.props.lc != def.lc {
            write!(f, ":lc{}", self.props.lc)?;
        }
        if self.props.lp != def.lp {
            write!(f, ":lp{}", self.props.lp)?;
        }
        if self.props.pb != def.pb {
            write!(f, ":pb{}", self.props.pb)?;
        }
        match self.mode {
            Mode::Fast => f.write_str(" FAST"),
            Mode::Uncompressed => f.write_str(" STORE"),
            Mode::Normal => Ok(()),
        }
    }
}
