use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Spectral transform strategy applied to every block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    /// One real FFT per block per channel, per-band selection/averaging.
    Direct,
    /// Continuous wavelet analogue over a single whole-interval block.
    STransform,
    /// Polarity-robust broadband estimator across channels.
    FftApprox,
}

/// Window applied to block samples before the forward transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// Raw samples, no tapering.
    None,
    /// Hanning over the whole block.
    Hanning,
    /// Hanning taper on the block edges only, flat middle.
    HanningBorder,
}

/// Value stored per saved frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtomKind {
    /// Real part of the spectral coefficient.
    Real,
    /// Magnitude of the spectral coefficient.
    Norm,
    /// Squared magnitude (power).
    Power,
    /// Real and imaginary parts, interleaved in the output.
    Complex,
    /// Phase angle in radians.
    Phase,
}

impl AtomKind {
    /// Output slots occupied per saved frequency.
    pub fn slots(self) -> usize {
        match self {
            AtomKind::Complex => 2,
            _ => 1,
        }
    }

    /// Whether adjacent raw bins may be merged by averaging.
    ///
    /// Averaging complex or phase values is meaningless and never happens.
    pub fn averages(self) -> bool {
        !matches!(self, AtomKind::Complex | AtomKind::Phase)
    }
}

/// Energy rescaling convention applied by the Fourier primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rescaling {
    /// Raw transform output.
    None,
    /// Divide by the square root of the transform length.
    Sqrt,
    /// Divide by the transform length.
    Full,
}

/// Output layout across blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// One output time bin per block.
    Sequential,
    /// One output time bin holding the average over all good blocks.
    Averaged,
}

/// How saved frequency bands are laid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BandingPolicy {
    /// Explicit list of textual "min-max" Hz pairs, one saved value per band.
    Explicit {
        /// Band list text, e.g. `"1-4 4-8 8-12 12-30"`.
        bands: String,
    },
    /// Evenly log-spaced band edges between two frequencies.
    Log {
        /// Lower frequency bound in Hz.
        min_hz: f64,
        /// Upper frequency bound in Hz.
        max_hz: f64,
        /// Number of bands per decade.
        steps_per_decade: f64,
        /// Merge the bins inside each band; single raw bin when false.
        #[serde(default = "default_true")]
        average: bool,
    },
    /// A single band stepped by a fixed Hz increment.
    Linear {
        /// Lower frequency bound in Hz.
        min_hz: f64,
        /// Upper frequency bound in Hz.
        max_hz: f64,
        /// Saved frequency step in Hz, rounded to whole raw bins.
        step_hz: f64,
    },
}

/// Empirically tuned constants, overridable per run.
///
/// The defaults are carried over from long-standing practice; they are not
/// re-derived anywhere in the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    /// Target minimum averaging resolution in Hz for sub-bin merging.
    #[serde(default = "default_avg_min_step_hz")]
    pub avg_min_step_hz: f64,
    /// Cap on merged sub-frequencies for the S-Transform strategy.
    #[serde(default = "default_stransform_max_sub_count")]
    pub stransform_max_sub_count: usize,
    /// Cone-of-influence taper width, in periods of the analyzed frequency.
    #[serde(default = "default_coi_cycles")]
    pub coi_cycles: f64,
    /// Overlap fraction above which the block step collapses to one sample.
    #[serde(default = "default_single_step_overlap")]
    pub single_step_overlap: f64,
    /// Floor applied to log-interval band edges before taking log10.
    #[serde(default = "default_log_epsilon_hz")]
    pub log_epsilon_hz: f64,
    /// Character budget for per-frequency display labels.
    #[serde(default = "default_label_char_budget")]
    pub label_char_budget: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            avg_min_step_hz: default_avg_min_step_hz(),
            stransform_max_sub_count: default_stransform_max_sub_count(),
            coi_cycles: default_coi_cycles(),
            single_step_overlap: default_single_step_overlap(),
            log_epsilon_hz: default_log_epsilon_hz(),
            label_char_budget: default_label_char_budget(),
        }
    }
}

/// Full configuration of one spectral analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Transform strategy.
    #[serde(default = "default_strategy")]
    pub strategy: TransformKind,
    /// Block size in samples. Forced to the window length for the S-Transform.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Block overlap fraction in [0, 1). Forced to 0 for the S-Transform.
    #[serde(default = "default_overlap")]
    pub overlap: f64,
    /// Windowing function applied before the forward transform.
    #[serde(default = "default_window")]
    pub window: WindowKind,
    /// Value stored per saved frequency.
    #[serde(default = "default_atom")]
    pub atom: AtomKind,
    /// Sequential-in-time or block-averaged output.
    #[serde(default = "default_output")]
    pub output: OutputMode,
    /// Downsample the output time axis (S-Transform only).
    #[serde(default = "default_false")]
    pub downsample: bool,
    /// Taper the block edges of S-Transform voices (cone of influence).
    #[serde(default = "default_true")]
    pub cone_of_influence: bool,
    /// Energy rescaling convention for the Fourier primitive.
    #[serde(default = "default_rescaling")]
    pub rescaling: Rescaling,
    /// Worker count for per-channel work (0 = auto).
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Frequency banding policy.
    #[serde(default = "default_banding")]
    pub banding: BandingPolicy,
    /// Empirical constants.
    #[serde(default)]
    pub tuning: Tuning,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            block_size: default_block_size(),
            overlap: default_overlap(),
            window: default_window(),
            atom: default_atom(),
            output: default_output(),
            downsample: default_false(),
            cone_of_influence: default_true(),
            rescaling: default_rescaling(),
            worker_count: default_worker_count(),
            banding: default_banding(),
            tuning: Tuning::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parse a config from a TOML string.
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        toml::from_str(text).map_err(|err| EngineError::ConfigParseStr(Box::new(err)))
    }

    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| EngineError::ConfigParse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    /// Reject configurations that can never produce a valid run.
    ///
    /// Runs fail here before any block is processed; there is no partial
    /// output.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.block_size == 0 {
            return Err(EngineError::InvalidBlockSize {
                block_size: self.block_size,
            });
        }
        if !(0.0..1.0).contains(&self.overlap) || !self.overlap.is_finite() {
            return Err(EngineError::InvalidOverlap {
                overlap: self.overlap,
            });
        }
        if self.output == OutputMode::Averaged && !self.atom.averages() {
            return Err(EngineError::UndefinedAverage { atom: self.atom });
        }
        Ok(())
    }
}

fn default_strategy() -> TransformKind {
    TransformKind::Direct
}

fn default_block_size() -> usize {
    1024
}

fn default_overlap() -> f64 {
    0.0
}

fn default_window() -> WindowKind {
    WindowKind::Hanning
}

fn default_banding() -> BandingPolicy {
    BandingPolicy::Linear {
        min_hz: 1.0,
        max_hz: 40.0,
        step_hz: 1.0,
    }
}

fn default_atom() -> AtomKind {
    AtomKind::Norm
}

fn default_output() -> OutputMode {
    OutputMode::Sequential
}

fn default_rescaling() -> Rescaling {
    Rescaling::Sqrt
}

fn default_worker_count() -> usize {
    0
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_avg_min_step_hz() -> f64 {
    0.5
}

fn default_stransform_max_sub_count() -> usize {
    7
}

fn default_coi_cycles() -> f64 {
    2.0
}

fn default_single_step_overlap() -> f64 {
    0.75
}

fn default_log_epsilon_hz() -> f64 {
    0.1
}

fn default_label_char_budget() -> usize {
    10
}
