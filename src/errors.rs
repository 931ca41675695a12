use std::path::PathBuf;

use thiserror::Error;

use crate::config::AtomKind;

/// Errors that can fail a spectral analysis run before any block is processed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Block size must be at least one sample.
    #[error("Block size must be positive, got {block_size}")]
    InvalidBlockSize {
        /// Configured block size.
        block_size: usize,
    },
    /// Overlap fraction must lie in [0, 1).
    #[error("Block overlap must be in [0, 1), got {overlap}")]
    InvalidOverlap {
        /// Configured overlap fraction.
        overlap: f64,
    },
    /// The requested analysis window is empty or exceeds the recording.
    #[error("Invalid analysis window [{from}, {to}] for a recording of {total} samples")]
    InvalidWindow {
        /// First requested sample.
        from: usize,
        /// Last requested sample.
        to: usize,
        /// Samples available in the recording.
        total: usize,
    },
    /// The window is shorter than one block.
    #[error("Window of {samples} samples cannot fit a block of {block_size}")]
    NoBlocks {
        /// Samples in the analysis window.
        samples: usize,
        /// Effective block size.
        block_size: usize,
    },
    /// The channel selection resolved to no channels.
    #[error("Channel selection {selection:?} matched no channels")]
    NoChannels {
        /// Selection expression as given by the caller.
        selection: String,
    },
    /// The banding policy produced no frequency bands.
    #[error("Banding policy produced no frequency bands")]
    NoBands,
    /// An explicit band list contained no parsable "min-max" pair.
    #[error("No frequency bands found in {text:?}")]
    BadBandList {
        /// Band list text as given by the caller.
        text: String,
    },
    /// Complex and phase values cannot be accumulated across blocks.
    #[error("Cannot time-average {atom:?} values across blocks")]
    UndefinedAverage {
        /// Atom type that was requested together with averaged output.
        atom: AtomKind,
    },
    /// Failed to read a config file.
    #[error("Failed to read {path}: {source}")]
    ConfigRead {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ConfigParse {
        /// TOML file path.
        path: PathBuf,
        /// TOML parse error.
        source: Box<toml::de::Error>,
    },
    /// Failed to parse a TOML config string.
    #[error("Invalid config: {0}")]
    ConfigParseStr(#[source] Box<toml::de::Error>),
}
