//! Time-frequency spectral decomposition engine.
//!
//! Planner and scheduler run once to establish the grid, then the selected
//! strategy is invoked per block and channel, funneling into the shared
//! result buffer.

pub mod bands;
pub mod blocks;
pub mod output;
pub mod primitive;

mod approx;
mod direct;
mod stransform;

use rustfft::num_complex::Complex64;
use tracing::{info, warn};

use crate::config::{AnalysisConfig, AtomKind, OutputMode, TransformKind};
use crate::errors::EngineError;
use crate::pool;
use crate::report::RunReport;
use crate::source::{ArtifactIntervals, TimeSeriesSource, resolve_channels};
use bands::{BandPlan, plan_bands};
use blocks::schedule_blocks;
use output::{Marker, SpectralResult, remap_markers};

/// Everything one run needs besides the recording itself.
#[derive(Debug, Clone)]
pub struct AnalysisRequest<'a> {
    /// Run configuration.
    pub config: &'a AnalysisConfig,
    /// Channel selection expression (`"*"` or a name list).
    pub selection: &'a str,
    /// Channel names from a coordinates file, when one is available.
    ///
    /// Falls back to the names carried by the time-series itself.
    pub coordinate_names: Option<&'a [String]>,
    /// First sample of the analysis window.
    pub window_from: usize,
    /// Last sample of the analysis window.
    pub window_to: usize,
    /// Sample ranges excluded from analysis.
    pub artifacts: &'a ArtifactIntervals,
    /// Markers to carry onto the output time axis.
    pub markers: &'a [Marker],
}

/// Result buffer plus the metadata the external serializer needs.
#[derive(Debug, Clone)]
pub struct SpectralOutput {
    /// The `[time][channel][frequency]` values.
    pub result: SpectralResult,
    /// Band layout the values were saved under.
    pub plan: BandPlan,
    /// Names of the analyzed channels, in output order.
    pub channel_names: Vec<String>,
    /// Atom type tag (decides one or two slots per saved frequency).
    pub atom: AtomKind,
    /// Output sampling rate in Hz (blocks or downsampled samples per second).
    pub output_rate: f64,
    /// Per-output-time-bin offset from the window start, in seconds.
    pub time_offsets: Vec<f64>,
    /// Markers remapped onto the output time axis.
    pub markers: Vec<Marker>,
    /// Resolved-parameter log.
    pub report: RunReport,
    /// Blocks that contributed to the output.
    pub good_blocks: usize,
    /// Blocks scheduled in total.
    pub total_blocks: usize,
}

/// Shared read-only state handed to the strategy implementations.
pub(crate) struct EngineContext<'a> {
    pub config: &'a AnalysisConfig,
    pub source: &'a dyn TimeSeriesSource,
    pub channels: &'a [usize],
    pub artifacts: &'a ArtifactIntervals,
    pub plan: &'a BandPlan,
    pub workers: usize,
    pub block_size: usize,
}

/// Map one spectral coefficient through a scalar atom type.
pub(crate) fn atom_scalar(atom: AtomKind, c: Complex64) -> f64 {
    match atom {
        AtomKind::Real => c.re,
        AtomKind::Norm => c.norm(),
        AtomKind::Power => c.norm_sqr(),
        AtomKind::Phase => c.im.atan2(c.re),
        // Complex values never reduce to one scalar; callers handle the
        // two-slot case themselves.
        AtomKind::Complex => c.re,
    }
}

/// Run one spectral decomposition over `[window_from, window_to]`.
///
/// All configuration errors are rejected here, before any block is
/// processed; there is no partial output. Bad blocks are tolerated and
/// reported through the good/total counts.
pub fn analyze(
    source: &dyn TimeSeriesSource,
    request: &AnalysisRequest<'_>,
) -> Result<SpectralOutput, EngineError> {
    let config = request.config;
    config.validate()?;

    let total = source.total_samples();
    if request.window_from > request.window_to || request.window_to >= total {
        return Err(EngineError::InvalidWindow {
            from: request.window_from,
            to: request.window_to,
            total,
        });
    }
    let window_len = request.window_to - request.window_from + 1;

    let names: Vec<String> = match request.coordinate_names {
        Some(names) => names.to_vec(),
        None => (0..source.channel_count())
            .map(|c| source.channel_name(c).to_string())
            .collect(),
    };
    let channels = resolve_channels(request.selection, &names)?;
    let channel_names: Vec<String> = channels
        .iter()
        .map(|&c| names.get(c).cloned().unwrap_or_default())
        .collect();

    // The S-Transform operates on exactly one block spanning the whole
    // interval; block size and overlap are forced accordingly.
    let (block_size, overlap) = match config.strategy {
        TransformKind::STransform => (window_len, 0.0),
        _ => (config.block_size, config.overlap),
    };
    let atom = match config.strategy {
        // The constellation projection always yields real scalars.
        TransformKind::FftApprox => {
            if config.atom != AtomKind::Real {
                warn!("FFT approximation always saves real projections; atom selector ignored");
            }
            AtomKind::Real
        }
        _ => config.atom,
    };

    let sampling_rate = source.sampling_rate();
    let plan = plan_bands(
        &config.banding,
        sampling_rate,
        block_size,
        config.strategy,
        atom,
        &config.tuning,
    )?;
    let schedule = schedule_blocks(
        request.window_from,
        request.window_to,
        block_size,
        overlap,
        request.artifacts,
        &config.tuning,
    )?;

    if config.downsample && config.strategy != TransformKind::STransform {
        warn!("Downsampling only applies to the S-Transform; ignored");
    }
    let factor = if config.strategy == TransformKind::STransform && config.downsample {
        downsampling_factor(sampling_rate, plan.max_saved_hz())
    } else {
        1
    };

    let (time_bins, out_step) = match config.strategy {
        TransformKind::STransform => (window_len.div_ceil(factor), factor),
        _ => match config.output {
            OutputMode::Sequential => (schedule.blocks.len(), schedule.step),
            OutputMode::Averaged => (1, schedule.step),
        },
    };

    let workers = pool::effective_workers(config.worker_count, channels.len());
    let mut result = SpectralResult::new(time_bins, channels.len(), plan.saved_count, atom);
    let ctx = EngineContext {
        config,
        source,
        channels: &channels,
        artifacts: request.artifacts,
        plan: &plan,
        workers,
        block_size,
    };

    match config.strategy {
        TransformKind::Direct => direct::run(&ctx, &schedule, &mut result),
        TransformKind::STransform => stransform::run(
            &ctx,
            request.window_from,
            request.window_to,
            factor,
            &mut result,
        ),
        TransformKind::FftApprox => approx::run(&ctx, &schedule, &mut result),
    }

    // The S-Transform masks artifacts sample-wise instead of excluding its
    // single block.
    let (good_blocks, total_blocks) = match config.strategy {
        TransformKind::STransform => (1, 1),
        _ => (schedule.good_count, schedule.blocks.len()),
    };

    let time_offsets: Vec<f64> = match config.strategy {
        TransformKind::STransform => (0..time_bins)
            .map(|t| (t * factor) as f64 / sampling_rate)
            .collect(),
        _ => match config.output {
            OutputMode::Sequential => schedule
                .blocks
                .iter()
                .map(|b| (b.from - request.window_from) as f64 / sampling_rate)
                .collect(),
            OutputMode::Averaged => vec![0.0],
        },
    };
    let output_rate = sampling_rate / out_step.max(1) as f64;
    let markers = remap_markers(
        request.markers,
        request.window_from,
        request.window_to,
        out_step,
        time_bins,
    );

    let mut report = RunReport::new();
    report.push("strategy", format_args!("{:?}", config.strategy));
    report.push("sampling rate", sampling_rate);
    report.push("window", format_args!("{}..{}", request.window_from, request.window_to));
    report.push("block size", block_size);
    report.push("block step", schedule.step);
    report.push("blocks", total_blocks);
    report.push("good blocks", good_blocks);
    report.push("channels", channels.len());
    report.push("bands", plan.bands.len());
    report.push("saved frequencies", plan.saved_count);
    report.push("atom", format_args!("{atom:?}"));
    report.push("window function", format_args!("{:?}", config.window));
    report.push("rescaling", format_args!("{:?}", config.rescaling));
    report.push("output mode", format_args!("{:?}", config.output));
    if config.strategy == TransformKind::STransform {
        report.push("downsampling factor", factor);
    }
    report.push("output rate", output_rate);
    report.push("workers", workers);
    info!(
        "Analyzed {} channels, {} saved frequencies, {}/{} good blocks",
        channels.len(),
        plan.saved_count,
        good_blocks,
        total_blocks
    );

    Ok(SpectralOutput {
        result,
        plan,
        channel_names,
        atom,
        output_rate,
        time_offsets,
        markers,
        report,
        good_blocks,
        total_blocks,
    })
}

/// Downsampling factor targeting an output rate of roughly twice the highest
/// saved frequency. A factor of one disables downsampling.
fn downsampling_factor(sampling_rate: f64, max_saved_hz: f64) -> usize {
    if max_saved_hz <= 0.0 {
        return 1;
    }
    let factor = (sampling_rate / (2.0 * max_saved_hz)).floor() as usize;
    if factor <= 1 {
        warn!("Computed downsampling factor is 1; downsampling disabled");
        return 1;
    }
    factor
}
