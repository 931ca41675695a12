use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::config::{AtomKind, BandingPolicy, TransformKind, Tuning};
use crate::errors::EngineError;

static BAND_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*-\s*(\d+(?:\.\d+)?)").expect("static pattern")
});

/// One contiguous range of raw frequency bins saved together.
///
/// Indices are raw FFT bins (resolution `sampling_rate / block_size`).
/// `sub_step`/`sub_count` describe how many adjacent raw bins are merged
/// into each saved value. Read-only after planning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyBand {
    /// First saved bin index.
    pub save_min: usize,
    /// Last saved bin index.
    pub save_max: usize,
    /// Bin distance between consecutive saved values.
    pub save_step: usize,
    /// Number of values this band saves.
    pub save_count: usize,
    /// Bin distance between merged sub-frequencies.
    pub sub_step: usize,
    /// Number of sub-frequencies merged into each saved value.
    pub sub_count: usize,
    /// Realigned lower bound in Hz.
    pub min_hz: f64,
    /// Realigned upper bound in Hz.
    pub max_hz: f64,
    /// Saved step in Hz.
    pub step_hz: f64,
}

/// Ordered band list plus the derived run-wide totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandPlan {
    /// Bands in ascending frequency order.
    pub bands: Vec<FrequencyBand>,
    /// Raw bin resolution in Hz.
    pub bin_hz: f64,
    /// Index of the Nyquist bin.
    pub nyquist_index: usize,
    /// Total count of saved frequencies across all bands.
    pub saved_count: usize,
    /// Maximum per-block working width (sub_count x save_count over bands).
    pub max_working_width: usize,
    /// Display label per saved frequency.
    pub labels: Vec<String>,
    /// Hz range covered by each saved frequency.
    pub saved_ranges: Vec<(f64, f64)>,
}

impl BandPlan {
    /// Highest frequency in Hz covered by any saved value.
    pub fn max_saved_hz(&self) -> f64 {
        self.saved_ranges
            .iter()
            .fold(0.0_f64, |acc, &(_, hi)| acc.max(hi))
    }

    /// Iterate the raw bin index of every saved value, band by band.
    pub fn saved_bins(&self) -> impl Iterator<Item = usize> + '_ {
        self.bands.iter().flat_map(|band| {
            (0..band.save_count).map(move |s| band.save_min + s * band.save_step)
        })
    }
}

/// Plan the output frequency bands for one run.
pub fn plan_bands(
    policy: &BandingPolicy,
    sampling_rate: f64,
    block_size: usize,
    strategy: TransformKind,
    atom: AtomKind,
    tuning: &Tuning,
) -> Result<BandPlan, EngineError> {
    let bin_hz = sampling_rate / block_size as f64;
    let nyquist = block_size / 2;
    let bands = match policy {
        BandingPolicy::Explicit { bands } => {
            explicit_bands(bands, bin_hz, nyquist, strategy, atom, tuning)?
        }
        BandingPolicy::Log {
            min_hz,
            max_hz,
            steps_per_decade,
            average,
        } => log_bands(
            *min_hz,
            *max_hz,
            *steps_per_decade,
            *average,
            bin_hz,
            nyquist,
            strategy,
            atom,
            tuning,
        ),
        BandingPolicy::Linear {
            min_hz,
            max_hz,
            step_hz,
        } => linear_band(*min_hz, *max_hz, *step_hz, bin_hz, nyquist, strategy, atom, tuning),
    };
    if bands.is_empty() {
        return Err(EngineError::NoBands);
    }
    let saved_count = bands.iter().map(|b| b.save_count).sum();
    let max_working_width = bands
        .iter()
        .map(|b| b.sub_count * b.save_count)
        .max()
        .unwrap_or(0);
    let saved_ranges = saved_ranges(&bands, bin_hz);
    let labels = format_labels(&saved_ranges, tuning.label_char_budget);
    Ok(BandPlan {
        bands,
        bin_hz,
        nyquist_index: nyquist,
        saved_count,
        max_working_width,
        labels,
        saved_ranges,
    })
}

fn hz_to_bin(hz: f64, bin_hz: f64) -> usize {
    (hz / bin_hz).round().max(0.0) as usize
}

/// Clip a requested Hz range to valid bin indices.
///
/// The lower index stays at 0 only when 0 Hz was explicitly requested;
/// otherwise the range starts at bin 1.
fn clip_range(lo_hz: f64, hi_hz: f64, bin_hz: f64, nyquist: usize) -> (usize, usize) {
    let (lo_hz, hi_hz) = if lo_hz <= hi_hz {
        (lo_hz, hi_hz)
    } else {
        (hi_hz, lo_hz)
    };
    let mut lo = hz_to_bin(lo_hz, bin_hz);
    if lo == 0 && lo_hz > 0.0 {
        lo = 1;
    }
    let lo = lo.min(nyquist);
    let mut hi = hz_to_bin(hi_hz, bin_hz).max(lo);
    if hi > nyquist {
        warn!("Band upper bound {hi_hz} Hz clipped to Nyquist");
        hi = nyquist;
    }
    (lo, hi)
}

/// Derive the averaging sub-step/sub-count for one band.
///
/// Targets `avg_min_step_hz` resolution over `cover` bins, capped so that
/// `sub_step * (sub_count - 1)` never exceeds the save step, and bounded for
/// the S-Transform where every sub-frequency costs one inverse transform.
/// Complex and phase values are never averaged.
fn derive_averaging(
    cover: usize,
    save_step: usize,
    bin_hz: f64,
    strategy: TransformKind,
    atom: AtomKind,
    tuning: &Tuning,
) -> (usize, usize) {
    if !atom.averages() {
        return (1, 1);
    }
    let sub_step = ((tuning.avg_min_step_hz / bin_hz).round() as usize).max(1);
    let mut sub_count = cover / sub_step + 1;
    if strategy == TransformKind::STransform {
        sub_count = sub_count.min(tuning.stransform_max_sub_count);
    }
    while sub_count > 1 && sub_step * (sub_count - 1) > save_step {
        sub_count -= 1;
    }
    (sub_step, sub_count.max(1))
}

/// One band spanning `[lo, hi]` saved as a single merged value.
fn span_band(
    lo: usize,
    hi: usize,
    bin_hz: f64,
    strategy: TransformKind,
    atom: AtomKind,
    tuning: &Tuning,
) -> FrequencyBand {
    if atom.averages() {
        let save_step = (hi - lo).max(1);
        let (sub_step, sub_count) =
            derive_averaging(hi - lo, save_step, bin_hz, strategy, atom, tuning);
        FrequencyBand {
            save_min: lo,
            save_max: hi,
            save_step,
            save_count: 1,
            sub_step,
            sub_count,
            min_hz: lo as f64 * bin_hz,
            max_hz: hi as f64 * bin_hz,
            step_hz: save_step as f64 * bin_hz,
        }
    } else {
        // Merging is meaningless for this atom type: keep the single raw
        // bin at the band's lower edge.
        FrequencyBand {
            save_min: lo,
            save_max: lo,
            save_step: 1,
            save_count: 1,
            sub_step: 1,
            sub_count: 1,
            min_hz: lo as f64 * bin_hz,
            max_hz: lo as f64 * bin_hz,
            step_hz: bin_hz,
        }
    }
}

fn explicit_bands(
    text: &str,
    bin_hz: f64,
    nyquist: usize,
    strategy: TransformKind,
    atom: AtomKind,
    tuning: &Tuning,
) -> Result<Vec<FrequencyBand>, EngineError> {
    let mut bands = Vec::new();
    for captures in BAND_PAIR.captures_iter(text) {
        let lo_hz: f64 = captures[1].parse().unwrap_or(0.0);
        let hi_hz: f64 = captures[2].parse().unwrap_or(0.0);
        let (lo, hi) = clip_range(lo_hz, hi_hz, bin_hz, nyquist);
        bands.push(span_band(lo, hi, bin_hz, strategy, atom, tuning));
    }
    if bands.is_empty() {
        return Err(EngineError::BadBandList {
            text: text.to_string(),
        });
    }
    Ok(bands)
}

#[allow(clippy::too_many_arguments)]
fn log_bands(
    min_hz: f64,
    max_hz: f64,
    steps_per_decade: f64,
    average: bool,
    bin_hz: f64,
    nyquist: usize,
    strategy: TransformKind,
    atom: AtomKind,
    tuning: &Tuning,
) -> Vec<FrequencyBand> {
    let lo_hz = min_hz.max(tuning.log_epsilon_hz);
    let hi_hz = max_hz.max(tuning.log_epsilon_hz);
    let (lo_hz, hi_hz) = if lo_hz <= hi_hz {
        (lo_hz, hi_hz)
    } else {
        (hi_hz, lo_hz)
    };
    let lo_log = lo_hz.log10();
    let hi_log = hi_hz.log10();
    let steps = ((hi_log - lo_log) * steps_per_decade.max(1.0)).round().max(1.0) as usize;

    let merge = average && atom.averages();
    let mut bands: Vec<FrequencyBand> = Vec::with_capacity(steps);
    let mut pruned = 0usize;
    for i in 0..steps {
        let edge_lo = 10.0_f64.powf(lo_log + (hi_log - lo_log) * i as f64 / steps as f64);
        let edge_hi = 10.0_f64.powf(lo_log + (hi_log - lo_log) * (i + 1) as f64 / steps as f64);
        let (lo, hi) = clip_range(edge_lo, edge_hi, bin_hz, nyquist);
        let band = if merge {
            span_band(lo, hi, bin_hz, strategy, atom, tuning)
        } else {
            span_band(lo, lo, bin_hz, strategy, atom, tuning)
        };
        // Band density can exceed the available bin density; drop the
        // duplicate rather than saving the same bins twice.
        if let Some(last) = bands.last() {
            if last.save_min == band.save_min && last.save_max == band.save_max {
                pruned += 1;
                continue;
            }
        }
        bands.push(band);
    }
    if pruned > 0 {
        warn!("Pruned {pruned} duplicate log-interval bands");
    }
    bands
}

#[allow(clippy::too_many_arguments)]
fn linear_band(
    min_hz: f64,
    max_hz: f64,
    step_hz: f64,
    bin_hz: f64,
    nyquist: usize,
    strategy: TransformKind,
    atom: AtomKind,
    tuning: &Tuning,
) -> Vec<FrequencyBand> {
    let (lo, mut hi) = clip_range(min_hz, max_hz, bin_hz, nyquist);
    let step = hz_to_bin(step_hz.abs(), bin_hz).max(1);
    // Re-align the upper bound to an exact multiple of the step.
    let count = (hi - lo) / step;
    hi = lo + count * step;
    let save_count = count + 1;
    let (sub_step, sub_count) =
        derive_averaging(step / 2, step, bin_hz, strategy, atom, tuning);
    vec![FrequencyBand {
        save_min: lo,
        save_max: hi,
        save_step: step,
        save_count,
        sub_step,
        sub_count,
        min_hz: lo as f64 * bin_hz,
        max_hz: hi as f64 * bin_hz,
        step_hz: step as f64 * bin_hz,
    }]
}

fn saved_ranges(bands: &[FrequencyBand], bin_hz: f64) -> Vec<(f64, f64)> {
    let mut ranges = Vec::new();
    for band in bands {
        for s in 0..band.save_count {
            let base = band.save_min + s * band.save_step;
            let lo = base as f64 * bin_hz;
            let hi = (base + band.sub_step * (band.sub_count - 1)) as f64 * bin_hz;
            ranges.push((lo, hi));
        }
    }
    ranges
}

/// Render per-frequency labels with just enough decimals to tell adjacent
/// bands apart, falling back to lower precision when the character budget
/// would be exceeded.
fn format_labels(ranges: &[(f64, f64)], budget: usize) -> Vec<String> {
    let render = |precision: usize| -> Vec<String> {
        ranges
            .iter()
            .map(|&(lo, hi)| {
                if (hi - lo).abs() < 1e-9 {
                    format!("{lo:.precision$}")
                } else {
                    format!("{lo:.precision$}-{hi:.precision$}")
                }
            })
            .collect()
    };
    let mut precision = 0;
    for p in 0..=3 {
        precision = p;
        let labels = render(p);
        if labels.windows(2).all(|pair| pair[0] != pair[1]) {
            break;
        }
    }
    while precision > 0
        && render(precision)
            .iter()
            .any(|label| label.len() > budget)
    {
        precision -= 1;
    }
    render(precision)
}
