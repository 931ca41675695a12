use rustfft::num_complex::Complex64;

use crate::config::OutputMode;
use crate::pool;
use crate::spectrum::EngineContext;
use crate::spectrum::blocks::BlockSchedule;
use crate::spectrum::output::SpectralResult;
use crate::spectrum::primitive::{FourierPrimitive, window_weights};

struct ApproxScratch {
    samples: Vec<f64>,
    spectrum: Vec<Complex64>,
}

/// FFT-Approximation strategy: per frequency, reduce the complex spatial
/// vector across channels to one polarity-consistent real scalar per channel
/// via constellation-axis projection.
///
/// Blocks are processed strictly in order: the cross-block polarity carry in
/// averaged mode reads the running sum accumulated so far, threaded through
/// the result buffer rather than hidden state.
pub(crate) fn run(
    ctx: &EngineContext<'_>,
    schedule: &BlockSchedule,
    result: &mut SpectralResult,
) {
    let primitive = FourierPrimitive::new(ctx.block_size, ctx.config.rescaling);
    let weights = window_weights(ctx.config.window, ctx.block_size);
    let channel_count = ctx.channels.len();

    for block in &schedule.blocks {
        if !block.good {
            continue;
        }
        let spectra = pool::map_indexed(
            ctx.workers,
            channel_count,
            || ApproxScratch {
                samples: vec![0.0; ctx.block_size],
                spectrum: Vec::with_capacity(ctx.block_size),
            },
            |scratch, ci| {
                ctx.source
                    .read_window(ctx.channels[ci], block.from, block.to, &mut scratch.samples);
                for (sample, weight) in scratch.samples.iter_mut().zip(&weights) {
                    *sample *= weight;
                }
                primitive.forward_real(&scratch.samples, &mut scratch.spectrum);
                std::mem::take(&mut scratch.spectrum)
            },
        );

        let mut fq = 0usize;
        for band in &ctx.plan.bands {
            for s in 0..band.save_count {
                let base = band.save_min + s * band.save_step;
                let merged = merged_projection(&spectra, base, band.sub_step, band.sub_count);
                match ctx.config.output {
                    OutputMode::Sequential => {
                        for (ci, value) in merged.iter().enumerate() {
                            result.set(block.index, ci, fq, *value);
                        }
                    }
                    OutputMode::Averaged => {
                        // Polarity-check the new block against the running
                        // sum before adding, so arbitrary per-block signs do
                        // not cancel the average.
                        let current: Vec<f64> =
                            (0..channel_count).map(|ci| result.get(0, ci, fq)).collect();
                        let flip = correlation(&merged, &current) < 0.0;
                        for (ci, value) in merged.iter().enumerate() {
                            let value = if flip { -value } else { *value };
                            result.add(0, ci, fq, value);
                        }
                    }
                }
                fq += 1;
            }
        }
    }
    if ctx.config.output == OutputMode::Averaged {
        result.finalize_average(schedule.good_count);
    }
}

/// Merge the projections of a band's sub-frequencies, polarity-aligning each
/// against the first.
pub(crate) fn merged_projection(
    spectra: &[Vec<Complex64>],
    base: usize,
    sub_step: usize,
    sub_count: usize,
) -> Vec<f64> {
    let first = project(spectra, base);
    let mut merged = first.clone();
    for k in 1..sub_count {
        let mut vector = project(spectra, base + k * sub_step);
        if correlation(&vector, &first) < 0.0 {
            for value in &mut vector {
                *value = -*value;
            }
        }
        for (sum, value) in merged.iter_mut().zip(&vector) {
            *sum += value;
        }
    }
    let divisor = sub_count.max(1) as f64;
    for value in &mut merged {
        *value /= divisor;
    }
    merged
}

/// Project every channel's complex value at one bin onto the best-fit axis
/// through the origin.
///
/// The axis is the principal direction of the complex-plane constellation,
/// from the closed-form double-angle solution of the second-moment sums.
pub(crate) fn project(spectra: &[Vec<Complex64>], bin: usize) -> Vec<f64> {
    let mut sxx = 0.0_f64;
    let mut syy = 0.0_f64;
    let mut sxy = 0.0_f64;
    for spectrum in spectra {
        let c = at(spectrum, bin);
        sxx += c.re * c.re;
        syy += c.im * c.im;
        sxy += c.re * c.im;
    }
    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    let (sin, cos) = theta.sin_cos();
    spectra
        .iter()
        .map(|spectrum| {
            let c = at(spectrum, bin);
            c.re * cos + c.im * sin
        })
        .collect()
}

fn at(spectrum: &[Complex64], bin: usize) -> Complex64 {
    spectrum
        .get(bin)
        .copied()
        .or_else(|| spectrum.last().copied())
        .unwrap_or(Complex64::new(0.0, 0.0))
}

/// Sign-bearing linear correlation of two channel vectors.
///
/// Only the sign is ever used; an all-zero vector (the running sum before
/// the first block) correlates to 0 and causes no flip.
pub(crate) fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    a[..n]
        .iter()
        .zip(&b[..n])
        .map(|(&x, &y)| (x - mean_a) * (y - mean_b))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectra_from_bins(vectors: &[Vec<Complex64>]) -> Vec<Vec<Complex64>> {
        // vectors[bin][channel] -> spectra[channel][bin]
        let channels = vectors[0].len();
        (0..channels)
            .map(|ci| vectors.iter().map(|v| v[ci]).collect())
            .collect()
    }

    #[test]
    fn projection_recovers_a_common_axis() {
        // All channels lie on the same line through the origin; the
        // projection must preserve their relative spread.
        let axis = Complex64::new(0.6, 0.8);
        let amplitudes = [1.0, -2.0, 0.5, 3.0];
        let spectra = spectra_from_bins(&[amplitudes
            .iter()
            .map(|&a| axis * a)
            .collect::<Vec<_>>()]);
        let projected = project(&spectra, 0);
        let scale = projected[0] / amplitudes[0];
        for (p, a) in projected.iter().zip(&amplitudes) {
            assert!((p - a * scale).abs() < 1e-9);
        }
        assert!((scale.abs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn opposite_sub_frequencies_do_not_cancel() {
        let v: Vec<Complex64> = [1.0, -0.5, 2.0, 0.25]
            .iter()
            .map(|&a| Complex64::new(0.6, 0.8) * a)
            .collect();
        let negated: Vec<Complex64> = v.iter().map(|c| -c).collect();
        let spectra = spectra_from_bins(&[v.clone(), negated]);
        let merged = merged_projection(&spectra, 0, 1, 2);
        let first = project(&spectra, 0);
        for (m, f) in merged.iter().zip(&first) {
            assert!((m - f).abs() < 1e-9, "merged {m} vs first {f}");
        }
    }

    #[test]
    fn correlation_sign_detects_negated_vectors() {
        let a = [1.0, -2.0, 3.0, 0.5];
        let b: Vec<f64> = a.iter().map(|v| -v).collect();
        assert!(correlation(&a, &b) < 0.0);
        let zeros = [0.0; 4];
        assert_eq!(correlation(&a, &zeros), 0.0);
    }

    #[test]
    fn projection_handles_a_degenerate_all_zero_bin() {
        let spectra = vec![vec![Complex64::new(0.0, 0.0); 4]; 3];
        let projected = project(&spectra, 2);
        assert_eq!(projected, vec![0.0, 0.0, 0.0]);
    }
}
