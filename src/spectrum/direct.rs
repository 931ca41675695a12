use rustfft::num_complex::Complex64;

use crate::config::{AtomKind, OutputMode};
use crate::pool;
use crate::spectrum::bands::BandPlan;
use crate::spectrum::blocks::BlockSchedule;
use crate::spectrum::output::SpectralResult;
use crate::spectrum::primitive::{FourierPrimitive, window_weights};
use crate::spectrum::{EngineContext, atom_scalar};

struct DirectScratch {
    samples: Vec<f64>,
    spectrum: Vec<Complex64>,
}

impl DirectScratch {
    fn new(block_size: usize) -> Self {
        Self {
            samples: vec![0.0; block_size],
            spectrum: Vec::with_capacity(block_size),
        }
    }
}

/// Direct strategy: one real FFT per good block per channel, then a
/// per-band frequency selection/averaging scan.
pub(crate) fn run(
    ctx: &EngineContext<'_>,
    schedule: &BlockSchedule,
    result: &mut SpectralResult,
) {
    let primitive = FourierPrimitive::new(ctx.block_size, ctx.config.rescaling);
    let weights = window_weights(ctx.config.window, ctx.block_size);

    for block in &schedule.blocks {
        if !block.good {
            // The slot stays zero-filled and contributes nothing to averages.
            continue;
        }
        let rows = pool::map_indexed(
            ctx.workers,
            ctx.channels.len(),
            || DirectScratch::new(ctx.block_size),
            |scratch, ci| {
                ctx.source
                    .read_window(ctx.channels[ci], block.from, block.to, &mut scratch.samples);
                for (sample, weight) in scratch.samples.iter_mut().zip(&weights) {
                    *sample *= weight;
                }
                primitive.forward_real(&scratch.samples, &mut scratch.spectrum);
                band_scan(ctx.plan, ctx.config.atom, &scratch.spectrum)
            },
        );
        for (ci, row) in rows.iter().enumerate() {
            match ctx.config.output {
                OutputMode::Sequential => result.write_row(block.index, ci, row),
                OutputMode::Averaged => result.add_row(0, ci, row),
            }
        }
    }
    if ctx.config.output == OutputMode::Averaged {
        result.finalize_average(schedule.good_count);
    }
}

/// Scan one half-spectrum into a row of saved values, band by band.
///
/// Norm, power and real values are averaged over the band's sub-bins;
/// complex and phase values are taken at the saved bin only.
pub(crate) fn band_scan(plan: &BandPlan, atom: AtomKind, spectrum: &[Complex64]) -> Vec<f64> {
    let top = spectrum.len().saturating_sub(1);
    let mut row = Vec::with_capacity(plan.saved_count * atom.slots());
    for band in &plan.bands {
        for s in 0..band.save_count {
            let base = (band.save_min + s * band.save_step).min(top);
            match atom {
                AtomKind::Complex => {
                    let c = spectrum[base];
                    row.push(c.re);
                    row.push(c.im);
                }
                AtomKind::Phase => {
                    let c = spectrum[base];
                    row.push(c.im.atan2(c.re));
                }
                _ => {
                    let mut acc = 0.0_f64;
                    for k in 0..band.sub_count {
                        let index = (base + k * band.sub_step).min(top);
                        acc += atom_scalar(atom, spectrum[index]);
                    }
                    row.push(acc / band.sub_count as f64);
                }
            }
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TransformKind, Tuning};
    use crate::spectrum::bands::plan_bands;
    use crate::config::BandingPolicy;

    fn tone_spectrum(len: usize, bin: usize, amplitude: f64) -> Vec<Complex64> {
        let mut spectrum = vec![Complex64::new(0.0, 0.0); len / 2 + 1];
        spectrum[bin] = Complex64::new(amplitude, 0.0);
        spectrum
    }

    #[test]
    fn band_scan_averages_sub_bins() {
        let plan = plan_bands(
            &BandingPolicy::Explicit {
                bands: "1-4".to_string(),
            },
            256.0,
            256,
            TransformKind::Direct,
            AtomKind::Norm,
            &Tuning::default(),
        )
        .unwrap();
        let mut spectrum = vec![Complex64::new(0.0, 0.0); 129];
        spectrum[1] = Complex64::new(4.0, 0.0);
        spectrum[2] = Complex64::new(4.0, 0.0);
        spectrum[3] = Complex64::new(0.0, 0.0);
        spectrum[4] = Complex64::new(0.0, 0.0);
        let row = band_scan(&plan, AtomKind::Norm, &spectrum);
        assert_eq!(row.len(), 1);
        assert!((row[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn band_scan_complex_takes_the_saved_bin_verbatim() {
        let plan = plan_bands(
            &BandingPolicy::Linear {
                min_hz: 10.0,
                max_hz: 12.0,
                step_hz: 1.0,
            },
            256.0,
            256,
            TransformKind::Direct,
            AtomKind::Complex,
            &Tuning::default(),
        )
        .unwrap();
        let mut spectrum = vec![Complex64::new(0.0, 0.0); 129];
        spectrum[10] = Complex64::new(0.5, -0.25);
        let row = band_scan(&plan, AtomKind::Complex, &spectrum);
        assert_eq!(row.len(), 3 * 2);
        assert_eq!(row[0], 0.5);
        assert_eq!(row[1], -0.25);
    }

    #[test]
    fn band_scan_localizes_a_tone_to_the_nearest_saved_frequency() {
        let plan = plan_bands(
            &BandingPolicy::Linear {
                min_hz: 2.0,
                max_hz: 40.0,
                step_hz: 2.0,
            },
            256.0,
            256,
            TransformKind::Direct,
            AtomKind::Norm,
            &Tuning::default(),
        )
        .unwrap();
        let spectrum = tone_spectrum(256, 10, 3.0);
        let row = band_scan(&plan, AtomKind::Norm, &spectrum);
        let best = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        // Saved frequencies are 2, 4, ..., 40 Hz; 10 Hz is index 4.
        assert_eq!(best, 4);
    }
}
