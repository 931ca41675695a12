use std::f64::consts::PI;

use rustfft::num_complex::Complex64;

use crate::config::AtomKind;
use crate::pool;
use crate::spectrum::output::SpectralResult;
use crate::spectrum::primitive::{FourierPrimitive, window_weights};
use crate::spectrum::{EngineContext, atom_scalar};

struct StScratch {
    samples: Vec<f64>,
    analytic: Vec<Complex64>,
    voice: Vec<Complex64>,
    acc: Vec<f64>,
}

impl StScratch {
    fn new(len: usize, slots: usize) -> Self {
        Self {
            samples: vec![0.0; len],
            analytic: Vec::with_capacity(len),
            voice: vec![Complex64::new(0.0, 0.0); len],
            acc: vec![0.0; len * slots],
        }
    }
}

/// S-Transform strategy: one block spanning the whole requested interval,
/// analytic-signal construction, then one Gaussian-modulated inverse
/// transform per saved sub-frequency.
pub(crate) fn run(
    ctx: &EngineContext<'_>,
    window_from: usize,
    window_to: usize,
    factor: usize,
    result: &mut SpectralResult,
) {
    let len = ctx.block_size;
    let slots = ctx.config.atom.slots();
    let out_bins = result.time_bins();
    let saved = ctx.plan.saved_count;
    let primitive = FourierPrimitive::new(len, ctx.config.rescaling);
    let weights = window_weights(ctx.config.window, len);

    let planes = pool::map_indexed(
        ctx.workers,
        ctx.channels.len(),
        || StScratch::new(len, slots),
        |scratch, ci| {
            channel_plane(
                ctx,
                &primitive,
                &weights,
                window_from,
                window_to,
                factor,
                out_bins,
                ctx.channels[ci],
                scratch,
            )
        },
    );
    let row_len = saved * slots;
    for (ci, plane) in planes.iter().enumerate() {
        for t in 0..out_bins {
            result.write_row(t, ci, &plane[t * row_len..(t + 1) * row_len]);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn channel_plane(
    ctx: &EngineContext<'_>,
    primitive: &FourierPrimitive,
    weights: &[f64],
    window_from: usize,
    window_to: usize,
    factor: usize,
    out_bins: usize,
    channel: usize,
    scratch: &mut StScratch,
) -> Vec<f64> {
    let len = primitive.len();
    let atom = ctx.config.atom;
    let slots = atom.slots();
    let saved = ctx.plan.saved_count;

    ctx.source
        .read_window(channel, window_from, window_to, &mut scratch.samples);
    let mean = scratch.samples.iter().sum::<f64>() / len as f64;
    for (sample, weight) in scratch.samples.iter_mut().zip(weights) {
        *sample *= weight;
    }

    // Analytic signal: full forward transform, double the non-edge bins,
    // zero the negative-frequency half. Bin 0 and the Nyquist bin (even
    // lengths) are never doubled.
    scratch.analytic.clear();
    scratch
        .analytic
        .extend(scratch.samples.iter().map(|&s| Complex64::new(s, 0.0)));
    primitive.forward_complex(&mut scratch.analytic);
    for bin in scratch.analytic[1..len.div_ceil(2)].iter_mut() {
        *bin *= 2.0;
    }
    for bin in scratch.analytic[len / 2 + 1..].iter_mut() {
        *bin = Complex64::new(0.0, 0.0);
    }

    let mut plane = vec![0.0; out_bins * saved * slots];
    let mut fq = 0usize;
    for band in &ctx.plan.bands {
        for s in 0..band.save_count {
            let base = band.save_min + s * band.save_step;
            scratch.acc[..len * slots].fill(0.0);
            for k in 0..band.sub_count {
                let f_index = (base + k * band.sub_step).min(len / 2);
                accumulate_voice(
                    ctx,
                    primitive,
                    window_from,
                    mean,
                    f_index,
                    atom,
                    scratch,
                );
            }
            let divisor = band.sub_count as f64;
            for (t_out, t) in (0..len).step_by(factor.max(1)).enumerate() {
                if t_out >= out_bins {
                    break;
                }
                let dst = (t_out * saved + fq) * slots;
                for slot in 0..slots {
                    plane[dst + slot] = scratch.acc[t * slots + slot] / divisor;
                }
            }
            fq += 1;
        }
    }
    plane
}

/// Add one sub-frequency's time-resolved coefficients into the accumulator.
fn accumulate_voice(
    ctx: &EngineContext<'_>,
    primitive: &FourierPrimitive,
    window_from: usize,
    mean: f64,
    f_index: usize,
    atom: AtomKind,
    scratch: &mut StScratch,
) {
    let len = primitive.len();
    let slots = atom.slots();

    if f_index == 0 {
        // 0 Hz needs no modulation: the coefficient is the time-domain mean.
        let c = Complex64::new(mean, 0.0);
        for t in 0..len {
            let c = if ctx.artifacts.contains(window_from + t) {
                Complex64::new(0.0, 0.0)
            } else {
                c
            };
            store(&mut scratch.acc[t * slots..], atom, c);
        }
        return;
    }

    // Gaussian kernel on the circularly shifted analytic spectrum; the
    // kernel narrows as frequency increases.
    let f = f_index as f64;
    for (m, cell) in scratch.voice.iter_mut().enumerate() {
        let offset = if m <= len / 2 {
            m as f64
        } else {
            m as f64 - len as f64
        };
        let gauss = (-2.0 * (PI * offset / f).powi(2)).exp();
        *cell = scratch.analytic[(m + f_index) % len] * gauss;
    }
    primitive.inverse_complex(&mut scratch.voice);

    // Post-hoc artifact masking: the S-Transform has only one block, so
    // excluded epochs are zeroed directly in the time-resolved result.
    for t in 0..len {
        if ctx.artifacts.contains(window_from + t) {
            scratch.voice[t] = Complex64::new(0.0, 0.0);
        }
    }

    if ctx.config.cone_of_influence && atom != AtomKind::Phase {
        taper_edges(&mut scratch.voice, f_index, ctx.config.tuning.coi_cycles);
    }

    for t in 0..len {
        store(&mut scratch.acc[t * slots..], atom, scratch.voice[t]);
    }
}

fn store(acc: &mut [f64], atom: AtomKind, c: Complex64) {
    match atom {
        AtomKind::Complex => {
            acc[0] += c.re;
            acc[1] += c.im;
        }
        _ => acc[0] += atom_scalar(atom, c),
    }
}

/// Half-Hanning taper over a width proportional to one period of the
/// analyzed frequency at each end of the interval.
fn taper_edges(voice: &mut [Complex64], f_index: usize, coi_cycles: f64) {
    let len = voice.len();
    let width = ((coi_cycles * len as f64 / f_index as f64).round() as usize).min(len / 2);
    if width == 0 {
        return;
    }
    for t in 0..width {
        let w = 0.5 * (1.0 - (PI * t as f64 / width as f64).cos());
        voice[t] *= w;
        voice[len - 1 - t] *= w;
    }
}
