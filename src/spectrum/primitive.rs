use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::config::{Rescaling, WindowKind};

/// Planned forward/inverse Fourier transforms for one fixed length.
///
/// Configured once per run and reused across every block and channel; the
/// plans are immutable and safe to share read-only across the worker pool.
/// Per-call buffers belong to the caller (one set per worker). Callers must
/// reject a zero block size before construction.
pub struct FourierPrimitive {
    len: usize,
    rescaling: Rescaling,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl FourierPrimitive {
    /// Plan transforms of length `len` with the given rescaling convention.
    pub fn new(len: usize, rescaling: Rescaling) -> Self {
        debug_assert!(len > 0);
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        Self {
            len,
            rescaling,
            forward,
            inverse,
        }
    }

    /// Transform length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; the primitive never plans a zero length.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of non-negative-frequency bins of a real forward transform.
    pub fn half_len(&self) -> usize {
        self.len / 2 + 1
    }

    fn factor(&self) -> f64 {
        match self.rescaling {
            Rescaling::None => 1.0,
            Rescaling::Sqrt => 1.0 / (self.len as f64).sqrt(),
            Rescaling::Full => 1.0 / self.len as f64,
        }
    }

    fn rescale(&self, buffer: &mut [Complex64]) {
        let factor = self.factor();
        if factor != 1.0 {
            for cell in buffer.iter_mut() {
                *cell *= factor;
            }
        }
    }

    /// Forward transform of a real buffer.
    ///
    /// `spectrum` receives the `len/2 + 1` non-negative-frequency bins.
    /// Callers needing a full spectrum for an inverse pass must zero-extend
    /// explicitly.
    pub fn forward_real(&self, samples: &[f64], spectrum: &mut Vec<Complex64>) {
        debug_assert_eq!(samples.len(), self.len);
        spectrum.clear();
        spectrum.extend(samples.iter().map(|&s| Complex64::new(s, 0.0)));
        self.forward.process(spectrum);
        self.rescale(spectrum);
        spectrum.truncate(self.half_len());
    }

    /// Forward transform of a complex buffer, in place, full spectrum.
    pub fn forward_complex(&self, buffer: &mut [Complex64]) {
        debug_assert_eq!(buffer.len(), self.len);
        self.forward.process(buffer);
        self.rescale(buffer);
    }

    /// Inverse transform of a full complex spectrum, in place.
    pub fn inverse_complex(&self, buffer: &mut [Complex64]) {
        debug_assert_eq!(buffer.len(), self.len);
        self.inverse.process(buffer);
        self.rescale(buffer);
    }

    /// Inverse transform of a full complex spectrum into a real buffer.
    ///
    /// Imaginary residue is discarded; the caller guarantees the spectrum is
    /// conjugate-symmetric.
    pub fn inverse_to_real(&self, buffer: &mut [Complex64], out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.len);
        self.inverse_complex(buffer);
        for (cell, value) in out.iter_mut().zip(buffer.iter()) {
            *cell = value.re;
        }
    }
}

/// Per-sample weights for a window function.
///
/// `None` yields unit weights so callers can apply windows unconditionally.
pub fn window_weights(kind: WindowKind, len: usize) -> Vec<f64> {
    match kind {
        WindowKind::None => vec![1.0; len.max(1)],
        WindowKind::Hanning => hanning(len),
        WindowKind::HanningBorder => hanning_border(len),
    }
}

fn hanning(len: usize) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len.max(1)];
    }
    let denom = (len - 1) as f64;
    (0..len)
        .map(|n| 0.5 * (1.0 - (2.0 * PI * n as f64 / denom).cos()))
        .collect()
}

/// Hanning taper over the outer quarter of each block edge, flat middle.
fn hanning_border(len: usize) -> Vec<f64> {
    let edge = len / 4;
    if edge == 0 {
        return vec![1.0; len.max(1)];
    }
    let mut weights = vec![1.0; len];
    for i in 0..edge {
        let w = 0.5 * (1.0 - (PI * i as f64 / edge as f64).cos());
        weights[i] = w;
        weights[len - 1 - i] = w;
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hanning_is_symmetric_and_zero_at_edges() {
        let w = window_weights(WindowKind::Hanning, 8);
        assert!(w[0].abs() < 1e-12);
        assert!(w[7].abs() < 1e-12);
        assert!((w[1] - w[6]).abs() < 1e-12);
    }

    #[test]
    fn hanning_border_keeps_a_flat_middle() {
        let w = window_weights(WindowKind::HanningBorder, 16);
        assert!(w[0].abs() < 1e-12);
        for &v in &w[4..12] {
            assert_eq!(v, 1.0);
        }
        assert!((w[1] - w[14]).abs() < 1e-12);
    }

    #[test]
    fn forward_real_returns_half_spectrum() {
        let primitive = FourierPrimitive::new(16, Rescaling::None);
        let samples = vec![1.0; 16];
        let mut spectrum = Vec::new();
        primitive.forward_real(&samples, &mut spectrum);
        assert_eq!(spectrum.len(), 9);
        assert!((spectrum[0].re - 16.0).abs() < 1e-9);
        for bin in &spectrum[1..] {
            assert!(bin.norm() < 1e-9);
        }
    }

    #[test]
    fn full_forward_none_inverse_round_trips() {
        // Full rescaling on one side, none on the other, reproduces the
        // signal within floating-point tolerance.
        let forward = FourierPrimitive::new(256, Rescaling::Full);
        let inverse = FourierPrimitive::new(256, Rescaling::None);
        let samples: Vec<f64> = (0..256)
            .map(|i| (2.0 * PI * 7.0 * i as f64 / 256.0).sin() + 0.25 * (i as f64 * 0.11).cos())
            .collect();
        let mut buffer: Vec<Complex64> =
            samples.iter().map(|&s| Complex64::new(s, 0.0)).collect();
        forward.forward_complex(&mut buffer);
        let mut restored = vec![0.0; 256];
        inverse.inverse_to_real(&mut buffer, &mut restored);
        let peak = samples.iter().fold(0.0_f64, |m, &v| m.max(v.abs()));
        for (a, b) in samples.iter().zip(restored.iter()) {
            assert!((a - b).abs() / peak < 1e-5, "{a} vs {b}");
        }
    }

    #[test]
    fn sqrt_rescaling_preserves_energy() {
        let primitive = FourierPrimitive::new(64, Rescaling::Sqrt);
        let samples: Vec<f64> = (0..64).map(|i| (i as f64 * 0.3).sin()).collect();
        let mut buffer: Vec<Complex64> =
            samples.iter().map(|&s| Complex64::new(s, 0.0)).collect();
        primitive.forward_complex(&mut buffer);
        let time_energy: f64 = samples.iter().map(|v| v * v).sum();
        let freq_energy: f64 = buffer.iter().map(|c| c.norm_sqr()).sum();
        assert!((time_energy - freq_energy).abs() / time_energy < 1e-9);
    }
}
