//! Synthesized recordings shared by the integration tests.

use neurospect::source::BufferSource;

pub const SAMPLING_RATE: f64 = 256.0;

/// A pure sinusoid, optionally sign-flipped block by block.
pub fn sine(len: usize, freq_hz: f64, amplitude: f64, flip_every: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let value =
                amplitude * (2.0 * std::f64::consts::PI * freq_hz * i as f64 / SAMPLING_RATE).sin();
            if flip_every > 0 && (i / flip_every) % 2 == 1 {
                -value
            } else {
                value
            }
        })
        .collect()
}

/// Deterministic low-amplitude clutter so quiet channels are not all-zero.
pub fn clutter(len: usize, seed: usize) -> Vec<f64> {
    (0..len)
        .map(|i| 0.01 * ((i * 7 + seed * 13) as f64 * 0.37).sin())
        .collect()
}

/// Four-channel recording with a tone on channel 2 only.
pub fn tone_recording(len: usize, freq_hz: f64) -> BufferSource {
    let channels = vec![
        clutter(len, 1),
        clutter(len, 2),
        sine(len, freq_hz, 1.0, 0),
        clutter(len, 3),
    ];
    BufferSource::with_generated_names(SAMPLING_RATE, channels)
}
