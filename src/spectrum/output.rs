use serde::Serialize;

use crate::config::AtomKind;

/// Three-dimensional result buffer indexed `[time][channel][frequency]`.
///
/// The frequency axis is doubled for the complex atom type (real/imaginary
/// interleaved). Allocated once per run, written at disjoint coordinates by
/// the block loop, handed off intact to the external serializer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectralResult {
    time_bins: usize,
    channels: usize,
    frequencies: usize,
    slots: usize,
    data: Vec<f64>,
}

impl SpectralResult {
    /// Allocate a zero-filled buffer.
    pub fn new(time_bins: usize, channels: usize, frequencies: usize, atom: AtomKind) -> Self {
        let slots = atom.slots();
        Self {
            time_bins,
            channels,
            frequencies,
            slots,
            data: vec![0.0; time_bins * channels * frequencies * slots],
        }
    }

    /// Output time bins.
    pub fn time_bins(&self) -> usize {
        self.time_bins
    }

    /// Channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Saved frequency count (complex pairs count once).
    pub fn frequencies(&self) -> usize {
        self.frequencies
    }

    /// Value slots per saved frequency (2 for complex, 1 otherwise).
    pub fn slots_per_frequency(&self) -> usize {
        self.slots
    }

    /// Flat value buffer, time-major.
    pub fn values(&self) -> &[f64] {
        &self.data
    }

    fn index(&self, time: usize, channel: usize, frequency: usize) -> usize {
        ((time * self.channels + channel) * self.frequencies + frequency) * self.slots
    }

    /// Read the first slot of one cell.
    pub fn get(&self, time: usize, channel: usize, frequency: usize) -> f64 {
        self.data[self.index(time, channel, frequency)]
    }

    /// Read both slots of a complex cell.
    pub fn get_complex(&self, time: usize, channel: usize, frequency: usize) -> (f64, f64) {
        let base = self.index(time, channel, frequency);
        (self.data[base], self.data[base + 1])
    }

    /// Overwrite the first slot of one cell.
    pub fn set(&mut self, time: usize, channel: usize, frequency: usize, value: f64) {
        let base = self.index(time, channel, frequency);
        self.data[base] = value;
    }

    /// Overwrite both slots of a complex cell.
    pub fn set_complex(
        &mut self,
        time: usize,
        channel: usize,
        frequency: usize,
        re: f64,
        im: f64,
    ) {
        let base = self.index(time, channel, frequency);
        self.data[base] = re;
        self.data[base + 1] = im;
    }

    /// Accumulate into the first slot of one cell (averaged mode).
    pub fn add(&mut self, time: usize, channel: usize, frequency: usize, value: f64) {
        let base = self.index(time, channel, frequency);
        self.data[base] += value;
    }

    /// Copy one channel row (all frequencies and slots) into a time bin.
    pub fn write_row(&mut self, time: usize, channel: usize, row: &[f64]) {
        debug_assert_eq!(row.len(), self.frequencies * self.slots);
        let base = self.index(time, channel, 0);
        self.data[base..base + row.len()].copy_from_slice(row);
    }

    /// Accumulate one channel row into a time bin (averaged mode).
    pub fn add_row(&mut self, time: usize, channel: usize, row: &[f64]) {
        debug_assert_eq!(row.len(), self.frequencies * self.slots);
        let base = self.index(time, channel, 0);
        for (cell, value) in self.data[base..base + row.len()].iter_mut().zip(row) {
            *cell += value;
        }
    }

    /// Divide every value by the good-block count.
    ///
    /// A zero count substitutes a divisor of one rather than propagating a
    /// division by zero.
    pub fn finalize_average(&mut self, good_blocks: usize) {
        let divisor = good_blocks.max(1) as f64;
        for value in &mut self.data {
            *value /= divisor;
        }
    }
}

/// A named position in the recording, carried alongside the data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    /// Marker label as parsed upstream.
    pub label: String,
    /// Sample position in the recording.
    pub position: usize,
}

/// Map markers from recording samples onto the output time axis.
///
/// Positions map through the same step (block step, or downsampling factor
/// for the S-Transform) as the data; markers outside the analysis window are
/// dropped.
pub fn remap_markers(
    markers: &[Marker],
    window_from: usize,
    window_to: usize,
    step: usize,
    time_bins: usize,
) -> Vec<Marker> {
    let step = step.max(1);
    markers
        .iter()
        .filter(|m| m.position >= window_from && m.position <= window_to)
        .map(|m| Marker {
            label: m.label.clone(),
            position: ((m.position - window_from) / step).min(time_bins.saturating_sub(1)),
        })
        .collect()
}
