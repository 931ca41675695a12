use tracing::warn;

use crate::errors::EngineError;

/// Read-only accessor over a multichannel sampled recording.
///
/// Reference transforms and pseudo-channel computation happen upstream; the
/// engine only reads windows. Implementations must be safe to share across
/// the worker pool.
pub trait TimeSeriesSource: Sync {
    /// Number of channels in the recording.
    fn channel_count(&self) -> usize;

    /// Sampling frequency in Hz.
    fn sampling_rate(&self) -> f64;

    /// Total samples per channel.
    fn total_samples(&self) -> usize;

    /// Name of one channel.
    fn channel_name(&self, channel: usize) -> &str;

    /// Copy samples `[from, to]` of one channel into `out`.
    ///
    /// `out` must hold `to - from + 1` values; samples past the end of the
    /// recording are zero-filled.
    fn read_window(&self, channel: usize, from: usize, to: usize, out: &mut [f64]);
}

/// In-memory [`TimeSeriesSource`] for tests and embedding callers.
#[derive(Debug, Clone)]
pub struct BufferSource {
    names: Vec<String>,
    sampling_rate: f64,
    channels: Vec<Vec<f64>>,
}

impl BufferSource {
    /// Build a source from per-channel sample buffers.
    pub fn new(names: Vec<String>, sampling_rate: f64, channels: Vec<Vec<f64>>) -> Self {
        Self {
            names,
            sampling_rate,
            channels,
        }
    }

    /// Build a source with generated channel names `e1, e2, ...`.
    pub fn with_generated_names(sampling_rate: f64, channels: Vec<Vec<f64>>) -> Self {
        let names = (1..=channels.len()).map(|i| format!("e{i}")).collect();
        Self::new(names, sampling_rate, channels)
    }
}

impl TimeSeriesSource for BufferSource {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    fn total_samples(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    fn channel_name(&self, channel: usize) -> &str {
        self.names.get(channel).map(String::as_str).unwrap_or("")
    }

    fn read_window(&self, channel: usize, from: usize, to: usize, out: &mut [f64]) {
        debug_assert_eq!(out.len(), to - from + 1);
        let data = match self.channels.get(channel) {
            Some(data) => data.as_slice(),
            None => &[],
        };
        for (i, cell) in out.iter_mut().enumerate() {
            *cell = data.get(from + i).copied().unwrap_or(0.0);
        }
    }
}

/// Ordered set of `[from, to]` sample ranges excluded from analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactIntervals {
    intervals: Vec<(usize, usize)>,
}

impl ArtifactIntervals {
    /// Build from raw ranges; bounds are order-corrected and the set sorted.
    pub fn from_ranges(ranges: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut intervals: Vec<(usize, usize)> = ranges
            .into_iter()
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect();
        intervals.sort_unstable();
        Self { intervals }
    }

    /// An empty set (nothing excluded).
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether `[from, to]` numerically overlaps any excluded interval.
    pub fn overlaps(&self, from: usize, to: usize) -> bool {
        self.intervals.iter().any(|&(a, b)| from <= b && a <= to)
    }

    /// Whether a single sample lies inside any excluded interval.
    pub fn contains(&self, sample: usize) -> bool {
        self.overlaps(sample, sample)
    }

    /// Number of excluded intervals.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// True when nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

/// Resolve a textual channel selection against channel names.
///
/// `"*"` selects every channel; otherwise the expression is a comma- or
/// whitespace-separated name list matched case-insensitively. `names`
/// normally comes from the time-series itself, or from a coordinates file
/// when one is available. Unknown names are skipped with a warning; an empty
/// resolution is a configuration error.
pub fn resolve_channels(
    selection: &str,
    names: &[String],
) -> Result<Vec<usize>, EngineError> {
    let trimmed = selection.trim();
    if trimmed == "*" {
        if names.is_empty() {
            return Err(EngineError::NoChannels {
                selection: selection.to_string(),
            });
        }
        return Ok((0..names.len()).collect());
    }
    let mut resolved = Vec::new();
    for token in trimmed.split([',', ' ', '\t']) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match names.iter().position(|n| n.eq_ignore_ascii_case(token)) {
            Some(index) => {
                if !resolved.contains(&index) {
                    resolved.push(index);
                }
            }
            None => warn!("Skipping unknown channel {token:?}"),
        }
    }
    if resolved.is_empty() {
        return Err(EngineError::NoChannels {
            selection: selection.to_string(),
        });
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn star_selects_all_channels() {
        let resolved = resolve_channels("*", &names(&["Fp1", "Fp2", "Cz"])).unwrap();
        assert_eq!(resolved, vec![0, 1, 2]);
    }

    #[test]
    fn name_list_resolves_case_insensitively() {
        let resolved = resolve_channels("cz, FP1", &names(&["Fp1", "Fp2", "Cz"])).unwrap();
        assert_eq!(resolved, vec![2, 0]);
    }

    #[test]
    fn unknown_names_are_skipped_and_empty_selection_fails() {
        let resolved = resolve_channels("Cz nosuch", &names(&["Fp1", "Cz"])).unwrap();
        assert_eq!(resolved, vec![1]);
        assert!(matches!(
            resolve_channels("nosuch", &names(&["Fp1", "Cz"])),
            Err(EngineError::NoChannels { .. })
        ));
    }

    #[test]
    fn artifact_overlap_is_inclusive_on_both_ends() {
        let artifacts = ArtifactIntervals::from_ranges([(100, 200), (400, 450)]);
        assert!(artifacts.overlaps(200, 250));
        assert!(artifacts.overlaps(0, 100));
        assert!(artifacts.overlaps(150, 160));
        assert!(!artifacts.overlaps(201, 399));
        assert!(artifacts.contains(425));
        assert!(!artifacts.contains(99));
    }

    #[test]
    fn artifact_ranges_are_order_corrected() {
        let artifacts = ArtifactIntervals::from_ranges([(300, 250)]);
        assert!(artifacts.overlaps(260, 260));
    }

    #[test]
    fn buffer_source_zero_fills_past_end() {
        let source = BufferSource::with_generated_names(250.0, vec![vec![1.0, 2.0, 3.0]]);
        let mut out = [0.0; 5];
        source.read_window(0, 1, 5, &mut out);
        assert_eq!(out, [2.0, 3.0, 0.0, 0.0, 0.0]);
        assert_eq!(source.channel_name(0), "e1");
    }
}
