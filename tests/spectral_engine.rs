//! End-to-end runs of the three transform strategies.

mod support;

use neurospect::config::{
    AnalysisConfig, AtomKind, BandingPolicy, OutputMode, TransformKind, WindowKind,
};
use neurospect::errors::EngineError;
use neurospect::source::{ArtifactIntervals, BufferSource};
use neurospect::spectrum::output::Marker;
use neurospect::spectrum::{AnalysisRequest, SpectralOutput, analyze};

use support::{SAMPLING_RATE, sine, tone_recording};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn base_config() -> AnalysisConfig {
    AnalysisConfig {
        strategy: TransformKind::Direct,
        block_size: 256,
        overlap: 0.0,
        banding: BandingPolicy::Linear {
            min_hz: 2.0,
            max_hz: 40.0,
            step_hz: 2.0,
        },
        atom: AtomKind::Norm,
        ..AnalysisConfig::default()
    }
}

fn run(
    source: &BufferSource,
    config: &AnalysisConfig,
    window_to: usize,
    artifacts: &ArtifactIntervals,
) -> SpectralOutput {
    analyze(
        source,
        &AnalysisRequest {
            config,
            selection: "*",
            coordinate_names: None,
            window_from: 0,
            window_to,
            artifacts,
            markers: &[],
        },
    )
    .expect("analysis run")
}

// Saved frequencies are 2, 4, ..., 40 Hz; 10 Hz lands at index 4.
const TONE_INDEX: usize = 4;

#[test]
fn direct_localizes_a_tone_on_the_right_channel() {
    init_tracing();
    let source = tone_recording(2048, 10.0);
    let output = run(&source, &base_config(), 2047, &ArtifactIntervals::none());
    assert_eq!(output.result.time_bins(), 8);
    assert_eq!(output.result.frequencies(), 20);
    assert_eq!(output.plan.saved_count, 20);

    let mut totals = vec![0.0; 20];
    for t in 0..output.result.time_bins() {
        for (f, total) in totals.iter_mut().enumerate() {
            *total += output.result.get(t, 2, f);
        }
    }
    let best = totals
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(f, _)| f)
        .unwrap();
    assert_eq!(best, TONE_INDEX);
    // The quiet channel carries far less energy at the tone frequency.
    assert!(output.result.get(0, 2, TONE_INDEX) > 10.0 * output.result.get(0, 0, TONE_INDEX));
}

#[test]
fn averaged_output_is_the_mean_of_sequential_blocks() {
    let source = tone_recording(2048, 10.0);
    let sequential = run(&source, &base_config(), 2047, &ArtifactIntervals::none());
    let averaged_config = AnalysisConfig {
        output: OutputMode::Averaged,
        ..base_config()
    };
    let averaged = run(&source, &averaged_config, 2047, &ArtifactIntervals::none());
    assert_eq!(averaged.result.time_bins(), 1);
    for ch in 0..4 {
        for f in 0..20 {
            let mean: f64 = (0..sequential.result.time_bins())
                .map(|t| sequential.result.get(t, ch, f))
                .sum::<f64>()
                / sequential.result.time_bins() as f64;
            let value = averaged.result.get(0, ch, f);
            assert!((mean - value).abs() < 1e-9, "ch {ch} f {f}: {mean} vs {value}");
        }
    }
}

#[test]
fn artifact_blocks_are_zeroed_and_excluded_from_the_good_count() {
    let source = tone_recording(2048, 10.0);
    // Covers only block 1 ([256, 511]).
    let artifacts = ArtifactIntervals::from_ranges([(300, 400)]);
    let output = run(&source, &base_config(), 2047, &artifacts);
    assert_eq!(output.total_blocks, 8);
    assert_eq!(output.good_blocks, 7);
    for ch in 0..4 {
        for f in 0..20 {
            assert_eq!(output.result.get(1, ch, f), 0.0);
        }
        assert!(output.result.get(0, ch, TONE_INDEX) >= 0.0);
    }
    assert!(output.result.get(0, 2, TONE_INDEX) > 0.0);
}

#[test]
fn direct_complex_atom_keeps_two_slots_per_frequency() {
    let source = tone_recording(1024, 10.0);
    let config = AnalysisConfig {
        atom: AtomKind::Complex,
        ..base_config()
    };
    let output = run(&source, &config, 1023, &ArtifactIntervals::none());
    assert_eq!(output.result.slots_per_frequency(), 2);
    let (re, im) = output.result.get_complex(0, 2, TONE_INDEX);
    assert!(re.hypot(im) > 1.0);
}

#[test]
fn stransform_resolves_the_tone_over_time() {
    init_tracing();
    let source = tone_recording(512, 10.0);
    let config = AnalysisConfig {
        strategy: TransformKind::STransform,
        ..base_config()
    };
    let output = run(&source, &config, 511, &ArtifactIntervals::none());
    // One block spanning the interval, one output bin per sample.
    assert_eq!(output.total_blocks, 1);
    assert_eq!(output.result.time_bins(), 512);
    assert_eq!(output.plan.saved_count, 20);

    // Average the norm over the middle third, away from the tapered edges.
    let mut totals = vec![0.0; 20];
    for t in 170..342 {
        for (f, total) in totals.iter_mut().enumerate() {
            *total += output.result.get(t, 2, f);
        }
    }
    let best = totals
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(f, _)| f)
        .unwrap();
    assert_eq!(best, TONE_INDEX);
}

#[test]
fn stransform_masks_artifact_samples_in_place() {
    let source = tone_recording(512, 10.0);
    let config = AnalysisConfig {
        strategy: TransformKind::STransform,
        window: WindowKind::None,
        cone_of_influence: false,
        ..base_config()
    };
    let artifacts = ArtifactIntervals::from_ranges([(100, 149)]);
    let output = run(&source, &config, 511, &artifacts);
    // The single block is still processed; masking is per sample.
    assert_eq!(output.good_blocks, 1);
    for t in 100..150 {
        for f in 0..20 {
            assert!(output.result.get(t, 2, f).abs() < 1e-12);
        }
    }
    assert!(output.result.get(250, 2, TONE_INDEX) > 0.0);
}

#[test]
fn stransform_downsampling_targets_twice_the_top_frequency() {
    let source = tone_recording(512, 10.0);
    let config = AnalysisConfig {
        strategy: TransformKind::STransform,
        downsample: true,
        ..base_config()
    };
    let output = run(&source, &config, 511, &ArtifactIntervals::none());
    // Top saved coverage reaches 41 Hz; 256 / 82 floors to 3.
    assert_eq!(output.result.time_bins(), 512_usize.div_ceil(3));
    assert!((output.output_rate - SAMPLING_RATE / 3.0).abs() < 1e-9);
    assert_eq!(output.time_offsets.len(), output.result.time_bins());
    assert!((output.time_offsets[1] - 3.0 / SAMPLING_RATE).abs() < 1e-12);
}

#[test]
fn fft_approx_projects_opposite_channels_to_opposite_signs() {
    let channels = vec![
        sine(2048, 10.0, 1.0, 0),
        sine(2048, 10.0, -1.0, 0),
    ];
    let source = BufferSource::with_generated_names(SAMPLING_RATE, channels);
    let config = AnalysisConfig {
        strategy: TransformKind::FftApprox,
        ..base_config()
    };
    let output = run(&source, &config, 2047, &ArtifactIntervals::none());
    assert_eq!(output.atom, AtomKind::Real);
    let a = output.result.get(0, 0, TONE_INDEX);
    let b = output.result.get(0, 1, TONE_INDEX);
    assert!(a.abs() > 1.0);
    assert!((a + b).abs() < 1e-6 * a.abs().max(1.0), "{a} vs {b}");
    // Energy concentrates at the tone frequency.
    for f in 0..20 {
        if f != TONE_INDEX {
            assert!(output.result.get(0, 0, f).abs() < a.abs());
        }
    }
}

#[test]
fn fft_approx_polarity_carry_survives_block_sign_flips() {
    // The tone flips sign every block; without polarity alignment the
    // averaged projections would cancel to zero.
    let channels = vec![
        sine(2048, 10.0, 1.0, 256),
        sine(2048, 10.0, -0.5, 256),
    ];
    let source = BufferSource::with_generated_names(SAMPLING_RATE, channels);
    let sequential_config = AnalysisConfig {
        strategy: TransformKind::FftApprox,
        ..base_config()
    };
    let averaged_config = AnalysisConfig {
        output: OutputMode::Averaged,
        ..sequential_config.clone()
    };
    let sequential = run(&source, &sequential_config, 2047, &ArtifactIntervals::none());
    let averaged = run(&source, &averaged_config, 2047, &ArtifactIntervals::none());
    let block_value = sequential.result.get(0, 0, TONE_INDEX).abs();
    let averaged_value = averaged.result.get(0, 0, TONE_INDEX).abs();
    assert!(block_value > 1.0);
    assert!(
        (averaged_value - block_value).abs() < 1e-6 * block_value,
        "{averaged_value} vs {block_value}"
    );
}

#[test]
fn markers_ride_along_on_the_output_time_axis() {
    let source = tone_recording(2048, 10.0);
    let markers = vec![
        Marker {
            label: "onset".to_string(),
            position: 0,
        },
        Marker {
            label: "stim".to_string(),
            position: 600,
        },
        Marker {
            label: "outside".to_string(),
            position: 5000,
        },
    ];
    let config = base_config();
    let output = analyze(
        &source,
        &AnalysisRequest {
            config: &config,
            selection: "*",
            coordinate_names: None,
            window_from: 0,
            window_to: 2047,
            artifacts: &ArtifactIntervals::none(),
            markers: &markers,
        },
    )
    .unwrap();
    assert_eq!(output.markers.len(), 2);
    assert_eq!(output.markers[0].position, 0);
    assert_eq!(output.markers[1].position, 600 / 256);
}

#[test]
fn report_summarizes_the_resolved_parameters() {
    let source = tone_recording(2048, 10.0);
    let artifacts = ArtifactIntervals::from_ranges([(300, 400)]);
    let output = run(&source, &base_config(), 2047, &artifacts);
    assert_eq!(output.report.get("strategy"), Some("Direct"));
    assert_eq!(output.report.get("blocks"), Some("8"));
    assert_eq!(output.report.get("good blocks"), Some("7"));
    assert_eq!(output.report.get("saved frequencies"), Some("20"));
    assert!(output.report.to_json().contains("\"good blocks\":\"7\""));
}

#[test]
fn labels_cover_every_saved_frequency() {
    let source = tone_recording(2048, 10.0);
    let output = run(&source, &base_config(), 2047, &ArtifactIntervals::none());
    assert_eq!(output.plan.labels.len(), 20);
    assert_eq!(output.plan.labels[0], "2-3");
    assert_eq!(output.channel_names, vec!["e1", "e2", "e3", "e4"]);
}

#[test]
fn configuration_errors_fail_before_any_block() {
    let source = tone_recording(512, 10.0);
    let config = base_config();

    let bad_selection = analyze(
        &source,
        &AnalysisRequest {
            config: &config,
            selection: "nosuch",
            coordinate_names: None,
            window_from: 0,
            window_to: 511,
            artifacts: &ArtifactIntervals::none(),
            markers: &[],
        },
    );
    assert!(matches!(bad_selection, Err(EngineError::NoChannels { .. })));

    let bad_window = analyze(
        &source,
        &AnalysisRequest {
            config: &config,
            selection: "*",
            coordinate_names: None,
            window_from: 0,
            window_to: 512,
            artifacts: &ArtifactIntervals::none(),
            markers: &[],
        },
    );
    assert!(matches!(bad_window, Err(EngineError::InvalidWindow { .. })));

    let undefined_average = AnalysisConfig {
        atom: AtomKind::Phase,
        output: OutputMode::Averaged,
        ..base_config()
    };
    let result = analyze(
        &source,
        &AnalysisRequest {
            config: &undefined_average,
            selection: "*",
            coordinate_names: None,
            window_from: 0,
            window_to: 511,
            artifacts: &ArtifactIntervals::none(),
            markers: &[],
        },
    );
    assert!(matches!(result, Err(EngineError::UndefinedAverage { .. })));

    let short_window = analyze(
        &source,
        &AnalysisRequest {
            config: &config,
            selection: "*",
            coordinate_names: None,
            window_from: 0,
            window_to: 99,
            artifacts: &ArtifactIntervals::none(),
            markers: &[],
        },
    );
    assert!(matches!(short_window, Err(EngineError::NoBlocks { .. })));
}

#[test]
fn config_loads_from_a_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("analysis.toml");
    std::fs::write(
        &path,
        "strategy = \"fftapprox\"\nblock_size = 512\noverlap = 0.5\n\n[banding]\nmode = \"log\"\nmin_hz = 1.0\nmax_hz = 64.0\nsteps_per_decade = 8.0\n",
    )
    .unwrap();
    let config = AnalysisConfig::load(&path).unwrap();
    assert_eq!(config.strategy, TransformKind::FftApprox);
    assert_eq!(config.block_size, 512);
    assert_eq!(config.overlap, 0.5);
    assert!(matches!(config.banding, BandingPolicy::Log { .. }));

    let missing = AnalysisConfig::load(&dir.path().join("absent.toml"));
    assert!(matches!(missing, Err(EngineError::ConfigRead { .. })));
}
