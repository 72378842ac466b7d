use loudmap::config::VolumeMode;
use loudmap::mapper::{ConfigError, MapperConfig, ReactiveMapper, TriggerEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

fn patch_config() -> MapperConfig {
    MapperConfig {
        num_bins: 4,
        cutoff: 2.0,
        max: 15.0,
        smoothing: 0.4,
        volume_mode: VolumeMode::Reported,
        ..MapperConfig::default()
    }
}

#[test]
fn config_rejects_max_at_or_below_cutoff() {
    let cfg = MapperConfig {
        cutoff: 5.0,
        max: 5.0,
        ..MapperConfig::default()
    };
    let err = cfg.validate().expect_err("max == cutoff must fail");
    assert!(matches!(err, ConfigError::MaxNotAboveCutoff { .. }));
}

#[test]
fn config_rejects_zero_bins() {
    let cfg = MapperConfig {
        num_bins: 0,
        ..MapperConfig::default()
    };
    assert_eq!(cfg.validate(), Err(ConfigError::NonPositiveBins));
}

#[test]
fn config_rejects_smoothing_and_decay_outside_unit_interval() {
    let cfg = MapperConfig {
        smoothing: 1.0,
        ..MapperConfig::default()
    };
    assert!(matches!(
        cfg.validate(),
        Err(ConfigError::SmoothingOutOfRange(_))
    ));

    let cfg = MapperConfig {
        volume_avg_decay: -0.1,
        ..MapperConfig::default()
    };
    assert!(matches!(cfg.validate(), Err(ConfigError::DecayOutOfRange(_))));
}

#[test]
fn config_rejects_zero_counter_maximum() {
    let cfg = MapperConfig {
        small_change_max: 0,
        ..MapperConfig::default()
    };
    assert!(matches!(cfg.validate(), Err(ConfigError::ZeroCounterMax(_))));
}

#[test]
fn bins_follow_smoothing_law_on_repeated_input() {
    // num_bins=4 over 8 elements: span 2, raw sum 20 per bin.
    let mapper = ReactiveMapper::new(patch_config()).expect("config should be valid");
    let frame = [10.0f32; 8];

    mapper.on_feature_frame(&frame, 40.0);
    let snap = mapper.snapshot();
    for &b in &snap.bins {
        assert!((b - 12.0).abs() < 1e-4, "after frame 1: {b}");
    }

    mapper.on_feature_frame(&frame, 40.0);
    let snap = mapper.snapshot();
    for &b in &snap.bins {
        assert!((b - 16.8).abs() < 1e-4, "after frame 2: {b}");
    }
}

#[test]
fn normalized_vector_matches_cutoff_formula() {
    // Bin value 12 with cutoff 2, max 15 -> (12-2)/(15-2).
    let mapper = ReactiveMapper::new(patch_config()).expect("config should be valid");
    mapper.on_feature_frame(&[10.0f32; 8], 40.0);

    let snap = mapper.snapshot();
    for &f in &snap.fft {
        assert!((f - 10.0 / 13.0).abs() < 1e-5, "fft element: {f}");
    }
}

#[test]
fn normalized_vector_never_negative() {
    let mapper = ReactiveMapper::new(patch_config()).expect("config should be valid");
    let mut rng = fastrand::Rng::with_seed(7);

    for _ in 0..200 {
        let len = rng.usize(0..32);
        let frame: Vec<f32> = (0..len).map(|_| rng.f32() * 4.0).collect();
        mapper.on_feature_frame(&frame, frame.iter().sum());
        for &f in &mapper.snapshot().fft {
            assert!(f >= 0.0, "negative fft element: {f}");
        }
    }
}

#[test]
fn zero_smoothing_yields_raw_span_sums_exactly() {
    let cfg = MapperConfig {
        smoothing: 0.0,
        ..patch_config()
    };
    let mapper = ReactiveMapper::new(cfg).expect("config should be valid");

    let frame = [1.5f32, 2.5, 0.25, 4.0, 7.0, 0.5, 3.0, 9.0];
    mapper.on_feature_frame(&frame, 0.0);
    mapper.on_feature_frame(&frame, 0.0);

    let snap = mapper.snapshot();
    let expected: Vec<f32> = frame.chunks(2).map(|c| c.iter().sum()).collect();
    assert_eq!(snap.bins, expected);
}

#[test]
fn near_one_smoothing_bounds_rate_of_change() {
    let cfg = MapperConfig {
        smoothing: 0.99,
        ..patch_config()
    };
    let mapper = ReactiveMapper::new(cfg).expect("config should be valid");

    mapper.on_feature_frame(&[1.0f32; 8], 0.0);
    let before = mapper.snapshot().bins;

    // A frame three orders of magnitude louder moves each bin by at most
    // 1% of its raw sum.
    mapper.on_feature_frame(&[1000.0f32; 8], 0.0);
    let after = mapper.snapshot().bins;

    for (b, a) in before.iter().zip(&after) {
        assert!((a - b).abs() <= 2000.0 * 0.01 + 1e-3, "jump: {b} -> {a}");
    }
}

#[test]
fn undersized_frame_counts_as_all_zero_bins() {
    let mapper = ReactiveMapper::new(patch_config()).expect("config should be valid");
    mapper.on_feature_frame(&[10.0f32; 8], 40.0);
    let before = mapper.snapshot();
    assert_eq!(before.dropped_frames, 0);

    // Fewer elements than bins: span is 0, every bin sums an empty slice.
    mapper.on_feature_frame(&[5.0f32; 2], 10.0);
    let after = mapper.snapshot();
    assert_eq!(after.dropped_frames, 1);
    for (b, prev) in after.bins.iter().zip(&before.bins) {
        assert!((b - prev * 0.4).abs() < 1e-5, "bin should decay: {prev} -> {b}");
    }
}

#[test]
fn non_finite_frame_is_dropped_not_propagated() {
    let mapper = ReactiveMapper::new(patch_config()).expect("config should be valid");
    let mut frame = [1.0f32; 8];
    frame[3] = f32::NAN;

    mapper.on_feature_frame(&frame, 8.0);
    let snap = mapper.snapshot();
    assert_eq!(snap.dropped_frames, 1);
    assert!(snap.bins.iter().all(|b| b.is_finite()));
    assert!(snap.fft.iter().all(|f| f.is_finite()));

    mapper.on_feature_frame(&[1.0f32; 8], f32::INFINITY);
    let snap = mapper.snapshot();
    assert_eq!(snap.dropped_frames, 2);
    assert_eq!(snap.vol, 0.0);
}

#[test]
fn reported_volume_mode_bypasses_bins() {
    let mapper = ReactiveMapper::new(patch_config()).expect("config should be valid");
    mapper.on_feature_frame(&[0.0f32; 8], 33.5);
    assert_eq!(mapper.snapshot().vol, 33.5);
}

#[test]
fn bins_volume_mode_sums_normalized_vector() {
    let cfg = MapperConfig {
        volume_mode: VolumeMode::Bins,
        ..patch_config()
    };
    let mapper = ReactiveMapper::new(cfg).expect("config should be valid");
    mapper.on_feature_frame(&[10.0f32; 8], 999.0);

    let snap = mapper.snapshot();
    let expected: f32 = snap.fft.iter().sum();
    assert!((snap.vol - expected).abs() < 1e-6);
    assert!((snap.vol - 4.0 * 10.0 / 13.0).abs() < 1e-4);
}

#[test]
fn small_counter_fires_on_exactly_the_configured_tick() {
    let cfg = MapperConfig {
        small_change_threshold: 5.0,
        small_change_max: 3,
        big_change_threshold: 1000.0,
        ..patch_config()
    };
    let mapper = ReactiveMapper::new(cfg).expect("config should be valid");
    mapper.on_feature_frame(&[10.0f32; 8], 10.0);

    assert!(mapper.on_render_tick().is_empty(), "tick 1 must not fire");
    assert!(mapper.on_render_tick().is_empty(), "tick 2 must not fire");

    let events = mapper.on_render_tick();
    assert_eq!(events.len(), 1, "tick 3 must fire exactly once");
    assert!(matches!(events[0], TriggerEvent::SmallChange(_)));
    assert_eq!(mapper.snapshot().small_counter, 0);

    assert!(mapper.on_render_tick().is_empty(), "tick 4 must not fire");
}

#[test]
fn counters_do_not_advance_below_threshold() {
    let cfg = MapperConfig {
        small_change_threshold: 5.0,
        small_change_max: 2,
        ..patch_config()
    };
    let mapper = ReactiveMapper::new(cfg).expect("config should be valid");
    mapper.on_feature_frame(&[0.0f32; 8], 4.0);

    for _ in 0..10 {
        assert!(mapper.on_render_tick().is_empty());
    }
    assert_eq!(mapper.snapshot().small_counter, 0);
}

#[test]
fn small_and_big_fire_same_tick_small_first() {
    let cfg = MapperConfig {
        small_change_threshold: 1.0,
        small_change_max: 1,
        big_change_threshold: 2.0,
        big_change_max: 1,
        ..patch_config()
    };
    let mapper = ReactiveMapper::new(cfg).expect("config should be valid");
    mapper.on_feature_frame(&[10.0f32; 8], 10.0);

    let events = mapper.on_render_tick();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], TriggerEvent::SmallChange(_)));
    assert!(matches!(events[1], TriggerEvent::BigChange(_)));
}

#[test]
fn trigger_payload_carries_current_outputs() {
    let cfg = MapperConfig {
        small_change_threshold: 5.0,
        small_change_max: 1,
        volume_avg_decay: 0.0,
        ..patch_config()
    };
    let mapper = ReactiveMapper::new(cfg).expect("config should be valid");
    mapper.on_feature_frame(&[10.0f32; 8], 40.0);

    let events = mapper.on_render_tick();
    let TriggerEvent::SmallChange(payload) = &events[0] else {
        panic!("expected small change");
    };
    assert_eq!(payload.vol, 40.0);
    assert_eq!(payload.fft.len(), 4);
    // decay 0 means the moving average tracks volume exactly.
    assert_eq!(payload.vol_avg, 40.0);
}

#[test]
fn volume_moving_average_updates_per_tick_not_per_frame() {
    let cfg = MapperConfig {
        volume_avg_decay: 0.5,
        small_change_threshold: 1000.0,
        big_change_threshold: 1000.0,
        ..patch_config()
    };
    let mapper = ReactiveMapper::new(cfg).expect("config should be valid");

    // Many frames, no ticks: average untouched.
    for _ in 0..50 {
        mapper.on_feature_frame(&[10.0f32; 8], 40.0);
    }
    assert_eq!(mapper.snapshot().vol_avg, 0.0);

    mapper.on_render_tick();
    assert!((mapper.snapshot().vol_avg - 20.0).abs() < 1e-5);
    mapper.on_render_tick();
    assert!((mapper.snapshot().vol_avg - 30.0).abs() < 1e-5);
}

#[test]
fn snapshot_does_not_mutate_state() {
    let mapper = ReactiveMapper::new(patch_config()).expect("config should be valid");
    mapper.on_feature_frame(&[10.0f32; 8], 40.0);

    let a = mapper.snapshot();
    let b = mapper.snapshot();
    assert_eq!(a, b);
}

#[test]
fn concurrent_frames_ticks_and_snapshots_never_tear() {
    let mapper = Arc::new(
        ReactiveMapper::new(patch_config()).expect("config should be valid"),
    );
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let mapper = Arc::clone(&mapper);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut rng = fastrand::Rng::with_seed(11);
            while !done.load(Ordering::Relaxed) {
                let len = rng.usize(0..48);
                let frame: Vec<f32> = (0..len).map(|_| rng.f32() * 8.0).collect();
                mapper.on_feature_frame(&frame, frame.iter().sum());
                if rng.bool() {
                    thread::yield_now();
                }
            }
        })
    };

    let ticker = {
        let mapper = Arc::clone(&mapper);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut rng = fastrand::Rng::with_seed(13);
            while !done.load(Ordering::Relaxed) {
                let _ = mapper.on_render_tick();
                if rng.bool() {
                    thread::yield_now();
                }
            }
        })
    };

    for _ in 0..5_000 {
        let snap = mapper.snapshot();
        assert_eq!(snap.bins.len(), 4);
        assert_eq!(snap.fft.len(), 4);
        assert!(snap.bins.iter().all(|b| b.is_finite()));
        assert!(snap.fft.iter().all(|f| f.is_finite() && *f >= 0.0));
        assert!(snap.vol.is_finite());
        assert!(snap.vol_avg.is_finite());
    }

    done.store(true, Ordering::Relaxed);
    writer.join().expect("writer thread should finish");
    ticker.join().expect("ticker thread should finish");
}
