// Offline trigger-timeline simulator: feeds the mapper a synthetic loudness
// envelope at analyzer cadence, ticks it at display cadence, and prints when
// small/big changes would fire. Useful for tuning thresholds and counter
// maxima before a show, without audio hardware or a terminal takeover.

use anyhow::Result;
use loudmap::audio::NUM_BARK_BANDS;
use loudmap::mapper::{MapperConfig, ReactiveMapper, TriggerEvent};

struct Args {
    seconds: f32,
    fps: f32,
    feature_rate: f32,
    seed: u64,
    cfg: MapperConfig,
}

fn parse_args() -> Args {
    let mut args = Args {
        seconds: 30.0,
        fps: 60.0,
        feature_rate: 86.0,
        seed: 0,
        cfg: MapperConfig::default(),
    };

    let mut it = std::env::args().skip(1);
    while let Some(k) = it.next() {
        let v = it.next();
        match (k.as_str(), v) {
            ("--seconds", Some(v)) => args.seconds = v.parse().unwrap_or(args.seconds),
            ("--fps", Some(v)) => args.fps = v.parse().unwrap_or(args.fps),
            ("--feature-rate", Some(v)) => {
                args.feature_rate = v.parse().unwrap_or(args.feature_rate)
            }
            ("--seed", Some(v)) => args.seed = v.parse().unwrap_or(args.seed),
            ("--small-threshold", Some(v)) => {
                args.cfg.small_change_threshold =
                    v.parse().unwrap_or(args.cfg.small_change_threshold)
            }
            ("--small-max", Some(v)) => {
                args.cfg.small_change_max = v.parse().unwrap_or(args.cfg.small_change_max)
            }
            ("--big-threshold", Some(v)) => {
                args.cfg.big_change_threshold = v.parse().unwrap_or(args.cfg.big_change_threshold)
            }
            ("--big-max", Some(v)) => {
                args.cfg.big_change_max = v.parse().unwrap_or(args.cfg.big_change_max)
            }
            _ => {}
        }
    }

    args
}

fn main() -> Result<()> {
    let args = parse_args();
    let mapper = ReactiveMapper::new(args.cfg)?;
    let mut rng = fastrand::Rng::with_seed(args.seed);

    let frame_dt = 1.0 / args.feature_rate;
    let tick_dt = 1.0 / args.fps;
    let mut next_frame = 0.0f32;
    let mut next_tick = 0.0f32;
    let mut small = 0usize;
    let mut big = 0usize;

    let cfg = mapper.config();
    println!(
        "sim: {:.0}s, {} feature frames/s, {} ticks/s, seed {}",
        args.seconds, args.feature_rate, args.fps, args.seed
    );
    println!(
        "thresholds: small {} every {} ticks, big {} every {} ticks",
        cfg.small_change_threshold, cfg.small_change_max, cfg.big_change_threshold,
        cfg.big_change_max
    );

    while next_tick < args.seconds {
        if next_frame <= next_tick {
            let specific = synth_frame(next_frame, &mut rng);
            let total: f32 = specific.iter().sum();
            mapper.on_feature_frame(&specific, total);
            next_frame += frame_dt;
            continue;
        }

        for ev in mapper.on_render_tick() {
            match ev {
                TriggerEvent::SmallChange(p) => {
                    small += 1;
                    println!("{:7.3}s  small  vol={:.2} avg={:.2}", next_tick, p.vol, p.vol_avg);
                }
                TriggerEvent::BigChange(p) => {
                    big += 1;
                    println!("{:7.3}s  BIG    vol={:.2} avg={:.2}", next_tick, p.vol, p.vol_avg);
                }
            }
        }
        next_tick += tick_dt;
    }

    let snap = mapper.snapshot();
    println!(
        "done: {} small, {} big; final vol={:.2} avg={:.2}",
        small, big, snap.vol, snap.vol_avg
    );
    Ok(())
}

/// Quiet noise floor with an 8s loud/quiet cycle, roughly the shape of a
/// track with builds and drops.
fn synth_frame(t: f32, rng: &mut fastrand::Rng) -> [f32; NUM_BARK_BANDS] {
    let phase = (t / 8.0).fract();
    let envelope = if phase < 0.5 {
        0.2 + phase * 0.4
    } else {
        1.0 + (phase - 0.5) * 0.8
    };
    std::array::from_fn(|i| {
        let band_weight = 1.0 - (i as f32) / (NUM_BARK_BANDS as f32 * 1.5);
        (envelope * band_weight + rng.f32() * 0.1).max(0.0)
    })
}
