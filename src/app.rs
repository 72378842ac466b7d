use crate::audio::AudioSystem;
use crate::config::Config;
use crate::mapper::{ReactiveMapper, Snapshot, TriggerEvent};
use crate::playlist::{Cue, Playlist};
use crate::policy::EffectPolicy;
use crate::scheduler::Scheduler;
use crate::terminal::TerminalGuard;
use anyhow::Context;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use std::fmt::Write as _;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The full set of numeric inputs the shader/compositor side consumes,
/// replacing the pile of global mutables the original performance patch
/// accumulated. The run loop owns the only copy; everything downstream reads
/// values, never aliases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualParams {
    pub fractal_type: u32,
    pub scale_amp: f32,
    pub scale_period: f32,
    pub transform_1: f32,
    pub transform_2: f32,
    pub ambient_amp: f32,
    pub ambient_period: f32,
    pub camera_amp: f32,
    pub camera_speed: f32,
}

impl Default for VisualParams {
    fn default() -> Self {
        Self {
            fractal_type: 0,
            scale_amp: -1.0,
            scale_period: 1.0,
            transform_1: 0.0,
            transform_2: 0.0,
            ambient_amp: 0.0,
            ambient_period: 1.0,
            camera_amp: 1.0,
            camera_speed: 1.0,
        }
    }
}

impl VisualParams {
    /// Continuous per-tick coupling: the normalized bins drive camera motion
    /// and scale breathing directly, independent of any trigger.
    fn follow_bins(&mut self, fft: &[f32]) {
        let bin = |i: usize| fft.get(i).copied().unwrap_or(0.0);
        self.camera_amp = 1.0 + bin(0) * 3.0;
        self.camera_speed = 1.0 + bin(1) * 9.0;
        self.scale_amp = -1.0 + bin(2) * 2.0;
        self.ambient_amp = self.ambient_amp.max(bin(3));
    }

    /// Applies a discrete effect chosen by the policy table. Unknown ids are
    /// ignored so a table written for a newer build doesn't wedge an older
    /// one mid-set.
    fn apply_effect(&mut self, effect_id: &str) {
        match effect_id {
            "fractal:mandelbrot" => self.fractal_type = 0,
            "fractal:julia" => self.fractal_type = 1,
            "fractal:burning-ship" => self.fractal_type = 2,
            "color:acid" => {
                self.transform_1 = 0.2;
                self.transform_2 = 0.5;
                self.ambient_amp = 0.3;
            }
            "color:strobe" => {
                self.ambient_amp = 1.0;
                self.ambient_period = 0.25;
            }
            _ => {}
        }
    }
}

/// A parameter change deferred past its trigger, so a video cue lands first
/// and the camera snaps a moment later.
#[derive(Debug, Clone, Copy, PartialEq)]
enum DeferredChange {
    CameraKick { amp: f32, speed: f32 },
}

pub fn run(cfg: Config) -> anyhow::Result<()> {
    let mapper = Arc::new(
        ReactiveMapper::new(cfg.mapper_config()).context("invalid mapper configuration")?,
    );

    let policy = match cfg.policy.as_deref() {
        Some(path) => EffectPolicy::load(path).with_context(|| format!("load policy {path}"))?,
        None => EffectPolicy::default_table(),
    };
    let playlist = match cfg.playlist.as_deref() {
        Some(path) => Some(Playlist::load(path).with_context(|| format!("load playlist {path}"))?),
        None => None,
    };

    let _audio = AudioSystem::new(cfg.device.as_deref(), Arc::clone(&mapper))
        .context("start audio capture")?;

    let _term = TerminalGuard::new()?;
    let mut out = BufWriter::new(TerminalGuard::stdout());

    let mut rng = fastrand::Rng::new();
    let mut scheduler: Scheduler<DeferredChange> = Scheduler::new();
    let mut params = VisualParams::default();
    let mut last_effect = String::new();
    let mut last_cue: Option<Cue> = None;
    let start = Instant::now();

    loop {
        let now = Instant::now();

        while event::poll(Duration::from_millis(0))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let ctrl_c = key.code == KeyCode::Char('c')
                    && key.modifiers.contains(KeyModifiers::CONTROL);
                if ctrl_c || matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    return Ok(());
                }
            }
        }

        let events = mapper.on_render_tick();
        let snap = mapper.snapshot();

        params.follow_bins(&snap.fft);

        for ev in &events {
            match ev {
                TriggerEvent::SmallChange(p) => {
                    if let Some(effect) = policy.select(p.vol) {
                        params.apply_effect(effect);
                        last_effect = effect.to_string();
                    }
                }
                TriggerEvent::BigChange(p) => {
                    if let Some(list) = &playlist {
                        last_cue = Some(list.cue_random(&mut rng));
                    }
                    scheduler.schedule(
                        now,
                        Duration::from_millis(250),
                        DeferredChange::CameraKick {
                            amp: 1.0 + p.vol_avg * 0.25,
                            speed: 10.0,
                        },
                    );
                }
            }
        }

        for change in scheduler.drain_due(now) {
            match change {
                DeferredChange::CameraKick { amp, speed } => {
                    params.camera_amp = amp;
                    params.camera_speed = speed;
                }
            }
        }

        let status = build_status(start, &snap, &params, &last_effect, last_cue.as_ref());
        out.write_all(b"\r\x1b[2K")?;
        out.write_all(status.as_bytes())?;
        out.flush()?;

        let target = Duration::from_secs_f32(1.0 / cfg.fps.max(1) as f32);
        let elapsed = now.elapsed();
        if elapsed < target {
            std::thread::sleep(target - elapsed);
        }
    }
}

fn build_status(
    start: Instant,
    snap: &Snapshot,
    params: &VisualParams,
    last_effect: &str,
    last_cue: Option<&Cue>,
) -> String {
    let mut s = String::new();
    let _ = write!(
        s,
        "t={:7.1}s vol={:6.2} avg={:6.2} [{}] frac={} cam={:.2}/{:.2}",
        start.elapsed().as_secs_f32(),
        snap.vol,
        snap.vol_avg,
        bin_meter(&snap.fft),
        params.fractal_type,
        params.camera_amp,
        params.camera_speed,
    );
    if !last_effect.is_empty() {
        let _ = write!(s, " fx={last_effect}");
    }
    if let Some(cue) = last_cue {
        let _ = write!(s, " vid={}@{:.0}s", cue.path, cue.start_secs);
    }
    if snap.dropped_frames > 0 {
        let _ = write!(s, " dropped={}", snap.dropped_frames);
    }
    s
}

fn bin_meter(fft: &[f32]) -> String {
    const LEVELS: [char; 5] = [' ', '.', ':', '|', '#'];
    fft.iter()
        .map(|v| {
            let idx = ((v * 4.0).round() as usize).min(LEVELS.len() - 1);
            LEVELS[idx]
        })
        .collect()
}
