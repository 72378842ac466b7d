use crate::config::VolumeMode;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Configuration for the reactive parameter mapper.
///
/// Defaults match the live performance patch this crate grew out of:
/// 4 bins over the analyzer's specific-loudness array, cutoff 2, max 15,
/// smoothing 0.4.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapperConfig {
    pub num_bins: usize,
    pub cutoff: f32,
    pub max: f32,
    /// Weight given to the previous bin value; 0 = no smoothing.
    pub smoothing: f32,
    pub volume_mode: VolumeMode,
    pub small_change_threshold: f32,
    pub small_change_max: u32,
    pub big_change_threshold: f32,
    pub big_change_max: u32,
    /// Weight given to the previous moving-average value per render tick.
    pub volume_avg_decay: f32,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            num_bins: 4,
            cutoff: 2.0,
            max: 15.0,
            smoothing: 0.4,
            volume_mode: VolumeMode::Reported,
            small_change_threshold: 8.0,
            small_change_max: 12,
            big_change_threshold: 18.0,
            big_change_max: 90,
            volume_avg_decay: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    NonPositiveBins,
    MaxNotAboveCutoff { cutoff: f32, max: f32 },
    SmoothingOutOfRange(f32),
    DecayOutOfRange(f32),
    ZeroCounterMax(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositiveBins => write!(f, "num_bins must be at least 1"),
            Self::MaxNotAboveCutoff { cutoff, max } => {
                write!(f, "max must exceed cutoff: cutoff={cutoff} max={max}")
            }
            Self::SmoothingOutOfRange(v) => write!(f, "smoothing must be in [0,1): {v}"),
            Self::DecayOutOfRange(v) => write!(f, "volume_avg_decay must be in [0,1): {v}"),
            Self::ZeroCounterMax(which) => write!(f, "{which} counter maximum must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl MapperConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_bins == 0 {
            return Err(ConfigError::NonPositiveBins);
        }
        if !self.cutoff.is_finite() || !self.max.is_finite() || self.max <= self.cutoff {
            return Err(ConfigError::MaxNotAboveCutoff {
                cutoff: self.cutoff,
                max: self.max,
            });
        }
        if !self.smoothing.is_finite() || !(0.0..1.0).contains(&self.smoothing) {
            return Err(ConfigError::SmoothingOutOfRange(self.smoothing));
        }
        if !self.volume_avg_decay.is_finite() || !(0.0..1.0).contains(&self.volume_avg_decay) {
            return Err(ConfigError::DecayOutOfRange(self.volume_avg_decay));
        }
        if self.small_change_max == 0 {
            return Err(ConfigError::ZeroCounterMax("small change"));
        }
        if self.big_change_max == 0 {
            return Err(ConfigError::ZeroCounterMax("big change"));
        }
        Ok(())
    }
}

/// Numeric payload carried by every trigger event.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerPayload {
    pub vol: f32,
    pub fft: Vec<f32>,
    pub vol_avg: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerEvent {
    SmallChange(TriggerPayload),
    BigChange(TriggerPayload),
}

/// Read-only copy of the mapper's current outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub vol: f32,
    pub vol_avg: f32,
    pub bins: Vec<f32>,
    pub fft: Vec<f32>,
    pub dropped_frames: u64,
    pub small_counter: u32,
    pub big_counter: u32,
}

struct MapperState {
    bins: Vec<f32>,
    fft: Vec<f32>,
    vol: f32,
    vol_avg: f32,
    small_counter: u32,
    big_counter: u32,
    dropped_frames: u64,
}

/// Reduces a stream of spectral-loudness feature frames into smoothed bins,
/// a normalized vector, and a scalar volume, and turns sustained volume into
/// discrete small/big change triggers.
///
/// Two callers touch the state on independent cadences: the audio analyzer
/// thread ([`on_feature_frame`](Self::on_feature_frame)) and the render loop
/// ([`on_render_tick`](Self::on_render_tick)). A single mutex keeps a tick
/// from ever observing a half-written bin set; neither callback blocks, so
/// hold time is bounded.
pub struct ReactiveMapper {
    cfg: MapperConfig,
    state: Mutex<MapperState>,
}

impl ReactiveMapper {
    pub fn new(cfg: MapperConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            state: Mutex::new(MapperState {
                bins: vec![0.0; cfg.num_bins],
                fft: vec![0.0; cfg.num_bins],
                vol: 0.0,
                vol_avg: 0.0,
                small_counter: 0,
                big_counter: 0,
                dropped_frames: 0,
            }),
            cfg,
        })
    }

    pub fn config(&self) -> &MapperConfig {
        &self.cfg
    }

    /// Folds one analysis frame into the bins.
    ///
    /// `specific` is the analyzer's per-band loudness array (any length),
    /// `total` its reported total loudness. The array is sliced into
    /// `num_bins` equal spans (`len / num_bins`, trailing remainder dropped);
    /// each span sum is exponentially smoothed into its bin. An empty or
    /// undersized frame, or one carrying non-finite values, contributes
    /// all-zero raw bins instead of failing: a transient bad analysis frame
    /// must not take the visual pipeline down with it.
    pub fn on_feature_frame(&self, specific: &[f32], total: f32) {
        let cfg = &self.cfg;
        let mut st = lock(&self.state);

        let malformed = specific.len() < cfg.num_bins
            || specific.iter().any(|v| !v.is_finite())
            || !total.is_finite();
        if malformed {
            st.dropped_frames += 1;
        }
        let span = specific.len() / cfg.num_bins;

        for i in 0..cfg.num_bins {
            let raw: f32 = if malformed {
                0.0
            } else {
                specific[i * span..(i + 1) * span].iter().sum()
            };
            st.bins[i] = raw * (1.0 - cfg.smoothing) + st.bins[i] * cfg.smoothing;
            st.fft[i] = ((st.bins[i] - cfg.cutoff) / (cfg.max - cfg.cutoff)).max(0.0);
        }

        st.vol = match cfg.volume_mode {
            VolumeMode::Reported => {
                if malformed {
                    0.0
                } else {
                    total
                }
            }
            VolumeMode::Bins => st.fft.iter().sum(),
        };
    }

    /// Advances the per-tick state: moving average and change counters.
    ///
    /// Called once per displayed frame, after zero or more feature frames.
    /// Each counter increments by one on a tick where the volume exceeds its
    /// threshold and resets to zero on the exact tick it reaches its
    /// configured maximum, emitting the corresponding event. Both events may
    /// fire in the same tick; small-change is ordered first.
    pub fn on_render_tick(&self) -> Vec<TriggerEvent> {
        let cfg = &self.cfg;
        let mut st = lock(&self.state);

        st.vol_avg = st.vol_avg * cfg.volume_avg_decay + st.vol * (1.0 - cfg.volume_avg_decay);

        let mut events = Vec::new();
        if st.vol > cfg.small_change_threshold {
            st.small_counter += 1;
            if st.small_counter == cfg.small_change_max {
                st.small_counter = 0;
                events.push(TriggerEvent::SmallChange(payload(&st)));
            }
        }
        if st.vol > cfg.big_change_threshold {
            st.big_counter += 1;
            if st.big_counter == cfg.big_change_max {
                st.big_counter = 0;
                events.push(TriggerEvent::BigChange(payload(&st)));
            }
        }
        events
    }

    /// Current outputs; never mutates, safe from any thread.
    pub fn snapshot(&self) -> Snapshot {
        let st = lock(&self.state);
        Snapshot {
            vol: st.vol,
            vol_avg: st.vol_avg,
            bins: st.bins.clone(),
            fft: st.fft.clone(),
            dropped_frames: st.dropped_frames,
            small_counter: st.small_counter,
            big_counter: st.big_counter,
        }
    }
}

fn payload(st: &MapperState) -> TriggerPayload {
    TriggerPayload {
        vol: st.vol,
        fft: st.fft.clone(),
        vol_avg: st.vol_avg,
    }
}

// Neither callback can panic while holding the lock, but absorbing poison
// keeps on_render_tick and snapshot total even if that ever changes.
fn lock<'a>(m: &'a Mutex<MapperState>) -> std::sync::MutexGuard<'a, MapperState> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
