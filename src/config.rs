use crate::mapper::MapperConfig;
use clap::{Parser, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(name = "loudmap", version, about = "Audio-reactive parameter mapper for live visual performance")]
pub struct Config {
    #[arg(long, default_value_t = false)]
    pub list_devices: bool,

    /// Substring match against input device names; default input device if unset.
    #[arg(long)]
    pub device: Option<String>,

    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    #[arg(long, default_value_t = 4)]
    pub bins: usize,

    #[arg(long, default_value_t = 2.0)]
    pub cutoff: f32,

    #[arg(long, default_value_t = 15.0)]
    pub max: f32,

    #[arg(long, default_value_t = 0.4)]
    pub smoothing: f32,

    #[arg(long, value_enum, default_value_t = VolumeMode::Reported)]
    pub volume_mode: VolumeMode,

    #[arg(long, default_value_t = 8.0)]
    pub small_threshold: f32,

    #[arg(long, default_value_t = 12)]
    pub small_max: u32,

    #[arg(long, default_value_t = 18.0)]
    pub big_threshold: f32,

    #[arg(long, default_value_t = 90)]
    pub big_max: u32,

    #[arg(long, default_value_t = 0.95)]
    pub vol_avg_decay: f32,

    /// Effect policy table file; built-in ladder if unset.
    #[arg(long)]
    pub policy: Option<String>,

    /// Video playlist file; big-change cues are skipped if unset.
    #[arg(long)]
    pub playlist: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VolumeMode {
    /// Total loudness as reported by the analyzer.
    #[value(alias = "loudness", alias = "total")]
    Reported,
    /// Sum of the normalized bin vector.
    #[value(alias = "fft", alias = "sum")]
    Bins,
}

impl Config {
    pub fn mapper_config(&self) -> MapperConfig {
        MapperConfig {
            num_bins: self.bins,
            cutoff: self.cutoff,
            max: self.max,
            smoothing: self.smoothing,
            volume_mode: self.volume_mode,
            small_change_threshold: self.small_threshold,
            small_change_max: self.small_max,
            big_change_threshold: self.big_threshold,
            big_change_max: self.big_max,
            volume_avg_decay: self.vol_avg_decay,
        }
    }
}
