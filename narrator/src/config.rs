use std::path::PathBuf;
use std::time::Duration;

use anyhow::ensure;
use clap::{Args, ValueEnum};
use playback::SchedulerConfig;
use tts::PiperConfig;

use crate::EventBus;

/// Library-level settings of a [`Narrator`](crate::Narrator).
#[derive(Debug, Clone)]
pub struct NarratorConfig {
    pub max_chunk_size: usize,
    pub speaker_id: u32,
    pub scheduler: SchedulerConfig,
    pub event_capacity: usize,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: lingproc::DEFAULT_MAX_CHUNK_SIZE,
            speaker_id: 0,
            scheduler: SchedulerConfig::default(),
            event_capacity: EventBus::DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Where audio goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputKind {
    /// Silent virtual device that only keeps time.
    Virtual,
    /// Default sound card (requires the `device` feature).
    Device,
}

/// Command-line and environment settings shared by all subcommands.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Maximum characters per synthesized segment
    #[arg(long, global = true, env = "NARRATOR_MAX_CHUNK", default_value_t = lingproc::DEFAULT_MAX_CHUNK_SIZE)]
    pub max_chunk_size: usize,
    /// Voice speaker id
    #[arg(long, global = true, env = "NARRATOR_SPEAKER", default_value_t = 0)]
    pub speaker: u32,
    /// Initial playback rate
    #[arg(long, global = true, env = "NARRATOR_RATE", default_value_t = 1.0)]
    pub rate: f32,
    /// Seconds to wait for a segment before skipping it
    #[arg(long, global = true, env = "NARRATOR_WAIT_TIMEOUT", default_value_t = 50.0)]
    pub wait_timeout: f64,
    /// Piper executable
    #[arg(long, global = true, env = "NARRATOR_PIPER", default_value = "piper")]
    pub piper: PathBuf,
    /// Piper voice model (.onnx)
    #[arg(long, global = true, env = "NARRATOR_MODEL", default_value = "model.onnx")]
    pub model: PathBuf,
    /// Voice config, defaults to the model path plus `.json`
    #[arg(long, global = true, env = "NARRATOR_MODEL_CONFIG")]
    pub model_config: Option<PathBuf>,
    #[arg(long, global = true, env = "NARRATOR_NOISE_SCALE", default_value_t = 0.667)]
    pub noise_scale: f32,
    #[arg(long, global = true, env = "NARRATOR_NOISE_W", default_value_t = 0.8)]
    pub noise_w: f32,
    #[arg(long, global = true, env = "NARRATOR_LENGTH_SCALE", default_value_t = 1.0)]
    pub length_scale: f32,
    /// Capacity of the status event channel
    #[arg(long, global = true, env = "NARRATOR_EVENT_CAPACITY", default_value_t = EventBus::DEFAULT_EVENT_CAPACITY)]
    pub event_capacity: usize,
    /// Audio output
    #[arg(long, global = true, env = "NARRATOR_OUTPUT", value_enum, default_value_t = OutputKind::Virtual)]
    pub output: OutputKind,
}

impl Settings {
    pub fn narrator_config(&self) -> anyhow::Result<NarratorConfig> {
        ensure!(self.max_chunk_size > 0, "max chunk size must be positive");
        ensure!(
            self.rate.is_finite() && self.rate > 0.0,
            "playback rate must be positive, got {}",
            self.rate
        );
        ensure!(
            self.wait_timeout.is_finite() && self.wait_timeout >= 0.0,
            "wait timeout must be a non-negative number of seconds"
        );
        Ok(NarratorConfig {
            max_chunk_size: self.max_chunk_size,
            speaker_id: self.speaker,
            scheduler: SchedulerConfig {
                ready_timeout: Duration::from_secs_f64(self.wait_timeout),
                initial_rate: self.rate,
                event_capacity: self.event_capacity,
            },
            event_capacity: self.event_capacity,
        })
    }

    pub fn piper_config(&self) -> PiperConfig {
        PiperConfig {
            program: self.piper.clone(),
            model: self.model.clone(),
            config: self.model_config.clone(),
            noise_scale: self.noise_scale,
            noise_w: self.noise_w,
            length_scale: self.length_scale,
        }
    }
}
