//! [`SpeechEngine`] backed by the Piper command-line synthesizer.
//!
//! Every call spawns `piper --output-raw`, writes the text to stdin and reads
//! 16-bit little-endian PCM from stdout. The sample rate comes from the
//! voice's `.onnx.json` config, which is read once at construction.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, bail, ensure};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{GeneratedAudio, SpeechEngine};

/// Settings forwarded to the `piper` binary.
#[derive(Debug, Clone)]
pub struct PiperConfig {
    /// Executable to run.
    pub program: PathBuf,
    /// Voice model (`.onnx`).
    pub model: PathBuf,
    /// Voice config. Defaults to the model path with `.json` appended.
    pub config: Option<PathBuf>,
    pub noise_scale: f32,
    pub noise_w: f32,
    pub length_scale: f32,
}

impl Default for PiperConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("piper"),
            model: PathBuf::from("model.onnx"),
            config: None,
            noise_scale: 0.667,
            noise_w: 0.8,
            length_scale: 1.0,
        }
    }
}

impl PiperConfig {
    /// Path of the voice config actually used.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| {
            let mut path = OsString::from(self.model.as_os_str());
            path.push(".json");
            PathBuf::from(path)
        })
    }
}

#[derive(Deserialize)]
struct VoiceConfig {
    audio: VoiceAudio,
}

#[derive(Deserialize)]
struct VoiceAudio {
    sample_rate: u32,
}

/// Piper subprocess engine.
#[derive(Debug)]
pub struct PiperEngine {
    config: PiperConfig,
    config_path: PathBuf,
    sample_rate: u32,
}

impl PiperEngine {
    /// Validate the voice config and capture its sample rate.
    pub fn new(config: PiperConfig) -> anyhow::Result<Self> {
        let config_path = config.config_path();
        let sample_rate = read_sample_rate(&config_path)?;
        debug!(model = %config.model.display(), sample_rate, "piper voice loaded");
        Ok(Self {
            config,
            config_path,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn read_sample_rate(path: &Path) -> anyhow::Result<u32> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading voice config {}", path.display()))?;
    let parsed: VoiceConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parsing voice config {}", path.display()))?;
    ensure!(
        parsed.audio.sample_rate > 0,
        "voice config {} has no sample rate",
        path.display()
    );
    Ok(parsed.audio.sample_rate)
}

impl SpeechEngine for PiperEngine {
    fn generate(
        &mut self,
        text: &str,
        speaker_id: u32,
        speed: f32,
    ) -> anyhow::Result<GeneratedAudio> {
        ensure!(speed > 0.0, "speed must be positive, got {speed}");
        let length_scale = self.config.length_scale / speed;
        let mut child = Command::new(&self.config.program)
            .arg("--model")
            .arg(&self.config.model)
            .arg("--config")
            .arg(&self.config_path)
            .arg("--output-raw")
            .arg("--speaker")
            .arg(speaker_id.to_string())
            .arg("--noise_scale")
            .arg(self.config.noise_scale.to_string())
            .arg("--noise_w")
            .arg(self.config.noise_w.to_string())
            .arg("--length_scale")
            .arg(length_scale.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning {}", self.config.program.display()))?;

        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(format!("{text}\n").as_bytes()),
            None => Err(std::io::Error::other("piper stdin unavailable")),
        };
        if let Err(e) = written {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e).context("writing text to piper");
        }

        let output = child.wait_with_output().context("waiting for piper")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "piper failed");
            bail!("piper exited with {}: {}", output.status, stderr.trim());
        }
        Ok(GeneratedAudio {
            samples: pcm16_to_f32(&output.stdout),
            sample_rate: self.sample_rate,
        })
    }
}

/// Decode 16-bit little-endian PCM into floats in `[-1.0, 1.0)`.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect()
}
