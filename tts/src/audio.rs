use std::time::Duration;

/// Mono PCM produced by one inference call.
///
/// Segments are shared read-only behind an `Arc` once published. Playback
/// speed never touches the stored samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Index of the text segment this audio was synthesized from.
    pub index: usize,
    /// Samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Samples per second, always positive.
    pub sample_rate: u32,
}

impl AudioSegment {
    pub fn new(index: usize, samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            index,
            samples,
            sample_rate,
        }
    }

    /// Length in seconds at the native rate.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }

    /// Seconds the segment occupies when played at `rate`.
    pub fn playback_secs(&self, rate: f32) -> f64 {
        self.duration_secs() / f64::from(rate)
    }
}
