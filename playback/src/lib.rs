//! Gapless, sequential playback of synthesized segments.
//!
//! The [`PlaybackScheduler`] reads [`tts::AudioSegment`]s from a
//! [`tts::SegmentStore`] as they become ready and hands them to an
//! [`AudioOutput`] one at a time.

use thiserror::Error;

pub mod clock;
pub mod events;
pub mod output;
#[cfg(feature = "device")]
pub mod rodio_output;
pub mod scheduler;

pub use clock::{ClockOutput, ScheduleEntry};
pub use events::PlaybackEvent;
pub use output::{AudioOutput, ScheduledSource, SourceId, SourceRequest};
#[cfg(feature = "device")]
pub use rodio_output::RodioOutput;
pub use scheduler::{PlaybackScheduler, PlaybackState, SchedulerConfig};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no synthesis run attached")]
    NoTimeline,
    #[error("part {index} is out of range ({len} parts)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("invalid playback rate {0}")]
    InvalidRate(f32),
    #[error("audio device error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
