use std::fmt;

use tts::MissingReason;

/// Notifications published by the playback scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started { index: usize, start_at: f64 },
    Finished { index: usize },
    Skipped { index: usize, reason: MissingReason },
    Ended,
    Stopped { index: Option<usize> },
    DeviceError { message: String },
}

impl fmt::Display for PlaybackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackEvent::Started { index, .. } => write!(f, "Playing part {}", index + 1),
            PlaybackEvent::Finished { index } => write!(f, "Finished part {}", index + 1),
            PlaybackEvent::Skipped { index, reason } => {
                write!(f, "Skipped part {} ({reason})", index + 1)
            }
            PlaybackEvent::Ended => f.write_str("Playback finished"),
            PlaybackEvent::Stopped { .. } => f.write_str("Playback stopped"),
            PlaybackEvent::DeviceError { message } => write!(f, "Audio error: {message}"),
        }
    }
}
