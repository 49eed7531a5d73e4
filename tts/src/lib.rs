//! Turn segmented text into audio, one inference call at a time.
//!
//! The [`SynthesisDriver`] owns the [`SpeechEngine`] and walks a list of
//! [`lingproc::TextSegment`]s in order, publishing every finished
//! [`AudioSegment`] into a shared [`SegmentStore`] that playback reads from.

use thiserror::Error;

pub mod audio;
pub mod cancel;
pub mod driver;
pub mod engine;
pub mod events;
pub mod export;
pub mod piper;
pub mod store;

pub use audio::AudioSegment;
pub use cancel::CancelFlag;
pub use driver::{RunOutcome, SynthesisDriver, SynthesisRun};
pub use engine::{EngineHandle, GeneratedAudio, NOMINAL_SPEED, PendingEngine, SpeechEngine};
pub use events::SynthesisEvent;
pub use piper::{PiperConfig, PiperEngine};
pub use store::{MissingReason, RunStatus, SegmentStore, SynthesisState};

/// Boxed error carried as the source of engine failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("speech engine is not ready")]
    EngineNotReady,
    #[error("speech engine failed to load")]
    EngineLoad(#[source] BoxError),
    #[error("synthesis of segment {index} failed")]
    SegmentSynthesis {
        index: usize,
        #[source]
        source: BoxError,
    },
    #[error("synthesis task ended abnormally")]
    Join(#[from] tokio::task::JoinError),
    #[error("no audio to export")]
    EmptyExport,
    #[error("resampling failed: {0}")]
    Resample(String),
    #[error(transparent)]
    Wav(#[from] hound::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience result type used throughout this crate.
pub type Result<T> = std::result::Result<T, TtsError>;
