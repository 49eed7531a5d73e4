//! The inference engine boundary.
//!
//! An engine is an opaque, synchronous `text -> samples` function. Loading is
//! asynchronous: [`PendingEngine`] resolves exactly once into an
//! [`EngineHandle`], which is the only way to feed a
//! [`SynthesisDriver`](crate::SynthesisDriver).

use std::fmt;

use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::{Result, TtsError};

/// Speed handed to every inference call. Playback rate is applied later.
pub const NOMINAL_SPEED: f32 = 1.0;

/// Raw output of one inference call.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Synchronous text-to-speech engine.
///
/// A call blocks until the whole utterance is rendered. The driver never
/// issues two calls at once.
pub trait SpeechEngine: Send + 'static {
    /// Render `text` with the given voice. A `sample_rate` of zero in the
    /// result is treated as a null result.
    fn generate(&mut self, text: &str, speaker_id: u32, speed: f32)
    -> anyhow::Result<GeneratedAudio>;
}

impl<F> SpeechEngine for F
where
    F: FnMut(&str, u32, f32) -> anyhow::Result<GeneratedAudio> + Send + 'static,
{
    fn generate(
        &mut self,
        text: &str,
        speaker_id: u32,
        speed: f32,
    ) -> anyhow::Result<GeneratedAudio> {
        self(text, speaker_id, speed)
    }
}

/// Exclusive owner of a loaded engine.
///
/// Not `Clone`: whoever holds the handle is the only caller of the engine.
pub struct EngineHandle {
    engine: Box<dyn SpeechEngine>,
}

impl EngineHandle {
    pub fn new(engine: impl SpeechEngine) -> Self {
        Self {
            engine: Box::new(engine),
        }
    }

    pub(crate) fn generate(
        &mut self,
        text: &str,
        speaker_id: u32,
        speed: f32,
    ) -> anyhow::Result<GeneratedAudio> {
        let audio = self.engine.generate(text, speaker_id, speed)?;
        if audio.sample_rate == 0 {
            anyhow::bail!("engine returned a null result");
        }
        Ok(audio)
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle").finish_non_exhaustive()
    }
}

/// Readiness signal for an engine that may still be loading.
pub struct PendingEngine {
    rx: oneshot::Receiver<anyhow::Result<EngineHandle>>,
}

impl PendingEngine {
    /// Run `load` on the blocking pool and resolve once it returns.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, E>(load: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<E> + Send + 'static,
        E: SpeechEngine,
    {
        let (tx, rx) = oneshot::channel();
        tokio::task::spawn_blocking(move || {
            let result = load().map(EngineHandle::new);
            match &result {
                Ok(_) => debug!("speech engine loaded"),
                Err(e) => error!(error = %format!("{e:#}"), "speech engine failed to load"),
            }
            let _ = tx.send(result);
        });
        Self { rx }
    }

    /// An engine that is ready immediately.
    pub fn ready(engine: impl SpeechEngine) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Ok(EngineHandle::new(engine)));
        Self { rx }
    }

    /// Check without waiting. `None` means the engine is still loading.
    pub fn try_take(&mut self) -> Option<Result<EngineHandle>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result.map_err(|e| TtsError::EngineLoad(e.into()))),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TtsError::EngineNotReady)),
        }
    }

    /// Wait for the engine to finish loading.
    pub async fn wait(self) -> Result<EngineHandle> {
        match self.rx.await {
            Ok(result) => result.map_err(|e| TtsError::EngineLoad(e.into())),
            Err(_) => Err(TtsError::EngineNotReady),
        }
    }
}

impl fmt::Debug for PendingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEngine").finish_non_exhaustive()
    }
}
