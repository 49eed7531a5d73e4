//! The host-facing facade: one call to speak, a handful to steer.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use playback::{AudioOutput, PlaybackScheduler};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};
use tts::export::{self, MergedAudio};
use tts::{
    CancelFlag, EngineHandle, PendingEngine, RunStatus, SegmentStore, SynthesisDriver,
    SynthesisRun, SynthesisState, TtsError,
};

use crate::event_bus::lock;
use crate::{EventBus, NarratorConfig, NarratorEvent};

#[derive(Debug, Error)]
pub enum NarratorError {
    #[error(transparent)]
    Tts(#[from] TtsError),
    #[error(transparent)]
    Playback(#[from] playback::PlaybackError),
    #[error("nothing has been spoken yet")]
    NothingSpoken,
}

pub type Result<T> = std::result::Result<T, NarratorError>;

#[derive(Clone)]
enum EngineSlot {
    Loading,
    Ready(SynthesisDriver),
    Failed(Arc<TtsError>),
}

impl EngineSlot {
    fn driver(&self) -> Result<SynthesisDriver> {
        match self {
            EngineSlot::Loading => Err(TtsError::EngineNotReady.into()),
            EngineSlot::Ready(driver) => Ok(driver.clone()),
            EngineSlot::Failed(e) => Err(TtsError::EngineLoad(Box::new(Arc::clone(e))).into()),
        }
    }
}

/// Where a narration currently stands.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub total: usize,
    pub ready: usize,
    pub states: Vec<SynthesisState>,
    pub run: RunStatus,
    pub active_index: Option<usize>,
    pub is_playing: bool,
    pub rate: f32,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.active_index {
            Some(index) => write!(f, "part {}/{}", index + 1, self.total)?,
            None => write!(f, "idle")?,
        }
        write!(f, ", {}/{} ready, rate {}x", self.ready, self.total, self.rate)?;
        match self.run {
            RunStatus::Running => f.write_str(", generating"),
            RunStatus::Completed => Ok(()),
            RunStatus::Failed { index } => write!(f, ", failed at part {}", index + 1),
            RunStatus::Cancelled => f.write_str(", stopped"),
        }
    }
}

/// Segments text, drives synthesis and plays the result as it arrives.
pub struct Narrator {
    config: NarratorConfig,
    engine: Arc<watch::Sender<EngineSlot>>,
    scheduler: PlaybackScheduler,
    bus: EventBus,
    current: Mutex<Option<SynthesisRun>>,
}

impl Narrator {
    /// Create a narrator whose engine may still be loading.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(engine: PendingEngine, output: Arc<dyn AudioOutput>, config: NarratorConfig) -> Self {
        let bus = EventBus::with_capacity(config.event_capacity);
        let scheduler = PlaybackScheduler::with_config(output, config.scheduler.clone());
        bus.forward(scheduler.subscribe(), NarratorEvent::Playback);
        bus.set_status("Loading voice...");
        let slot = Arc::new(watch::channel(EngineSlot::Loading).0);
        resolve_engine(engine, Arc::clone(&slot), bus.clone(), &config);
        Self {
            config,
            engine: slot,
            scheduler,
            bus,
            current: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &NarratorConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NarratorEvent> {
        self.bus.subscribe()
    }

    /// The latest user-facing status line.
    pub fn status(&self) -> String {
        self.bus.status()
    }

    /// Wait for the engine to finish loading.
    ///
    /// Dropping the returned future leaves loading untouched.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.engine.subscribe();
        let slot = rx
            .wait_for(|slot| !matches!(slot, EngineSlot::Loading))
            .await
            .map_err(|_| TtsError::EngineNotReady)?;
        slot.driver().map(|_| ())
    }

    pub fn is_ready(&self) -> bool {
        self.driver().is_ok()
    }

    /// Replace whatever is being spoken with `text`.
    ///
    /// Refused with [`TtsError::EngineNotReady`] while the engine is loading.
    /// Returns the number of segments.
    pub async fn speak(&self, text: &str) -> Result<usize> {
        let driver = self.driver()?;
        self.cancel_run();
        self.scheduler.reset();

        let segments = lingproc::segment_text(text, self.config.max_chunk_size);
        let total = segments.len();
        if total == 0 {
            warn!("nothing to speak");
            self.bus.set_status("Nothing to speak");
            return Ok(0);
        }
        info!(total, chars = text.chars().count(), "narration started");

        let cancel = CancelFlag::new();
        let run = driver.start(segments, cancel.clone());
        self.scheduler.attach(run.store().clone(), cancel);
        *lock(&self.current) = Some(run);
        self.scheduler.play_from(0).await?;
        Ok(total)
    }

    /// Synthesize `text` without playing it and write it to `path` as WAV.
    pub async fn render(&self, text: &str, path: impl AsRef<Path>) -> Result<MergedAudio> {
        let driver = self.driver()?;
        let segments = lingproc::segment_text(text, self.config.max_chunk_size);
        let run = driver.start(segments, CancelFlag::new());
        let store = run.store().clone();
        run.join().await?;
        Ok(export::write_merged(path, &store.ready_segments())?)
    }

    /// Stop synthesis and playback.
    pub fn cancel(&self) {
        self.cancel_run();
        self.scheduler.stop();
    }

    /// Play from `index`, interrupting the current segment. Synthesis goes on.
    pub async fn seek(&self, index: usize) -> Result<()> {
        self.scheduler.play_from(index).await?;
        Ok(())
    }

    pub fn set_rate(&self, rate: f32) -> Result<()> {
        self.scheduler.set_rate(rate)?;
        Ok(())
    }

    /// Whether audio is playing or still being generated.
    pub fn is_speaking(&self) -> bool {
        self.scheduler.is_playing()
            || self
                .store()
                .is_some_and(|store| !store.run_status().is_terminal())
    }

    pub fn progress(&self) -> Progress {
        let playback = self.scheduler.state();
        let (states, run) = match self.store() {
            Some(store) => (store.states(), store.run_status()),
            None => (Vec::new(), RunStatus::Completed),
        };
        Progress {
            total: states.len(),
            ready: states
                .iter()
                .filter(|s| **s == SynthesisState::Ready)
                .count(),
            states,
            run,
            active_index: playback.active_index,
            is_playing: playback.is_playing,
            rate: playback.rate,
        }
    }

    /// Wait until synthesis has ended and playback is idle.
    pub async fn wait(&self) {
        if let Some(store) = self.store() {
            store.finished().await;
        }
        self.scheduler.wait_idle().await;
    }

    /// Write every ready segment of the current narration, merged in order.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<MergedAudio> {
        let store = self.store().ok_or(NarratorError::NothingSpoken)?;
        let merged = export::write_merged(path.as_ref(), &store.ready_segments())?;
        info!(path = %path.as_ref().display(), samples = merged.samples.len(), "exported narration");
        Ok(merged)
    }

    fn store(&self) -> Option<SegmentStore> {
        lock(&self.current).as_ref().map(|run| run.store().clone())
    }

    fn cancel_run(&self) {
        if let Some(run) = lock(&self.current).as_ref() {
            run.cancel();
        }
    }

    fn driver(&self) -> Result<SynthesisDriver> {
        self.engine.borrow().driver()
    }
}

/// Publish the engine into `slot` once it has loaded.
fn resolve_engine(
    mut pending: PendingEngine,
    slot: Arc<watch::Sender<EngineSlot>>,
    bus: EventBus,
    config: &NarratorConfig,
) {
    let speaker_id = config.speaker_id;
    let capacity = config.event_capacity;
    let settle = move |result: tts::Result<EngineHandle>| {
        let next = match result {
            Ok(handle) => {
                let driver = SynthesisDriver::with_capacity(handle, speaker_id, capacity);
                bus.forward(driver.subscribe(), NarratorEvent::Synthesis);
                bus.set_status("Ready");
                info!("voice ready");
                EngineSlot::Ready(driver)
            }
            Err(e) => {
                bus.set_status(format!("Voice failed to load: {e}"));
                EngineSlot::Failed(Arc::new(e))
            }
        };
        slot.send_replace(next);
    };
    match pending.try_take() {
        Some(result) => settle(result),
        None => {
            tokio::spawn(async move { settle(pending.wait().await) });
        }
    }
}
