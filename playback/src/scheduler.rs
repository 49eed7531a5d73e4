//! Plays a run's segments back to back.
//!
//! One session at a time: every `play_from` or `stop` bumps a generation
//! counter, and a session task that finds its generation outdated exits
//! without touching the device.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tts::{AudioSegment, CancelFlag, SegmentStore};

use crate::{
    AudioOutput, PlaybackError, PlaybackEvent, Result, ScheduledSource, SourceId, SourceRequest,
};

/// Tunables of a [`PlaybackScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How long to wait for a segment that is not ready yet before skipping it.
    pub ready_timeout: Duration,
    pub initial_rate: f32,
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(50),
            initial_rate: 1.0,
            event_capacity: 64,
        }
    }
}

/// Snapshot of the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub active_index: Option<usize>,
    pub is_playing: bool,
    /// Set when the last session ran past the final segment.
    pub ended: bool,
    /// Latched by an explicit stop or a cancelled run. Cleared by `attach`.
    pub cancelled: bool,
    pub rate: f32,
}

#[derive(Debug, Default)]
struct Session {
    generation: u64,
    store: Option<SegmentStore>,
    cancel: CancelFlag,
    source: Option<SourceId>,
    /// Device time at which the last scheduled source ends.
    clock: f64,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    output: Arc<dyn AudioOutput>,
    config: SchedulerConfig,
    state: watch::Sender<PlaybackState>,
    events: broadcast::Sender<PlaybackEvent>,
    session: Mutex<Session>,
}

/// Sequential, gapless player for one synthesis run at a time.
#[derive(Clone)]
pub struct PlaybackScheduler {
    inner: Arc<Inner>,
}

impl PlaybackScheduler {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self::with_config(output, SchedulerConfig::default())
    }

    pub fn with_config(output: Arc<dyn AudioOutput>, config: SchedulerConfig) -> Self {
        let (state, _) = watch::channel(PlaybackState {
            active_index: None,
            is_playing: false,
            ended: false,
            cancelled: false,
            rate: config.initial_rate,
        });
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                output,
                config,
                state,
                events,
                session: Mutex::new(Session::default()),
            }),
        }
    }

    pub fn output(&self) -> &Arc<dyn AudioOutput> {
        &self.inner.output
    }

    /// Point the scheduler at a new run. Stops any current session.
    ///
    /// Once `cancel` is set, sessions stop advancing past the segment they
    /// are on. Ready segments can still be played with `play_from`.
    pub fn attach(&self, store: SegmentStore, cancel: CancelFlag) {
        self.stop();
        {
            let mut session = self.inner.lock();
            session.store = Some(store);
            session.cancel = cancel;
        }
        self.inner.state.send_modify(|s| {
            s.ended = false;
            s.cancelled = false;
        });
    }

    /// Stop and zero the scheduling clock so the next segment starts at once.
    pub fn reset(&self) {
        self.stop();
        self.inner.lock().clock = 0.0;
    }

    /// Resume the output device if it is suspended.
    pub async fn ensure_running(&self) -> Result<()> {
        if self.inner.output.is_running() {
            return Ok(());
        }
        self.inner.output.resume().await.inspect_err(|e| {
            error!(error = %e, "failed to resume audio output");
            self.inner.publish(PlaybackEvent::DeviceError {
                message: e.to_string(),
            });
        })
    }

    /// Start a session at segment `index`, replacing any current one.
    ///
    /// Synthesis is not affected.
    pub async fn play_from(&self, index: usize) -> Result<()> {
        let len = self
            .inner
            .lock()
            .store
            .as_ref()
            .map(SegmentStore::len)
            .ok_or(PlaybackError::NoTimeline)?;
        if index >= len {
            return Err(PlaybackError::IndexOutOfRange { index, len });
        }
        self.ensure_running().await?;

        let mut session = self.inner.lock();
        let Some(store) = session.store.clone() else {
            return Err(PlaybackError::NoTimeline);
        };
        let cancel = session.cancel.clone();
        self.inner.halt(&mut session);
        session.generation += 1;
        let generation = session.generation;
        self.inner.state.send_modify(|s| {
            s.active_index = Some(index);
            s.is_playing = true;
            s.ended = false;
        });
        info!(index, generation, "playback session started");
        session.task = Some(tokio::spawn(run_session(
            self.inner.clone(),
            generation,
            store,
            cancel,
            index,
        )));
        Ok(())
    }

    /// Halt output and end the session. Safe to call at any time.
    pub fn stop(&self) {
        let was_playing = {
            let mut session = self.inner.lock();
            self.inner.halt(&mut session);
            session.generation += 1;
            let mut was = None;
            self.inner.state.send_if_modified(|s| {
                let changed = s.is_playing || !s.cancelled;
                if s.is_playing {
                    was = Some(s.active_index);
                }
                s.is_playing = false;
                s.active_index = None;
                s.cancelled = true;
                changed
            });
            was
        };
        if let Some(index) = was_playing {
            info!(?index, "playback stopped");
            self.inner.publish(PlaybackEvent::Stopped { index });
        }
    }

    /// Set the playback rate of the sounding segment and all later ones.
    ///
    /// Stored audio is never modified.
    pub fn set_rate(&self, rate: f32) -> Result<()> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(PlaybackError::InvalidRate(rate));
        }
        let session = self.inner.lock();
        self.inner.state.send_modify(|s| s.rate = rate);
        if let Some(id) = session.source {
            self.inner.output.set_rate(id, rate);
        }
        debug!(rate, "playback rate changed");
        Ok(())
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.state.borrow().clone()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.state.borrow().is_playing
    }

    pub fn watch_state(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until no session is playing.
    pub async fn wait_idle(&self) -> PlaybackState {
        let mut rx = self.inner.state.subscribe();
        let state = match rx.wait_for(|s| !s.is_playing).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, event: PlaybackEvent) {
        let _ = self.events.send(event);
    }

    /// Silence the current source and drop the session task.
    fn halt(&self, session: &mut Session) {
        if let Some(id) = session.source.take() {
            self.output.stop(id);
        }
        if let Some(task) = session.task.take() {
            task.abort();
        }
        session.clock = session.clock.min(self.output.now());
    }

    fn set_active(&self, generation: u64, index: usize) -> bool {
        let session = self.lock();
        if session.generation != generation {
            return false;
        }
        self.state.send_modify(|s| s.active_index = Some(index));
        true
    }

    /// Hand `audio` to the device at the next gapless start time.
    ///
    /// `Ok(None)` means the session was superseded.
    fn schedule(
        &self,
        generation: u64,
        audio: Arc<AudioSegment>,
    ) -> Result<Option<ScheduledSource>> {
        let mut session = self.lock();
        if session.generation != generation {
            return Ok(None);
        }
        let index = audio.index;
        let rate = self.state.borrow().rate;
        let start_at = self.output.now().max(session.clock);
        let playback = audio.playback_secs(rate);
        let source = self.output.start(SourceRequest {
            audio,
            start_at,
            rate,
        })?;
        session.source = Some(source.id);
        session.clock = start_at + playback;
        debug!(index, start_at, rate, "segment scheduled");
        self.publish(PlaybackEvent::Started { index, start_at });
        Ok(Some(source))
    }

    /// Record the natural end of the current source.
    fn finished(&self, generation: u64, id: SourceId) -> bool {
        let mut session = self.lock();
        if session.generation != generation || session.source != Some(id) {
            return false;
        }
        session.source = None;
        session.clock = self.output.now();
        true
    }

    fn end(&self, generation: u64) {
        let mut session = self.lock();
        if session.generation != generation {
            return;
        }
        session.task = None;
        self.state.send_modify(|s| {
            s.active_index = None;
            s.is_playing = false;
            s.ended = true;
        });
        info!("playback reached the end");
        self.publish(PlaybackEvent::Ended);
    }

    fn cancelled(&self, generation: u64) {
        let mut session = self.lock();
        if session.generation != generation {
            return;
        }
        session.task = None;
        self.state.send_modify(|s| {
            s.active_index = None;
            s.is_playing = false;
            s.cancelled = true;
        });
        info!("playback ended by cancellation");
        self.publish(PlaybackEvent::Stopped { index: None });
    }

    fn abandon(&self, generation: u64, error: &PlaybackError) {
        let mut session = self.lock();
        if session.generation != generation {
            return;
        }
        session.task = None;
        session.source = None;
        self.state.send_modify(|s| {
            s.active_index = None;
            s.is_playing = false;
        });
        error!(error = %error, "playback aborted");
        self.publish(PlaybackEvent::DeviceError {
            message: error.to_string(),
        });
    }
}

async fn run_session(
    inner: Arc<Inner>,
    generation: u64,
    store: SegmentStore,
    cancel: CancelFlag,
    start: usize,
) {
    let timeout = inner.config.ready_timeout;
    let mut index = start;
    loop {
        if index > start && cancel.is_cancelled() {
            inner.cancelled(generation);
            return;
        }
        if index >= store.len() {
            inner.end(generation);
            return;
        }
        if !inner.set_active(generation, index) {
            return;
        }

        let audio = match store.wait_ready(index, timeout).await {
            Ok(audio) => audio,
            Err(reason) => {
                warn!(index, %reason, "skipping part without audio");
                inner.publish(PlaybackEvent::Skipped { index, reason });
                index += 1;
                continue;
            }
        };

        let source = match inner.schedule(generation, audio) {
            Ok(Some(source)) => source,
            Ok(None) => return,
            Err(e) => {
                inner.abandon(generation, &e);
                return;
            }
        };

        if source.ended.await.is_err() || !inner.finished(generation, source.id) {
            return;
        }
        debug!(index, "segment finished");
        inner.publish(PlaybackEvent::Finished { index });
        index += 1;
    }
}
