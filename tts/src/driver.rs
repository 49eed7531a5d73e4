use std::sync::Arc;

use lingproc::TextSegment;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::{
    AudioSegment, CancelFlag, EngineHandle, NOMINAL_SPEED, Result, RunStatus, SegmentStore,
    SynthesisEvent, TtsError,
};

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { segments: usize },
    Cancelled { completed: usize },
}

/// Feed segments to the engine sequentially and publish their audio.
///
/// Cloning is cheap; every clone shares the same engine, which is locked
/// for the whole duration of a run.
#[derive(Clone)]
pub struct SynthesisDriver {
    engine: Arc<Mutex<EngineHandle>>,
    speaker_id: u32,
    events: broadcast::Sender<SynthesisEvent>,
}

impl SynthesisDriver {
    /// Default broadcast capacity for progress events.
    pub const DEFAULT_EVENT_CAPACITY: usize = 64;

    pub fn new(engine: EngineHandle, speaker_id: u32) -> Self {
        Self::with_capacity(engine, speaker_id, Self::DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(engine: EngineHandle, speaker_id: u32, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            engine: Arc::new(Mutex::new(engine)),
            speaker_id,
            events,
        }
    }

    pub fn speaker_id(&self) -> u32 {
        self.speaker_id
    }

    /// Subscribe to progress events of all future runs.
    pub fn subscribe(&self) -> broadcast::Receiver<SynthesisEvent> {
        self.events.subscribe()
    }

    /// Spawn a background run over `segments`.
    pub fn start(&self, segments: Vec<TextSegment>, cancel: CancelFlag) -> SynthesisRun {
        let store = SegmentStore::new(segments.len());
        let driver = self.clone();
        let run_store = store.clone();
        let run_cancel = cancel.clone();
        let handle =
            tokio::spawn(async move { driver.run(&segments, &run_store, &run_cancel).await });
        SynthesisRun {
            store,
            cancel,
            handle,
        }
    }

    /// Synthesize `segments` in order into `store`.
    ///
    /// Yields to the runtime and checks `cancel` before every inference call.
    /// A call that is already running is allowed to finish; its result is
    /// dropped if cancellation was requested meanwhile.
    pub async fn run(
        &self,
        segments: &[TextSegment],
        store: &SegmentStore,
        cancel: &CancelFlag,
    ) -> Result<RunOutcome> {
        let total = segments.len();
        let mut engine = self.engine.clone().lock_owned().await;
        info!(total, "synthesis started");
        self.publish(SynthesisEvent::Started { total });

        for (completed, segment) in segments.iter().enumerate() {
            tokio::task::yield_now().await;
            if cancel.is_cancelled() {
                return Ok(self.cancelled(store, completed, total));
            }

            let index = segment.index;
            debug_assert_eq!(index, completed, "segments must be positional");
            store.begin(index);
            debug!(index, total, chars = segment.char_len(), "generating segment");
            self.publish(SynthesisEvent::Generating { index, total });

            let text = segment.text.clone();
            let speaker_id = self.speaker_id;
            let joined = tokio::task::spawn_blocking(move || {
                let result = engine.generate(&text, speaker_id, NOMINAL_SPEED);
                (engine, result)
            })
            .await;

            let generated = match joined {
                Ok((guard, result)) => {
                    engine = guard;
                    result
                }
                Err(join) => {
                    return Err(self.failed(store, index, total, join.into()));
                }
            };

            match generated {
                Ok(audio) => {
                    if cancel.is_cancelled() {
                        debug!(index, "discarding audio finished after cancellation");
                        return Ok(self.cancelled(store, completed, total));
                    }
                    let segment = AudioSegment::new(index, audio.samples, audio.sample_rate);
                    let duration = segment.duration();
                    store.complete(segment);
                    debug!(index, ?duration, "segment ready");
                    self.publish(SynthesisEvent::SegmentReady {
                        index,
                        total,
                        duration,
                    });
                }
                Err(e) => {
                    return Err(self.failed(store, index, total, e.into()));
                }
            }
        }

        store.finish(RunStatus::Completed);
        info!(total, "synthesis finished");
        self.publish(SynthesisEvent::Finished { total });
        Ok(RunOutcome::Completed { segments: total })
    }

    fn publish(&self, event: SynthesisEvent) {
        let _ = self.events.send(event);
    }

    fn cancelled(&self, store: &SegmentStore, completed: usize, total: usize) -> RunOutcome {
        store.finish(RunStatus::Cancelled);
        info!(completed, total, "synthesis cancelled");
        self.publish(SynthesisEvent::Cancelled { completed, total });
        RunOutcome::Cancelled { completed }
    }

    fn failed(
        &self,
        store: &SegmentStore,
        index: usize,
        total: usize,
        source: crate::BoxError,
    ) -> TtsError {
        store.fail(index);
        store.finish(RunStatus::Failed { index });
        let message = source.to_string();
        error!(index, total, error = %message, "segment synthesis failed");
        self.publish(SynthesisEvent::Failed {
            index,
            total,
            message,
        });
        TtsError::SegmentSynthesis { index, source }
    }
}

/// A run in progress, as returned by [`SynthesisDriver::start`].
#[derive(Debug)]
pub struct SynthesisRun {
    store: SegmentStore,
    cancel: CancelFlag,
    handle: JoinHandle<Result<RunOutcome>>,
}

impl SynthesisRun {
    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Ask the run to stop at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run to end.
    pub async fn join(self) -> Result<RunOutcome> {
        self.handle.await?
    }
}
