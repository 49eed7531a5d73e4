//! Virtual output device driven by the tokio clock.
//!
//! Nothing is audible. Each source is a task that sleeps for the length of
//! its audio, scaled by its current rate. Every source is recorded so the
//! resulting schedule can be inspected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use crate::{AudioOutput, PlaybackError, Result, ScheduledSource, SourceId, SourceRequest};

/// One source as seen by a [`ClockOutput`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub id: SourceId,
    pub index: usize,
    pub start_at: f64,
    /// Rate the source was started with.
    pub rate: f32,
    /// Native length in seconds.
    pub duration: f64,
    pub ended_at: Option<f64>,
    pub stopped_at: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ClockOutput {
    inner: Arc<ClockInner>,
}

#[derive(Debug, Default)]
struct ClockInner {
    running: AtomicBool,
    resumed_at: Mutex<Option<Instant>>,
    next_id: AtomicU64,
    voices: Mutex<HashMap<SourceId, Voice>>,
    log: Mutex<Vec<ScheduleEntry>>,
    peak: AtomicUsize,
}

#[derive(Debug)]
struct Voice {
    rate: watch::Sender<f32>,
    sounding: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ClockOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every source started so far, in start order.
    pub fn schedule(&self) -> Vec<ScheduleEntry> {
        lock(&self.inner.log).clone()
    }

    /// Sources that are scheduled or sounding right now.
    pub fn active_sources(&self) -> usize {
        lock(&self.inner.voices).len()
    }

    /// Largest number of sources that were ever sounding at once.
    pub fn peak_concurrency(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }
}

impl ClockInner {
    fn now(&self) -> f64 {
        lock(&self.resumed_at)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn instant_at(&self, secs: f64) -> Instant {
        let origin = lock(&self.resumed_at).unwrap_or_else(Instant::now);
        origin + Duration::from_secs_f64(secs.max(0.0))
    }

    fn mark_sounding(&self, id: SourceId) -> bool {
        let mut voices = lock(&self.voices);
        let Some(voice) = voices.get_mut(&id) else {
            return false;
        };
        voice.sounding = true;
        let sounding = voices.values().filter(|v| v.sounding).count();
        self.peak.fetch_max(sounding, Ordering::SeqCst);
        true
    }

    fn record(&self, id: SourceId, update: impl FnOnce(&mut ScheduleEntry)) {
        if let Some(entry) = lock(&self.log).iter_mut().find(|e| e.id == id) {
            update(entry);
        }
    }
}

async fn run_voice(
    inner: Arc<ClockInner>,
    id: SourceId,
    begin: Instant,
    mut remaining: f64,
    mut rate: watch::Receiver<f32>,
    ended: oneshot::Sender<()>,
) {
    loop {
        tokio::select! {
            _ = time::sleep_until(begin) => break,
            changed = rate.changed() => if changed.is_err() { return },
        }
    }
    if !inner.mark_sounding(id) {
        return;
    }

    loop {
        let current = f64::from(*rate.borrow_and_update());
        let leg = Instant::now();
        tokio::select! {
            _ = time::sleep(Duration::from_secs_f64(remaining / current)) => break,
            changed = rate.changed() => {
                if changed.is_err() {
                    return;
                }
                remaining = (remaining - leg.elapsed().as_secs_f64() * current).max(0.0);
            }
        }
    }

    if lock(&inner.voices).remove(&id).is_some() {
        let now = inner.now();
        inner.record(id, |e| e.ended_at = Some(now));
        trace!(id = id.0, now, "source ended");
        let _ = ended.send(());
    }
}

#[async_trait]
impl AudioOutput for ClockOutput {
    fn now(&self) -> f64 {
        self.inner.now()
    }

    fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    async fn resume(&self) -> Result<()> {
        let mut resumed_at = lock(&self.inner.resumed_at);
        if resumed_at.is_none() {
            *resumed_at = Some(Instant::now());
            debug!("virtual output resumed");
        }
        self.inner.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn start(&self, request: SourceRequest) -> Result<ScheduledSource> {
        if !self.is_running() {
            return Err(PlaybackError::Device("output is suspended".into()));
        }
        if !(request.rate.is_finite() && request.rate > 0.0) {
            return Err(PlaybackError::InvalidRate(request.rate));
        }
        let id = SourceId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let duration = request.audio.duration_secs();
        let (rate_tx, rate_rx) = watch::channel(request.rate);
        let (ended_tx, ended_rx) = oneshot::channel();

        lock(&self.inner.voices).insert(
            id,
            Voice {
                rate: rate_tx,
                sounding: false,
            },
        );
        lock(&self.inner.log).push(ScheduleEntry {
            id,
            index: request.audio.index,
            start_at: request.start_at,
            rate: request.rate,
            duration,
            ended_at: None,
            stopped_at: None,
        });

        let begin = self.inner.instant_at(request.start_at);
        tokio::spawn(run_voice(
            self.inner.clone(),
            id,
            begin,
            duration,
            rate_rx,
            ended_tx,
        ));
        Ok(ScheduledSource {
            id,
            start_at: request.start_at,
            ended: ended_rx,
        })
    }

    fn stop(&self, id: SourceId) {
        if lock(&self.inner.voices).remove(&id).is_some() {
            let now = self.inner.now();
            self.inner.record(id, |e| e.stopped_at = Some(now));
            trace!(id = id.0, now, "source stopped");
        }
    }

    fn set_rate(&self, id: SourceId, rate: f32) {
        if let Some(voice) = lock(&self.inner.voices).get(&id) {
            voice.rate.send_replace(rate);
        }
    }
}
