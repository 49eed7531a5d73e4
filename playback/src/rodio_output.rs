//! Output through the default sound card via `rodio`.
//!
//! The `OutputStream` lives on a dedicated thread for the lifetime of the
//! device; sources are `Sink`s attached to its mixer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rodio::buffer::SamplesBuffer;
use rodio::mixer::Mixer;
use rodio::{OutputStreamBuilder, Sink};
use tokio::sync::oneshot;
use tokio::time::{self, Instant};
use tracing::{debug, error, info};

use crate::{AudioOutput, PlaybackError, Result, ScheduledSource, SourceId, SourceRequest};

#[derive(Default)]
struct Slot {
    sink: Option<Arc<Sink>>,
    rate: f32,
}

#[derive(Default)]
struct Device {
    mixer: Option<Mixer>,
    resumed_at: Option<Instant>,
    /// Dropping this lets the stream thread exit.
    shutdown: Option<std::sync::mpsc::Sender<()>>,
}

#[derive(Default)]
struct RodioInner {
    device: Mutex<Device>,
    next_id: AtomicU64,
    slots: Mutex<HashMap<SourceId, Slot>>,
}

/// Default-device output. Opened lazily by [`AudioOutput::resume`].
#[derive(Clone, Default)]
pub struct RodioOutput {
    inner: Arc<RodioInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RodioOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AudioOutput for RodioOutput {
    fn now(&self) -> f64 {
        lock(&self.inner.device)
            .resumed_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn is_running(&self) -> bool {
        lock(&self.inner.device).mixer.is_some()
    }

    async fn resume(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let (ready_tx, ready_rx) = oneshot::channel::<Result<Mixer>>();
        let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel::<()>();
        std::thread::Builder::new()
            .name("narrator-audio".into())
            .spawn(move || match OutputStreamBuilder::open_default_stream() {
                Ok(mut stream) => {
                    stream.log_on_drop(false);
                    let _ = ready_tx.send(Ok(stream.mixer().clone()));
                    let _ = shutdown_rx.recv();
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(PlaybackError::Device(e.to_string())));
                }
            })
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        let mixer = ready_rx
            .await
            .map_err(|_| PlaybackError::Device("audio thread exited".into()))??;
        let mut device = lock(&self.inner.device);
        device.mixer = Some(mixer);
        device.resumed_at = Some(Instant::now());
        device.shutdown = Some(shutdown_tx);
        info!("audio output opened");
        Ok(())
    }

    fn start(&self, request: SourceRequest) -> Result<ScheduledSource> {
        let (mixer, begin) = {
            let device = lock(&self.inner.device);
            match (&device.mixer, device.resumed_at) {
                (Some(mixer), Some(origin)) => (
                    mixer.clone(),
                    origin + Duration::from_secs_f64(request.start_at.max(0.0)),
                ),
                _ => return Err(PlaybackError::Device("output is suspended".into())),
            }
        };
        let id = SourceId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.inner.slots).insert(
            id,
            Slot {
                sink: None,
                rate: request.rate,
            },
        );

        let (ended_tx, ended_rx) = oneshot::channel();
        let inner = self.inner.clone();
        let audio = request.audio;
        tokio::spawn(async move {
            time::sleep_until(begin).await;
            let sink = {
                let mut slots = lock(&inner.slots);
                let Some(slot) = slots.get_mut(&id) else {
                    return;
                };
                let sink = Arc::new(Sink::connect_new(&mixer));
                sink.set_speed(slot.rate);
                sink.append(SamplesBuffer::new(
                    1,
                    audio.sample_rate,
                    audio.samples.clone(),
                ));
                slot.sink = Some(sink.clone());
                sink
            };
            debug!(index = audio.index, "sink playing");
            if let Err(e) = tokio::task::spawn_blocking(move || sink.sleep_until_end()).await {
                error!(error = %e, "audio sink wait failed");
            }
            if lock(&inner.slots).remove(&id).is_some() {
                let _ = ended_tx.send(());
            }
        });

        Ok(ScheduledSource {
            id,
            start_at: request.start_at,
            ended: ended_rx,
        })
    }

    fn stop(&self, id: SourceId) {
        if let Some(slot) = lock(&self.inner.slots).remove(&id) {
            if let Some(sink) = slot.sink {
                sink.stop();
            }
        }
    }

    fn set_rate(&self, id: SourceId, rate: f32) {
        if let Some(slot) = lock(&self.inner.slots).get_mut(&id) {
            slot.rate = rate;
            if let Some(sink) = &slot.sink {
                sink.set_speed(rate);
            }
        }
    }
}
