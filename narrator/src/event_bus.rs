use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use playback::PlaybackEvent;
use tokio::sync::broadcast;
use tts::SynthesisEvent;

/// Anything the narrator reports to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum NarratorEvent {
    Synthesis(SynthesisEvent),
    Playback(PlaybackEvent),
}

impl fmt::Display for NarratorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NarratorEvent::Synthesis(evt) => evt.fmt(f),
            NarratorEvent::Playback(evt) => evt.fmt(f),
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Central hub for narrator events and the current status line.
#[derive(Clone)]
pub struct EventBus {
    events: broadcast::Sender<NarratorEvent>,
    status: Arc<Mutex<String>>,
}

impl EventBus {
    /// Default broadcast capacity for narrator events.
    pub const DEFAULT_EVENT_CAPACITY: usize = 64;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            events,
            status: Arc::new(Mutex::new(String::from("Idle"))),
        }
    }

    /// Send an event to all subscribers and make it the status line.
    pub fn publish(&self, event: NarratorEvent) {
        *lock(&self.status) = event.to_string();
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NarratorEvent> {
        self.events.subscribe()
    }

    /// Most recent status line.
    pub fn status(&self) -> String {
        lock(&self.status).clone()
    }

    /// Replace the status line without publishing an event.
    pub fn set_status(&self, line: impl Into<String>) {
        *lock(&self.status) = line.into();
    }

    /// Forward everything received on `rx` onto the bus until it closes.
    pub(crate) fn forward<T, F>(&self, mut rx: broadcast::Receiver<T>, wrap: F)
    where
        T: Clone + Send + 'static,
        F: Fn(T) -> NarratorEvent + Send + 'static,
    {
        let bus = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(evt) => bus.publish(wrap(evt)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
