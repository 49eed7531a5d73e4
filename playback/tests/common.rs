#![allow(dead_code)]

use std::sync::Arc;

use playback::{ClockOutput, PlaybackEvent, PlaybackScheduler, SchedulerConfig};
use tokio::sync::broadcast;
use tts::{AudioSegment, SegmentStore};

pub const RATE: u32 = 1_000;

pub fn segment(index: usize, secs: f64) -> AudioSegment {
    AudioSegment::new(index, vec![0.1; (secs * f64::from(RATE)) as usize], RATE)
}

/// A store whose segments are all ready.
pub fn ready_store(lengths: &[f64]) -> SegmentStore {
    let store = SegmentStore::new(lengths.len());
    for (index, secs) in lengths.iter().enumerate() {
        store.begin(index);
        store.complete(segment(index, *secs));
    }
    store.finish(tts::RunStatus::Completed);
    store
}

pub fn scheduler(config: SchedulerConfig) -> (PlaybackScheduler, ClockOutput) {
    let output = ClockOutput::new();
    (
        PlaybackScheduler::with_config(Arc::new(output.clone()), config),
        output,
    )
}

pub fn drain(rx: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut events = Vec::new();
    while let Ok(evt) = rx.try_recv() {
        events.push(evt);
    }
    events
}

pub async fn wait_started(rx: &mut broadcast::Receiver<PlaybackEvent>, index: usize) {
    loop {
        if let PlaybackEvent::Started { index: i, .. } = rx.recv().await.unwrap() {
            if i == index {
                return;
            }
        }
    }
}
