//! Per-run record of which segments have audio.
//!
//! The synthesis driver writes, playback reads. State lives in a
//! [`tokio::sync::watch`] channel so readers can wait for a segment without
//! polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::AudioSegment;

/// Lifecycle of one segment. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisState {
    Pending,
    Generating,
    Ready,
    Failed,
}

/// Lifecycle of a whole synthesis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Failed {
        index: usize,
    },
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Why a segment could not be handed to playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReason {
    /// The inference call for this segment failed.
    Failed,
    /// The run ended before this segment was synthesized.
    Stopped,
    /// The segment did not become ready within the wait budget.
    TimedOut,
    /// No such segment in this run.
    OutOfRange,
}

impl std::fmt::Display for MissingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MissingReason::Failed => "synthesis failed",
            MissingReason::Stopped => "synthesis stopped",
            MissingReason::TimedOut => "timed out",
            MissingReason::OutOfRange => "no such part",
        })
    }
}

#[derive(Debug)]
struct Timeline {
    states: Vec<SynthesisState>,
    audio: Vec<Option<Arc<AudioSegment>>>,
    run: RunStatus,
}

impl Timeline {
    fn resolved(&self, index: usize) -> bool {
        match self.states.get(index) {
            None => true,
            Some(SynthesisState::Ready | SynthesisState::Failed) => true,
            Some(_) => self.run.is_terminal(),
        }
    }

    fn lookup(&self, index: usize) -> std::result::Result<Arc<AudioSegment>, MissingReason> {
        match self.states.get(index) {
            None => Err(MissingReason::OutOfRange),
            Some(SynthesisState::Ready) => self.audio[index]
                .clone()
                .ok_or(MissingReason::Stopped),
            Some(SynthesisState::Failed) => Err(MissingReason::Failed),
            Some(_) => Err(MissingReason::Stopped),
        }
    }
}

/// Shared view of one run's segments.
#[derive(Debug, Clone)]
pub struct SegmentStore {
    tx: Arc<watch::Sender<Timeline>>,
}

impl SegmentStore {
    /// A store for `len` segments, all pending.
    pub fn new(len: usize) -> Self {
        let (tx, _) = watch::channel(Timeline {
            states: vec![SynthesisState::Pending; len],
            audio: vec![None; len],
            run: RunStatus::Running,
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self, index: usize) -> Option<SynthesisState> {
        self.tx.borrow().states.get(index).copied()
    }

    pub fn states(&self) -> Vec<SynthesisState> {
        self.tx.borrow().states.clone()
    }

    pub fn run_status(&self) -> RunStatus {
        self.tx.borrow().run
    }

    pub fn audio(&self, index: usize) -> Option<Arc<AudioSegment>> {
        self.tx.borrow().audio.get(index).cloned().flatten()
    }

    /// Every ready segment, in index order.
    pub fn ready_segments(&self) -> Vec<Arc<AudioSegment>> {
        self.tx.borrow().audio.iter().flatten().cloned().collect()
    }

    pub fn ready_count(&self) -> usize {
        self.tx.borrow().audio.iter().flatten().count()
    }

    /// `Pending -> Generating`. Returns `false` if the transition is invalid.
    pub fn begin(&self, index: usize) -> bool {
        self.tx.send_if_modified(|t| match t.states.get_mut(index) {
            Some(state) if *state == SynthesisState::Pending => {
                *state = SynthesisState::Generating;
                true
            }
            _ => false,
        })
    }

    /// `Generating -> Ready`, storing the audio.
    pub fn complete(&self, segment: AudioSegment) -> Option<Arc<AudioSegment>> {
        let index = segment.index;
        let segment = Arc::new(segment);
        let stored = self.tx.send_if_modified(|t| match t.states.get_mut(index) {
            Some(state) if *state == SynthesisState::Generating => {
                *state = SynthesisState::Ready;
                t.audio[index] = Some(segment.clone());
                true
            }
            _ => false,
        });
        stored.then_some(segment)
    }

    /// `Generating -> Failed`.
    pub fn fail(&self, index: usize) -> bool {
        self.tx.send_if_modified(|t| match t.states.get_mut(index) {
            Some(state) if *state == SynthesisState::Generating => {
                *state = SynthesisState::Failed;
                true
            }
            _ => false,
        })
    }

    /// Record how the run ended. Only the first terminal status sticks.
    pub fn finish(&self, status: RunStatus) -> bool {
        self.tx.send_if_modified(|t| {
            if t.run.is_terminal() || !status.is_terminal() {
                return false;
            }
            t.run = status;
            true
        })
    }

    /// Wait until segment `index` is ready, failed, or can no longer arrive.
    pub async fn wait_ready(
        &self,
        index: usize,
        timeout: Duration,
    ) -> std::result::Result<Arc<AudioSegment>, MissingReason> {
        let mut rx = self.tx.subscribe();
        let found = match tokio::time::timeout(timeout, rx.wait_for(|t| t.resolved(index))).await {
            Ok(Ok(timeline)) => timeline.lookup(index),
            Ok(Err(_)) => Err(MissingReason::Stopped),
            Err(_) => Err(MissingReason::TimedOut),
        };
        found
    }

    /// Wait until the run reaches a terminal status.
    pub async fn finished(&self) -> RunStatus {
        let mut rx = self.tx.subscribe();
        let status = match rx.wait_for(|t| t.run.is_terminal()).await {
            Ok(timeline) => timeline.run,
            Err(_) => RunStatus::Cancelled,
        };
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_never_revert() {
        let store = SegmentStore::new(2);
        assert!(store.begin(0));
        assert!(!store.begin(0));
        assert!(store.complete(AudioSegment::new(0, vec![0.0], 8000)).is_some());
        assert!(!store.fail(0));
        assert_eq!(store.state(0), Some(SynthesisState::Ready));
        assert!(store.complete(AudioSegment::new(1, vec![0.0], 8000)).is_none());
        assert_eq!(store.state(1), Some(SynthesisState::Pending));
    }

    #[test]
    fn first_terminal_status_wins() {
        let store = SegmentStore::new(1);
        assert!(!store.finish(RunStatus::Running));
        assert!(store.finish(RunStatus::Cancelled));
        assert!(!store.finish(RunStatus::Completed));
        assert_eq!(store.run_status(), RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn wait_resolves_when_segment_arrives() {
        let store = SegmentStore::new(1);
        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.begin(0);
            writer.complete(AudioSegment::new(0, vec![0.1; 4], 8000));
        });
        let seg = store.wait_ready(0, Duration::from_secs(5)).await.unwrap();
        assert_eq!(seg.samples.len(), 4);
    }

    #[tokio::test]
    async fn wait_reports_missing_segments() {
        let store = SegmentStore::new(2);
        assert_eq!(
            store.wait_ready(5, Duration::from_secs(1)).await,
            Err(MissingReason::OutOfRange)
        );
        assert_eq!(
            store.wait_ready(0, Duration::from_millis(10)).await,
            Err(MissingReason::TimedOut)
        );
        store.begin(0);
        store.fail(0);
        store.finish(RunStatus::Failed { index: 0 });
        assert_eq!(
            store.wait_ready(0, Duration::from_secs(1)).await,
            Err(MissingReason::Failed)
        );
        assert_eq!(
            store.wait_ready(1, Duration::from_secs(1)).await,
            Err(MissingReason::Stopped)
        );
    }
}
