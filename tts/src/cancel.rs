use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// One-way cancellation latch shared by synthesis and playback.
///
/// Checked only at suspension points. A fresh flag is created for every run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
