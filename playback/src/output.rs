use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tts::AudioSegment;

use crate::Result;

/// Identifies one scheduled source on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

/// A segment to be played at `start_at` device seconds.
#[derive(Debug, Clone)]
pub struct SourceRequest {
    pub audio: Arc<AudioSegment>,
    pub start_at: f64,
    pub rate: f32,
}

/// Handle returned by [`AudioOutput::start`].
///
/// `ended` resolves with `Ok(())` when the source plays to its natural end.
/// A stopped source drops the sender instead.
#[derive(Debug)]
pub struct ScheduledSource {
    pub id: SourceId,
    pub start_at: f64,
    pub ended: oneshot::Receiver<()>,
}

/// A device that plays mono buffers on its own clock.
///
/// Devices start suspended and keep their clock at zero until resumed.
#[async_trait]
pub trait AudioOutput: Send + Sync + 'static {
    /// Device time in seconds.
    fn now(&self) -> f64;
    fn is_running(&self) -> bool;
    async fn resume(&self) -> Result<()>;
    fn start(&self, request: SourceRequest) -> Result<ScheduledSource>;
    /// Silence a source immediately. Unknown ids are ignored.
    fn stop(&self, id: SourceId);
    /// Change the playback rate of a sounding or scheduled source.
    fn set_rate(&self, id: SourceId, rate: f32);
}
