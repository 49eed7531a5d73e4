use std::fmt;
use std::time::Duration;

/// Progress notifications published by the synthesis driver.
///
/// The `Display` form is the status line shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisEvent {
    Started {
        total: usize,
    },
    Generating {
        index: usize,
        total: usize,
    },
    SegmentReady {
        index: usize,
        total: usize,
        duration: Duration,
    },
    Failed {
        index: usize,
        total: usize,
        message: String,
    },
    Cancelled {
        completed: usize,
        total: usize,
    },
    Finished {
        total: usize,
    },
}

impl SynthesisEvent {
    /// Index of the segment the event is about, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            SynthesisEvent::Generating { index, .. }
            | SynthesisEvent::SegmentReady { index, .. }
            | SynthesisEvent::Failed { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Whether no further events follow for this run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SynthesisEvent::Failed { .. }
                | SynthesisEvent::Cancelled { .. }
                | SynthesisEvent::Finished { .. }
        )
    }
}

impl fmt::Display for SynthesisEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesisEvent::Started { total } => write!(f, "Preparing {total} part(s)..."),
            SynthesisEvent::Generating { index, total } => {
                write!(f, "Generating part {}/{}...", index + 1, total)
            }
            SynthesisEvent::SegmentReady {
                index,
                total,
                duration,
            } => write!(
                f,
                "Part {}/{} ready ({:.1}s)",
                index + 1,
                total,
                duration.as_secs_f64()
            ),
            SynthesisEvent::Failed {
                index,
                total,
                message,
            } => write!(f, "Error in part {}/{}: {}", index + 1, total, message),
            SynthesisEvent::Cancelled { completed, total } => {
                write!(f, "Stopped after {completed} of {total} part(s)")
            }
            SynthesisEvent::Finished { total } => write!(f, "Done: {total} part(s) generated"),
        }
    }
}
