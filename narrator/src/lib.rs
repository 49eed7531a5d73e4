//! Streaming narration: segment text, synthesize it on a background task and
//! play each part as soon as it is ready.

pub mod config;
pub mod controls;
pub mod event_bus;
pub mod logging;
pub mod narrator;

pub use config::{NarratorConfig, OutputKind, Settings};
pub use controls::{Control, ControlError, run_controls};
pub use event_bus::{EventBus, NarratorEvent};
pub use logging::init_logging;
pub use narrator::{Narrator, NarratorError, Progress};
