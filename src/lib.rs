//! wakeproof: an alarm trigger and dismissal verification engine.
//!
//! Dismissing an alarm requires proof of wakefulness: walking a number of
//! steps, taking a photo that matches a stored reference, or both. This
//! crate is the engine only — scheduling, step detection, photo similarity,
//! the dismissal state machine, history, and persistence. Screens, sounds
//! and sensors are collaborators the embedder wires to the engine's event
//! channel and entry points.

pub mod engine;
pub mod error;
pub mod history;
pub mod models;
pub mod scheduler;
pub mod steps;
pub mod store;
pub mod verify;

mod utils;

pub use engine::{AlarmDiff, AlarmEngine, Clock, EngineEvent, RingingSession, SystemClock};
pub use error::EngineError;
pub use history::{aggregate, Statistics};
pub use models::{Alarm, DismissMethod, DismissType, HistoryEntry};
pub use steps::{MotionSample, StepDetector, StepEvent};
pub use store::Store;
pub use verify::{FileCodec, ImageCodec, PhotoVerifier, VerificationResult};
