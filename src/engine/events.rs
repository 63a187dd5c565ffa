use chrono::NaiveDateTime;
use serde::Serialize;

use crate::models::{Alarm, HistoryEntry};

/// Persistence diff for the embedder. The engine never writes storage
/// itself; it describes what changed and the caller applies it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "op")]
pub enum AlarmDiff {
    #[serde(rename_all = "camelCase")]
    Added { alarm: Alarm },
    #[serde(rename_all = "camelCase")]
    Updated { alarm: Alarm },
    #[serde(rename_all = "camelCase")]
    Removed { alarm_id: String },
}

/// Everything the presentation layer and the persistence layer need to
/// observe, pushed over one channel instead of ambient shared state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum EngineEvent {
    /// The notifier collaborator's cue to begin audio/vibration feedback.
    #[serde(rename_all = "camelCase")]
    RingStarted {
        alarm_id: String,
        alarm_title: String,
        volume: f64,
        vibrate: bool,
    },
    /// The cue to release audio/camera resources; emitted on every
    /// transition out of Ringing, whatever the reason.
    #[serde(rename_all = "camelCase")]
    RingStopped { alarm_id: String },
    #[serde(rename_all = "camelCase")]
    StepProgress {
        current_steps: u32,
        target_steps: u32,
        progress: f64,
    },
    #[serde(rename_all = "camelCase")]
    PhotoAccepted { similarity: f64 },
    /// A failed attempt; the session stays in Ringing and the user may retry.
    #[serde(rename_all = "camelCase")]
    PhotoRejected {
        similarity: f64,
        reason: Option<String>,
    },
    /// A required capability is missing; the ring continues but that
    /// channel cannot complete.
    #[serde(rename_all = "camelCase")]
    SensorUnavailable { capability: String },
    #[serde(rename_all = "camelCase")]
    Snoozed {
        alarm_id: String,
        resume_at: NaiveDateTime,
        snooze_count: u32,
    },
    #[serde(rename_all = "camelCase")]
    Dismissed { entry: HistoryEntry },
    AlarmChanged(AlarmDiff),
    /// Appended or resolved history entry; the embedder upserts by id.
    #[serde(rename_all = "camelCase")]
    HistoryRecorded { entry: HistoryEntry },
}
