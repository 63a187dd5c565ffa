use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Alarm;

/// How a ring was resolved. `Unknown` marks an entry whose session has not
/// resolved yet (or never did, e.g. the process died mid-ring).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DismissType {
    Steps,
    Photo,
    Both,
    Snooze,
    ForceStop,
    Unknown,
}

impl DismissType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DismissType::Steps => "steps",
            DismissType::Photo => "photo",
            DismissType::Both => "both",
            DismissType::Snooze => "snooze",
            DismissType::ForceStop => "forceStop",
            DismissType::Unknown => "unknown",
        }
    }
}

/// One line of the append-only alarm history.
///
/// The alarm title is copied, not referenced, so renaming an alarm later
/// does not rewrite history. An entry is created at ring time with
/// `dismiss_time: None` and updated exactly once when its session resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub alarm_id: String,
    pub alarm_title: String,
    pub ring_time: NaiveDateTime,
    pub dismiss_time: Option<NaiveDateTime>,
    pub dismiss_type: DismissType,
    pub steps_taken: Option<u32>,
    pub photo_similarity: Option<f64>,
    pub photo_path: Option<String>,
    pub was_snoozed: bool,
    pub snooze_count: u32,
    pub notes: Option<String>,
}

impl HistoryEntry {
    /// Unresolved entry appended the moment an alarm starts ringing.
    pub fn ring(alarm: &Alarm, ring_time: NaiveDateTime, snooze_count: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            alarm_id: alarm.id.clone(),
            alarm_title: alarm.title.clone(),
            ring_time,
            dismiss_time: None,
            dismiss_type: DismissType::Unknown,
            steps_taken: None,
            photo_similarity: None,
            photo_path: None,
            was_snoozed: snooze_count > 0,
            snooze_count,
            notes: None,
        }
    }
}
