use chrono::NaiveDateTime;
use serde::Serialize;

use crate::models::{Alarm, DismissMethod};

/// The single alarm currently awaiting dismissal. Transient, never
/// persisted; at most one exists system-wide, owned by the state machine
/// for its lifetime.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RingingSession {
    pub alarm: Alarm,
    /// Id of the history entry opened for this ring, resolved exactly once.
    pub entry_id: String,
    pub ring_time: NaiveDateTime,
    pub current_steps: u32,
    pub photo_similarity: Option<f64>,
    pub photo_path: Option<String>,
    pub steps_completed: bool,
    pub photo_completed: bool,
    /// Carried across snooze re-rings of the same alarm.
    pub snooze_count: u32,
}

impl RingingSession {
    pub fn new(
        alarm: Alarm,
        entry_id: String,
        ring_time: NaiveDateTime,
        snooze_count: u32,
    ) -> Self {
        Self {
            alarm,
            entry_id,
            ring_time,
            current_steps: 0,
            photo_similarity: None,
            photo_path: None,
            steps_completed: false,
            photo_completed: false,
            snooze_count,
        }
    }

    pub fn step_progress(&self) -> f64 {
        match self.alarm.dismiss_method.required_steps() {
            Some(target) if target > 0 => {
                (f64::from(self.current_steps) / f64::from(target)).min(1.0)
            }
            _ => 0.0,
        }
    }

    /// Whether every channel the method requires has completed. The
    /// exhaustive match is the point: adding a method forces a decision here.
    pub fn is_complete(&self) -> bool {
        match self.alarm.dismiss_method {
            DismissMethod::Steps { .. } => self.steps_completed,
            DismissMethod::Photo { .. } => self.photo_completed,
            DismissMethod::Both { .. } => self.steps_completed && self.photo_completed,
        }
    }
}
