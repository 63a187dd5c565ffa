use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Proof-of-wakefulness channel(s) required to stop a ringing alarm.
///
/// Each variant carries only the fields its verification channel needs. The
/// reference photo stays optional so a half-configured alarm remains
/// representable; the engine refuses to ring such an alarm with a
/// configuration error instead of crashing the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "method")]
pub enum DismissMethod {
    #[serde(rename_all = "camelCase")]
    Steps { required_steps: u32 },
    #[serde(rename_all = "camelCase")]
    Photo {
        reference_photo: Option<String>,
        similarity_threshold: f64,
    },
    #[serde(rename_all = "camelCase")]
    Both {
        required_steps: u32,
        reference_photo: Option<String>,
        similarity_threshold: f64,
    },
}

impl DismissMethod {
    pub fn needs_steps(&self) -> bool {
        matches!(self, DismissMethod::Steps { .. } | DismissMethod::Both { .. })
    }

    pub fn needs_photo(&self) -> bool {
        matches!(self, DismissMethod::Photo { .. } | DismissMethod::Both { .. })
    }

    pub fn required_steps(&self) -> Option<u32> {
        match self {
            DismissMethod::Steps { required_steps }
            | DismissMethod::Both { required_steps, .. } => Some(*required_steps),
            DismissMethod::Photo { .. } => None,
        }
    }

    pub fn reference_photo(&self) -> Option<&str> {
        match self {
            DismissMethod::Photo { reference_photo, .. }
            | DismissMethod::Both { reference_photo, .. } => reference_photo.as_deref(),
            DismissMethod::Steps { .. } => None,
        }
    }

    pub fn similarity_threshold(&self) -> Option<f64> {
        match self {
            DismissMethod::Photo { similarity_threshold, .. }
            | DismissMethod::Both { similarity_threshold, .. } => Some(*similarity_threshold),
            DismissMethod::Steps { .. } => None,
        }
    }
}

/// A persisted alarm definition.
///
/// Hour/minute are local wall-clock; the engine tracks no timezone.
/// `repeat_days` is Sunday-first; all-false means "every day".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub id: String,
    pub title: String,
    pub hour: u8,
    pub minute: u8,
    pub repeat_days: [bool; 7],
    pub is_enabled: bool,
    pub dismiss_method: DismissMethod,
    pub volume: f64,
    pub vibrate: bool,
    /// How many times this alarm may be snoozed per ring.
    pub snooze_limit: u32,
    pub snooze_minutes: u32,
    pub created_at: NaiveDateTime,
    /// Stamped by the engine on trigger; used to de-duplicate triggers
    /// within the same calendar minute.
    pub last_ring_time: Option<NaiveDateTime>,
}

impl Alarm {
    pub fn new(
        title: impl Into<String>,
        hour: u8,
        minute: u8,
        dismiss_method: DismissMethod,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            hour,
            minute,
            repeat_days: [false; 7],
            is_enabled: true,
            dismiss_method,
            volume: 1.0,
            vibrate: true,
            snooze_limit: 3,
            snooze_minutes: 5,
            created_at,
            last_ring_time: None,
        }
    }

    /// Minutes past midnight, for wall-clock ordering.
    pub fn wall_clock_minutes(&self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }
}
