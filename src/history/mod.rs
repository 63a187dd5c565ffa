//! Derived statistics over the history log.

use serde::Serialize;

use crate::models::{DismissType, HistoryEntry};

/// A pure projection of the log; recomputed on demand, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_rings: usize,
    pub dismissed_by_steps: usize,
    pub dismissed_by_photo: usize,
    pub dismissed_by_both: usize,
    /// Entries resolved by snoozing. The re-ring an expired snooze opens is
    /// a separate entry and is not counted here again.
    pub snoozed: usize,
    pub force_stopped: usize,
    /// Mean dismiss-minus-ring latency in seconds over entries that have
    /// both timestamps, 0.0 when none do.
    pub average_dismiss_secs: f64,
}

/// Single pass over the log.
pub fn aggregate(entries: &[HistoryEntry]) -> Statistics {
    let mut stats = Statistics {
        total_rings: entries.len(),
        ..Statistics::default()
    };

    let mut resolved = 0usize;
    let mut latency_ms = 0i64;

    for entry in entries {
        match entry.dismiss_type {
            DismissType::Steps => stats.dismissed_by_steps += 1,
            DismissType::Photo => stats.dismissed_by_photo += 1,
            DismissType::Both => stats.dismissed_by_both += 1,
            DismissType::ForceStop => stats.force_stopped += 1,
            DismissType::Snooze => stats.snoozed += 1,
            DismissType::Unknown => {}
        }
        if let Some(dismissed) = entry.dismiss_time {
            resolved += 1;
            latency_ms += (dismissed - entry.ring_time).num_milliseconds();
        }
    }

    if resolved > 0 {
        stats.average_dismiss_secs = latency_ms as f64 / 1000.0 / resolved as f64;
    }

    stats
}
