use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::NaiveDateTime;
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    Mutex,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::EngineError,
    history::{self, Statistics},
    models::{Alarm, DismissMethod, DismissType, HistoryEntry},
    scheduler,
    steps::{MotionSample, StepDetector, StepEvent},
    verify::{ImageCodec, PhotoVerifier, VerificationResult},
};

use super::{
    clock::Clock,
    events::{AlarmDiff, EngineEvent},
    session::RingingSession,
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Everything the engine mutates, behind one lock. Callers observe changes
/// through the event channel, not by reaching into shared state.
struct EngineState {
    alarms: Vec<Alarm>,
    history: Vec<HistoryEntry>,
    session: Option<RingingSession>,
    detector: StepDetector,
    verifier: PhotoVerifier,
    pending_snoozes: HashMap<String, CancellationToken>,
}

/// The dismissal state machine plus the alarm list it schedules.
///
/// Single logical actor: every operation serializes through the state lock,
/// so the steps and photo channels of a `Both` session can proceed
/// concurrently without further locking. `tick` is expected once per
/// second; motion samples arrive at sensor frequency; photo verification
/// runs as a bounded blocking task off the caller's thread.
#[derive(Clone)]
pub struct AlarmEngine {
    state: Arc<Mutex<EngineState>>,
    clock: Arc<dyn Clock>,
    events: UnboundedSender<EngineEvent>,
}

impl AlarmEngine {
    /// `motion_available` is the embedder's capability declaration; without
    /// it the steps channel degrades to "cannot verify" instead of ringing
    /// failures.
    pub fn new(
        clock: Arc<dyn Clock>,
        codec: Arc<dyn ImageCodec>,
        motion_available: bool,
    ) -> (Self, UnboundedReceiver<EngineEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let engine = Self {
            state: Arc::new(Mutex::new(EngineState {
                alarms: Vec::new(),
                history: Vec::new(),
                session: None,
                detector: StepDetector::new(motion_available),
                verifier: PhotoVerifier::new(codec),
                pending_snoozes: HashMap::new(),
            })),
            clock,
            events,
        };
        (engine, receiver)
    }

    /// Startup load from persistence; emits no diffs.
    pub async fn load(&self, alarms: Vec<Alarm>, history: Vec<HistoryEntry>) {
        let mut state = self.state.lock().await;
        state.alarms = alarms;
        state.history = history;
    }

    pub async fn alarms(&self) -> Vec<Alarm> {
        self.state.lock().await.alarms.clone()
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.state.lock().await.history.clone()
    }

    pub async fn session(&self) -> Option<RingingSession> {
        self.state.lock().await.session.clone()
    }

    pub async fn statistics(&self) -> Statistics {
        history::aggregate(&self.state.lock().await.history)
    }

    pub async fn next_alarm(&self) -> Option<Alarm> {
        let state = self.state.lock().await;
        scheduler::next_alarm(self.clock.now(), &state.alarms).cloned()
    }

    pub async fn add_alarm(&self, alarm: Alarm) {
        let mut state = self.state.lock().await;
        state.alarms.push(alarm.clone());
        // Keep the list in wall-clock order, the way the alarm list is shown.
        state.alarms.sort_by_key(Alarm::wall_clock_minutes);
        emit(&self.events, EngineEvent::AlarmChanged(AlarmDiff::Added { alarm }));
    }

    pub async fn update_alarm(&self, alarm: Alarm) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        let slot = state
            .alarms
            .iter_mut()
            .find(|existing| existing.id == alarm.id)
            .ok_or_else(|| EngineError::Configuration(format!("unknown alarm {}", alarm.id)))?;
        *slot = alarm.clone();
        emit(&self.events, EngineEvent::AlarmChanged(AlarmDiff::Updated { alarm }));
        Ok(())
    }

    pub async fn toggle_alarm(&self, alarm_id: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        let alarm = state
            .alarms
            .iter_mut()
            .find(|alarm| alarm.id == alarm_id)
            .ok_or_else(|| EngineError::Configuration(format!("unknown alarm {alarm_id}")))?;
        alarm.is_enabled = !alarm.is_enabled;
        let updated = alarm.clone();
        emit(
            &self.events,
            EngineEvent::AlarmChanged(AlarmDiff::Updated { alarm: updated }),
        );
        Ok(())
    }

    /// Removes the alarm, cancelling its pending snooze timer and tearing
    /// down its ringing session if it owns the active one.
    pub async fn delete_alarm(&self, alarm_id: &str) {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        if let Some(token) = state.pending_snoozes.remove(alarm_id) {
            token.cancel();
            log_info!("cancelled pending snooze for deleted alarm {alarm_id}");
        }

        let owns_session = state
            .session
            .as_ref()
            .map_or(false, |session| session.alarm.id == alarm_id);
        if owns_session {
            if let Some(entry) = close_session(&mut state, now, DismissType::ForceStop) {
                emit(&self.events, EngineEvent::HistoryRecorded { entry: entry.clone() });
                emit(&self.events, EngineEvent::RingStopped { alarm_id: entry.alarm_id });
            }
        }

        state.alarms.retain(|alarm| alarm.id != alarm_id);
        emit(
            &self.events,
            EngineEvent::AlarmChanged(AlarmDiff::Removed {
                alarm_id: alarm_id.to_string(),
            }),
        );
    }

    /// One scheduler tick. Non-blocking: due alarms are stamped and handed
    /// to the state machine; verification work happens on later calls.
    /// Returns the ids that actually started ringing.
    pub async fn tick(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let due = scheduler::due_alarms(now, &state.alarms);
        let mut triggered = Vec::new();

        for alarm_id in due {
            // Stamp first so a failed ring is not retried every second for
            // the rest of the minute. The diff tells the embedder to persist.
            if let Some(alarm) = state.alarms.iter_mut().find(|alarm| alarm.id == alarm_id) {
                alarm.last_ring_time = Some(now);
                let updated = alarm.clone();
                emit(
                    &self.events,
                    EngineEvent::AlarmChanged(AlarmDiff::Updated { alarm: updated }),
                );
            }

            match begin_ring(&mut state, &self.events, &alarm_id, now, 0) {
                Ok(()) => triggered.push(alarm_id),
                Err(err) => log_warn!("alarm {alarm_id} did not ring: {err}"),
            }
        }

        triggered
    }

    /// Enter Ringing for one alarm. Rejects a second concurrent session and
    /// refuses photo-method alarms that carry no reference.
    pub async fn start_ringing(&self, alarm_id: &str) -> Result<(), EngineError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        begin_ring(&mut state, &self.events, alarm_id, now, 0)
    }

    /// Feed one motion sample while a session's steps channel is armed.
    pub async fn handle_motion(&self, sample: MotionSample) {
        let mut state = self.state.lock().await;
        if state.session.is_none() {
            return;
        }

        let Some(event) = state.detector.handle_sample(sample) else {
            return;
        };

        let target = state.detector.target_steps();
        let (current, completed) = match event {
            StepEvent::Counted(count) => (count, false),
            StepEvent::Completed(count) => (count, true),
        };

        if let Some(session) = state.session.as_mut() {
            session.current_steps = current;
            if completed {
                session.steps_completed = true;
            }
        }
        let progress = state
            .session
            .as_ref()
            .map_or(0.0, RingingSession::step_progress);

        emit(
            &self.events,
            EngineEvent::StepProgress {
                current_steps: current,
                target_steps: target,
                progress,
            },
        );

        if completed {
            self.resolve_if_complete(&mut state);
        }
    }

    /// Run one photo attempt against the active session. Decode and
    /// comparison run on a blocking worker; any verifier error is reported
    /// as a rejected attempt and the session stays in Ringing.
    pub async fn submit_photo(&self, handle: &str) -> Result<VerificationResult, EngineError> {
        let (verifier, threshold) = {
            let state = self.state.lock().await;
            let session = state
                .session
                .as_ref()
                .ok_or_else(|| EngineError::StateConflict("no ringing session".into()))?;
            let threshold = session
                .alarm
                .dismiss_method
                .similarity_threshold()
                .ok_or_else(|| {
                    EngineError::Configuration("alarm does not use photo dismissal".into())
                })?;
            (state.verifier.clone(), threshold)
        };

        let captured = handle.to_string();
        let outcome =
            tokio::task::spawn_blocking(move || verifier.verify(&captured, threshold)).await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                log_warn!("photo verification failed: {err}");
                emit(
                    &self.events,
                    EngineEvent::PhotoRejected {
                        similarity: 0.0,
                        reason: Some(err.to_string()),
                    },
                );
                return Ok(VerificationResult {
                    is_similar: false,
                    similarity: 0.0,
                });
            }
            Err(join_err) => {
                log_warn!("photo verification worker failed: {join_err}");
                emit(
                    &self.events,
                    EngineEvent::PhotoRejected {
                        similarity: 0.0,
                        reason: Some(join_err.to_string()),
                    },
                );
                return Ok(VerificationResult {
                    is_similar: false,
                    similarity: 0.0,
                });
            }
        };

        let mut state = self.state.lock().await;
        if let Some(session) = state.session.as_mut() {
            session.photo_similarity = Some(result.similarity);
            session.photo_path = Some(handle.to_string());
            if result.is_similar {
                session.photo_completed = true;
            }
        }

        if result.is_similar {
            emit(
                &self.events,
                EngineEvent::PhotoAccepted {
                    similarity: result.similarity,
                },
            );
            self.resolve_if_complete(&mut state);
        } else {
            emit(
                &self.events,
                EngineEvent::PhotoRejected {
                    similarity: result.similarity,
                    reason: None,
                },
            );
        }

        Ok(result)
    }

    /// Snooze the active session: resolves its history entry, stops all
    /// verification, and arms a cancellable timer that re-enters Ringing
    /// after the alarm's snooze duration.
    pub async fn snooze(&self) -> Result<(), EngineError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let (alarm_id, snooze_minutes, next_count) = {
            let session = state
                .session
                .as_ref()
                .ok_or_else(|| EngineError::StateConflict("no ringing session".into()))?;
            if session.snooze_count >= session.alarm.snooze_limit {
                return Err(EngineError::SnoozeExhausted);
            }
            (
                session.alarm.id.clone(),
                session.alarm.snooze_minutes,
                session.snooze_count + 1,
            )
        };

        if let Some(entry) = close_session(&mut state, now, DismissType::Snooze) {
            emit(&self.events, EngineEvent::HistoryRecorded { entry: entry.clone() });
            emit(&self.events, EngineEvent::RingStopped { alarm_id: entry.alarm_id });
        }

        let resume_at = now + chrono::Duration::minutes(i64::from(snooze_minutes));
        emit(
            &self.events,
            EngineEvent::Snoozed {
                alarm_id: alarm_id.clone(),
                resume_at,
                snooze_count: next_count,
            },
        );

        // The token outlives this call so deletion or force-stop can cancel
        // the resume before it fires.
        let token = CancellationToken::new();
        state.pending_snoozes.insert(alarm_id.clone(), token.clone());
        drop(state);

        let engine = self.clone();
        // Anchor the deadline here, not at the spawned task's first poll.
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(u64::from(snooze_minutes) * 60);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    log_info!("snooze resume for alarm {alarm_id} cancelled");
                }
                _ = tokio::time::sleep_until(deadline) => {
                    engine.resume_after_snooze(&alarm_id, next_count).await;
                }
            }
        });

        Ok(())
    }

    /// Abandon the active session without proof of wakefulness.
    pub async fn force_stop(&self) -> Result<(), EngineError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if state.session.is_none() {
            return Err(EngineError::StateConflict("no ringing session".into()));
        }

        if let Some(entry) = close_session(&mut state, now, DismissType::ForceStop) {
            emit(&self.events, EngineEvent::HistoryRecorded { entry: entry.clone() });
            emit(&self.events, EngineEvent::RingStopped { alarm_id: entry.alarm_id });
        }
        Ok(())
    }

    async fn resume_after_snooze(&self, alarm_id: &str, snooze_count: u32) {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.pending_snoozes.remove(alarm_id);

        match begin_ring(&mut state, &self.events, alarm_id, now, snooze_count) {
            Ok(()) => log_info!("alarm {alarm_id} resumed from snooze"),
            Err(err) => log_warn!("snoozed alarm {alarm_id} did not resume: {err}"),
        }
    }

    /// Resolve the session once every required channel has completed.
    fn resolve_if_complete(&self, state: &mut EngineState) {
        let complete = state
            .session
            .as_ref()
            .map_or(false, RingingSession::is_complete);
        if !complete {
            return;
        }

        let now = self.clock.now();
        let Some(session) = state.session.take() else {
            return;
        };
        state.detector.stop();
        state.verifier.reset();

        let dismiss_type = match session.alarm.dismiss_method {
            DismissMethod::Steps { .. } => DismissType::Steps,
            DismissMethod::Photo { .. } => DismissType::Photo,
            DismissMethod::Both { .. } => DismissType::Both,
        };

        let steps_taken = session
            .alarm
            .dismiss_method
            .needs_steps()
            .then_some(session.current_steps);

        let resolved = resolve_entry(&mut state.history, &session.entry_id, |entry| {
            entry.dismiss_time = Some(now);
            entry.dismiss_type = dismiss_type;
            entry.steps_taken = steps_taken;
            entry.photo_similarity = session.photo_similarity;
            entry.photo_path = session.photo_path.clone();
        });

        if let Some(entry) = resolved {
            log_info!(
                "alarm {} dismissed via {}",
                entry.alarm_id,
                entry.dismiss_type.as_str()
            );
            emit(&self.events, EngineEvent::HistoryRecorded { entry: entry.clone() });
            emit(
                &self.events,
                EngineEvent::RingStopped {
                    alarm_id: entry.alarm_id.clone(),
                },
            );
            emit(&self.events, EngineEvent::Dismissed { entry });
        }
    }
}

/// Enter Ringing: validate configuration, open the unresolved history
/// entry, arm the verification channels, announce the ring.
fn begin_ring(
    state: &mut EngineState,
    events: &UnboundedSender<EngineEvent>,
    alarm_id: &str,
    now: NaiveDateTime,
    snooze_count: u32,
) -> Result<(), EngineError> {
    if let Some(active) = &state.session {
        return Err(EngineError::StateConflict(format!(
            "alarm {} is already ringing",
            active.alarm.id
        )));
    }

    let alarm = state
        .alarms
        .iter()
        .find(|alarm| alarm.id == alarm_id)
        .cloned()
        .ok_or_else(|| EngineError::Configuration(format!("unknown alarm {alarm_id}")))?;

    if alarm.dismiss_method.needs_photo() && alarm.dismiss_method.reference_photo().is_none() {
        return Err(EngineError::Configuration(format!(
            "alarm {} requires a photo but has no reference",
            alarm.id
        )));
    }

    if let Some(target) = alarm.dismiss_method.required_steps() {
        match state.detector.start(target) {
            Ok(()) => {}
            Err(EngineError::SensorUnavailable(capability)) => {
                // Ring anyway; the steps channel just cannot complete.
                log_warn!("{capability} unavailable, alarm {} rings unverifiable", alarm.id);
                emit(
                    events,
                    EngineEvent::SensorUnavailable {
                        capability: capability.to_string(),
                    },
                );
            }
            Err(err) => return Err(err),
        }
    }

    if let Some(reference) = alarm.dismiss_method.reference_photo() {
        state.verifier.set_reference(reference);
    }

    let entry = HistoryEntry::ring(&alarm, now, snooze_count);
    emit(events, EngineEvent::HistoryRecorded { entry: entry.clone() });

    let session = RingingSession::new(alarm.clone(), entry.id.clone(), now, snooze_count);
    state.history.push(entry);
    state.session = Some(session);

    log_info!("alarm {} ({}) started ringing", alarm.id, alarm.title);
    emit(
        events,
        EngineEvent::RingStarted {
            alarm_id: alarm.id,
            alarm_title: alarm.title,
            volume: alarm.volume,
            vibrate: alarm.vibrate,
        },
    );

    Ok(())
}

/// Tear down the session for snooze/force-stop paths, resolving its entry
/// with whatever partial progress the channels made.
fn close_session(
    state: &mut EngineState,
    now: NaiveDateTime,
    dismiss_type: DismissType,
) -> Option<HistoryEntry> {
    let session = state.session.take()?;
    state.detector.stop();
    state.verifier.reset();

    let steps_taken = session
        .alarm
        .dismiss_method
        .needs_steps()
        .then_some(session.current_steps);
    let snoozed_now = dismiss_type == DismissType::Snooze;

    resolve_entry(&mut state.history, &session.entry_id, |entry| {
        entry.dismiss_time = Some(now);
        entry.dismiss_type = dismiss_type;
        entry.steps_taken = steps_taken;
        entry.photo_similarity = session.photo_similarity;
        entry.photo_path = session.photo_path.clone();
        if snoozed_now {
            entry.was_snoozed = true;
            entry.snooze_count = session.snooze_count + 1;
        }
    })
}

fn resolve_entry(
    history: &mut [HistoryEntry],
    entry_id: &str,
    fill: impl FnOnce(&mut HistoryEntry),
) -> Option<HistoryEntry> {
    let entry = history.iter_mut().find(|entry| entry.id == entry_id)?;
    fill(entry);
    Some(entry.clone())
}

fn emit(events: &UnboundedSender<EngineEvent>, event: EngineEvent) {
    // A dropped receiver means nobody is listening; nothing useful to do.
    let _ = events.send(event);
}
