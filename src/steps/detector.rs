//! Peak detection over a stream of tri-axial acceleration samples.

use std::collections::VecDeque;

use crate::error::EngineError;

/// Acceleration magnitude (m/s², gravity included) a sample must reach to
/// count as a footfall. Tuned above handheld jitter, reachable while walking.
pub const STEP_THRESHOLD: f64 = 12.0;

/// Debounce between accepted steps; a single footfall's bounce stays one step.
pub const MIN_STEP_INTERVAL_MS: i64 = 250;

/// Sliding window of readings kept for the peak test.
pub const READING_WINDOW_MS: i64 = 2000;

const MIN_WINDOW_READINGS: usize = 3;

/// One raw motion reading as pushed by the embedder's motion source.
#[derive(Debug, Clone, Copy)]
pub struct MotionSample {
    pub timestamp_ms: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MotionSample {
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Outcome of feeding one sample while counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// A step was accepted; carries the running count.
    Counted(u32),
    /// The accepted step reached the target. Reported exactly once; the
    /// detector deactivates itself and ignores further samples.
    Completed(u32),
}

#[derive(Debug)]
struct Reading {
    timestamp_ms: i64,
    magnitude: f64,
}

/// Counts steps toward a target from raw acceleration vectors.
///
/// A sample is accepted as a step when the debounce interval has elapsed,
/// its magnitude clears [`STEP_THRESHOLD`], and the two most recent window
/// magnitudes form a rising edge, i.e. a peak is building rather than
/// decaying. The rising-edge test rejects the trailing side of a motion
/// spike from counting twice.
pub struct StepDetector {
    motion_available: bool,
    counting: bool,
    target_steps: u32,
    current_steps: u32,
    readings: VecDeque<Reading>,
    last_step_ms: Option<i64>,
}

impl StepDetector {
    pub fn new(motion_available: bool) -> Self {
        Self {
            motion_available,
            counting: false,
            target_steps: 0,
            current_steps: 0,
            readings: VecDeque::new(),
            last_step_ms: None,
        }
    }

    /// Begin counting toward `target`. Fails synchronously when the
    /// embedder declared motion sensing unavailable, so the caller can
    /// surface a fallback immediately.
    pub fn start(&mut self, target: u32) -> Result<(), EngineError> {
        if !self.motion_available {
            return Err(EngineError::SensorUnavailable("motion"));
        }
        if target == 0 {
            return Err(EngineError::Configuration(
                "required step count must be positive".into(),
            ));
        }

        self.target_steps = target;
        self.current_steps = 0;
        self.readings.clear();
        self.last_step_ms = None;
        self.counting = true;
        Ok(())
    }

    pub fn stop(&mut self) {
        self.counting = false;
    }

    pub fn reset(&mut self) {
        self.current_steps = 0;
        self.readings.clear();
        self.last_step_ms = None;
    }

    pub fn is_active(&self) -> bool {
        self.counting
    }

    pub fn current_steps(&self) -> u32 {
        self.current_steps
    }

    pub fn target_steps(&self) -> u32 {
        self.target_steps
    }

    /// Fraction of the target reached, clamped to 1. Callers use this for a
    /// progress ring; completion itself is event-driven, not poll-driven.
    pub fn progress(&self) -> f64 {
        if self.target_steps == 0 {
            return 0.0;
        }
        (f64::from(self.current_steps) / f64::from(self.target_steps)).min(1.0)
    }

    /// Feed one sample. Returns the step event it produced, if any.
    pub fn handle_sample(&mut self, sample: MotionSample) -> Option<StepEvent> {
        if !self.counting {
            return None;
        }

        let magnitude = sample.magnitude();
        self.readings.push_back(Reading {
            timestamp_ms: sample.timestamp_ms,
            magnitude,
        });

        let cutoff = sample.timestamp_ms - READING_WINDOW_MS;
        while self
            .readings
            .front()
            .map_or(false, |reading| reading.timestamp_ms <= cutoff)
        {
            self.readings.pop_front();
        }

        if !self.is_step(magnitude, sample.timestamp_ms) {
            return None;
        }

        self.current_steps += 1;
        self.last_step_ms = Some(sample.timestamp_ms);

        if self.current_steps >= self.target_steps {
            self.counting = false;
            return Some(StepEvent::Completed(self.current_steps));
        }

        Some(StepEvent::Counted(self.current_steps))
    }

    fn is_step(&self, magnitude: f64, now_ms: i64) -> bool {
        if let Some(last) = self.last_step_ms {
            if now_ms - last < MIN_STEP_INTERVAL_MS {
                return false;
            }
        }
        if magnitude < STEP_THRESHOLD {
            return false;
        }
        if self.readings.len() < MIN_WINDOW_READINGS {
            return false;
        }

        // Rising edge on the two most recent readings: a forming peak.
        let current = self.readings[self.readings.len() - 1].magnitude;
        let previous = self.readings[self.readings.len() - 2].magnitude;
        current > previous
    }
}
