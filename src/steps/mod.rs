mod detector;

pub use detector::{
    MotionSample, StepDetector, StepEvent, MIN_STEP_INTERVAL_MS, READING_WINDOW_MS,
    STEP_THRESHOLD,
};
