use thiserror::Error;

/// Failure taxonomy for the dismissal engine.
///
/// Everything except `Configuration` is recoverable from the caller's point
/// of view: a rejected photo can be retried, a missing sensor degrades to
/// "cannot verify", and a session conflict leaves the original session
/// untouched.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The alarm cannot ring as configured. Fatal to this trigger only; the
    /// scheduler keeps evaluating other alarms and future ticks.
    #[error("alarm configuration invalid: {0}")]
    Configuration(String),

    /// A required device capability (motion, camera) is missing.
    #[error("{0} capability unavailable")]
    SensorUnavailable(&'static str),

    /// An image handle could not be decoded. Treated as a failed
    /// verification attempt, never as a crash of the ringing flow.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// At most one ringing session exists system-wide.
    #[error("ringing session conflict: {0}")]
    StateConflict(String),

    /// The alarm's snooze allowance is spent.
    #[error("snooze allowance exhausted")]
    SnoozeExhausted,
}
