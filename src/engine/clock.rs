use chrono::{Local, NaiveDateTime};

/// Wall-clock source, injected rather than read globally so scheduling is
/// testable against a simulated clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The machine's local wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}
