mod clock;
mod controller;
mod events;
mod session;

pub use clock::{Clock, SystemClock};
pub use controller::AlarmEngine;
pub use events::{AlarmDiff, EngineEvent};
pub use session::RingingSession;
