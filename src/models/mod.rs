mod alarm;
mod history;

pub use alarm::{Alarm, DismissMethod};
pub use history::{DismissType, HistoryEntry};
