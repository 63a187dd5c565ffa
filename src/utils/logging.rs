//! Logging macros gated on a module-level `ENABLE_LOGS` const.
//!
//! Each module that logs declares `const ENABLE_LOGS: bool = ...;` and
//! imports the macros from the crate root, so chatty modules can be muted
//! without touching the global filter.

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
