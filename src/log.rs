//! Runtime switch for library logging.
//!
//! The in-process accessor runs inside the inspected program, where writing
//! to the program's stderr is not acceptable, so library log output can be
//! turned off independently of the logger configuration.

use std::sync::atomic::{AtomicBool, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(true);

#[inline(always)]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::SeqCst)
}

pub fn disable() {
    ENABLED.store(false, Ordering::SeqCst)
}

pub fn enable() {
    ENABLED.store(true, Ordering::SeqCst)
}

#[macro_export]
macro_rules! dm_warn {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::log::is_enabled() {
            log::warn!(target: $target, $($arg)+)
        }
    };
    ($($arg:tt)+) => {
        if $crate::log::is_enabled() {
            log::warn!(target: "dumper", $($arg)+)
        }
    };
}

#[macro_export]
macro_rules! dm_debug {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::log::is_enabled() {
            log::debug!(target: $target, $($arg)+)
        }
    };
    ($($arg:tt)+) => {
        if $crate::log::is_enabled() {
            log::debug!(target: "dumper", $($arg)+)
        }
    };
}

#[cfg(test)]
mod test {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_switch() {
        assert!(is_enabled());
        disable();
        assert!(!is_enabled());
        dm_warn!("must not panic while disabled: {}", 1);
        enable();
        assert!(is_enabled());
    }
}
