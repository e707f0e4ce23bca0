use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);
static INIT: Once = Once::new();

/// Initialize debug mode from the `GDA_DEBUG` environment variable.
/// Only the first call reads the environment.
pub fn init() {
    INIT.call_once(|| {
        if std::env::var("GDA_DEBUG")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
        {
            DEBUG_ENABLED.store(true, Ordering::SeqCst);
            eprintln!("[gdacursor] Debug mode enabled via GDA_DEBUG");
        }
    });
}

/// Set debug mode at runtime.
pub fn set_debug(enabled: bool) {
    DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    if enabled {
        eprintln!("[gdacursor] Debug mode enabled");
    }
}

/// Check if debug mode is active.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::SeqCst)
}

/// Log a debug message to stderr if debug mode is enabled.
macro_rules! debug_log {
    ($($arg:tt)*) => {
        if $crate::debug::is_debug() {
            eprintln!("[gdacursor] {}", format!($($arg)*));
        }
    };
}

pub(crate) use debug_log;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_at_runtime() {
        set_debug(true);
        assert!(is_debug());
        debug_log!("visible while enabled: {}", 1);
        set_debug(false);
        assert!(!is_debug());
    }
}
