//! Utilities shared across the crate.
//!
//! The one-time-warning registry mirrors the usual "log once per process"
//! pattern: capacity forecasts are recomputed on every write, but their
//! log output would otherwise flood the log at every insertion.
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Mutex;

static FIRED: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Returns `true` the first time it is called with `key` in this process,
/// `false` on every subsequent call.
///
/// ```
/// use replay_storage::util::{log_once, reset_log_once};
///
/// reset_log_once();
/// assert!(log_once("my_warning"));
/// assert!(!log_once("my_warning"));
/// ```
pub fn log_once(key: &str) -> bool {
    FIRED
        .lock()
        .expect("log-once registry lock poisoned")
        .insert(key.to_string())
}

/// Clears the set of already-fired keys.
///
/// Intended for tests that assert on one-time log behavior.
pub fn reset_log_once() {
    FIRED
        .lock()
        .expect("log-once registry lock poisoned")
        .clear()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_key() {
        reset_log_once();
        assert!(log_once("k1"));
        assert!(!log_once("k1"));
        assert!(log_once("k2"));
        reset_log_once();
        assert!(log_once("k1"));
    }
}
