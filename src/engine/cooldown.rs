use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-class alert cooldown state.
///
/// Owned, injectable state rather than a process-wide map: every `Engine`
/// (and every test) gets its own tracker. The check-and-set in
/// `should_announce` happens in one critical section, so two frames racing
/// on the same class can never both fire inside one window.
pub struct CooldownTracker {
    window: Duration,
    last_announced: Mutex<HashMap<String, Instant>>,
}

impl CooldownTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_announced: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true when `class_name` may be announced at `now`, recording
    /// `now` as the last announcement in the same atomic step. A class that
    /// was never announced is always eligible.
    pub fn should_announce(&self, class_name: &str, now: Instant) -> bool {
        let mut map = self.lock();
        match map.get(class_name) {
            Some(&last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                map.insert(class_name.to_string(), now);
                true
            }
        }
    }

    /// Clear all entries. Calls that start after this returns see every
    /// class as never-announced.
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Number of classes currently tracked, for introspection endpoints.
    pub fn tracked_classes(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        // A panic while holding the lock leaves the map usable; recover it.
        match self.last_announced.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
