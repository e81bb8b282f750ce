//! Movement broadcast throttling.
//!
//! DESIGN
//! ======
//! Leading-edge limiter with one entry per board: the first movement after a
//! quiet period is admitted immediately, then at most one admission per
//! window. Rejected movements are dropped, never queued — the next admitted
//! movement carries the latest position, which is all viewers need.
//!
//! Entries live in a concurrent map keyed by board id, each with its own
//! mutex, so movement on one board never contends with another. Entries are
//! created lazily and kept for the process lifetime; board cardinality is
//! bounded by active editing sessions.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

const DEFAULT_WINDOW_MS: u64 = 100;

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Per-board rate limiter for piece movement broadcasts.
pub struct MoveThrottle {
    window: Duration,
    entries: DashMap<Uuid, Arc<Mutex<Option<Instant>>>>,
}

impl MoveThrottle {
    /// Build with the window from `MOVE_THROTTLE_WINDOW_MS` (default 100ms).
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(Duration::from_millis(env_parse("MOVE_THROTTLE_WINDOW_MS", DEFAULT_WINDOW_MS)))
    }

    #[must_use]
    pub fn with_window(window: Duration) -> Self {
        Self { window, entries: DashMap::new() }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide whether a movement broadcast for `board_id` may go out now.
    /// Admission records the current instant as the window start.
    #[must_use]
    pub fn should_admit(&self, board_id: Uuid) -> bool {
        self.should_admit_at(board_id, Instant::now())
    }

    /// Internal: admission check with explicit timestamp (for testing).
    pub(crate) fn should_admit_at(&self, board_id: Uuid, now: Instant) -> bool {
        let entry = self
            .entries
            .entry(board_id)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .value()
            .clone();

        let mut last_admitted = entry.lock().unwrap_or_else(PoisonError::into_inner);
        match *last_admitted {
            Some(prev) if now.duration_since(prev) < self.window => false,
            _ => {
                *last_admitted = Some(now);
                true
            }
        }
    }
}

impl Default for MoveThrottle {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "throttle_test.rs"]
mod tests;
