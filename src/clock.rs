// =============================================================================
// Clock — injectable source of wall-clock time and the UTC calendar day
// =============================================================================
//
// All time-dependent components take an `Arc<dyn Clock>` at construction.
// Production wires `SystemClock`; tests wire `ManualClock` and advance it
// explicitly so cooldown and daily-cap boundaries are exact.
// =============================================================================

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Source of "now" for the engine.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// UTC calendar day key, `YYYY-MM-DD`.
    fn today_key(&self) -> String {
        day_key(self.now_ms())
    }
}

/// Format an epoch-millisecond timestamp as a UTC `YYYY-MM-DD` day key.
pub fn day_key(ts_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ts_ms)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "1970-01-01".to_string())
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Virtual clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_key_formats_utc_dates() {
        // 2024-03-01T00:00:00Z
        assert_eq!(day_key(1_709_251_200_000), "2024-03-01");
        // One millisecond before midnight stays on the previous day.
        assert_eq!(day_key(1_709_251_199_999), "2024-02-29");
        assert_eq!(day_key(0), "1970-01-01");
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(10_000);
        assert_eq!(clock.now_ms(), 10_000);
    }

    #[test]
    fn manual_clock_day_key_tracks_set_time() {
        let clock = ManualClock::new(1_709_251_200_000);
        assert_eq!(clock.today_key(), "2024-03-01");
        clock.advance(24 * 60 * 60 * 1000);
        assert_eq!(clock.today_key(), "2024-03-02");
    }
}
