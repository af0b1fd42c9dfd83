//! Time and id sources, overridable for deterministic tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};

/// Source of the current time. The service never calls `Utc::now()`
/// directly so tests can drive expiry deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start))
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Source of fresh invocation ids.
pub trait IdSource: Send + Sync {
    fn generate(&self) -> anyhow::Result<String>;
}

/// Random UUIDv4 ids.
pub struct UuidIds;

impl IdSource for UuidIds {
    fn generate(&self) -> anyhow::Result<String> {
        Ok(uuid::Uuid::new_v4().to_string())
    }
}

/// Ids "1", "2", "3", ... for predictable tests.
pub struct SequentialIds(AtomicU64);

impl SequentialIds {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for SequentialIds {
    fn generate(&self) -> anyhow::Result<String> {
        Ok((self.0.fetch_add(1, Ordering::Relaxed) + 1).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances_only_on_demand() {
        let start = Utc.with_ymd_and_hms(2024, 5, 14, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::seconds(30));
        assert_eq!(clock.now(), start + Duration::seconds(30));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn sequential_ids_count_up_from_one() {
        let ids = SequentialIds::new();
        assert_eq!(ids.generate().unwrap(), "1");
        assert_eq!(ids.generate().unwrap(), "2");
        assert_eq!(ids.generate().unwrap(), "3");
    }

    #[test]
    fn uuid_ids_are_unique() {
        let ids = UuidIds;
        let a = ids.generate().unwrap();
        let b = ids.generate().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
