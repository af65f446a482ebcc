use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Time source abstraction so TTL behavior can be tested deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock implementation used everywhere outside tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock advanced by hand.
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock poisoned");
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().expect("clock poisoned")
    }
}

struct Entry<T> {
    value: Arc<T>,
    stored_at: Instant,
}

/// A single-value TTL cache slot with atomic replace-on-refresh semantics.
///
/// Readers observe either the fully-old or the fully-new value, never a
/// partial update; replacement is one write-lock assignment. Expiry is
/// lazy: `get` returns `None` once the TTL has elapsed and the caller is
/// expected to fetch and `put` a fresh value. Two callers racing past an
/// expired TTL may both fetch; the second `put` wins.
pub struct TtlCell<T> {
    slot: RwLock<Option<Entry<T>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<T> TtlCell<T> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
            clock,
        }
    }

    /// Returns the cached value unless it is absent or expired.
    pub fn get(&self) -> Option<Arc<T>> {
        let slot = self.slot.read().expect("cache slot poisoned");
        let entry = slot.as_ref()?;
        if self.clock.now().duration_since(entry.stored_at) < self.ttl {
            Some(Arc::clone(&entry.value))
        } else {
            None
        }
    }

    /// Returns the cached value even if expired. Used by callers that want
    /// to inspect staleness themselves.
    pub fn peek(&self) -> Option<Arc<T>> {
        let slot = self.slot.read().expect("cache slot poisoned");
        slot.as_ref().map(|e| Arc::clone(&e.value))
    }

    /// Replaces the cached value, resetting its age.
    pub fn put(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let mut slot = self.slot.write().expect("cache slot poisoned");
        *slot = Some(Entry {
            value: Arc::clone(&value),
            stored_at: self.clock.now(),
        });
        value
    }

    /// Drops the cached value; the next `get` misses.
    pub fn clear(&self) {
        let mut slot = self.slot.write().expect("cache slot poisoned");
        *slot = None;
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cell_misses() {
        let cell: TtlCell<u32> = TtlCell::new(Duration::from_secs(60));
        assert!(cell.get().is_none());
    }

    #[test]
    fn hit_before_ttl_miss_after() {
        let clock = Arc::new(ManualClock::new());
        let cell = TtlCell::with_clock(Duration::from_secs(60), clock.clone());

        cell.put(7u32);
        assert_eq!(*cell.get().unwrap(), 7);

        clock.advance(Duration::from_secs(59));
        assert_eq!(*cell.get().unwrap(), 7);

        clock.advance(Duration::from_secs(1));
        assert!(cell.get().is_none(), "value must expire exactly at the TTL");
    }

    #[test]
    fn put_resets_age() {
        let clock = Arc::new(ManualClock::new());
        let cell = TtlCell::with_clock(Duration::from_secs(10), clock.clone());

        cell.put(1u32);
        clock.advance(Duration::from_secs(9));
        cell.put(2u32);
        clock.advance(Duration::from_secs(9));

        assert_eq!(*cell.get().unwrap(), 2);
    }

    #[test]
    fn peek_ignores_expiry() {
        let clock = Arc::new(ManualClock::new());
        let cell = TtlCell::with_clock(Duration::from_secs(1), clock.clone());

        cell.put("stale".to_string());
        clock.advance(Duration::from_secs(5));

        assert!(cell.get().is_none());
        assert_eq!(*cell.peek().unwrap(), "stale");
    }

    #[test]
    fn clear_empties_the_slot() {
        let cell = TtlCell::new(Duration::from_secs(60));
        cell.put(1u32);
        cell.clear();
        assert!(cell.get().is_none());
        assert!(cell.peek().is_none());
    }
}
