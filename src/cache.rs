//! a value that expires.

use {
    crate::source::{Clock, SystemClock},
    std::time::{Duration, Instant},
};

/// holds one value for a fixed duration after it was written.
///
/// a cache has a single writer; wrap it in a lock to share it.
#[derive(Debug)]
pub struct TtlCache<T, C = SystemClock> {
    clock: C,
    ttl: Duration,
    entry: Option<CacheEntry<T>>,
}

#[derive(Debug)]
struct CacheEntry<T> {
    value: T,
    written: Instant,
}

// === impl TtlCache ===

impl<T, C: Clock> TtlCache<T, C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            clock,
            ttl,
            entry: None,
        }
    }

    /// returns the value, if one was written less than one ttl ago.
    pub fn read(&self) -> Option<&T> {
        let now = self.clock.now();
        self.entry
            .as_ref()
            .filter(|e| now.saturating_duration_since(e.written) < self.ttl)
            .map(|e| &e.value)
    }

    /// stores a value and restarts the expiry clock.
    pub fn write(&mut self, value: T) {
        let written = self.clock.now();
        self.entry = Some(CacheEntry { value, written });
    }

    /// returns a copy of the valid value, or stores and returns the result of `fetch`.
    ///
    /// if `fetch` fails nothing is stored, and the next call fetches again.
    pub fn get_or_try_insert_with<E>(&mut self, fetch: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        T: Clone,
    {
        if let Some(value) = self.read() {
            return Ok(value.clone());
        }

        let value = fetch()?;
        self.write(value.clone());
        Ok(value)
    }
}
