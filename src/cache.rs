//! Single-slot expiring cache with refresh coalescing.
//!
//! Every feature owns one [`ExpiringCache`] for the value it mirrors from the
//! TV. The host may poll as often as it likes; the TV is only asked again
//! once the soft TTL has run out, and only by one caller at a time.
//!
//! The in-flight counter is a plain atomic rather than a lock around the
//! refresh. Two refreshes can occasionally overlap (a caller arriving just
//! after the first refresh finished but before its value was stored); both
//! then hit the TV once. The TTL bounds how stale a served value can be.

use crate::error::Result;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

struct Slot<T> {
    value: Option<T>,
    /// `None` is the "already expired" sentinel.
    refreshed_at: Option<Instant>,
}

/// Decrements the in-flight counter exactly once, however the caller exits.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A soft-TTL cache for one logical resource.
pub struct ExpiringCache<T> {
    name: &'static str,
    ttl: Duration,
    slot: Mutex<Slot<T>>,
    in_flight: AtomicUsize,
}

impl<T: Clone> ExpiringCache<T> {
    /// Create an empty, already-expired cache. A zero `ttl` disables caching.
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            slot: Mutex::new(Slot {
                value: None,
                refreshed_at: None,
            }),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Number of callers currently inside [`get_or_refresh`](Self::get_or_refresh).
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// The stored value if it is younger than the TTL. Never does I/O.
    pub fn get_if_fresh(&self) -> Option<T> {
        let slot = self.slot.lock();
        match slot.refreshed_at {
            Some(at) if at.elapsed() < self.ttl => slot.value.clone(),
            _ => None,
        }
    }

    /// The last known value, fresh or not.
    pub fn value(&self) -> Option<T> {
        self.slot.lock().value.clone()
    }

    /// Store `value` and restart the TTL window.
    pub fn update(&self, value: T) {
        let mut slot = self.slot.lock();
        slot.value = Some(value);
        slot.refreshed_at = Some(Instant::now());
    }

    /// Expire the slot immediately while keeping the stored value as fallback.
    pub fn invalidate(&self) {
        self.slot.lock().refreshed_at = None;
    }

    /// Restart the TTL window without touching the stored value.
    pub fn bump_expiration(&self) {
        self.slot.lock().refreshed_at = Some(Instant::now());
    }

    /// Keep serving the last known value for another TTL window after a
    /// failed refresh. An empty slot stores `fallback` instead, so the next
    /// callers are answered from the cache either way.
    pub fn extend_lease(&self, fallback: T) -> T {
        match self.value() {
            Some(value) => {
                self.bump_expiration();
                value
            }
            None => {
                self.update(fallback.clone());
                fallback
            }
        }
    }

    /// Serve a fresh value, or refresh it through `supplier`.
    ///
    /// Only the first caller of a refresh round runs `supplier`. Callers that
    /// arrive while it is in flight do not wait: they get the stored value, or
    /// `fallback` when nothing was ever stored. A supplier error is returned
    /// to the refreshing caller only.
    pub async fn get_or_refresh<F, Fut>(&self, supplier: F, fallback: T) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let position = self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        if let Some(value) = self.get_if_fresh() {
            log::trace!("[Cache] {}: fresh hit", self.name);
            return Ok(value);
        }

        if position > 0 {
            log::debug!(
                "[Cache] {}: refresh already in flight, serving last known value",
                self.name
            );
            return Ok(self.value().unwrap_or(fallback));
        }

        log::trace!("[Cache] {}: refreshing", self.name);
        let value = supplier().await?;
        self.update(value.clone());
        Ok(value)
    }
}
