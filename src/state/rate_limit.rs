//! Per-poll vote cooldowns keyed by voter identity and by network origin.

use std::time::{Duration, Instant};

use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;

/// Cooldown applied to both limiter kinds. Clients rely on this value.
pub const VOTE_COOLDOWN: Duration = Duration::from_secs(60);

/// Which dimension a cooldown entry tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LimiterKind {
    /// Normalized voter identity.
    Identity,
    /// Client network address.
    Origin,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RateKey {
    poll_id: String,
    kind: LimiterKind,
    value: String,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    accepted_at: Option<Instant>,
    in_flight: bool,
}

/// Returned when a vote arrives inside the cooldown window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limited; retry in {retry_after_secs}s")]
pub struct RateLimited {
    /// Whole seconds until both cooldowns have expired.
    pub retry_after_secs: u64,
}

/// Process-scoped cooldown table.
///
/// A vote first reserves both of its keys with [`RateLimiter::check_and_reserve`];
/// the returned [`RateReservation`] must be committed once the vote has been
/// persisted. Dropping it uncommitted releases the keys without starting a
/// cooldown.
pub struct RateLimiter {
    window: Duration,
    slots: DashMap<RateKey, Slot>,
}

impl RateLimiter {
    /// Build a limiter with the given cooldown window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slots: DashMap::new(),
        }
    }

    /// Check both cooldowns for a vote and reserve them on success.
    pub fn check_and_reserve(
        &self,
        poll_id: &str,
        identity: &str,
        origin: &str,
        now: Instant,
    ) -> Result<RateReservation<'_>, RateLimited> {
        let keys = [
            RateKey {
                poll_id: poll_id.to_owned(),
                kind: LimiterKind::Identity,
                value: identity.to_owned(),
            },
            RateKey {
                poll_id: poll_id.to_owned(),
                kind: LimiterKind::Origin,
                value: origin.to_owned(),
            },
        ];

        let mut reserved = Vec::with_capacity(keys.len());
        let mut wait = Duration::ZERO;
        for key in keys {
            match self.try_reserve(&key, now) {
                Ok(()) => reserved.push(key),
                Err(remaining) => wait = wait.max(remaining),
            }
        }

        if !wait.is_zero() {
            for key in &reserved {
                self.release(key);
            }
            return Err(RateLimited {
                retry_after_secs: ceil_secs(wait),
            });
        }

        Ok(RateReservation {
            limiter: self,
            keys: reserved,
            settled: false,
        })
    }

    /// Drop every entry whose cooldown has expired. Returns how many were evicted.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| slot.in_flight || self.cooling_down(slot, now).is_some());
        before.saturating_sub(self.slots.len())
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn cooling_down(&self, slot: &Slot, now: Instant) -> Option<Duration> {
        let accepted_at = slot.accepted_at?;
        let elapsed = now.saturating_duration_since(accepted_at);
        (elapsed < self.window).then(|| self.window - elapsed)
    }

    fn try_reserve(&self, key: &RateKey, now: Instant) -> Result<(), Duration> {
        match self.slots.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                if slot.in_flight {
                    return Err(self.window);
                }
                if let Some(remaining) = self.cooling_down(slot, now) {
                    return Err(remaining);
                }
                slot.in_flight = true;
                Ok(())
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot {
                    accepted_at: None,
                    in_flight: true,
                });
                Ok(())
            }
        }
    }

    fn release(&self, key: &RateKey) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.in_flight = false;
        }
        self.slots
            .remove_if(key, |_, slot| !slot.in_flight && slot.accepted_at.is_none());
    }

    fn commit_key(&self, key: &RateKey, now: Instant) {
        self.slots.insert(
            key.clone(),
            Slot {
                accepted_at: Some(now),
                in_flight: false,
            },
        );
    }
}

/// Keys held for a vote that is still being applied.
pub struct RateReservation<'a> {
    limiter: &'a RateLimiter,
    keys: Vec<RateKey>,
    settled: bool,
}

impl RateReservation<'_> {
    /// Start the cooldown for every reserved key.
    pub fn commit(mut self, now: Instant) {
        for key in &self.keys {
            self.limiter.commit_key(key, now);
        }
        self.settled = true;
    }

    /// Give the keys back without starting a cooldown.
    pub fn release(mut self) {
        self.release_keys();
    }

    fn release_keys(&mut self) {
        if self.settled {
            return;
        }
        for key in &self.keys {
            self.limiter.release(key);
        }
        self.settled = true;
    }
}

impl Drop for RateReservation<'_> {
    fn drop(&mut self) {
        self.release_keys();
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
