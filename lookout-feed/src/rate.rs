//! In-memory throttles: a per-account cooldown and a fixed-window global quota.
//!
//! Both are process-local and best-effort; nothing is persisted and separate
//! processes do not share state. Time comes from an injected [`Clock`].
use crate::clock::Clock;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RateKey(pub String);

impl RateKey {
    /// Per-account key; usernames compare case-insensitively.
    pub fn account(username: &str) -> Self {
        Self(format!("account:{}", username.trim().to_ascii_lowercase()))
    }

    pub fn global() -> Self {
        Self("global".into())
    }
}

fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}

/// Minimum interval between fetches of the same key.
pub struct CooldownTracker {
    window: TimeDelta,
    last_fetch: DashMap<RateKey, DateTime<Utc>>,
    clock: Arc<dyn Clock>,
}

impl CooldownTracker {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window: to_delta(window),
            last_fetch: DashMap::new(),
            clock,
        }
    }

    /// False until `window` has elapsed since the last [`mark_fetched`](Self::mark_fetched).
    pub fn can_fetch(&self, key: &RateKey) -> bool {
        match self.last_fetch.get(key) {
            None => true,
            Some(last) => self.clock.now().signed_duration_since(*last) >= self.window,
        }
    }

    pub fn mark_fetched(&self, key: &RateKey) {
        let now = self.clock.now();
        self.prune(now);
        self.last_fetch.insert(key.clone(), now);
    }

    /// Check and mark in one step under the entry lock. Returns false while
    /// `key` is still cooling down, so overlapping passes cannot both claim it.
    pub fn try_claim(&self, key: &RateKey) -> bool {
        let now = self.clock.now();
        self.prune(now);
        match self.last_fetch.entry(key.clone()) {
            Entry::Occupied(mut e) => {
                if now.signed_duration_since(*e.get()) >= self.window {
                    e.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(e) => {
                e.insert(now);
                true
            }
        }
    }

    /// Time left before `key` may be fetched again.
    pub fn remaining(&self, key: &RateKey) -> Option<Duration> {
        let last = *self.last_fetch.get(key)?;
        let elapsed = self.clock.now().signed_duration_since(last);
        let left = self.window.checked_sub(&elapsed).unwrap_or(self.window);
        left.to_std().ok().filter(|d| !d.is_zero())
    }

    /// Number of keys still inside their window.
    pub fn tracked(&self) -> usize {
        self.last_fetch.len()
    }

    // Keeps the map bounded by the keys fetched within one window.
    fn prune(&self, now: DateTime<Utc>) {
        self.last_fetch
            .retain(|_, last| now.signed_duration_since(*last) < self.window);
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Fixed count ceiling per fixed window, e.g. 900 calls per 15 minutes.
pub struct GlobalQuota {
    max_calls: u32,
    window: TimeDelta,
    windows: DashMap<RateKey, Window>,
    clock: Arc<dyn Clock>,
}

impl GlobalQuota {
    pub fn new(max_calls: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_calls,
            window: to_delta(window),
            windows: DashMap::new(),
            clock,
        }
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }

    fn fresh(&self, now: DateTime<Utc>) -> Window {
        Window {
            count: 0,
            reset_at: now.checked_add_signed(self.window).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    fn current(&self, key: &RateKey, now: DateTime<Utc>) -> Window {
        match self.windows.get(key) {
            Some(w) if now < w.reset_at => *w,
            _ => self.fresh(now),
        }
    }

    pub fn can_fetch(&self, key: &RateKey) -> bool {
        self.current(key, self.clock.now()).count < self.max_calls
    }

    /// Count one call against `key`, opening a new window if the old one expired.
    pub fn mark_fetched(&self, key: &RateKey) {
        let now = self.clock.now();
        let mut w = self.current(key, now);
        w.count = w.count.saturating_add(1);
        self.windows.insert(key.clone(), w);
    }

    /// Check and count in one step under the entry lock.
    pub fn try_acquire(&self, key: &RateKey) -> bool {
        let now = self.clock.now();
        let mut entry = self.windows.entry(key.clone()).or_insert_with(|| self.fresh(now));
        if now >= entry.reset_at {
            *entry = self.fresh(now);
        }
        if entry.count < self.max_calls {
            entry.count += 1;
            true
        } else {
            false
        }
    }

    /// Calls left in the current window.
    pub fn remaining(&self, key: &RateKey) -> u32 {
        let w = self.current(key, self.clock.now());
        self.max_calls.saturating_sub(w.count)
    }
}
