//! Fixed-window rate limiter with a blocking cooldown.
//!
//! Each key gets `max_attempts` attempts per window. The attempt that goes over
//! the limit blocks the key for `block_duration_ms`, and while blocked every
//! check is rejected without touching the record. The first check at or after
//! the block expires starts a fresh window and counts as its first attempt.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::config::RateLimiterConfig;
use crate::metrics::{BLOCKS_TOTAL, CHECKS_TOTAL, EVICTIONS_TOTAL, REJECTIONS_TOTAL, TRACKED_KEYS};

// Rate limit entry - tracks attempts per IP/key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: u64,
    pub blocked_until: Option<u64>,
}

impl RateLimitEntry {
    fn fresh(now: u64) -> Self {
        Self {
            count: 0,
            window_start: now,
            blocked_until: None,
        }
    }

    fn is_blocked_at(&self, now: u64) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }

    fn window_expired_at(&self, now: u64, window_ms: u64) -> bool {
        now >= self.window_start.saturating_add(window_ms)
    }

    fn restart_window(&mut self, now: u64) {
        self.count = 1;
        self.window_start = now;
        self.blocked_until = None;
    }
}

/// Snapshot of a key's standing, for advisory messages such as
/// "3 attempts remaining" or a `Retry-After` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub key: String,
    pub blocked: bool,
    pub remaining_attempts: u32,
    pub retry_after_ms: u64,
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    entries: DashMap<String, RateLimitEntry>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Records an attempt for `key` and reports whether it must be rejected.
    ///
    /// The whole read-decide-write sequence runs under the map's entry lock for
    /// `key`, so concurrent callers on one key never both slip past the limit.
    pub fn is_rate_limited(&self, key: &str) -> bool {
        CHECKS_TOTAL.inc();
        let now = self.clock.now_ms();

        let mut created = false;
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| {
            created = true;
            RateLimitEntry::fresh(now)
        });
        if created {
            TRACKED_KEYS.inc();
            tracing::debug!("New rate limit record: key={key}");
        }

        // block check comes before the window check
        if let Some(until) = entry.blocked_until {
            if now >= until {
                entry.restart_window(now);
                tracing::info!("Block expired: key={key}");
                return false;
            }
            REJECTIONS_TOTAL.inc();
            return true;
        }

        if entry.window_expired_at(now, self.config.window_ms) {
            entry.restart_window(now);
            tracing::debug!("Window reset: key={key}");
            return false;
        }

        entry.count = entry.count.saturating_add(1);
        if entry.count > self.config.max_attempts {
            let until = now.saturating_add(self.config.block_duration_ms);
            entry.blocked_until = Some(until);
            BLOCKS_TOTAL.inc();
            REJECTIONS_TOTAL.inc();
            tracing::warn!(
                "Key blocked: key={key}, attempts={}, blocked_for_ms={}",
                entry.count,
                self.config.block_duration_ms
            );
            return true;
        }

        false
    }

    // Copy of the record, or a throwaway fresh one. Never inserts.
    fn snapshot(&self, key: &str, now: u64) -> RateLimitEntry {
        self.entries
            .get(key)
            .map(|entry| *entry)
            .unwrap_or_else(|| RateLimitEntry::fresh(now))
    }

    fn remaining_at(&self, entry: &RateLimitEntry, now: u64) -> u32 {
        if entry.is_blocked_at(now) {
            0
        } else if entry.window_expired_at(now, self.config.window_ms) {
            self.config.max_attempts
        } else {
            self.config.max_attempts.saturating_sub(entry.count)
        }
    }

    fn block_left_at(entry: &RateLimitEntry, now: u64) -> u64 {
        match entry.blocked_until {
            Some(until) if now < until => until - now,
            _ => 0,
        }
    }

    pub fn remaining_attempts(&self, key: &str) -> u32 {
        let now = self.clock.now_ms();
        let entry = self.snapshot(key, now);
        self.remaining_at(&entry, now)
    }

    /// Milliseconds until `key` is unblocked, 0 if it is not blocked.
    pub fn block_duration_ms(&self, key: &str) -> u64 {
        let now = self.clock.now_ms();
        Self::block_left_at(&self.snapshot(key, now), now)
    }

    // Block duration rounded up to whole seconds, for Retry-After
    pub fn retry_after_secs(&self, key: &str) -> u64 {
        self.block_duration_ms(key).div_ceil(1000)
    }

    pub fn status(&self, key: &str) -> RateLimitStatus {
        let now = self.clock.now_ms();
        let entry = self.snapshot(key, now);
        RateLimitStatus {
            key: key.to_string(),
            blocked: entry.is_blocked_at(now),
            remaining_attempts: self.remaining_at(&entry, now),
            retry_after_ms: Self::block_left_at(&entry, now),
        }
    }

    /// Forgets everything about `key`, e.g. after a successful login.
    pub fn reset(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            TRACKED_KEYS.dec();
            tracing::debug!("Rate limit record reset: key={key}");
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    /// Drops records with no active block and an expired window.
    ///
    /// Such a record answers every query exactly like a fresh one, so eviction
    /// is invisible to callers. With `max_attempts == 0` that stops being true
    /// and nothing is evicted.
    pub fn sweep_idle(&self) -> usize {
        if self.config.max_attempts == 0 {
            return 0;
        }

        let now = self.clock.now_ms();
        let window_ms = self.config.window_ms;
        // counted per removal, the map may change under concurrent checks and resets
        let mut evicted = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.is_blocked_at(now) || !entry.window_expired_at(now, window_ms);
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            EVICTIONS_TOTAL.inc_by(evicted as f64);
            TRACKED_KEYS.sub(evicted as f64);
            tracing::info!(
                "Swept {evicted} idle rate limit records, {} remain",
                self.entries.len()
            );
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const T0: u64 = 1_700_000_000_000;
    const MINUTE: u64 = 60 * 1000;

    fn limiter() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let limiter = RateLimiter::with_clock(RateLimiterConfig::default(), clock.clone());
        (limiter, clock)
    }

    fn exhaust(limiter: &RateLimiter, key: &str) {
        for _ in 0..limiter.config().max_attempts {
            assert!(!limiter.is_rate_limited(key));
        }
        assert!(limiter.is_rate_limited(key));
    }

    #[test]
    fn first_call_creates_record_with_count_one() {
        let (limiter, _) = limiter();
        assert!(!limiter.is_rate_limited("a"));
        let entry = *limiter.entries.get("a").unwrap();
        assert_eq!(
            entry,
            RateLimitEntry {
                count: 1,
                window_start: T0,
                blocked_until: None,
            }
        );
    }

    #[test]
    fn blocked_checks_do_not_mutate() {
        let (limiter, clock) = limiter();
        exhaust(&limiter, "a");
        let blocked = *limiter.entries.get("a").unwrap();
        assert_eq!(blocked.count, 6);
        assert_eq!(blocked.blocked_until, Some(T0 + 60 * MINUTE));

        clock.advance(10 * MINUTE);
        assert!(limiter.is_rate_limited("a"));
        assert_eq!(*limiter.entries.get("a").unwrap(), blocked);
    }

    #[test]
    fn block_expires_exactly_at_blocked_until() {
        let (limiter, clock) = limiter();
        exhaust(&limiter, "a");
        clock.advance(60 * MINUTE - 1);
        assert!(limiter.is_rate_limited("a"));
        clock.advance(1);
        assert!(!limiter.is_rate_limited("a"));
        let entry = *limiter.entries.get("a").unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.blocked_until, None);
        assert_eq!(entry.window_start, T0 + 60 * MINUTE);
    }

    #[test]
    fn window_expires_exactly_at_boundary() {
        let (limiter, clock) = limiter();
        for _ in 0..5 {
            assert!(!limiter.is_rate_limited("a"));
        }
        clock.advance(15 * MINUTE);
        assert!(!limiter.is_rate_limited("a"));
        assert_eq!(limiter.remaining_attempts("a"), 4);
    }

    #[test]
    fn zero_max_attempts_blocks_immediately() {
        let clock = Arc::new(ManualClock::new(T0));
        let limiter = RateLimiter::with_clock(RateLimiterConfig::new(0, MINUTE, MINUTE), clock);
        assert!(limiter.is_rate_limited("a"));
        assert_eq!(limiter.remaining_attempts("a"), 0);
        assert_eq!(limiter.sweep_idle(), 0);
    }

    #[test]
    fn read_only_queries_do_not_insert() {
        let (limiter, _) = limiter();
        assert_eq!(limiter.remaining_attempts("ghost"), 5);
        assert_eq!(limiter.block_duration_ms("ghost"), 0);
        let _ = limiter.status("ghost");
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn status_while_blocked() {
        let (limiter, clock) = limiter();
        exhaust(&limiter, "a");
        clock.advance(MINUTE);
        assert_eq!(
            limiter.status("a"),
            RateLimitStatus {
                key: "a".to_string(),
                blocked: true,
                remaining_attempts: 0,
                retry_after_ms: 59 * MINUTE,
            }
        );
    }

    #[test]
    fn status_serializes_to_json() {
        let (limiter, _) = limiter();
        limiter.is_rate_limited("a");
        let json = serde_json::to_value(limiter.status("a")).unwrap();
        assert_eq!(json["remaining_attempts"], 4);
        assert_eq!(json["blocked"], false);
    }

    #[test]
    fn retry_after_rounds_up() {
        let (limiter, clock) = limiter();
        exhaust(&limiter, "a");
        clock.advance(60 * MINUTE - 1);
        assert_eq!(limiter.block_duration_ms("a"), 1);
        assert_eq!(limiter.retry_after_secs("a"), 1);
        clock.advance(1);
        assert_eq!(limiter.retry_after_secs("a"), 0);
    }

    #[test]
    fn reset_unblocks_key() {
        let (limiter, _) = limiter();
        exhaust(&limiter, "a");
        limiter.reset("a");
        assert_eq!(limiter.tracked_keys(), 0);
        assert_eq!(limiter.remaining_attempts("a"), 5);
        assert!(!limiter.is_rate_limited("a"));
        limiter.reset("never-seen");
    }

    #[test]
    fn sweep_evicts_only_idle_records() {
        let (limiter, clock) = limiter();
        exhaust(&limiter, "blocked");
        limiter.is_rate_limited("idle");
        clock.advance(15 * MINUTE);
        limiter.is_rate_limited("active");

        assert_eq!(limiter.sweep_idle(), 1);
        assert_eq!(limiter.tracked_keys(), 2);
        assert!(limiter.entries.contains_key("blocked"));
        assert!(limiter.entries.contains_key("active"));

        // expired block and expired window: now idle too
        clock.advance(60 * MINUTE);
        assert_eq!(limiter.sweep_idle(), 2);
        assert!(!limiter.is_rate_limited("blocked"));
    }
}
