//! Tier-aware sliding-window rate limiting
//!
//! One timestamp log per (client key, window) pair, pruned lazily on
//! every check. A true sliding window: the ceiling applies to the
//! trailing N seconds, not to fixed-aligned buckets.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use prep_limits::{PolicyTable, RatePeriod, Tier};

use crate::RateLimitConfig;

/// Outcome of one window evaluation
#[derive(Clone, Debug, Serialize)]
pub struct RateDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Ceiling applied to the window
    pub limit: u32,
    /// Requests left in the window after this one
    pub remaining: u32,
    /// Window length in seconds
    pub window_secs: i64,
    /// Epoch seconds when the window frees up; 0 when allowed
    pub reset_at: i64,
    /// Seconds the client should wait before retrying; 0 when allowed
    pub retry_after_secs: i64,
    /// Tier label the ceiling was resolved from
    pub tier: String,
}

/// Sliding-window rate limiter keyed by client
///
/// The prune-check-append sequence is atomic per window key: each log
/// sits behind its own mutex inside the concurrent map, so two requests
/// racing on the same key cannot both observe `limit - 1` and slip
/// through. No store or identity call ever happens under that lock.
pub struct TierRateLimiter {
    policies: Arc<PolicyTable>,
    config: RateLimitConfig,
    windows: DashMap<String, Mutex<Vec<i64>>>,
}

impl TierRateLimiter {
    /// New limiter over a policy table
    pub fn new(policies: Arc<PolicyTable>, config: RateLimitConfig) -> Self {
        Self {
            policies,
            config,
            windows: DashMap::new(),
        }
    }

    /// Evaluate and record one request against a tier window
    pub fn evaluate(&self, client_key: &str, tier_label: &str, period: RatePeriod) -> RateDecision {
        self.evaluate_at(client_key, tier_label, period, Utc::now().timestamp_millis())
    }

    /// Drop all window state for a client key
    pub fn clear(&self, client_key: &str) {
        let prefix = format!("{client_key}:");
        self.windows.retain(|key, _| !key.starts_with(&prefix));
    }

    /// Evict window entries whose newest request is older than `max_idle_secs`.
    ///
    /// Bounds memory across many one-off clients; intended to run from
    /// the host's periodic housekeeping.
    pub fn evict_idle(&self, max_idle_secs: i64) {
        let cutoff = Utc::now().timestamp_millis() - max_idle_secs * 1000;
        self.windows
            .retain(|_, log| log.get_mut().last().is_some_and(|&t| t > cutoff));
    }

    /// Window keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    pub(crate) fn evaluate_at(
        &self,
        client_key: &str,
        tier_label: &str,
        period: RatePeriod,
        now_ms: i64,
    ) -> RateDecision {
        let (limit, window_secs) = self.ceiling(tier_label, period);
        let window_ms = window_secs * 1000;
        let key = format!("{client_key}:{window_secs}");

        let entry = self
            .windows
            .entry(key)
            .or_insert_with(|| Mutex::new(Vec::new()));
        let mut log = entry.lock();

        let cutoff = now_ms - window_ms;
        log.retain(|&t| t > cutoff);

        if log.len() as u32 >= limit {
            // Denied requests are not recorded; the log keeps only
            // admitted traffic.
            let oldest = log.first().copied().unwrap_or(now_ms);
            let reset_at = (oldest + window_ms) / 1000;
            RateDecision {
                allowed: false,
                limit,
                remaining: 0,
                window_secs,
                reset_at,
                retry_after_secs: (reset_at - now_ms / 1000).max(0),
                tier: tier_label.to_string(),
            }
        } else {
            log.push(now_ms);
            RateDecision {
                allowed: true,
                limit,
                remaining: limit.saturating_sub(log.len() as u32),
                window_secs,
                reset_at: 0,
                retry_after_secs: 0,
                tier: tier_label.to_string(),
            }
        }
    }

    /// Resolve the ceiling for a tier label, degrading to the fallback
    /// limits rather than blocking traffic.
    fn ceiling(&self, tier_label: &str, period: RatePeriod) -> (u32, i64) {
        match Tier::parse(tier_label) {
            Ok(tier) => (
                self.policies.get(tier).rate_limit(period),
                period.window_secs(),
            ),
            Err(_) => {
                warn!(tier = tier_label, "unresolved tier, applying fallback rate limit");
                (
                    self.config.fallback_max_requests,
                    self.config.fallback_window_secs,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> TierRateLimiter {
        TierRateLimiter::new(Arc::new(PolicyTable::new()), RateLimitConfig::default())
    }

    #[test]
    fn test_burst_allowed_up_to_limit_then_denied() {
        let limiter = limiter();
        let now = 1_700_000_000_000;

        for i in 0..30 {
            let decision =
                limiter.evaluate_at("ip:203.0.113.9", "anonymous", RatePeriod::PerMinute, now + i);
            assert!(decision.allowed, "request {} should be admitted", i + 1);
        }

        let denied =
            limiter.evaluate_at("ip:203.0.113.9", "anonymous", RatePeriod::PerMinute, now + 30);
        assert!(!denied.allowed);
        assert_eq!(denied.limit, 30);
        assert_eq!(denied.window_secs, 60);
        assert!(denied.reset_at > now / 1000);
        assert!(denied.retry_after_secs > 0);
    }

    #[test]
    fn test_denied_request_not_recorded() {
        let limiter = limiter();
        let now = 1_700_000_000_000;

        for _ in 0..30 {
            limiter.evaluate_at("user:u1", "anonymous", RatePeriod::PerMinute, now);
        }
        // Hammering while denied must not push the reset time out.
        let first = limiter.evaluate_at("user:u1", "anonymous", RatePeriod::PerMinute, now + 1000);
        let second = limiter.evaluate_at("user:u1", "anonymous", RatePeriod::PerMinute, now + 2000);

        assert!(!first.allowed);
        assert!(!second.allowed);
        assert_eq!(first.reset_at, second.reset_at);
    }

    #[test]
    fn test_client_keys_isolated() {
        let limiter = limiter();
        let now = 1_700_000_000_000;

        for _ in 0..30 {
            limiter.evaluate_at("user:noisy", "anonymous", RatePeriod::PerMinute, now);
        }
        assert!(!limiter.evaluate_at("user:noisy", "anonymous", RatePeriod::PerMinute, now).allowed);

        let other = limiter.evaluate_at("user:quiet", "anonymous", RatePeriod::PerMinute, now);
        assert!(other.allowed);
    }

    #[test]
    fn test_window_slides_and_recovers() {
        let limiter = limiter();
        let now = 1_700_000_000_000;

        for _ in 0..30 {
            limiter.evaluate_at("user:u1", "anonymous", RatePeriod::PerMinute, now);
        }
        assert!(!limiter.evaluate_at("user:u1", "anonymous", RatePeriod::PerMinute, now).allowed);

        let later = now + 61_000;
        let decision = limiter.evaluate_at("user:u1", "anonymous", RatePeriod::PerMinute, later);
        assert!(decision.allowed);
    }

    #[test]
    fn test_clear_resets_denied_key() {
        let limiter = limiter();
        let now = 1_700_000_000_000;

        for _ in 0..30 {
            limiter.evaluate_at("user:u1", "anonymous", RatePeriod::PerMinute, now);
        }
        assert!(!limiter.evaluate_at("user:u1", "anonymous", RatePeriod::PerMinute, now).allowed);

        limiter.clear("user:u1");

        assert!(limiter.evaluate_at("user:u1", "anonymous", RatePeriod::PerMinute, now).allowed);
    }

    #[test]
    fn test_tiers_resolve_distinct_ceilings() {
        let limiter = limiter();
        let now = 1_700_000_000_000;

        let free = limiter.evaluate_at("user:f", "free", RatePeriod::PerMinute, now);
        let paid = limiter.evaluate_at("user:p", "paid", RatePeriod::PerMinute, now);

        assert_eq!(free.limit, 60);
        assert_eq!(paid.limit, 300);
    }

    #[test]
    fn test_hour_window_independent_of_minute() {
        let limiter = limiter();
        let now = 1_700_000_000_000;

        let minute = limiter.evaluate_at("user:u1", "free", RatePeriod::PerMinute, now);
        let hour = limiter.evaluate_at("user:u1", "free", RatePeriod::PerHour, now);

        assert_eq!(minute.window_secs, 60);
        assert_eq!(hour.window_secs, 3600);
        assert_eq!(hour.limit, 500);
        // Both recorded exactly one request each.
        assert_eq!(minute.remaining, 59);
        assert_eq!(hour.remaining, 499);
    }

    #[test]
    fn test_unknown_tier_degrades_to_fallback() {
        let limiter = limiter();
        let now = 1_700_000_000_000;

        let decision = limiter.evaluate_at("user:u1", "enterprise", RatePeriod::PerMinute, now);

        assert!(decision.allowed);
        assert_eq!(decision.limit, 60);
        assert_eq!(decision.window_secs, 60);
    }

    #[test]
    fn test_evict_idle_drops_stale_keys_only() {
        let limiter = limiter();
        let stale = Utc::now().timestamp_millis() - 7200 * 1000;

        limiter.evaluate_at("user:stale", "free", RatePeriod::PerMinute, stale);
        limiter.evaluate("user:active", "free", RatePeriod::PerMinute);
        assert_eq!(limiter.tracked_keys(), 2);

        limiter.evict_idle(3600);

        assert_eq!(limiter.tracked_keys(), 1);
        assert!(limiter.evaluate("user:active", "free", RatePeriod::PerMinute).allowed);
    }
}
