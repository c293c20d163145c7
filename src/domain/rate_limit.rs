//! Sliding-window request limiting, one window per source address and tier

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;

/// Which budget a request is charged against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateTier {
    /// Anonymous callers, keyed by address
    SourceIp,
    /// Requests carrying a known carrier credential
    Carrier,
}

/// Request tracking for one key
#[derive(Debug, Clone)]
struct RequestTracker {
    timestamps: VecDeque<DateTime<Utc>>,
}

impl RequestTracker {
    fn new() -> Self {
        Self {
            timestamps: VecDeque::new(),
        }
    }

    fn cleanup_old_requests(&mut self, now: DateTime<Utc>, window: Duration) {
        let cutoff = now - window;
        while let Some(&timestamp) = self.timestamps.front() {
            if timestamp <= cutoff {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record the request if it fits under `max_requests`
    fn try_record(&mut self, now: DateTime<Utc>, window: Duration, max_requests: usize) -> bool {
        self.cleanup_old_requests(now, window);
        if self.timestamps.len() >= max_requests {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }
}

/// Two-tier rate limiter
pub struct RateLimiter {
    per_ip: usize,
    per_carrier: usize,
    window: Duration,
    carrier_credentials: Vec<String>,
    trackers: DashMap<(RateTier, String), RequestTracker>,
}

impl RateLimiter {
    pub fn new(per_ip: usize, per_carrier: usize) -> Self {
        Self {
            per_ip,
            per_carrier,
            window: Duration::minutes(1),
            carrier_credentials: Vec::new(),
            trackers: DashMap::new(),
        }
    }

    pub fn with_carrier_credentials(mut self, credentials: Vec<String>) -> Self {
        self.carrier_credentials = credentials;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Tier for a request presenting `credential` (if any)
    pub fn tier_for(&self, credential: Option<&str>) -> RateTier {
        match credential {
            Some(c) if self.carrier_credentials.iter().any(|known| known == c) => RateTier::Carrier,
            _ => RateTier::SourceIp,
        }
    }

    fn limit(&self, tier: RateTier) -> usize {
        match tier {
            RateTier::SourceIp => self.per_ip,
            RateTier::Carrier => self.per_carrier,
        }
    }

    /// Count a request from `addr`; false once the window is exhausted
    pub fn check(&self, tier: RateTier, addr: &str) -> bool {
        self.check_at(tier, addr, Utc::now())
    }

    pub fn check_at(&self, tier: RateTier, addr: &str, now: DateTime<Utc>) -> bool {
        let limit = self.limit(tier);
        let mut tracker = self
            .trackers
            .entry((tier, addr.to_string()))
            .or_insert_with(RequestTracker::new);
        let allowed = tracker.try_record(now, self.window, limit);
        if !allowed {
            warn!("Rate limit of {}/window exhausted for {} ({:?})", limit, addr, tier);
        }
        allowed
    }

    /// Drop trackers whose window has fully elapsed
    pub fn purge_idle(&self) {
        let now = Utc::now();
        let window = self.window;
        self.trackers.retain(|_, tracker| {
            tracker.cleanup_old_requests(now, window);
            !tracker.timestamps.is_empty()
        });
    }

    pub fn tracked_keys(&self) -> usize {
        self.trackers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_ip_limit() {
        let limiter = RateLimiter::new(3, 10);
        let now = Utc::now();
        for _ in 0..3 {
            assert!(limiter.check_at(RateTier::SourceIp, "203.0.113.9", now));
        }
        assert!(!limiter.check_at(RateTier::SourceIp, "203.0.113.9", now));
        // Other addresses have their own window.
        assert!(limiter.check_at(RateTier::SourceIp, "203.0.113.10", now));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(2, 10);
        let start = Utc::now();
        assert!(limiter.check_at(RateTier::SourceIp, "a", start));
        assert!(limiter.check_at(RateTier::SourceIp, "a", start + Duration::seconds(30)));
        assert!(!limiter.check_at(RateTier::SourceIp, "a", start + Duration::seconds(59)));
        assert!(limiter.check_at(RateTier::SourceIp, "a", start + Duration::seconds(61)));
    }

    #[test]
    fn test_carrier_tier_has_its_own_budget() {
        let limiter = RateLimiter::new(1, 3).with_carrier_credentials(vec!["s3cret".to_string()]);
        let now = Utc::now();

        assert_eq!(limiter.tier_for(Some("s3cret")), RateTier::Carrier);
        assert_eq!(limiter.tier_for(Some("guess")), RateTier::SourceIp);
        assert_eq!(limiter.tier_for(None), RateTier::SourceIp);

        assert!(limiter.check_at(RateTier::SourceIp, "x", now));
        assert!(!limiter.check_at(RateTier::SourceIp, "x", now));
        for _ in 0..3 {
            assert!(limiter.check_at(RateTier::Carrier, "x", now));
        }
        assert!(!limiter.check_at(RateTier::Carrier, "x", now));
    }

    #[test]
    fn test_purge_idle() {
        let limiter = RateLimiter::new(5, 5).with_window(Duration::seconds(1));
        limiter.check_at(RateTier::SourceIp, "old", Utc::now() - Duration::seconds(10));
        limiter.check(RateTier::SourceIp, "fresh");
        assert_eq!(limiter.tracked_keys(), 2);

        limiter.purge_idle();
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
