//! Per-request admission gate
//!
//! The HTTP layer resolves the caller's identity, hands it here, and
//! maps the outcome onto the response. The gate owns client-key
//! composition, tier defaulting, exempt routes, and rate-limit headers;
//! it never parses requests itself.

use serde::Serialize;
use std::sync::Arc;

use prep_common::PrepError;
use prep_limits::{PolicyTable, RatePeriod, Tier};

use crate::ratelimit::{RateDecision, TierRateLimiter};
use crate::RateLimitConfig;

/// Caller identity resolved for the in-flight request
#[derive(Clone, Debug, Default)]
pub struct RequestIdentity {
    /// Authenticated or anonymous caller id, when one was resolved
    pub user_id: Option<String>,
    /// Tier label from the identity context, when one was resolved
    pub tier: Option<String>,
    /// Source address, the fallback bucket key
    pub remote_ip: String,
}

impl RequestIdentity {
    /// Rate-limit bucket key: callers with an identity by id, the rest
    /// by source address, so the two populations never share a window
    pub fn client_key(&self) -> String {
        match &self.user_id {
            Some(id) => format!("user:{id}"),
            None => format!("ip:{}", self.remote_ip),
        }
    }

    /// Tier label, defaulting to free when unresolved
    pub fn tier_label(&self) -> &str {
        self.tier.as_deref().unwrap_or(Tier::DEFAULT.as_str())
    }
}

/// Throttling response body
#[derive(Clone, Debug, Serialize)]
pub struct ThrottleBody {
    /// Human-readable denial message
    pub detail: String,
    /// Tier the ceiling was resolved from
    pub tier: String,
    /// Ceiling that was hit
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: i64,
    /// Epoch seconds when the window frees up
    pub reset_at: i64,
    /// Seconds to wait before retrying
    pub retry_after_secs: i64,
}

/// Admission decision for one request
#[derive(Clone, Debug)]
pub enum GateOutcome {
    /// Proceed; attach the headers to the response
    Allowed {
        /// `X-RateLimit-*` telemetry headers
        headers: Vec<(String, String)>,
    },
    /// Reject with a 429-equivalent
    Throttled {
        /// Structured response body
        body: ThrottleBody,
        /// Throttling headers including `Retry-After`
        headers: Vec<(String, String)>,
    },
}

impl GateOutcome {
    /// Whether the request may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Headers to attach to the response
    pub fn headers(&self) -> &[(String, String)] {
        match self {
            Self::Allowed { headers } => headers,
            Self::Throttled { headers, .. } => headers,
        }
    }

    /// The throttling outcome as a typed error, for `PrepResult` flows
    pub fn as_error(&self) -> Option<PrepError> {
        match self {
            Self::Allowed { .. } => None,
            Self::Throttled { body, .. } => Some(PrepError::RateLimitExceeded {
                retry_after_secs: body.retry_after_secs,
            }),
        }
    }
}

/// Request gate over the tier rate limiter
pub struct RequestGate {
    limiter: TierRateLimiter,
    config: RateLimitConfig,
}

impl RequestGate {
    /// New gate over a policy table
    pub fn new(policies: Arc<PolicyTable>, config: RateLimitConfig) -> Self {
        Self {
            limiter: TierRateLimiter::new(policies, config.clone()),
            config,
        }
    }

    /// Decide admission for one request.
    ///
    /// Exempt paths bypass limiting entirely. Otherwise the minute and
    /// hour windows are evaluated in order and the first denial wins.
    pub fn admit(&self, identity: &RequestIdentity, path: &str) -> GateOutcome {
        if self.is_exempt(path) {
            return GateOutcome::Allowed { headers: Vec::new() };
        }

        let key = identity.client_key();
        let tier = identity.tier_label();

        let minute = self.limiter.evaluate(&key, tier, RatePeriod::PerMinute);
        if !minute.allowed {
            return throttled(minute);
        }

        let hour = self.limiter.evaluate(&key, tier, RatePeriod::PerHour);
        if !hour.allowed {
            return throttled(hour);
        }

        GateOutcome::Allowed {
            headers: allow_headers(&minute),
        }
    }

    /// The limiter backing this gate, for housekeeping and admin resets
    pub fn limiter(&self) -> &TierRateLimiter {
        &self.limiter
    }

    fn is_exempt(&self, path: &str) -> bool {
        self.config.exempt_routes.contains(path) || path.starts_with("/static/")
    }
}

fn allow_headers(decision: &RateDecision) -> Vec<(String, String)> {
    vec![
        ("X-RateLimit-Limit".to_string(), decision.limit.to_string()),
        ("X-RateLimit-Remaining".to_string(), decision.remaining.to_string()),
        ("X-RateLimit-Window".to_string(), decision.window_secs.to_string()),
        ("X-RateLimit-Tier".to_string(), decision.tier.clone()),
    ]
}

fn throttled(decision: RateDecision) -> GateOutcome {
    let headers = vec![
        ("X-RateLimit-Limit".to_string(), decision.limit.to_string()),
        ("X-RateLimit-Window".to_string(), decision.window_secs.to_string()),
        ("X-RateLimit-Reset".to_string(), decision.reset_at.to_string()),
        ("X-RateLimit-Tier".to_string(), decision.tier.clone()),
        ("Retry-After".to_string(), decision.retry_after_secs.to_string()),
    ];
    GateOutcome::Throttled {
        body: ThrottleBody {
            detail: "Rate limit exceeded".to_string(),
            tier: decision.tier,
            limit: decision.limit,
            window_secs: decision.window_secs,
            reset_at: decision.reset_at,
            retry_after_secs: decision.retry_after_secs,
        },
        headers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> RequestGate {
        RequestGate::new(Arc::new(PolicyTable::new()), RateLimitConfig::default())
    }

    fn guest(ip: &str) -> RequestIdentity {
        RequestIdentity {
            user_id: None,
            tier: Some("anonymous".to_string()),
            remote_ip: ip.to_string(),
        }
    }

    #[test]
    fn test_client_key_composition() {
        let authed = RequestIdentity {
            user_id: Some("user123".to_string()),
            tier: Some("paid".to_string()),
            remote_ip: "192.168.1.1".to_string(),
        };
        assert_eq!(authed.client_key(), "user:user123");

        let anon = RequestIdentity {
            user_id: None,
            tier: None,
            remote_ip: "192.168.1.1".to_string(),
        };
        assert_eq!(anon.client_key(), "ip:192.168.1.1");
    }

    #[test]
    fn test_tier_defaults_to_free() {
        let identity = RequestIdentity {
            user_id: None,
            tier: None,
            remote_ip: "192.168.1.1".to_string(),
        };
        assert_eq!(identity.tier_label(), "free");
    }

    #[test]
    fn test_exempt_route_bypasses_limiting() {
        let gate = gate();
        let identity = guest("203.0.113.9");

        // Far past the anonymous ceiling, yet every call is admitted and
        // nothing is recorded against the client.
        for _ in 0..100 {
            assert!(gate.admit(&identity, "/health").is_allowed());
        }
        assert!(gate.admit(&identity, "/static/app.js").is_allowed());
        assert_eq!(gate.limiter().tracked_keys(), 0);
    }

    #[test]
    fn test_allowed_request_carries_headers() {
        let gate = gate();
        let identity = RequestIdentity {
            user_id: Some("u1".to_string()),
            tier: None,
            remote_ip: "192.168.1.1".to_string(),
        };

        let outcome = gate.admit(&identity, "/api/v1/practice");

        assert!(outcome.is_allowed());
        assert!(outcome.as_error().is_none());
        let headers = outcome.headers();
        let get = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("X-RateLimit-Limit"), Some("60"));
        assert_eq!(get("X-RateLimit-Remaining"), Some("59"));
        assert_eq!(get("X-RateLimit-Window"), Some("60"));
        assert_eq!(get("X-RateLimit-Tier"), Some("free"));
    }

    #[test]
    fn test_burst_throttles_thirty_first_request() {
        let gate = gate();
        let identity = guest("203.0.113.9");

        for i in 0..30 {
            assert!(
                gate.admit(&identity, "/api/v1/questions").is_allowed(),
                "request {} should pass",
                i + 1
            );
        }

        let outcome = gate.admit(&identity, "/api/v1/questions");
        match outcome {
            GateOutcome::Throttled { ref body, ref headers } => {
                assert_eq!(body.limit, 30);
                assert_eq!(body.window_secs, 60);
                assert_eq!(body.tier, "anonymous");
                assert!(body.reset_at > 0);
                assert!(headers.iter().any(|(k, _)| k == "Retry-After"));
            }
            GateOutcome::Allowed { .. } => panic!("expected throttling"),
        }
        assert!(matches!(
            outcome.as_error(),
            Some(PrepError::RateLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_identities_do_not_share_windows() {
        let gate = gate();

        for _ in 0..30 {
            gate.admit(&guest("203.0.113.9"), "/api/v1/questions");
        }
        assert!(!gate.admit(&guest("203.0.113.9"), "/api/v1/questions").is_allowed());

        // Different address, and an authenticated caller from the same
        // address, are unaffected.
        assert!(gate.admit(&guest("203.0.113.10"), "/api/v1/questions").is_allowed());
        let authed = RequestIdentity {
            user_id: Some("u1".to_string()),
            tier: Some("anonymous".to_string()),
            remote_ip: "203.0.113.9".to_string(),
        };
        assert!(gate.admit(&authed, "/api/v1/questions").is_allowed());
    }

    #[test]
    fn test_throttle_body_serializes() {
        let gate = gate();
        let identity = guest("203.0.113.9");
        for _ in 0..30 {
            gate.admit(&identity, "/api/v1/questions");
        }

        if let GateOutcome::Throttled { body, .. } = gate.admit(&identity, "/api/v1/questions") {
            let json = serde_json::to_value(&body).unwrap();
            assert_eq!(json["detail"], "Rate limit exceeded");
            assert_eq!(json["limit"], 30);
        } else {
            panic!("expected throttling");
        }
    }
}
