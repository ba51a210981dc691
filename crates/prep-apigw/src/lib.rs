//! PrepGate API Gateway
//!
//! Tier-aware request admission for the exam-prep API:
//! - Sliding-window rate limiting per client key (minute and hour windows)
//! - Graceful fallback ceilings when tier resolution fails
//! - 429-equivalent throttling outcomes with standard `X-RateLimit-*` headers
//!
//! Rate-limit state lives in process memory. A horizontally scaled
//! deployment rate-limits per instance, not globally; a shared store
//! would change the consistency model and sits outside this crate.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub mod gate;
pub mod ratelimit;

pub use gate::{GateOutcome, RequestGate, RequestIdentity, ThrottleBody};
pub use ratelimit::{RateDecision, TierRateLimiter};

/// Gateway rate-limit configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Ceiling applied when tier resolution fails
    pub fallback_max_requests: u32,
    /// Window paired with the fallback ceiling, in seconds
    pub fallback_window_secs: i64,
    /// Exact paths that bypass rate limiting
    pub exempt_routes: HashSet<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            fallback_max_requests: 60,
            fallback_window_secs: 60,
            exempt_routes: ["/health", "/docs", "/redoc", "/openapi.json"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}
