//! Error types for PrepGate

use thiserror::Error;

/// PrepGate error type
#[derive(Error, Debug)]
pub enum PrepError {
    /// Tier name not present in the policy table
    #[error("unknown tier: {0}")]
    UnknownTier(String),

    /// Feature name outside the canonical daily/total sets
    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    /// Caller record absent from both store namespaces
    #[error("user not found: {0}")]
    CallerNotFound(String),

    /// Usage store unreachable or failing
    #[error("usage store unavailable: {0}")]
    StoreUnavailable(String),

    /// Device cap reached for the caller's tier
    #[error("device limit exceeded ({current}/{max}), remove a device to continue")]
    DeviceLimitExceeded {
        /// Devices already registered
        current: u32,
        /// Cap for the caller's tier
        max: u32,
    },

    /// Tier does not include device sync
    #[error("device sync not supported for this tier")]
    SyncNotSupported,

    /// Too many requests inside the current window
    #[error("too many requests, please wait {retry_after_secs} seconds")]
    RateLimitExceeded {
        /// Seconds until the window frees up
        retry_after_secs: i64,
    },

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

/// Result type for PrepGate
pub type PrepResult<T> = Result<T, PrepError>;
