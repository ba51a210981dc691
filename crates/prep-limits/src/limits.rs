//! Quota enforcement
//!
//! Gates and records usage of quota-bound features. The asymmetry here
//! is deliberate: read checks fail open when the store is unreachable,
//! while `record_usage` and `reset_daily_counters` surface failure so
//! counters never silently drift.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use prep_common::{PrepError, PrepResult};

use crate::model::{Feature, Limit, Namespace, Tier, UsageRecord};
use crate::policy::{PolicyTable, TierPolicy};
use crate::store::{StoreError, UsageStore};

/// Which ceiling a validation applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageKind {
    /// Counter that resets at UTC midnight
    Daily,
    /// Lifetime counter
    Total,
    /// Registered-device cap
    Device,
}

/// Outcome of a daily or total quota check
#[derive(Debug, Clone, Serialize)]
pub struct QuotaCheck {
    /// Whether one more use may proceed
    pub allowed: bool,
    /// Counter value the check ran against (pre-increment)
    pub current: u64,
    /// Ceiling applied
    pub limit: Limit,
    /// Uses left before the ceiling
    pub remaining: Limit,
    /// Next UTC midnight, for daily ceilings only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
    /// Set when the store was unreachable and the check was admitted
    /// fail-open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

/// Outcome of a device-cap check
#[derive(Debug, Clone, Serialize)]
pub struct DeviceCheck {
    /// Whether one more device may register
    pub allowed: bool,
    /// Devices currently registered
    pub current: u32,
    /// Cap for the tier
    pub max_devices: u32,
    /// Registration slots left
    pub remaining: u32,
    /// Whether the tier includes device sync at all
    pub sync_supported: bool,
    /// Denial reason when one applies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result of [`QuotaEnforcer::validate_access`]
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QuotaDecision {
    /// A daily or total ceiling was checked
    Quota(QuotaCheck),
    /// The device cap was checked
    Device(DeviceCheck),
}

impl QuotaDecision {
    /// Whether the gated operation may proceed
    pub fn allowed(&self) -> bool {
        match self {
            Self::Quota(check) => check.allowed,
            Self::Device(check) => check.allowed,
        }
    }
}

/// Tier-aware quota gate over the usage store
pub struct QuotaEnforcer {
    policies: Arc<PolicyTable>,
    store: Arc<dyn UsageStore>,
}

impl QuotaEnforcer {
    /// New enforcer over a policy table and store
    pub fn new(policies: Arc<PolicyTable>, store: Arc<dyn UsageStore>) -> Self {
        Self { policies, store }
    }

    /// Check a daily ceiling against a pre-increment counter value
    pub fn check_daily(&self, tier: Tier, feature: Feature, current: u64) -> QuotaCheck {
        let limit = self.policies.get(tier).daily_limit(feature);
        QuotaCheck {
            allowed: limit.allows(current),
            current,
            limit,
            remaining: limit.remaining(current),
            reset_at: Some(next_utc_midnight(Utc::now())),
            degraded: None,
        }
    }

    /// Check a lifetime ceiling against a pre-increment counter value
    pub fn check_total(&self, tier: Tier, feature: Feature, current: u64) -> QuotaCheck {
        let limit = self.policies.get(tier).total_limit(feature);
        QuotaCheck {
            allowed: limit.allows(current),
            current,
            limit,
            remaining: limit.remaining(current),
            reset_at: None,
            degraded: None,
        }
    }

    /// Check the device cap.
    ///
    /// A tier without device sync denies regardless of count; the cap
    /// comparison only applies once sync is supported.
    pub fn check_devices(&self, tier: Tier, current: u32) -> DeviceCheck {
        device_check(self.policies.get(tier), current)
    }

    /// Load the caller's usage and dispatch to the matching check.
    ///
    /// A caller absent from both namespaces is a [`PrepError::CallerNotFound`].
    /// A store failure on this read path admits the caller with the
    /// `degraded` marker set.
    pub async fn validate_access(
        &self,
        caller_id: &str,
        tier: Tier,
        feature: Feature,
        kind: UsageKind,
    ) -> PrepResult<QuotaDecision> {
        if kind == UsageKind::Device {
            let count = self.device_count_or_zero(caller_id).await;
            return Ok(QuotaDecision::Device(self.check_devices(tier, count)));
        }

        let record = match self.load_record(caller_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(PrepError::CallerNotFound(caller_id.to_string())),
            Err(err) => {
                warn!(caller = caller_id, %err, "store unreachable, admitting quota check fail-open");
                return Ok(QuotaDecision::Quota(self.degraded_check(tier, feature, kind, &err)));
            }
        };

        let current = record.counter(feature);
        let check = match kind {
            UsageKind::Daily => self.check_daily(tier, feature, current),
            UsageKind::Total => self.check_total(tier, feature, current),
            UsageKind::Device => unreachable!("handled above"),
        };
        Ok(QuotaDecision::Quota(check))
    }

    /// Record admitted usage for a feature.
    ///
    /// Unknown feature names are rejected without touching the store.
    /// The registered namespace is tried first; a caller id may belong
    /// to either. Store failure is surfaced, never swallowed.
    pub async fn record_usage(
        &self,
        caller_id: &str,
        feature_name: &str,
        amount: u64,
    ) -> PrepResult<bool> {
        let feature = match Feature::parse(feature_name) {
            Ok(feature) => feature,
            Err(_) => {
                warn!(feature = feature_name, "ignoring usage for unknown feature");
                return Ok(false);
            }
        };

        let field = feature.counter_field();
        for ns in Namespace::LOOKUP_ORDER {
            match self.store.increment(ns, caller_id, field, amount).await {
                Ok(true) => {
                    info!(caller = caller_id, feature = field, amount, "recorded usage");
                    return Ok(true);
                }
                Ok(false) => continue,
                Err(err) => {
                    error!(caller = caller_id, feature = field, %err, "failed to record usage");
                    return Err(PrepError::StoreUnavailable(err.to_string()));
                }
            }
        }

        error!(caller = caller_id, feature = field, "no caller record to record usage against");
        Ok(false)
    }

    /// Zero the caller's daily counters and stamp today's UTC date.
    ///
    /// Idempotent within a day; intended to run once per caller per UTC
    /// day from external scheduling.
    pub async fn reset_daily_counters(&self, caller_id: &str) -> PrepResult<bool> {
        let today = Utc::now().date_naive();
        for ns in Namespace::LOOKUP_ORDER {
            match self.store.reset_daily(ns, caller_id, today).await {
                Ok(true) => {
                    info!(caller = caller_id, "reset daily limits");
                    return Ok(true);
                }
                Ok(false) => continue,
                Err(err) => {
                    error!(caller = caller_id, %err, "failed to reset daily limits");
                    return Err(PrepError::StoreUnavailable(err.to_string()));
                }
            }
        }

        warn!(caller = caller_id, "no caller record to reset");
        Ok(false)
    }

    /// Whether a caller's trial window has lapsed, for tiers that carry one
    pub fn trial_expired(
        &self,
        tier: Tier,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        match self.policies.get(tier).trial_period() {
            Some(period) => now - created_at > period,
            None => false,
        }
    }

    /// Policy table this enforcer was built with
    pub fn policies(&self) -> &Arc<PolicyTable> {
        &self.policies
    }

    pub(crate) async fn load_record(
        &self,
        caller_id: &str,
    ) -> Result<Option<UsageRecord>, StoreError> {
        for ns in Namespace::LOOKUP_ORDER {
            if let Some(record) = self.store.fetch(ns, caller_id).await? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    pub(crate) async fn device_count_or_zero(&self, caller_id: &str) -> u32 {
        match self.store.device_count(caller_id).await {
            Ok(count) => count,
            Err(err) => {
                error!(caller = caller_id, %err, "device count unavailable, assuming zero");
                0
            }
        }
    }

    fn degraded_check(
        &self,
        tier: Tier,
        feature: Feature,
        kind: UsageKind,
        err: &StoreError,
    ) -> QuotaCheck {
        let policy = self.policies.get(tier);
        let (limit, reset_at) = match kind {
            UsageKind::Daily => (policy.daily_limit(feature), Some(next_utc_midnight(Utc::now()))),
            _ => (policy.total_limit(feature), None),
        };
        QuotaCheck {
            allowed: true,
            current: 0,
            limit,
            remaining: limit,
            reset_at,
            degraded: Some(err.to_string()),
        }
    }
}

/// Device-cap predicate shared by the enforcer and the device registry
pub(crate) fn device_check(policy: &TierPolicy, current: u32) -> DeviceCheck {
    if !policy.supports_device_sync() {
        return DeviceCheck {
            allowed: false,
            current,
            max_devices: 0,
            remaining: 0,
            sync_supported: false,
            reason: Some("device sync not supported for this tier".to_string()),
        };
    }

    let max = policy.max_devices();
    DeviceCheck {
        allowed: current < max,
        current,
        max_devices: max,
        remaining: max.saturating_sub(current),
        sync_supported: true,
        reason: None,
    }
}

/// First instant of the next UTC day
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    (now + Duration::days(1))
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
}
