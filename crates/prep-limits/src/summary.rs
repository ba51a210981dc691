//! Caller-facing usage summary
//!
//! One snapshot of every daily, lifetime, and device figure at once, so
//! clients render their quota screens from a single call.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use prep_common::{PrepError, PrepResult};

use crate::limits::{DeviceCheck, QuotaEnforcer};
use crate::model::{Feature, Limit, Tier};

/// Usage against one feature's ceiling
#[derive(Debug, Clone, Serialize)]
pub struct FeatureUsage {
    /// Counter value
    pub current: u64,
    /// Ceiling applied
    pub limit: Limit,
    /// Uses left
    pub remaining: Limit,
    /// Next UTC midnight, for daily features only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

/// Consolidated usage snapshot for one caller
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    /// Caller the snapshot describes
    pub caller_id: String,
    /// Tier the figures were computed under
    pub tier: Tier,
    /// Daily features keyed by name
    pub daily_usage: BTreeMap<&'static str, FeatureUsage>,
    /// Lifetime features keyed by name
    pub total_usage: BTreeMap<&'static str, FeatureUsage>,
    /// Device registration state
    pub device_info: DeviceCheck,
}

impl QuotaEnforcer {
    /// Build the consolidated snapshot for a caller.
    ///
    /// A caller absent from both namespaces yields
    /// [`PrepError::CallerNotFound`] as a value, so callers can
    /// distinguish "not found" from "has zero usage".
    pub async fn usage_summary(&self, caller_id: &str, tier: Tier) -> PrepResult<UsageSummary> {
        let record = self
            .load_record(caller_id)
            .await
            .map_err(|err| PrepError::StoreUnavailable(err.to_string()))?
            .ok_or_else(|| PrepError::CallerNotFound(caller_id.to_string()))?;

        let mut daily_usage = BTreeMap::new();
        for feature in Feature::DAILY {
            let check = self.check_daily(tier, feature, record.counter(feature));
            daily_usage.insert(
                feature.as_str(),
                FeatureUsage {
                    current: check.current,
                    limit: check.limit,
                    remaining: check.remaining,
                    reset_at: check.reset_at,
                },
            );
        }

        let mut total_usage = BTreeMap::new();
        for feature in Feature::TOTAL {
            let check = self.check_total(tier, feature, record.counter(feature));
            total_usage.insert(
                feature.as_str(),
                FeatureUsage {
                    current: check.current,
                    limit: check.limit,
                    remaining: check.remaining,
                    reset_at: None,
                },
            );
        }

        let device_count = self.device_count_or_zero(caller_id).await;
        let device_info = self.check_devices(tier, device_count);

        Ok(UsageSummary {
            caller_id: caller_id.to_string(),
            tier,
            daily_usage,
            total_usage,
            device_info,
        })
    }
}
