//! Tier policy table
//!
//! Single source of truth for per-tier quotas, rate ceilings, and device
//! entitlements. Built once at startup, shared read-only by reference.

use serde::Serialize;

use prep_common::PrepResult;

use crate::model::{Feature, Limit, RatePeriod, Tier};

/// Request-rate ceilings for a tier
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimits {
    /// Requests allowed in any trailing 60 seconds
    pub requests_per_minute: u32,
    /// Requests allowed in any trailing hour
    pub requests_per_hour: u32,
}

/// Device-sync entitlements for a tier
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeviceFeatures {
    /// Whether the tier may sync across devices at all
    pub device_sync: bool,
    /// Registered-device cap once sync is enabled
    pub max_devices: u32,
}

/// Limits and entitlements for one tier
#[derive(Debug, Clone, Serialize)]
pub struct TierPolicy {
    /// The tier this policy applies to
    pub tier: Tier,
    /// Display name
    pub name: &'static str,
    /// Display description
    pub description: &'static str,
    /// Daily ceiling on practice questions
    pub daily_practice_mcqs: Limit,
    /// Daily ceiling on explanations
    pub daily_explanations: Limit,
    /// Lifetime ceiling on sprint exams
    pub total_sprint_exams: Limit,
    /// Lifetime ceiling on simulated exams
    pub total_simulated_exams: Limit,
    /// Request-rate ceilings
    pub rate_limits: RateLimits,
    /// Device-sync entitlements
    pub features: DeviceFeatures,
    /// Trial length for tiers that carry one
    pub trial_period_days: Option<u32>,
}

impl TierPolicy {
    /// Build the policy for a tier
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Anonymous => Self {
                tier,
                name: "Anonymous User",
                description: "Limited access for guest users",
                daily_practice_mcqs: Limit::Finite(20),
                daily_explanations: Limit::Finite(2),
                total_sprint_exams: Limit::Finite(1),
                total_simulated_exams: Limit::Finite(1),
                rate_limits: RateLimits {
                    requests_per_minute: 30,
                    requests_per_hour: 100,
                },
                features: DeviceFeatures {
                    device_sync: false,
                    max_devices: 0,
                },
                trial_period_days: None,
            },
            Tier::Free => Self {
                tier,
                name: "Free User",
                description: "Basic access with trial period",
                daily_practice_mcqs: Limit::Finite(50),
                daily_explanations: Limit::Finite(4),
                total_sprint_exams: Limit::Finite(4),
                total_simulated_exams: Limit::Finite(2),
                rate_limits: RateLimits {
                    requests_per_minute: 60,
                    requests_per_hour: 500,
                },
                features: DeviceFeatures {
                    device_sync: true,
                    max_devices: 1,
                },
                trial_period_days: Some(14),
            },
            Tier::Paid => Self {
                tier,
                name: "Paid User",
                description: "Full access with premium features",
                daily_practice_mcqs: Limit::Unlimited,
                // fair usage cap
                daily_explanations: Limit::Finite(100),
                total_sprint_exams: Limit::Unlimited,
                total_simulated_exams: Limit::Unlimited,
                rate_limits: RateLimits {
                    requests_per_minute: 300,
                    requests_per_hour: 5000,
                },
                features: DeviceFeatures {
                    device_sync: true,
                    max_devices: 3,
                },
                trial_period_days: None,
            },
        }
    }

    /// Daily ceiling for a feature; features without one fail closed to zero
    pub fn daily_limit(&self, feature: Feature) -> Limit {
        match feature {
            Feature::PracticeMcqs => self.daily_practice_mcqs,
            Feature::Explanations => self.daily_explanations,
            _ => Limit::ZERO,
        }
    }

    /// Lifetime ceiling for a feature; features without one fail closed to zero
    pub fn total_limit(&self, feature: Feature) -> Limit {
        match feature {
            Feature::SprintExams => self.total_sprint_exams,
            Feature::SimulatedExams => self.total_simulated_exams,
            _ => Limit::ZERO,
        }
    }

    /// Request ceiling for a rate window
    pub fn rate_limit(&self, period: RatePeriod) -> u32 {
        match period {
            RatePeriod::PerMinute => self.rate_limits.requests_per_minute,
            RatePeriod::PerHour => self.rate_limits.requests_per_hour,
        }
    }

    /// Whether the tier may register sync devices
    pub fn supports_device_sync(&self) -> bool {
        self.features.device_sync
    }

    /// Registered-device cap
    pub fn max_devices(&self) -> u32 {
        self.features.max_devices
    }

    /// Trial length, for tiers that carry one
    pub fn trial_period(&self) -> Option<chrono::Duration> {
        self.trial_period_days
            .map(|days| chrono::Duration::days(i64::from(days)))
    }
}

/// Immutable tier → policy mapping
///
/// Constructed once at process start and injected wherever limits are
/// consulted; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    anonymous: TierPolicy,
    free: TierPolicy,
    paid: TierPolicy,
}

impl PolicyTable {
    /// Build the table for the three built-in tiers
    pub fn new() -> Self {
        Self {
            anonymous: TierPolicy::for_tier(Tier::Anonymous),
            free: TierPolicy::for_tier(Tier::Free),
            paid: TierPolicy::for_tier(Tier::Paid),
        }
    }

    /// Policy for a tier
    pub fn get(&self, tier: Tier) -> &TierPolicy {
        match tier {
            Tier::Anonymous => &self.anonymous,
            Tier::Free => &self.free,
            Tier::Paid => &self.paid,
        }
    }

    /// Policy for a tier by wire name; unknown names are a caller error
    pub fn resolve(&self, label: &str) -> PrepResult<&TierPolicy> {
        Ok(self.get(Tier::parse(label)?))
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_limits_match_table() {
        let table = PolicyTable::new();

        assert_eq!(
            table.get(Tier::Anonymous).daily_limit(Feature::PracticeMcqs),
            Limit::Finite(20)
        );
        assert_eq!(
            table.get(Tier::Anonymous).daily_limit(Feature::Explanations),
            Limit::Finite(2)
        );
        assert_eq!(
            table.get(Tier::Free).daily_limit(Feature::PracticeMcqs),
            Limit::Finite(50)
        );
        assert_eq!(
            table.get(Tier::Free).daily_limit(Feature::Explanations),
            Limit::Finite(4)
        );
        assert_eq!(
            table.get(Tier::Paid).daily_limit(Feature::PracticeMcqs),
            Limit::Unlimited
        );
        assert_eq!(
            table.get(Tier::Paid).daily_limit(Feature::Explanations),
            Limit::Finite(100)
        );
    }

    #[test]
    fn test_total_limits_match_table() {
        let table = PolicyTable::new();

        assert_eq!(
            table.get(Tier::Anonymous).total_limit(Feature::SprintExams),
            Limit::Finite(1)
        );
        assert_eq!(
            table.get(Tier::Anonymous).total_limit(Feature::SimulatedExams),
            Limit::Finite(1)
        );
        assert_eq!(
            table.get(Tier::Free).total_limit(Feature::SprintExams),
            Limit::Finite(4)
        );
        assert_eq!(
            table.get(Tier::Free).total_limit(Feature::SimulatedExams),
            Limit::Finite(2)
        );
        assert_eq!(
            table.get(Tier::Paid).total_limit(Feature::SprintExams),
            Limit::Unlimited
        );
        assert_eq!(
            table.get(Tier::Paid).total_limit(Feature::SimulatedExams),
            Limit::Unlimited
        );
    }

    #[test]
    fn test_rate_limits_match_table() {
        let table = PolicyTable::new();

        assert_eq!(table.get(Tier::Anonymous).rate_limit(RatePeriod::PerMinute), 30);
        assert_eq!(table.get(Tier::Anonymous).rate_limit(RatePeriod::PerHour), 100);
        assert_eq!(table.get(Tier::Free).rate_limit(RatePeriod::PerMinute), 60);
        assert_eq!(table.get(Tier::Free).rate_limit(RatePeriod::PerHour), 500);
        assert_eq!(table.get(Tier::Paid).rate_limit(RatePeriod::PerMinute), 300);
        assert_eq!(table.get(Tier::Paid).rate_limit(RatePeriod::PerHour), 5000);
    }

    #[test]
    fn test_device_entitlements() {
        let table = PolicyTable::new();

        assert!(!table.get(Tier::Anonymous).supports_device_sync());
        assert_eq!(table.get(Tier::Anonymous).max_devices(), 0);
        assert!(table.get(Tier::Free).supports_device_sync());
        assert_eq!(table.get(Tier::Free).max_devices(), 1);
        assert!(table.get(Tier::Paid).supports_device_sync());
        assert_eq!(table.get(Tier::Paid).max_devices(), 3);
    }

    #[test]
    fn test_missing_feature_keys_fail_closed() {
        let table = PolicyTable::new();

        // A lifetime feature has no daily ceiling, and vice versa.
        assert_eq!(
            table.get(Tier::Paid).daily_limit(Feature::SprintExams),
            Limit::ZERO
        );
        assert_eq!(
            table.get(Tier::Paid).total_limit(Feature::PracticeMcqs),
            Limit::ZERO
        );
    }

    #[test]
    fn test_trial_period() {
        let table = PolicyTable::new();

        assert_eq!(table.get(Tier::Free).trial_period_days, Some(14));
        assert_eq!(table.get(Tier::Anonymous).trial_period_days, None);
        assert_eq!(table.get(Tier::Paid).trial_period_days, None);
        assert_eq!(
            table.get(Tier::Free).trial_period(),
            Some(chrono::Duration::days(14))
        );
    }

    #[test]
    fn test_resolve_by_label() {
        let table = PolicyTable::new();

        assert_eq!(table.resolve("paid").unwrap().tier, Tier::Paid);
        assert!(table.resolve("enterprise").is_err());
    }
}
