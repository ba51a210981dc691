//! Caller and usage data model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use prep_common::{PrepError, PrepResult};

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Guest access bound to a device fingerprint
    Anonymous,
    /// Registered account without a subscription
    #[default]
    Free,
    /// Active subscription
    Paid,
}

impl Tier {
    /// Every tier in the policy table
    pub const ALL: [Tier; 3] = [Tier::Anonymous, Tier::Free, Tier::Paid];

    /// Tier applied when the identity context resolves no tier
    pub const DEFAULT: Tier = Tier::Free;

    /// Resolve a tier from its wire name; unknown names are a caller error
    pub fn parse(s: &str) -> PrepResult<Self> {
        match s {
            "anonymous" => Ok(Self::Anonymous),
            "free" => Ok(Self::Free),
            "paid" => Ok(Self::Paid),
            other => Err(PrepError::UnknownTier(other.to_string())),
        }
    }

    /// Wire name of the tier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Free => "free",
            Self::Paid => "paid",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quota-bound feature of the exam-prep API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Practice multiple-choice questions served
    PracticeMcqs,
    /// Answer explanations viewed
    Explanations,
    /// Sprint exams created
    SprintExams,
    /// Simulated exams created
    SimulatedExams,
}

impl Feature {
    /// Features governed by a daily ceiling
    pub const DAILY: [Feature; 2] = [Feature::PracticeMcqs, Feature::Explanations];

    /// Features governed by a lifetime ceiling
    pub const TOTAL: [Feature; 2] = [Feature::SprintExams, Feature::SimulatedExams];

    /// Resolve a feature from its name or its counter field name.
    ///
    /// Both spellings appear at call sites: quota checks pass the feature
    /// name, usage recording often passes the stored field.
    pub fn parse(s: &str) -> PrepResult<Self> {
        match s {
            "practice_mcqs" | "practice_mcqs_today" => Ok(Self::PracticeMcqs),
            "explanations" | "explanations_used_today" => Ok(Self::Explanations),
            "sprint_exams" | "sprint_exams_used" => Ok(Self::SprintExams),
            "simulated_exams" | "simulated_exams_used" => Ok(Self::SimulatedExams),
            other => Err(PrepError::UnknownFeature(other.to_string())),
        }
    }

    /// Canonical feature name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PracticeMcqs => "practice_mcqs",
            Self::Explanations => "explanations",
            Self::SprintExams => "sprint_exams",
            Self::SimulatedExams => "simulated_exams",
        }
    }

    /// Store field holding this feature's usage counter
    pub fn counter_field(&self) -> &'static str {
        match self {
            Self::PracticeMcqs => "practice_mcqs_today",
            Self::Explanations => "explanations_used_today",
            Self::SprintExams => "sprint_exams_used",
            Self::SimulatedExams => "simulated_exams_used",
        }
    }

    /// Whether the feature resets at UTC midnight
    pub fn is_daily(&self) -> bool {
        matches!(self, Self::PracticeMcqs | Self::Explanations)
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A quota ceiling: a finite count or unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// Ceiling of `n` uses
    Finite(u64),
    /// No ceiling
    Unlimited,
}

impl Limit {
    /// Fail-closed ceiling for features a tier does not define
    pub const ZERO: Limit = Limit::Finite(0);

    /// True only for the unlimited sentinel, never for a finite value
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// Whether one more use is allowed at `current`
    pub fn allows(&self, current: u64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Finite(n) => current < *n,
        }
    }

    /// Uses left at `current`, saturating at zero
    pub fn remaining(&self, current: u64) -> Limit {
        match self {
            Self::Unlimited => Self::Unlimited,
            Self::Finite(n) => Self::Finite(n.saturating_sub(current)),
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Finite(n) => serializer.serialize_u64(*n),
            Self::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

impl std::fmt::Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Finite(n) => write!(f, "{n}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Request-rate window kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatePeriod {
    /// Trailing 60 seconds
    PerMinute,
    /// Trailing 3600 seconds
    PerHour,
}

impl RatePeriod {
    /// Window length in seconds
    pub fn window_secs(&self) -> i64 {
        match self {
            Self::PerMinute => 60,
            Self::PerHour => 3600,
        }
    }
}

/// Logical store namespace a caller record lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Registered accounts
    Registered,
    /// Fingerprint-bound guest sessions
    Anonymous,
}

impl Namespace {
    /// A caller id may resolve to either namespace; lookups try them in
    /// this order.
    pub const LOOKUP_ORDER: [Namespace; 2] = [Namespace::Registered, Namespace::Anonymous];
}

/// Per-caller usage counters, as held by the usage store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Practice questions served since the last daily reset
    pub practice_mcqs_today: u64,
    /// Explanations viewed since the last daily reset
    pub explanations_used_today: u64,
    /// Sprint exams created, lifetime
    pub sprint_exams_used: u64,
    /// Simulated exams created, lifetime
    pub simulated_exams_used: u64,
    /// UTC date of the last daily reset
    pub last_reset: NaiveDate,
}

impl UsageRecord {
    /// The all-zero record a caller starts with
    pub fn fresh(today: NaiveDate) -> Self {
        Self {
            practice_mcqs_today: 0,
            explanations_used_today: 0,
            sprint_exams_used: 0,
            simulated_exams_used: 0,
            last_reset: today,
        }
    }

    /// Current counter value for a feature
    pub fn counter(&self, feature: Feature) -> u64 {
        match feature {
            Feature::PracticeMcqs => self.practice_mcqs_today,
            Feature::Explanations => self.explanations_used_today,
            Feature::SprintExams => self.sprint_exams_used,
            Feature::SimulatedExams => self.simulated_exams_used,
        }
    }

    /// Mutable counter addressed by its store field name
    pub fn counter_field_mut(&mut self, field: &str) -> Option<&mut u64> {
        match field {
            "practice_mcqs_today" => Some(&mut self.practice_mcqs_today),
            "explanations_used_today" => Some(&mut self.explanations_used_today),
            "sprint_exams_used" => Some(&mut self.sprint_exams_used),
            "simulated_exams_used" => Some(&mut self.simulated_exams_used),
            _ => None,
        }
    }
}

/// A device registered for cross-device sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Registration id
    pub id: Uuid,
    /// Stable client fingerprint
    pub fingerprint: String,
    /// Client-reported platform label
    pub platform: String,
    /// First registration time
    pub registered_at: DateTime<Utc>,
    /// Last time the device checked in
    pub last_active: DateTime<Utc>,
}

impl DeviceRecord {
    /// New registration stamped at `now`
    pub fn new(fingerprint: &str, platform: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            fingerprint: fingerprint.to_string(),
            platform: platform.to_string(),
            registered_at: now,
            last_active: now,
        }
    }
}
