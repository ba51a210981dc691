//! PrepGate Limits - Tier-Based Usage Governance
//!
//! Decides, per caller and per feature, whether usage may proceed under
//! the caller's subscription tier, and records admitted usage against
//! the external usage store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     USAGE GOVERNANCE CORE                        │
//! │                                                                  │
//! │  ┌────────────────┐      ┌──────────────────────────────────┐   │
//! │  │  POLICY TABLE  │◄─────│         QUOTA ENFORCER           │   │
//! │  │ anonymous/free │      │  check_daily / check_total /     │   │
//! │  │     /paid      │      │  check_devices / record_usage    │   │
//! │  └────────────────┘      └───────────────┬──────────────────┘   │
//! │          ▲                               │                      │
//! │          │               ┌───────────────▼──────────────────┐   │
//! │  ┌───────┴────────┐      │          USAGE STORE             │   │
//! │  │ DEVICE REGISTRY│─────►│  registered | anonymous records  │   │
//! │  └────────────────┘      └──────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Read checks fail open when the store is unreachable; writes surface
//! failure so counters never silently drift.

#![warn(missing_docs)]

pub mod devices;
pub mod limits;
pub mod model;
pub mod policy;
pub mod store;
pub mod summary;

pub use devices::DeviceRegistry;
pub use limits::{DeviceCheck, QuotaCheck, QuotaDecision, QuotaEnforcer, UsageKind};
pub use model::{DeviceRecord, Feature, Limit, Namespace, RatePeriod, Tier, UsageRecord};
pub use policy::{PolicyTable, TierPolicy};
pub use store::{MemoryStore, StoreError, UsageStore};
pub use summary::{FeatureUsage, UsageSummary};
