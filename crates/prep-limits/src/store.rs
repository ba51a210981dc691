//! Usage store abstraction
//!
//! The enforcement engine never talks to a concrete database. It sees
//! caller records behind this trait, split into two logical namespaces
//! of identical shape: registered accounts and fingerprint-bound
//! anonymous sessions. The production implementation wraps the document
//! store; [`MemoryStore`] backs tests and single-process deployments.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use thiserror::Error;

use crate::model::{DeviceRecord, Namespace, UsageRecord};

/// Transient store failure; checks degrade, writes surface it
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// External persistence for usage counters and device registrations
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Load a caller record from one namespace
    async fn fetch(
        &self,
        ns: Namespace,
        caller_id: &str,
    ) -> Result<Option<UsageRecord>, StoreError>;

    /// Atomically add `amount` to a counter field.
    ///
    /// Returns `false` when the caller record is absent from `ns`; the
    /// store itself owns increment atomicity.
    async fn increment(
        &self,
        ns: Namespace,
        caller_id: &str,
        field: &str,
        amount: u64,
    ) -> Result<bool, StoreError>;

    /// Zero the daily counters and stamp `last_reset`.
    ///
    /// Returns `false` when the caller record is absent from `ns`.
    async fn reset_daily(
        &self,
        ns: Namespace,
        caller_id: &str,
        stamp: NaiveDate,
    ) -> Result<bool, StoreError>;

    /// Number of devices registered to the caller
    async fn device_count(&self, caller_id: &str) -> Result<u32, StoreError>;

    /// Devices registered to the caller
    async fn devices(&self, caller_id: &str) -> Result<Vec<DeviceRecord>, StoreError>;

    /// Insert a device registration, or replace the entry with the same
    /// fingerprint
    async fn upsert_device(
        &self,
        caller_id: &str,
        device: DeviceRecord,
    ) -> Result<(), StoreError>;
}

/// In-memory usage store
#[derive(Default)]
pub struct MemoryStore {
    registered: DashMap<String, UsageRecord>,
    anonymous: DashMap<String, UsageRecord>,
    devices: DashMap<String, Vec<DeviceRecord>>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, ns: Namespace) -> &DashMap<String, UsageRecord> {
        match ns {
            Namespace::Registered => &self.registered,
            Namespace::Anonymous => &self.anonymous,
        }
    }

    /// Seed a caller record (bootstrap and tests)
    pub fn put(&self, ns: Namespace, caller_id: &str, record: UsageRecord) {
        self.table(ns).insert(caller_id.to_string(), record);
    }

    /// Read back a caller record without going through the trait
    pub fn record(&self, ns: Namespace, caller_id: &str) -> Option<UsageRecord> {
        self.table(ns).get(caller_id).map(|r| r.clone())
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn fetch(
        &self,
        ns: Namespace,
        caller_id: &str,
    ) -> Result<Option<UsageRecord>, StoreError> {
        Ok(self.table(ns).get(caller_id).map(|r| r.clone()))
    }

    async fn increment(
        &self,
        ns: Namespace,
        caller_id: &str,
        field: &str,
        amount: u64,
    ) -> Result<bool, StoreError> {
        match self.table(ns).get_mut(caller_id) {
            Some(mut record) => match record.counter_field_mut(field) {
                Some(counter) => {
                    *counter = counter.saturating_add(amount);
                    Ok(true)
                }
                None => Ok(false),
            },
            None => Ok(false),
        }
    }

    async fn reset_daily(
        &self,
        ns: Namespace,
        caller_id: &str,
        stamp: NaiveDate,
    ) -> Result<bool, StoreError> {
        match self.table(ns).get_mut(caller_id) {
            Some(mut record) => {
                record.practice_mcqs_today = 0;
                record.explanations_used_today = 0;
                record.last_reset = stamp;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn device_count(&self, caller_id: &str) -> Result<u32, StoreError> {
        Ok(self
            .devices
            .get(caller_id)
            .map(|list| list.len() as u32)
            .unwrap_or(0))
    }

    async fn devices(&self, caller_id: &str) -> Result<Vec<DeviceRecord>, StoreError> {
        Ok(self
            .devices
            .get(caller_id)
            .map(|list| list.clone())
            .unwrap_or_default())
    }

    async fn upsert_device(
        &self,
        caller_id: &str,
        device: DeviceRecord,
    ) -> Result<(), StoreError> {
        let mut list = self.devices.entry(caller_id.to_string()).or_default();
        match list.iter_mut().find(|d| d.fingerprint == device.fingerprint) {
            Some(existing) => *existing = device,
            None => list.push(device),
        }
        Ok(())
    }
}
