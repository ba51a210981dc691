//! Device registration under tier caps
//!
//! Registration is idempotent per fingerprint: a device re-registering
//! refreshes its metadata without consuming a slot, even when the caller
//! sits at the cap.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use prep_common::{PrepError, PrepResult};

use crate::limits::device_check;
use crate::model::{DeviceRecord, Tier};
use crate::policy::PolicyTable;
use crate::store::UsageStore;

/// Tier-aware device registry over the usage store
pub struct DeviceRegistry {
    policies: Arc<PolicyTable>,
    store: Arc<dyn UsageStore>,
}

impl DeviceRegistry {
    /// New registry over a policy table and store
    pub fn new(policies: Arc<PolicyTable>, store: Arc<dyn UsageStore>) -> Self {
        Self { policies, store }
    }

    /// Register a device, or refresh an existing registration.
    ///
    /// Known fingerprints always succeed and keep their slot. New
    /// devices pass the tier cap first; tiers without sync deny
    /// outright.
    pub async fn register(
        &self,
        caller_id: &str,
        tier: Tier,
        fingerprint: &str,
        platform: &str,
    ) -> PrepResult<DeviceRecord> {
        let policy = self.policies.get(tier);
        let mut devices = self
            .store
            .devices(caller_id)
            .await
            .map_err(|err| PrepError::StoreUnavailable(err.to_string()))?;

        if let Some(existing) = devices.iter_mut().find(|d| d.fingerprint == fingerprint) {
            existing.last_active = Utc::now();
            existing.platform = platform.to_string();
            let refreshed = existing.clone();
            self.store
                .upsert_device(caller_id, refreshed.clone())
                .await
                .map_err(|err| PrepError::StoreUnavailable(err.to_string()))?;
            info!(caller = caller_id, fingerprint, "refreshed device registration");
            return Ok(refreshed);
        }

        let check = device_check(policy, devices.len() as u32);
        if !check.sync_supported {
            warn!(caller = caller_id, tier = %tier, "device registration denied, sync not in tier");
            return Err(PrepError::SyncNotSupported);
        }
        if !check.allowed {
            warn!(
                caller = caller_id,
                current = check.current,
                max = check.max_devices,
                "device registration denied, cap reached"
            );
            return Err(PrepError::DeviceLimitExceeded {
                current: check.current,
                max: check.max_devices,
            });
        }

        let record = DeviceRecord::new(fingerprint, platform, Utc::now());
        self.store
            .upsert_device(caller_id, record.clone())
            .await
            .map_err(|err| PrepError::StoreUnavailable(err.to_string()))?;
        info!(caller = caller_id, fingerprint, "registered device");
        Ok(record)
    }

    /// Devices currently registered to the caller
    pub async fn list(&self, caller_id: &str) -> PrepResult<Vec<DeviceRecord>> {
        self.store
            .devices(caller_id)
            .await
            .map_err(|err| PrepError::StoreUnavailable(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> (DeviceRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            DeviceRegistry::new(Arc::new(PolicyTable::new()), store.clone()),
            store,
        )
    }

    #[tokio::test]
    async fn test_register_under_cap() {
        let (registry, _store) = registry();

        let record = registry
            .register("user_1", Tier::Paid, "fp_a", "ios")
            .await
            .unwrap();

        assert_eq!(record.fingerprint, "fp_a");
        assert_eq!(registry.list("user_1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_denied_at_cap() {
        let (registry, _store) = registry();
        registry.register("user_1", Tier::Free, "fp_a", "ios").await.unwrap();

        let err = registry
            .register("user_1", Tier::Free, "fp_b", "android")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PrepError::DeviceLimitExceeded { current: 1, max: 1 }
        ));
        assert_eq!(registry.list("user_1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reregister_at_cap_keeps_slot() {
        let (registry, _store) = registry();
        let first = registry.register("user_1", Tier::Free, "fp_a", "ios").await.unwrap();

        let refreshed = registry
            .register("user_1", Tier::Free, "fp_a", "ipados")
            .await
            .unwrap();

        assert_eq!(refreshed.id, first.id);
        assert_eq!(refreshed.platform, "ipados");
        assert_eq!(registry.list("user_1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_denied_without_sync() {
        let (registry, _store) = registry();

        let err = registry
            .register("fp_guest", Tier::Anonymous, "fp_a", "web")
            .await
            .unwrap_err();

        assert!(matches!(err, PrepError::SyncNotSupported));
        assert!(registry.list("fp_guest").await.unwrap().is_empty());
    }
}
