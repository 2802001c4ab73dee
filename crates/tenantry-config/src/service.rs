//! Dynamic configuration service
//!
//! Values are resolved through two caches:
//! 1. a per-tenant cache, bulk loaded from storage the first time a tenant
//!    is seen, holding that tenant's overrides
//! 2. a global cache holding the static configuration value (or the
//!    declared default) of each property
//!
//! Tenant caches are dropped by [`DynamicConfigService::invalidate_tenant`]
//! and by the refresh job when storage reports newer overrides.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tenantry_core::config_source::ConfigSource;
use tenantry_core::config_storage::DynamicConfigStorage;
use tenantry_core::dynamic_config::{
    DynamicConfigPropertyDef, DynamicConfigPropertyDto, FromPropertyValue, PropertyValue,
};
use tenantry_core::tenant::TenantId;
use tenantry_core::{Error, Result};
use tokio::sync::{Mutex, OnceCell};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// A cached lookup result; `Null` records that nothing is configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Value(PropertyValue),
    Null,
}

impl From<Option<PropertyValue>> for CachedValue {
    fn from(value: Option<PropertyValue>) -> Self {
        value.map_or(CachedValue::Null, CachedValue::Value)
    }
}

type TenantPropertyCache = HashMap<String, CachedValue>;

/// Settings of the dynamic configuration subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicConfigSettings {
    /// Period of the refresh job
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl Default for DynamicConfigSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl DynamicConfigSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

fn default_refresh_interval_secs() -> u64 {
    30
}

/// Result of one refresh run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Another run was in progress
    Skipped,
    /// First run; only the timestamp was recorded
    Initialized,
    /// Caches of the listed number of tenants were dropped
    Completed { invalidated: usize },
    /// The storage query failed; the previous timestamp is kept
    Failed(Error),
}

pub struct DynamicConfigService {
    storage: Arc<dyn DynamicConfigStorage>,
    config: Arc<dyn ConfigSource>,
    global_cache: DashMap<String, Arc<OnceCell<CachedValue>>>,
    tenant_caches: DashMap<TenantId, Arc<OnceCell<TenantPropertyCache>>>,
    refresh_running: AtomicBool,
    last_refresh: Mutex<Option<DateTime<Utc>>>,
}

impl DynamicConfigService {
    pub fn new(storage: Arc<dyn DynamicConfigStorage>, config: Arc<dyn ConfigSource>) -> Self {
        Self {
            storage,
            config,
            global_cache: DashMap::new(),
            tenant_caches: DashMap::new(),
            refresh_running: AtomicBool::new(false),
            last_refresh: Mutex::new(None),
        }
    }

    /// Effective value of `property` for `tenant_id`
    ///
    /// # Errors
    /// - `Error::NotFoundProperty` if neither an override, a configured value
    ///   nor a default exists
    /// - `Error::InvalidPropertyValue` if the value can't be read as `T`
    pub async fn get<T: FromPropertyValue>(
        &self,
        tenant_id: &TenantId,
        property: &DynamicConfigPropertyDef,
    ) -> Result<T> {
        self.get_optional(tenant_id, property)
            .await?
            .ok_or_else(|| Error::NotFoundProperty(property.name().to_string()))
    }

    /// Effective value of `property`, `None` if nothing is configured
    pub async fn get_optional<T: FromPropertyValue>(
        &self,
        tenant_id: &TenantId,
        property: &DynamicConfigPropertyDef,
    ) -> Result<Option<T>> {
        match self.resolve(tenant_id, property).await? {
            CachedValue::Value(value) => T::from_property_value(property.name(), &value).map(Some),
            CachedValue::Null => Ok(None),
        }
    }

    /// Store an override for `tenant_id`.
    ///
    /// Cached values are left alone; the tenant sees the new value once its
    /// cache is invalidated directly or by the refresh job.
    pub async fn set(
        &self,
        tenant_id: &TenantId,
        property: &DynamicConfigPropertyDef,
        value: Option<PropertyValue>,
    ) -> Result<()> {
        let dto = DynamicConfigPropertyDto::create(property.name(), value.as_ref());
        debug!(tenant_id = %tenant_id, "Storing dynamic property {}", property.name());
        self.storage.set_config_property(tenant_id, dto).await
    }

    /// Remove the override of `tenant_id`; caches are left alone as in [`set`](Self::set)
    pub async fn delete(&self, tenant_id: &TenantId, property: &DynamicConfigPropertyDef) -> Result<()> {
        self.storage
            .delete_config_property(tenant_id, property.name())
            .await
    }

    /// Drop the cached overrides of a tenant
    pub fn invalidate_tenant(&self, tenant_id: &TenantId) {
        if self.tenant_caches.remove(tenant_id).is_some() {
            debug!(tenant_id = %tenant_id, "Invalidated dynamic config cache");
        }
    }

    /// Run one refresh pass. Overlapping calls are skipped.
    pub async fn refresh(&self) -> RefreshOutcome {
        if self
            .refresh_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Config property refresh already running, skipping");
            return RefreshOutcome::Skipped;
        }

        let _guard = RefreshGuard(&self.refresh_running);
        self.refresh_stale_tenants().await
    }

    async fn refresh_stale_tenants(&self) -> RefreshOutcome {
        let now = Utc::now();
        let mut last_refresh = self.last_refresh.lock().await;
        debug!("Running config property refresh job at {}", now);

        let outcome = match *last_refresh {
            None => RefreshOutcome::Initialized,
            Some(since) => match self
                .storage
                .get_tenants_with_stale_config_properties(since)
                .await
            {
                Ok(tenants) => {
                    for tenant_id in &tenants {
                        self.invalidate_tenant(tenant_id);
                    }
                    RefreshOutcome::Completed {
                        invalidated: tenants.len(),
                    }
                }
                Err(e) => {
                    error!("Exception thrown when running config property refresh job: {}", e);
                    return RefreshOutcome::Failed(e);
                }
            },
        };

        *last_refresh = Some(now);
        outcome
    }

    /// Run [`refresh`](Self::refresh) every `interval` until the returned
    /// handle is shut down
    pub fn spawn_refresh_task(self: &Arc<Self>, interval: Duration) -> RefreshTask {
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
        let service = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!("Starting config property refresh task (interval: {:?})", interval);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Config property refresh task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let RefreshOutcome::Completed { invalidated } = service.refresh().await
                            && invalidated > 0
                        {
                            debug!("Refresh invalidated {} tenant caches", invalidated);
                        }
                    }
                }
            }
        });

        RefreshTask { shutdown_tx }
    }

    async fn resolve(
        &self,
        tenant_id: &TenantId,
        property: &DynamicConfigPropertyDef,
    ) -> Result<CachedValue> {
        let tenant_cache = self
            .tenant_caches
            .entry(tenant_id.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let overrides = tenant_cache
            .get_or_try_init(|| self.load_tenant_properties(tenant_id))
            .await?;

        if let Some(value @ CachedValue::Value(_)) = overrides.get(property.name()) {
            return Ok(value.clone());
        }

        self.global_value(property).await
    }

    async fn load_tenant_properties(&self, tenant_id: &TenantId) -> Result<TenantPropertyCache> {
        let properties = self.storage.get_config_properties(tenant_id).await?;
        debug!(
            tenant_id = %tenant_id,
            "Loaded {} dynamic property overrides",
            properties.len()
        );

        properties
            .into_iter()
            .map(|dto| -> Result<(String, CachedValue)> {
                let value = CachedValue::from(dto.to_property_value()?);
                Ok((dto.name, value))
            })
            .collect()
    }

    async fn global_value(&self, property: &DynamicConfigPropertyDef) -> Result<CachedValue> {
        let cell = self
            .global_cache
            .entry(property.name().to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_try_init(|| async {
            let configured = self.config.get_value(property.name()).await?;
            let raw = configured.or_else(|| property.default_value().map(str::to_string));
            match raw {
                Some(raw) => property.parse_value(&raw).map(CachedValue::Value),
                None => Ok(CachedValue::Null),
            }
        })
        .await
        .cloned()
    }
}

struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle for the background refresh task
pub struct RefreshTask {
    shutdown_tx: tokio::sync::mpsc::Sender<()>,
}

impl RefreshTask {
    /// Signal the refresh task to stop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
