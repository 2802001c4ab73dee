//! Tenant limits configuration
//!
//! The limits themselves are owned by the embedding application; this crate
//! only carries them around as named numeric values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tenant::Tenant;

/// Named numeric limits of a tenant (e.g. `MAX_TOTAL_SCHEMAS_COUNT` -> 100)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantLimitsConfiguration {
    limits: BTreeMap<String, i64>,
}

impl TenantLimitsConfiguration {
    pub fn new(limits: BTreeMap<String, i64>) -> Self {
        Self { limits }
    }

    /// Value of a named limit, if configured
    pub fn limit(&self, name: &str) -> Option<i64> {
        self.limits.get(name).copied()
    }

    pub fn with_limit(mut self, name: impl Into<String>, value: i64) -> Self {
        self.limits.insert(name.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.limits.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Converts remote tenant metadata into a limits configuration.
pub trait TenantLimitsConfigurationService: Send + Sync {
    /// Limits for a tenant loaded from the tenant manager
    fn from_tenant_metadata(&self, tenant: &Tenant) -> TenantLimitsConfiguration;

    /// Limits applied to the default tenant
    fn default_configuration_tenant(&self) -> TenantLimitsConfiguration;

    /// Whether any limits are configured at all
    fn is_configured(&self) -> bool;
}

/// Limits service that reads the tenant's resource list on top of a set of
/// default limits.
#[derive(Debug, Clone, Default)]
pub struct ResourceLimitsConfigurationService {
    defaults: TenantLimitsConfiguration,
}

impl ResourceLimitsConfigurationService {
    pub fn new(defaults: TenantLimitsConfiguration) -> Self {
        Self { defaults }
    }
}

impl TenantLimitsConfigurationService for ResourceLimitsConfigurationService {
    fn from_tenant_metadata(&self, tenant: &Tenant) -> TenantLimitsConfiguration {
        let mut limits = self.defaults.clone();
        for resource in &tenant.resources {
            limits
                .limits
                .insert(resource.resource_type.clone(), resource.limit);
        }
        limits
    }

    fn default_configuration_tenant(&self) -> TenantLimitsConfiguration {
        self.defaults.clone()
    }

    fn is_configured(&self) -> bool {
        !self.defaults.is_empty()
    }
}
