//! Dynamic configuration storage trait
//!
//! The `DynamicConfigStorage` trait abstracts the durable store holding
//! per-tenant property overrides. Every call takes the tenant explicitly;
//! implementations never consult ambient request state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::dynamic_config::DynamicConfigPropertyDto;
use crate::tenant::TenantId;
use crate::Result;

/// Durable store of dynamic configuration overrides
///
/// Implementations:
/// - `InMemoryConfigStorage`: process-local map (tests, standalone)
/// - `PostgresConfigStorage`: `config_properties` table
///
/// # Example
/// ```no_run
/// # use tenantry_core::config_storage::DynamicConfigStorage;
/// # use tenantry_core::tenant::TenantId;
/// # async fn example(storage: &dyn DynamicConfigStorage) -> tenantry_core::Result<()> {
/// let tenant_id = TenantId::from_string("acme")?;
/// let overrides = storage.get_config_properties(&tenant_id).await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait DynamicConfigStorage: Send + Sync {
    /// All stored overrides of a tenant
    ///
    /// # Errors
    /// - `Error::Storage` for backend errors
    async fn get_config_properties(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<DynamicConfigPropertyDto>>;

    /// A single stored override
    ///
    /// # Errors
    /// - `Error::NotFoundProperty` if the tenant has no override for `name`
    /// - `Error::Storage` for backend errors
    async fn get_config_property(
        &self,
        tenant_id: &TenantId,
        name: &str,
    ) -> Result<DynamicConfigPropertyDto>;

    /// Create or replace an override and bump its modification time
    async fn set_config_property(
        &self,
        tenant_id: &TenantId,
        property: DynamicConfigPropertyDto,
    ) -> Result<()>;

    /// Remove an override
    ///
    /// # Errors
    /// - `Error::NotFoundProperty` if nothing was deleted
    async fn delete_config_property(&self, tenant_id: &TenantId, name: &str) -> Result<()>;

    /// Tenants with at least one override modified at or after `since`
    async fn get_tenants_with_stale_config_properties(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TenantId>>;
}
