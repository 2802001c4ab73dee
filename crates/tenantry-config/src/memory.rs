//! In-memory dynamic configuration storage
//!
//! Used in tests and by single-node deployments that don't need overrides
//! to survive a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tenantry_core::config_storage::DynamicConfigStorage;
use tenantry_core::dynamic_config::DynamicConfigPropertyDto;
use tenantry_core::tenant::TenantId;
use tenantry_core::{Error, Result};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredProperty {
    property: DynamicConfigPropertyDto,
    modified_on: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InMemoryConfigStorage {
    properties: RwLock<HashMap<TenantId, HashMap<String, StoredProperty>>>,
}

impl InMemoryConfigStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DynamicConfigStorage for InMemoryConfigStorage {
    async fn get_config_properties(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<DynamicConfigPropertyDto>> {
        let properties = self.properties.read().await;
        let mut result: Vec<_> = properties
            .get(tenant_id)
            .map(|props| props.values().map(|p| p.property.clone()).collect())
            .unwrap_or_default();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn get_config_property(
        &self,
        tenant_id: &TenantId,
        name: &str,
    ) -> Result<DynamicConfigPropertyDto> {
        let properties = self.properties.read().await;
        properties
            .get(tenant_id)
            .and_then(|props| props.get(name))
            .map(|p| p.property.clone())
            .ok_or_else(|| Error::NotFoundProperty(name.to_string()))
    }

    async fn set_config_property(
        &self,
        tenant_id: &TenantId,
        property: DynamicConfigPropertyDto,
    ) -> Result<()> {
        let mut properties = self.properties.write().await;
        properties.entry(tenant_id.clone()).or_default().insert(
            property.name.clone(),
            StoredProperty {
                property,
                modified_on: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_config_property(&self, tenant_id: &TenantId, name: &str) -> Result<()> {
        let mut properties = self.properties.write().await;
        properties
            .get_mut(tenant_id)
            .and_then(|props| props.remove(name))
            .map(|_| ())
            .ok_or_else(|| Error::NotFoundProperty(name.to_string()))
    }

    async fn get_tenants_with_stale_config_properties(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TenantId>> {
        let properties = self.properties.read().await;
        let stale: BTreeSet<TenantId> = properties
            .iter()
            .filter(|(_, props)| props.values().any(|p| p.modified_on >= since))
            .map(|(tenant_id, _)| tenant_id.clone())
            .collect();
        Ok(stale.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto(name: &str, value: &str) -> DynamicConfigPropertyDto {
        DynamicConfigPropertyDto::new(name, Some(value.to_string()), "std::string::String")
    }

    #[tokio::test]
    async fn test_set_replaces_and_isolates_tenants() {
        let storage = InMemoryConfigStorage::new();
        let acme = TenantId::from_string("acme").unwrap();
        let globex = TenantId::from_string("globex").unwrap();

        storage.set_config_property(&acme, dto("app.x", "1")).await.unwrap();
        storage.set_config_property(&acme, dto("app.x", "2")).await.unwrap();

        let props = storage.get_config_properties(&acme).await.unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].value.as_deref(), Some("2"));
        assert!(storage.get_config_properties(&globex).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_property_is_not_found() {
        let storage = InMemoryConfigStorage::new();
        let acme = TenantId::from_string("acme").unwrap();

        assert!(matches!(
            storage.get_config_property(&acme, "app.x").await,
            Err(Error::NotFoundProperty(_))
        ));
        assert!(matches!(
            storage.delete_config_property(&acme, "app.x").await,
            Err(Error::NotFoundProperty(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = InMemoryConfigStorage::new();
        let acme = TenantId::from_string("acme").unwrap();
        storage.set_config_property(&acme, dto("app.x", "1")).await.unwrap();

        storage.delete_config_property(&acme, "app.x").await.unwrap();
        assert!(storage.get_config_property(&acme, "app.x").await.is_err());
    }

    #[tokio::test]
    async fn test_stale_tenants() {
        let storage = InMemoryConfigStorage::new();
        let acme = TenantId::from_string("acme").unwrap();
        let globex = TenantId::from_string("globex").unwrap();

        storage.set_config_property(&acme, dto("app.x", "1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let since = Utc::now();
        storage.set_config_property(&globex, dto("app.x", "1")).await.unwrap();

        let stale = storage.get_tenants_with_stale_config_properties(since).await.unwrap();
        assert_eq!(stale, vec![globex]);
    }
}
