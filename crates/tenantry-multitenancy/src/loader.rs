//! Tenant context loading and caching
//!
//! Tenant contexts are fetched from the tenant manager on first use and
//! cached with a time-to-live and a size bound. Concurrent loads of the same
//! tenant share one remote call.

use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tenantry_core::limits::TenantLimitsConfigurationService;
use tenantry_core::tenant::{ApicurioTenantContext, Tenant, TenantId, TenantStatus};
use tenantry_core::{Error, Result};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::MultitenancyConfig;
use crate::service::TenantManagerService;

/// Authorization hook applied to request-scoped loads
#[async_trait]
pub trait TenantAuthorizer: Send + Sync {
    /// # Errors
    /// - `Error::TenantNotAuthorized` / `Error::TenantForbidden` to reject the request
    async fn authorize_tenant(&self, context: &ApicurioTenantContext) -> Result<()>;
}

type LoadResult = Result<Arc<ApicurioTenantContext>>;

/// A load shared by concurrent callers of one tenant
#[derive(Default)]
struct InFlightLoad {
    result: OnceCell<LoadResult>,
    /// Set when the tenant is invalidated while the load runs
    invalidated: AtomicBool,
}

impl InFlightLoad {
    fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }
}

/// Loads [`ApicurioTenantContext`] values and caches them
pub struct TenantContextLoader {
    cache: Cache<TenantId, Arc<ApicurioTenantContext>>,
    in_flight: DashMap<TenantId, Arc<InFlightLoad>>,
    tenant_manager: TenantManagerService,
    limits_service: Arc<dyn TenantLimitsConfigurationService>,
    authorizer: Option<Arc<dyn TenantAuthorizer>>,
    authorization_enabled: bool,
    standalone: bool,
    default_context: once_cell::sync::OnceCell<Arc<ApicurioTenantContext>>,
}

impl TenantContextLoader {
    pub fn new(
        config: &MultitenancyConfig,
        tenant_manager: TenantManagerService,
        limits_service: Arc<dyn TenantLimitsConfigurationService>,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.cache.max_size)
            .time_to_live(config.cache.time_to_live())
            .build();

        Self {
            cache,
            in_flight: DashMap::new(),
            tenant_manager,
            limits_service,
            authorizer: None,
            authorization_enabled: config.authorization_enabled,
            standalone: config.enabled && config.standalone,
            default_context: once_cell::sync::OnceCell::new(),
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn TenantAuthorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Context of a tenant for an inbound request, authorization applied
    pub async fn load_request_context(&self, tenant_id: &TenantId) -> LoadResult {
        if tenant_id.is_default() {
            return Ok(self.default_tenant_context());
        }

        let context = self.load(tenant_id).await?;

        if self.authorization_enabled
            && let Some(authorizer) = &self.authorizer
        {
            authorizer.authorize_tenant(&context).await?;
        }

        Ok(context)
    }

    /// Context of a tenant for internal work without a calling user
    pub async fn load_batch_job_context(&self, tenant_id: &TenantId) -> LoadResult {
        if tenant_id.is_default() {
            return Ok(self.default_tenant_context());
        }
        self.load(tenant_id).await
    }

    /// Context of the default tenant, built once per loader
    pub fn default_tenant_context(&self) -> Arc<ApicurioTenantContext> {
        self.default_context
            .get_or_init(|| {
                Arc::new(ApicurioTenantContext::default_tenant(
                    self.limits_service.default_configuration_tenant(),
                ))
            })
            .clone()
    }

    pub async fn invalidate_tenant_in_cache(&self, tenant_id: &TenantId) {
        if let Some((_, load)) = self.in_flight.remove(tenant_id) {
            load.invalidate();
        }
        self.cache.invalidate(tenant_id).await;
        debug!(tenant_id = %tenant_id, "Invalidated tenant context");
    }

    pub fn invalidate_tenant_cache(&self) {
        self.in_flight.retain(|_, load| {
            load.invalidate();
            false
        });
        self.cache.invalidate_all();
        debug!("Invalidated all tenant contexts");
    }

    /// Number of cached tenant contexts (approximate until pending tasks run)
    pub fn cached_entries(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Apply pending evictions so that [`Self::cached_entries`] is exact
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    async fn load(&self, tenant_id: &TenantId) -> LoadResult {
        if let Some(context) = self.cache.get(tenant_id).await {
            return Ok(context);
        }

        let load = self
            .in_flight
            .entry(tenant_id.clone())
            .or_default()
            .clone();

        load.result
            .get_or_init(|| async {
                let result = self.fetch(tenant_id).await;

                if let Ok(context) = &result
                    && !load.is_invalidated()
                {
                    self.cache.insert(tenant_id.clone(), context.clone()).await;
                    // Invalidated between the check and the insert
                    if load.is_invalidated() {
                        self.cache.invalidate(tenant_id).await;
                    }
                }

                self.in_flight
                    .remove_if(tenant_id, |_, registered| Arc::ptr_eq(registered, &load));
                result
            })
            .await
            .clone()
    }

    async fn fetch(&self, tenant_id: &TenantId) -> LoadResult {
        if self.standalone {
            debug!(tenant_id = %tenant_id, "Creating standalone tenant context");
            return Ok(Arc::new(ApicurioTenantContext::new(
                tenant_id.clone(),
                None,
                self.limits_service.default_configuration_tenant(),
                TenantStatus::Ready,
                None,
            )));
        }

        debug!(tenant_id = %tenant_id, "Loading tenant context from tenant manager");
        match self.tenant_manager.get_tenant(tenant_id).await {
            Ok(tenant) => Ok(Arc::new(self.build_context(tenant_id, tenant))),
            Err(e @ Error::TenantNotFound(_)) => Err(e),
            Err(e) => {
                warn!(
                    "Error trying to load the tenant context for tenant id {}: {}",
                    tenant_id, e
                );
                Err(Error::TenantNotFound(format!("{} ({})", tenant_id, e)))
            }
        }
    }

    fn build_context(&self, tenant_id: &TenantId, tenant: Tenant) -> ApicurioTenantContext {
        let limits = self.limits_service.from_tenant_metadata(&tenant);
        ApicurioTenantContext::new(
            tenant_id.clone(),
            tenant.created_by,
            limits,
            tenant.status,
            tenant.organization_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockTenantManagerClient, TenantManagerClientError};
    use crate::service::RetryPolicy;
    use std::time::Duration;
    use tenantry_core::limits::{ResourceLimitsConfigurationService, TenantLimitsConfiguration};
    use tenantry_core::tenant::TenantResource;

    fn tenant(id: &str) -> Tenant {
        Tenant {
            tenant_id: TenantId::from_string(id).unwrap(),
            organization_id: Some("org-1".to_string()),
            created_by: Some("alice".to_string()),
            created_on: None,
            status: TenantStatus::Ready,
            resources: vec![TenantResource {
                resource_type: "MAX_ARTIFACTS".to_string(),
                limit: 42,
            }],
        }
    }

    fn enabled_config() -> MultitenancyConfig {
        MultitenancyConfig {
            enabled: true,
            ..Default::default()
        }
    }

    fn no_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 0,
            delay: Duration::ZERO,
            jitter: Duration::ZERO,
            timeout: Duration::from_secs(1),
        }
    }

    fn loader(config: &MultitenancyConfig, client: MockTenantManagerClient) -> TenantContextLoader {
        TenantContextLoader::new(
            config,
            TenantManagerService::new(Some(Arc::new(client)), no_retry()),
            Arc::new(ResourceLimitsConfigurationService::new(
                TenantLimitsConfiguration::default().with_limit("MAX_ARTIFACTS", 10),
            )),
        )
    }

    #[tokio::test]
    async fn test_load_builds_context() {
        let mut client = MockTenantManagerClient::new();
        client
            .expect_get_tenant()
            .times(1)
            .returning(|id| Ok(tenant(id.as_str())));

        let loader = loader(&enabled_config(), client);
        let tenant_id = TenantId::from_string("acme").unwrap();

        let context = loader.load_request_context(&tenant_id).await.unwrap();
        assert_eq!(context.tenant_id(), &tenant_id);
        assert_eq!(context.tenant_owner(), Some("alice"));
        assert_eq!(context.organization_id(), Some("org-1"));
        assert_eq!(context.limits_configuration().limit("MAX_ARTIFACTS"), Some(42));

        // Served from cache
        let again = loader.load_request_context(&tenant_id).await.unwrap();
        assert!(Arc::ptr_eq(&context, &again));
    }

    #[tokio::test]
    async fn test_default_tenant_bypasses_remote() {
        let mut client = MockTenantManagerClient::new();
        client.expect_get_tenant().never();

        let loader = loader(&enabled_config(), client);
        let first = loader
            .load_request_context(&TenantId::default_tenant())
            .await
            .unwrap();
        let second = loader.default_tenant_context();

        assert!(first.tenant_id().is_default());
        assert_eq!(first.limits_configuration().limit("MAX_ARTIFACTS"), Some(10));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_not_found_propagates() {
        let mut client = MockTenantManagerClient::new();
        client
            .expect_get_tenant()
            .returning(|id| Err(TenantManagerClientError::NotFound(id.to_string())));

        let loader = loader(&enabled_config(), client);
        let err = loader
            .load_request_context(&TenantId::from_string("ghost").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, Error::TenantNotFound("ghost".to_string()));
    }

    #[tokio::test]
    async fn test_other_failures_become_not_found() {
        let mut client = MockTenantManagerClient::new();
        client
            .expect_get_tenant()
            .returning(|_| Err(TenantManagerClientError::Transport("connection refused".to_string())));

        let loader = loader(&enabled_config(), client);
        let err = loader
            .load_batch_job_context(&TenantId::from_string("acme").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TenantNotFound(msg) if msg.starts_with("acme")));
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let mut client = MockTenantManagerClient::new();
        let mut seq = mockall::Sequence::new();
        client
            .expect_get_tenant()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(TenantManagerClientError::Transport("boom".to_string())));
        client
            .expect_get_tenant()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| Ok(tenant(id.as_str())));

        let loader = loader(&enabled_config(), client);
        let tenant_id = TenantId::from_string("acme").unwrap();
        assert!(loader.load_request_context(&tenant_id).await.is_err());
        assert!(loader.load_request_context(&tenant_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let mut client = MockTenantManagerClient::new();
        client
            .expect_get_tenant()
            .times(2)
            .returning(|id| Ok(tenant(id.as_str())));

        let loader = loader(&enabled_config(), client);
        let tenant_id = TenantId::from_string("acme").unwrap();

        loader.load_request_context(&tenant_id).await.unwrap();
        loader.invalidate_tenant_in_cache(&tenant_id).await;
        loader.load_request_context(&tenant_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_all_forces_reload() {
        let mut client = MockTenantManagerClient::new();
        client
            .expect_get_tenant()
            .times(4)
            .returning(|id| Ok(tenant(id.as_str())));

        let loader = loader(&enabled_config(), client);
        let acme = TenantId::from_string("acme").unwrap();
        let globex = TenantId::from_string("globex").unwrap();

        loader.load_request_context(&acme).await.unwrap();
        loader.load_request_context(&globex).await.unwrap();
        loader.invalidate_tenant_cache();
        loader.load_request_context(&acme).await.unwrap();
        loader.load_request_context(&globex).await.unwrap();
    }

    #[tokio::test]
    async fn test_standalone_skips_tenant_manager() {
        let mut client = MockTenantManagerClient::new();
        client.expect_get_tenant().never();

        let mut config = enabled_config();
        config.standalone = true;
        let loader = loader(&config, client);

        let context = loader
            .load_request_context(&TenantId::from_string("acme").unwrap())
            .await
            .unwrap();
        assert_eq!(context.tenant_id().as_str(), "acme");
        assert_eq!(context.status(), TenantStatus::Ready);
        assert_eq!(context.limits_configuration().limit("MAX_ARTIFACTS"), Some(10));
    }

    struct DenyAll;

    #[async_trait]
    impl TenantAuthorizer for DenyAll {
        async fn authorize_tenant(&self, context: &ApicurioTenantContext) -> Result<()> {
            Err(Error::TenantForbidden(context.tenant_id().to_string()))
        }
    }

    #[tokio::test]
    async fn test_authorizer_applies_to_request_loads_only() {
        let mut client = MockTenantManagerClient::new();
        client
            .expect_get_tenant()
            .returning(|id| Ok(tenant(id.as_str())));

        let loader = loader(&enabled_config(), client).with_authorizer(Arc::new(DenyAll));
        let tenant_id = TenantId::from_string("acme").unwrap();

        assert!(matches!(
            loader.load_request_context(&tenant_id).await,
            Err(Error::TenantForbidden(_))
        ));
        assert!(loader.load_batch_job_context(&tenant_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_authorization_disabled_skips_authorizer() {
        let mut client = MockTenantManagerClient::new();
        client
            .expect_get_tenant()
            .returning(|id| Ok(tenant(id.as_str())));

        let mut config = enabled_config();
        config.authorization_enabled = false;
        let loader = loader(&config, client).with_authorizer(Arc::new(DenyAll));

        assert!(loader
            .load_request_context(&TenantId::from_string("acme").unwrap())
            .await
            .is_ok());
    }
}
