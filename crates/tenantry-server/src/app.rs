//! Application wiring
//!
//! Builds the storage backend, layered configuration, property index,
//! dynamic config service and tenant context pipeline from
//! [`ServerSettings`], and assembles the axum router.

use axum::{Router, middleware, routing::get};
use std::sync::Arc;
use tenantry_config::{
    ConfigState, DynamicConfigPropertyRegistry, DynamicConfigService, EnvConfigSource,
    FileConfigSource, InMemoryConfigStorage, LayeredConfig, StorageConfigSource, config_router,
};
use tenantry_core::config_source::ConfigSource;
use tenantry_core::config_storage::DynamicConfigStorage;
use tenantry_core::limits::{ResourceLimitsConfigurationService, TenantLimitsConfiguration};
use tenantry_multitenancy::{
    RetryPolicy, TenantContextInitializer, TenantContextLoader, TenantIdResolver,
    TenantManagerClientFactory, TenantManagerService, tenant_context_middleware,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::settings::{BootstrapError, ServerSettings, StorageBackend};

/// Everything the server needs once wiring is done
pub struct Application {
    pub router: Router,
    pub config_service: Arc<DynamicConfigService>,
    pub loader: Arc<TenantContextLoader>,
}

impl Application {
    pub async fn build(settings: &ServerSettings) -> anyhow::Result<Self> {
        let storage = build_storage(settings).await?;

        let mut registry = DynamicConfigPropertyRegistry::new();
        registry.register_all(settings.dynamic_properties.iter().cloned())?;

        let mut layered = LayeredConfig::new()
            .with_source(Arc::new(EnvConfigSource))
            .with_source(Arc::new(StorageConfigSource::new(
                storage.clone(),
                registry.property_names(),
            )));
        if let Some(path) = settings.expanded_properties_file() {
            info!("Loading properties from {}", path.display());
            layered.add_source(Arc::new(FileConfigSource::from_file(&path)?));
        }
        info!("Configuration sources: {:?}", layered.source_names());

        let config: Arc<dyn ConfigSource> = Arc::new(layered);
        let index = Arc::new(registry.build(config.clone()));
        let config_service = Arc::new(DynamicConfigService::new(storage, config));

        let limits = Arc::new(ResourceLimitsConfigurationService::new(
            TenantLimitsConfiguration::new(settings.default_limits.clone()),
        ));

        let mt = &settings.multitenancy;
        let client = TenantManagerClientFactory::from_config(mt)?;
        let tenant_manager =
            TenantManagerService::new(client, RetryPolicy::from(&mt.tenant_manager.retry));
        let loader = Arc::new(TenantContextLoader::new(mt, tenant_manager, limits));
        let initializer = Arc::new(TenantContextInitializer::new(
            mt,
            TenantIdResolver::new(mt)?,
            loader.clone(),
        ));

        let config_routes = config_router(ConfigState::new(index, config_service.clone()));
        let mut api = Router::new().merge(config_routes.clone());
        if mt.enabled && mt.types.context_path.enabled {
            let prefix = format!(
                "/{}/{{tenant}}",
                mt.types.context_path.base_path.trim_matches('/')
            );
            api = api.nest(&prefix, config_routes);
        }

        let router = api
            .layer(middleware::from_fn_with_state(
                initializer,
                tenant_context_middleware,
            ))
            .route("/healthz", get(|| async { "ok" }))
            .layer(TraceLayer::new_for_http());

        Ok(Self {
            router,
            config_service,
            loader,
        })
    }
}

async fn build_storage(
    settings: &ServerSettings,
) -> Result<Arc<dyn DynamicConfigStorage>, BootstrapError> {
    match settings.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory dynamic config storage");
            Ok(Arc::new(InMemoryConfigStorage::new()))
        }
        StorageBackend::Postgres => postgres_storage(settings).await,
    }
}

#[cfg(feature = "postgres")]
async fn postgres_storage(
    settings: &ServerSettings,
) -> Result<Arc<dyn DynamicConfigStorage>, BootstrapError> {
    let url = settings.storage.database_url.as_deref().ok_or_else(|| {
        BootstrapError::ValidationError("storage.database_url is not set".to_string())
    })?;
    info!("Using PostgreSQL dynamic config storage");
    let storage = tenantry_config_postgres::PostgresConfigStorage::new(url)
        .await
        .map_err(|e| BootstrapError::ValidationError(e.to_string()))?;
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "postgres"))]
async fn postgres_storage(
    _settings: &ServerSettings,
) -> Result<Arc<dyn DynamicConfigStorage>, BootstrapError> {
    Err(BootstrapError::ValidationError(
        "PostgreSQL storage requires building with the 'postgres' feature".to_string(),
    ))
}
