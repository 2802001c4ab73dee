//! HTTP surface for reading and updating dynamic configuration
//!
//! Every route is scoped to the tenant of the request: the [`TenantContext`]
//! placed in the extensions by the tenant middleware, or the default tenant
//! when the router is mounted without it.

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tenantry_core::dynamic_config::{DynamicConfigPropertyDef, PropertyValue};
use tenantry_core::tenant::TenantId;
use tenantry_core::Error;
use tenantry_multitenancy::{ApiError, TenantContext};
use tracing::debug;

use crate::index::DynamicConfigPropertyIndex;
use crate::service::DynamicConfigService;

/// Shared state of the config routes
#[derive(Clone)]
pub struct ConfigState {
    pub index: Arc<DynamicConfigPropertyIndex>,
    pub service: Arc<DynamicConfigService>,
}

impl ConfigState {
    pub fn new(index: Arc<DynamicConfigPropertyIndex>, service: Arc<DynamicConfigService>) -> Self {
        Self { index, service }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigProp {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigProps {
    pub properties: Vec<ConfigProp>,
}

/// Body of `PUT /config/all/{name}`; a null value clears the override
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateConfigProp {
    pub value: Option<String>,
}

/// Path parameters of the single-property routes; extra parameters from an
/// enclosing tenant prefix are ignored
#[derive(Debug, Deserialize)]
pub struct PropertyPath {
    pub name: String,
}

/// Tenant the request is scoped to
pub struct ScopedTenant(pub TenantId);

impl<S: Send + Sync> FromRequestParts<S> for ScopedTenant {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = parts
            .extensions
            .get::<TenantContext>()
            .map(|ctx| ctx.tenant_id().clone())
            .unwrap_or_default();
        Ok(ScopedTenant(tenant_id))
    }
}

/// Routes under `/config`
pub fn config_router(state: ConfigState) -> Router {
    Router::new()
        .route("/config/all", get(list_all))
        .route("/config/accepted", get(list_accepted))
        .route(
            "/config/all/{name}",
            get(get_property).put(update_property).delete(delete_property),
        )
        .with_state(state)
}

async fn list_all(
    State(state): State<ConfigState>,
    ScopedTenant(tenant_id): ScopedTenant,
) -> Result<Json<ConfigProps>, ApiError> {
    let mut properties = Vec::new();
    for def in state.index.properties() {
        properties.push(effective_prop(&state, &tenant_id, def).await?);
    }
    Ok(Json(ConfigProps { properties }))
}

async fn list_accepted(
    State(state): State<ConfigState>,
    ScopedTenant(tenant_id): ScopedTenant,
) -> Result<Json<ConfigProps>, ApiError> {
    let mut properties = Vec::new();
    for name in state.index.accepted_property_names().await {
        let def = lookup(&state, name)?;
        properties.push(effective_prop(&state, &tenant_id, def).await?);
    }
    Ok(Json(ConfigProps { properties }))
}

async fn get_property(
    State(state): State<ConfigState>,
    ScopedTenant(tenant_id): ScopedTenant,
    Path(PropertyPath { name }): Path<PropertyPath>,
) -> Result<Json<ConfigProp>, ApiError> {
    let def = lookup(&state, &name)?;
    Ok(Json(effective_prop(&state, &tenant_id, def).await?))
}

async fn update_property(
    State(state): State<ConfigState>,
    ScopedTenant(tenant_id): ScopedTenant,
    Path(PropertyPath { name }): Path<PropertyPath>,
    Json(body): Json<UpdateConfigProp>,
) -> Result<StatusCode, ApiError> {
    let def = lookup_accepted(&state, &name).await?;
    let value = body
        .value
        .as_deref()
        .map(|raw| def.parse_value(raw))
        .transpose()?;

    debug!(tenant_id = %tenant_id, "Updating dynamic property {}", name);
    state.service.set(&tenant_id, def, value).await?;
    after_write(&state, &tenant_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_property(
    State(state): State<ConfigState>,
    ScopedTenant(tenant_id): ScopedTenant,
    Path(PropertyPath { name }): Path<PropertyPath>,
) -> Result<StatusCode, ApiError> {
    let def = lookup_accepted(&state, &name).await?;
    state.service.delete(&tenant_id, def).await?;
    after_write(&state, &tenant_id);
    Ok(StatusCode::NO_CONTENT)
}

// Default tenant overrides can feed requirements through the storage bridge
fn after_write(state: &ConfigState, tenant_id: &TenantId) {
    state.service.invalidate_tenant(tenant_id);
    if tenant_id.is_default() {
        state.index.invalidate_accepted();
    }
}

fn lookup<'a>(state: &'a ConfigState, name: &str) -> Result<&'a DynamicConfigPropertyDef, ApiError> {
    state
        .index
        .get_property(name)
        .ok_or_else(|| ApiError(Error::NotFoundProperty(name.to_string())))
}

async fn lookup_accepted<'a>(
    state: &'a ConfigState,
    name: &str,
) -> Result<&'a DynamicConfigPropertyDef, ApiError> {
    if !state.index.is_accepted(name).await {
        return Err(ApiError(Error::NotFoundProperty(name.to_string())));
    }
    lookup(state, name)
}

async fn effective_prop(
    state: &ConfigState,
    tenant_id: &TenantId,
    def: &DynamicConfigPropertyDef,
) -> Result<ConfigProp, ApiError> {
    let value = state
        .service
        .get_optional::<PropertyValue>(tenant_id, def)
        .await?;
    Ok(ConfigProp {
        name: def.name().to_string(),
        value: value.map(|v| v.to_string()),
    })
}
