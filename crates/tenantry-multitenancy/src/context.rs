//! Request-scoped tenant context

use once_cell::sync::Lazy;
use std::future::Future;
use std::sync::Arc;
use tenantry_core::limits::TenantLimitsConfiguration;
use tenantry_core::tenant::{ApicurioTenantContext, TenantId, TenantStatus};
use tenantry_core::{Error, Result};
use tracing::Span;

use crate::config::MultitenancyConfig;
use crate::loader::TenantContextLoader;
use crate::resolver::{TenantIdResolver, TenantRequest};

/// Fallback for reads before a context is set
static EMPTY_CONTEXT: Lazy<Arc<ApicurioTenantContext>> = Lazy::new(|| {
    Arc::new(ApicurioTenantContext::default_tenant(
        TenantLimitsConfiguration::default(),
    ))
});

/// Tenant context of a single request.
///
/// Created per request and carried in the request's extensions. Holds a
/// span whose `tenant_id` field follows the current context, so everything
/// logged inside the request is tagged with the tenant.
#[derive(Debug, Clone)]
pub struct TenantContext {
    current: Option<Arc<ApicurioTenantContext>>,
    span: Span,
}

impl Default for TenantContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantContext {
    pub fn new() -> Self {
        Self {
            current: None,
            span: tracing::info_span!("tenant", tenant_id = TenantId::DEFAULT_TENANT_ID),
        }
    }

    /// A context already set to `context`
    pub fn with_context(context: Arc<ApicurioTenantContext>) -> Self {
        let mut tenant_context = Self::new();
        tenant_context.set_context(context);
        tenant_context
    }

    pub fn tenant_id(&self) -> &TenantId {
        self.context_ref().tenant_id()
    }

    /// The tenant id if a real tenant is loaded, `alternative` otherwise
    pub fn tenant_id_or_else<'a>(&'a self, alternative: &'a TenantId) -> &'a TenantId {
        if self.is_loaded() {
            self.tenant_id()
        } else {
            alternative
        }
    }

    pub fn current_context(&self) -> Arc<ApicurioTenantContext> {
        Arc::clone(self.context_ref())
    }

    pub fn tenant_owner(&self) -> Option<&str> {
        self.context_ref().tenant_owner()
    }

    pub fn limits_config(&self) -> &TenantLimitsConfiguration {
        self.context_ref().limits_configuration()
    }

    pub fn tenant_status(&self) -> TenantStatus {
        self.context_ref().status()
    }

    /// Whether a tenant other than the default is set
    pub fn is_loaded(&self) -> bool {
        !self.tenant_id().is_default()
    }

    pub fn set_context(&mut self, context: Arc<ApicurioTenantContext>) {
        self.span.record("tenant_id", context.tenant_id().as_str());
        self.current = Some(context);
    }

    pub fn clear_context(&mut self) {
        self.span.record("tenant_id", TenantId::DEFAULT_TENANT_ID);
        self.current = None;
    }

    /// Span tagged with the current tenant id
    pub fn span(&self) -> &Span {
        &self.span
    }

    fn context_ref(&self) -> &Arc<ApicurioTenantContext> {
        self.current.as_ref().unwrap_or(&*EMPTY_CONTEXT)
    }
}

/// Builds the [`TenantContext`] of an inbound request
pub struct TenantContextInitializer {
    enabled: bool,
    require_tenant: bool,
    resolver: TenantIdResolver,
    loader: Arc<TenantContextLoader>,
}

impl TenantContextInitializer {
    pub fn new(
        config: &MultitenancyConfig,
        resolver: TenantIdResolver,
        loader: Arc<TenantContextLoader>,
    ) -> Self {
        Self {
            enabled: config.enabled,
            require_tenant: config.require_tenant,
            resolver,
            loader,
        }
    }

    pub fn loader(&self) -> &Arc<TenantContextLoader> {
        &self.loader
    }

    /// Resolve and load the tenant of `request`.
    ///
    /// Without multi-tenancy, or without a request, the default tenant is
    /// used. A request that names no tenant gets the default tenant unless
    /// a tenant is required.
    ///
    /// # Errors
    /// - `Error::TenantRequired` if no tenant was resolved and one is required
    /// - any error of [`TenantContextLoader::load_request_context`]
    pub fn load<R>(&self, request: Option<&R>) -> impl Future<Output = Result<TenantContext>> + Send
    where
        R: TenantRequest + ?Sized,
    {
        let resolved = match request {
            Some(request) if self.enabled => Some(self.resolver.resolve_tenant_id(request)),
            _ => None,
        };
        self.load_resolved(resolved)
    }

    async fn load_resolved(&self, resolved: Option<Option<TenantId>>) -> Result<TenantContext> {
        let context = match resolved {
            Some(Some(tenant_id)) => self.loader.load_request_context(&tenant_id).await?,
            Some(None) if self.require_tenant => {
                return Err(Error::TenantRequired(
                    "No tenant id found in the request".to_string(),
                ));
            }
            _ => self.loader.default_tenant_context(),
        };

        Ok(TenantContext::with_context(context))
    }
}
