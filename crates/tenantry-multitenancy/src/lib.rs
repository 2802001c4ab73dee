//! Tenantry Multi-tenancy
//!
//! Request routing for multi-tenant deployments:
//! - Tenant id resolution from context path, subdomain, header or token claims
//! - Tenant manager client with retries and per-attempt timeouts
//! - Cached tenant context loading with single-flight loads
//! - Request-scoped tenant context and axum middleware

pub mod client;
pub mod config;
pub mod context;
pub mod loader;
pub mod middleware;
pub mod resolver;
pub mod service;

pub use client::{
    HttpTenantManagerClient, TenantManagerClient, TenantManagerClientError,
    TenantManagerClientFactory,
};
pub use config::MultitenancyConfig;
pub use context::{TenantContext, TenantContextInitializer};
pub use loader::{TenantAuthorizer, TenantContextLoader};
pub use middleware::{tenant_context_middleware, ApiError};
pub use resolver::{TenantIdResolver, TenantRequest, TokenClaims};
pub use service::{RetryPolicy, TenantManagerService};
