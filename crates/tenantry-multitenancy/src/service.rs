//! Tenant manager service
//!
//! Wraps a [`TenantManagerClient`] with a retry policy and a per-attempt
//! timeout. Domain failures (not found, not authorized, forbidden,
//! unsupported) abort immediately; anything else is retried until the
//! budget is spent.

use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tenantry_core::tenant::{NewTenantRequest, Tenant, TenantId, TenantStatus, UpdateTenantRequest};
use tenantry_core::{Error, Result};
use tracing::{debug, warn};

use crate::client::TenantManagerClient;
use crate::config::RetryConfig;

/// Retry budget of remote tenant manager calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    /// Random spread applied to `delay` in both directions
    pub jitter: Duration,
    /// Timeout of a single attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: Duration::from_millis(config.delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

impl RetryPolicy {
    /// Pause before the next attempt, `delay ± random(jitter)` clamped at zero
    pub fn backoff(&self) -> Duration {
        let delay = self.delay.as_millis() as i64;
        let jitter = self.jitter.as_millis() as i64;
        let offset = if jitter > 0 {
            rand::rng().random_range(-jitter..=jitter)
        } else {
            0
        };
        Duration::from_millis((delay + offset).max(0) as u64)
    }
}

/// Run `operation` under `policy`
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let backoff = policy.backoff();
            debug!(
                "Retrying tenant manager call after {}ms (attempt {}/{})",
                backoff.as_millis(),
                attempt,
                policy.max_retries
            );
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
        }

        let outcome = match tokio::time::timeout(policy.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(policy.timeout.as_millis() as u64)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_domain() => return Err(e),
            Err(e) => {
                if attempt < policy.max_retries {
                    warn!(
                        "Tenant manager call failed (attempt {}/{}): {}",
                        attempt + 1,
                        policy.max_retries + 1,
                        e
                    );
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::Internal("Retry loop exited unexpectedly".to_string())))
}

/// Retrying facade over the tenant manager
#[derive(Clone)]
pub struct TenantManagerService {
    client: Option<Arc<dyn TenantManagerClient>>,
    retry: RetryPolicy,
}

impl TenantManagerService {
    /// `client` is `None` when multi-tenancy is disabled or standalone
    pub fn new(client: Option<Arc<dyn TenantManagerClient>>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    fn client(&self) -> Result<&Arc<dyn TenantManagerClient>> {
        self.client.as_ref().ok_or_else(|| {
            Error::UnsupportedOperation("Multitenancy is not enabled".to_string())
        })
    }

    pub async fn create_tenant(&self, request: NewTenantRequest) -> Result<Tenant> {
        let client = self.client()?;
        with_retry(&self.retry, || {
            let request = request.clone();
            async move { client.create_tenant(request).await.map_err(Error::from) }
        })
        .await
    }

    pub async fn get_tenant(&self, tenant_id: &TenantId) -> Result<Tenant> {
        let client = self.client()?;
        with_retry(&self.retry, || async move {
            client.get_tenant(tenant_id).await.map_err(Error::from)
        })
        .await
    }

    pub async fn mark_tenant_as_deleted(&self, tenant_id: &TenantId) -> Result<()> {
        let client = self.client()?;
        with_retry(&self.retry, || async move {
            let request = UpdateTenantRequest {
                status: Some(TenantStatus::Deleted),
                resources: None,
            };
            client.update_tenant(tenant_id, request).await.map_err(Error::from)
        })
        .await
    }
}
