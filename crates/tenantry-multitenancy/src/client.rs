//! Tenant manager client
//!
//! The tenant manager is the remote service that owns tenant metadata. The
//! [`TenantManagerClient`] trait is the transport boundary; the HTTP
//! implementation talks JSON to `{url}/api/v1/tenants`.

use async_trait::async_trait;
use reqwest::{Certificate, Client, ClientBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tenantry_core::tenant::{NewTenantRequest, Tenant, TenantId, UpdateTenantRequest};
use tenantry_core::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{MultitenancyConfig, TenantManagerAuthConfig};

/// Errors reported by a tenant manager client
#[derive(Debug, Clone, thiserror::Error)]
pub enum TenantManagerClientError {
    #[error("Tenant not found: {0}")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Client configuration error: {0}")]
    Config(String),
}

impl From<TenantManagerClientError> for Error {
    fn from(e: TenantManagerClientError) -> Self {
        match e {
            TenantManagerClientError::NotFound(msg) => Error::TenantNotFound(msg),
            TenantManagerClientError::NotAuthorized(msg) => Error::TenantNotAuthorized(msg),
            TenantManagerClientError::Forbidden(msg) => Error::TenantForbidden(msg),
            TenantManagerClientError::Transport(msg) => Error::Transport(msg),
            TenantManagerClientError::Config(msg) => Error::Config(msg),
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, TenantManagerClientError>;

/// Transport to the remote tenant manager
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TenantManagerClient: Send + Sync {
    async fn create_tenant(&self, request: NewTenantRequest) -> ClientResult<Tenant>;

    async fn get_tenant(&self, tenant_id: &TenantId) -> ClientResult<Tenant>;

    async fn update_tenant(
        &self,
        tenant_id: &TenantId,
        request: UpdateTenantRequest,
    ) -> ClientResult<()>;
}

/// OIDC client-credentials settings of the HTTP client
#[derive(Debug, Clone)]
pub struct OidcClientCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub expiration_reduction: Duration,
}

impl OidcClientCredentials {
    fn from_config(auth: &TenantManagerAuthConfig) -> ClientResult<Self> {
        let missing = |field: &str| {
            TenantManagerClientError::Config(format!(
                "tenant_manager.auth.{} is required when auth is enabled",
                field
            ))
        };

        Ok(Self {
            token_url: auth.token_url.clone().ok_or_else(|| missing("token_url"))?,
            client_id: auth.client_id.clone().ok_or_else(|| missing("client_id"))?,
            client_secret: auth
                .client_secret
                .clone()
                .ok_or_else(|| missing("client_secret"))?,
            expiration_reduction: Duration::from_millis(auth.token_expiration_reduction_ms),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// Tenant manager client speaking JSON over HTTP
pub struct HttpTenantManagerClient {
    client: Client,
    base_url: String,
    credentials: Option<OidcClientCredentials>,
    token: Mutex<Option<CachedToken>>,
}

impl HttpTenantManagerClient {
    /// Create a client for the tenant manager at `base_url`
    pub fn new(
        base_url: impl Into<String>,
        credentials: Option<OidcClientCredentials>,
        ca_path: Option<PathBuf>,
    ) -> ClientResult<Self> {
        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("Tenantry/{}", env!("CARGO_PKG_VERSION")));

        if let Some(ca_path) = ca_path {
            let pem = std::fs::read(&ca_path).map_err(|e| {
                TenantManagerClientError::Config(format!(
                    "Failed to read CA bundle {}: {}",
                    ca_path.display(),
                    e
                ))
            })?;
            let cert = Certificate::from_pem(&pem).map_err(|e| {
                TenantManagerClientError::Config(format!("Invalid CA bundle: {}", e))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build().map_err(|e| {
            TenantManagerClientError::Config(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            token: Mutex::new(None),
        })
    }

    fn tenants_url(&self) -> String {
        format!("{}/api/v1/tenants", self.base_url)
    }

    /// The tenant ID is percent-encoded as a single path segment
    fn tenant_url(&self, tenant_id: &TenantId) -> ClientResult<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            TenantManagerClientError::Config(format!(
                "Invalid tenant manager URL {}: {}",
                self.base_url, e
            ))
        })?;

        url.path_segments_mut()
            .map_err(|_| {
                TenantManagerClientError::Config(format!(
                    "Tenant manager URL cannot be a base: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["api", "v1", "tenants"])
            .push(tenant_id.as_str());

        Ok(url)
    }

    async fn access_token(&self) -> ClientResult<Option<String>> {
        let Some(credentials) = &self.credentials else {
            return Ok(None);
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.is_valid()
        {
            return Ok(Some(token.access_token.clone()));
        }

        debug!("Requesting tenant manager access token from {}", credentials.token_url);

        let body = serde_urlencoded::to_string([
            ("grant_type", "client_credentials"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ])
        .map_err(|e| TenantManagerClientError::Config(format!("Failed to encode token request: {}", e)))?;

        let response = self
            .client
            .post(&credentials.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| TenantManagerClientError::Transport(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Token request failed with status {}: {}", status, body);
            return Err(TenantManagerClientError::NotAuthorized(format!(
                "Token endpoint returned {}",
                status
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            TenantManagerClientError::Transport(format!("Invalid token response: {}", e))
        })?;

        let expires_at = token.expires_in.map(|secs| {
            Instant::now() + Duration::from_secs(secs).saturating_sub(credentials.expiration_reduction)
        });

        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at,
        });

        Ok(Some(access_token))
    }

    async fn send(&self, request: reqwest::RequestBuilder, subject: &str) -> ClientResult<Response> {
        let request = match self.access_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| TenantManagerClientError::Transport(e.to_string()))?;

        check_status(response, subject).await
    }
}

async fn check_status(response: Response, subject: &str) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => TenantManagerClientError::NotFound(subject.to_string()),
        StatusCode::UNAUTHORIZED => TenantManagerClientError::NotAuthorized(subject.to_string()),
        StatusCode::FORBIDDEN => TenantManagerClientError::Forbidden(subject.to_string()),
        _ => TenantManagerClientError::Transport(format!("HTTP {}: {}", status, body)),
    })
}

#[async_trait]
impl TenantManagerClient for HttpTenantManagerClient {
    async fn create_tenant(&self, request: NewTenantRequest) -> ClientResult<Tenant> {
        let subject = request.tenant_id.to_string();
        let response = self
            .send(self.client.post(self.tenants_url()).json(&request), &subject)
            .await?;

        response
            .json()
            .await
            .map_err(|e| TenantManagerClientError::Transport(format!("Invalid tenant payload: {}", e)))
    }

    async fn get_tenant(&self, tenant_id: &TenantId) -> ClientResult<Tenant> {
        let response = self
            .send(self.client.get(self.tenant_url(tenant_id)?), tenant_id.as_str())
            .await?;

        let tenant: Tenant = response.json().await.map_err(|e| {
            TenantManagerClientError::Transport(format!("Invalid tenant payload: {}", e))
        })?;

        if tenant.tenant_id != *tenant_id {
            warn!(
                "Tenant manager answered {} for requested tenant {}",
                tenant.tenant_id, tenant_id
            );
            return Err(TenantManagerClientError::NotFound(tenant_id.to_string()));
        }

        Ok(tenant)
    }

    async fn update_tenant(
        &self,
        tenant_id: &TenantId,
        request: UpdateTenantRequest,
    ) -> ClientResult<()> {
        self.send(
            self.client.put(self.tenant_url(tenant_id)?).json(&request),
            tenant_id.as_str(),
        )
        .await?;
        Ok(())
    }
}

/// Builds the tenant manager client from configuration
pub struct TenantManagerClientFactory;

impl TenantManagerClientFactory {
    /// `None` unless multi-tenancy is enabled outside standalone mode
    ///
    /// # Errors
    /// - `Error::Config` if the URL or required auth settings are missing
    pub fn from_config(
        config: &MultitenancyConfig,
    ) -> tenantry_core::Result<Option<Arc<dyn TenantManagerClient>>> {
        if !config.uses_tenant_manager() {
            return Ok(None);
        }

        let manager = &config.tenant_manager;
        let url = manager.url.as_deref().ok_or_else(|| {
            Error::Config("Missing tenant_manager.url while multitenancy is enabled".to_string())
        })?;

        let credentials = if manager.auth.enabled {
            Some(OidcClientCredentials::from_config(&manager.auth)?)
        } else {
            None
        };

        let ca_path = manager
            .ca_path
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()));

        info!(
            "Using tenant manager at {} (auth: {})",
            url,
            credentials.is_some()
        );

        let client = HttpTenantManagerClient::new(url, credentials, ca_path)?;
        Ok(Some(Arc::new(client)))
    }
}
