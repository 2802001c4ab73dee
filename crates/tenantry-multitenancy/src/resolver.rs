//! Tenant ID resolution from inbound requests
//!
//! A tenant id can be carried in several places:
//! 1. The context path: `https://app.example.org/t/{tenant}/apis/search`
//! 2. A subdomain: `https://{tenant}.app.example.org/apis/search`
//! 3. A request header: `X-Tenant-Id: {tenant}`
//! 4. A claim of the caller's access token
//!
//! Each strategy is enabled independently. They are evaluated in the order
//! above and a later match replaces an earlier one.

use regex::Regex;
use std::collections::HashMap;
use tenantry_core::tenant::TenantId;
use tenantry_core::{Error, Result};
use tracing::{debug, info, trace, warn};

use crate::config::{MultitenancyConfig, SubdomainLocation};

/// Position of the tenant segment in a `/`-split context path
const TENANT_ID_POSITION: usize = 2;

/// Read access to the parts of a request the resolver looks at
pub trait TenantRequest {
    fn uri_path(&self) -> &str;

    fn header(&self, name: &str) -> Option<&str>;

    fn server_name(&self) -> Option<&str>;

    fn claim(&self, _name: &str) -> Option<&str> {
        None
    }
}

/// Verified access token claims, placed in request extensions by the
/// authentication layer
#[derive(Debug, Clone, Default)]
pub struct TokenClaims(pub HashMap<String, String>);

impl TokenClaims {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl<B> TenantRequest for http::Request<B> {
    fn uri_path(&self) -> &str {
        // Nested axum routers strip their prefix from the request uri
        self.extensions()
            .get::<axum::extract::OriginalUri>()
            .map_or_else(|| self.uri().path(), |original| original.0.path())
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }

    fn server_name(&self) -> Option<&str> {
        self.uri().host().or_else(|| {
            self.header(http::header::HOST.as_str())
                .and_then(|host| host.split(':').next())
        })
    }

    fn claim(&self, name: &str) -> Option<&str> {
        self.extensions().get::<TokenClaims>().and_then(|c| c.get(name))
    }
}

#[derive(Debug)]
struct SubdomainStrategy {
    location: SubdomainLocation,
    header_name: String,
    pattern: Regex,
}

/// Resolves the tenant id of a request using the enabled strategies
#[derive(Debug)]
pub struct TenantIdResolver {
    enabled: bool,
    base_path: Option<String>,
    subdomain: Option<SubdomainStrategy>,
    request_header: Option<String>,
    token_claims: Option<Vec<String>>,
}

impl TenantIdResolver {
    /// Build a resolver, compiling the subdomain pattern up front
    ///
    /// # Errors
    /// - `Error::Config` if the subdomain pattern is not a valid regex
    pub fn new(config: &MultitenancyConfig) -> Result<Self> {
        let types = &config.types;

        if config.enabled {
            info!("Application running with multitenancy enabled");
        }

        let base_path = types.context_path.enabled.then(|| {
            format!("/{}/", types.context_path.base_path.trim_matches('/'))
        });

        let subdomain = if types.subdomain.enabled {
            // The pattern must match the whole domain
            let anchored = format!("^(?:{})$", types.subdomain.pattern);
            let pattern = Regex::new(&anchored).map_err(|e| {
                Error::Config(format!(
                    "Invalid subdomain pattern '{}': {}",
                    types.subdomain.pattern, e
                ))
            })?;
            Some(SubdomainStrategy {
                location: types.subdomain.location,
                header_name: types.subdomain.header_name.clone(),
                pattern,
            })
        } else {
            None
        };

        let request_header = types
            .request_header
            .enabled
            .then(|| types.request_header.name.clone());

        let token_claims = types
            .token_claims
            .enabled
            .then(|| types.token_claims.names.clone());

        Ok(Self {
            enabled: config.enabled,
            base_path,
            subdomain,
            request_header,
            token_claims,
        })
    }

    /// Resolve the tenant id of a request, `None` if no strategy matched or
    /// multi-tenancy is disabled
    pub fn resolve_tenant_id<R>(&self, request: &R) -> Option<TenantId>
    where
        R: TenantRequest + ?Sized,
    {
        if !self.enabled {
            return None;
        }

        trace!("Resolving tenant id");
        let mut tenant_id = None;

        if let Some(base_path) = &self.base_path {
            let path = request.uri_path();
            if path.starts_with(base_path.as_str()) {
                match path
                    .split('/')
                    .nth(TENANT_ID_POSITION)
                    .and_then(|segment| TenantId::from_string(segment).ok())
                {
                    Some(id) => tenant_id = Some(id),
                    None => warn!("Context-path multi-tenancy enabled. Missing or invalid tenant segment in path: {}", path),
                }
            } else {
                warn!("Context-path multi-tenancy enabled. Detected unmatched path: {}", path);
            }
        }

        if let Some(subdomain) = &self.subdomain {
            let domain = match subdomain.location {
                SubdomainLocation::Header => request.header(&subdomain.header_name),
                SubdomainLocation::ServerName => request.server_name(),
            }
            .unwrap_or_default();

            match subdomain
                .pattern
                .captures(domain)
                .and_then(|caps| caps.get(1))
                .and_then(|m| TenantId::from_string(m.as_str()).ok())
            {
                Some(id) => tenant_id = Some(id),
                None => warn!("Subdomain multi-tenancy enabled. Detected unmatched domain: {}", domain),
            }
        }

        if let Some(header_name) = &self.request_header
            && let Some(id) = request
                .header(header_name)
                .and_then(|value| TenantId::from_string(value).ok())
        {
            tenant_id = Some(id);
        }

        if let Some(claims) = &self.token_claims
            && let Some(id) = claims
                .iter()
                .find_map(|claim| request.claim(claim))
                .and_then(|value| TenantId::from_string(value).ok())
        {
            tenant_id = Some(id);
        }

        debug!(tenant_id = ?tenant_id, "Resolved tenant id");
        tenant_id
    }
}
