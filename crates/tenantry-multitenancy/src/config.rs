//! Multi-tenancy configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tenantry_core::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultitenancyConfig {
    #[serde(default = "default_false")]
    pub enabled: bool,

    /// Tenants are created implicitly on first use, no tenant manager involved
    #[serde(default = "default_false")]
    pub standalone: bool,

    /// Reject requests that don't carry a tenant id
    #[serde(default = "default_false")]
    pub require_tenant: bool,

    #[serde(default = "default_true")]
    pub authorization_enabled: bool,

    #[serde(default)]
    pub types: TenantIdStrategiesConfig,

    #[serde(default)]
    pub cache: TenantContextCacheConfig,

    #[serde(default)]
    pub tenant_manager: TenantManagerConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantIdStrategiesConfig {
    #[serde(default)]
    pub context_path: ContextPathConfig,

    #[serde(default)]
    pub subdomain: SubdomainConfig,

    #[serde(default)]
    pub request_header: RequestHeaderConfig,

    #[serde(default)]
    pub token_claims: TokenClaimsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPathConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// First path segment of tenant scoped URLs (`/t/{tenant}/...`)
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubdomainLocation {
    /// Domain read from a request header
    #[default]
    Header,
    /// Domain read from the request's server name
    ServerName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubdomainConfig {
    #[serde(default = "default_false")]
    pub enabled: bool,

    #[serde(default)]
    pub location: SubdomainLocation,

    #[serde(default = "default_subdomain_header")]
    pub header_name: String,

    /// Must match the whole domain; capture group 1 is the tenant id
    #[serde(default = "default_subdomain_pattern")]
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestHeaderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_tenant_header")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenClaimsConfig {
    #[serde(default = "default_false")]
    pub enabled: bool,

    /// Claims checked in order, first present claim wins
    #[serde(default)]
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantContextCacheConfig {
    /// Time to live of a cached tenant context
    #[serde(default = "default_check_period_ms")]
    pub check_period_ms: u64,

    #[serde(default = "default_cache_max_size")]
    pub max_size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantManagerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// PEM bundle trusted in addition to the system roots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_path: Option<String>,

    #[serde(default)]
    pub auth: TenantManagerAuthConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantManagerAuthConfig {
    #[serde(default = "default_false")]
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Refresh the access token this long before it expires
    #[serde(default = "default_token_expiration_reduction_ms")]
    pub token_expiration_reduction_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Per-attempt timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for MultitenancyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            standalone: false,
            require_tenant: false,
            authorization_enabled: true,
            types: TenantIdStrategiesConfig::default(),
            cache: TenantContextCacheConfig::default(),
            tenant_manager: TenantManagerConfig::default(),
        }
    }
}

impl Default for ContextPathConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_path: default_base_path(),
        }
    }
}

impl Default for SubdomainConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            location: SubdomainLocation::Header,
            header_name: default_subdomain_header(),
            pattern: default_subdomain_pattern(),
        }
    }
}

impl Default for RequestHeaderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: default_tenant_header(),
        }
    }
}

impl Default for TenantContextCacheConfig {
    fn default() -> Self {
        Self {
            check_period_ms: default_check_period_ms(),
            max_size: default_cache_max_size(),
        }
    }
}

impl Default for TenantManagerAuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token_url: None,
            client_id: None,
            client_secret: None,
            token_expiration_reduction_ms: default_token_expiration_reduction_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_ms: 0,
            jitter_ms: default_jitter_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl TenantContextCacheConfig {
    pub fn time_to_live(&self) -> Duration {
        Duration::from_millis(self.check_period_ms)
    }
}

impl MultitenancyConfig {
    /// Whether a remote tenant manager backs tenant lookups
    pub fn uses_tenant_manager(&self) -> bool {
        self.enabled && !self.standalone
    }

    /// Merge environment variable overrides
    pub fn merge_env(&mut self) {
        if let Some(val) = env_bool("TENANTRY_MULTITENANCY_ENABLED") {
            self.enabled = val;
        }
        if let Some(val) = env_bool("TENANTRY_MULTITENANCY_STANDALONE") {
            self.standalone = val;
        }
        if let Some(val) = env_bool("TENANTRY_MULTITENANCY_REQUIRE_TENANT") {
            self.require_tenant = val;
        }
        if let Some(val) = env_bool("TENANTRY_MULTITENANCY_AUTHORIZATION_ENABLED") {
            self.authorization_enabled = val;
        }
        if let Ok(val) = std::env::var("TENANTRY_TENANT_HEADER") {
            self.types.request_header.name = val;
        }
        if let Ok(val) = std::env::var("TENANTRY_TENANT_MANAGER_URL") {
            self.tenant_manager.url = Some(val);
        }
        if let Ok(val) = std::env::var("TENANTRY_TENANT_MANAGER_CA_PATH") {
            self.tenant_manager.ca_path = Some(val);
        }
        if let Ok(val) = std::env::var("TENANTRY_TENANT_MANAGER_CLIENT_ID") {
            self.tenant_manager.auth.client_id = Some(val);
        }
        if let Ok(val) = std::env::var("TENANTRY_TENANT_MANAGER_CLIENT_SECRET") {
            self.tenant_manager.auth.client_secret = Some(val);
        }
        if let Ok(val) = std::env::var("TENANTRY_TENANT_CACHE_CHECK_PERIOD_MS")
            && let Ok(period) = val.parse()
        {
            self.cache.check_period_ms = period;
        }
    }

    /// Validate settings that would otherwise fail at first use
    pub fn validate(&self) -> Result<()> {
        let types = &self.types;

        if types.context_path.enabled && types.context_path.base_path.trim_matches('/').is_empty() {
            return Err(Error::Config(
                "types.context_path.base_path must not be empty".to_string(),
            ));
        }

        if types.subdomain.enabled {
            regex::Regex::new(&types.subdomain.pattern).map_err(|e| {
                Error::Config(format!(
                    "Invalid subdomain pattern '{}': {}",
                    types.subdomain.pattern, e
                ))
            })?;
        }

        if types.request_header.enabled && types.request_header.name.trim().is_empty() {
            return Err(Error::Config(
                "types.request_header.name must not be empty".to_string(),
            ));
        }

        if types.token_claims.enabled && types.token_claims.names.is_empty() {
            return Err(Error::Config(
                "types.token_claims.names must list at least one claim".to_string(),
            ));
        }

        if self.cache.max_size == 0 || self.cache.check_period_ms == 0 {
            return Err(Error::Config(
                "cache.max_size and cache.check_period_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

fn default_base_path() -> String {
    "t".to_string()
}

fn default_subdomain_header() -> String {
    "Host".to_string()
}

fn default_subdomain_pattern() -> String {
    r"(\w[\w\d\-]*)\.localhost\.local".to_string()
}

fn default_tenant_header() -> String {
    "X-Tenant-Id".to_string()
}

fn default_check_period_ms() -> u64 {
    60_000
}

fn default_cache_max_size() -> u64 {
    1000
}

fn default_token_expiration_reduction_ms() -> u64 {
    0
}

fn default_max_retries() -> u32 {
    3
}

fn default_jitter_ms() -> u64 {
    200
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = MultitenancyConfig::default();
        assert!(!config.enabled);
        assert!(config.types.context_path.enabled);
        assert_eq!(config.types.context_path.base_path, "t");
        assert!(!config.types.subdomain.enabled);
        assert_eq!(config.types.subdomain.location, SubdomainLocation::Header);
        assert_eq!(config.types.subdomain.header_name, "Host");
        assert_eq!(config.types.request_header.name, "X-Tenant-Id");
        assert_eq!(config.cache.check_period_ms, 60_000);
        assert_eq!(config.cache.max_size, 1000);
        assert_eq!(config.tenant_manager.retry.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
enabled: true
types:
  subdomain:
    enabled: true
    location: server_name
cache:
  max_size: 10
"#;
        let config: MultitenancyConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.enabled);
        assert!(config.types.subdomain.enabled);
        assert_eq!(config.types.subdomain.location, SubdomainLocation::ServerName);
        assert_eq!(config.types.subdomain.header_name, "Host");
        assert_eq!(config.cache.max_size, 10);
        assert_eq!(config.cache.check_period_ms, 60_000);
        assert!(config.types.request_header.enabled);
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let mut config = MultitenancyConfig::default();
        config.types.subdomain.enabled = true;
        config.types.subdomain.pattern = "([a-z".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_claims() {
        let mut config = MultitenancyConfig::default();
        config.types.token_claims.enabled = true;
        assert!(config.validate().is_err());

        config.types.token_claims.names = vec!["tenant_id".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_uses_tenant_manager() {
        let mut config = MultitenancyConfig::default();
        assert!(!config.uses_tenant_manager());
        config.enabled = true;
        assert!(config.uses_tenant_manager());
        config.standalone = true;
        assert!(!config.uses_tenant_manager());
    }

    #[test]
    #[serial]
    fn test_merge_env() {
        unsafe {
            std::env::set_var("TENANTRY_MULTITENANCY_ENABLED", "true");
            std::env::set_var("TENANTRY_TENANT_MANAGER_URL", "http://tenants:8585");
            std::env::set_var("TENANTRY_TENANT_CACHE_CHECK_PERIOD_MS", "500");
        }

        let mut config = MultitenancyConfig::default();
        config.merge_env();

        unsafe {
            std::env::remove_var("TENANTRY_MULTITENANCY_ENABLED");
            std::env::remove_var("TENANTRY_TENANT_MANAGER_URL");
            std::env::remove_var("TENANTRY_TENANT_CACHE_CHECK_PERIOD_MS");
        }

        assert!(config.enabled);
        assert_eq!(config.tenant_manager.url.as_deref(), Some("http://tenants:8585"));
        assert_eq!(config.cache.check_period_ms, 500);
    }
}
