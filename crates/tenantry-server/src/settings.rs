//! Server settings
//!
//! Loaded from a YAML or TOML file (chosen by extension), then overridden by
//! `TENANTRY_*` environment variables.
//!
//! ```yaml
//! host: 0.0.0.0
//! port: 8080
//! storage:
//!   backend: postgres
//!   database_url: postgres://localhost/tenantry
//! multitenancy:
//!   enabled: true
//!   standalone: true
//! dynamic_properties:
//!   - name: app.features.search
//!     propertyType: boolean
//!     defaultValue: "false"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tenantry_config::DynamicConfigSettings;
use tenantry_core::dynamic_config::DynamicConfigPropertyDef;
use tenantry_multitenancy::MultitenancyConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    /// Extra properties file layered under the environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties_file: Option<PathBuf>,

    #[serde(default)]
    pub multitenancy: MultitenancyConfig,

    #[serde(default)]
    pub dynamic_config: DynamicConfigSettings,

    /// Limits applied to every tenant unless its metadata overrides them
    #[serde(default)]
    pub default_limits: BTreeMap<String, i64>,

    #[serde(default)]
    pub dynamic_properties: Vec<DynamicConfigPropertyDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of the human readable format
    #[serde(default = "default_false")]
    pub json: bool,

    #[serde(default = "default_false")]
    pub log_sql_queries: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            logging: LoggingSettings::default(),
            storage: StorageSettings::default(),
            properties_file: None,
            multitenancy: MultitenancyConfig::default(),
            dynamic_config: DynamicConfigSettings::default(),
            default_limits: BTreeMap::new(),
            dynamic_properties: Vec::new(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            log_sql_queries: false,
        }
    }
}

impl ServerSettings {
    /// Load settings from a file; `~` is expanded
    ///
    /// # Errors
    /// - `BootstrapError::FileRead` if the file can't be read
    /// - `BootstrapError::ParseError` on invalid YAML/TOML
    pub fn from_file(path: &str) -> Result<Self, BootstrapError> {
        let expanded_path = shellexpand::tilde(path);
        let path = PathBuf::from(expanded_path.as_ref());

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            BootstrapError::FileRead(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let settings = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .map_err(|e| BootstrapError::ParseError(format!("TOML parse error: {}", e)))?
        } else {
            serde_yaml::from_str(&contents)
                .map_err(|e| BootstrapError::ParseError(format!("YAML parse error: {}", e)))?
        };

        Ok(settings)
    }

    /// Merge environment variables into the settings (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(host) = std::env::var("TENANTRY_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("TENANTRY_PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => eprintln!("Warning: Invalid TENANTRY_PORT '{}', ignoring", port),
            }
        }
        if let Ok(level) = std::env::var("TENANTRY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(url) = std::env::var("TENANTRY_DATABASE_URL") {
            self.storage.backend = StorageBackend::Postgres;
            self.storage.database_url = Some(url);
        }
        if let Ok(secs) = std::env::var("TENANTRY_CONFIG_REFRESH_SECS")
            && let Ok(secs) = secs.parse()
        {
            self.dynamic_config.refresh_interval_secs = secs;
        }

        self.multitenancy.merge_env();
    }

    pub fn validate(&self) -> Result<(), BootstrapError> {
        if self.storage.backend == StorageBackend::Postgres && self.storage.database_url.is_none()
        {
            return Err(BootstrapError::ValidationError(
                "storage.database_url is required when storage.backend is 'postgres'".to_string(),
            ));
        }

        if self.dynamic_config.refresh_interval_secs == 0 {
            return Err(BootstrapError::ValidationError(
                "dynamic_config.refresh_interval_secs must be greater than 0".to_string(),
            ));
        }

        self.multitenancy
            .validate()
            .map_err(|e| BootstrapError::ValidationError(e.to_string()))
    }

    /// Properties file path with `~` expanded
    pub fn expanded_properties_file(&self) -> Option<PathBuf> {
        self.properties_file.as_ref().map(|path| {
            let path_str = path.to_string_lossy();
            PathBuf::from(shellexpand::tilde(&path_str).as_ref())
        })
    }
}

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Failed to read settings: {0}")]
    FileRead(String),

    #[error("Failed to parse settings: {0}")]
    ParseError(String),

    #[error("Invalid settings: {0}")]
    ValidationError(String),
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_false() -> bool {
    false
}
