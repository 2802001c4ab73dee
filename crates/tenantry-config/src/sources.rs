//! Layered configuration sources
//!
//! Static configuration is read from an ordered set of [`ConfigSource`]s.
//! The source with the highest ordinal that defines a property wins.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tenantry_core::config_source::ConfigSource;
use tenantry_core::config_storage::DynamicConfigStorage;
use tenantry_core::tenant::TenantId;
use tenantry_core::{Error, Result};
use tracing::{debug, trace};

pub const ENV_ORDINAL: i32 = 300;
pub const FILE_ORDINAL: i32 = 250;
pub const STORAGE_ORDINAL: i32 = 199;
pub const DEFAULT_MAP_ORDINAL: i32 = 100;

/// Process environment; `app.foo-bar` is also looked up as `app_foo_bar`
/// and `APP_FOO_BAR`
#[derive(Debug, Clone, Default)]
pub struct EnvConfigSource;

impl EnvConfigSource {
    fn sanitized(name: &str) -> String {
        name.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

#[async_trait]
impl ConfigSource for EnvConfigSource {
    fn name(&self) -> &str {
        "environment"
    }

    fn ordinal(&self) -> i32 {
        ENV_ORDINAL
    }

    async fn get_value(&self, name: &str) -> Result<Option<String>> {
        let sanitized = Self::sanitized(name);
        let candidates = [name.to_string(), sanitized.clone(), sanitized.to_uppercase()];
        Ok(candidates.iter().find_map(|key| std::env::var(key).ok()))
    }
}

/// In-memory properties
#[derive(Debug, Clone)]
pub struct MapConfigSource {
    name: String,
    ordinal: i32,
    values: HashMap<String, String>,
}

impl MapConfigSource {
    pub fn new(name: impl Into<String>, ordinal: i32, values: HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            ordinal,
            values,
        }
    }

    /// Build from `(name, value)` pairs with the default ordinal
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            "map",
            DEFAULT_MAP_ORDINAL,
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        )
    }
}

#[async_trait]
impl ConfigSource for MapConfigSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
    }

    async fn get_value(&self, name: &str) -> Result<Option<String>> {
        Ok(self.values.get(name).cloned())
    }
}

/// Properties file in YAML or TOML, nested keys flattened with `.`
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    name: String,
    values: HashMap<String, String>,
}

impl FileConfigSource {
    /// Load a properties file (format chosen by extension)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let document: serde_json::Value = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| Error::Config(format!("Invalid YAML in {}: {}", path.display(), e)))?,
            Some("toml") => toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))?,
            _ => {
                return Err(Error::Config(format!(
                    "Unsupported properties file format: {}",
                    path.display()
                )));
            }
        };

        let mut values = HashMap::new();
        flatten("", &document, &mut values);
        debug!("Loaded {} properties from {}", values.len(), path.display());

        Ok(Self {
            name: path.display().to_string(),
            values,
        })
    }
}

fn flatten(prefix: &str, value: &serde_json::Value, out: &mut HashMap<String, String>) {
    use serde_json::Value;

    let key = |suffix: &str| {
        if prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}.{}", prefix, suffix)
        }
    };

    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten(&key(k), v, out);
            }
        }
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_string(), joined);
        }
        Value::Null => {}
        scalar => {
            if let Some(s) = scalar_to_string(scalar) {
                out.insert(prefix.to_string(), s);
            }
        }
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> i32 {
        FILE_ORDINAL
    }

    async fn get_value(&self, name: &str) -> Result<Option<String>> {
        Ok(self.values.get(name).cloned())
    }
}

/// Exposes the default tenant's stored overrides of dynamic properties as
/// static configuration
pub struct StorageConfigSource {
    storage: Arc<dyn DynamicConfigStorage>,
    property_names: HashSet<String>,
    tenant_id: TenantId,
}

impl StorageConfigSource {
    pub fn new<I, S>(storage: Arc<dyn DynamicConfigStorage>, property_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            storage,
            property_names: property_names.into_iter().map(Into::into).collect(),
            tenant_id: TenantId::default_tenant(),
        }
    }
}

#[async_trait]
impl ConfigSource for StorageConfigSource {
    fn name(&self) -> &str {
        "dynamic-config-storage"
    }

    fn ordinal(&self) -> i32 {
        STORAGE_ORDINAL
    }

    async fn get_value(&self, name: &str) -> Result<Option<String>> {
        if !self.property_names.contains(name) {
            return Ok(None);
        }

        match self.storage.get_config_property(&self.tenant_id, name).await {
            Ok(dto) => Ok(dto.value),
            Err(Error::NotFoundProperty(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Ordered stack of configuration sources, highest ordinal first
#[derive(Clone, Default)]
pub struct LayeredConfig {
    sources: Vec<Arc<dyn ConfigSource>>,
}

impl LayeredConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.add_source(source);
        self
    }

    pub fn add_source(&mut self, source: Arc<dyn ConfigSource>) {
        self.sources.push(source);
        // Stable sort keeps registration order among equal ordinals
        self.sources.sort_by_key(|s| std::cmp::Reverse(s.ordinal()));
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl ConfigSource for LayeredConfig {
    fn name(&self) -> &str {
        "layered"
    }

    fn ordinal(&self) -> i32 {
        i32::MAX
    }

    async fn get_value(&self, name: &str) -> Result<Option<String>> {
        for source in &self.sources {
            if let Some(value) = source.get_value(name).await? {
                trace!("Property {} resolved from {}", name, source.name());
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}
