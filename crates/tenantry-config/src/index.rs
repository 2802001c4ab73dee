//! Dynamic configuration property index
//!
//! The index is built once at startup from every registered
//! [`DynamicConfigPropertyDef`]. A property is *accepted* when all of its
//! activation requirements hold against the current configuration.
//! The accepted set is computed on first use and cached until
//! [`DynamicConfigPropertyIndex::invalidate_accepted`] is called.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use tenantry_core::config_source::ConfigSource;
use tenantry_core::dynamic_config::DynamicConfigPropertyDef;
use tenantry_core::{Error, Result};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Collects property definitions before the index is built
#[derive(Debug, Default)]
pub struct DynamicConfigPropertyRegistry {
    properties: BTreeMap<String, DynamicConfigPropertyDef>,
}

impl DynamicConfigPropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a property
    ///
    /// # Errors
    /// - `Error::DuplicateProperty` if the name is already registered
    /// - `Error::InvalidPropertyValue` if the declared default doesn't parse
    pub fn register(&mut self, def: DynamicConfigPropertyDef) -> Result<&mut Self> {
        if self.properties.contains_key(def.name()) {
            return Err(Error::DuplicateProperty(def.name().to_string()));
        }
        def.typed_default()?;
        self.properties.insert(def.name().to_string(), def);
        Ok(self)
    }

    /// Register several properties at once
    pub fn register_all<I>(&mut self, defs: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = DynamicConfigPropertyDef>,
    {
        for def in defs {
            self.register(def)?;
        }
        Ok(self)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Freeze the registry; requirements are evaluated against `config`
    pub fn build(self, config: Arc<dyn ConfigSource>) -> DynamicConfigPropertyIndex {
        debug!("Indexed {} dynamic configuration properties", self.properties.len());
        DynamicConfigPropertyIndex {
            properties: self.properties,
            config,
            accepted: Mutex::new(Arc::new(OnceCell::new())),
        }
    }
}

/// Read-only registry of dynamic property definitions
pub struct DynamicConfigPropertyIndex {
    properties: BTreeMap<String, DynamicConfigPropertyDef>,
    config: Arc<dyn ConfigSource>,
    accepted: Mutex<Arc<OnceCell<Arc<BTreeSet<String>>>>>,
}

impl DynamicConfigPropertyIndex {
    pub fn get_property(&self, name: &str) -> Option<&DynamicConfigPropertyDef> {
        self.properties.get(name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// All property names, sorted
    pub fn property_names(&self) -> Vec<&str> {
        self.properties.keys().map(String::as_str).collect()
    }

    pub fn properties(&self) -> impl Iterator<Item = &DynamicConfigPropertyDef> {
        self.properties.values()
    }

    pub async fn is_accepted(&self, name: &str) -> bool {
        self.accepted().await.contains(name)
    }

    /// Names of the properties whose requirements hold, sorted
    pub async fn accepted_property_names(&self) -> Vec<&str> {
        let accepted = self.accepted().await;
        self.properties
            .keys()
            .filter(|name| accepted.contains(name.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Drop the cached accepted set; the next query re-evaluates requirements
    pub fn invalidate_accepted(&self) {
        debug!("Invalidating accepted dynamic properties");
        *self.accepted.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(OnceCell::new());
    }

    async fn accepted(&self) -> Arc<BTreeSet<String>> {
        let cell = self
            .accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        cell.get_or_init(|| async {
            let mut accepted = BTreeSet::new();
            for def in self.properties.values() {
                if self.accept(def).await {
                    accepted.insert(def.name().to_string());
                }
            }
            debug!(
                "{} of {} dynamic properties accepted",
                accepted.len(),
                self.properties.len()
            );
            Arc::new(accepted)
        })
        .await
        .clone()
    }

    async fn accept(&self, def: &DynamicConfigPropertyDef) -> bool {
        for requirement in def.requirements() {
            let (name, expected) = match requirement.split_once('=') {
                Some((name, value)) => (name.trim(), Some(value.trim())),
                None => (requirement.trim(), None),
            };

            let actual = match self.config.get_value(name).await {
                Ok(actual) => actual,
                Err(e) => {
                    warn!(
                        "Failed to evaluate requirement '{}' of {}: {}",
                        requirement,
                        def.name(),
                        e
                    );
                    return false;
                }
            };

            let satisfied = match (actual.as_deref().map(str::trim), expected) {
                (Some(actual), Some(expected)) => actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            };

            if !satisfied {
                debug!("Property {} not accepted: requires {}", def.name(), requirement);
                return false;
            }
        }
        true
    }
}
