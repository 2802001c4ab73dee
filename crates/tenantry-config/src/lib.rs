//! Tenantry Dynamic Configuration
//!
//! Per-tenant overrides of declared configuration properties:
//! - Layered configuration sources (environment, file, map, storage)
//! - Property index with activation requirements
//! - Cached lookups with a periodic staleness refresh
//! - axum routes to list and update properties

pub mod http;
pub mod index;
pub mod memory;
pub mod service;
pub mod sources;

pub use http::{config_router, ConfigProp, ConfigProps, ConfigState};
pub use index::{DynamicConfigPropertyIndex, DynamicConfigPropertyRegistry};
pub use memory::InMemoryConfigStorage;
pub use service::{
    CachedValue, DynamicConfigService, DynamicConfigSettings, RefreshOutcome, RefreshTask,
};
pub use sources::{
    EnvConfigSource, FileConfigSource, LayeredConfig, MapConfigSource, StorageConfigSource,
};
