//! PostgreSQL-backed storage of per-tenant dynamic configuration properties
//!
//! Implements `DynamicConfigStorage` on a single `config_properties` table
//! keyed by `(tenant_id, name)`. Each write stamps `modified_on`, which the
//! refresh job queries to find tenants with stale caches.
//!
//! # Example
//! ```no_run
//! # use tenantry_config_postgres::PostgresConfigStorage;
//! # async fn example() -> tenantry_core::Result<()> {
//! let storage = PostgresConfigStorage::new("postgres://localhost/tenantry").await?;
//! # Ok(())
//! # }
//! ```

mod postgres_config_storage;

pub use postgres_config_storage::PostgresConfigStorage;
