//! PostgresConfigStorage - DynamicConfigStorage implementation for PostgreSQL

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{debug, warn};

use tenantry_core::{
    Error, Result,
    config_storage::DynamicConfigStorage,
    dynamic_config::DynamicConfigPropertyDto,
    tenant::TenantId,
};

/// PostgreSQL-backed dynamic configuration storage
#[derive(Clone)]
pub struct PostgresConfigStorage {
    pool: Arc<PgPool>,
}

impl PostgresConfigStorage {
    /// Connect and create the schema if needed
    ///
    /// # Errors
    /// - `Error::Storage` if connection or schema migration fails
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| Error::Storage(format!("Failed to connect to PostgreSQL: {}", e)))?;

        let storage = Self::from_pool(pool);
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Wrap an existing pool; the schema is assumed to exist
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the properties table and its staleness index
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS config_properties (
                tenant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                value TEXT,
                type_name TEXT NOT NULL,
                modified_on TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (tenant_id, name)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to create config_properties table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_config_properties_modified
            ON config_properties(modified_on DESC)
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to create index: {}", e)))?;

        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn dto_from_row(row: &sqlx::postgres::PgRow) -> Result<DynamicConfigPropertyDto> {
        let extract = |column: &str, e: sqlx::Error| {
            Error::Storage(format!("Failed to extract {}: {}", column, e))
        };

        let name: String = row.try_get("name").map_err(|e| extract("name", e))?;
        let value: Option<String> = row.try_get("value").map_err(|e| extract("value", e))?;
        let type_name: String = row
            .try_get("type_name")
            .map_err(|e| extract("type_name", e))?;

        Ok(DynamicConfigPropertyDto::new(name, value, type_name))
    }
}

#[async_trait]
impl DynamicConfigStorage for PostgresConfigStorage {
    async fn get_config_properties(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<DynamicConfigPropertyDto>> {
        let rows = sqlx::query(
            "SELECT name, value, type_name FROM config_properties WHERE tenant_id = $1 ORDER BY name",
        )
        .bind(tenant_id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to query config properties: {}", e)))?;

        rows.iter().map(Self::dto_from_row).collect()
    }

    async fn get_config_property(
        &self,
        tenant_id: &TenantId,
        name: &str,
    ) -> Result<DynamicConfigPropertyDto> {
        let row = sqlx::query(
            "SELECT name, value, type_name FROM config_properties WHERE tenant_id = $1 AND name = $2",
        )
        .bind(tenant_id.as_str())
        .bind(name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to query config property: {}", e)))?;

        match row {
            Some(row) => Self::dto_from_row(&row),
            None => Err(Error::NotFoundProperty(name.to_string())),
        }
    }

    async fn set_config_property(
        &self,
        tenant_id: &TenantId,
        property: DynamicConfigPropertyDto,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Storage(format!("Failed to start transaction: {}", e)))?;

        sqlx::query("DELETE FROM config_properties WHERE tenant_id = $1 AND name = $2")
            .bind(tenant_id.as_str())
            .bind(&property.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete config property: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO config_properties (tenant_id, name, value, type_name, modified_on)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(&property.name)
        .bind(&property.value)
        .bind(&property.type_name)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Storage(format!("Failed to insert config property: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| Error::Storage(format!("Failed to commit transaction: {}", e)))?;

        debug!(tenant_id = %tenant_id, "Stored config property {}", property.name);
        Ok(())
    }

    async fn delete_config_property(&self, tenant_id: &TenantId, name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM config_properties WHERE tenant_id = $1 AND name = $2")
            .bind(tenant_id.as_str())
            .bind(name)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete config property: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFoundProperty(name.to_string()));
        }

        Ok(())
    }

    async fn get_tenants_with_stale_config_properties(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TenantId>> {
        let rows = sqlx::query(
            "SELECT DISTINCT tenant_id FROM config_properties WHERE modified_on >= $1 ORDER BY tenant_id",
        )
        .bind(since)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to query stale tenants: {}", e)))?;

        let mut tenant_ids = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(tenant_id) = stale_tenant_id(row.try_get("tenant_id"))? {
                tenant_ids.push(tenant_id);
            }
        }

        Ok(tenant_ids)
    }
}

/// A column that fails to decode is an error; an unparseable ID is skipped
fn stale_tenant_id(column: std::result::Result<String, sqlx::Error>) -> Result<Option<TenantId>> {
    let raw = column.map_err(|e| Error::Storage(format!("Failed to extract tenant_id: {}", e)))?;
    match TenantId::from_string(&raw) {
        Ok(tenant_id) => Ok(Some(tenant_id)),
        Err(e) => {
            warn!("Skipping stored tenant id {:?}: {}", raw, e);
            Ok(None)
        }
    }
}
