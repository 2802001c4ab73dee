//! Tenant types for multi-tenancy support

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::limits::TenantLimitsConfiguration;
use crate::{Error, Result};

/// Identifier of a tenant.
///
/// Tenant IDs are opaque strings handed out by the tenant manager. The reserved
/// value [`TenantId::DEFAULT_TENANT_ID`] stands for the implicit tenant used when
/// multi-tenancy is disabled or no tenant could be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Sentinel value of the default (global) tenant
    pub const DEFAULT_TENANT_ID: &'static str = "_";

    /// The default tenant
    pub fn default_tenant() -> Self {
        Self(Self::DEFAULT_TENANT_ID.to_string())
    }

    /// Parse a tenant ID from a string
    pub fn from_string(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidTenant("Tenant ID must not be empty".to_string()));
        }
        if let Some(c) = trimmed
            .chars()
            .find(|c| matches!(c, '/' | '?' | '#') || c.is_control())
        {
            return Err(Error::InvalidTenant(format!(
                "Tenant ID contains forbidden character {:?}",
                c
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Whether this is the default tenant sentinel
    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT_TENANT_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::default_tenant()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s)
    }
}

/// Lifecycle status of a tenant as reported by the tenant manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantStatus {
    #[default]
    Ready,
    Suspended,
    Deleting,
    Deleted,
}

/// A resource limit attached to a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub limit: i64,
}

/// Tenant metadata held by the remote tenant manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub tenant_id: TenantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: TenantStatus,
    #[serde(default)]
    pub resources: Vec<TenantResource>,
}

/// Request to create a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTenantRequest {
    pub tenant_id: TenantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default)]
    pub resources: Vec<TenantResource>,
}

/// Partial update of a tenant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTenantRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TenantStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<TenantResource>>,
}

/// Resolved, immutable context of one tenant.
///
/// Built by the tenant context loader from remote metadata, or synthesized for
/// the default tenant. Shared behind an `Arc` by the cache and every request
/// that belongs to the tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApicurioTenantContext {
    tenant_id: TenantId,
    tenant_owner: Option<String>,
    limits_configuration: TenantLimitsConfiguration,
    status: TenantStatus,
    organization_id: Option<String>,
}

impl ApicurioTenantContext {
    pub fn new(
        tenant_id: TenantId,
        tenant_owner: Option<String>,
        limits_configuration: TenantLimitsConfiguration,
        status: TenantStatus,
        organization_id: Option<String>,
    ) -> Self {
        Self {
            tenant_id,
            tenant_owner,
            limits_configuration,
            status,
            organization_id,
        }
    }

    /// Context of the default tenant with the given limits
    pub fn default_tenant(limits_configuration: TenantLimitsConfiguration) -> Self {
        Self::new(
            TenantId::default_tenant(),
            None,
            limits_configuration,
            TenantStatus::Ready,
            None,
        )
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn tenant_owner(&self) -> Option<&str> {
        self.tenant_owner.as_deref()
    }

    pub fn limits_configuration(&self) -> &TenantLimitsConfiguration {
        &self.limits_configuration
    }

    pub fn status(&self) -> TenantStatus {
        self.status
    }

    pub fn organization_id(&self) -> Option<&str> {
        self.organization_id.as_deref()
    }
}
