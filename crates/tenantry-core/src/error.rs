//! Error types for Tenantry Core

use thiserror::Error;

/// Errors shared by every Tenantry crate.
///
/// Payloads are plain strings so the error can be cloned and handed to every
/// waiter of a coalesced (single-flight) load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // Multi-tenancy errors
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Tenant not authorized: {0}")]
    TenantNotAuthorized(String),

    #[error("Tenant forbidden: {0}")]
    TenantForbidden(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Tenant required: {0}")]
    TenantRequired(String),

    #[error("Invalid tenant: {0}")]
    InvalidTenant(String),

    // Remote and storage errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Storage error: {0}")]
    Storage(String),

    // Dynamic configuration errors
    #[error("Configuration property not found: {0}")]
    NotFoundProperty(String),

    #[error("Configuration property type not supported: {type_name} for property with name: {name}")]
    UnsupportedPropertyType { name: String, type_name: String },

    #[error("Invalid value for configuration property {name}: {message}")]
    InvalidPropertyValue { name: String, message: String },

    #[error("Duplicate dynamic configuration property: {0}")]
    DuplicateProperty(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Domain errors are never retried and propagate straight to the caller.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Error::TenantNotFound(_)
                | Error::TenantNotAuthorized(_)
                | Error::TenantForbidden(_)
                | Error::UnsupportedOperation(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("Serialization error: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
