//! Tenantry Core Types and Traits
//!
//! This crate provides the fundamental types and traits used throughout Tenantry:
//! - Tenant identifiers, metadata and resolved tenant contexts
//! - Dynamic configuration property model
//! - Storage and configuration source abstractions
//! - Core error types

pub mod config_source;
pub mod config_storage;
pub mod dynamic_config;
pub mod error;
pub mod limits;
pub mod tenant;

pub use error::{Error, Result};
