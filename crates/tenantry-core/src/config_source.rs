//! Configuration source abstraction
//!
//! A `ConfigSource` answers raw string lookups by property name. Sources are
//! layered by ordinal; the highest ordinal that has a value wins.

use async_trait::async_trait;

use crate::Result;

#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Human readable name used in logs
    fn name(&self) -> &str;

    /// Priority of this source; higher wins
    fn ordinal(&self) -> i32;

    /// Raw value of a property, `None` if this source doesn't define it
    async fn get_value(&self, name: &str) -> Result<Option<String>>;
}
