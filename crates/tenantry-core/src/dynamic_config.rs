//! Dynamic configuration property model
//!
//! A dynamic property is a named, typed setting whose effective value can be
//! overridden per tenant at runtime. Properties are declared up front with a
//! [`DynamicConfigPropertyDef`]; overrides travel through storage as
//! [`DynamicConfigPropertyDto`] rows.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::{Error, Result};

/// Value types supported by dynamic properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Integer,
    Long,
    Boolean,
}

impl PropertyType {
    /// Fully-qualified type name stored alongside a raw value
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyType::String => "std::string::String",
            PropertyType::Integer => "i32",
            PropertyType::Long => "i64",
            PropertyType::Boolean => "bool",
        }
    }

    /// Resolve a stored type name
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        match type_name {
            "std::string::String" | "alloc::string::String" | "String" => Some(PropertyType::String),
            "i32" => Some(PropertyType::Integer),
            "i64" => Some(PropertyType::Long),
            "bool" => Some(PropertyType::Boolean),
            _ => None,
        }
    }

    /// Parse a raw string into a typed value
    pub fn parse(&self, name: &str, raw: &str) -> Result<PropertyValue> {
        let invalid = |message: String| Error::InvalidPropertyValue {
            name: name.to_string(),
            message,
        };

        match self {
            PropertyType::String => Ok(PropertyValue::String(raw.to_string())),
            PropertyType::Integer => raw
                .trim()
                .parse::<i32>()
                .map(PropertyValue::Integer)
                .map_err(|e| invalid(format!("'{}' is not an integer: {}", raw, e))),
            PropertyType::Long => raw
                .trim()
                .parse::<i64>()
                .map(PropertyValue::Long)
                .map_err(|e| invalid(format!("'{}' is not a long: {}", raw, e))),
            PropertyType::Boolean => parse_bool(raw)
                .map(PropertyValue::Boolean)
                .ok_or_else(|| invalid(format!("'{}' is not a boolean", raw))),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// A typed dynamic property value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyValue {
    String(String),
    Integer(i32),
    Long(i64),
    Boolean(bool),
}

impl PropertyValue {
    pub fn property_type(&self) -> PropertyType {
        match self {
            PropertyValue::String(_) => PropertyType::String,
            PropertyValue::Integer(_) => PropertyType::Integer,
            PropertyValue::Long(_) => PropertyType::Long,
            PropertyValue::Boolean(_) => PropertyType::Boolean,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(v) => f.write_str(v),
            PropertyValue::Integer(v) => write!(f, "{}", v),
            PropertyValue::Long(v) => write!(f, "{}", v),
            PropertyValue::Boolean(v) => write!(f, "{}", v),
        }
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Long(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

/// Conversion from a cached [`PropertyValue`] into a concrete Rust type
pub trait FromPropertyValue: Sized {
    fn from_property_value(name: &str, value: &PropertyValue) -> Result<Self>;
}

fn mismatch(name: &str, value: &PropertyValue, wanted: &str) -> Error {
    Error::InvalidPropertyValue {
        name: name.to_string(),
        message: format!("cannot read {} value '{}' as {}", value.property_type(), value, wanted),
    }
}

impl FromPropertyValue for String {
    fn from_property_value(_name: &str, value: &PropertyValue) -> Result<Self> {
        Ok(value.to_string())
    }
}

impl FromPropertyValue for i32 {
    fn from_property_value(name: &str, value: &PropertyValue) -> Result<Self> {
        match value {
            PropertyValue::Integer(v) => Ok(*v),
            PropertyValue::Long(v) => i32::try_from(*v).map_err(|_| mismatch(name, value, "i32")),
            PropertyValue::String(s) => s.trim().parse().map_err(|_| mismatch(name, value, "i32")),
            PropertyValue::Boolean(_) => Err(mismatch(name, value, "i32")),
        }
    }
}

impl FromPropertyValue for i64 {
    fn from_property_value(name: &str, value: &PropertyValue) -> Result<Self> {
        match value {
            PropertyValue::Integer(v) => Ok(i64::from(*v)),
            PropertyValue::Long(v) => Ok(*v),
            PropertyValue::String(s) => s.trim().parse().map_err(|_| mismatch(name, value, "i64")),
            PropertyValue::Boolean(_) => Err(mismatch(name, value, "i64")),
        }
    }
}

impl FromPropertyValue for bool {
    fn from_property_value(name: &str, value: &PropertyValue) -> Result<Self> {
        match value {
            PropertyValue::Boolean(v) => Ok(*v),
            PropertyValue::String(s) => parse_bool(s).ok_or_else(|| mismatch(name, value, "bool")),
            _ => Err(mismatch(name, value, "bool")),
        }
    }
}

impl FromPropertyValue for PropertyValue {
    fn from_property_value(_name: &str, value: &PropertyValue) -> Result<Self> {
        Ok(value.clone())
    }
}

/// Declaration of a dynamic configuration property.
///
/// Identity is the name: two definitions with the same name are equal
/// regardless of type or default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicConfigPropertyDef {
    name: String,
    property_type: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_value: Option<String>,
    /// Activation requirements in `name` or `name=value` form
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    requires: Vec<String>,
}

impl DynamicConfigPropertyDef {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            default_value: None,
            requires: Vec::new(),
        }
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    /// Add an activation requirement (`other.property` or `other.property=value`)
    pub fn requires(mut self, requirement: impl Into<String>) -> Self {
        self.requires.push(requirement.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    pub fn requirements(&self) -> &[String] {
        &self.requires
    }

    /// Parse a raw value with this property's type
    pub fn parse_value(&self, raw: &str) -> Result<PropertyValue> {
        self.property_type.parse(&self.name, raw)
    }

    /// Whether a raw value parses as this property's type
    pub fn is_valid_value(&self, raw: &str) -> bool {
        self.parse_value(raw).is_ok()
    }

    /// The declared default parsed with this property's type
    pub fn typed_default(&self) -> Result<Option<PropertyValue>> {
        self.default_value
            .as_deref()
            .map(|raw| self.parse_value(raw))
            .transpose()
    }
}

impl PartialEq for DynamicConfigPropertyDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for DynamicConfigPropertyDef {}

impl Hash for DynamicConfigPropertyDef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Storage and wire representation of a single property override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicConfigPropertyDto {
    pub name: String,
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl DynamicConfigPropertyDto {
    pub fn new(name: impl Into<String>, value: Option<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            type_name: type_name.into(),
        }
    }

    /// Build a DTO from a typed value; a missing value is stored as a string null
    pub fn create(name: impl Into<String>, value: Option<&PropertyValue>) -> Self {
        match value {
            Some(value) => Self::new(
                name,
                Some(value.to_string()),
                value.property_type().type_name(),
            ),
            None => Self::new(name, None, PropertyType::String.type_name()),
        }
    }

    /// Convert the raw row into a typed value.
    ///
    /// # Errors
    /// - `Error::UnsupportedPropertyType` if the stored type name is unknown
    /// - `Error::InvalidPropertyValue` if the raw value doesn't parse
    pub fn to_property_value(&self) -> Result<Option<PropertyValue>> {
        let property_type = PropertyType::from_type_name(&self.type_name).ok_or_else(|| {
            Error::UnsupportedPropertyType {
                name: self.name.clone(),
                type_name: self.type_name.clone(),
            }
        })?;

        match &self.value {
            Some(raw) => property_type.parse(&self.name, raw).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_def_identity_is_name() {
        let a = DynamicConfigPropertyDef::new("app.x", PropertyType::String);
        let b = DynamicConfigPropertyDef::new("app.x", PropertyType::Boolean).with_default("true");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn test_is_valid_value() {
        let def = DynamicConfigPropertyDef::new("app.count", PropertyType::Integer);
        assert!(def.is_valid_value("42"));
        assert!(!def.is_valid_value("forty-two"));

        let def = DynamicConfigPropertyDef::new("app.enabled", PropertyType::Boolean);
        assert!(def.is_valid_value("TRUE"));
        assert!(!def.is_valid_value("maybe"));
    }

    #[test]
    fn test_typed_default() {
        let def = DynamicConfigPropertyDef::new("app.long", PropertyType::Long).with_default("17");
        assert_eq!(def.typed_default().unwrap(), Some(PropertyValue::Long(17)));

        let def = DynamicConfigPropertyDef::new("app.none", PropertyType::String);
        assert_eq!(def.typed_default().unwrap(), None);
    }

    #[test]
    fn test_dto_create_and_convert() {
        let dto = DynamicConfigPropertyDto::create("app.enabled", Some(&PropertyValue::Boolean(true)));
        assert_eq!(dto.type_name, "bool");
        assert_eq!(dto.value.as_deref(), Some("true"));
        assert_eq!(dto.to_property_value().unwrap(), Some(PropertyValue::Boolean(true)));

        let dto = DynamicConfigPropertyDto::create("app.cleared", None);
        assert_eq!(dto.type_name, "std::string::String");
        assert_eq!(dto.to_property_value().unwrap(), None);
    }

    #[test]
    fn test_dto_unsupported_type() {
        let dto = DynamicConfigPropertyDto::new("app.ratio", Some("0.5".to_string()), "f64");
        assert!(matches!(
            dto.to_property_value(),
            Err(Error::UnsupportedPropertyType { .. })
        ));
    }

    #[test]
    fn test_dto_json_uses_type_key() {
        let dto = DynamicConfigPropertyDto::new("app.count", Some("3".to_string()), "i32");
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json, serde_json::json!({"name": "app.count", "value": "3", "type": "i32"}));
    }

    #[test]
    fn test_from_property_value_conversions() {
        assert_eq!(i64::from_property_value("x", &PropertyValue::Integer(5)).unwrap(), 5);
        assert_eq!(i32::from_property_value("x", &PropertyValue::Long(7)).unwrap(), 7);
        assert!(i32::from_property_value("x", &PropertyValue::Long(i64::MAX)).is_err());
        assert!(bool::from_property_value("x", &PropertyValue::String("on".to_string())).unwrap());
        assert_eq!(
            String::from_property_value("x", &PropertyValue::Boolean(false)).unwrap(),
            "false"
        );
        assert!(bool::from_property_value("x", &PropertyValue::Integer(1)).is_err());
    }
}
