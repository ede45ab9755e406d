//! Typed property values
//!
//! A property is a `{key, value, type}` triple. The type is stored
//! independently of the value so an empty date field keeps its date editor.

use crate::{Timestamp, ValidationError};
use serde::{Deserialize, Serialize};

/// Tagged union of every value a property can hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum PropertyValue {
    Null,
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(Timestamp),
    /// ISO 3166-1 alpha-2 country code
    Country(String),
    Url(String),
}

impl PropertyValue {
    /// Type implied by this value, if it is not null
    pub fn implied_type(&self) -> Option<PropertyType> {
        match self {
            PropertyValue::Null => None,
            PropertyValue::Text(_) => Some(PropertyType::Text),
            PropertyValue::Number(_) => Some(PropertyType::Number),
            PropertyValue::Boolean(_) => Some(PropertyType::Boolean),
            PropertyValue::Date(_) => Some(PropertyType::Date),
            PropertyValue::Country(_) => Some(PropertyType::Country),
            PropertyValue::Url(_) => Some(PropertyType::Url),
        }
    }

    /// Human-readable rendering, used as the label of an extracted element
    pub fn display(&self) -> String {
        match self {
            PropertyValue::Null => String::new(),
            PropertyValue::Text(s) | PropertyValue::Country(s) | PropertyValue::Url(s) => s.clone(),
            PropertyValue::Number(n) => n.to_string(),
            PropertyValue::Boolean(b) => b.to_string(),
            PropertyValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    #[default]
    Text,
    Number,
    Boolean,
    Date,
    Country,
    Url,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Text => "text",
            PropertyType::Number => "number",
            PropertyType::Boolean => "boolean",
            PropertyType::Date => "date",
            PropertyType::Country => "country",
            PropertyType::Url => "url",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(PropertyType::Text),
            "number" => Some(PropertyType::Number),
            "boolean" => Some(PropertyType::Boolean),
            "date" => Some(PropertyType::Date),
            "country" => Some(PropertyType::Country),
            "url" | "link" => Some(PropertyType::Url),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: PropertyValue,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
}

impl Property {
    /// Build a property whose type follows its value (text for null)
    pub fn new(key: impl Into<String>, value: PropertyValue) -> Self {
        let property_type = value.implied_type().unwrap_or_default();
        Self {
            key: key.into(),
            value,
            property_type,
        }
    }
}

/// Insert or replace a property by key, keeping its position when it exists
pub fn upsert_property(properties: &mut Vec<Property>, property: Property) -> Result<(), ValidationError> {
    if property.key.trim().is_empty() {
        return Err(ValidationError::EmptyPropertyKey);
    }
    match properties.iter_mut().find(|p| p.key == property.key) {
        Some(existing) => *existing = property,
        None => properties.push(property),
    }
    Ok(())
}

/// Remove a property by key, returning it with its former index
pub fn remove_property(properties: &mut Vec<Property>, key: &str) -> Option<(usize, Property)> {
    let index = properties.iter().position(|p| p.key == key)?;
    Some((index, properties.remove(index)))
}
