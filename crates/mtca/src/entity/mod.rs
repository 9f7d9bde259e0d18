// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Entity kernel: typed document trees and the schema-driven factory.
//!
//! An [`Entity`] is a named node with an ordered property map. Properties
//! hold scalars, nested entities, or ordered entity lists; the special
//! `VALUE` property is the element body and `LIST` holds ordered children
//! of list-shaped elements. Entities are immutable once a [`Factory`] has
//! constructed them; the ingest pipeline works on plain property bundles
//! until observations are made.

mod factory;
mod json_printer;
mod requirement;
mod value;
mod xml_parser;
mod xml_printer;

pub use factory::{any_factory, CreateHook, Factory, FactoryPtr, Matcher};
pub use json_printer::JsonEntityPrinter;
pub use requirement::Requirement;
pub use value::{
    convert_value, format_double, format_timestamp, parse_timestamp, DataSet, DataSetEntry,
    DataSetValue, EntityPtr, Timestamp, Value, ValueKind,
};
pub use xml_parser::{parse_entity_xml, parse_strict};
pub use xml_printer::{escape_xml, XmlEntityPrinter};

use std::fmt;

/// Errors produced while constructing or validating entities.
///
/// Factories collect these into an [`ErrorList`] instead of failing fast so
/// a single pass reports every violation in a document.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityError {
    /// `Missing required property P on E`
    MissingProperty { entity: String, property: String },
    /// `Invalid vocabulary value V for property P of E`
    InvalidVocabulary {
        entity: String,
        property: String,
        value: String,
    },
    /// `Invalid numeric value for property P of E`
    InvalidNumeric { entity: String, property: String },
    /// `Entity list requirement C on E must have [min,max] entries; N found`
    ListBounds {
        entity: String,
        property: String,
        min: usize,
        max: usize,
        found: usize,
    },
    /// `Invalid element X in E`
    InvalidElement { entity: String, element: String },
    /// Property-level conversion or parse failure.
    Property(String),
    /// Document-level failure (XML syntax, missing root, ...).
    Document(String),
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityError::MissingProperty { entity, property } => {
                write!(f, "Missing required property {} on {}", property, entity)
            }
            EntityError::InvalidVocabulary {
                entity,
                property,
                value,
            } => write!(
                f,
                "Invalid vocabulary value {} for property {} of {}",
                value, property, entity
            ),
            EntityError::InvalidNumeric { entity, property } => {
                write!(f, "Invalid numeric value for property {} of {}", property, entity)
            }
            EntityError::ListBounds {
                entity,
                property,
                min,
                max,
                found,
            } => write!(
                f,
                "Entity list requirement {} on {} must have [{},{}] entries; {} found",
                property, entity, min, max, found
            ),
            EntityError::InvalidElement { entity, element } => {
                write!(f, "Invalid element {} in {}", element, entity)
            }
            EntityError::Property(msg) => write!(f, "{}", msg),
            EntityError::Document(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for EntityError {}

/// Violations collected during one `Factory::create` pass.
pub type ErrorList = Vec<EntityError>;

/// Ordered property map. Linear lookup: entities carry a handful of
/// properties and printing depends on insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    entries: Vec<(String, Value)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert or replace, keeping the original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self.get_mut(&name) {
            *existing = value;
        } else {
            self.entries.push((name, value));
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Properties {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut props = Properties::new();
        for (k, v) in iter {
            props.insert(k, v);
        }
        props
    }
}

/// A named document node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    name: String,
    properties: Properties,
}

impl Entity {
    pub fn new(name: impl Into<String>, properties: Properties) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains(name)
    }

    /// The element body, if any.
    pub fn value(&self) -> Option<&Value> {
        self.properties.get("VALUE")
    }

    pub fn value_text(&self) -> Option<String> {
        self.value().map(Value::to_text)
    }

    /// Ordered children of a list-shaped entity.
    pub fn list(&self) -> Option<&[EntityPtr]> {
        match self.properties.get("LIST") {
            Some(Value::EntityList(list)) => Some(list),
            _ => None,
        }
    }

    /// Fetch the ordered children of a named list property, e.g.
    /// `get_list("Customers")` on a part archetype.
    pub fn get_list(&self, name: &str) -> Option<&[EntityPtr]> {
        match self.properties.get(name) {
            Some(Value::Entity(e)) => e.list(),
            Some(Value::EntityList(list)) => Some(list),
            _ => None,
        }
    }

    /// String-typed convenience accessor.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }

    /// Mutating accessor for the narrow cases the pipeline is allowed to
    /// touch (unit conversion, sequence stamping).
    pub(crate) fn set_property(&mut self, name: &str, value: Value) {
        self.properties.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_preserve_order() {
        let mut props = Properties::new();
        props.insert("b", "2");
        props.insert("a", "1");
        props.insert("c", "3");
        props.insert("b", "replaced");
        let keys: Vec<_> = props.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(props.get("b"), Some(&Value::String("replaced".into())));
    }

    #[test]
    fn test_entity_value_and_list() {
        let child = EntityPtr::new(Entity::new("Child", Properties::new()));
        let mut props = Properties::new();
        props.insert("VALUE", "body");
        props.insert("LIST", Value::EntityList(vec![child]));
        let e = Entity::new("Parent", props);
        assert_eq!(e.value_text().as_deref(), Some("body"));
        assert_eq!(e.list().map(|l| l.len()), Some(1));
    }

    #[test]
    fn test_error_messages_match_taxonomy() {
        let err = EntityError::MissingProperty {
            entity: "Device".into(),
            property: "uuid".into(),
        };
        assert_eq!(err.to_string(), "Missing required property uuid on Device");

        let err = EntityError::ListBounds {
            entity: "Relationships".into(),
            property: "AssetRelationship".into(),
            min: 1,
            max: 2,
            found: 3,
        };
        assert_eq!(
            err.to_string(),
            "Entity list requirement AssetRelationship on Relationships must have [1,2] entries; 3 found"
        );
    }
}
