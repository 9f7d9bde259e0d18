// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Schema requirements: one property slot of a factory.

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;

use super::factory::FactoryPtr;
use super::value::{convert_value, Value, ValueKind};
use super::EntityError;

/// Upper multiplicity marker for unbounded lists and vectors.
pub const INFINITE: usize = usize::MAX;

/// One property requirement of an entity kind.
///
/// Fixes the property name, its value kind, multiplicity, and optionally a
/// controlled vocabulary, a pattern, a numeric range, or a nested factory
/// for entity-valued properties.
#[derive(Clone)]
pub struct Requirement {
    name: String,
    kind: ValueKind,
    lower: usize,
    upper: usize,
    factory: Option<FactoryPtr>,
    vocabulary: Option<HashSet<String>>,
    pattern: Option<Arc<Regex>>,
    range: Option<(f64, f64)>,
    /// Exact vector size, when fixed (e.g. 3 for three-space samples).
    size: Option<usize>,
}

impl std::fmt::Debug for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requirement")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("lower", &self.lower)
            .field("upper", &self.upper)
            .finish()
    }
}

impl Requirement {
    pub fn new(name: impl Into<String>, kind: ValueKind, required: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            lower: usize::from(required),
            upper: 1,
            factory: None,
            vocabulary: None,
            pattern: None,
            range: None,
            size: None,
        }
    }

    /// Optional string-kind requirement, the most common shape.
    pub fn optional(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::String, false)
    }

    /// Required string-kind requirement.
    pub fn required(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::String, true)
    }

    pub fn with_factory(mut self, factory: FactoryPtr) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_multiplicity(mut self, lower: usize, upper: usize) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    pub fn with_vocabulary<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vocabulary = Some(words.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        // Schema patterns are authored constants; a bad one is a programmer error.
        self.pattern = Some(Arc::new(
            Regex::new(pattern).expect("requirement pattern must compile"),
        ));
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_required(&self) -> bool {
        self.lower > 0
    }

    pub fn multiplicity(&self) -> (usize, usize) {
        (self.lower, self.upper)
    }

    pub fn factory(&self) -> Option<&FactoryPtr> {
        self.factory.as_ref()
    }

    pub fn is_entity(&self) -> bool {
        matches!(self.kind, ValueKind::Entity | ValueKind::EntityList)
    }

    /// Coerce `value` to this requirement's kind and check vocabulary,
    /// pattern, range, and size constraints.
    pub fn check(&self, entity_name: &str, value: &mut Value) -> Result<(), EntityError> {
        if self.is_entity() {
            return self.check_entities(entity_name, value);
        }

        convert_value(value, self.kind).map_err(|e| match e {
            EntityError::Property(_)
                if matches!(self.kind, ValueKind::Integer | ValueKind::Double) =>
            {
                EntityError::InvalidNumeric {
                    entity: entity_name.to_string(),
                    property: self.name.clone(),
                }
            }
            other => other,
        })?;

        if let Value::String(s) = value {
            if let Some(vocab) = &self.vocabulary {
                if !vocab.contains(s.as_str()) {
                    return Err(EntityError::InvalidVocabulary {
                        entity: entity_name.to_string(),
                        property: self.name.clone(),
                        value: s.clone(),
                    });
                }
            }
            if let Some(pattern) = &self.pattern {
                if !pattern.is_match(s) {
                    return Err(EntityError::Property(format!(
                        "Invalid value for '{}': '{}' is not allowed",
                        self.name, s
                    )));
                }
            }
        }

        if let Some((min, max)) = self.range {
            if let Some(n) = value.as_f64() {
                if n < min || n > max {
                    return Err(EntityError::InvalidNumeric {
                        entity: entity_name.to_string(),
                        property: self.name.clone(),
                    });
                }
            }
        }

        if let Value::Vector(v) = value {
            if let Some(size) = self.size {
                if v.len() != size {
                    return Err(EntityError::Property(format!(
                        "Vector size {} is not equal to {}",
                        v.len(),
                        size
                    )));
                }
            } else if self.upper != INFINITE && self.upper > 1 && v.len() > self.upper {
                return Err(EntityError::Property(format!(
                    "Vector size {} is greater than {}",
                    v.len(),
                    self.upper
                )));
            }
        }

        Ok(())
    }

    fn check_entities(&self, entity_name: &str, value: &Value) -> Result<(), EntityError> {
        let factory = self.factory.as_ref().ok_or_else(|| {
            EntityError::Property(format!(
                "For entity or list requirement {}, no factory",
                self.name
            ))
        })?;

        match value {
            Value::Entity(e) => {
                if !factory.matches(e.name()) && e.name() != self.name {
                    return Err(EntityError::Property(format!(
                        "Requirement {} does not have a matching entity name: {}",
                        self.name,
                        e.name()
                    )));
                }
            }
            Value::EntityList(list) => {
                let count = list.len();
                if count > self.upper || count < self.lower {
                    return Err(EntityError::ListBounds {
                        entity: entity_name.to_string(),
                        property: self.name.clone(),
                        min: self.lower,
                        max: self.upper,
                        found: count,
                    });
                }
            }
            _ => {
                return Err(EntityError::Property(format!(
                    "Entity or list requirement {} does not have correct type",
                    self.name
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_converts_and_accepts() {
        let req = Requirement::new("count", ValueKind::Integer, true);
        let mut v = Value::String("42".into());
        req.check("Test", &mut v).expect("check should succeed");
        assert_eq!(v, Value::Integer(42));
    }

    #[test]
    fn test_check_numeric_failure_maps_to_taxonomy() {
        let req = Requirement::new("count", ValueKind::Integer, true);
        let mut v = Value::String("many".into());
        let err = req.check("Test", &mut v).expect_err("check should fail");
        assert_eq!(
            err.to_string(),
            "Invalid numeric value for property count of Test"
        );
    }

    #[test]
    fn test_vocabulary_enforced() {
        let req = Requirement::new("quality", ValueKind::UString, false)
            .with_vocabulary(["VALID", "INVALID", "UNVERIFIABLE"]);
        let mut ok = Value::String("valid".into());
        req.check("Obs", &mut ok).expect("upcased value is in vocabulary");
        assert_eq!(ok, Value::String("VALID".into()));

        let mut bad = Value::String("MAYBE".into());
        let err = req.check("Obs", &mut bad).expect_err("should reject");
        assert_eq!(
            err.to_string(),
            "Invalid vocabulary value MAYBE for property quality of Obs"
        );
    }

    #[test]
    fn test_vector_size_constraint() {
        let req = Requirement::new("VALUE", ValueKind::Vector, false).with_size(3);
        let mut ok = Value::String("1 2 3".into());
        req.check("Position", &mut ok).expect("3-vector accepted");

        let mut bad = Value::String("1 2".into());
        assert!(req.check("Position", &mut bad).is_err());
    }

    #[test]
    fn test_numeric_range() {
        let req = Requirement::new("VALUE", ValueKind::Double, false).with_range(0.0, 100.0);
        let mut ok = Value::String("55.5".into());
        req.check("Load", &mut ok).expect("in range");
        let mut bad = Value::Double(101.0);
        assert!(req.check("Load", &mut bad).is_err());
    }
}
