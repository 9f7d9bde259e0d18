// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! JSON output for entity trees.
//!
//! An entity renders as an object: scalar properties keep their native JSON
//! types, `VALUE` becomes `"value"`, list children become arrays, and data
//! sets become nested objects. This is the version-2 document layout.

use serde_json::{json, Map, Value as Json};

use super::value::{DataSet, DataSetValue, Value};
use super::Entity;

/// Entity → JSON printer.
pub struct JsonEntityPrinter;

impl JsonEntityPrinter {
    pub fn new() -> Self {
        Self
    }

    /// Render one entity as `{ "<Name>": { ...properties } }`.
    pub fn print(&self, entity: &Entity) -> Json {
        json!({ entity.name(): self.print_properties(entity) })
    }

    /// Render the property map of an entity without its name wrapper.
    pub fn print_properties(&self, entity: &Entity) -> Json {
        let mut obj = Map::new();

        for (key, value) in entity.properties().iter() {
            if key == "originalId" {
                continue;
            }
            match value {
                Value::Entity(child) => {
                    obj.insert(child.name().to_string(), self.print_properties(child));
                }
                Value::EntityList(children) => {
                    let items: Vec<Json> = children.iter().map(|c| self.print(c)).collect();
                    obj.insert(key.to_string(), Json::Array(items));
                }
                Value::DataSet(set) | Value::Table(set) if key == "VALUE" => {
                    obj.insert("value".to_string(), data_set_json(set));
                }
                other => {
                    let slot = if key == "VALUE" { "value" } else { key };
                    obj.insert(slot.to_string(), scalar_json(other));
                }
            }
        }

        if let Some(children) = entity.list() {
            let items: Vec<Json> = children.iter().map(|c| self.print(c)).collect();
            obj.insert("list".to_string(), Json::Array(items));
        }

        Json::Object(obj)
    }
}

impl Default for JsonEntityPrinter {
    fn default() -> Self {
        Self::new()
    }
}

fn scalar_json(value: &Value) -> Json {
    match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(i) => json!(i),
        Value::Double(d) => json!(d),
        Value::Vector(v) => json!(v),
        other => Json::String(other.to_text()),
    }
}

fn data_set_json(set: &DataSet) -> Json {
    let mut obj = Map::new();
    for entry in set.iter() {
        if entry.removed {
            continue;
        }
        let v = match &entry.value {
            DataSetValue::String(s) => Json::String(s.clone()),
            DataSetValue::Integer(i) => json!(i),
            DataSetValue::Double(d) => json!(d),
            DataSetValue::DataSet(row) => data_set_json(row),
        };
        obj.insert(entry.key.clone(), v);
    }
    Json::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::value::DataSetEntry;
    use crate::entity::Properties;
    use std::sync::Arc;

    #[test]
    fn test_print_scalars_typed() {
        let mut props = Properties::new();
        props.insert("dataItemId", "x1");
        props.insert("sequence", Value::Integer(7));
        props.insert("VALUE", Value::Double(10.5));
        let e = Entity::new("Position", props);

        let json = JsonEntityPrinter::new().print(&e);
        assert_eq!(json["Position"]["dataItemId"], "x1");
        assert_eq!(json["Position"]["sequence"], 7);
        assert_eq!(json["Position"]["value"], 10.5);
    }

    #[test]
    fn test_print_data_set_as_object() {
        let mut set = DataSet::new();
        set.insert(DataSetEntry::new("a", DataSetValue::Integer(1)));
        set.insert(DataSetEntry::removed("b"));
        let mut props = Properties::new();
        props.insert("VALUE", Value::DataSet(set));
        let e = Entity::new("VariableDataSet", props);

        let json = JsonEntityPrinter::new().print(&e);
        assert_eq!(json["VariableDataSet"]["value"]["a"], 1);
        assert!(json["VariableDataSet"]["value"].get("b").is_none());
    }

    #[test]
    fn test_print_list_children() {
        let child = Arc::new(Entity::new("Customer", {
            let mut p = Properties::new();
            p.insert("customerId", "C1");
            p
        }));
        let mut props = Properties::new();
        props.insert("LIST", Value::EntityList(vec![child]));
        let e = Entity::new("Customers", props);

        let json = JsonEntityPrinter::new().print(&e);
        assert_eq!(json["Customers"]["list"][0]["Customer"]["customerId"], "C1");
    }
}
