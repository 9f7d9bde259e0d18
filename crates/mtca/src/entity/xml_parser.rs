// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! XML document parsing into entities through a factory tree.
//!
//! Attributes become scalar properties, child elements become nested
//! entities resolved through the factory's child lookup, text content
//! becomes `VALUE`, and `Entry`/`Cell` children become data-set and table
//! values. Validation happens inside `Factory::create`, so one pass yields
//! both the entity tree and the collected error list.

use roxmltree::{Document, Node};

use super::factory::FactoryPtr;
use super::value::{DataSet, DataSetEntry, DataSetValue, EntityPtr, Value};
use super::{EntityError, ErrorList, Properties};

/// Parse an XML document, resolving the root element through `factory`.
pub fn parse_entity_xml(xml: &str, factory: &FactoryPtr) -> Result<(EntityPtr, ErrorList), EntityError> {
    let doc = Document::parse(xml)
        .map_err(|e| EntityError::Document(format!("cannot parse XML document: {}", e)))?;

    let root = doc.root_element();
    let name = root.tag_name().name().to_string();
    let root_factory = factory
        .factory_for(&name)
        .ok_or_else(|| EntityError::Document(format!("no factory for root element {}", name)))?;

    let mut errors = ErrorList::new();
    let entity = parse_element(root, root_factory, &mut errors).ok_or_else(|| {
        errors
            .first()
            .cloned()
            .unwrap_or_else(|| EntityError::Document(format!("cannot create element {}", name)))
    })?;

    Ok((entity, errors))
}

fn parse_element(node: Node<'_, '_>, factory: &FactoryPtr, errors: &mut ErrorList) -> Option<EntityPtr> {
    let name = node.tag_name().name().to_string();
    let mut props = Properties::new();

    for attr in node.attributes() {
        props.insert(attr.name().to_string(), Value::String(attr.value().to_string()));
    }

    let mut list_children: Vec<EntityPtr> = Vec::new();
    let mut data_set: Option<DataSet> = None;

    for child in node.children() {
        if child.is_text() {
            let text = child.text().unwrap_or_default();
            if !text.trim().is_empty() {
                props.insert("VALUE", Value::String(text.trim().to_string()));
            }
            continue;
        }
        if !child.is_element() {
            continue;
        }

        let child_name = child.tag_name().name();
        if child_name == "Entry" {
            let set = data_set.get_or_insert_with(DataSet::new);
            parse_entry(child, set);
            continue;
        }

        if factory.is_list() {
            match factory.factory_for(child_name) {
                Some(child_factory) => {
                    if let Some(e) = parse_element(child, child_factory, errors) {
                        list_children.push(e);
                    }
                }
                None => errors.push(EntityError::InvalidElement {
                    entity: name.clone(),
                    element: child_name.to_string(),
                }),
            }
            continue;
        }

        match factory.factory_for(child_name) {
            Some(child_factory) if child_factory.is_list() => {
                let mut grandchildren = Vec::new();
                for gc in child.children().filter(Node::is_element) {
                    let gc_name = gc.tag_name().name();
                    match child_factory.factory_for(gc_name) {
                        Some(gc_factory) => {
                            if let Some(e) = parse_element(gc, gc_factory, errors) {
                                grandchildren.push(e);
                            }
                        }
                        None => errors.push(EntityError::InvalidElement {
                            entity: child_name.to_string(),
                            element: gc_name.to_string(),
                        }),
                    }
                }
                if let Some(list) = child_factory.create_list(child_name, grandchildren, errors) {
                    props.insert(child_name.to_string(), Value::Entity(list));
                }
            }
            Some(child_factory) => {
                if let Some(entity) = parse_element(child, child_factory, errors) {
                    insert_child(&mut props, child_name, entity);
                }
            }
            None => {
                // factory_for falls back to the any-extension factory, so
                // a miss here means the element is genuinely unknown.
                errors.push(EntityError::InvalidElement {
                    entity: name.clone(),
                    element: child_name.to_string(),
                });
            }
        }
    }

    if let Some(set) = data_set {
        props.insert("VALUE", Value::DataSet(set));
    }
    if factory.is_list() && !list_children.is_empty() {
        props.insert("LIST", Value::EntityList(list_children));
    }

    factory.create(&name, props, errors)
}

/// Repeated same-named children collapse into an entity list property.
fn insert_child(props: &mut Properties, name: &str, entity: EntityPtr) {
    match props.remove(name) {
        None => props.insert(name.to_string(), Value::Entity(entity)),
        Some(Value::Entity(first)) => {
            props.insert(name.to_string(), Value::EntityList(vec![first, entity]));
        }
        Some(Value::EntityList(mut list)) => {
            list.push(entity);
            props.insert(name.to_string(), Value::EntityList(list));
        }
        Some(other) => {
            // A scalar property shadowed by an element of the same name;
            // keep the element, the factory will flag the mismatch.
            props.insert(name.to_string(), other);
            let _ = entity;
        }
    }
}

fn parse_entry(node: Node<'_, '_>, set: &mut DataSet) {
    let Some(key) = node.attribute("key") else {
        return;
    };
    let removed = node.attribute("removed") == Some("true");
    if removed {
        set.insert(DataSetEntry::removed(key));
        return;
    }

    let cells: Vec<Node<'_, '_>> = node
        .children()
        .filter(|c| c.is_element() && c.tag_name().name() == "Cell")
        .collect();

    if cells.is_empty() {
        let text = node.text().unwrap_or_default().trim().to_string();
        set.insert(DataSetEntry::new(key, typed(&text)));
    } else {
        let mut row = DataSet::new();
        for cell in cells {
            if let Some(cell_key) = cell.attribute("key") {
                let text = cell.text().unwrap_or_default().trim().to_string();
                row.insert(DataSetEntry::new(cell_key, typed(&text)));
            }
        }
        set.insert(DataSetEntry::new(key, DataSetValue::DataSet(row)));
    }
}

fn typed(raw: &str) -> DataSetValue {
    if let Ok(i) = raw.parse::<i64>() {
        DataSetValue::Integer(i)
    } else if let Ok(d) = raw.parse::<f64>() {
        DataSetValue::Double(d)
    } else {
        DataSetValue::String(raw.to_string())
    }
}

/// Convenience wrapper returning only the entity when no errors occurred.
pub fn parse_strict(xml: &str, factory: &FactoryPtr) -> Result<EntityPtr, EntityError> {
    let (entity, errors) = parse_entity_xml(xml, factory)?;
    if let Some(first) = errors.into_iter().next() {
        return Err(first);
    }
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::entity::factory::{any_factory, Factory};
    use crate::entity::requirement::Requirement;
    use crate::entity::ValueKind;

    fn fixture_factory() -> FactoryPtr {
        let customer = Arc::new(Factory::new(vec![
            Requirement::required("customerId"),
            Requirement::new("VALUE", ValueKind::String, false),
        ]));

        let mut customers = Factory::new(vec![]);
        customers.set_list(true);
        customers.register("Customer", customer);

        let mut part = Factory::new(vec![
            Requirement::required("assetId"),
            Requirement::optional("timestamp"),
        ]);
        part.register("Customers", Arc::new(customers));
        part.set_any(any_factory());

        let mut root = Factory::new(vec![]);
        root.register("PartArchetype", Arc::new(part));
        Arc::new(root)
    }

    #[test]
    fn test_parse_nested_list() {
        let xml = r#"<PartArchetype assetId="PART1234">
            <Customers>
                <Customer customerId="C00241">Acme</Customer>
            </Customers>
        </PartArchetype>"#;

        let factory = fixture_factory();
        let (entity, errors) = parse_entity_xml(xml, &factory).expect("document should parse");
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        assert_eq!(entity.get_string("assetId"), Some("PART1234"));

        let customers = entity.get_list("Customers").expect("customers list");
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].get_string("customerId"), Some("C00241"));
        assert_eq!(customers[0].value_text().as_deref(), Some("Acme"));
    }

    #[test]
    fn test_parse_entries_into_data_set() {
        let ds_factory = Arc::new(Factory::new(vec![Requirement::new(
            "VALUE",
            ValueKind::DataSet,
            false,
        )]));
        let mut root = Factory::new(vec![]);
        root.register("VariableDataSet", ds_factory);
        let root = Arc::new(root);

        let xml = r#"<VariableDataSet>
            <Entry key="a">1</Entry>
            <Entry key="b">text</Entry>
            <Entry key="c" removed="true"/>
        </VariableDataSet>"#;

        let (entity, errors) = parse_entity_xml(xml, &root).expect("should parse");
        assert!(errors.is_empty());
        let Some(Value::DataSet(set)) = entity.value() else {
            panic!("expected data set value, got {:?}", entity.value());
        };
        assert_eq!(set.len(), 3);
        assert!(set.get("c").expect("entry c").removed);
    }

    #[test]
    fn test_unknown_element_reported() {
        let mut root = Factory::new(vec![]);
        root.register("Device", Arc::new(Factory::new(vec![])));
        let root = Arc::new(root);

        let xml = "<Device><Bogus/></Device>";
        let (_, errors) = parse_entity_xml(xml, &root).expect("root parses");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "Invalid element Bogus in Device");
    }
}
