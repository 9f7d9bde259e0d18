// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! XML output for entity trees.
//!
//! Scalar properties print as attributes in property order, `VALUE` as the
//! element body, entity and list properties as child elements, data sets as
//! `Entry` children and tables as `Entry`/`Cell`. With factory-constructed
//! entities this inverts [`super::parse_entity_xml`].

use std::fmt::Write;

use super::value::{DataSet, DataSetValue, Value};
use super::Entity;

/// Escape text for XML attribute or character data context.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Entity → XML printer with optional pretty indentation.
pub struct XmlEntityPrinter {
    pretty: bool,
}

impl XmlEntityPrinter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    pub fn print(&self, entity: &Entity) -> String {
        let mut out = String::new();
        self.print_into(&mut out, entity, 0);
        out
    }

    /// Append an entity subtree to an output buffer at the given depth.
    pub fn print_into(&self, out: &mut String, entity: &Entity, depth: usize) {
        self.indent(out, depth);
        let _ = write!(out, "<{}", entity.name());

        for (key, value) in entity.properties().iter() {
            if key == "VALUE" || key == "LIST" || key == "originalId" || value.is_composite() {
                continue;
            }
            if let Value::DataSet(_) | Value::Table(_) = value {
                continue;
            }
            let _ = write!(out, " {}=\"{}\"", key, escape_xml(&value.to_text()));
        }

        let body = entity.value();
        let has_entries = matches!(body, Some(Value::DataSet(_) | Value::Table(_)));
        let children: Vec<_> = entity
            .properties()
            .iter()
            .filter(|(k, v)| *k != "LIST" && v.is_composite())
            .collect();
        let list = entity.list();

        let empty = !has_entries
            && children.is_empty()
            && list.is_none()
            && body.map_or(true, |v| v.to_text().is_empty());
        if empty {
            out.push_str("/>");
            self.newline(out);
            return;
        }
        out.push('>');

        match body {
            Some(Value::DataSet(set)) => {
                self.newline(out);
                self.print_entries(out, set, false, depth + 1);
                self.indent(out, depth);
            }
            Some(Value::Table(set)) => {
                self.newline(out);
                self.print_entries(out, set, true, depth + 1);
                self.indent(out, depth);
            }
            Some(v) => {
                let _ = write!(out, "{}", escape_xml(&v.to_text()));
            }
            None => {}
        }

        if !children.is_empty() || list.is_some() {
            self.newline(out);
            for (_, value) in children {
                match value {
                    Value::Entity(child) => self.print_into(out, child, depth + 1),
                    Value::EntityList(entries) => {
                        for child in entries {
                            self.print_into(out, child, depth + 1);
                        }
                    }
                    _ => {}
                }
            }
            if let Some(entries) = list {
                for child in entries {
                    self.print_into(out, child, depth + 1);
                }
            }
            self.indent(out, depth);
        }

        let _ = write!(out, "</{}>", entity.name());
        self.newline(out);
    }

    fn print_entries(&self, out: &mut String, set: &DataSet, table: bool, depth: usize) {
        for entry in set.iter() {
            self.indent(out, depth);
            if entry.removed {
                let _ = write!(out, "<Entry key=\"{}\" removed=\"true\"/>", escape_xml(&entry.key));
                self.newline(out);
                continue;
            }
            match (&entry.value, table) {
                (DataSetValue::DataSet(row), _) => {
                    let _ = write!(out, "<Entry key=\"{}\">", escape_xml(&entry.key));
                    self.newline(out);
                    for cell in row.iter() {
                        self.indent(out, depth + 1);
                        let _ = write!(
                            out,
                            "<Cell key=\"{}\">{}</Cell>",
                            escape_xml(&cell.key),
                            escape_xml(&cell.value.to_string())
                        );
                        self.newline(out);
                    }
                    self.indent(out, depth);
                    out.push_str("</Entry>");
                }
                (value, _) => {
                    let _ = write!(
                        out,
                        "<Entry key=\"{}\">{}</Entry>",
                        escape_xml(&entry.key),
                        escape_xml(&value.to_string())
                    );
                }
            }
            self.newline(out);
        }
    }

    fn indent(&self, out: &mut String, depth: usize) {
        if self.pretty {
            for _ in 0..depth {
                out.push_str("  ");
            }
        }
    }

    fn newline(&self, out: &mut String) {
        if self.pretty {
            out.push('\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::value::{DataSet, DataSetEntry, DataSetValue};
    use crate::entity::{Properties, Value};
    use std::sync::Arc;

    #[test]
    fn test_print_scalar_attributes_and_body() {
        let mut props = Properties::new();
        props.insert("dataItemId", "x1");
        props.insert("sequence", Value::Integer(12));
        props.insert("VALUE", "ACTIVE");
        let e = Entity::new("Execution", props);

        let printer = XmlEntityPrinter::new(false);
        assert_eq!(
            printer.print(&e),
            r#"<Execution dataItemId="x1" sequence="12">ACTIVE</Execution>"#
        );
    }

    #[test]
    fn test_print_escapes_special_characters() {
        let mut props = Properties::new();
        props.insert("VALUE", "a < b & \"c\"");
        let e = Entity::new("Message", props);
        let printer = XmlEntityPrinter::new(false);
        assert_eq!(
            printer.print(&e),
            "<Message>a &lt; b &amp; &quot;c&quot;</Message>"
        );
    }

    #[test]
    fn test_print_nested_children() {
        let child = Arc::new(Entity::new("Customer", {
            let mut p = Properties::new();
            p.insert("customerId", "C00241");
            p
        }));
        let mut list_props = Properties::new();
        list_props.insert("LIST", Value::EntityList(vec![child]));
        let customers = Arc::new(Entity::new("Customers", list_props));

        let mut props = Properties::new();
        props.insert("assetId", "PART1234");
        props.insert("Customers", Value::Entity(customers));
        let part = Entity::new("PartArchetype", props);

        let printer = XmlEntityPrinter::new(false);
        assert_eq!(
            printer.print(&part),
            r#"<PartArchetype assetId="PART1234"><Customers><Customer customerId="C00241"/></Customers></PartArchetype>"#
        );
    }

    #[test]
    fn test_print_data_set_entries() {
        let mut set = DataSet::new();
        set.insert(DataSetEntry::new("a", DataSetValue::Integer(1)));
        set.insert(DataSetEntry::removed("b"));
        let mut props = Properties::new();
        props.insert("VALUE", Value::DataSet(set));
        let e = Entity::new("VariableDataSet", props);

        let printer = XmlEntityPrinter::new(false);
        assert_eq!(
            printer.print(&e),
            r#"<VariableDataSet><Entry key="a">1</Entry><Entry key="b" removed="true"/></VariableDataSet>"#
        );
    }

    #[test]
    fn test_round_trip_through_parser() {
        use crate::entity::factory::Factory;
        use crate::entity::requirement::Requirement;
        use crate::entity::xml_parser::parse_entity_xml;
        use crate::entity::ValueKind;

        let item = Arc::new(Factory::new(vec![
            Requirement::required("id"),
            Requirement::new("VALUE", ValueKind::String, false),
        ]));
        let mut root = Factory::new(vec![]);
        root.register("Item", item);
        let root = Arc::new(root);

        let xml = r#"<Item id="a">text</Item>"#;
        let (entity, errors) = parse_entity_xml(xml, &root).expect("should parse");
        assert!(errors.is_empty());

        let printed = XmlEntityPrinter::new(false).print(&entity);
        assert_eq!(printed, xml);
    }
}
