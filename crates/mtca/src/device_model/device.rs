// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Devices and device-model document loading.
//!
//! The device descriptor ontology itself stays narrow here: enough of the
//! component/data-item tree to drive probe documents, path filters, and
//! pipeline lookups. Loading rejects duplicate data-item ids, which is a
//! fatal configuration error.

use std::collections::HashMap;
use std::sync::Arc;

use roxmltree::{Document, Node};

use crate::entity::{Properties, Value};
use crate::error::{Error, Result};

use super::component::Component;
use super::data_item::{DataItem, DataItemPtr};

pub type DevicePtr = Arc<Device>;

/// One device: a named, uuid-keyed component tree.
#[derive(Debug)]
pub struct Device {
    root: Component,
    name: String,
    uuid: String,
}

impl Device {
    pub fn new(root: Component) -> Result<Device> {
        let name = root
            .name()
            .ok_or_else(|| Error::InvalidDeviceModel("device has no name".into()))?
            .to_string();
        let uuid = root
            .uuid()
            .ok_or_else(|| Error::InvalidDeviceModel(format!("device {} has no uuid", name)))?
            .to_string();
        Ok(Device { root, name, uuid })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn root(&self) -> &Component {
        &self.root
    }

    pub fn data_items(&self) -> Vec<DataItemPtr> {
        self.root.all_data_items()
    }

    /// Find a data item by id, name, or source. Adapters key observations
    /// by whatever identifier they have.
    pub fn data_item(&self, key: &str) -> Option<DataItemPtr> {
        self.data_items().into_iter().find(|item| {
            item.id() == key || item.name() == Some(key) || item.source() == Some(key)
        })
    }

    /// The availability data item, when the device declares one.
    pub fn availability(&self) -> Option<DataItemPtr> {
        self.data_items()
            .into_iter()
            .find(|item| item.type_name() == "AVAILABILITY")
    }
}

/// All devices known to the agent, with the id→item index used by ingest.
#[derive(Debug, Default)]
pub struct DeviceMap {
    devices: Vec<DevicePtr>,
    by_id: HashMap<String, DataItemPtr>,
}

impl DeviceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, device: Device) -> Result<DevicePtr> {
        for item in device.data_items() {
            if self.by_id.contains_key(item.id()) {
                return Err(Error::DuplicateDataItemId(item.id().to_string()));
            }
        }
        let device = Arc::new(device);
        for item in device.data_items() {
            self.by_id.insert(item.id().to_string(), item);
        }
        self.devices.push(Arc::clone(&device));
        Ok(device)
    }

    pub fn devices(&self) -> &[DevicePtr] {
        &self.devices
    }

    pub fn by_name(&self, name: &str) -> Option<&DevicePtr> {
        self.devices.iter().find(|d| d.name() == name)
    }

    pub fn by_uuid(&self, uuid: &str) -> Option<&DevicePtr> {
        self.devices.iter().find(|d| d.uuid() == uuid)
    }

    /// Resolve by name or uuid, the way request paths address devices.
    pub fn find(&self, key: &str) -> Option<&DevicePtr> {
        self.by_name(key).or_else(|| self.by_uuid(key))
    }

    pub fn data_item_by_id(&self, id: &str) -> Option<&DataItemPtr> {
        self.by_id.get(id)
    }

    pub fn data_item_count(&self) -> usize {
        self.by_id.len()
    }
}

/// Parse an `MTConnectDevices` (or bare `Devices`/`Device`) document.
pub fn parse_devices_xml(xml: &str) -> Result<Vec<Device>> {
    let doc = Document::parse(xml)
        .map_err(|e| Error::InvalidDeviceModel(format!("cannot parse device XML: {}", e)))?;

    let root = doc.root_element();
    let device_nodes: Vec<Node<'_, '_>> = match root.tag_name().name() {
        "MTConnectDevices" => root
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "Devices")
            .flat_map(|devices| devices.children().filter(Node::is_element).collect::<Vec<_>>())
            .collect(),
        "Devices" => root.children().filter(Node::is_element).collect(),
        "Device" | "Agent" => vec![root],
        other => {
            return Err(Error::InvalidDeviceModel(format!(
                "unexpected root element {}",
                other
            )))
        }
    };

    let mut devices = Vec::new();
    for node in device_nodes {
        // The device uuid flows down to its data items.
        let uuid = node.attribute("uuid").unwrap_or_default();
        let component = parse_component(node, uuid, "")?;
        devices.push(Device::new(component)?);
    }
    Ok(devices)
}

fn parse_component(node: Node<'_, '_>, device_uuid: &str, _parent_id: &str) -> Result<Component> {
    let element = node.tag_name().name().to_string();
    let id = node
        .attribute("id")
        .ok_or_else(|| Error::InvalidDeviceModel(format!("{} has no id", element)))?
        .to_string();

    let mut component = Component::new(element, id.clone());
    if let Some(name) = node.attribute("name") {
        component = component.with_name(name);
    }
    if let Some(uuid) = node.attribute("uuid") {
        component = component.with_uuid(uuid);
    }

    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "Description" => {
                let mut attrs = Properties::new();
                for attr in child.attributes() {
                    attrs.insert(attr.name().to_string(), Value::String(attr.value().into()));
                }
                let body = child
                    .text()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from);
                component.set_description(attrs, body);
            }
            "DataItems" => {
                for item_node in child
                    .children()
                    .filter(|n| n.is_element() && n.tag_name().name() == "DataItem")
                {
                    component.add_data_item(parse_data_item(item_node, device_uuid, &id)?);
                }
            }
            "Components" => {
                for comp_node in child.children().filter(Node::is_element) {
                    component.add_child(parse_component(comp_node, device_uuid, &id)?);
                }
            }
            // Configuration, References, Compositions: outside the narrow model.
            _ => {}
        }
    }

    Ok(component)
}

fn parse_data_item(node: Node<'_, '_>, device_uuid: &str, component_id: &str) -> Result<DataItemPtr> {
    let mut props = Properties::new();
    for attr in node.attributes() {
        props.insert(attr.name().to_string(), Value::String(attr.value().into()));
    }
    props.insert("componentId", Value::String(component_id.to_string()));
    props.insert("deviceUuid", Value::String(device_uuid.to_string()));

    // Filter children feed the pipeline's delta and period filters.
    for filters in node
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Filters")
    {
        for filter in filters
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "Filter")
        {
            let value = filter.text().unwrap_or_default().trim().to_string();
            match filter.attribute("type") {
                Some("MINIMUM_DELTA") => props.insert("minimumDelta", Value::String(value)),
                Some("PERIOD") => props.insert("filterPeriod", Value::String(value)),
                _ => {}
            }
        }
    }

    DataItem::make(props).map_err(|e| Error::InvalidDeviceModel(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_DEVICE_XML: &str = r#"
        <MTConnectDevices>
          <Devices>
            <Device id="d1" name="LinuxCNC" uuid="000">
              <Description manufacturer="NIST">Test device</Description>
              <DataItems>
                <DataItem id="avail" type="AVAILABILITY" category="EVENT"/>
              </DataItems>
              <Components>
                <Controller id="cont" name="controller">
                  <DataItems>
                    <DataItem id="mode" type="CONTROLLER_MODE" category="EVENT"/>
                    <DataItem id="exec" type="EXECUTION" category="EVENT"/>
                    <DataItem id="load" type="LOAD" category="SAMPLE" units="PERCENT">
                      <Filters>
                        <Filter type="MINIMUM_DELTA">5</Filter>
                      </Filters>
                    </DataItem>
                  </DataItems>
                </Controller>
              </Components>
            </Device>
            <Device id="d2" name="Agent" uuid="agent-1">
              <DataItems>
                <DataItem id="agent_avail" type="AVAILABILITY" category="EVENT"/>
              </DataItems>
            </Device>
          </Devices>
        </MTConnectDevices>"#;

    #[test]
    fn test_parse_two_devices() {
        let devices = parse_devices_xml(TWO_DEVICE_XML).expect("device XML should parse");
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name(), "LinuxCNC");
        assert_eq!(devices[0].uuid(), "000");
        assert_eq!(devices[1].name(), "Agent");
    }

    #[test]
    fn test_data_item_lookup_and_filters() {
        let devices = parse_devices_xml(TWO_DEVICE_XML).expect("device XML should parse");
        let device = &devices[0];

        let load = device.data_item("load").expect("load item exists");
        assert_eq!(load.minimum_delta(), Some(5.0));
        assert_eq!(load.component_id(), "cont");
        assert_eq!(load.device_uuid(), "000");

        assert!(device.availability().is_some());
        assert!(device.data_item("missing").is_none());
    }

    #[test]
    fn test_device_map_rejects_duplicate_ids() {
        let devices = parse_devices_xml(TWO_DEVICE_XML).expect("device XML should parse");
        let mut map = DeviceMap::new();
        for d in devices {
            map.add(d).expect("devices should register");
        }
        assert_eq!(map.devices().len(), 2);
        assert!(map.data_item_by_id("exec").is_some());
        assert!(map.find("LinuxCNC").is_some());
        assert!(map.find("000").is_some());

        let dup = parse_devices_xml(
            r#"<Device id="d3" name="Dup" uuid="111">
                 <DataItems><DataItem id="exec" type="EXECUTION" category="EVENT"/></DataItems>
               </Device>"#,
        )
        .expect("device XML should parse")
        .remove(0);
        let err = map.add(dup).expect_err("duplicate id must be fatal");
        assert!(matches!(err, Error::DuplicateDataItemId(id) if id == "exec"));
    }
}
