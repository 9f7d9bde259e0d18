// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! JSON document printer (version-2 layout: component streams and
//! category buckets are arrays of entities keyed by element name).

use std::collections::HashMap;

use serde_json::{json, Map, Value as Json};

use crate::asset::AssetPtr;
use crate::device_model::{Component, DevicePtr};
use crate::entity::JsonEntityPrinter;
use crate::observation::ObservationPtr;

use super::{group_observations, HeaderInfo, Printer};

pub struct JsonPrinter {
    entities: JsonEntityPrinter,
}

impl JsonPrinter {
    pub fn new() -> Self {
        Self {
            entities: JsonEntityPrinter::new(),
        }
    }

    fn header_json(
        &self,
        header: &HeaderInfo,
        kind: Kind,
        counts_by_type: Option<&HashMap<String, usize>>,
    ) -> Json {
        let mut obj = Map::new();
        obj.insert("creationTime".into(), json!(HeaderInfo::creation_time()));
        obj.insert("sender".into(), json!(header.sender));
        obj.insert("instanceId".into(), json!(header.instance_id));
        obj.insert("version".into(), json!(header.version));
        match kind {
            Kind::Devices => {
                obj.insert("bufferSize".into(), json!(header.buffer_size));
                obj.insert("assetBufferSize".into(), json!(header.asset_buffer_size));
                obj.insert("assetCount".into(), json!(header.asset_count));
                // Per-type tally, sorted for stable output.
                if let Some(counts) = counts_by_type.filter(|c| !c.is_empty()) {
                    let mut types: Vec<(&String, &usize)> = counts.iter().collect();
                    types.sort_by(|a, b| a.0.cmp(b.0));
                    let mut tally = Map::new();
                    for (asset_type, count) in types {
                        tally.insert(asset_type.clone(), json!(count));
                    }
                    obj.insert("assetCounts".into(), Json::Object(tally));
                }
            }
            Kind::Streams => {
                obj.insert("bufferSize".into(), json!(header.buffer_size));
                obj.insert("nextSequence".into(), json!(header.next_sequence));
                obj.insert("firstSequence".into(), json!(header.first_sequence));
                obj.insert("lastSequence".into(), json!(header.last_sequence));
            }
            Kind::Assets => {
                obj.insert("assetBufferSize".into(), json!(header.asset_buffer_size));
                obj.insert("assetCount".into(), json!(header.asset_count));
            }
            Kind::Error => {
                obj.insert("bufferSize".into(), json!(header.buffer_size));
            }
        }
        Json::Object(obj)
    }

    fn component_json(&self, component: &Component) -> Json {
        let mut obj = Map::new();
        obj.insert("id".into(), json!(component.id()));
        if let Some(name) = component.name() {
            obj.insert("name".into(), json!(name));
        }
        if let Some(uuid) = component.uuid() {
            obj.insert("uuid".into(), json!(uuid));
        }
        if let Some((attrs, body)) = component.description() {
            let mut desc = Map::new();
            for (key, value) in attrs.iter() {
                desc.insert(key.to_string(), json!(value.to_text()));
            }
            if let Some(text) = body {
                desc.insert("value".into(), json!(text));
            }
            obj.insert("Description".into(), Json::Object(desc));
        }
        if !component.data_items().is_empty() {
            let items: Vec<Json> = component
                .data_items()
                .iter()
                .map(|item| {
                    let mut di = Map::new();
                    di.insert("id".into(), json!(item.id()));
                    di.insert("type".into(), json!(item.type_name()));
                    di.insert(
                        "category".into(),
                        json!(match item.category() {
                            crate::device_model::Category::Sample => "SAMPLE",
                            crate::device_model::Category::Event => "EVENT",
                            crate::device_model::Category::Condition => "CONDITION",
                        }),
                    );
                    if let Some(name) = item.name() {
                        di.insert("name".into(), json!(name));
                    }
                    if let Some(units) = item.units() {
                        di.insert("units".into(), json!(units));
                    }
                    json!({ "DataItem": Json::Object(di) })
                })
                .collect();
            obj.insert("DataItems".into(), Json::Array(items));
        }
        if !component.children().is_empty() {
            let children: Vec<Json> = component
                .children()
                .iter()
                .map(|child| json!({ child.element(): self.component_json(child) }))
                .collect();
            obj.insert("Components".into(), Json::Array(children));
        }
        Json::Object(obj)
    }

    fn observation_json(&self, obs: &ObservationPtr) -> Json {
        self.entities.print(&obs.to_entity())
    }
}

enum Kind {
    Devices,
    Streams,
    Assets,
    Error,
}

impl Default for JsonPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Printer for JsonPrinter {
    fn mime_type(&self) -> &'static str {
        "application/json"
    }

    fn print_probe(
        &self,
        header: &HeaderInfo,
        devices: &[DevicePtr],
        counts_by_type: &HashMap<String, usize>,
        pretty: bool,
    ) -> String {
        let devices_json: Vec<Json> = devices
            .iter()
            .map(|d| json!({ d.root().element(): self.component_json(d.root()) }))
            .collect();

        let doc = json!({
            "MTConnectDevices": {
                "Header": self.header_json(header, Kind::Devices, Some(counts_by_type)),
                "Devices": devices_json,
            }
        });
        render(doc, pretty)
    }

    fn print_sample(
        &self,
        header: &HeaderInfo,
        devices: &[DevicePtr],
        observations: &[ObservationPtr],
        pretty: bool,
    ) -> String {
        let streams: Vec<Json> = group_observations(devices, observations)
            .into_iter()
            .map(|group| {
                let component_streams: Vec<Json> = group
                    .components
                    .iter()
                    .filter(|b| !b.is_empty())
                    .map(|bucket| {
                        let mut cs = Map::new();
                        cs.insert("component".into(), json!(bucket.component.element()));
                        cs.insert("componentId".into(), json!(bucket.component.id()));
                        if let Some(name) = bucket.component.name() {
                            cs.insert("name".into(), json!(name));
                        }
                        if !bucket.samples.is_empty() {
                            let samples: Vec<Json> =
                                bucket.samples.iter().map(|o| self.observation_json(o)).collect();
                            cs.insert("Samples".into(), Json::Array(samples));
                        }
                        if !bucket.events.is_empty() {
                            let events: Vec<Json> =
                                bucket.events.iter().map(|o| self.observation_json(o)).collect();
                            cs.insert("Events".into(), Json::Array(events));
                        }
                        if !bucket.conditions.is_empty() {
                            let conditions: Vec<Json> = bucket
                                .conditions
                                .iter()
                                .map(|o| self.observation_json(o))
                                .collect();
                            cs.insert("Condition".into(), Json::Array(conditions));
                        }
                        json!({ "ComponentStream": Json::Object(cs) })
                    })
                    .collect();

                json!({
                    "DeviceStream": {
                        "name": group.device.name(),
                        "uuid": group.device.uuid(),
                        "ComponentStreams": component_streams,
                    }
                })
            })
            .collect();

        let doc = json!({
            "MTConnectStreams": {
                "Header": self.header_json(header, Kind::Streams, None),
                "Streams": streams,
            }
        });
        render(doc, pretty)
    }

    fn print_assets(&self, header: &HeaderInfo, assets: &[AssetPtr], pretty: bool) -> String {
        let assets_json: Vec<Json> = assets
            .iter()
            .map(|a| self.entities.print(a.entity()))
            .collect();
        let doc = json!({
            "MTConnectAssets": {
                "Header": self.header_json(header, Kind::Assets, None),
                "Assets": assets_json,
            }
        });
        render(doc, pretty)
    }

    fn print_error(&self, header: &HeaderInfo, code: &str, message: &str, pretty: bool) -> String {
        let doc = json!({
            "MTConnectError": {
                "Header": self.header_json(header, Kind::Error, None),
                "Errors": [ { "Error": { "errorCode": code, "value": message } } ],
            }
        });
        render(doc, pretty)
    }
}

fn render(doc: Json, pretty: bool) -> String {
    if pretty {
        serde_json::to_string_pretty(&doc).unwrap_or_default()
    } else {
        serde_json::to_string(&doc).unwrap_or_default()
    }
}
