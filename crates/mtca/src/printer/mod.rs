// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Document printers: MTConnectDevices / MTConnectStreams / MTConnectAssets
//! / MTConnectError in XML and JSON.
//!
//! Printers are stateless; everything request-specific arrives through
//! [`HeaderInfo`] and the payload. Observation grouping (device stream →
//! component stream → category bucket) is shared between the two formats.

mod json;
mod xml;

pub use json::JsonPrinter;
pub use xml::XmlPrinter;

use std::collections::HashMap;

use chrono::Utc;

use crate::asset::AssetPtr;
use crate::device_model::{Category, Component, DevicePtr};
use crate::observation::ObservationPtr;

/// Header attributes shared by every document kind.
#[derive(Debug, Clone, Default)]
pub struct HeaderInfo {
    pub instance_id: u64,
    pub sender: String,
    pub version: String,
    pub buffer_size: usize,
    pub next_sequence: u64,
    pub first_sequence: u64,
    pub last_sequence: u64,
    pub asset_buffer_size: usize,
    pub asset_count: usize,
}

impl HeaderInfo {
    pub fn creation_time() -> String {
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

/// Output document format.
pub trait Printer: Send + Sync {
    fn mime_type(&self) -> &'static str;

    fn print_probe(
        &self,
        header: &HeaderInfo,
        devices: &[DevicePtr],
        counts_by_type: &HashMap<String, usize>,
        pretty: bool,
    ) -> String;

    fn print_sample(
        &self,
        header: &HeaderInfo,
        devices: &[DevicePtr],
        observations: &[ObservationPtr],
        pretty: bool,
    ) -> String;

    fn print_assets(&self, header: &HeaderInfo, assets: &[AssetPtr], pretty: bool) -> String;

    fn print_error(&self, header: &HeaderInfo, code: &str, message: &str, pretty: bool) -> String;
}

/// One component's observations bucketed by category.
pub struct ComponentBucket<'a> {
    pub component: &'a Component,
    pub samples: Vec<&'a ObservationPtr>,
    pub events: Vec<&'a ObservationPtr>,
    pub conditions: Vec<&'a ObservationPtr>,
}

impl ComponentBucket<'_> {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.events.is_empty() && self.conditions.is_empty()
    }
}

/// One device's observation groups in component order.
pub struct DeviceBucket<'a> {
    pub device: &'a DevicePtr,
    pub components: Vec<ComponentBucket<'a>>,
}

/// Group observations into the stream document shape. Components with no
/// observations are omitted; device order follows the device list and
/// component order the device tree.
pub fn group_observations<'a>(
    devices: &'a [DevicePtr],
    observations: &'a [ObservationPtr],
) -> Vec<DeviceBucket<'a>> {
    let mut by_component: HashMap<&str, Vec<&'a ObservationPtr>> = HashMap::new();
    for obs in observations {
        by_component
            .entry(obs.data_item().component_id())
            .or_default()
            .push(obs);
    }

    let mut out = Vec::new();
    for device in devices {
        let mut components = Vec::new();
        device.root().walk(&mut |component| {
            let Some(list) = by_component.get(component.id()) else {
                return;
            };
            let mut bucket = ComponentBucket {
                component,
                samples: Vec::new(),
                events: Vec::new(),
                conditions: Vec::new(),
            };
            for obs in list {
                match obs.data_item().category() {
                    Category::Sample => bucket.samples.push(obs),
                    Category::Event => bucket.events.push(obs),
                    Category::Condition => bucket.conditions.push(obs),
                }
            }
            components.push(bucket);
        });
        if !components.is_empty() {
            out.push(DeviceBucket { device, components });
        }
    }
    out
}


#[cfg(test)]
mod tests {
    use super::tests_support::*;
    use super::*;

    #[test]
    fn test_grouping_by_component_and_category() {
        let devices = test_devices();
        let observations = vec![
            observation(&devices, "avail", "AVAILABLE", 1),
            observation(&devices, "exec", "ACTIVE", 2),
            observation(&devices, "pos", "10.5", 3),
            observation(&devices, "cond", "NORMAL", 4),
        ];

        let groups = group_observations(&devices, &observations);
        assert_eq!(groups.len(), 1);
        let buckets = &groups[0].components;
        assert_eq!(buckets.len(), 2);

        // Device-level component holds availability.
        assert_eq!(buckets[0].component.element(), "Device");
        assert_eq!(buckets[0].events.len(), 1);

        // Controller holds the rest, split by category.
        assert_eq!(buckets[1].component.element(), "Controller");
        assert_eq!(buckets[1].events.len(), 1);
        assert_eq!(buckets[1].samples.len(), 1);
        assert_eq!(buckets[1].conditions.len(), 1);
    }

    #[test]
    fn test_empty_devices_omitted() {
        let devices = test_devices();
        let groups = group_observations(&devices, &[]);
        assert!(groups.is_empty());
    }
}
