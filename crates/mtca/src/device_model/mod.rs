// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Device model descriptors: the narrow slice of the MTConnect device
//! ontology the agent core needs (component trees, data-item descriptors,
//! unit conversion). The full descriptor vocabulary lives outside the
//! core; only its interface surfaces here.

mod component;
mod data_item;
mod device;
mod unit_conversion;

pub use component::Component;
pub use data_item::{pascal_case, Category, DataItem, DataItemPtr, Representation};
pub use device::{parse_devices_xml, Device, DeviceMap, DevicePtr};
pub use unit_conversion::UnitConversion;
