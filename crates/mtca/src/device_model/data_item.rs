// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Data item descriptors.
//!
//! A data item identifies one observable signal on a device: id, type,
//! category, units, representation, and the filter settings the pipeline
//! consults. Descriptors are built once at device-model load and shared
//! read-only; the embedded [`ChangeSignaler`] is the only interior-mutable
//! part.

use std::sync::Arc;

use crate::entity::{EntityError, Properties, Value};
use crate::observation::ChangeSignaler;

use super::unit_conversion::UnitConversion;

pub type DataItemPtr = Arc<DataItem>;

/// Observation category of a data item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Sample,
    Event,
    Condition,
}

impl Category {
    pub fn parse(s: &str) -> Option<Category> {
        match s {
            "SAMPLE" => Some(Category::Sample),
            "EVENT" => Some(Category::Event),
            "CONDITION" => Some(Category::Condition),
            _ => None,
        }
    }

    /// Prefix used in observation factory keys.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Category::Sample => "Samples:",
            Category::Event => "Events:",
            Category::Condition => "Condition:",
        }
    }
}

/// Value shape of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Representation {
    #[default]
    Value,
    DataSet,
    Table,
    TimeSeries,
    Discrete,
}

impl Representation {
    pub fn parse(s: &str) -> Option<Representation> {
        match s {
            "VALUE" => Some(Representation::Value),
            "DATA_SET" => Some(Representation::DataSet),
            "TABLE" => Some(Representation::Table),
            "TIME_SERIES" => Some(Representation::TimeSeries),
            "DISCRETE" => Some(Representation::Discrete),
            _ => None,
        }
    }

    fn name_suffix(&self) -> &'static str {
        match self {
            Representation::Value => "",
            Representation::DataSet => "DataSet",
            Representation::Table => "Table",
            Representation::TimeSeries => "TimeSeries",
            Representation::Discrete => "Discrete",
        }
    }
}

/// Descriptor for one observable signal.
pub struct DataItem {
    id: String,
    name: Option<String>,
    source: Option<String>,
    type_: String,
    sub_type: Option<String>,
    category: Category,
    units: Option<String>,
    native_units: Option<String>,
    statistic: Option<String>,
    representation: Representation,
    /// Pipeline filter settings from the device model.
    minimum_delta: Option<f64>,
    filter_period: Option<f64>,
    /// Ids of the owning component and device, resolved through the device
    /// map rather than back-pointers.
    component_id: String,
    device_uuid: String,
    /// Observation element name, e.g. `Execution`, `PositionTimeSeries`.
    observation_name: String,
    /// Factory dispatch key, e.g. `Samples:Position:3D`.
    key: String,
    conversion: Option<UnitConversion>,
    conversion_required: bool,
    signaler: Arc<ChangeSignaler>,
}

impl std::fmt::Debug for DataItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataItem")
            .field("id", &self.id)
            .field("type", &self.type_)
            .field("category", &self.category)
            .field("key", &self.key)
            .finish()
    }
}

impl DataItem {
    /// Build a descriptor from a flat property bundle (device XML
    /// attributes plus optional filter settings).
    pub fn make(props: Properties) -> Result<DataItemPtr, EntityError> {
        let get = |name: &str| -> Option<String> {
            props.get(name).map(Value::to_text).filter(|s| !s.is_empty())
        };

        let id = get("id").ok_or(EntityError::MissingProperty {
            entity: "DataItem".into(),
            property: "id".into(),
        })?;
        let type_ = get("type").ok_or(EntityError::MissingProperty {
            entity: "DataItem".into(),
            property: "type".into(),
        })?;
        let category_raw = get("category").ok_or(EntityError::MissingProperty {
            entity: "DataItem".into(),
            property: "category".into(),
        })?;
        let category = Category::parse(&category_raw).ok_or(EntityError::InvalidVocabulary {
            entity: "DataItem".into(),
            property: "category".into(),
            value: category_raw,
        })?;

        let representation = match get("representation") {
            Some(raw) => Representation::parse(&raw).ok_or(EntityError::InvalidVocabulary {
                entity: "DataItem".into(),
                property: "representation".into(),
                value: raw,
            })?,
            None => Representation::default(),
        };

        let units = get("units");
        let native_units = get("nativeUnits");

        let observation_name = format!("{}{}", pascal_case(&type_), representation.name_suffix());
        let mut key = format!("{}{}", category.key_prefix(), observation_name);
        if units.as_deref().map_or(false, |u| u.ends_with("_3D")) {
            key.push_str(":3D");
        } else if category == Category::Event && representation == Representation::Value {
            // Numerically-typed events validate as integers or doubles.
            if INT_EVENTS.contains(&type_.as_str()) {
                key.push_str(":INT");
            } else if DOUBLE_EVENTS.contains(&type_.as_str()) {
                key.push_str(":DOUBLE");
            }
        }

        let conversion = match (&native_units, &units) {
            (Some(from), Some(to)) => UnitConversion::make(from, to),
            _ => None,
        };

        let parse_num = |name: &str| -> Result<Option<f64>, EntityError> {
            match get(name) {
                None => Ok(None),
                Some(raw) => raw.parse::<f64>().map(Some).map_err(|_| {
                    EntityError::InvalidNumeric {
                        entity: "DataItem".into(),
                        property: name.into(),
                    }
                }),
            }
        };

        Ok(Arc::new(DataItem {
            name: get("name"),
            source: get("source"),
            sub_type: get("subType"),
            statistic: get("statistic"),
            minimum_delta: parse_num("minimumDelta")?,
            filter_period: parse_num("filterPeriod")?,
            component_id: get("componentId").unwrap_or_default(),
            device_uuid: get("deviceUuid").unwrap_or_default(),
            conversion_required: conversion.is_some(),
            id,
            type_,
            category,
            units,
            native_units,
            representation,
            observation_name,
            key,
            conversion,
            signaler: Arc::new(ChangeSignaler::new()),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Adapter-facing name: source, then name, then id.
    pub fn source_or_name(&self) -> &str {
        self.source
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }

    pub fn type_name(&self) -> &str {
        &self.type_
    }

    pub fn sub_type(&self) -> Option<&str> {
        self.sub_type.as_deref()
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn native_units(&self) -> Option<&str> {
        self.native_units.as_deref()
    }

    pub fn statistic(&self) -> Option<&str> {
        self.statistic.as_deref()
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    pub fn minimum_delta(&self) -> Option<f64> {
        self.minimum_delta
    }

    pub fn filter_period(&self) -> Option<f64> {
        self.filter_period
    }

    pub fn component_id(&self) -> &str {
        &self.component_id
    }

    pub fn device_uuid(&self) -> &str {
        &self.device_uuid
    }

    pub fn observation_name(&self) -> &str {
        &self.observation_name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn conversion(&self) -> Option<&UnitConversion> {
        self.conversion.as_ref()
    }

    pub fn conversion_required(&self) -> bool {
        self.conversion_required
    }

    pub fn signaler(&self) -> &Arc<ChangeSignaler> {
        &self.signaler
    }

    pub fn is_sample(&self) -> bool {
        self.category == Category::Sample
    }

    pub fn is_condition(&self) -> bool {
        self.category == Category::Condition
    }

    pub fn is_data_set(&self) -> bool {
        matches!(
            self.representation,
            Representation::DataSet | Representation::Table
        )
    }

    pub fn is_table(&self) -> bool {
        self.representation == Representation::Table
    }

    pub fn is_timeseries(&self) -> bool {
        self.representation == Representation::TimeSeries
    }

    pub fn is_discrete(&self) -> bool {
        self.representation == Representation::Discrete
    }

    pub fn is_three_space(&self) -> bool {
        self.units.as_deref().map_or(false, |u| u.ends_with("_3D"))
    }
}

/// Event types whose values are integers.
const INT_EVENTS: &[&str] = &[
    "PART_COUNT",
    "LINE_NUMBER",
    "BLOCK_COUNT",
    "TOOL_NUMBER",
    "SEQUENCE_NUMBER",
];

/// Event types whose values are doubles.
const DOUBLE_EVENTS: &[&str] = &["PART_COUNT_LIMIT", "LOAD_COUNT"];

/// `CONTROLLER_MODE` → `ControllerMode`, preserving `x:` extension prefixes.
pub fn pascal_case(type_name: &str) -> String {
    let (prefix, rest) = match type_name.split_once(':') {
        Some((p, r)) => (Some(p), r),
        None => (None, type_name),
    };

    let mut out = String::with_capacity(rest.len());
    if let Some(p) = prefix {
        out.push_str(p);
        out.push(':');
    }
    for part in rest.split('_') {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.extend(chars.flat_map(char::to_lowercase));
        }
    }
    out
}
