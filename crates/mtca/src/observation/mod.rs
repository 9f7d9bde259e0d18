// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Observations: timestamped values for data items.
//!
//! An observation is an entity specialization tied to its data-item
//! descriptor, stamped with a monotonic sequence at buffer admission. The
//! variant is a closed sum resolved from the data item's factory key
//! (`Samples:Position:3D`, `Events:Execution`, `Condition:Load`, ...).
//! Conditions carry a backward `prev` link forming the per-item chain of
//! currently-active alarms; links only point at older observations, so the
//! chain is a plain `Arc` list.

mod change_observer;

pub use change_observer::{ChangeObserver, ChangeSignaler};

use std::sync::{Arc, OnceLock};

use crate::device_model::DataItemPtr;
use crate::entity::{
    Entity, EntityError, ErrorList, Factory, FactoryPtr, Matcher, Properties, Requirement,
    Timestamp, Value, ValueKind,
};

pub type ObservationPtr = Arc<Observation>;

/// Condition severity level; doubles as the printed element name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionLevel {
    Normal,
    Warning,
    Fault,
    Unavailable,
}

impl ConditionLevel {
    pub fn parse(s: &str) -> Option<ConditionLevel> {
        match s.to_uppercase().as_str() {
            "NORMAL" => Some(ConditionLevel::Normal),
            "WARNING" => Some(ConditionLevel::Warning),
            "FAULT" => Some(ConditionLevel::Fault),
            "UNAVAILABLE" => Some(ConditionLevel::Unavailable),
            _ => None,
        }
    }

    pub fn element_name(&self) -> &'static str {
        match self {
            ConditionLevel::Normal => "Normal",
            ConditionLevel::Warning => "Warning",
            ConditionLevel::Fault => "Fault",
            ConditionLevel::Unavailable => "Unavailable",
        }
    }

    /// Levels that participate in chains; Normal and Unavailable reset.
    pub fn is_active(&self) -> bool {
        matches!(self, ConditionLevel::Warning | ConditionLevel::Fault)
    }
}

/// Condition-specific state carried alongside the entity properties.
#[derive(Debug, Clone)]
pub struct ConditionState {
    pub level: ConditionLevel,
    /// `conditionId` or `nativeCode`, whichever the source supplied.
    pub code: Option<String>,
    /// Previous active condition for this data item, None at chain end.
    pub prev: Option<ObservationPtr>,
}

/// The closed set of observation variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservationKind {
    Event,
    IntEvent,
    DoubleEvent,
    Sample,
    ThreeSpace,
    Timeseries,
    DataSetEvent,
    TableEvent,
    Condition,
    Message,
    Alarm,
    AssetEvent,
    DeviceEvent,
}

/// One observed value, validated and typed.
#[derive(Debug, Clone)]
pub struct Observation {
    data_item: DataItemPtr,
    timestamp: Timestamp,
    sequence: u64,
    kind: ObservationKind,
    properties: Properties,
    condition: Option<ConditionState>,
    unavailable: bool,
}

impl Observation {
    /// Construct and validate an observation for a data item.
    ///
    /// `props` is the raw property bundle from the pipeline; `VALUE` and
    /// condition `level` are resolved here, including the UNAVAILABLE
    /// convention (missing or case-insensitive "unavailable" value).
    pub fn make(
        data_item: &DataItemPtr,
        props: Properties,
        timestamp: Timestamp,
        errors: &mut ErrorList,
    ) -> Option<Observation> {
        let mut props = props;
        let mut unavailable = false;
        let mut level = None;

        if data_item.is_condition() {
            match props.remove("level") {
                Some(value) => {
                    let raw = value.to_text();
                    match ConditionLevel::parse(&raw) {
                        Some(ConditionLevel::Unavailable) => {
                            unavailable = true;
                            level = Some(ConditionLevel::Unavailable);
                        }
                        Some(l) => level = Some(l),
                        None => {
                            errors.push(EntityError::InvalidVocabulary {
                                entity: data_item.observation_name().to_string(),
                                property: "level".into(),
                                value: raw,
                            });
                            return None;
                        }
                    }
                }
                None => {
                    unavailable = true;
                    level = Some(ConditionLevel::Unavailable);
                }
            }
            // Condition elements always carry their data item type.
            if !props.contains("type") {
                props.insert("type", Value::String(data_item.type_name().to_string()));
            }
        } else {
            match props.get("VALUE") {
                Some(Value::String(s)) if s.is_empty() || s.eq_ignore_ascii_case("unavailable") => {
                    unavailable = true;
                    props.remove("VALUE");
                }
                None => unavailable = true,
                _ => {}
            }
        }

        let key = data_item.key();
        let (kind, factory) = resolve_kind(key);

        props.insert("dataItemId", Value::String(data_item.id().to_string()));
        props.insert("timestamp", Value::Timestamp(timestamp));
        if let Some(name) = data_item.name() {
            props.insert("name", Value::String(name.to_string()));
        }
        if let Some(sub_type) = data_item.sub_type() {
            props.insert("subType", Value::String(sub_type.to_string()));
        }

        if unavailable {
            // Unavailable observations skip value validation entirely.
            props.remove("VALUE");
        }

        let entity = factory.create(data_item.observation_name(), props, errors)?;

        let condition = if kind == ObservationKind::Condition {
            let code = entity
                .get_string("conditionId")
                .or_else(|| entity.get_string("nativeCode"))
                .map(String::from);
            Some(ConditionState {
                level: level.unwrap_or(ConditionLevel::Unavailable),
                code,
                prev: None,
            })
        } else {
            None
        };

        let mut properties = entity.properties().clone();
        if unavailable && !data_item.is_condition() {
            properties.insert("VALUE", Value::String("UNAVAILABLE".into()));
        }

        Some(Observation {
            data_item: Arc::clone(data_item),
            timestamp,
            sequence: 0,
            kind,
            properties,
            condition,
            unavailable,
        })
    }

    pub fn data_item(&self) -> &DataItemPtr {
        &self.data_item
    }

    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Timestamp correction clamps regressing sources.
    pub(crate) fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
        self.properties.insert("timestamp", Value::Timestamp(timestamp));
    }

    /// Stamped by the buffer on admission; zero beforehand.
    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
        self.properties.insert("sequence", Value::Integer(sequence as i64));
    }

    pub fn kind(&self) -> &ObservationKind {
        &self.kind
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn value(&self) -> Option<&Value> {
        self.properties.get("VALUE")
    }

    pub fn value_text(&self) -> Option<String> {
        self.value().map(Value::to_text)
    }

    pub fn is_unavailable(&self) -> bool {
        self.unavailable
    }

    pub fn condition(&self) -> Option<&ConditionState> {
        self.condition.as_ref()
    }

    pub fn level(&self) -> Option<ConditionLevel> {
        self.condition.as_ref().map(|c| c.level)
    }

    pub fn code(&self) -> Option<&str> {
        self.condition.as_ref().and_then(|c| c.code.as_deref())
    }

    pub fn prev(&self) -> Option<&ObservationPtr> {
        self.condition.as_ref().and_then(|c| c.prev.as_ref())
    }

    /// Printed element name: condition level for conditions, the data
    /// item's observation name otherwise.
    pub fn element_name(&self) -> &str {
        match &self.condition {
            Some(state) => state.level.element_name(),
            None => self.data_item.observation_name(),
        }
    }

    /// Unit conversion and data-set trimming replace VALUE in place.
    pub(crate) fn replace_value(&mut self, value: Value) {
        self.properties.insert("VALUE", value);
    }

    pub(crate) fn set_quality(&mut self, quality: &str) {
        self.properties.insert("quality", Value::String(quality.to_string()));
    }

    /// Refresh the entry count after a checkpoint merge.
    pub(crate) fn set_count(&mut self, count: i64) {
        self.properties.insert("count", Value::Integer(count));
    }

    /// Reduce a coded normal to a bare one: the chain emptied and only a
    /// plain Normal remains.
    pub(crate) fn strip_condition_code(&mut self) {
        for prop in ["nativeCode", "conditionId", "qualifier", "nativeSeverity", "VALUE"] {
            self.properties.remove(prop);
        }
        if let Some(state) = &mut self.condition {
            state.level = ConditionLevel::Normal;
            state.code = None;
            state.prev = None;
        }
    }

    // ------------------------------------------------------------------
    // Condition chain operations. All return fresh heads; chain entries
    // themselves are immutable history.
    // ------------------------------------------------------------------

    /// Copy of this condition with a different `prev` link.
    pub fn chained_to(&self, prev: Option<ObservationPtr>) -> ObservationPtr {
        let mut copy = self.clone();
        if let Some(state) = &mut copy.condition {
            state.prev = prev;
        }
        Arc::new(copy)
    }

    /// Walk the chain looking for an active entry with the given code.
    pub fn find_code(self: &ObservationPtr, code: &str) -> Option<ObservationPtr> {
        let mut cursor = Some(Arc::clone(self));
        while let Some(obs) = cursor {
            if obs.code() == Some(code) {
                return Some(obs);
            }
            cursor = obs.prev().cloned();
        }
        None
    }

    /// Deep copy of the chain without the entry carrying `code`.
    /// Returns None when the chain becomes empty.
    pub fn without_code(self: &ObservationPtr, code: &str) -> Option<ObservationPtr> {
        if self.code() == Some(code) {
            return self.prev().cloned();
        }
        let tail = self.prev().and_then(|p| p.without_code(code));
        Some(self.chained_to(tail))
    }

    /// Flatten the chain head-first into a list.
    pub fn chain(self: &ObservationPtr) -> Vec<ObservationPtr> {
        let mut out = Vec::new();
        let mut cursor = Some(Arc::clone(self));
        while let Some(obs) = cursor {
            cursor = obs.prev().cloned();
            out.push(obs);
        }
        out
    }

    /// Render as a plain entity for the document printers.
    pub fn to_entity(&self) -> Entity {
        Entity::new(self.element_name(), self.properties.clone())
    }
}

/// Resolve the variant and validation factory for a data-item key.
fn resolve_kind(key: &str) -> (ObservationKind, &'static FactoryPtr) {
    let f = factories();
    match key {
        "Events:Message" | "Events:MessageDiscrete" => (ObservationKind::Message, &f.message),
        "Events:AssetChanged" | "Events:AssetRemoved" => (ObservationKind::AssetEvent, &f.asset_event),
        "Events:DeviceAdded" | "Events:DeviceRemoved" | "Events:DeviceChanged" => {
            (ObservationKind::DeviceEvent, &f.device_event)
        }
        "Events:Alarm" => (ObservationKind::Alarm, &f.alarm),
        _ => {
            for (matcher, kind, factory) in &f.matchers {
                if matcher.matches(key) {
                    return (kind.clone(), factory);
                }
            }
            (ObservationKind::Event, &f.event)
        }
    }
}

struct ObservationFactories {
    event: FactoryPtr,
    message: FactoryPtr,
    alarm: FactoryPtr,
    asset_event: FactoryPtr,
    device_event: FactoryPtr,
    matchers: Vec<(Matcher, ObservationKind, FactoryPtr)>,
}

/// Factory tables are built once during bootstrap and read-only after.
fn factories() -> &'static ObservationFactories {
    static FACTORIES: OnceLock<ObservationFactories> = OnceLock::new();
    FACTORIES.get_or_init(build_factories)
}

fn base_requirements() -> Vec<Requirement> {
    vec![
        Requirement::required("dataItemId"),
        Requirement::new("timestamp", ValueKind::Timestamp, true),
        Requirement::new("sequence", ValueKind::Integer, false),
        Requirement::optional("subType"),
        Requirement::optional("name"),
        Requirement::optional("compositionId"),
        Requirement::new("quality", ValueKind::UString, false)
            .with_vocabulary(["VALID", "INVALID", "UNVERIFIABLE"]),
        Requirement::new("deprecated", ValueKind::Bool, false),
    ]
}

fn derive(extra: Vec<Requirement>) -> FactoryPtr {
    let mut factory = Factory::new(base_requirements());
    factory.add_requirements(extra);
    Arc::new(factory)
}

fn build_factories() -> ObservationFactories {
    let event = derive(vec![
        Requirement::optional("VALUE"),
        Requirement::new("resetTriggered", ValueKind::UString, false),
    ]);

    let sample = derive(vec![
        Requirement::new("sampleRate", ValueKind::Double, false),
        Requirement::new("resetTriggered", ValueKind::UString, false),
        Requirement::new("statistic", ValueKind::UString, false),
        Requirement::new("duration", ValueKind::Double, false),
        Requirement::new("VALUE", ValueKind::Double, false),
    ]);

    let three_space = derive(vec![
        Requirement::new("sampleRate", ValueKind::Double, false),
        Requirement::new("statistic", ValueKind::UString, false),
        Requirement::new("duration", ValueKind::Double, false),
        Requirement::new("VALUE", ValueKind::Vector, false).with_size(3),
    ]);

    let timeseries = {
        let mut factory = Factory::new(base_requirements());
        factory.add_requirements(vec![
            Requirement::new("sampleRate", ValueKind::Double, false),
            Requirement::new("statistic", ValueKind::UString, false),
            Requirement::new("duration", ValueKind::Double, false),
            Requirement::new("sampleCount", ValueKind::Integer, false),
            Requirement::new("VALUE", ValueKind::Vector, false),
        ]);
        factory.set_hook(Arc::new(|_name, props: &mut Properties| {
            if let Some(Value::Vector(v)) = props.get("VALUE") {
                let count = v.len() as i64;
                props.insert("sampleCount", Value::Integer(count));
            }
        }));
        Arc::new(factory)
    };

    let data_set = {
        let mut factory = Factory::new(base_requirements());
        factory.add_requirements(vec![
            Requirement::new("count", ValueKind::Integer, false),
            Requirement::new("VALUE", ValueKind::DataSet, false),
            Requirement::new("resetTriggered", ValueKind::UString, false),
        ]);
        factory.set_hook(Arc::new(|_name, props: &mut Properties| {
            if let Some(Value::DataSet(set)) = props.get("VALUE") {
                let count = set.len() as i64;
                props.insert("count", Value::Integer(count));
            }
        }));
        Arc::new(factory)
    };

    let table = {
        let mut factory = Factory::new(base_requirements());
        factory.add_requirements(vec![
            Requirement::new("count", ValueKind::Integer, false),
            Requirement::new("VALUE", ValueKind::Table, false),
            Requirement::new("resetTriggered", ValueKind::UString, false),
        ]);
        factory.set_hook(Arc::new(|_name, props: &mut Properties| {
            if let Some(Value::Table(set)) = props.get("VALUE") {
                let count = set.len() as i64;
                props.insert("count", Value::Integer(count));
            }
        }));
        Arc::new(factory)
    };

    let int_event = derive(vec![
        Requirement::new("resetTriggered", ValueKind::UString, false),
        Requirement::new("statistic", ValueKind::UString, false),
        Requirement::new("duration", ValueKind::Double, false),
        Requirement::new("VALUE", ValueKind::Integer, false),
    ]);

    let double_event = derive(vec![
        Requirement::new("resetTriggered", ValueKind::UString, false),
        Requirement::new("statistic", ValueKind::UString, false),
        Requirement::new("duration", ValueKind::Double, false),
        Requirement::new("VALUE", ValueKind::Double, false),
    ]);

    let condition = derive(vec![
        Requirement::new("type", ValueKind::UString, true),
        Requirement::optional("nativeCode"),
        Requirement::optional("conditionId"),
        Requirement::optional("nativeSeverity"),
        Requirement::new("qualifier", ValueKind::UString, false),
        Requirement::new("statistic", ValueKind::UString, false),
        Requirement::optional("VALUE"),
    ]);

    let message = derive(vec![
        Requirement::optional("VALUE"),
        Requirement::optional("nativeCode"),
        Requirement::new("resetTriggered", ValueKind::UString, false),
    ]);

    let alarm = derive(vec![
        Requirement::optional("VALUE"),
        Requirement::optional("code"),
        Requirement::optional("nativeCode"),
        Requirement::new("state", ValueKind::UString, false),
        Requirement::optional("severity"),
    ]);

    let asset_event = {
        let mut factory = Factory::new(base_requirements());
        factory.add_requirements(vec![
            Requirement::optional("VALUE"),
            Requirement::optional("assetType"),
            Requirement::optional("hash"),
        ]);
        factory.set_hook(Arc::new(|_name, props: &mut Properties| {
            if !props.contains("assetType") && !props.contains("VALUE") {
                props.insert("assetType", Value::String("UNAVAILABLE".into()));
            }
        }));
        Arc::new(factory)
    };

    let device_event = derive(vec![
        Requirement::optional("VALUE"),
        Requirement::optional("hash"),
    ]);

    // Matcher order mirrors factory registration order in the key scheme:
    // specific suffixes first, then category prefixes.
    let matchers = vec![
        (
            Matcher::Suffix("TimeSeries".into()),
            ObservationKind::Timeseries,
            Arc::clone(&timeseries),
        ),
        (
            Matcher::Suffix("DataSet".into()),
            ObservationKind::DataSetEvent,
            Arc::clone(&data_set),
        ),
        (
            Matcher::Suffix("Table".into()),
            ObservationKind::TableEvent,
            Arc::clone(&table),
        ),
        (
            Matcher::Prefix("Condition:".into()),
            ObservationKind::Condition,
            Arc::clone(&condition),
        ),
        (
            Matcher::Regex(Arc::new(
                regex::Regex::new(r"^Samples:.+:3D$").expect("matcher regex must compile"),
            )),
            ObservationKind::ThreeSpace,
            Arc::clone(&three_space),
        ),
        (
            Matcher::Regex(Arc::new(
                regex::Regex::new(r"^Events:.+:3D$").expect("matcher regex must compile"),
            )),
            ObservationKind::ThreeSpace,
            Arc::clone(&three_space),
        ),
        (
            Matcher::Prefix("Samples:".into()),
            ObservationKind::Sample,
            Arc::clone(&sample),
        ),
        (
            Matcher::Regex(Arc::new(
                regex::Regex::new(r"^Events:.+:DOUBLE$").expect("matcher regex must compile"),
            )),
            ObservationKind::DoubleEvent,
            Arc::clone(&double_event),
        ),
        (
            Matcher::Regex(Arc::new(
                regex::Regex::new(r"^Events:.+:INT$").expect("matcher regex must compile"),
            )),
            ObservationKind::IntEvent,
            Arc::clone(&int_event),
        ),
        (
            Matcher::Prefix("Events:".into()),
            ObservationKind::Event,
            Arc::clone(&event),
        ),
    ];

    ObservationFactories {
        event,
        message,
        alarm,
        asset_event,
        device_event,
        matchers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::parse_timestamp;

    fn item(pairs: &[(&str, &str)]) -> DataItemPtr {
        let mut p = Properties::new();
        for (k, v) in pairs {
            p.insert(*k, *v);
        }
        crate::device_model::DataItem::make(p).expect("data item should build")
    }

    fn ts() -> Timestamp {
        parse_timestamp("2026-01-01T12:00:00Z").expect("timestamp")
    }

    fn make(data_item: &DataItemPtr, pairs: &[(&str, &str)]) -> Observation {
        let mut props = Properties::new();
        for (k, v) in pairs {
            props.insert(*k, *v);
        }
        let mut errors = ErrorList::new();
        let obs = Observation::make(data_item, props, ts(), &mut errors);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        obs.expect("observation should build")
    }

    #[test]
    fn test_event_kind_and_value() {
        let exec = item(&[("id", "exec"), ("type", "EXECUTION"), ("category", "EVENT")]);
        let obs = make(&exec, &[("VALUE", "ACTIVE")]);
        assert_eq!(obs.kind(), &ObservationKind::Event);
        assert_eq!(obs.value_text().as_deref(), Some("ACTIVE"));
        assert_eq!(obs.element_name(), "Execution");
        assert!(!obs.is_unavailable());
    }

    #[test]
    fn test_sample_coerces_numeric_value() {
        let pos = item(&[
            ("id", "p"),
            ("type", "POSITION"),
            ("category", "SAMPLE"),
            ("units", "MILLIMETER"),
        ]);
        let obs = make(&pos, &[("VALUE", "10.5")]);
        assert_eq!(obs.kind(), &ObservationKind::Sample);
        assert_eq!(obs.value(), Some(&Value::Double(10.5)));
    }

    #[test]
    fn test_missing_value_is_unavailable() {
        let exec = item(&[("id", "exec"), ("type", "EXECUTION"), ("category", "EVENT")]);
        let obs = make(&exec, &[]);
        assert!(obs.is_unavailable());
        assert_eq!(obs.value_text().as_deref(), Some("UNAVAILABLE"));
    }

    #[test]
    fn test_condition_level_and_code() {
        let load = item(&[("id", "c1"), ("type", "LOAD"), ("category", "CONDITION")]);
        let obs = make(
            &load,
            &[
                ("level", "WARNING"),
                ("nativeCode", "CODE1"),
                ("qualifier", "HIGH"),
                ("VALUE", "Overload"),
            ],
        );
        assert_eq!(obs.kind(), &ObservationKind::Condition);
        assert_eq!(obs.level(), Some(ConditionLevel::Warning));
        assert_eq!(obs.code(), Some("CODE1"));
        assert_eq!(obs.element_name(), "Warning");
        assert_eq!(obs.properties().get("type"), Some(&Value::String("LOAD".into())));
    }

    #[test]
    fn test_condition_without_level_is_unavailable() {
        let load = item(&[("id", "c1"), ("type", "LOAD"), ("category", "CONDITION")]);
        let obs = make(&load, &[]);
        assert!(obs.is_unavailable());
        assert_eq!(obs.level(), Some(ConditionLevel::Unavailable));
        assert_eq!(obs.element_name(), "Unavailable");
    }

    #[test]
    fn test_timeseries_counts_samples() {
        let ts_item = item(&[
            ("id", "c2"),
            ("type", "POSITION"),
            ("category", "SAMPLE"),
            ("representation", "TIME_SERIES"),
        ]);
        let obs = make(&ts_item, &[("VALUE", "1 2 3 4"), ("sampleRate", "100")]);
        assert_eq!(obs.kind(), &ObservationKind::Timeseries);
        assert_eq!(obs.properties().get("sampleCount"), Some(&Value::Integer(4)));
    }

    #[test]
    fn test_data_set_counts_entries() {
        let ds = item(&[
            ("id", "v1"),
            ("type", "VARIABLE"),
            ("category", "EVENT"),
            ("representation", "DATA_SET"),
        ]);
        let obs = make(&ds, &[("VALUE", "a=1 b=2")]);
        assert_eq!(obs.kind(), &ObservationKind::DataSetEvent);
        assert_eq!(obs.properties().get("count"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_chain_operations() {
        let load = item(&[("id", "c1"), ("type", "LOAD"), ("category", "CONDITION")]);
        let w1 = Arc::new(make(&load, &[("level", "WARNING"), ("nativeCode", "A")]));
        let w2 = make(&load, &[("level", "WARNING"), ("nativeCode", "B")]);

        let head = w2.chained_to(Some(Arc::clone(&w1)));
        assert_eq!(head.chain().len(), 2);
        assert!(head.find_code("A").is_some());
        assert!(head.find_code("C").is_none());

        let without_a = head.without_code("A").expect("chain should remain");
        assert_eq!(without_a.chain().len(), 1);
        assert_eq!(without_a.code(), Some("B"));

        let empty = without_a.without_code("B");
        assert!(empty.is_none());
    }

    #[test]
    fn test_invalid_vocabulary_collects_error() {
        let exec = item(&[("id", "exec"), ("type", "EXECUTION"), ("category", "EVENT")]);
        let mut props = Properties::new();
        props.insert("VALUE", "ACTIVE");
        props.insert("quality", "PERFECT");
        let mut errors = ErrorList::new();
        let obs = Observation::make(&exec, props, ts(), &mut errors);
        // Optional property failure: entity still materializes.
        assert!(obs.is_some());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("Invalid vocabulary value PERFECT"));
    }
}
