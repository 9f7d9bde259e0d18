// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! JSON message mapping for JSON-framed adapter payloads.
//!
//! A payload is an object keyed by data-item id or source, with an
//! optional `timestamp` member. Scalars map to plain values, arrays to
//! vectors, and objects either to condition properties (`level` present)
//! or to data-set entries.

use chrono::Utc;
use serde_json::Value as Json;

use crate::entity::{parse_timestamp, ErrorList, Properties, Timestamp, Value};
use crate::observation::Observation;

use super::transform::{PipelineData, Transform};
use super::PipelineContext;

pub struct JsonMapper;

impl JsonMapper {
    pub fn new() -> Self {
        Self
    }

    fn map_object(
        &self,
        object: &serde_json::Map<String, Json>,
        ctx: &PipelineContext,
        observations: &mut Vec<Observation>,
    ) {
        let timestamp = object
            .get("timestamp")
            .and_then(Json::as_str)
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        for (key, value) in object {
            if key == "timestamp" {
                continue;
            }

            // Nested device scoping: {"LinuxCNC": {"exec": "ACTIVE"}}
            if let Json::Object(inner) = value {
                if ctx.contract.device_exists(key) && !inner.contains_key("level") {
                    self.map_device(key, inner, timestamp, ctx, observations);
                    continue;
                }
            }

            self.map_value(None, key, value, timestamp, ctx, observations);
        }
    }

    fn map_device(
        &self,
        device: &str,
        object: &serde_json::Map<String, Json>,
        timestamp: Timestamp,
        ctx: &PipelineContext,
        observations: &mut Vec<Observation>,
    ) {
        for (key, value) in object {
            self.map_value(Some(device), key, value, timestamp, ctx, observations);
        }
    }

    fn map_value(
        &self,
        device: Option<&str>,
        key: &str,
        value: &Json,
        timestamp: Timestamp,
        ctx: &PipelineContext,
        observations: &mut Vec<Observation>,
    ) {
        let Some(item) = ctx
            .contract
            .find_data_item(device.or(ctx.source_device.as_deref()), key)
        else {
            log::warn!("[json_mapper] could not find data item: {}", key);
            return;
        };

        let mut props = Properties::new();
        match value {
            Json::Object(fields) if item.is_condition() => {
                for (name, field) in fields {
                    let slot = if name == "message" { "VALUE" } else { name.as_str() };
                    props.insert(slot.to_string(), Value::String(json_text(field)));
                }
            }
            Json::Object(fields) => {
                // Data-set style object: re-encode as the SHDR set syntax
                // so the factory's parser applies.
                let encoded: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, json_text(v)))
                    .collect();
                props.insert("VALUE", Value::String(encoded.join(" ")));
            }
            Json::Array(entries) => {
                let encoded: Vec<String> = entries.iter().map(json_text).collect();
                props.insert("VALUE", Value::String(encoded.join(" ")));
            }
            Json::Null => {}
            scalar => {
                props.insert("VALUE", Value::String(json_text(scalar)));
            }
        }

        let mut errors = ErrorList::new();
        match Observation::make(&item, props, timestamp, &mut errors) {
            Some(obs) => observations.push(obs),
            None => {
                log::warn!("[json_mapper] could not parse properties for data item: {}", item.id());
                for e in &errors {
                    log::warn!("[json_mapper]    error: {}", e);
                }
            }
        }
    }
}

fn json_text(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Default for JsonMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for JsonMapper {
    fn name(&self) -> &str {
        "JsonMapper"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::Json(_))
    }

    fn apply(&self, data: PipelineData, ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::Json(payload) = data else {
            return None;
        };

        let Json::Object(object) = &payload else {
            log::warn!("[json_mapper] payload is not a JSON object, dropping");
            return None;
        };

        let mut observations = Vec::new();
        self.map_object(object, ctx, &mut observations);
        if observations.is_empty() {
            return None;
        }
        Some(PipelineData::Observations(observations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{ConditionLevel, ObservationKind};
    use crate::pipeline::tests_support::{context_with_items, run_stage};
    use serde_json::json;

    fn map(ctx: &PipelineContext, payload: Json) -> Vec<Observation> {
        match run_stage(&JsonMapper::new(), ctx, PipelineData::Json(payload)) {
            Some(PipelineData::Observations(obs)) => obs,
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_flat_payload() {
        let ctx = context_with_items();
        let obs = map(
            &ctx,
            json!({"timestamp": "2026-01-01T12:00:00Z", "exec": "ACTIVE", "pos": 10.5}),
        );
        assert_eq!(obs.len(), 2);
        let exec = obs.iter().find(|o| o.data_item().id() == "exec").expect("exec");
        assert_eq!(exec.value_text().as_deref(), Some("ACTIVE"));
        let pos = obs.iter().find(|o| o.data_item().id() == "pos").expect("pos");
        assert_eq!(pos.value(), Some(&Value::Double(10.5)));
    }

    #[test]
    fn test_condition_object() {
        let ctx = context_with_items();
        let obs = map(
            &ctx,
            json!({"cond": {"level": "fault", "nativeCode": "E42", "message": "jam"}}),
        );
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].kind(), &ObservationKind::Condition);
        assert_eq!(obs[0].level(), Some(ConditionLevel::Fault));
        assert_eq!(obs[0].code(), Some("E42"));
    }

    #[test]
    fn test_data_set_object() {
        let ctx = context_with_items();
        let obs = map(&ctx, json!({"vars": {"a": 1, "b": "x"}}));
        assert_eq!(obs.len(), 1);
        let Some(Value::DataSet(set)) = obs[0].value() else {
            panic!("expected data set");
        };
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_unknown_keys_skipped() {
        let ctx = context_with_items();
        let obs = map(&ctx, json!({"nope": 1, "exec": "READY"}));
        assert_eq!(obs.len(), 1);
    }
}
