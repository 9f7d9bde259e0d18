// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! SHDR token mapping: timestamped tokens to observations and assets.
//!
//! Consumes `key|value...` token runs, resolving each key against the
//! device model. How many tokens an observation consumes depends on the
//! data item: conditions take five, messages two, timeseries three,
//! everything else one. `@ASSET@`-style commands route to the asset path.
//! An unknown data item logs a warning and drops its value tokens; the
//! line keeps going.

use std::collections::VecDeque;

use crate::asset::Asset;
use crate::entity::{ErrorList, Properties, Timestamp, Value};
use crate::observation::Observation;

use super::transform::{AssetCommand, PipelineData, Timestamped, Transform};
use super::PipelineContext;

pub struct ShdrTokenMapper;

impl ShdrTokenMapper {
    pub fn new() -> Self {
        Self
    }

    fn map_tokens(
        &self,
        timestamp: Timestamp,
        duration: Option<f64>,
        mut tokens: VecDeque<String>,
        ctx: &PipelineContext,
    ) -> Vec<Observation> {
        let mut observations = Vec::new();

        while let Some(raw_key) = tokens.pop_front() {
            if raw_key.is_empty() {
                continue;
            }

            // `device:dataItem` keys address another device than the
            // source's default.
            let (device, key) = match raw_key.split_once(':') {
                Some((dev, item)) if !dev.is_empty() && ctx.contract.device_exists(dev) => {
                    (Some(dev.to_string()), item.to_string())
                }
                _ => (None, raw_key.clone()),
            };

            let Some(item) = ctx
                .contract
                .find_data_item(device.as_deref().or(ctx.source_device.as_deref()), &key)
            else {
                log::warn!("[mapper] could not find data item: {}", raw_key);
                tokens.pop_front();
                continue;
            };

            let mut props = Properties::new();
            if let Some(d) = duration {
                props.insert("duration", Value::Double(d));
            }

            if item.is_condition() {
                // level|nativeCode|nativeSeverity|qualifier|message
                let mut next = || tokens.pop_front().unwrap_or_default();
                let level = next();
                let native_code = next();
                let native_severity = next();
                let qualifier = next();
                let message = next();
                props.insert("level", Value::String(level));
                if !native_code.is_empty() {
                    props.insert("nativeCode", Value::String(native_code));
                }
                if !native_severity.is_empty() {
                    props.insert("nativeSeverity", Value::String(native_severity));
                }
                if !qualifier.is_empty() {
                    props.insert("qualifier", Value::String(qualifier));
                }
                if !message.is_empty() {
                    props.insert("VALUE", Value::String(message));
                }
            } else if item.type_name() == "MESSAGE" {
                // nativeCode|text
                let native_code = tokens.pop_front().unwrap_or_default();
                let text = tokens.pop_front().unwrap_or_default();
                if !native_code.is_empty() {
                    props.insert("nativeCode", Value::String(native_code));
                }
                props.insert("VALUE", Value::String(text));
            } else if item.is_timeseries() {
                // count|rate|space separated values
                let _count = tokens.pop_front().unwrap_or_default();
                let rate = tokens.pop_front().unwrap_or_default();
                let values = tokens.pop_front().unwrap_or_default();
                if !rate.is_empty() {
                    props.insert("sampleRate", Value::String(rate));
                }
                props.insert("VALUE", Value::String(values));
            } else {
                let value = tokens.pop_front().unwrap_or_default();
                props.insert("VALUE", Value::String(value));
            }

            let mut errors = ErrorList::new();
            match Observation::make(&item, props, timestamp, &mut errors) {
                Some(obs) => {
                    for e in &errors {
                        log::warn!("[mapper] observation warning for {}: {}", item.id(), e);
                    }
                    observations.push(obs);
                }
                None => {
                    log::warn!("[mapper] could not parse properties for data item: {}", item.id());
                    for e in &errors {
                        log::warn!("[mapper]    error: {}", e);
                    }
                }
            }
        }

        observations
    }

    fn map_asset(
        &self,
        command: &str,
        mut tokens: VecDeque<String>,
        ctx: &PipelineContext,
    ) -> Option<PipelineData> {
        match command {
            "@ASSET@" | "@UPDATE_ASSET@" => {
                // id|type|document (the document may contain pipes).
                let asset_id = tokens.pop_front().unwrap_or_default();
                let _asset_type = tokens.pop_front().unwrap_or_default();
                let document: String = Vec::from(tokens).join("|");
                match Asset::parse_xml(&document) {
                    Ok((asset, errors)) => {
                        for e in &errors {
                            log::warn!("[mapper] asset {} warning: {}", asset_id, e);
                        }
                        let asset = match ctx.source_device_uuid() {
                            Some(uuid) if asset.device_uuid().is_none() => asset.with_device(&uuid),
                            _ => asset,
                        };
                        Some(PipelineData::Asset(Box::new(asset)))
                    }
                    Err(e) => {
                        log::warn!("[mapper] cannot parse asset {}: {}", asset_id, e);
                        None
                    }
                }
            }
            "@REMOVE_ASSET@" => {
                let asset_id = tokens.pop_front().unwrap_or_default();
                if asset_id.is_empty() {
                    log::warn!("[mapper] @REMOVE_ASSET@ without an asset id");
                    return None;
                }
                Some(PipelineData::AssetCommand(AssetCommand::Remove { asset_id }))
            }
            "@REMOVE_ALL_ASSETS@" => {
                let asset_type = tokens.pop_front().filter(|t| !t.is_empty());
                Some(PipelineData::AssetCommand(AssetCommand::RemoveAll { asset_type }))
            }
            _ => None,
        }
    }
}

impl Default for ShdrTokenMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for ShdrTokenMapper {
    fn name(&self) -> &str {
        "ShdrTokenMapper"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::Timestamped(_))
    }

    fn apply(&self, data: PipelineData, ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::Timestamped(Timestamped {
            timestamp,
            duration,
            tokens,
        }) = data
        else {
            return None;
        };

        if let Some(first) = tokens.front() {
            if first.starts_with('@') && first.ends_with('@') {
                let mut tokens = tokens;
                let command = tokens.pop_front().expect("front token verified present");
                return self.map_asset(&command, tokens, ctx);
            }
        }

        let observations = self.map_tokens(timestamp, duration, tokens, ctx);
        if observations.is_empty() {
            return None;
        }
        Some(PipelineData::Observations(observations))
    }
}
