// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Transform nodes and the dispatch spine.
//!
//! A transform declares a type guard over [`PipelineData`] and a pure-ish
//! `apply`. The pipeline routes each stage's output to the next stage in
//! registration order whose guard admits it; returning `None` drops the
//! item. Terminal sinks consume their input and return `None`.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::asset::Asset;
use crate::entity::Timestamp;
use crate::observation::Observation;

/// Asset lifecycle commands arriving through the adapter protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetCommand {
    Remove { asset_id: String },
    RemoveAll { asset_type: Option<String> },
}

/// Adapter control traffic: connection state and protocol options.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    Connected,
    Disconnected,
    Connecting,
    /// `* key: value` protocol command line.
    Protocol { key: String, value: String },
}

/// Tokenized SHDR line, timestamp token still at the front.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tokens {
    pub tokens: VecDeque<String>,
}

/// Tokens with their timestamp resolved.
#[derive(Debug, Clone)]
pub struct Timestamped {
    pub timestamp: Timestamp,
    pub duration: Option<f64>,
    pub tokens: VecDeque<String>,
}

/// The runtime kinds flowing through a pipeline.
#[derive(Debug)]
pub enum PipelineData {
    /// Raw adapter text line.
    Raw(String),
    Tokens(Tokens),
    Timestamped(Timestamped),
    /// JSON-framed adapter payload.
    Json(serde_json::Value),
    Observations(Vec<Observation>),
    Asset(Box<Asset>),
    AssetCommand(AssetCommand),
    Command(DeviceCommand),
    /// Device model XML pushed by the source (`* device: <Device .../>`).
    DeviceModel(String),
}

impl PipelineData {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PipelineData::Raw(_) => "raw",
            PipelineData::Tokens(_) => "tokens",
            PipelineData::Timestamped(_) => "timestamped",
            PipelineData::Json(_) => "json",
            PipelineData::Observations(_) => "observations",
            PipelineData::Asset(_) => "asset",
            PipelineData::AssetCommand(_) => "asset_command",
            PipelineData::Command(_) => "command",
            PipelineData::DeviceModel(_) => "device_model",
        }
    }
}

/// One pipeline stage.
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;

    /// Type guard over the runtime kind of the input.
    fn accepts(&self, data: &PipelineData) -> bool;

    /// Transform the entity; `None` drops it. Failures are logged by the
    /// stage and reported as a drop, never as a pipeline halt.
    fn apply(&self, data: PipelineData, ctx: &super::PipelineContext) -> Option<PipelineData>;
}

/// Ordered transform chain with guard-based routing.
pub struct TransformChain {
    stages: Vec<Arc<dyn Transform>>,
}

impl TransformChain {
    pub fn new(stages: Vec<Arc<dyn Transform>>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Arc<dyn Transform>] {
        &self.stages
    }

    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name() == name)
    }

    /// Run an entity from the entry point.
    pub fn run(&self, data: PipelineData, ctx: &super::PipelineContext) {
        self.dispatch(0, data, ctx);
    }

    /// Route to the first admitting stage at or after `from`, recursing on
    /// its output.
    pub fn dispatch(&self, from: usize, data: PipelineData, ctx: &super::PipelineContext) {
        for (idx, stage) in self.stages.iter().enumerate().skip(from) {
            if stage.accepts(&data) {
                if let Some(output) = stage.apply(data, ctx) {
                    self.dispatch(idx + 1, output, ctx);
                } else {
                    log::trace!("[pipeline] stage {} consumed or dropped entity", stage.name());
                }
                return;
            }
        }
        log::debug!(
            "[pipeline] no stage admits {} entity, dropping",
            data.kind_name()
        );
    }
}
