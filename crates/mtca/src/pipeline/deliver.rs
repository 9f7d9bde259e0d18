// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Terminal sinks: hand transformed entities to the agent coordinator.

use super::transform::{PipelineData, Transform};
use super::PipelineContext;

/// Observations land in the circular buffer.
pub struct DeliverObservation;

impl Transform for DeliverObservation {
    fn name(&self) -> &str {
        "DeliverObservation"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::Observations(_))
    }

    fn apply(&self, data: PipelineData, ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::Observations(observations) = data else {
            return None;
        };
        for obs in observations {
            ctx.contract.deliver_observation(obs);
        }
        None
    }
}

/// Assets land in asset storage.
pub struct DeliverAsset;

impl Transform for DeliverAsset {
    fn name(&self) -> &str {
        "DeliverAsset"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::Asset(_))
    }

    fn apply(&self, data: PipelineData, ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::Asset(asset) = data else {
            return None;
        };
        ctx.contract.deliver_asset(*asset);
        None
    }
}

/// Asset removal commands.
pub struct DeliverAssetCommand;

impl Transform for DeliverAssetCommand {
    fn name(&self) -> &str {
        "DeliverAssetCommand"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::AssetCommand(_))
    }

    fn apply(&self, data: PipelineData, ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::AssetCommand(command) = data else {
            return None;
        };
        ctx.contract.deliver_asset_command(command);
        None
    }
}

/// Source-pushed device models reach the device-model coordinator.
pub struct DeliverDevice;

impl Transform for DeliverDevice {
    fn name(&self) -> &str {
        "DeliverDevice"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::DeviceModel(_))
    }

    fn apply(&self, data: PipelineData, ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::DeviceModel(xml) = data else {
            return None;
        };
        ctx.contract.deliver_device(&ctx.source, &xml);
        None
    }
}

/// Adapter control traffic updates device availability and options.
pub struct DeliverCommand;

impl Transform for DeliverCommand {
    fn name(&self) -> &str {
        "DeliverCommand"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::Command(_))
    }

    fn apply(&self, data: PipelineData, ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::Command(command) = data else {
            return None;
        };
        ctx.contract.deliver_command(&ctx.source, command);
        None
    }
}
