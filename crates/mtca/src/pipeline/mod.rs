// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! The ingest pipeline: a composable transform chain per source.
//!
//! Each adapter source gets one pipeline bound to one strand: a tokio
//! task draining a channel. Transforms are synchronous; the only timers
//! (period filter) post expirations back into the same channel, so all
//! per-source state is touched from a single task.
//!
//! ```text
//! Raw ─ ShdrTokenizer ─ TimestampExtractor ─ ShdrTokenMapper ┬ Observations
//! Json ─ JsonMapper ──────────────────────────────────────────┤
//!   Observations ─ [CorrectTimestamp] ─ [UpcaseValue] ─ [DuplicateFilter]
//!     ─ [DeltaFilter] ─ [PeriodFilter] ─ [ConvertSample] ─ [Validator]
//!     ─ DeliverObservation
//!   Asset ─ DeliverAsset      AssetCommand ─ DeliverAssetCommand
//!   DeviceModel ─ DeliverDevice      Command ─ DeliverCommand
//! ```

mod convert_sample;
mod delta_filter;
mod deliver;
mod duplicate_filter;
mod json_mapper;
mod period_filter;
mod shdr_token_mapper;
mod shdr_tokenizer;
mod timestamp_extractor;
mod transform;
mod upcase_value;
mod validator;

pub use convert_sample::ConvertSample;
pub use delta_filter::DeltaFilter;
pub use deliver::{
    DeliverAsset, DeliverAssetCommand, DeliverCommand, DeliverDevice, DeliverObservation,
};
pub use duplicate_filter::DuplicateFilter;
pub use json_mapper::JsonMapper;
pub use period_filter::PeriodFilter;
pub use shdr_token_mapper::ShdrTokenMapper;
pub use shdr_tokenizer::ShdrTokenizer;
pub use timestamp_extractor::{CorrectTimestamp, TimestampExtractor};
pub use transform::{
    AssetCommand, DeviceCommand, PipelineData, Timestamped, Tokens, Transform, TransformChain,
};
pub use upcase_value::UpcaseValue;
pub use validator::Validator;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::asset::Asset;
use crate::config::AgentConfig;
use crate::device_model::DataItemPtr;
use crate::observation::Observation;

/// The narrow interface a pipeline needs from the agent coordinator.
pub trait PipelineContract: Send + Sync {
    /// Resolve a data item by id, name, or source, optionally scoped to a
    /// device name or uuid.
    fn find_data_item(&self, device: Option<&str>, key: &str) -> Option<DataItemPtr>;

    fn device_exists(&self, name: &str) -> bool;

    fn device_uuid(&self, name: &str) -> Option<String>;

    fn deliver_observation(&self, observation: Observation);

    fn deliver_asset(&self, asset: Asset);

    fn deliver_asset_command(&self, command: AssetCommand);

    fn deliver_command(&self, source: &str, command: DeviceCommand);

    /// Device model document pushed by a source.
    fn deliver_device(&self, source: &str, xml: &str);
}

/// Per-source execution context handed to every transform.
pub struct PipelineContext {
    pub contract: Arc<dyn PipelineContract>,
    /// Source identifier, for logging and control traffic.
    pub source: String,
    /// Default device for unqualified data-item keys.
    pub source_device: Option<String>,
    /// Strand channel for period-filter timer expirations. Absent when
    /// the pipeline runs synchronously (tests, loopback).
    timer_tx: Option<mpsc::UnboundedSender<PipelineMessage>>,
}

impl PipelineContext {
    pub fn new(
        contract: Arc<dyn PipelineContract>,
        source: impl Into<String>,
        source_device: Option<String>,
    ) -> Self {
        Self {
            contract,
            source: source.into(),
            source_device,
            timer_tx: None,
        }
    }

    pub fn source_device_uuid(&self) -> Option<String> {
        self.source_device
            .as_deref()
            .and_then(|d| self.contract.device_uuid(d))
    }

    /// Ask the strand to call back after `delay` for a held observation.
    pub(crate) fn schedule_period(&self, data_item_id: &str, delay: Duration) {
        let Some(tx) = &self.timer_tx else {
            log::debug!("[pipeline] no strand for period timer on {}", data_item_id);
            return;
        };
        let tx = tx.clone();
        let id = data_item_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(PipelineMessage::PeriodElapsed { data_item_id: id });
        });
    }
}

/// Messages draining through a pipeline strand.
#[derive(Debug)]
pub enum PipelineMessage {
    Data(PipelineData),
    PeriodElapsed { data_item_id: String },
}

/// Sender half of a spawned pipeline strand.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::UnboundedSender<PipelineMessage>,
}

impl PipelineHandle {
    /// Feed one raw adapter line.
    pub fn send_line(&self, line: impl Into<String>) {
        let _ = self.tx.send(PipelineMessage::Data(PipelineData::Raw(line.into())));
    }

    /// Feed one JSON payload.
    pub fn send_json(&self, payload: serde_json::Value) {
        let _ = self.tx.send(PipelineMessage::Data(PipelineData::Json(payload)));
    }

    pub fn send(&self, data: PipelineData) {
        let _ = self.tx.send(PipelineMessage::Data(data));
    }
}

/// One source's transform chain plus its context.
pub struct Pipeline {
    chain: Arc<TransformChain>,
    period_filter: Arc<PeriodFilter>,
    period_index: usize,
    ctx: PipelineContext,
}

impl Pipeline {
    /// Assemble the canonical stage order for a source, gated by config.
    pub fn build(
        config: &AgentConfig,
        contract: Arc<dyn PipelineContract>,
        source: impl Into<String>,
        source_device: Option<String>,
        relative_time: bool,
    ) -> Pipeline {
        let period_filter = Arc::new(PeriodFilter::new());

        let mut stages: Vec<Arc<dyn Transform>> = vec![
            Arc::new(ShdrTokenizer::new()),
            Arc::new(TimestampExtractor::new(relative_time, config.ignore_timestamps)),
            Arc::new(ShdrTokenMapper::new()),
            Arc::new(JsonMapper::new()),
        ];
        if config.correct_timestamps {
            stages.push(Arc::new(CorrectTimestamp::new()));
        }
        if config.upcase_data_item_value {
            stages.push(Arc::new(UpcaseValue::new()));
        }
        if config.filter_duplicates {
            stages.push(Arc::new(DuplicateFilter::new()));
        }
        stages.push(Arc::new(DeltaFilter::new()));
        stages.push(Arc::clone(&period_filter) as Arc<dyn Transform>);
        if config.conversion_required {
            stages.push(Arc::new(ConvertSample::new()));
        }
        if config.validation {
            stages.push(Arc::new(Validator::new(false)));
        }
        stages.push(Arc::new(DeliverObservation));
        stages.push(Arc::new(DeliverAsset));
        stages.push(Arc::new(DeliverAssetCommand));
        stages.push(Arc::new(DeliverDevice));
        stages.push(Arc::new(DeliverCommand));

        let chain = Arc::new(TransformChain::new(stages));
        let period_index = chain
            .stage_index("PeriodFilter")
            .expect("period filter is always present");

        Pipeline {
            chain,
            period_filter,
            period_index,
            ctx: PipelineContext::new(contract, source, source_device),
        }
    }

    /// Run one entity synchronously on the caller's thread.
    pub fn run(&self, data: PipelineData) {
        self.chain.run(data, &self.ctx);
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Bind the pipeline to a strand: one tokio task owns all its state.
    pub fn spawn(mut self) -> PipelineHandle {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.ctx.timer_tx = Some(tx.clone());

        tokio::spawn(async move {
            log::info!("[pipeline] strand started for source {}", self.ctx.source);
            while let Some(message) = rx.recv().await {
                match message {
                    PipelineMessage::Data(data) => self.chain.run(data, &self.ctx),
                    PipelineMessage::PeriodElapsed { data_item_id } => {
                        if let Some(obs) = self.period_filter.flush(&data_item_id) {
                            self.chain.dispatch(
                                self.period_index + 1,
                                PipelineData::Observations(vec![obs]),
                                &self.ctx,
                            );
                        }
                    }
                }
            }
            log::info!("[pipeline] strand stopped for source {}", self.ctx.source);
        });

        PipelineHandle { tx }
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::device_model::{parse_devices_xml, DeviceMap};
    use crate::entity::{parse_timestamp, ErrorList, Properties, Value};
    use parking_lot::Mutex;

    /// Contract stub capturing deliveries for stage tests.
    #[derive(Default)]
    pub struct TestContract {
        pub devices: DeviceMap,
        pub observations: Mutex<Vec<Observation>>,
        pub assets: Mutex<Vec<Asset>>,
        pub asset_commands: Mutex<Vec<AssetCommand>>,
        pub commands: Mutex<Vec<(String, DeviceCommand)>>,
        pub device_models: Mutex<Vec<String>>,
    }

    impl PipelineContract for TestContract {
        fn find_data_item(&self, device: Option<&str>, key: &str) -> Option<DataItemPtr> {
            match device {
                Some(name) => self.devices.find(name)?.data_item(key),
                None => self
                    .devices
                    .devices()
                    .iter()
                    .find_map(|d| d.data_item(key)),
            }
        }

        fn device_exists(&self, name: &str) -> bool {
            self.devices.find(name).is_some()
        }

        fn device_uuid(&self, name: &str) -> Option<String> {
            self.devices.find(name).map(|d| d.uuid().to_string())
        }

        fn deliver_observation(&self, observation: Observation) {
            self.observations.lock().push(observation);
        }

        fn deliver_asset(&self, asset: Asset) {
            self.assets.lock().push(asset);
        }

        fn deliver_asset_command(&self, command: AssetCommand) {
            self.asset_commands.lock().push(command);
        }

        fn deliver_command(&self, source: &str, command: DeviceCommand) {
            self.commands.lock().push((source.to_string(), command));
        }

        fn deliver_device(&self, _source: &str, xml: &str) {
            self.device_models.lock().push(xml.to_string());
        }
    }

    pub const TEST_DEVICE_XML: &str = r#"
        <Device id="d1" name="LinuxCNC" uuid="000">
          <DataItems>
            <DataItem id="avail" type="AVAILABILITY" category="EVENT"/>
          </DataItems>
          <Components>
            <Controller id="cont" name="controller">
              <DataItems>
                <DataItem id="exec" type="EXECUTION" category="EVENT"/>
                <DataItem id="mode" type="CONTROLLER_MODE" category="EVENT"/>
                <DataItem id="msg" type="MESSAGE" category="EVENT"/>
                <DataItem id="pos" type="POSITION" category="SAMPLE" units="MILLIMETER"/>
                <DataItem id="temp" type="TEMPERATURE" category="SAMPLE"
                          units="CELSIUS" nativeUnits="FAHRENHEIT"/>
                <DataItem id="load" type="LOAD" category="SAMPLE" units="PERCENT">
                  <Filters><Filter type="MINIMUM_DELTA">5</Filter></Filters>
                </DataItem>
                <DataItem id="freq" type="FREQUENCY" category="SAMPLE" units="HERTZ">
                  <Filters><Filter type="PERIOD">10</Filter></Filters>
                </DataItem>
                <DataItem id="vars" type="VARIABLE" category="EVENT"
                          representation="DATA_SET"/>
                <DataItem id="cond" type="LOAD" category="CONDITION"/>
              </DataItems>
            </Controller>
          </Components>
        </Device>"#;

    pub fn test_contract() -> Arc<TestContract> {
        let mut contract = TestContract::default();
        for device in parse_devices_xml(TEST_DEVICE_XML).expect("test device XML parses") {
            contract.devices.add(device).expect("unique data item ids");
        }
        Arc::new(contract)
    }

    pub fn context_with_items() -> PipelineContext {
        PipelineContext::new(test_contract(), "test-adapter", Some("LinuxCNC".into()))
    }

    /// Build an Observations payload at a fixed timestamp.
    pub fn observations_at(
        ctx: &PipelineContext,
        timestamp: &str,
        pairs: &[(&str, &str)],
    ) -> PipelineData {
        let ts = parse_timestamp(timestamp).expect("test timestamp parses");
        let mut out = Vec::new();
        for (id, value) in pairs {
            let item = ctx
                .contract
                .find_data_item(None, id)
                .expect("test data item exists");
            let mut props = Properties::new();
            if item.is_condition() {
                props.insert("level", Value::String((*value).to_string()));
            } else {
                props.insert("VALUE", Value::String((*value).to_string()));
            }
            let mut errors = ErrorList::new();
            out.push(
                Observation::make(&item, props, ts, &mut errors)
                    .expect("test observation builds"),
            );
        }
        PipelineData::Observations(out)
    }

    pub fn observations(ctx: &PipelineContext, pairs: &[(&str, &str)]) -> PipelineData {
        observations_at(ctx, "2026-01-01T12:00:00Z", pairs)
    }

    pub fn run_stage(
        stage: &dyn Transform,
        ctx: &PipelineContext,
        data: PipelineData,
    ) -> Option<PipelineData> {
        assert!(stage.accepts(&data), "stage must admit its test input");
        stage.apply(data, ctx)
    }

    /// Run a line through tokenizer → extractor → mapper.
    pub fn shdr(ctx: &PipelineContext, line: &str) -> Option<PipelineData> {
        let tokenizer = ShdrTokenizer::new();
        let extractor = TimestampExtractor::new(false, false);
        let mapper = ShdrTokenMapper::new();

        let mut data = tokenizer.apply(PipelineData::Raw(line.to_string()), ctx)?;
        if extractor.accepts(&data) {
            data = extractor.apply(data, ctx)?;
        }
        if mapper.accepts(&data) {
            return mapper.apply(data, ctx);
        }
        Some(data)
    }
}

#[cfg(test)]
mod tests {
    use super::tests_support::*;
    use super::*;

    #[test]
    fn test_full_chain_delivers_observation() {
        let contract = test_contract();
        let config = AgentConfig::default();
        let pipeline = Pipeline::build(
            &config,
            Arc::clone(&contract) as Arc<dyn PipelineContract>,
            "adapter-1",
            Some("LinuxCNC".into()),
            false,
        );

        pipeline.run(PipelineData::Raw(
            "2026-01-01T12:00:00Z|avail|AVAILABLE|exec|active".into(),
        ));

        let delivered = contract.observations.lock();
        assert_eq!(delivered.len(), 2);
        // Upcase runs by default.
        assert_eq!(delivered[1].value_text().as_deref(), Some("ACTIVE"));
    }

    #[test]
    fn test_chain_converts_units() {
        let contract = test_contract();
        let config = AgentConfig::default();
        let pipeline = Pipeline::build(
            &config,
            Arc::clone(&contract) as Arc<dyn PipelineContract>,
            "adapter-1",
            Some("LinuxCNC".into()),
            false,
        );

        pipeline.run(PipelineData::Raw("2026-01-01T12:00:00Z|temp|212".into()));

        let delivered = contract.observations.lock();
        assert_eq!(delivered.len(), 1);
        let v = delivered[0].value().and_then(|v| v.as_f64()).expect("double");
        assert!((v - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_filter_gated_by_config() {
        let contract = test_contract();
        let config = AgentConfig::from_pairs([("FilterDuplicates", "true")]).expect("config");
        let pipeline = Pipeline::build(
            &config,
            Arc::clone(&contract) as Arc<dyn PipelineContract>,
            "adapter-1",
            Some("LinuxCNC".into()),
            false,
        );

        pipeline.run(PipelineData::Raw("ts|exec|READY".into()));
        pipeline.run(PipelineData::Raw("ts|exec|READY".into()));
        pipeline.run(PipelineData::Raw("ts|exec|ACTIVE".into()));

        assert_eq!(contract.observations.lock().len(), 2);
    }

    #[test]
    fn test_protocol_command_routed() {
        let contract = test_contract();
        let config = AgentConfig::default();
        let pipeline = Pipeline::build(
            &config,
            Arc::clone(&contract) as Arc<dyn PipelineContract>,
            "adapter-1",
            Some("LinuxCNC".into()),
            false,
        );

        pipeline.run(PipelineData::Raw("* shdrVersion: 2".into()));

        let commands = contract.commands.lock();
        assert_eq!(commands.len(), 1);
        assert_eq!(
            commands[0].1,
            DeviceCommand::Protocol {
                key: "shdrVersion".into(),
                value: "2".into()
            }
        );
    }

    #[tokio::test]
    async fn test_strand_processes_lines() {
        let contract = test_contract();
        let config = AgentConfig::default();
        let pipeline = Pipeline::build(
            &config,
            Arc::clone(&contract) as Arc<dyn PipelineContract>,
            "adapter-1",
            Some("LinuxCNC".into()),
            false,
        );
        let handle = pipeline.spawn();

        handle.send_line("2026-01-01T12:00:00Z|exec|READY");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(contract.observations.lock().len(), 1);
    }
}
