// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! The agent coordinator.
//!
//! Owns the circular buffer (one mutex), asset storage (its own lock), the
//! device map, and the printers; wires pipelines to storage and implements
//! the contracts both sides consume. Components never reach around the
//! agent for shared state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use crate::asset::{Asset, AssetBuffer, AssetPtr};
use crate::buffer::{Checkpoint, CircularBuffer, FilterSet, ObservationWindow};
use crate::config::AgentConfig;
use crate::device_model::{parse_devices_xml, Component, DataItem, DataItemPtr, Device, DeviceMap, DevicePtr};
use crate::entity::{ErrorList, Properties, Value};
use crate::error::{Error, Result};
use crate::observation::Observation;
use crate::pipeline::{AssetCommand, DeviceCommand, Pipeline, PipelineContract, PipelineHandle};
use crate::printer::{HeaderInfo, JsonPrinter, Printer, XmlPrinter};

pub struct Agent {
    config: AgentConfig,
    /// Start-time marker; clients detect agent restarts through it.
    instance_id: u64,
    buffer: Arc<Mutex<CircularBuffer>>,
    assets: Mutex<AssetBuffer>,
    devices: RwLock<DeviceMap>,
    /// Adapter source name → default device name.
    sources: RwLock<HashMap<String, String>>,
    xml_printer: XmlPrinter,
    json_printer: JsonPrinter,
    sender: String,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Arc<Agent> {
        let buffer = CircularBuffer::new(config.buffer_size, config.checkpoint_frequency);
        let assets = AssetBuffer::new(config.max_assets);
        let sender = config
            .sender
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "localhost".into());

        let agent = Arc::new(Agent {
            instance_id: Utc::now().timestamp() as u64,
            buffer: Arc::new(Mutex::new(buffer)),
            assets: Mutex::new(assets),
            devices: RwLock::new(DeviceMap::new()),
            sources: RwLock::new(HashMap::new()),
            xml_printer: XmlPrinter::new(),
            json_printer: JsonPrinter::new(),
            sender,
            config,
        });

        agent
            .add_device(agent_device())
            .expect("agent device ids are unique in an empty map");
        agent
    }

    /// Load a device model document, then observe UNAVAILABLE defaults for
    /// every data item so `current` is complete from the start.
    pub fn load_devices(self: &Arc<Self>, xml: &str) -> Result<Vec<DevicePtr>> {
        let mut added = Vec::new();
        for device in parse_devices_xml(xml)? {
            added.push(self.add_device(device)?);
        }
        Ok(added)
    }

    fn add_device(self: &Arc<Self>, device: Device) -> Result<DevicePtr> {
        let device = self.devices.write().add(device)?;
        for item in device.data_items() {
            self.observe_unavailable(&item);
        }
        log::info!("[agent] added device {} ({})", device.name(), device.uuid());
        Ok(device)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    pub fn buffer(&self) -> &Arc<Mutex<CircularBuffer>> {
        &self.buffer
    }

    pub fn devices(&self) -> Vec<DevicePtr> {
        self.devices.read().devices().to_vec()
    }

    pub fn device(&self, key: &str) -> Option<DevicePtr> {
        self.devices.read().find(key).cloned()
    }

    pub fn data_item_by_id(&self, id: &str) -> Option<DataItemPtr> {
        self.devices.read().data_item_by_id(id).cloned()
    }

    pub fn printer(&self, json: bool) -> &dyn Printer {
        if json {
            &self.json_printer
        } else {
            &self.xml_printer
        }
    }

    /// Header snapshot for document printing. Takes the buffer lock.
    pub fn header_info(&self) -> HeaderInfo {
        let (buffer_size, first, next) = {
            let buffer = self.buffer.lock();
            (buffer.buffer_size(), buffer.first_sequence(), buffer.sequence())
        };
        let (asset_buffer_size, asset_count) = {
            let assets = self.assets.lock();
            (assets.max_assets(), assets.count())
        };
        HeaderInfo {
            instance_id: self.instance_id,
            sender: self.sender.clone(),
            version: self.config.schema_version.clone(),
            buffer_size,
            first_sequence: first,
            next_sequence: next,
            last_sequence: next.saturating_sub(1),
            asset_buffer_size,
            asset_count,
        }
    }

    // ------------------------------------------------------------------
    // Observation intake
    // ------------------------------------------------------------------

    /// Admit an observation and signal its data item's observers.
    pub fn add_observation(&self, observation: Observation) -> Option<u64> {
        let item = Arc::clone(observation.data_item());
        let admitted = self.buffer.lock().add_observation(observation);
        let (sequence, _) = admitted?;
        // Signal outside the buffer lock; observer lists have their own.
        item.signaler().signal_observers(sequence);
        Some(sequence)
    }

    fn observe_unavailable(&self, item: &DataItemPtr) {
        let mut errors = ErrorList::new();
        if let Some(obs) = Observation::make(item, Properties::new(), Utc::now(), &mut errors) {
            self.add_observation(obs);
        }
    }

    /// Make and admit an observation from a raw value, the loopback used
    /// by PUT requests and internal events.
    pub fn observe_value(&self, item: &DataItemPtr, value: &str) -> Result<Option<u64>> {
        let mut props = Properties::new();
        if item.is_condition() {
            props.insert("level", Value::String(value.to_string()));
        } else {
            props.insert("VALUE", Value::String(value.to_string()));
        }
        let mut errors = ErrorList::new();
        match Observation::make(item, props, Utc::now(), &mut errors) {
            Some(obs) => Ok(self.add_observation(obs)),
            None => Err(Error::Internal(
                errors
                    .first()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "invalid observation".into()),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn current(&self, at: Option<u64>, filter: Option<&FilterSet>) -> Option<Checkpoint> {
        let buffer = self.buffer.lock();
        match at {
            None => Some(Checkpoint::copy_from(buffer.latest(), filter.cloned())),
            Some(at) => buffer.checkpoint_at(at, filter.cloned()),
        }
    }

    pub fn sample(
        &self,
        count: usize,
        filter: Option<&FilterSet>,
        from: Option<u64>,
        to: Option<u64>,
    ) -> ObservationWindow {
        self.buffer.lock().get_observations(count, filter, from, to)
    }

    // ------------------------------------------------------------------
    // Assets
    // ------------------------------------------------------------------

    pub fn asset(&self, asset_id: &str) -> Option<AssetPtr> {
        self.assets.lock().get(asset_id).cloned()
    }

    pub fn assets(
        &self,
        count: usize,
        include_removed: bool,
        device_uuid: Option<&str>,
        asset_type: Option<&str>,
    ) -> Vec<AssetPtr> {
        self.assets
            .lock()
            .assets(count, include_removed, device_uuid, asset_type)
    }

    pub fn asset_counts_by_type(&self) -> HashMap<String, usize> {
        self.assets.lock().counts_by_type()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.lock().count()
    }

    /// Insert or replace an asset, emitting the AssetChanged event and an
    /// AssetRemoved for anything evicted by the count cap.
    pub fn receive_asset(&self, asset: Asset) {
        let asset_id = asset.asset_id().to_string();
        let asset_type = asset.asset_type().to_string();
        let evicted = self.assets.lock().add_asset(asset);

        if let Some(evicted) = evicted {
            self.asset_event("ASSET_REMOVED", evicted.asset_id(), evicted.asset_type());
        }
        self.asset_event("ASSET_CHANGED", &asset_id, &asset_type);
    }

    /// Tombstone one asset. Errors when the id is unknown.
    pub fn remove_asset(&self, asset_id: &str) -> Result<AssetPtr> {
        let removed = self
            .assets
            .lock()
            .remove_asset(asset_id)
            .ok_or_else(|| Error::AssetNotFound(asset_id.to_string()))?;
        self.asset_event("ASSET_REMOVED", removed.asset_id(), removed.asset_type());
        Ok(removed)
    }

    pub fn remove_all_assets(&self, device_uuid: Option<&str>, asset_type: Option<&str>) -> usize {
        let removed = self.assets.lock().remove_all(device_uuid, asset_type);
        for asset in &removed {
            self.asset_event("ASSET_REMOVED", asset.asset_id(), asset.asset_type());
        }
        removed.len()
    }

    /// Synthesize an asset lifecycle event on the agent device.
    fn asset_event(&self, event_type: &str, asset_id: &str, asset_type: &str) {
        let Some(item) = self.agent_device_item(event_type) else {
            return;
        };
        let mut props = Properties::new();
        props.insert("VALUE", Value::String(asset_id.to_string()));
        props.insert("assetType", Value::String(asset_type.to_string()));
        let mut errors = ErrorList::new();
        if let Some(obs) = Observation::make(&item, props, Utc::now(), &mut errors) {
            self.add_observation(obs);
        }
    }

    /// Synthesize a device lifecycle event on the agent device.
    fn device_event(&self, event_type: &str, uuid: &str) {
        let Some(item) = self.agent_device_item(event_type) else {
            return;
        };
        if let Err(e) = self.observe_value(&item, uuid) {
            log::warn!("[agent] cannot emit {} for {}: {}", event_type, uuid, e);
        }
    }

    fn agent_device_item(&self, type_name: &str) -> Option<DataItemPtr> {
        let devices = self.devices.read();
        let agent = devices.by_name("Agent")?;
        agent
            .data_items()
            .into_iter()
            .find(|i| i.type_name() == type_name)
    }

    // ------------------------------------------------------------------
    // Pipelines
    // ------------------------------------------------------------------

    /// Build and spawn a pipeline strand for an adapter source.
    pub fn make_pipeline(
        self: &Arc<Self>,
        source: &str,
        device: Option<&str>,
        relative_time: bool,
    ) -> PipelineHandle {
        if let Some(device) = device {
            self.sources
                .write()
                .insert(source.to_string(), device.to_string());
        }
        let pipeline = Pipeline::build(
            &self.config,
            Arc::clone(self) as Arc<dyn PipelineContract>,
            source,
            device.map(String::from),
            relative_time,
        );
        pipeline.spawn()
    }

    fn set_source_availability(&self, source: &str, available: bool) {
        let device_name = self.sources.read().get(source).cloned();
        let item = device_name
            .as_deref()
            .and_then(|name| self.device(name))
            .and_then(|d| d.availability());
        let Some(item) = item else {
            log::debug!("[agent] no availability item for source {}", source);
            return;
        };
        let value = if available { "AVAILABLE" } else { "UNAVAILABLE" };
        if let Err(e) = self.observe_value(&item, value) {
            log::warn!("[agent] cannot update availability for {}: {}", source, e);
        }
    }
}

impl PipelineContract for Agent {
    fn find_data_item(&self, device: Option<&str>, key: &str) -> Option<DataItemPtr> {
        let devices = self.devices.read();
        match device {
            Some(name) => devices.find(name)?.data_item(key),
            None => devices.devices().iter().find_map(|d| d.data_item(key)),
        }
    }

    fn device_exists(&self, name: &str) -> bool {
        self.devices.read().find(name).is_some()
    }

    fn device_uuid(&self, name: &str) -> Option<String> {
        self.devices.read().find(name).map(|d| d.uuid().to_string())
    }

    fn deliver_observation(&self, observation: Observation) {
        self.add_observation(observation);
    }

    fn deliver_asset(&self, asset: Asset) {
        self.receive_asset(asset);
    }

    fn deliver_asset_command(&self, command: AssetCommand) {
        match command {
            AssetCommand::Remove { asset_id } => {
                if let Err(e) = self.remove_asset(&asset_id) {
                    log::warn!("[agent] asset removal failed: {}", e);
                }
            }
            AssetCommand::RemoveAll { asset_type } => {
                self.remove_all_assets(None, asset_type.as_deref());
            }
        }
    }

    fn deliver_command(&self, source: &str, command: DeviceCommand) {
        match command {
            DeviceCommand::Connected => self.set_source_availability(source, true),
            DeviceCommand::Disconnected => self.set_source_availability(source, false),
            DeviceCommand::Connecting => {}
            DeviceCommand::Protocol { key, value } => {
                log::info!("[agent] adapter {} protocol option {}={}", source, key, value);
            }
        }
    }

    fn deliver_device(&self, source: &str, xml: &str) {
        // Sources may push their own device model; a duplicate id means the
        // model is already loaded and the push is ignored.
        match parse_devices_xml(xml) {
            Ok(parsed) => {
                for device in parsed {
                    let name = device.name().to_string();
                    // Bind before matching so the write guard drops here.
                    let added = self.devices.write().add(device);
                    match added {
                        Ok(added) => {
                            for item in added.data_items() {
                                self.observe_unavailable(&item);
                            }
                            log::info!("[agent] source {} added device {}", source, added.name());
                            self.device_event("DEVICE_ADDED", added.uuid());
                        }
                        Err(e) => {
                            log::debug!("[agent] device {} from {} not added: {}", name, source, e)
                        }
                    }
                }
            }
            Err(e) => log::warn!("[agent] cannot parse device model from {}: {}", source, e),
        }
    }
}

/// The agent's own device: availability plus asset and device lifecycle
/// events.
fn agent_device() -> Device {
    let mut root = Component::new("Agent", "agent")
        .with_name("Agent")
        .with_uuid("agent-instance");

    for (id, type_name) in [
        ("agent_avail", "AVAILABILITY"),
        ("agent_asset_changed", "ASSET_CHANGED"),
        ("agent_asset_removed", "ASSET_REMOVED"),
        ("agent_device_added", "DEVICE_ADDED"),
        ("agent_device_removed", "DEVICE_REMOVED"),
        ("agent_device_changed", "DEVICE_CHANGED"),
    ] {
        let mut props = Properties::new();
        props.insert("id", id);
        props.insert("type", type_name);
        props.insert("category", "EVENT");
        props.insert("componentId", "agent");
        props.insert("deviceUuid", "agent-instance");
        root.add_data_item(DataItem::make(props).expect("agent device items are well formed"));
    }

    Device::new(root).expect("agent device carries name and uuid")
}
