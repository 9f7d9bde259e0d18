// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! The MQTT egress service.
//!
//! Publishes JSON documents to the configured topic patterns:
//!
//! - probe per device on connect and on device-model change
//! - current snapshots every `MqttCurrentInterval`
//! - samples streamed on change, paced by `MqttSampleInterval` with at
//!   most `MqttSampleCount` observations per publish
//! - assets on change, one topic per asset id
//! - availability through the broker last-will (`AVAILABLE` retained,
//!   `UNAVAILABLE` as the will payload)

use std::collections::HashMap;
use std::sync::Arc;

use mtca::device_model::DevicePtr;
use mtca::sink::{DocFormat, QueryScope, RequestDispatcher, SessionFrame, SessionHandle};
use rumqttc::{AsyncClient, LastWill, MqttOptions, QoS};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("request failed: {0}")]
    Request(String),
}

/// Substitute the `[device]` placeholder of a topic pattern.
pub fn format_topic(pattern: &str, device: &str) -> String {
    pattern.replace("[device]", device)
}

pub struct MqttSinkService {
    dispatcher: Arc<RequestDispatcher>,
    client: AsyncClient,
    sessions: Vec<SessionHandle>,
    /// Asset id → last published document pointer, for change detection.
    published_assets: HashMap<String, usize>,
}

impl MqttSinkService {
    /// Build the client with the availability last-will attached.
    pub fn connect(
        dispatcher: Arc<RequestDispatcher>,
        broker_host: &str,
        broker_port: u16,
        client_id: &str,
    ) -> (Self, rumqttc::EventLoop) {
        let config = dispatcher.agent().config().clone();
        let will_topic = format_topic(&config.last_will_topic, "Agent");

        let mut options = MqttOptions::new(client_id, broker_host, broker_port);
        options.set_keep_alive(std::time::Duration::from_secs(30));
        options.set_last_will(LastWill::new(
            will_topic,
            "UNAVAILABLE",
            QoS::AtLeastOnce,
            true,
        ));

        let (client, event_loop) = AsyncClient::new(options, 64);
        (
            Self {
                dispatcher,
                client,
                sessions: Vec::new(),
                published_assets: HashMap::new(),
            },
            event_loop,
        )
    }

    /// Announce the agent: availability, then one probe per device.
    pub async fn publish_startup(&self) -> Result<(), SinkError> {
        let config = self.dispatcher.agent().config().clone();
        let will_topic = format_topic(&config.last_will_topic, "Agent");
        self.client
            .publish(will_topic.clone(), QoS::AtLeastOnce, true, "AVAILABLE")
            .await?;

        for device in self.dispatcher.agent().devices() {
            self.publish_probe(&device).await?;
        }
        Ok(())
    }

    async fn publish_probe(&self, device: &DevicePtr) -> Result<(), SinkError> {
        let config = self.dispatcher.agent().config();
        let topic = format_topic(&config.probe_topic, device.name());
        let response = self
            .dispatcher
            .probe(Some(device.name()), DocFormat::Json, false)
            .map_err(|e| SinkError::Request(e.to_string()))?;
        debug!("publishing probe for {}", topic);
        self.client
            .publish(topic.clone(), QoS::AtLeastOnce, true, response.body)
            .await?;
        Ok(())
    }

    /// One current snapshot per device.
    pub async fn publish_current(&self) -> Result<(), SinkError> {
        let config = self.dispatcher.agent().config().clone();
        for device in self.dispatcher.agent().devices() {
            let topic = format_topic(&config.current_topic, device.name());
            let scope = QueryScope {
                device: Some(device.name().to_string()),
                path: None,
            };
            match self.dispatcher.current(&scope, None, DocFormat::Json, false) {
                Ok(response) => {
                    self.client
                        .publish(topic.clone(), QoS::AtLeastOnce, false, response.body)
                        .await?;
                }
                Err(e) => warn!("current publish failed for {}: {}", device.name(), e),
            }
        }
        Ok(())
    }

    /// Publish assets whose stored document changed since the last pass.
    pub async fn publish_changed_assets(&mut self) -> Result<(), SinkError> {
        let config = self.dispatcher.agent().config().clone();
        let assets = self.dispatcher.agent().assets(usize::MAX, true, None, None);
        for asset in assets {
            let marker = Arc::as_ptr(asset.entity()) as usize;
            let id = asset.asset_id().to_string();
            if self.published_assets.get(&id) == Some(&marker) {
                continue;
            }
            let device = asset
                .device_uuid()
                .and_then(|uuid| self.dispatcher.agent().device(uuid))
                .map(|d| d.name().to_string())
                .unwrap_or_else(|| "Agent".to_string());
            let topic = format!(
                "{}/{}",
                format_topic(&config.asset_topic, &device),
                asset.asset_id()
            );
            let response = self
                .dispatcher
                .assets(
                    Some(&[id.clone()]),
                    None,
                    None,
                    true,
                    None,
                    DocFormat::Json,
                    false,
                )
                .map_err(|e| SinkError::Request(e.to_string()))?;
            info!("publishing asset {} to {}", id, topic);
            self.client
                .publish(topic.clone(), QoS::AtLeastOnce, true, response.body)
                .await?;
            self.published_assets.insert(id, marker);
        }
        Ok(())
    }

    /// Start one paced sample stream per device.
    pub fn start_sample_streams(&mut self) -> Result<(), SinkError> {
        let config = self.dispatcher.agent().config().clone();
        for device in self.dispatcher.agent().devices() {
            let scope = QueryScope {
                device: Some(device.name().to_string()),
                path: None,
            };
            let (mut rx, handle) = self
                .dispatcher
                .stream_sample(
                    &scope,
                    None,
                    config.mqtt_sample_interval.as_millis() as u64,
                    Some(config.heartbeat.as_millis() as u64),
                    Some(config.mqtt_sample_count),
                    DocFormat::Json,
                    false,
                )
                .map_err(|e| SinkError::Request(e.to_string()))?;

            let topic = format_topic(&config.sample_topic, device.name());
            let client = self.client.clone();
            tokio::spawn(async move {
                while let Some(frame) = rx.recv().await {
                    match frame {
                        SessionFrame::Document(doc) => {
                            if let Err(e) =
                                client.publish(topic.clone(), QoS::AtLeastOnce, false, doc).await
                            {
                                warn!("sample publish failed for {}: {}", topic, e);
                                break;
                            }
                        }
                        // Keep-alives stay off the wire; MQTT has its own.
                        SessionFrame::Heartbeat(_) => {}
                        SessionFrame::Failed { message, .. } => {
                            warn!("sample stream for {} failed: {}", topic, message);
                            break;
                        }
                    }
                }
            });
            self.sessions.push(handle);
        }
        Ok(())
    }

    /// Main service loop: current pacing plus asset change publishing.
    pub async fn run(mut self) -> Result<(), SinkError> {
        self.publish_startup().await?;
        self.start_sample_streams()?;

        let interval = self.dispatcher.agent().config().mqtt_current_interval;
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.publish_current().await?;
            self.publish_changed_assets().await?;
        }
    }
}

impl Drop for MqttSinkService {
    fn drop(&mut self) {
        for session in &self.sessions {
            session.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_topic_substitutes_device() {
        assert_eq!(
            format_topic("MTConnect/Current/[device]", "LinuxCNC"),
            "MTConnect/Current/LinuxCNC"
        );
        assert_eq!(
            format_topic("MTConnect/Probe/[device]/Availability", "Agent"),
            "MTConnect/Probe/Agent/Availability"
        );
        assert_eq!(format_topic("Fixed/Topic", "X"), "Fixed/Topic");
    }
}
