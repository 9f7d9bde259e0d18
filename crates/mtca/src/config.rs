// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Agent configuration - single source of truth.
//!
//! Every tunable the core consults lives here with its default. Keys are a
//! closed set with fixed value types; an unknown key or a value of the
//! wrong type is rejected at load time, never silently ignored.

use std::time::Duration;

use crate::error::{Error, Result};

// =======================================================================
// Defaults (agent core)
// =======================================================================

/// Observation buffer size as a power of two (2^17 = 131072 slots).
pub const DEFAULT_BUFFER_SIZE: u8 = 17;

/// One checkpoint per this many sequences.
pub const DEFAULT_CHECKPOINT_FREQUENCY: u64 = 1000;

/// Asset storage cap.
pub const DEFAULT_MAX_ASSETS: usize = 1024;

/// Streaming heartbeat when the client does not specify one.
pub const DEFAULT_HEARTBEAT_MS: u64 = 10_000;

/// Default observation count per sample request.
pub const DEFAULT_SAMPLE_COUNT: usize = 100;

/// Adapter reconnect probe interval.
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 10_000;

/// Legacy adapter heartbeat timeout.
pub const DEFAULT_LEGACY_TIMEOUT_MS: u64 = 600_000;

/// Supported SHDR protocol version.
pub const DEFAULT_SHDR_VERSION: u32 = 2;

// =======================================================================
// Defaults (MQTT egress)
// =======================================================================

pub const DEFAULT_PROBE_TOPIC: &str = "MTConnect/Probe/[device]";
pub const DEFAULT_CURRENT_TOPIC: &str = "MTConnect/Current/[device]";
pub const DEFAULT_SAMPLE_TOPIC: &str = "MTConnect/Sample/[device]";
pub const DEFAULT_ASSET_TOPIC: &str = "MTConnect/Asset/[device]";
pub const DEFAULT_LAST_WILL_TOPIC: &str = "MTConnect/Probe/[device]/Availability";
pub const DEFAULT_MQTT_CURRENT_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_MQTT_SAMPLE_INTERVAL_MS: u64 = 500;
pub const DEFAULT_MQTT_SAMPLE_COUNT: usize = 1000;

/// Typed agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    // Core
    pub buffer_size: u8,
    pub checkpoint_frequency: u64,
    pub max_assets: usize,
    pub heartbeat: Duration,
    pub sample_count: usize,
    pub monitor_interval: Duration,
    pub legacy_timeout: Duration,
    pub shdr_version: u32,

    // Pipeline switches
    pub filter_duplicates: bool,
    pub conversion_required: bool,
    pub validation: bool,
    pub correct_timestamps: bool,
    pub upcase_data_item_value: bool,
    pub ignore_timestamps: bool,

    // REST endpoint
    pub host: String,
    pub port: u16,
    pub allow_put: bool,
    pub allow_put_from: Vec<String>,
    pub pretty: bool,
    pub sender: Option<String>,
    pub schema_version: String,
    pub json_version: u32,
    /// TLS client-certificate presence gate; policy lives outside the core.
    pub tls_client_cert_required: bool,

    // MQTT egress
    pub probe_topic: String,
    pub current_topic: String,
    pub sample_topic: String,
    pub asset_topic: String,
    pub last_will_topic: String,
    pub mqtt_current_interval: Duration,
    pub mqtt_sample_interval: Duration,
    pub mqtt_sample_count: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            checkpoint_frequency: DEFAULT_CHECKPOINT_FREQUENCY,
            max_assets: DEFAULT_MAX_ASSETS,
            heartbeat: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            sample_count: DEFAULT_SAMPLE_COUNT,
            monitor_interval: Duration::from_millis(DEFAULT_MONITOR_INTERVAL_MS),
            legacy_timeout: Duration::from_millis(DEFAULT_LEGACY_TIMEOUT_MS),
            shdr_version: DEFAULT_SHDR_VERSION,
            filter_duplicates: false,
            conversion_required: true,
            validation: false,
            correct_timestamps: false,
            upcase_data_item_value: true,
            ignore_timestamps: false,
            host: "0.0.0.0".into(),
            port: 5000,
            allow_put: false,
            allow_put_from: Vec::new(),
            pretty: false,
            sender: None,
            schema_version: "2.3".into(),
            json_version: 2,
            tls_client_cert_required: false,
            probe_topic: DEFAULT_PROBE_TOPIC.into(),
            current_topic: DEFAULT_CURRENT_TOPIC.into(),
            sample_topic: DEFAULT_SAMPLE_TOPIC.into(),
            asset_topic: DEFAULT_ASSET_TOPIC.into(),
            last_will_topic: DEFAULT_LAST_WILL_TOPIC.into(),
            mqtt_current_interval: Duration::from_millis(DEFAULT_MQTT_CURRENT_INTERVAL_MS),
            mqtt_sample_interval: Duration::from_millis(DEFAULT_MQTT_SAMPLE_INTERVAL_MS),
            mqtt_sample_count: DEFAULT_MQTT_SAMPLE_COUNT,
        }
    }
}

impl AgentConfig {
    /// Build a configuration from key/value pairs, starting from defaults.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<AgentConfig>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = AgentConfig::default();
        for (key, value) in pairs {
            config.set(key, value)?;
        }
        Ok(config)
    }

    /// Apply one enumerated key. Unknown keys and mistyped values fail.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "BufferSize" => self.buffer_size = parse(key, value)?,
            "CheckpointFrequency" => self.checkpoint_frequency = parse(key, value)?,
            "MaxAssets" => self.max_assets = parse(key, value)?,
            "Heartbeat" => self.heartbeat = Duration::from_millis(parse(key, value)?),
            "SampleCount" => self.sample_count = parse(key, value)?,
            "MonitorInterval" => self.monitor_interval = Duration::from_millis(parse(key, value)?),
            "LegacyTimeout" => self.legacy_timeout = Duration::from_millis(parse(key, value)?),
            "ShdrVersion" => self.shdr_version = parse(key, value)?,
            "FilterDuplicates" => self.filter_duplicates = parse_bool(key, value)?,
            "ConversionRequired" => self.conversion_required = parse_bool(key, value)?,
            "Validation" => self.validation = parse_bool(key, value)?,
            "CorrectTimestamps" => self.correct_timestamps = parse_bool(key, value)?,
            "UpcaseDataItemValue" => self.upcase_data_item_value = parse_bool(key, value)?,
            "IgnoreTimestamps" => self.ignore_timestamps = parse_bool(key, value)?,
            "Host" | "ServerIp" => self.host = value.to_string(),
            "Port" => self.port = parse(key, value)?,
            "AllowPut" => self.allow_put = parse_bool(key, value)?,
            "AllowPutFrom" => {
                self.allow_put_from = value.split(',').map(|s| s.trim().to_string()).collect()
            }
            "Pretty" => self.pretty = parse_bool(key, value)?,
            "Sender" => self.sender = Some(value.to_string()),
            "SchemaVersion" => self.schema_version = value.to_string(),
            "JsonVersion" => self.json_version = parse(key, value)?,
            "TlsVerifyClientCertificate" => {
                self.tls_client_cert_required = parse_bool(key, value)?
            }
            "ProbeTopic" | "DeviceTopic" => self.probe_topic = value.to_string(),
            "CurrentTopic" => self.current_topic = value.to_string(),
            "SampleTopic" => self.sample_topic = value.to_string(),
            "AssetTopic" => self.asset_topic = value.to_string(),
            "MqttLastWillTopic" => self.last_will_topic = value.to_string(),
            "MqttCurrentInterval" => {
                self.mqtt_current_interval = Duration::from_millis(parse(key, value)?)
            }
            "MqttSampleInterval" => {
                self.mqtt_sample_interval = Duration::from_millis(parse(key, value)?)
            }
            "MqttSampleCount" => self.mqtt_sample_count = parse(key, value)?,
            _ => return Err(Error::UnknownConfigKey(key.to_string())),
        }
        Ok(())
    }

    /// Whether PUT/POST mutation is allowed from the given peer.
    pub fn put_allowed_from(&self, peer: &str) -> bool {
        self.allow_put
            && (self.allow_put_from.is_empty()
                || self.allow_put_from.iter().any(|allowed| allowed == peer))
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| Error::InvalidConfigValue(key.to_string(), value.to_string()))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(Error::InvalidConfigValue(key.to_string(), value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.buffer_size, 17);
        assert_eq!(config.checkpoint_frequency, 1000);
        assert!(!config.allow_put);
        assert_eq!(config.heartbeat, Duration::from_millis(10_000));
    }

    #[test]
    fn test_from_pairs_overrides() {
        let config = AgentConfig::from_pairs([
            ("BufferSize", "8"),
            ("FilterDuplicates", "true"),
            ("AllowPut", "yes"),
            ("Port", "5001"),
            ("MqttSampleCount", "50"),
        ])
        .expect("valid configuration");
        assert_eq!(config.buffer_size, 8);
        assert!(config.filter_duplicates);
        assert!(config.allow_put);
        assert_eq!(config.port, 5001);
        assert_eq!(config.mqtt_sample_count, 50);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = AgentConfig::from_pairs([("BogusOption", "1")])
            .expect_err("unknown keys must be rejected");
        assert!(matches!(err, Error::UnknownConfigKey(k) if k == "BogusOption"));
    }

    #[test]
    fn test_mistyped_value_rejected() {
        let mut config = AgentConfig::default();
        let err = config.set("Port", "not-a-port").expect_err("bad value");
        assert!(matches!(err, Error::InvalidConfigValue(k, _) if k == "Port"));
        let err = config.set("AllowPut", "maybe").expect_err("bad bool");
        assert!(matches!(err, Error::InvalidConfigValue(k, _) if k == "AllowPut"));
    }

    #[test]
    fn test_put_allowed_from() {
        let mut config = AgentConfig::default();
        assert!(!config.put_allowed_from("10.0.0.1"));

        config.set("AllowPut", "true").expect("valid");
        assert!(config.put_allowed_from("10.0.0.1"));

        config
            .set("AllowPutFrom", "10.0.0.2, 10.0.0.3")
            .expect("valid");
        assert!(!config.put_allowed_from("10.0.0.1"));
        assert!(config.put_allowed_from("10.0.0.3"));
    }
}
