// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! MTConnect MQTT egress sink.
//!
//! Hosts the agent core and republishes it over MQTT topics.
//!
//! # Usage
//!
//! ```bash
//! mtca-mqtt-sink --devices devices.xml --broker localhost --broker-port 1883
//! ```

mod service;

use std::sync::Arc;

use clap::Parser;
use mtca::sink::RequestDispatcher;
use mtca::{Agent, AgentConfig};
use tracing::{error, info};

use service::MqttSinkService;

/// MTConnect MQTT sink
#[derive(Parser, Debug)]
#[command(name = "mtca-mqtt-sink")]
#[command(about = "MTConnect agent MQTT egress sink")]
#[command(version)]
struct Args {
    /// Device model XML file
    #[arg(short, long)]
    devices: String,

    /// MQTT broker host
    #[arg(short, long, default_value = "127.0.0.1")]
    broker: String,

    /// MQTT broker port
    #[arg(long, default_value = "1883")]
    broker_port: u16,

    /// MQTT client id
    #[arg(long, default_value = "mtca-mqtt-sink")]
    client_id: String,

    /// Agent options as Key=Value pairs (repeatable)
    #[arg(short, long = "option")]
    options: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .init();

    let mut config = AgentConfig::default();
    for option in &args.options {
        let Some((key, value)) = option.split_once('=') else {
            eprintln!("Invalid option (expected Key=Value): {}", option);
            std::process::exit(1);
        };
        if let Err(e) = config.set(key, value) {
            eprintln!("Invalid option: {}", e);
            std::process::exit(1);
        }
    }

    let device_xml = match std::fs::read_to_string(&args.devices) {
        Ok(xml) => xml,
        Err(e) => {
            eprintln!("Cannot read device file {}: {}", args.devices, e);
            std::process::exit(1);
        }
    };

    let agent = Agent::new(config);
    if let Err(e) = agent.load_devices(&device_xml) {
        eprintln!("Cannot load device model: {}", e);
        std::process::exit(1);
    }

    let dispatcher = Arc::new(RequestDispatcher::new(agent));
    let (sink, mut event_loop) =
        MqttSinkService::connect(dispatcher, &args.broker, args.broker_port, &args.client_id);

    info!("mtca-mqtt-sink v{}", env!("CARGO_PKG_VERSION"));
    info!("MQTT broker: {}:{}", args.broker, args.broker_port);

    // Drive the MQTT event loop alongside the publishing service.
    let poller = tokio::spawn(async move {
        loop {
            if let Err(e) = event_loop.poll().await {
                error!("MQTT connection error: {}", e);
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        }
    });

    if let Err(e) = sink.run().await {
        error!("MQTT sink failed: {}", e);
    }
    poller.abort();
}
