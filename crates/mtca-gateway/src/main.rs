// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! MTConnect agent HTTP gateway.
//!
//! Hosts the agent core and exposes the MTConnect REST protocol plus a
//! WebSocket command channel.
//!
//! # Usage
//!
//! ```bash
//! # Serve a device model on the default port 5000
//! mtca-gateway --devices devices.xml
//!
//! # Custom port, writable agent
//! mtca-gateway --devices devices.xml --port 5001 --option AllowPut=true
//! ```
//!
//! # Endpoints
//!
//! - `GET /probe`, `GET /{device}/probe` - device descriptors
//! - `GET /current`, `GET /sample` - observations (streaming with `interval`)
//! - `GET /assets`, `GET /asset/{ids}` - assets
//! - `PUT /asset/{id}`, `DELETE /asset/{id}` - asset lifecycle (AllowPut)
//! - `PUT /{device}` - observation injection (AllowPut)
//! - `GET /ws` - WebSocket command channel

mod handlers;
mod routes;
mod ws;

use std::sync::Arc;

use clap::Parser;
use mtca::sink::RequestDispatcher;
use mtca::{Agent, AgentConfig};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// MTConnect agent gateway
#[derive(Parser, Debug)]
#[command(name = "mtca-gateway")]
#[command(about = "MTConnect agent REST/WebSocket gateway")]
#[command(version)]
struct Args {
    /// Device model XML file
    #[arg(short, long)]
    devices: String,

    /// HTTP server port
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Agent options as Key=Value pairs (repeatable)
    #[arg(short, long = "option")]
    options: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Shared application state
pub struct AppState {
    dispatcher: RequestDispatcher,
}

impl AppState {
    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    pub fn allow_put(&self) -> bool {
        self.dispatcher.agent().config().allow_put
    }
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
    config.port = args.port;
    config.host = args.bind.clone();
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
        // Duplicate data item ids or malformed models are fatal.
        eprintln!("Cannot load device model: {}", e);
        std::process::exit(1);
    }

    let state = Arc::new(AppState {
        dispatcher: RequestDispatcher::new(Arc::clone(&agent)),
    });

    let app = routes::router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", args.bind, args.port);
    info!("mtca-gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("Agent instance: {}", agent.instance_id());
    info!("HTTP server: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    axum::serve(listener, app).await.expect("Server error");
}
