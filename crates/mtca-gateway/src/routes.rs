// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Route table: MTConnect REST verbs plus the WebSocket channel.

use std::sync::Arc;

use axum::routing::{get, put};
use axum::Router;

use crate::handlers;
use crate::ws;
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/probe", get(handlers::probe))
        .route("/current", get(handlers::current))
        .route("/sample", get(handlers::sample))
        .route("/assets", get(handlers::assets).delete(handlers::delete_all_assets))
        .route("/asset", get(handlers::assets))
        .route(
            "/asset/:ids",
            get(handlers::assets_by_id)
                .put(handlers::put_asset)
                .post(handlers::put_asset)
                .delete(handlers::delete_asset),
        )
        .route("/assets/:ids", get(handlers::assets_by_id))
        .route("/ws", get(ws::upgrade))
        .route(
            "/:device",
            get(handlers::device_root)
                .put(handlers::put_observation)
                .post(handlers::put_observation),
        )
        .route("/:device/probe", get(handlers::probe_device))
        .route("/:device/current", get(handlers::current_device))
        .route("/:device/sample", get(handlers::sample_device))
        .route("/:device/assets", get(handlers::assets_device))
        .route("/:device/asset/:ids", put(handlers::put_asset_device))
        .with_state(state)
}
