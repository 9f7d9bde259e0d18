// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! WebSocket command channel.
//!
//! Clients send JSON commands carrying a mandatory client-chosen `id`;
//! every response repeats that id so concurrent requests multiplex over
//! one socket. Streaming requests keep emitting frames under their id
//! until a `cancel` with the same id arrives. A duplicate id is rejected
//! with an error framed under `id="ERROR"`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response as AxumResponse;
use futures::{SinkExt, StreamExt};
use mtca::sink::{DocFormat, ErrorCode, QueryScope, RequestError, SessionFrame, SessionHandle};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;

/// One inbound command.
#[derive(Debug, Deserialize)]
struct WsRequest {
    id: Option<serde_json::Value>,
    request: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    from: Option<u64>,
    #[serde(default)]
    at: Option<u64>,
    #[serde(default)]
    to: Option<u64>,
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    heartbeat: Option<u64>,
    #[serde(default, rename = "assetIds")]
    asset_ids: Option<Vec<String>>,
    #[serde(default, rename = "type")]
    asset_type: Option<String>,
    #[serde(default)]
    removed: Option<bool>,
    #[serde(default)]
    pretty: Option<bool>,
}

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> AxumResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4().to_string()[..8].to_string();
    info!("[{}] websocket session opened", session_id);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(64);

    // Forward task: everything leaves through one sender.
    let forward_id = session_id.clone();
    let forward = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(Message::Text(text)).await.is_err() {
                debug!("[{}] websocket send failed, closing", forward_id);
                break;
            }
        }
    });

    // Streaming requests alive on this connection, by client id.
    let mut streams: HashMap<String, SessionHandle> = HashMap::new();

    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_message(&state, &session_id, &text, &tx, &mut streams).await;
            }
            Ok(Message::Close(_)) => {
                info!("[{}] client closed connection", session_id);
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Binary(_)) => {
                warn!("[{}] binary messages not supported", session_id);
            }
            Err(e) => {
                debug!("[{}] websocket error: {}", session_id, e);
                break;
            }
        }
    }

    for (_, handle) in streams.drain() {
        handle.cancel();
    }
    forward.abort();
    info!("[{}] websocket session ended", session_id);
}

async fn handle_message(
    state: &Arc<AppState>,
    session_id: &str,
    text: &str,
    tx: &tokio::sync::mpsc::Sender<String>,
    streams: &mut HashMap<String, SessionHandle>,
) {
    let request: WsRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!("[{}] websocket read error: {}", session_id, e);
            let error = RequestError::new(
                ErrorCode::InvalidRequest,
                format!("Websocket Read Error: {}", e),
            );
            send_error(state, tx, "ERROR", &error).await;
            return;
        }
    };

    // The id is mandatory and must be unique among active streams.
    let id = match &request.id {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => {
            let error = RequestError::new(ErrorCode::InvalidRequest, "Missing request id");
            send_error(state, tx, "ERROR", &error).await;
            return;
        }
    };

    let format = match DocFormat::resolve(request.format.as_deref(), None) {
        Ok(f) => f,
        Err(e) => {
            send_error(state, tx, &id, &e).await;
            return;
        }
    };
    let pretty = request.pretty.unwrap_or(false);
    let scope = QueryScope {
        device: request.device.clone(),
        path: request.path.clone(),
    };
    let dispatcher = state.dispatcher();

    match request.request.as_str() {
        "cancel" => {
            match streams.remove(&id) {
                Some(handle) => {
                    handle.cancel();
                    let _ = tx
                        .send(json!({"id": id, "success": true}).to_string())
                        .await;
                }
                None => {
                    let error = RequestError::new(
                        ErrorCode::InvalidRequest,
                        format!("No streaming request with id: {}", id),
                    );
                    send_error(state, tx, &id, &error).await;
                }
            }
            return;
        }
        _ if streams.contains_key(&id) => {
            // Duplicate id while a stream is active.
            let error = RequestError::new(
                ErrorCode::InvalidRequest,
                format!("Duplicate request id: {}", id),
            );
            send_error(state, tx, "ERROR", &error).await;
            return;
        }
        _ => {}
    }

    let result = match request.request.as_str() {
        "probe" => dispatcher.probe(request.device.as_deref(), format, pretty),
        "current" => match request.interval {
            Some(interval) => {
                match dispatcher.stream_current(&scope, interval, format, pretty) {
                    Ok((rx, handle)) => {
                        spawn_stream(id.clone(), rx, tx.clone());
                        streams.insert(id, handle);
                        return;
                    }
                    Err(e) => Err(e),
                }
            }
            None => dispatcher.current(&scope, request.at, format, pretty),
        },
        "sample" => match request.interval {
            Some(interval) => {
                match dispatcher.stream_sample(
                    &scope,
                    request.from,
                    interval,
                    request.heartbeat,
                    request.count,
                    format,
                    pretty,
                ) {
                    Ok((rx, handle)) => {
                        spawn_stream(id.clone(), rx, tx.clone());
                        streams.insert(id, handle);
                        return;
                    }
                    Err(e) => Err(e),
                }
            }
            None => dispatcher.sample(
                &scope,
                request.from,
                request.to,
                request.count,
                format,
                pretty,
            ),
        },
        "asset" | "assets" => dispatcher.assets(
            request.asset_ids.as_deref(),
            request.asset_type.as_deref(),
            request.device.as_deref(),
            request.removed.unwrap_or(false),
            request.count,
            format,
            pretty,
        ),
        other => Err(RequestError::new(
            ErrorCode::InvalidRequest,
            format!("Unknown request: {}", other),
        )),
    };

    match result {
        Ok(response) => {
            let frame = json!({"id": id, "status": response.status, "body": response.body});
            let _ = tx.send(frame.to_string()).await;
        }
        Err(e) => send_error(state, tx, &id, &e).await,
    }
}

/// Pump session frames to the socket under the request's id.
fn spawn_stream(
    id: String,
    mut rx: tokio::sync::mpsc::Receiver<SessionFrame>,
    tx: tokio::sync::mpsc::Sender<String>,
) {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let message = match frame {
                SessionFrame::Document(doc) | SessionFrame::Heartbeat(doc) => {
                    json!({"id": id, "status": 200, "body": doc})
                }
                SessionFrame::Failed { status, message } => {
                    json!({"id": id, "status": status, "error": message})
                }
            };
            if tx.send(message.to_string()).await.is_err() {
                break;
            }
        }
    });
}

async fn send_error(
    state: &Arc<AppState>,
    tx: &tokio::sync::mpsc::Sender<String>,
    id: &str,
    error: &RequestError,
) {
    let response = state
        .dispatcher()
        .error_response(error, DocFormat::Json, false);
    let frame = json!({"id": id, "status": response.status, "body": response.body});
    let _ = tx.send(frame.to_string()).await;
}
