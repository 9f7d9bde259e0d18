// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! REST handlers: query-string parsing, dispatch, and streaming framing.
//!
//! One-shot requests map straight onto the dispatcher. Requests carrying
//! `interval` switch to `multipart/x-mixed-replace` chunked responses fed
//! by a streaming session.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response as AxumResponse};
use futures::stream;
use mtca::sink::{
    DocFormat, ErrorCode, QueryScope, RequestError, Response, SessionFrame, SessionHandle,
};
use tracing::debug;

use crate::AppState;

const MIME_BOUNDARY: &str = "mtconnect-agent-stream";

type Params = HashMap<String, String>;

// ----------------------------------------------------------------------
// Probe
// ----------------------------------------------------------------------

pub async fn root(state: State<Arc<AppState>>, headers: HeaderMap, params: Query<Params>) -> AxumResponse {
    probe_inner(state, headers, params, None)
}

pub async fn device_root(
    state: State<Arc<AppState>>,
    Path(device): Path<String>,
    headers: HeaderMap,
    params: Query<Params>,
) -> AxumResponse {
    probe_inner(state, headers, params, Some(device))
}

pub async fn probe(state: State<Arc<AppState>>, headers: HeaderMap, params: Query<Params>) -> AxumResponse {
    probe_inner(state, headers, params, None)
}

pub async fn probe_device(
    state: State<Arc<AppState>>,
    Path(device): Path<String>,
    headers: HeaderMap,
    params: Query<Params>,
) -> AxumResponse {
    probe_inner(state, headers, params, Some(device))
}

fn probe_inner(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<Params>,
    device: Option<String>,
) -> AxumResponse {
    let (format, pretty) = match format_of(&headers, &params) {
        Ok(v) => v,
        Err(e) => return error(&state, &e, &headers, &params),
    };
    match state.dispatcher().probe(device.as_deref(), format, pretty) {
        Ok(response) => plain(response),
        Err(e) => error(&state, &e, &headers, &params),
    }
}

// ----------------------------------------------------------------------
// Current / Sample
// ----------------------------------------------------------------------

pub async fn current(state: State<Arc<AppState>>, headers: HeaderMap, params: Query<Params>) -> AxumResponse {
    current_inner(state, headers, params, None)
}

pub async fn current_device(
    state: State<Arc<AppState>>,
    Path(device): Path<String>,
    headers: HeaderMap,
    params: Query<Params>,
) -> AxumResponse {
    current_inner(state, headers, params, Some(device))
}

fn current_inner(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<Params>,
    device: Option<String>,
) -> AxumResponse {
    let (format, pretty) = match format_of(&headers, &params) {
        Ok(v) => v,
        Err(e) => return error(&state, &e, &headers, &params),
    };
    let scope = QueryScope {
        device,
        path: params.get("path").cloned(),
    };

    if let Some(interval) = params.get("interval") {
        let Ok(interval) = interval.parse::<u64>() else {
            let e = RequestError::new(ErrorCode::InvalidParameterValue, "interval must be an integer");
            return error(&state, &e, &headers, &params);
        };
        return match state.dispatcher().stream_current(&scope, interval, format, pretty) {
            Ok((rx, handle)) => streaming(rx, handle, format),
            Err(e) => error(&state, &e, &headers, &params),
        };
    }

    let at = match parse_u64(&params, "at") {
        Ok(v) => v,
        Err(e) => return error(&state, &e, &headers, &params),
    };
    match state.dispatcher().current(&scope, at, format, pretty) {
        Ok(response) => plain(response),
        Err(e) => error(&state, &e, &headers, &params),
    }
}

pub async fn sample(state: State<Arc<AppState>>, headers: HeaderMap, params: Query<Params>) -> AxumResponse {
    sample_inner(state, headers, params, None)
}

pub async fn sample_device(
    state: State<Arc<AppState>>,
    Path(device): Path<String>,
    headers: HeaderMap,
    params: Query<Params>,
) -> AxumResponse {
    sample_inner(state, headers, params, Some(device))
}

fn sample_inner(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<Params>,
    device: Option<String>,
) -> AxumResponse {
    let (format, pretty) = match format_of(&headers, &params) {
        Ok(v) => v,
        Err(e) => return error(&state, &e, &headers, &params),
    };
    let scope = QueryScope {
        device,
        path: params.get("path").cloned(),
    };
    let (from, to, count) = match (
        parse_u64(&params, "from"),
        parse_u64(&params, "to"),
        parse_u64(&params, "count"),
    ) {
        (Ok(f), Ok(t), Ok(c)) => (f, t, c.map(|c| c as usize)),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
            return error(&state, &e, &headers, &params)
        }
    };

    if let Some(interval) = params.get("interval") {
        let Ok(interval) = interval.parse::<u64>() else {
            let e = RequestError::new(ErrorCode::InvalidParameterValue, "interval must be an integer");
            return error(&state, &e, &headers, &params);
        };
        let heartbeat = match parse_u64(&params, "heartbeat") {
            Ok(v) => v,
            Err(e) => return error(&state, &e, &headers, &params),
        };
        return match state
            .dispatcher()
            .stream_sample(&scope, from, interval, heartbeat, count, format, pretty)
        {
            Ok((rx, handle)) => streaming(rx, handle, format),
            Err(e) => error(&state, &e, &headers, &params),
        };
    }

    match state.dispatcher().sample(&scope, from, to, count, format, pretty) {
        Ok(response) => plain(response),
        Err(e) => error(&state, &e, &headers, &params),
    }
}

// ----------------------------------------------------------------------
// Assets
// ----------------------------------------------------------------------

pub async fn assets(state: State<Arc<AppState>>, headers: HeaderMap, params: Query<Params>) -> AxumResponse {
    assets_inner(state, headers, params, None, None)
}

pub async fn assets_device(
    state: State<Arc<AppState>>,
    Path(device): Path<String>,
    headers: HeaderMap,
    params: Query<Params>,
) -> AxumResponse {
    assets_inner(state, headers, params, None, Some(device))
}

pub async fn assets_by_id(
    state: State<Arc<AppState>>,
    Path(ids): Path<String>,
    headers: HeaderMap,
    params: Query<Params>,
) -> AxumResponse {
    let ids: Vec<String> = ids.split(';').map(String::from).collect();
    assets_inner(state, headers, params, Some(ids), None)
}

fn assets_inner(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<Params>,
    ids: Option<Vec<String>>,
    device: Option<String>,
) -> AxumResponse {
    let (format, pretty) = match format_of(&headers, &params) {
        Ok(v) => v,
        Err(e) => return error(&state, &e, &headers, &params),
    };
    let removed = params.get("removed").map(|v| v == "true").unwrap_or(false);
    let count = match parse_u64(&params, "count") {
        Ok(v) => v.map(|c| c as usize),
        Err(e) => return error(&state, &e, &headers, &params),
    };
    let result = state.dispatcher().assets(
        ids.as_deref(),
        params.get("type").map(String::as_str),
        device.as_deref().or(params.get("device").map(String::as_str)),
        removed,
        count,
        format,
        pretty,
    );
    match result {
        Ok(response) => plain(response),
        Err(e) => error(&state, &e, &headers, &params),
    }
}

pub async fn put_asset(
    state: State<Arc<AppState>>,
    Path(_id): Path<String>,
    headers: HeaderMap,
    params: Query<Params>,
    body: String,
) -> AxumResponse {
    put_asset_inner(state, headers, params, None, body)
}

pub async fn put_asset_device(
    state: State<Arc<AppState>>,
    Path((device, _id)): Path<(String, String)>,
    headers: HeaderMap,
    params: Query<Params>,
    body: String,
) -> AxumResponse {
    put_asset_inner(state, headers, params, Some(device), body)
}

fn put_asset_inner(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<Params>,
    device: Option<String>,
    body: String,
) -> AxumResponse {
    let (format, pretty) = match format_of(&headers, &params) {
        Ok(v) => v,
        Err(e) => return error(&state, &e, &headers, &params),
    };
    if !state.allow_put() {
        let e = RequestError::new(ErrorCode::Unsupported, "PUT is not allowed (AllowPut)");
        return error(&state, &e, &headers, &params);
    }
    let device = device.or_else(|| params.get("device").cloned());
    match state.dispatcher().put_asset(&body, device.as_deref(), format, pretty) {
        Ok(response) => plain(response),
        Err(e) => error(&state, &e, &headers, &params),
    }
}

pub async fn delete_asset(
    state: State<Arc<AppState>>,
    Path(ids): Path<String>,
    headers: HeaderMap,
    params: Query<Params>,
) -> AxumResponse {
    let State(state_ref) = &state;
    let (format, pretty) = match format_of(&headers, &params) {
        Ok(v) => v,
        Err(e) => return error(state_ref, &e, &headers, &params),
    };
    if !state_ref.allow_put() {
        let e = RequestError::new(ErrorCode::Unsupported, "DELETE is not allowed (AllowPut)");
        return error(state_ref, &e, &headers, &params);
    }
    let ids: Vec<String> = ids.split(';').map(String::from).collect();
    match state_ref.dispatcher().delete_asset(&ids, format, pretty) {
        Ok(response) => plain(response),
        Err(e) => error(state_ref, &e, &headers, &params),
    }
}

pub async fn delete_all_assets(
    state: State<Arc<AppState>>,
    headers: HeaderMap,
    params: Query<Params>,
) -> AxumResponse {
    let State(state_ref) = &state;
    let (format, pretty) = match format_of(&headers, &params) {
        Ok(v) => v,
        Err(e) => return error(state_ref, &e, &headers, &params),
    };
    if !state_ref.allow_put() {
        let e = RequestError::new(ErrorCode::Unsupported, "DELETE is not allowed (AllowPut)");
        return error(state_ref, &e, &headers, &params);
    }
    let result = state_ref.dispatcher().delete_all_assets(
        params.get("device").map(String::as_str),
        params.get("type").map(String::as_str),
        format,
        pretty,
    );
    match result {
        Ok(response) => plain(response),
        Err(e) => error(state_ref, &e, &headers, &params),
    }
}

// ----------------------------------------------------------------------
// Observation PUT
// ----------------------------------------------------------------------

pub async fn put_observation(
    state: State<Arc<AppState>>,
    Path(device): Path<String>,
    headers: HeaderMap,
    params: Query<Params>,
) -> AxumResponse {
    let State(state_ref) = &state;
    let (format, pretty) = match format_of(&headers, &params) {
        Ok(v) => v,
        Err(e) => return error(state_ref, &e, &headers, &params),
    };
    if !state_ref.allow_put() {
        let e = RequestError::new(ErrorCode::Unsupported, "PUT is not allowed (AllowPut)");
        return error(state_ref, &e, &headers, &params);
    }

    let values: Vec<(String, String)> = params
        .iter()
        .filter(|(k, _)| !matches!(k.as_str(), "time" | "format" | "pretty"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    match state_ref
        .dispatcher()
        .put_observation(&device, &values, format, pretty)
    {
        Ok(response) => plain(response),
        Err(e) => error(state_ref, &e, &headers, &params),
    }
}

// ----------------------------------------------------------------------
// Response plumbing
// ----------------------------------------------------------------------

fn parse_u64(params: &Params, key: &str) -> Result<Option<u64>, RequestError> {
    match params.get(key) {
        None => Ok(None),
        Some(raw) => raw.parse::<u64>().map(Some).map_err(|_| {
            RequestError::new(
                ErrorCode::InvalidParameterValue,
                format!("'{}' must be an unsigned integer: {}", key, raw),
            )
        }),
    }
}

fn format_of(headers: &HeaderMap, params: &Params) -> Result<(DocFormat, bool), RequestError> {
    let accepts = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok());
    let format = DocFormat::resolve(params.get("format").map(String::as_str), accepts)?;
    let pretty = params.get("pretty").map(|v| v == "true").unwrap_or(false);
    Ok((format, pretty))
}

fn plain(response: Response) -> AxumResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, response.mime)],
        response.body,
    )
        .into_response()
}

fn error(state: &Arc<AppState>, e: &RequestError, headers: &HeaderMap, params: &Params) -> AxumResponse {
    debug!("request failed: {}", e);
    // Error documents honor the requested format when resolvable.
    let format = format_of(headers, params)
        .map(|(f, _)| f)
        .unwrap_or(DocFormat::Xml);
    let pretty = params.get("pretty").map(|v| v == "true").unwrap_or(false);
    plain(state.dispatcher().error_response(e, format, pretty))
}

/// Wrap a session's frames as a `multipart/x-mixed-replace` body. The
/// session is cancelled when the client disconnects and the body stream
/// drops.
fn streaming(
    rx: tokio::sync::mpsc::Receiver<SessionFrame>,
    handle: SessionHandle,
    format: DocFormat,
) -> AxumResponse {
    let mime = match format {
        DocFormat::Xml => "text/xml",
        DocFormat::Json => "application/json",
    };

    let body_stream = stream::unfold((rx, handle, false), move |(mut rx, handle, done)| async move {
        if done {
            handle.cancel();
            return None;
        }
        match rx.recv().await {
            Some(SessionFrame::Document(doc)) | Some(SessionFrame::Heartbeat(doc)) => {
                let part = format!(
                    "--{boundary}\r\nContent-type: {mime}\r\nContent-length: {len}\r\n\r\n{doc}\r\n",
                    boundary = MIME_BOUNDARY,
                    mime = mime,
                    len = doc.len(),
                    doc = doc
                );
                Some((Ok::<_, std::convert::Infallible>(part), (rx, handle, false)))
            }
            Some(SessionFrame::Failed { message, .. }) => {
                let part = format!(
                    "--{boundary}\r\nContent-type: {mime}\r\nContent-length: {len}\r\n\r\n{doc}\r\n",
                    boundary = MIME_BOUNDARY,
                    mime = mime,
                    len = message.len(),
                    doc = message
                );
                Some((Ok(part), (rx, handle, true)))
            }
            None => {
                handle.cancel();
                None
            }
        }
    });

    AxumResponse::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace;boundary={}", MIME_BOUNDARY),
        )
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
