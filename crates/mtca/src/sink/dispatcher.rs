// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! The request dispatcher: REST verbs and WS commands onto buffer and
//! asset queries.
//!
//! Every operation returns either a [`Response`] carrying a complete
//! document or a [`RequestError`] the transport renders with
//! [`RequestDispatcher::error_response`]. Streaming variants return a
//! frame receiver plus a cancel handle instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::agent::Agent;
use crate::asset::{Asset, AssetPtr};
use crate::buffer::FilterSet;
use crate::device_model::DevicePtr;
use crate::observation::{ChangeObserver, ObservationPtr};
use crate::printer::HeaderInfo;

use super::error::{ErrorCode, RequestError};
use super::path_filter::resolve_path;
use super::session::{
    ChunkFormatter, ChunkInfo, SessionFrame, SessionHandle, SessionParams, StreamSession,
};

/// Requested document encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocFormat {
    Xml,
    Json,
}

impl DocFormat {
    /// Resolve from the `format` query parameter, falling back to the
    /// Accept header. Unknown explicit formats are a client error;
    /// unacceptable Accept values map to 406.
    pub fn resolve(format: Option<&str>, accepts: Option<&str>) -> Result<DocFormat, RequestError> {
        if let Some(format) = format {
            return match format.to_ascii_lowercase().as_str() {
                "xml" => Ok(DocFormat::Xml),
                "json" => Ok(DocFormat::Json),
                other => Err(RequestError::new(
                    ErrorCode::InvalidParameterValue,
                    format!("Unknown format: {}", other),
                )),
            };
        }
        match accepts {
            Some(accepts) if accepts.contains("application/json") => Ok(DocFormat::Json),
            Some(accepts)
                if accepts.contains("xml")
                    || accepts.contains("*/*")
                    || accepts.trim().is_empty() =>
            {
                Ok(DocFormat::Xml)
            }
            Some(accepts) => Err(RequestError::new(
                ErrorCode::Unsupported,
                format!("Accept header cannot be satisfied: {}", accepts),
            )),
            None => Ok(DocFormat::Xml),
        }
    }

    fn json(&self) -> bool {
        *self == DocFormat::Json
    }
}

/// A completed request.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub body: String,
    pub mime: &'static str,
}

impl Response {
    fn ok(body: String, mime: &'static str) -> Self {
        Self {
            status: 200,
            body,
            mime,
        }
    }
}

/// Query parameters shared by current and sample requests.
#[derive(Debug, Clone, Default)]
pub struct QueryScope {
    pub device: Option<String>,
    pub path: Option<String>,
}

pub struct RequestDispatcher {
    agent: Arc<Agent>,
}

impl RequestDispatcher {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    /// Render a failure as an MTConnectError document.
    pub fn error_response(&self, error: &RequestError, format: DocFormat, pretty: bool) -> Response {
        let printer = self.agent.printer(format.json());
        let body = printer.print_error(
            &self.agent.header_info(),
            error.code.as_str(),
            &error.message,
            pretty,
        );
        Response {
            status: error.status(),
            body,
            mime: printer.mime_type(),
        }
    }

    // ------------------------------------------------------------------
    // Probe
    // ------------------------------------------------------------------

    pub fn probe(
        &self,
        device: Option<&str>,
        format: DocFormat,
        pretty: bool,
    ) -> Result<Response, RequestError> {
        let devices = self.scope_devices(device)?;
        let printer = self.agent.printer(format.json());
        let body = printer.print_probe(
            &self.agent.header_info(),
            &devices,
            &self.agent.asset_counts_by_type(),
            pretty,
        );
        Ok(Response::ok(body, printer.mime_type()))
    }

    // ------------------------------------------------------------------
    // Current
    // ------------------------------------------------------------------

    pub fn current(
        &self,
        scope: &QueryScope,
        at: Option<u64>,
        format: DocFormat,
        pretty: bool,
    ) -> Result<Response, RequestError> {
        let devices = self.scope_devices(scope.device.as_deref())?;
        let filter = self.scope_filter(&devices, scope)?;

        if let Some(at) = at {
            let (first, next) = self.sequence_bounds();
            if at < first || at >= next {
                return Err(RequestError::out_of_range("at", at, first, next - 1));
            }
        }

        let checkpoint = self
            .agent
            .current(at, filter.as_ref())
            .ok_or_else(|| RequestError::new(ErrorCode::OutOfRange, "at is no longer resident"))?;
        let observations = checkpoint.observations(None);

        let printer = self.agent.printer(format.json());
        let body = printer.print_sample(
            &self.agent.header_info(),
            &devices,
            &observations,
            pretty,
        );
        Ok(Response::ok(body, printer.mime_type()))
    }

    // ------------------------------------------------------------------
    // Sample
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn sample(
        &self,
        scope: &QueryScope,
        from: Option<u64>,
        to: Option<u64>,
        count: Option<usize>,
        format: DocFormat,
        pretty: bool,
    ) -> Result<Response, RequestError> {
        let devices = self.scope_devices(scope.device.as_deref())?;
        let filter = self.scope_filter(&devices, scope)?;
        let count = self.check_count(count)?;
        self.check_from(from)?;
        if let (Some(from), Some(to)) = (from, to) {
            if to <= from {
                return Err(RequestError::new(
                    ErrorCode::InvalidParameterValue,
                    format!("'to' must be greater than 'from': {} <= {}", to, from),
                ));
            }
        }

        let window = self.agent.sample(count, filter.as_ref(), from, to);
        let mut header = self.agent.header_info();
        header.first_sequence = window.first_sequence;
        header.next_sequence = window.end_sequence;

        let printer = self.agent.printer(format.json());
        let body = printer.print_sample(&header, &devices, &window.observations, pretty);
        Ok(Response::ok(body, printer.mime_type()))
    }

    // ------------------------------------------------------------------
    // Streaming
    // ------------------------------------------------------------------

    /// Long-lived sample stream honoring interval/heartbeat/count.
    #[allow(clippy::too_many_arguments)]
    pub fn stream_sample(
        &self,
        scope: &QueryScope,
        from: Option<u64>,
        interval_ms: u64,
        heartbeat_ms: Option<u64>,
        count: Option<usize>,
        format: DocFormat,
        pretty: bool,
    ) -> Result<(mpsc::Receiver<SessionFrame>, SessionHandle), RequestError> {
        let devices = self.scope_devices(scope.device.as_deref())?;
        let filter = self
            .scope_filter(&devices, scope)?
            .unwrap_or_else(|| all_items(&devices));
        let count = self.check_count(count)?;
        self.check_from(from)?;
        let heartbeat = heartbeat_ms.unwrap_or(self.agent.config().heartbeat.as_millis() as u64);
        if heartbeat == 0 {
            return Err(RequestError::out_of_range("heartbeat", 0, 1, u32::MAX));
        }

        let observer = self.attach_observer(&filter);
        let params = SessionParams {
            filter,
            from,
            interval: Duration::from_millis(interval_ms),
            heartbeat: Duration::from_millis(heartbeat),
            count,
        };
        let formatter = Arc::new(StreamFormatter {
            agent: Arc::clone(&self.agent),
            devices,
            json: format.json(),
            pretty,
        });
        let session = StreamSession::new(
            Arc::clone(self.agent.buffer()),
            observer,
            params,
            formatter,
        );
        Ok(session.spawn())
    }

    /// Periodic current snapshots every `interval`.
    pub fn stream_current(
        &self,
        scope: &QueryScope,
        interval_ms: u64,
        format: DocFormat,
        pretty: bool,
    ) -> Result<(mpsc::Receiver<SessionFrame>, SessionHandle), RequestError> {
        let devices = self.scope_devices(scope.device.as_deref())?;
        let filter = self.scope_filter(&devices, scope)?;

        let (tx, rx) = mpsc::channel(4);
        let handle = SessionHandle::new();
        let task_handle = handle.clone();
        let agent = Arc::clone(&self.agent);
        let json = format.json();
        let interval = Duration::from_millis(interval_ms.max(1));

        tokio::spawn(async move {
            loop {
                if task_handle.is_cancelled() {
                    break;
                }
                let Some(checkpoint) = agent.current(None, filter.as_ref()) else {
                    break;
                };
                let observations = checkpoint.observations(None);
                let printer = agent.printer(json);
                let doc =
                    printer.print_sample(&agent.header_info(), &devices, &observations, pretty);
                if tx.send(SessionFrame::Document(doc)).await.is_err() {
                    break;
                }
                tokio::select! {
                    _ = task_handle.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        Ok((rx, handle))
    }

    // ------------------------------------------------------------------
    // Assets
    // ------------------------------------------------------------------

    pub fn assets(
        &self,
        ids: Option<&[String]>,
        asset_type: Option<&str>,
        device: Option<&str>,
        removed: bool,
        count: Option<usize>,
        format: DocFormat,
        pretty: bool,
    ) -> Result<Response, RequestError> {
        let assets: Vec<AssetPtr> = match ids {
            Some(ids) => {
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    let asset = self.agent.asset(id).ok_or_else(|| {
                        RequestError::new(
                            ErrorCode::AssetNotFound,
                            format!("Cannot find asset: {}", id),
                        )
                    })?;
                    out.push(asset);
                }
                out
            }
            None => {
                let device_uuid = match device {
                    Some(d) => Some(
                        self.agent
                            .device(d)
                            .ok_or_else(|| RequestError::no_device(d))?
                            .uuid()
                            .to_string(),
                    ),
                    None => None,
                };
                self.agent.assets(
                    count.unwrap_or(usize::MAX),
                    removed,
                    device_uuid.as_deref(),
                    asset_type,
                )
            }
        };

        let printer = self.agent.printer(format.json());
        let body = printer.print_assets(&self.agent.header_info(), &assets, pretty);
        Ok(Response::ok(body, printer.mime_type()))
    }

    /// Create or replace an asset (AllowPut-gated by the transport).
    pub fn put_asset(
        &self,
        body: &str,
        device: Option<&str>,
        format: DocFormat,
        pretty: bool,
    ) -> Result<Response, RequestError> {
        let (asset, errors) = Asset::parse_xml(body).map_err(|e| {
            RequestError::new(ErrorCode::InvalidRequest, format!("Could not parse Asset: {}", e))
        })?;
        for e in &errors {
            log::warn!("[dispatcher] asset parsed with errors: {}", e);
        }

        let asset = match device {
            Some(d) => {
                let device = self
                    .agent
                    .device(d)
                    .ok_or_else(|| RequestError::no_device(d))?;
                asset.with_device(device.uuid())
            }
            None => asset,
        };

        let asset_id = asset.asset_id().to_string();
        self.agent.receive_asset(asset);
        let stored = self
            .agent
            .asset(&asset_id)
            .ok_or_else(|| RequestError::new(ErrorCode::InternalError, "asset did not persist"))?;

        let printer = self.agent.printer(format.json());
        let body = printer.print_assets(&self.agent.header_info(), &[stored], pretty);
        Ok(Response::ok(body, printer.mime_type()))
    }

    pub fn delete_asset(
        &self,
        ids: &[String],
        format: DocFormat,
        pretty: bool,
    ) -> Result<Response, RequestError> {
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            let asset = self.agent.remove_asset(id).map_err(|_| {
                RequestError::new(ErrorCode::AssetNotFound, format!("Cannot find asset: {}", id))
            })?;
            removed.push(asset);
        }
        let printer = self.agent.printer(format.json());
        let body = printer.print_assets(&self.agent.header_info(), &removed, pretty);
        Ok(Response::ok(body, printer.mime_type()))
    }

    /// Bulk removal answers with a JSON tally, like the cancel verb; the
    /// requested document format does not apply.
    pub fn delete_all_assets(
        &self,
        device: Option<&str>,
        asset_type: Option<&str>,
        _format: DocFormat,
        pretty: bool,
    ) -> Result<Response, RequestError> {
        let device_uuid = match device {
            Some(d) => Some(
                self.agent
                    .device(d)
                    .ok_or_else(|| RequestError::no_device(d))?
                    .uuid()
                    .to_string(),
            ),
            None => None,
        };
        let count = self
            .agent
            .remove_all_assets(device_uuid.as_deref(), asset_type);
        let doc = serde_json::json!({ "assetsRemoved": count });
        let body = if pretty {
            serde_json::to_string_pretty(&doc)
        } else {
            serde_json::to_string(&doc)
        }
        .unwrap_or_default();
        Ok(Response::ok(body, "application/json"))
    }

    // ------------------------------------------------------------------
    // Observation PUT (loopback)
    // ------------------------------------------------------------------

    pub fn put_observation(
        &self,
        device: &str,
        values: &[(String, String)],
        format: DocFormat,
        pretty: bool,
    ) -> Result<Response, RequestError> {
        let device = self
            .agent
            .device(device)
            .ok_or_else(|| RequestError::no_device(device))?;

        for (key, value) in values {
            let item = device.data_item(key).ok_or_else(|| {
                RequestError::new(
                    ErrorCode::InvalidParameterValue,
                    format!("Could not find data item: {}", key),
                )
            })?;
            self.agent.observe_value(&item, value).map_err(|e| {
                RequestError::new(ErrorCode::InvalidRequest, e.to_string())
            })?;
        }

        let printer = self.agent.printer(format.json());
        Ok(Response::ok("<success/>".into(), printer.mime_type()))
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn scope_devices(&self, device: Option<&str>) -> Result<Vec<DevicePtr>, RequestError> {
        match device {
            Some(name) => {
                let device = self
                    .agent
                    .device(name)
                    .ok_or_else(|| RequestError::no_device(name))?;
                Ok(vec![device])
            }
            None => Ok(self.agent.devices()),
        }
    }

    /// Resolve the filter set for a request scope: a path narrows, a bare
    /// device scopes to its items, neither means unfiltered.
    fn scope_filter(
        &self,
        devices: &[DevicePtr],
        scope: &QueryScope,
    ) -> Result<Option<FilterSet>, RequestError> {
        if let Some(path) = &scope.path {
            return resolve_path(devices, path).map(Some);
        }
        if scope.device.is_some() {
            return Ok(Some(all_items(devices)));
        }
        Ok(None)
    }

    fn sequence_bounds(&self) -> (u64, u64) {
        let buffer = self.agent.buffer().lock();
        (buffer.first_sequence(), buffer.sequence())
    }

    fn check_count(&self, count: Option<usize>) -> Result<usize, RequestError> {
        let buffer_size = self.agent.buffer().lock().buffer_size();
        let count = count.unwrap_or(self.agent.config().sample_count);
        if count == 0 || count > buffer_size {
            return Err(RequestError::out_of_range("count", count, 1, buffer_size));
        }
        Ok(count)
    }

    fn check_from(&self, from: Option<u64>) -> Result<(), RequestError> {
        let Some(from) = from else {
            return Ok(());
        };
        let (first, next) = self.sequence_bounds();
        // A stale `from` restarts at the tail (session policy); anything
        // past the next sequence is unservable.
        if from > next {
            return Err(RequestError::out_of_range("from", from, first, next));
        }
        Ok(())
    }

    fn attach_observer(&self, filter: &FilterSet) -> Arc<ChangeObserver> {
        let observer = ChangeObserver::new();
        for id in filter {
            if let Some(item) = self.agent.data_item_by_id(id) {
                item.signaler().add_observer(&observer);
            }
        }
        observer
    }
}

/// Formats sample chunks for streaming sessions.
struct StreamFormatter {
    agent: Arc<Agent>,
    devices: Vec<DevicePtr>,
    json: bool,
    pretty: bool,
}

impl ChunkFormatter for StreamFormatter {
    fn format(&self, observations: &[ObservationPtr], info: &ChunkInfo) -> String {
        let mut header: HeaderInfo = self.agent.header_info();
        header.first_sequence = info.first_sequence;
        header.next_sequence = info.next_sequence;
        header.last_sequence = info.last_sequence;
        self.agent
            .printer(self.json)
            .print_sample(&header, &self.devices, observations, self.pretty)
    }
}

fn all_items(devices: &[DevicePtr]) -> FilterSet {
    devices
        .iter()
        .flat_map(|d| d.data_items())
        .map(|i| i.id().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::pipeline::tests_support::TEST_DEVICE_XML;

    fn dispatcher() -> RequestDispatcher {
        let agent = Agent::new(AgentConfig::default());
        agent.load_devices(TEST_DEVICE_XML).expect("devices load");
        RequestDispatcher::new(agent)
    }

    fn observe(dispatcher: &RequestDispatcher, id: &str, value: &str) -> u64 {
        let item = dispatcher.agent().data_item_by_id(id).expect("item exists");
        dispatcher
            .agent()
            .observe_value(&item, value)
            .expect("valid value")
            .expect("admitted")
    }

    #[test]
    fn test_probe_contains_device() {
        let d = dispatcher();
        let response = d.probe(None, DocFormat::Xml, false).expect("probe");
        assert_eq!(response.status, 200);
        assert_eq!(response.mime, "text/xml");
        assert!(response.body.contains("<Device id=\"d1\" name=\"LinuxCNC\" uuid=\"000\">"));
        assert!(response.body.contains("<Controller id=\"cont\""));
    }

    #[test]
    fn test_probe_reports_asset_counts() {
        let d = dispatcher();
        d.put_asset(r#"<Part assetId="P1"/>"#, None, DocFormat::Xml, false)
            .expect("asset accepted");
        d.put_asset(r#"<Part assetId="P2"/>"#, None, DocFormat::Xml, false)
            .expect("asset accepted");

        let response = d.probe(None, DocFormat::Xml, false).expect("probe");
        assert!(response
            .body
            .contains("<AssetCounts><AssetCount assetType=\"Part\">2</AssetCount></AssetCounts>"));

        let response = d.probe(None, DocFormat::Json, false).expect("probe");
        let json: serde_json::Value =
            serde_json::from_str(&response.body).expect("valid JSON");
        assert_eq!(json["MTConnectDevices"]["Header"]["assetCounts"]["Part"], 2);
    }

    #[test]
    fn test_probe_pretty_is_indented() {
        let d = dispatcher();
        let response = d.probe(None, DocFormat::Xml, true).expect("probe");
        assert!(response.body.contains("\n  <Header "));
        assert!(response.body.contains("\n  <Devices>\n    "));

        let compact = d.probe(None, DocFormat::Xml, false).expect("probe");
        assert!(!compact.body.contains("\n  <Header "));
    }

    #[test]
    fn test_probe_unknown_device_404() {
        let d = dispatcher();
        let err = d
            .probe(Some("Nope"), DocFormat::Xml, false)
            .expect_err("unknown device");
        assert_eq!(err.code, ErrorCode::NoDevice);
        let response = d.error_response(&err, DocFormat::Xml, false);
        assert_eq!(response.status, 404);
        assert!(response.body.contains("errorCode=\"NO_DEVICE\""));
    }

    #[test]
    fn test_current_reflects_updates() {
        let d = dispatcher();
        observe(&d, "avail", "AVAILABLE");
        observe(&d, "mode", "MANUAL");

        let response = d
            .current(&QueryScope::default(), None, DocFormat::Xml, false)
            .expect("current");
        assert!(response.body.contains(">AVAILABLE</Availability>"));
        assert!(response.body.contains(">MANUAL</ControllerMode>"));
        assert!(response.body.contains(">UNAVAILABLE</Execution>"));
    }

    #[test]
    fn test_current_at_validates_range() {
        let d = dispatcher();
        let err = d
            .current(&QueryScope::default(), Some(99_999), DocFormat::Xml, false)
            .expect_err("at outside window");
        assert_eq!(err.code, ErrorCode::OutOfRange);
    }

    #[test]
    fn test_sample_window_from_sequence() {
        let d = dispatcher();
        observe(&d, "avail", "AVAILABLE");
        observe(&d, "mode", "MANUAL");
        let s = observe(&d, "mode", "AUTOMATIC");
        observe(&d, "exec", "READY");
        observe(&d, "exec", "ACTIVE");
        observe(&d, "exec", "READY");

        let response = d
            .sample(
                &QueryScope::default(),
                Some(s),
                None,
                Some(100),
                DocFormat::Xml,
                false,
            )
            .expect("sample");

        // Exactly the observations from S onward, in order.
        let body = &response.body;
        let auto = body.find(">AUTOMATIC<").expect("automatic present");
        let ready1 = body.find(">READY<").expect("ready present");
        let active = body.find(">ACTIVE<").expect("active present");
        assert!(auto < ready1 && ready1 < active);
        assert!(!body.contains(">MANUAL<"));
    }

    #[test]
    fn test_sample_count_out_of_range() {
        let d = dispatcher();
        let err = d
            .sample(
                &QueryScope::default(),
                None,
                None,
                Some(0),
                DocFormat::Xml,
                false,
            )
            .expect_err("count 0 invalid");
        assert_eq!(err.code, ErrorCode::OutOfRange);
    }

    #[test]
    fn test_path_filter_scopes_sample() {
        let d = dispatcher();
        observe(&d, "avail", "AVAILABLE");
        observe(&d, "exec", "ACTIVE");

        let scope = QueryScope {
            device: None,
            path: Some("//DataItem[@type=\"EXECUTION\"]".into()),
        };
        let response = d
            .sample(&scope, Some(1), None, Some(100), DocFormat::Xml, false)
            .expect("sample");
        assert!(response.body.contains(">ACTIVE</Execution>"));
        assert!(!response.body.contains("Availability"));
    }

    #[test]
    fn test_invalid_path_rejected() {
        let d = dispatcher();
        let scope = QueryScope {
            device: None,
            path: Some("//Device[@name=".into()),
        };
        let err = d
            .current(&scope, None, DocFormat::Xml, false)
            .expect_err("bad path");
        assert_eq!(err.code, ErrorCode::InvalidXPath);
    }

    #[test]
    fn test_asset_put_get_delete() {
        let d = dispatcher();
        let body = r#"<Part assetId="P1"/>"#;
        let response = d
            .put_asset(body, Some("LinuxCNC"), DocFormat::Xml, false)
            .expect("asset accepted");
        assert!(response.body.contains("assetId=\"P1\""));
        assert!(response.body.contains("deviceUuid=\"000\""));

        let response = d
            .assets(
                Some(&["P1".to_string()]),
                None,
                None,
                false,
                None,
                DocFormat::Xml,
                false,
            )
            .expect("asset by id");
        assert!(response.body.contains("assetId=\"P1\""));

        let response = d
            .delete_asset(&["P1".to_string()], DocFormat::Xml, false)
            .expect("asset removed");
        assert!(response.body.contains("removed=\"true\""));

        let err = d
            .assets(
                Some(&["missing".to_string()]),
                None,
                None,
                false,
                None,
                DocFormat::Xml,
                false,
            )
            .expect_err("unknown asset");
        assert_eq!(err.code, ErrorCode::AssetNotFound);
    }

    #[test]
    fn test_put_observation_loopback() {
        let d = dispatcher();
        d.put_observation(
            "LinuxCNC",
            &[("exec".to_string(), "ACTIVE".to_string())],
            DocFormat::Xml,
            false,
        )
        .expect("observation accepted");

        let response = d
            .current(&QueryScope::default(), None, DocFormat::Xml, false)
            .expect("current");
        assert!(response.body.contains(">ACTIVE</Execution>"));

        let err = d
            .put_observation(
                "LinuxCNC",
                &[("nope".to_string(), "1".to_string())],
                DocFormat::Xml,
                false,
            )
            .expect_err("unknown item");
        assert_eq!(err.code, ErrorCode::InvalidParameterValue);
    }

    #[test]
    fn test_format_resolution() {
        assert_eq!(
            DocFormat::resolve(Some("json"), None).expect("format"),
            DocFormat::Json
        );
        assert_eq!(
            DocFormat::resolve(None, Some("application/json")).expect("accepts"),
            DocFormat::Json
        );
        assert_eq!(
            DocFormat::resolve(None, Some("text/xml")).expect("accepts"),
            DocFormat::Xml
        );
        let err = DocFormat::resolve(None, Some("image/png")).expect_err("unacceptable");
        assert_eq!(err.code, ErrorCode::Unsupported);
        assert_eq!(err.status(), 406);
    }

    #[tokio::test]
    async fn test_stream_sample_emits_document_frames() {
        let d = dispatcher();
        let start = { d.agent().buffer().lock().sequence() };

        let scope = QueryScope {
            device: Some("LinuxCNC".into()),
            path: None,
        };
        let (mut rx, handle) = d
            .stream_sample(&scope, Some(start), 0, Some(10_000), Some(100), DocFormat::Xml, false)
            .expect("stream starts");

        observe(&d, "exec", "ACTIVE");
        let frame = rx.recv().await.expect("frame");
        match frame {
            SessionFrame::Document(doc) => {
                assert!(doc.contains(">ACTIVE</Execution>"));
                assert!(doc.contains("MTConnectStreams"));
            }
            other => panic!("expected document frame, got {:?}", other),
        }
        handle.cancel();
    }
}
