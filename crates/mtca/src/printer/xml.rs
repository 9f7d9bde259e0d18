// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! XML document printer.
//!
//! Compact by default; `pretty` switches every document kind to two-space
//! indentation, one element per line. Probe documents carry the per-type
//! `AssetCounts` breakdown next to the header.

use std::collections::HashMap;
use std::fmt::Write;

use crate::asset::AssetPtr;
use crate::device_model::{Component, DevicePtr, Representation};
use crate::entity::{escape_xml, XmlEntityPrinter};
use crate::observation::ObservationPtr;

use super::{group_observations, HeaderInfo, Printer};

const DEVICES_NS: &str = "urn:mtconnect.org:MTConnectDevices";
const STREAMS_NS: &str = "urn:mtconnect.org:MTConnectStreams";
const ASSETS_NS: &str = "urn:mtconnect.org:MTConnectAssets";
const ERROR_NS: &str = "urn:mtconnect.org:MTConnectError";

fn indent(out: &mut String, depth: usize, pretty: bool) {
    if pretty {
        for _ in 0..depth {
            out.push_str("  ");
        }
    }
}

fn newline(out: &mut String, pretty: bool) {
    if pretty {
        out.push('\n');
    }
}

pub struct XmlPrinter;

impl XmlPrinter {
    pub fn new() -> Self {
        Self
    }

    fn open_document(&self, out: &mut String, root: &str, ns: &str, header: &HeaderInfo, pretty: bool) {
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let _ = write!(
            out,
            "<{root} xmlns=\"{ns}:{v}\">",
            root = root,
            ns = ns,
            v = header.version
        );
        newline(out, pretty);
    }

    fn close_document(&self, out: &mut String, root: &str) {
        let _ = write!(out, "</{}>", root);
    }

    fn print_header(&self, out: &mut String, header: &HeaderInfo, kind: DocumentKind, pretty: bool) {
        indent(out, 1, pretty);
        let _ = write!(
            out,
            "<Header creationTime=\"{}\" sender=\"{}\" instanceId=\"{}\" version=\"{}\"",
            HeaderInfo::creation_time(),
            escape_xml(&header.sender),
            header.instance_id,
            header.version
        );
        match kind {
            DocumentKind::Devices => {
                let _ = write!(
                    out,
                    " bufferSize=\"{}\" assetBufferSize=\"{}\" assetCount=\"{}\"",
                    header.buffer_size, header.asset_buffer_size, header.asset_count
                );
            }
            DocumentKind::Streams => {
                let _ = write!(
                    out,
                    " bufferSize=\"{}\" nextSequence=\"{}\" firstSequence=\"{}\" lastSequence=\"{}\"",
                    header.buffer_size,
                    header.next_sequence,
                    header.first_sequence,
                    header.last_sequence
                );
            }
            DocumentKind::Assets => {
                let _ = write!(
                    out,
                    " assetBufferSize=\"{}\" assetCount=\"{}\"",
                    header.asset_buffer_size, header.asset_count
                );
            }
            DocumentKind::Error => {
                let _ = write!(out, " bufferSize=\"{}\"", header.buffer_size);
            }
        }
        out.push_str("/>");
        newline(out, pretty);
    }

    /// Per-type asset tally, sorted for stable output. Probe documents only.
    fn print_asset_counts(&self, out: &mut String, counts: &HashMap<String, usize>, pretty: bool) {
        if counts.is_empty() {
            return;
        }
        let mut types: Vec<(&String, &usize)> = counts.iter().collect();
        types.sort_by(|a, b| a.0.cmp(b.0));

        indent(out, 1, pretty);
        out.push_str("<AssetCounts>");
        newline(out, pretty);
        for (asset_type, count) in types {
            indent(out, 2, pretty);
            let _ = write!(
                out,
                "<AssetCount assetType=\"{}\">{}</AssetCount>",
                escape_xml(asset_type),
                count
            );
            newline(out, pretty);
        }
        indent(out, 1, pretty);
        out.push_str("</AssetCounts>");
        newline(out, pretty);
    }

    fn print_component(&self, out: &mut String, component: &Component, depth: usize, pretty: bool) {
        indent(out, depth, pretty);
        let _ = write!(out, "<{} id=\"{}\"", component.element(), component.id());
        if let Some(name) = component.name() {
            let _ = write!(out, " name=\"{}\"", escape_xml(name));
        }
        if let Some(uuid) = component.uuid() {
            let _ = write!(out, " uuid=\"{}\"", escape_xml(uuid));
        }
        out.push('>');
        newline(out, pretty);

        if let Some((attrs, body)) = component.description() {
            indent(out, depth + 1, pretty);
            out.push_str("<Description");
            for (key, value) in attrs.iter() {
                let _ = write!(out, " {}=\"{}\"", key, escape_xml(&value.to_text()));
            }
            match body {
                Some(text) => {
                    let _ = write!(out, ">{}</Description>", escape_xml(text));
                }
                None => out.push_str("/>"),
            }
            newline(out, pretty);
        }

        if !component.data_items().is_empty() {
            indent(out, depth + 1, pretty);
            out.push_str("<DataItems>");
            newline(out, pretty);
            for item in component.data_items() {
                indent(out, depth + 2, pretty);
                let _ = write!(
                    out,
                    "<DataItem id=\"{}\" type=\"{}\" category=\"{}\"",
                    item.id(),
                    item.type_name(),
                    match item.category() {
                        crate::device_model::Category::Sample => "SAMPLE",
                        crate::device_model::Category::Event => "EVENT",
                        crate::device_model::Category::Condition => "CONDITION",
                    }
                );
                if let Some(name) = item.name() {
                    let _ = write!(out, " name=\"{}\"", escape_xml(name));
                }
                if let Some(sub_type) = item.sub_type() {
                    let _ = write!(out, " subType=\"{}\"", escape_xml(sub_type));
                }
                if let Some(units) = item.units() {
                    let _ = write!(out, " units=\"{}\"", escape_xml(units));
                }
                if let Some(native) = item.native_units() {
                    let _ = write!(out, " nativeUnits=\"{}\"", escape_xml(native));
                }
                if item.representation() != Representation::Value {
                    let _ = write!(
                        out,
                        " representation=\"{}\"",
                        match item.representation() {
                            Representation::Value => "VALUE",
                            Representation::DataSet => "DATA_SET",
                            Representation::Table => "TABLE",
                            Representation::TimeSeries => "TIME_SERIES",
                            Representation::Discrete => "DISCRETE",
                        }
                    );
                }
                if let Some(statistic) = item.statistic() {
                    let _ = write!(out, " statistic=\"{}\"", escape_xml(statistic));
                }
                out.push_str("/>");
                newline(out, pretty);
            }
            indent(out, depth + 1, pretty);
            out.push_str("</DataItems>");
            newline(out, pretty);
        }

        if !component.children().is_empty() {
            indent(out, depth + 1, pretty);
            out.push_str("<Components>");
            newline(out, pretty);
            for child in component.children() {
                self.print_component(out, child, depth + 2, pretty);
            }
            indent(out, depth + 1, pretty);
            out.push_str("</Components>");
            newline(out, pretty);
        }

        indent(out, depth, pretty);
        let _ = write!(out, "</{}>", component.element());
        newline(out, pretty);
    }

    fn print_category(
        &self,
        out: &mut String,
        entity_printer: &XmlEntityPrinter,
        tag: &str,
        observations: &[&ObservationPtr],
        pretty: bool,
    ) {
        indent(out, 4, pretty);
        let _ = write!(out, "<{}>", tag);
        newline(out, pretty);
        for obs in observations {
            entity_printer.print_into(out, &obs.to_entity(), 5);
        }
        indent(out, 4, pretty);
        let _ = write!(out, "</{}>", tag);
        newline(out, pretty);
    }
}

enum DocumentKind {
    Devices,
    Streams,
    Assets,
    Error,
}

impl Default for XmlPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Printer for XmlPrinter {
    fn mime_type(&self) -> &'static str {
        "text/xml"
    }

    fn print_probe(
        &self,
        header: &HeaderInfo,
        devices: &[DevicePtr],
        counts_by_type: &HashMap<String, usize>,
        pretty: bool,
    ) -> String {
        let mut out = String::new();
        self.open_document(&mut out, "MTConnectDevices", DEVICES_NS, header, pretty);
        self.print_header(&mut out, header, DocumentKind::Devices, pretty);
        self.print_asset_counts(&mut out, counts_by_type, pretty);
        indent(&mut out, 1, pretty);
        out.push_str("<Devices>");
        newline(&mut out, pretty);
        for device in devices {
            self.print_component(&mut out, device.root(), 2, pretty);
        }
        indent(&mut out, 1, pretty);
        out.push_str("</Devices>");
        newline(&mut out, pretty);
        self.close_document(&mut out, "MTConnectDevices");
        out
    }

    fn print_sample(
        &self,
        header: &HeaderInfo,
        devices: &[DevicePtr],
        observations: &[ObservationPtr],
        pretty: bool,
    ) -> String {
        let entity_printer = XmlEntityPrinter::new(pretty);
        let mut out = String::new();
        self.open_document(&mut out, "MTConnectStreams", STREAMS_NS, header, pretty);
        self.print_header(&mut out, header, DocumentKind::Streams, pretty);
        indent(&mut out, 1, pretty);
        out.push_str("<Streams>");
        newline(&mut out, pretty);

        for group in group_observations(devices, observations) {
            indent(&mut out, 2, pretty);
            let _ = write!(
                out,
                "<DeviceStream name=\"{}\" uuid=\"{}\">",
                escape_xml(group.device.name()),
                escape_xml(group.device.uuid())
            );
            newline(&mut out, pretty);
            for bucket in &group.components {
                if bucket.is_empty() {
                    continue;
                }
                indent(&mut out, 3, pretty);
                let _ = write!(
                    out,
                    "<ComponentStream component=\"{}\" componentId=\"{}\"",
                    bucket.component.element(),
                    bucket.component.id()
                );
                if let Some(name) = bucket.component.name() {
                    let _ = write!(out, " name=\"{}\"", escape_xml(name));
                }
                out.push('>');
                newline(&mut out, pretty);

                if !bucket.samples.is_empty() {
                    self.print_category(&mut out, &entity_printer, "Samples", &bucket.samples, pretty);
                }
                if !bucket.events.is_empty() {
                    self.print_category(&mut out, &entity_printer, "Events", &bucket.events, pretty);
                }
                if !bucket.conditions.is_empty() {
                    self.print_category(
                        &mut out,
                        &entity_printer,
                        "Condition",
                        &bucket.conditions,
                        pretty,
                    );
                }
                indent(&mut out, 3, pretty);
                out.push_str("</ComponentStream>");
                newline(&mut out, pretty);
            }
            indent(&mut out, 2, pretty);
            out.push_str("</DeviceStream>");
            newline(&mut out, pretty);
        }

        indent(&mut out, 1, pretty);
        out.push_str("</Streams>");
        newline(&mut out, pretty);
        self.close_document(&mut out, "MTConnectStreams");
        out
    }

    fn print_assets(&self, header: &HeaderInfo, assets: &[AssetPtr], pretty: bool) -> String {
        let entity_printer = XmlEntityPrinter::new(pretty);
        let mut out = String::new();
        self.open_document(&mut out, "MTConnectAssets", ASSETS_NS, header, pretty);
        self.print_header(&mut out, header, DocumentKind::Assets, pretty);
        indent(&mut out, 1, pretty);
        out.push_str("<Assets>");
        newline(&mut out, pretty);
        for asset in assets {
            entity_printer.print_into(&mut out, asset.entity(), 2);
        }
        indent(&mut out, 1, pretty);
        out.push_str("</Assets>");
        newline(&mut out, pretty);
        self.close_document(&mut out, "MTConnectAssets");
        out
    }

    fn print_error(&self, header: &HeaderInfo, code: &str, message: &str, pretty: bool) -> String {
        let mut out = String::new();
        self.open_document(&mut out, "MTConnectError", ERROR_NS, header, pretty);
        self.print_header(&mut out, header, DocumentKind::Error, pretty);
        indent(&mut out, 1, pretty);
        out.push_str("<Errors>");
        newline(&mut out, pretty);
        indent(&mut out, 2, pretty);
        let _ = write!(
            out,
            "<Error errorCode=\"{}\">{}</Error>",
            escape_xml(code),
            escape_xml(message)
        );
        newline(&mut out, pretty);
        indent(&mut out, 1, pretty);
        out.push_str("</Errors>");
        newline(&mut out, pretty);
        self.close_document(&mut out, "MTConnectError");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests_support::*;
    use super::*;

    #[test]
    fn test_probe_document_structure() {
        let devices = test_devices();
        let doc = XmlPrinter::new().print_probe(&header(), &devices, &HashMap::new(), false);

        assert!(doc.contains("<MTConnectDevices xmlns=\"urn:mtconnect.org:MTConnectDevices:2.3\">"));
        assert!(doc.contains("<Device id=\"d1\" name=\"LinuxCNC\" uuid=\"000\">"));
        assert!(doc.contains("<Controller id=\"cont\" name=\"controller\">"));
        assert!(doc.contains("<DataItem id=\"exec\" type=\"EXECUTION\" category=\"EVENT\"/>"));
        assert!(doc.contains("assetBufferSize=\"1024\""));
        // No assets, no counts block.
        assert!(!doc.contains("<AssetCounts>"));
    }

    #[test]
    fn test_probe_asset_counts_sorted() {
        let devices = test_devices();
        let counts = HashMap::from([
            ("Part".to_string(), 2usize),
            ("CuttingTool".to_string(), 1usize),
        ]);
        let doc = XmlPrinter::new().print_probe(&header(), &devices, &counts, false);
        assert!(doc.contains(
            "<AssetCounts>\
             <AssetCount assetType=\"CuttingTool\">1</AssetCount>\
             <AssetCount assetType=\"Part\">2</AssetCount>\
             </AssetCounts>"
        ));
    }

    #[test]
    fn test_sample_document_structure() {
        let devices = test_devices();
        let observations = vec![
            observation(&devices, "exec", "ACTIVE", 5),
            observation(&devices, "pos", "10.5", 6),
        ];
        let doc = XmlPrinter::new().print_sample(&header(), &devices, &observations, false);

        assert!(doc.contains("<MTConnectStreams"));
        assert!(doc.contains("nextSequence=\"7\" firstSequence=\"1\" lastSequence=\"6\""));
        assert!(doc.contains("<DeviceStream name=\"LinuxCNC\" uuid=\"000\">"));
        assert!(doc.contains(
            "<ComponentStream component=\"Controller\" componentId=\"cont\" name=\"controller\">"
        ));
        assert!(doc.contains("<Events><Execution dataItemId=\"exec\""));
        assert!(doc.contains("sequence=\"5\">ACTIVE</Execution>"));
        assert!(doc.contains("<Samples><Position dataItemId=\"pos\""));
    }

    #[test]
    fn test_condition_prints_level_element() {
        let devices = test_devices();
        let observations = vec![observation(&devices, "cond", "WARNING", 3)];
        let doc = XmlPrinter::new().print_sample(&header(), &devices, &observations, false);
        assert!(doc.contains("<Condition><Warning dataItemId=\"cond\""));
        assert!(doc.contains("type=\"LOAD\""));
    }

    #[test]
    fn test_error_document() {
        let doc = XmlPrinter::new().print_error(&header(), "NO_DEVICE", "Could not find device: X", false);
        assert!(doc.contains("<MTConnectError"));
        assert!(doc.contains("<Error errorCode=\"NO_DEVICE\">Could not find device: X</Error>"));
    }

    #[test]
    fn test_pretty_probe_indents() {
        let devices = test_devices();
        let doc = XmlPrinter::new().print_probe(&header(), &devices, &HashMap::new(), true);

        assert!(doc.contains("\n  <Header "));
        assert!(doc.contains("\n  <Devices>\n    <Device id=\"d1\""));
        assert!(doc.contains("\n      <DataItems>\n        <DataItem id=\"avail\""));
        assert!(doc.ends_with("</MTConnectDevices>"));
    }

    #[test]
    fn test_pretty_sample_indents() {
        let devices = test_devices();
        let observations = vec![observation(&devices, "exec", "ACTIVE", 5)];
        let doc = XmlPrinter::new().print_sample(&header(), &devices, &observations, true);

        assert!(doc.contains("\n  <Streams>\n    <DeviceStream name=\"LinuxCNC\""));
        assert!(doc.contains("\n        <Events>\n          <Execution dataItemId=\"exec\""));
        assert!(doc.contains("\n        </Events>"));
    }

    #[test]
    fn test_pretty_error_document() {
        let doc = XmlPrinter::new().print_error(&header(), "OUT_OF_RANGE", "bad from", true);
        assert!(doc.contains("\n  <Errors>\n    <Error errorCode=\"OUT_OF_RANGE\">bad from</Error>\n  </Errors>\n"));
    }
}
