// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! XPath-like `path` parameter resolution.
//!
//! Supports the subset clients actually send: `//` separated steps naming
//! components or data items, each with an optional `[@attr="value"]`
//! predicate, e.g. `//Device[@name="LinuxCNC"]//DataItem[@category="SAMPLE"]`
//! or `//Controller//*`. A path resolves to the filter set of matching
//! data-item ids.

use crate::buffer::FilterSet;
use crate::device_model::{Category, Component, DevicePtr};

use super::error::{ErrorCode, RequestError};

#[derive(Debug, Clone)]
struct Step {
    name: String,
    predicate: Option<(String, String)>,
}

/// Resolve a path expression over the given devices into a filter set.
pub fn resolve_path(devices: &[DevicePtr], path: &str) -> Result<FilterSet, RequestError> {
    let steps = parse_steps(path)?;
    let mut filter = FilterSet::new();

    for device in devices {
        collect(device.root(), &steps, &mut filter);
    }

    if filter.is_empty() {
        return Err(RequestError::new(
            ErrorCode::InvalidXPath,
            format!("The path could not be parsed. Invalid syntax: {}", path),
        ));
    }
    Ok(filter)
}

/// Every data item in the subtree.
fn collect_all(component: &Component, filter: &mut FilterSet) {
    component.walk(&mut |c| {
        for item in c.data_items() {
            filter.insert(item.id().to_string());
        }
    });
}

/// Try to match the remaining steps starting at `component`.
fn collect(component: &Component, steps: &[Step], filter: &mut FilterSet) {
    let Some(step) = steps.first() else {
        return;
    };
    let rest = &steps[1..];

    if step_matches_component(step, component) {
        if rest.is_empty() {
            collect_all(component, filter);
        } else {
            // Descendant axis: the next step may match anywhere below.
            for item in component.data_items() {
                collect_items(item, rest, filter);
            }
            for child in component.children() {
                collect(child, rest, filter);
                collect(child, steps, filter);
            }
        }
    } else {
        // Keep descending with the same step list.
        for item in component.data_items() {
            collect_items(item, steps, filter);
        }
        for child in component.children() {
            collect(child, steps, filter);
        }
    }
}

fn collect_items(
    item: &crate::device_model::DataItemPtr,
    steps: &[Step],
    filter: &mut FilterSet,
) {
    let [step] = steps else {
        return;
    };
    if step_matches_item(step, item) {
        filter.insert(item.id().to_string());
    }
}

fn step_matches_component(step: &Step, component: &Component) -> bool {
    if step.name != "*" && step.name != component.element() {
        return false;
    }
    match &step.predicate {
        None => true,
        Some((attr, value)) => match attr.as_str() {
            "id" => component.id() == value,
            "name" => component.name() == Some(value.as_str()),
            "uuid" => component.uuid() == Some(value.as_str()),
            _ => false,
        },
    }
}

fn step_matches_item(step: &Step, item: &crate::device_model::DataItemPtr) -> bool {
    if step.name != "*" && step.name != "DataItem" {
        return false;
    }
    match &step.predicate {
        None => true,
        Some((attr, value)) => match attr.as_str() {
            "id" => item.id() == value,
            "name" => item.name() == Some(value.as_str()),
            "type" => item.type_name() == value,
            "subType" => item.sub_type() == Some(value.as_str()),
            "category" => {
                let category = match item.category() {
                    Category::Sample => "SAMPLE",
                    Category::Event => "EVENT",
                    Category::Condition => "CONDITION",
                };
                category == value
            }
            _ => false,
        },
    }
}

fn parse_steps(path: &str) -> Result<Vec<Step>, RequestError> {
    let bad = |msg: String| RequestError::new(ErrorCode::InvalidXPath, msg);
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(bad("empty path".into()));
    }

    let mut steps = Vec::new();
    for raw in trimmed.split('/').filter(|s| !s.is_empty()) {
        let (name, predicate) = match raw.find('[') {
            None => (raw.to_string(), None),
            Some(open) => {
                if !raw.ends_with(']') {
                    return Err(bad(format!(
                        "The path could not be parsed. Invalid syntax: {}",
                        path
                    )));
                }
                let name = raw[..open].to_string();
                let body = &raw[open + 1..raw.len() - 1];
                let body = body.strip_prefix('@').ok_or_else(|| {
                    bad(format!("The path could not be parsed. Invalid syntax: {}", path))
                })?;
                let (attr, value) = body.split_once('=').ok_or_else(|| {
                    bad(format!("The path could not be parsed. Invalid syntax: {}", path))
                })?;
                let value = value
                    .trim()
                    .trim_matches('"')
                    .trim_matches('\'')
                    .to_string();
                (name, Some((attr.trim().to_string(), value)))
            }
        };

        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '*' || c == '_' || c == ':')
        {
            return Err(bad(format!(
                "The path could not be parsed. Invalid syntax: {}",
                path
            )));
        }
        steps.push(Step { name, predicate });
    }

    if steps.is_empty() {
        return Err(bad(format!(
            "The path could not be parsed. Invalid syntax: {}",
            path
        )));
    }
    Ok(steps)
}
