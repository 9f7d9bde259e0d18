// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Observation validation: controlled vocabulary for event values.
//!
//! Invalid observations are tagged `quality=INVALID` and passed through by
//! default; strict mode drops them instead. Valid ones are not tagged.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::entity::Value;
use crate::observation::ObservationKind;

use super::transform::{PipelineData, Transform};
use super::PipelineContext;

/// Controlled vocabularies by event type. A subset of the standard,
/// covering the types adapters most commonly get wrong.
fn vocabularies() -> &'static HashMap<&'static str, HashSet<&'static str>> {
    static VOCAB: OnceLock<HashMap<&'static str, HashSet<&'static str>>> = OnceLock::new();
    VOCAB.get_or_init(|| {
        HashMap::from([
            ("AVAILABILITY", HashSet::from(["AVAILABLE", "UNAVAILABLE"])),
            (
                "EXECUTION",
                HashSet::from([
                    "READY",
                    "ACTIVE",
                    "INTERRUPTED",
                    "WAIT",
                    "FEED_HOLD",
                    "STOPPED",
                    "OPTIONAL_STOP",
                    "PROGRAM_STOPPED",
                    "PROGRAM_COMPLETED",
                ]),
            ),
            (
                "CONTROLLER_MODE",
                HashSet::from(["AUTOMATIC", "MANUAL", "MANUAL_DATA_INPUT", "SEMI_AUTOMATIC", "EDIT"]),
            ),
            (
                "DOOR_STATE",
                HashSet::from(["OPEN", "CLOSED", "UNLATCHED"]),
            ),
            (
                "EMERGENCY_STOP",
                HashSet::from(["ARMED", "TRIGGERED"]),
            ),
            (
                "ROTARY_MODE",
                HashSet::from(["SPINDLE", "INDEX", "CONTOUR"]),
            ),
        ])
    })
}

pub struct Validator {
    /// Drop invalid observations instead of tagging them.
    strict: bool,
}

impl Validator {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }
}

impl Transform for Validator {
    fn name(&self) -> &str {
        "Validator"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::Observations(_))
    }

    fn apply(&self, data: PipelineData, _ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::Observations(observations) = data else {
            return None;
        };

        let mut kept = Vec::with_capacity(observations.len());
        for mut obs in observations {
            if obs.kind() != &ObservationKind::Event || obs.is_unavailable() {
                kept.push(obs);
                continue;
            }
            let Some(vocab) = vocabularies().get(obs.data_item().type_name()) else {
                kept.push(obs);
                continue;
            };
            let valid = matches!(obs.value(), Some(Value::String(s)) if vocab.contains(s.as_str()));
            if valid {
                kept.push(obs);
            } else if self.strict {
                log::warn!(
                    "[validator] dropping invalid {} value {:?}",
                    obs.data_item().type_name(),
                    obs.value_text()
                );
            } else {
                log::warn!(
                    "[validator] tagging invalid {} value {:?}",
                    obs.data_item().type_name(),
                    obs.value_text()
                );
                obs.set_quality("INVALID");
                kept.push(obs);
            }
        }

        if kept.is_empty() {
            return None;
        }
        Some(PipelineData::Observations(kept))
    }
}
