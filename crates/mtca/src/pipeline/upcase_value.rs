// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Upper-case normalization for string-typed event values.

use crate::entity::Value;
use crate::observation::ObservationKind;

use super::transform::{PipelineData, Transform};
use super::PipelineContext;

pub struct UpcaseValue;

impl UpcaseValue {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UpcaseValue {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for UpcaseValue {
    fn name(&self) -> &str {
        "UpcaseValue"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::Observations(_))
    }

    fn apply(&self, data: PipelineData, _ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::Observations(mut observations) = data else {
            return None;
        };

        for obs in &mut observations {
            // Messages and alarms carry free text; plain events are
            // controlled vocabulary and normalize to upper case.
            if obs.kind() != &ObservationKind::Event {
                continue;
            }
            if let Some(Value::String(s)) = obs.value() {
                let upper = s.to_uppercase();
                if upper != *s {
                    obs.replace_value(Value::String(upper));
                }
            }
        }
        Some(PipelineData::Observations(observations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests_support::{context_with_items, observations, run_stage};

    #[test]
    fn test_event_value_upcased() {
        let ctx = context_with_items();
        let out = run_stage(
            &UpcaseValue::new(),
            &ctx,
            observations(&ctx, &[("exec", "active")]),
        );
        let Some(PipelineData::Observations(obs)) = out else {
            panic!("expected observations");
        };
        assert_eq!(obs[0].value_text().as_deref(), Some("ACTIVE"));
    }

    #[test]
    fn test_message_text_untouched() {
        let ctx = context_with_items();
        let out = run_stage(
            &UpcaseValue::new(),
            &ctx,
            observations(&ctx, &[("msg", "mixed Case text")]),
        );
        let Some(PipelineData::Observations(obs)) = out else {
            panic!("expected observations");
        };
        assert_eq!(obs[0].value_text().as_deref(), Some("mixed Case text"));
    }
}
