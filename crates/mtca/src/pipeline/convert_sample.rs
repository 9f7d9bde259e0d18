// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Unit conversion stage: native adapter units to MTConnect units.
//!
//! Applies each data item's precomputed conversion to sample values,
//! including every element of three-space and timeseries vectors.

use crate::entity::Value;

use super::transform::{PipelineData, Transform};
use super::PipelineContext;

pub struct ConvertSample;

impl ConvertSample {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConvertSample {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for ConvertSample {
    fn name(&self) -> &str {
        "ConvertSample"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::Observations(_))
    }

    fn apply(&self, data: PipelineData, _ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::Observations(mut observations) = data else {
            return None;
        };

        for obs in &mut observations {
            if obs.is_unavailable() {
                continue;
            }
            let Some(conversion) = obs.data_item().conversion().copied() else {
                continue;
            };

            match obs.value() {
                Some(Value::Double(v)) => {
                    let converted = conversion.convert(*v);
                    obs.replace_value(Value::Double(converted));
                }
                Some(Value::Vector(v)) => {
                    let mut values = v.clone();
                    conversion.convert_vector(&mut values);
                    obs.replace_value(Value::Vector(values));
                }
                _ => {}
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
    fn test_sample_value_converted() {
        let ctx = context_with_items();
        // "temp" declares nativeUnits FAHRENHEIT, units CELSIUS.
        let out = run_stage(
            &ConvertSample::new(),
            &ctx,
            observations(&ctx, &[("temp", "212")]),
        );
        let Some(PipelineData::Observations(obs)) = out else {
            panic!("expected observations");
        };
        let Some(Value::Double(v)) = obs[0].value() else {
            panic!("expected double value");
        };
        assert!((v - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_unconverted_item_untouched() {
        let ctx = context_with_items();
        let out = run_stage(
            &ConvertSample::new(),
            &ctx,
            observations(&ctx, &[("pos", "10")]),
        );
        let Some(PipelineData::Observations(obs)) = out else {
            panic!("expected observations");
        };
        assert_eq!(obs[0].value(), Some(&Value::Double(10.0)));
    }

    #[test]
    fn test_unavailable_skipped() {
        let ctx = context_with_items();
        let out = run_stage(
            &ConvertSample::new(),
            &ctx,
            observations(&ctx, &[("temp", "UNAVAILABLE")]),
        );
        let Some(PipelineData::Observations(obs)) = out else {
            panic!("expected observations");
        };
        assert!(obs[0].is_unavailable());
    }
}
