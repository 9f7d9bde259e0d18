// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Minimum-delta filter: numeric observations move the needle only when
//! they differ from the last emitted value by at least the data item's
//! configured minimum delta. Unavailable passes through and resets the
//! reference point.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::transform::{PipelineData, Transform};
use super::PipelineContext;

pub struct DeltaFilter {
    last: Mutex<HashMap<String, f64>>,
}

impl DeltaFilter {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for DeltaFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for DeltaFilter {
    fn name(&self) -> &str {
        "DeltaFilter"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::Observations(_))
    }

    fn apply(&self, data: PipelineData, _ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::Observations(observations) = data else {
            return None;
        };

        let mut last = self.last.lock();
        let kept: Vec<_> = observations
            .into_iter()
            .filter(|obs| {
                let Some(delta) = obs.data_item().minimum_delta() else {
                    return true;
                };
                if obs.is_unavailable() {
                    last.remove(obs.data_item().id());
                    return true;
                }
                let Some(value) = obs.value().and_then(|v| v.as_f64()) else {
                    return true;
                };
                match last.get(obs.data_item().id()) {
                    Some(previous) if (value - previous).abs() < delta => {
                        log::trace!(
                            "[delta_filter] |{} - {}| < {} for {}, dropping",
                            value,
                            previous,
                            delta,
                            obs.data_item().id()
                        );
                        false
                    }
                    _ => {
                        last.insert(obs.data_item().id().to_string(), value);
                        true
                    }
                }
            })
            .collect();

        if kept.is_empty() {
            return None;
        }
        Some(PipelineData::Observations(kept))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests_support::{context_with_items, observations, run_stage};

    #[test]
    fn test_small_changes_dropped() {
        let ctx = context_with_items();
        let filter = DeltaFilter::new();

        // "load" declares minimumDelta=5.
        assert!(run_stage(&filter, &ctx, observations(&ctx, &[("load", "10")])).is_some());
        assert!(run_stage(&filter, &ctx, observations(&ctx, &[("load", "12")])).is_none());
        assert!(run_stage(&filter, &ctx, observations(&ctx, &[("load", "14.9")])).is_none());
        assert!(run_stage(&filter, &ctx, observations(&ctx, &[("load", "15")])).is_some());
        // Reference moves to 15: 12 is only 3 away now.
        assert!(run_stage(&filter, &ctx, observations(&ctx, &[("load", "12")])).is_none());
    }

    #[test]
    fn test_unfiltered_items_untouched() {
        let ctx = context_with_items();
        let filter = DeltaFilter::new();
        assert!(run_stage(&filter, &ctx, observations(&ctx, &[("pos", "1")])).is_some());
        assert!(run_stage(&filter, &ctx, observations(&ctx, &[("pos", "1.001")])).is_some());
    }

    #[test]
    fn test_unavailable_resets_reference() {
        let ctx = context_with_items();
        let filter = DeltaFilter::new();

        run_stage(&filter, &ctx, observations(&ctx, &[("load", "10")]));
        assert!(run_stage(&filter, &ctx, observations(&ctx, &[("load", "UNAVAILABLE")])).is_some());
        // After unavailable, the next value always passes.
        assert!(run_stage(&filter, &ctx, observations(&ctx, &[("load", "11")])).is_some());
    }
}
