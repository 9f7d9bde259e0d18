// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Duplicate suppression: per data item, drop observations whose value
//! equals the previously-emitted one. Data-set values compare the full
//! cell set. Discrete data items are never filtered (every occurrence is
//! meaningful), and condition comparison includes level and code.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::entity::Value;
use crate::observation::Observation;

use super::transform::{PipelineData, Transform};
use super::PipelineContext;

#[derive(PartialEq, Clone, Debug)]
struct Fingerprint {
    value: Option<Value>,
    level: Option<String>,
    code: Option<String>,
}

impl Fingerprint {
    fn of(obs: &Observation) -> Self {
        Self {
            value: obs.value().cloned(),
            level: obs.level().map(|l| l.element_name().to_string()),
            code: obs.code().map(String::from),
        }
    }
}

pub struct DuplicateFilter {
    last: Mutex<HashMap<String, Fingerprint>>,
}

impl DuplicateFilter {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for DuplicateFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for DuplicateFilter {
    fn name(&self) -> &str {
        "DuplicateFilter"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::Observations(_))
    }

    fn apply(&self, data: PipelineData, _ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::Observations(observations) = data else {
            return None;
        };

        let mut last = self.last.lock();
        let kept: Vec<Observation> = observations
            .into_iter()
            .filter(|obs| {
                if obs.data_item().is_discrete() {
                    return true;
                }
                let fp = Fingerprint::of(obs);
                match last.get(obs.data_item().id()) {
                    Some(previous) if *previous == fp => {
                        log::trace!("[duplicate_filter] dropping duplicate for {}", obs.data_item().id());
                        false
                    }
                    _ => {
                        last.insert(obs.data_item().id().to_string(), fp);
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
    fn test_consecutive_duplicates_dropped() {
        let ctx = context_with_items();
        let filter = DuplicateFilter::new();

        let first = run_stage(&filter, &ctx, observations(&ctx, &[("exec", "ACTIVE")]));
        assert!(first.is_some());

        let second = run_stage(&filter, &ctx, observations(&ctx, &[("exec", "ACTIVE")]));
        assert!(second.is_none());

        let third = run_stage(&filter, &ctx, observations(&ctx, &[("exec", "READY")]));
        assert!(third.is_some());
    }

    #[test]
    fn test_items_filter_independently() {
        let ctx = context_with_items();
        let filter = DuplicateFilter::new();

        run_stage(&filter, &ctx, observations(&ctx, &[("exec", "ACTIVE")]));
        let out = run_stage(
            &filter,
            &ctx,
            observations(&ctx, &[("avail", "AVAILABLE"), ("exec", "ACTIVE")]),
        );
        let Some(PipelineData::Observations(obs)) = out else {
            panic!("expected observations");
        };
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].data_item().id(), "avail");
    }

    #[test]
    fn test_data_set_duplicate_compares_cells() {
        let ctx = context_with_items();
        let filter = DuplicateFilter::new();

        run_stage(&filter, &ctx, observations(&ctx, &[("vars", "a=1 b=2")]));
        let dup = run_stage(&filter, &ctx, observations(&ctx, &[("vars", "a=1 b=2")]));
        assert!(dup.is_none());

        let changed = run_stage(&filter, &ctx, observations(&ctx, &[("vars", "a=1 b=3")]));
        assert!(changed.is_some());
    }
}
