// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Period filter: at most one observation per configured period.
//!
//! An observation landing inside an open period is held; a later one
//! replaces it. The held observation is delivered when the period closes,
//! by a timer posted to the pipeline's strand. Spacing is measured on
//! observation timestamps; the delivery timer runs on the wall clock.
//! Unavailable flushes the pending observation and passes straight
//! through.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;

use crate::entity::Timestamp;
use crate::observation::Observation;

use super::transform::{PipelineData, Transform};
use super::PipelineContext;

#[derive(Default)]
struct ItemState {
    last_emitted: Option<Timestamp>,
    pending: Option<Observation>,
}

pub struct PeriodFilter {
    state: Mutex<HashMap<String, ItemState>>,
}

impl PeriodFilter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Timer expiry for one data item: release the held observation.
    pub fn flush(&self, data_item_id: &str) -> Option<Observation> {
        let mut state = self.state.lock();
        let item = state.get_mut(data_item_id)?;
        let pending = item.pending.take()?;
        item.last_emitted = Some(*pending.timestamp());
        Some(pending)
    }

    fn admit(
        &self,
        obs: Observation,
        ctx: &PipelineContext,
        out: &mut Vec<Observation>,
    ) {
        let Some(period_s) = obs.data_item().filter_period() else {
            out.push(obs);
            return;
        };
        let period = ChronoDuration::microseconds((period_s * 1e6) as i64);
        let id = obs.data_item().id().to_string();

        let mut state = self.state.lock();
        let item = state.entry(id.clone()).or_default();

        if obs.is_unavailable() {
            if let Some(pending) = item.pending.take() {
                out.push(pending);
            }
            item.last_emitted = None;
            out.push(obs);
            return;
        }

        match item.last_emitted {
            Some(last) if *obs.timestamp() < last + period => {
                // Inside an open period: hold, replacing any earlier hold.
                let remaining = (last + period) - *obs.timestamp();
                let replace = item.pending.replace(obs);
                if replace.is_none() {
                    let delay = remaining
                        .to_std()
                        .unwrap_or(Duration::from_micros((period_s * 1e6) as u64));
                    ctx.schedule_period(&id, delay);
                }
            }
            _ => {
                item.last_emitted = Some(*obs.timestamp());
                out.push(obs);
            }
        }
    }
}

impl Default for PeriodFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for PeriodFilter {
    fn name(&self) -> &str {
        "PeriodFilter"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::Observations(_))
    }

    fn apply(&self, data: PipelineData, ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::Observations(observations) = data else {
            return None;
        };

        let mut out = Vec::with_capacity(observations.len());
        for obs in observations {
            self.admit(obs, ctx, &mut out);
        }

        if out.is_empty() {
            return None;
        }
        Some(PipelineData::Observations(out))
    }
}
