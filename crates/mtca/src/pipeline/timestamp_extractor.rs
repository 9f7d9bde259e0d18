// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Timestamp extraction and correction.
//!
//! The extractor resolves each tokenized line's leading timestamp token:
//! ISO-8601 parses directly, an empty or unparseable token stamps with the
//! wall clock, and relative-time mode anchors the first observation and
//! offsets the rest. A `@duration` suffix carries the statistic window.
//!
//! The corrector, when enabled, clamps per-data-item timestamps so a
//! source that goes backwards in time never produces regressing
//! observations.

use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

use crate::entity::{parse_timestamp, Timestamp};

use super::transform::{PipelineData, Timestamped, Transform};
use super::PipelineContext;

/// Anchor for relative-time mode: wall-clock base plus the source's first
/// offset (milliseconds) or first absolute timestamp.
#[derive(Debug, Clone, Copy)]
enum Anchor {
    Offset { base: Timestamp, first_ms: f64 },
    Absolute { base: Timestamp, first: Timestamp },
}

pub struct TimestampExtractor {
    relative_time: bool,
    ignore_timestamps: bool,
    /// Anchor survives for the connection; reset on adapter reconnect.
    anchor: Mutex<Option<Anchor>>,
}

impl TimestampExtractor {
    pub fn new(relative_time: bool, ignore_timestamps: bool) -> Self {
        Self {
            relative_time,
            ignore_timestamps,
            anchor: Mutex::new(None),
        }
    }

    /// Called when the source reconnects: the next observation re-anchors.
    pub fn reset_anchor(&self) {
        *self.anchor.lock() = None;
    }

    fn resolve(&self, token: &str, now: Timestamp) -> Timestamp {
        if self.ignore_timestamps || token.is_empty() {
            return now;
        }

        if self.relative_time {
            return self.resolve_relative(token, now);
        }

        match parse_timestamp(token) {
            Some(ts) => ts,
            None => {
                log::warn!("[timestamp] cannot parse timestamp '{}', using wall clock", token);
                now
            }
        }
    }

    fn resolve_relative(&self, token: &str, now: Timestamp) -> Timestamp {
        let mut anchor = self.anchor.lock();
        match (*anchor, token.parse::<f64>(), parse_timestamp(token)) {
            (None, Ok(offset_ms), _) => {
                *anchor = Some(Anchor::Offset {
                    base: now,
                    first_ms: offset_ms,
                });
                now
            }
            (None, Err(_), Some(ts)) => {
                *anchor = Some(Anchor::Absolute { base: now, first: ts });
                now
            }
            (Some(Anchor::Offset { base, first_ms }), Ok(offset_ms), _) => {
                let delta_us = ((offset_ms - first_ms) * 1000.0).round() as i64;
                base + ChronoDuration::microseconds(delta_us)
            }
            (Some(Anchor::Absolute { base, first }), _, Some(ts)) => base + (ts - first),
            _ => {
                log::warn!("[timestamp] cannot resolve relative time '{}', using wall clock", token);
                now
            }
        }
    }
}

impl Transform for TimestampExtractor {
    fn name(&self) -> &str {
        "TimestampExtractor"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::Tokens(_))
    }

    fn apply(&self, data: PipelineData, _ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::Tokens(mut tokens) = data else {
            return None;
        };
        let token = tokens.tokens.pop_front()?;

        // `timestamp@duration` carries the statistic window.
        let (ts_token, duration) = match token.split_once('@') {
            Some((ts, dur)) => (ts.to_string(), dur.parse::<f64>().ok()),
            None => (token, None),
        };

        let timestamp = self.resolve(&ts_token, Utc::now());
        Some(PipelineData::Timestamped(Timestamped {
            timestamp,
            duration,
            tokens: tokens.tokens,
        }))
    }
}

/// Clamp out-of-order timestamps to per-data-item monotonicity.
pub struct CorrectTimestamp {
    last_seen: Mutex<HashMap<String, Timestamp>>,
}

impl CorrectTimestamp {
    pub fn new() -> Self {
        Self {
            last_seen: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for CorrectTimestamp {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for CorrectTimestamp {
    fn name(&self) -> &str {
        "CorrectTimestamp"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::Observations(_))
    }

    fn apply(&self, data: PipelineData, _ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::Observations(mut observations) = data else {
            return None;
        };

        let mut last_seen = self.last_seen.lock();
        for obs in &mut observations {
            let id = obs.data_item().id().to_string();
            let ts = *obs.timestamp();
            match last_seen.get(&id) {
                Some(last) if ts < *last => {
                    log::debug!(
                        "[timestamp] correcting regressing timestamp for {}: {} -> {}",
                        id,
                        ts,
                        last
                    );
                    obs.set_timestamp(*last);
                }
                _ => {
                    last_seen.insert(id, ts);
                }
            }
        }
        Some(PipelineData::Observations(observations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_timestamp_parsed() {
        let extractor = TimestampExtractor::new(false, false);
        let now = Utc::now();
        let ts = extractor.resolve("2026-01-01T12:00:00Z", now);
        assert_eq!(
            ts,
            parse_timestamp("2026-01-01T12:00:00Z").expect("timestamp")
        );
    }

    #[test]
    fn test_empty_token_uses_wall_clock() {
        let extractor = TimestampExtractor::new(false, false);
        let now = Utc::now();
        assert_eq!(extractor.resolve("", now), now);
    }

    #[test]
    fn test_ignore_timestamps_overrides() {
        let extractor = TimestampExtractor::new(false, true);
        let now = Utc::now();
        assert_eq!(extractor.resolve("2026-01-01T12:00:00Z", now), now);
    }

    #[test]
    fn test_relative_offset_mode() {
        let extractor = TimestampExtractor::new(true, false);
        let now = Utc::now();

        // First observation anchors at the wall clock.
        assert_eq!(extractor.resolve("1000", now), now);
        // 500ms later in adapter time is 500ms after the anchor.
        let ts = extractor.resolve("1500", now);
        assert_eq!(ts - now, ChronoDuration::milliseconds(500));
    }

    #[test]
    fn test_relative_absolute_mode() {
        let extractor = TimestampExtractor::new(true, false);
        let now = Utc::now();

        assert_eq!(extractor.resolve("2026-01-01T12:00:00Z", now), now);
        let ts = extractor.resolve("2026-01-01T12:00:02Z", now);
        assert_eq!(ts - now, ChronoDuration::seconds(2));
    }

    #[test]
    fn test_anchor_reset() {
        let extractor = TimestampExtractor::new(true, false);
        let now = Utc::now();
        extractor.resolve("1000", now);
        extractor.reset_anchor();

        // Re-anchors: 2000 becomes the new zero point.
        let later = now + ChronoDuration::seconds(10);
        assert_eq!(extractor.resolve("2000", later), later);
    }
}
