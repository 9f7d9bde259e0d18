// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! The circular observation buffer.
//!
//! Fixed-capacity FIFO of sequence-numbered observations with O(1) append.
//! Alongside the slots it maintains the latest checkpoint, a trailing
//! checkpoint at the buffer head, and a ring of periodic checkpoints so a
//! `current?at=` query replays at most one checkpoint interval.
//!
//! The buffer is not internally locked; the agent wraps it in a single
//! mutex shared by readers and writers, and every operation is short.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::observation::{Observation, ObservationPtr};

use super::checkpoint::{Checkpoint, FilterSet};

/// Result window from a `get_observations` call.
#[derive(Debug)]
pub struct ObservationWindow {
    pub observations: Vec<ObservationPtr>,
    /// First resident sequence at read time.
    pub first_sequence: u64,
    /// One past the last returned observation; resume point for the caller.
    pub end_sequence: u64,
    /// The window reached the newest resident observation.
    pub end_of_buffer: bool,
}

pub struct CircularBuffer {
    /// Capacity is `2^size_log2`, mirroring the BufferSize option.
    capacity: usize,
    checkpoint_freq: u64,
    /// Next sequence to assign; sequences start at 1.
    sequence: u64,
    slots: VecDeque<ObservationPtr>,
    latest: Checkpoint,
    /// State of everything already evicted: snapshot as of firstSequence-1.
    first: Checkpoint,
    /// Periodic snapshots `(sequence_of_last_included, checkpoint)`.
    checkpoints: VecDeque<(u64, Checkpoint)>,
}

impl CircularBuffer {
    pub fn new(size_log2: u8, checkpoint_freq: u64) -> Self {
        assert!(checkpoint_freq > 0, "checkpoint frequency must be positive");
        Self {
            capacity: 1usize << size_log2,
            checkpoint_freq,
            sequence: 1,
            slots: VecDeque::new(),
            latest: Checkpoint::new(),
            first: Checkpoint::new(),
            checkpoints: VecDeque::new(),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.capacity
    }

    /// Next sequence to be assigned (one past the newest observation).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Smallest resident sequence; equals `sequence()` when empty.
    pub fn first_sequence(&self) -> u64 {
        self.slots.front().map_or(self.sequence, |o| o.sequence())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn latest(&self) -> &Checkpoint {
        &self.latest
    }

    /// Admit an observation: assign its sequence, append, evict on wrap,
    /// fold into the latest checkpoint, and record periodic snapshots.
    ///
    /// Data-set observations are first trimmed against the latest state;
    /// a fully-duplicate set is dropped and `None` returned.
    pub fn add_observation(&mut self, mut obs: Observation) -> Option<(u64, ObservationPtr)> {
        if obs.data_item().is_data_set() && !obs.is_unavailable() {
            obs = self.latest.data_set_difference(&obs)?;
        }

        let seq = self.sequence;
        obs.set_sequence(seq);
        self.sequence += 1;

        let obs = Arc::new(obs);
        self.slots.push_back(Arc::clone(&obs));

        if self.slots.len() > self.capacity {
            let evicted = self
                .slots
                .pop_front()
                .expect("slots cannot be empty past capacity");
            // The trailing checkpoint absorbs evicted state so replays can
            // start from the buffer head.
            self.first.add_observation(&evicted);
        }

        self.latest.add_observation(&obs);

        if seq % self.checkpoint_freq == 0 {
            self.checkpoints
                .push_back((seq, Checkpoint::copy_from(&self.latest, None)));
        }
        // Checkpoints older than the buffer head can never serve a query.
        let first = self.first_sequence();
        while matches!(self.checkpoints.front(), Some((s, _)) if *s < first) {
            self.checkpoints.pop_front();
        }

        log::trace!("[buffer] added observation seq={} item={}", seq, obs.data_item().id());
        Some((seq, obs))
    }

    /// Read up to `count` observations with sequence in `[from, to]` whose
    /// data item is admitted by `filter`.
    pub fn get_observations(
        &self,
        count: usize,
        filter: Option<&FilterSet>,
        from: Option<u64>,
        to: Option<u64>,
    ) -> ObservationWindow {
        let first = self.first_sequence();
        let from = from.unwrap_or(first).max(first);

        let mut observations = Vec::new();
        let mut end = from;
        let mut scanned_to_end = true;

        if from < self.sequence {
            let start_idx = (from - first) as usize;
            for obs in self.slots.iter().skip(start_idx) {
                let seq = obs.sequence();
                if let Some(to) = to {
                    if seq > to {
                        scanned_to_end = false;
                        break;
                    }
                }
                if observations.len() >= count {
                    scanned_to_end = false;
                    break;
                }
                if filter.map_or(true, |f| f.contains(obs.data_item().id())) {
                    observations.push(Arc::clone(obs));
                    end = seq + 1;
                }
            }
        }

        if observations.is_empty() {
            end = from;
        }

        ObservationWindow {
            observations,
            first_sequence: first,
            end_sequence: end,
            end_of_buffer: scanned_to_end,
        }
    }

    /// Latest observations, optionally filtered.
    pub fn get_current(&self, filter: Option<&FilterSet>) -> Vec<ObservationPtr> {
        self.latest.observations(filter)
    }

    /// Latest-as-of snapshot at sequence `at`, reconstructed from the
    /// nearest checkpoint at or before `at` plus forward replay.
    ///
    /// `at` must satisfy `first_sequence() <= at < sequence()`.
    pub fn checkpoint_at(&self, at: u64, filter: Option<FilterSet>) -> Option<Checkpoint> {
        let first = self.first_sequence();
        if at < first || at >= self.sequence {
            return None;
        }

        // Best base: the newest ring checkpoint not past `at`, else the
        // trailing checkpoint at the buffer head.
        let (base_seq, base) = self
            .checkpoints
            .iter()
            .rev()
            .find(|(seq, _)| *seq <= at)
            .map(|(seq, cp)| (*seq, cp))
            .unwrap_or((first - 1, &self.first));

        let mut checkpoint = Checkpoint::copy_from(base, filter);
        let start_idx = (base_seq + 1 - first) as usize;
        for obs in self.slots.iter().skip(start_idx) {
            if obs.sequence() > at {
                break;
            }
            checkpoint.add_observation(obs);
        }
        Some(checkpoint)
    }

    /// Number of retained periodic checkpoints (bounded by capacity/freq).
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }
}
