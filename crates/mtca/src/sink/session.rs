// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Streaming sessions: long-lived buffer subscriptions with interval
//! pacing, heartbeats, and back-pressure.
//!
//! Each session is one tokio task driving an explicit state machine:
//!
//! ```text
//! IDLE ── observe ──▶ ARMED
//! ARMED ── buffer has items ──▶ DELIVERING ── emit, advance ──▶ ARMED
//! ARMED ── no items ──▶ WAITING
//! WAITING ── signal ──▶ DELIVERING      WAITING ── heartbeat ──▶ HEARTBEAT ──▶ WAITING
//! any ── cancel / transport gone ──▶ CLOSED
//! any ── cursor < firstSequence ──▶ FAILED ("fell behind")
//! ```
//!
//! Frames flow to the transport over a bounded channel; a slow consumer
//! blocks the session, and a dropped receiver closes it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use crate::buffer::{CircularBuffer, FilterSet};
use crate::observation::{ChangeObserver, ObservationPtr};

/// Client-facing subscription parameters.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub filter: FilterSet,
    pub from: Option<u64>,
    /// Minimum time between emitted chunks.
    pub interval: Duration,
    /// Maximum silence before a keep-alive frame.
    pub heartbeat: Duration,
    /// Maximum observations per chunk.
    pub count: usize,
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Armed,
    Waiting,
    Delivering,
    Heartbeat,
    Closed,
    Failed,
}

/// Frames delivered to the transport.
#[derive(Debug)]
pub enum SessionFrame {
    /// A complete document containing observations.
    Document(String),
    /// Keep-alive: a complete, empty document.
    Heartbeat(String),
    /// Terminal failure; the transport should surface it and close.
    Failed { status: u16, message: String },
}

/// Window metadata a formatter needs for the document header.
#[derive(Debug, Clone, Copy)]
pub struct ChunkInfo {
    pub first_sequence: u64,
    pub next_sequence: u64,
    pub last_sequence: u64,
}

/// Renders one chunk as a complete document; empty observation slices are
/// heartbeats.
pub trait ChunkFormatter: Send + Sync {
    fn format(&self, observations: &[ObservationPtr], info: &ChunkInfo) -> String;
}

/// External cancellation surface. Idempotent.
#[derive(Clone)]
pub struct SessionHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Completes when (or immediately after) the session is cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StreamSession {
    buffer: Arc<Mutex<CircularBuffer>>,
    observer: Arc<ChangeObserver>,
    params: SessionParams,
    formatter: Arc<dyn ChunkFormatter>,
    state: SessionState,
}

impl StreamSession {
    /// Build a session over an already-attached observer. The caller has
    /// registered `observer` with every signaler in the filter set.
    pub fn new(
        buffer: Arc<Mutex<CircularBuffer>>,
        observer: Arc<ChangeObserver>,
        params: SessionParams,
        formatter: Arc<dyn ChunkFormatter>,
    ) -> Self {
        Self {
            buffer,
            observer,
            params,
            formatter,
            state: SessionState::Idle,
        }
    }

    /// Spawn the session task. Frames arrive on the returned receiver; the
    /// handle cancels from outside.
    pub fn spawn(self) -> (mpsc::Receiver<SessionFrame>, SessionHandle) {
        let (tx, rx) = mpsc::channel(16);
        let handle = SessionHandle::new();
        let task_handle = handle.clone();
        tokio::spawn(async move {
            self.run(tx, task_handle).await;
        });
        (rx, handle)
    }

    async fn run(mut self, tx: mpsc::Sender<SessionFrame>, handle: SessionHandle) {
        // Starting sequence policy: missing or stale `from` begins at the
        // current tail and emits only future observations.
        let (first, next) = {
            let buffer = self.buffer.lock();
            (buffer.first_sequence(), buffer.sequence())
        };
        let mut cursor = match self.params.from {
            Some(from) if from >= first => from,
            _ => next,
        };
        let mut last_emit: Option<Instant> = None;
        self.state = SessionState::Armed;

        loop {
            if handle.is_cancelled() {
                self.state = SessionState::Closed;
                break;
            }

            // Consume the pending signal before reading so nothing arriving
            // after the read is lost.
            self.observer.reset();

            let (window, info) = {
                let buffer = self.buffer.lock();
                let window = buffer.get_observations(
                    self.params.count,
                    Some(&self.params.filter),
                    Some(cursor),
                    None,
                );
                let info = ChunkInfo {
                    first_sequence: window.first_sequence,
                    next_sequence: window.end_sequence,
                    last_sequence: buffer.sequence().saturating_sub(1),
                };
                (window, info)
            };

            // Back-pressure / fall-behind: the buffer lapped this client.
            if cursor < info.first_sequence {
                log::warn!(
                    "[session] client fell too far behind (cursor {} < first {}), disconnecting",
                    cursor,
                    info.first_sequence
                );
                self.state = SessionState::Failed;
                let _ = tx
                    .send(SessionFrame::Failed {
                        status: 404,
                        message: "Client fell too far behind, disconnecting".into(),
                    })
                    .await;
                break;
            }

            if !window.observations.is_empty() {
                self.state = SessionState::Delivering;
                let doc = self.formatter.format(&window.observations, &info);
                if tx.send(SessionFrame::Document(doc)).await.is_err() {
                    log::debug!("[session] transport receiver dropped, closing");
                    self.state = SessionState::Closed;
                    break;
                }
                cursor = window.end_sequence;
                last_emit = Some(Instant::now());
                self.state = SessionState::Armed;
                continue;
            }

            // Nothing to deliver: wait for a signal or the heartbeat.
            self.state = SessionState::Waiting;
            let signaled = tokio::select! {
                _ = handle.notify.notified() => {
                    self.state = SessionState::Closed;
                    break;
                }
                signaled = self.observer.wait_for(self.params.heartbeat) => signaled,
            };

            if signaled {
                // Signaled earlier than the interval since the last emit:
                // sleep out the remaining slice, coalescing everything that
                // lands meanwhile into the next read.
                if !self.pace(&handle, &last_emit).await {
                    continue; // cancelled during the interval slice
                }
                // Never regress: jump to the earliest signaled sequence
                // when it is ahead of the cursor.
                if let Some(signaled_seq) = self.observer.sequence() {
                    if signaled_seq > cursor {
                        cursor = signaled_seq;
                    }
                }
            } else {
                self.state = SessionState::Heartbeat;
                let info = {
                    let buffer = self.buffer.lock();
                    ChunkInfo {
                        first_sequence: buffer.first_sequence(),
                        next_sequence: buffer.sequence(),
                        last_sequence: buffer.sequence().saturating_sub(1),
                    }
                };
                let doc = self.formatter.format(&[], &info);
                if tx.send(SessionFrame::Heartbeat(doc)).await.is_err() {
                    self.state = SessionState::Closed;
                    break;
                }
                last_emit = Some(Instant::now());
                // Advance to the live edge so a real-time stream does not
                // replay what arrived while the heartbeat was in flight.
                cursor = info.next_sequence;
                self.state = SessionState::Waiting;
            }
        }

        log::debug!("[session] terminated in state {:?}", self.state);
    }

    /// Interval coalescing: if woken earlier than `interval` since the last
    /// emit, sleep out the remaining slice. Returns false on cancel.
    async fn pace(&self, handle: &SessionHandle, last_emit: &Option<Instant>) -> bool {
        let Some(last) = *last_emit else {
            return true;
        };
        let elapsed = last.elapsed();
        if elapsed >= self.params.interval {
            return true;
        }
        let remaining = self.params.interval - elapsed;
        tokio::select! {
            _ = handle.notify.notified() => false,
            _ = tokio::time::sleep(remaining) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_model::{DataItem, DataItemPtr};
    use crate::entity::{ErrorList, Properties, Value};
    use crate::observation::Observation;
    use chrono::Utc;

    struct PlainFormatter;

    impl ChunkFormatter for PlainFormatter {
        fn format(&self, observations: &[ObservationPtr], info: &ChunkInfo) -> String {
            let values: Vec<String> = observations
                .iter()
                .filter_map(|o| o.value_text())
                .collect();
            format!("next={};{}", info.next_sequence, values.join(","))
        }
    }

    fn exec_item() -> DataItemPtr {
        let mut p = Properties::new();
        p.insert("id", "exec");
        p.insert("type", "EXECUTION");
        p.insert("category", "EVENT");
        DataItem::make(p).expect("data item builds")
    }

    fn push(buffer: &Arc<Mutex<CircularBuffer>>, item: &DataItemPtr, value: &str) -> u64 {
        let mut props = Properties::new();
        props.insert("VALUE", Value::String(value.to_string()));
        let mut errors = ErrorList::new();
        let obs = Observation::make(item, props, Utc::now(), &mut errors)
            .expect("observation builds");
        let (seq, _) = buffer.lock().add_observation(obs).expect("admitted");
        item.signaler().signal_observers(seq);
        seq
    }

    fn session(
        buffer: &Arc<Mutex<CircularBuffer>>,
        item: &DataItemPtr,
        from: Option<u64>,
        interval_ms: u64,
        heartbeat_ms: u64,
    ) -> (mpsc::Receiver<SessionFrame>, SessionHandle) {
        let observer = ChangeObserver::new();
        item.signaler().add_observer(&observer);
        let params = SessionParams {
            filter: FilterSet::from(["exec".to_string()]),
            from,
            interval: Duration::from_millis(interval_ms),
            heartbeat: Duration::from_millis(heartbeat_ms),
            count: 100,
        };
        StreamSession::new(
            Arc::clone(buffer),
            observer,
            params,
            Arc::new(PlainFormatter),
        )
        .spawn()
    }

    #[tokio::test]
    async fn test_replays_from_past_sequence() {
        let buffer = Arc::new(Mutex::new(CircularBuffer::new(8, 100)));
        let item = exec_item();
        push(&buffer, &item, "READY");
        push(&buffer, &item, "ACTIVE");

        let (mut rx, handle) = session(&buffer, &item, Some(1), 0, 10_000);
        let frame = rx.recv().await.expect("one chunk");
        match frame {
            SessionFrame::Document(doc) => assert_eq!(doc, "next=3;READY,ACTIVE"),
            other => panic!("expected document, got {:?}", other),
        }
        handle.cancel();
    }

    #[tokio::test]
    async fn test_missing_from_starts_at_tail() {
        let buffer = Arc::new(Mutex::new(CircularBuffer::new(8, 100)));
        let item = exec_item();
        push(&buffer, &item, "READY");

        let (mut rx, handle) = session(&buffer, &item, None, 0, 10_000);
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Nothing yet: the READY at sequence 1 is in the past.
        push(&buffer, &item, "ACTIVE");

        let frame = rx.recv().await.expect("future observation");
        match frame {
            SessionFrame::Document(doc) => assert_eq!(doc, "next=3;ACTIVE"),
            other => panic!("expected document, got {:?}", other),
        }
        handle.cancel();
    }

    #[tokio::test]
    async fn test_interval_coalesces_rapid_writes() {
        let buffer = Arc::new(Mutex::new(CircularBuffer::new(8, 100)));
        let item = exec_item();
        let start_seq = { buffer.lock().sequence() };

        let (mut rx, handle) = session(&buffer, &item, Some(start_seq), 50, 10_000);
        // Push the first so the session emits a chunk and starts pacing.
        push(&buffer, &item, "READY");
        let first = rx.recv().await.expect("first chunk");
        assert!(matches!(first, SessionFrame::Document(_)));

        // Three rapid transitions within the interval coalesce into one
        // chunk emitted only after the interval elapses.
        let t0 = Instant::now();
        push(&buffer, &item, "ACTIVE");
        push(&buffer, &item, "INTERRUPTED");
        push(&buffer, &item, "READY");

        let frame = rx.recv().await.expect("coalesced chunk");
        let elapsed = t0.elapsed();
        match frame {
            SessionFrame::Document(doc) => {
                assert_eq!(doc, "next=5;ACTIVE,INTERRUPTED,READY");
            }
            other => panic!("expected document, got {:?}", other),
        }
        assert!(
            elapsed >= Duration::from_millis(45),
            "chunk arrived after {:?}, expected the 50ms interval",
            elapsed
        );
        handle.cancel();
    }

    #[tokio::test]
    async fn test_heartbeat_when_idle() {
        let buffer = Arc::new(Mutex::new(CircularBuffer::new(8, 100)));
        let item = exec_item();

        let (mut rx, handle) = session(&buffer, &item, None, 0, 30);
        let frame = rx.recv().await.expect("heartbeat frame");
        assert!(matches!(frame, SessionFrame::Heartbeat(_)));
        handle.cancel();
    }

    #[tokio::test]
    async fn test_fell_behind_fails_terminally() {
        let buffer = Arc::new(Mutex::new(CircularBuffer::new(2, 100))); // capacity 4
        let item = exec_item();
        push(&buffer, &item, "READY");
        push(&buffer, &item, "ACTIVE");

        let (mut rx, _handle) = session(&buffer, &item, Some(1), 0, 10_000);
        let first = rx.recv().await.expect("initial chunk");
        assert!(matches!(first, SessionFrame::Document(_)));

        // The test runtime is single-threaded: all nine land before the
        // session wakes, lapping its cursor (first_sequence moves to 7).
        for _ in 0..8 {
            push(&buffer, &item, "ACTIVE");
        }

        let frame = rx.recv().await.expect("failure frame");
        match frame {
            SessionFrame::Failed { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("fell too far behind"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_closes() {
        let buffer = Arc::new(Mutex::new(CircularBuffer::new(8, 100)));
        let item = exec_item();

        let (mut rx, handle) = session(&buffer, &item, None, 0, 10_000);
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());

        // Channel drains to closed without frames.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }
}
