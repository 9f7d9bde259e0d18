// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Change notification from buffer writers to waiting readers.
//!
//! Each data item owns a [`ChangeSignaler`]; a streaming session creates one
//! [`ChangeObserver`] and attaches it to every signaler in its filter set.
//! When the buffer admits an observation the data item's signaler fans out
//! the new sequence number to all attached observers, waking any session
//! blocked in `wait_for`.
//!
//! The observer retains the *smallest* sequence signaled since the last
//! reset: the earliest unconsumed event is where the next read must start,
//! and later events always carry greater sequence numbers.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Reader side: wait surface with the earliest signaled sequence.
pub struct ChangeObserver {
    state: Mutex<ObserverState>,
    notify: Notify,
    /// Signalers this observer is attached to, for detach-on-drop.
    signalers: Mutex<Vec<Weak<ChangeSignaler>>>,
}

#[derive(Default)]
struct ObserverState {
    /// Smallest sequence signaled since the last reset.
    sequence: Option<u64>,
}

impl ChangeObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ObserverState::default()),
            notify: Notify::new(),
            signalers: Mutex::new(Vec::new()),
        })
    }

    /// Record a signaled sequence and wake a waiting reader. Signaled
    /// sequence numbers can only decrease between resets, never increase.
    pub fn signal(&self, sequence: u64) {
        {
            let mut state = self.state.lock();
            match state.sequence {
                Some(existing) if existing <= sequence => {}
                _ => state.sequence = Some(sequence),
            }
        }
        self.notify.notify_one();
    }

    /// Whether a signal arrived since the last reset.
    pub fn was_signaled(&self) -> bool {
        self.state.lock().sequence.is_some()
    }

    /// The earliest sequence signaled since the last reset.
    pub fn sequence(&self) -> Option<u64> {
        self.state.lock().sequence
    }

    /// Clear the signaled state before the next wait cycle.
    pub fn reset(&self) {
        self.state.lock().sequence = None;
    }

    /// Block until a signal arrives or `timeout` elapses. Returns `true`
    /// when the observer was signaled. A pending signal from before the
    /// call returns immediately.
    pub async fn wait_for(&self, timeout: Duration) -> bool {
        if self.was_signaled() {
            return true;
        }
        tokio::select! {
            _ = self.notify.notified() => true,
            _ = tokio::time::sleep(timeout) => self.was_signaled(),
        }
    }

    fn attach(&self, signaler: &Arc<ChangeSignaler>) {
        self.signalers.lock().push(Arc::downgrade(signaler));
    }

    fn detach(&self, signaler: &ChangeSignaler) {
        self.signalers
            .lock()
            .retain(|w| w.upgrade().map_or(false, |s| !std::ptr::eq(&*s, signaler)));
    }
}

impl Drop for ChangeObserver {
    fn drop(&mut self) {
        // Signalers hold weak references; nothing to unhook. Kept for the
        // symmetric API shape and to release the back-pointers eagerly.
        self.signalers.lock().clear();
    }
}

/// Writer side: fan-out list owned by a data item.
///
/// The observer list snapshot is taken before signaling so an observer may
/// deregister (or drop) while a signal pass is in flight.
#[derive(Default)]
pub struct ChangeSignaler {
    observers: Mutex<Vec<Weak<ChangeObserver>>>,
}

impl ChangeSignaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(self: &Arc<Self>, observer: &Arc<ChangeObserver>) {
        observer.attach(self);
        self.observers.lock().push(Arc::downgrade(observer));
    }

    pub fn remove_observer(self: &Arc<Self>, observer: &Arc<ChangeObserver>) -> bool {
        observer.detach(self);
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|w| w.upgrade().map_or(false, |o| !Arc::ptr_eq(&o, observer)));
        observers.len() != before
    }

    pub fn has_observer(&self, observer: &Arc<ChangeObserver>) -> bool {
        self.observers
            .lock()
            .iter()
            .any(|w| w.upgrade().map_or(false, |o| Arc::ptr_eq(&o, observer)))
    }

    /// Fan a new sequence out to every live observer, pruning dead ones.
    pub fn signal_observers(&self, sequence: u64) {
        let snapshot: Vec<Arc<ChangeObserver>> = {
            let mut observers = self.observers.lock();
            observers.retain(|w| w.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in snapshot {
            observer.signal(sequence);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_keeps_earliest_sequence() {
        let observer = ChangeObserver::new();
        observer.signal(10);
        observer.signal(20);
        observer.signal(5);
        assert_eq!(observer.sequence(), Some(5));

        observer.reset();
        assert!(!observer.was_signaled());
        observer.signal(30);
        assert_eq!(observer.sequence(), Some(30));
    }

    #[test]
    fn test_signaler_fan_out_and_removal() {
        let signaler = Arc::new(ChangeSignaler::new());
        let a = ChangeObserver::new();
        let b = ChangeObserver::new();

        signaler.add_observer(&a);
        signaler.add_observer(&b);
        assert_eq!(signaler.observer_count(), 2);

        signaler.signal_observers(42);
        assert_eq!(a.sequence(), Some(42));
        assert_eq!(b.sequence(), Some(42));

        assert!(signaler.remove_observer(&a));
        assert!(!signaler.has_observer(&a));
        signaler.signal_observers(43);
        assert_eq!(a.sequence(), Some(42));
        assert_eq!(b.sequence(), Some(42));
    }

    #[test]
    fn test_dropped_observer_is_pruned() {
        let signaler = Arc::new(ChangeSignaler::new());
        {
            let observer = ChangeObserver::new();
            signaler.add_observer(&observer);
            assert_eq!(signaler.observer_count(), 1);
        }
        signaler.signal_observers(1);
        assert_eq!(signaler.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_returns_on_signal() {
        let observer = ChangeObserver::new();
        let waiter = Arc::clone(&observer);

        let handle = tokio::spawn(async move {
            waiter.wait_for(Duration::from_secs(5)).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        observer.signal(7);

        assert!(handle.await.expect("task should complete"));
        assert_eq!(observer.sequence(), Some(7));
    }

    #[tokio::test]
    async fn test_wait_for_times_out_without_signal() {
        let observer = ChangeObserver::new();
        let signaled = observer.wait_for(Duration::from_millis(20)).await;
        assert!(!signaled);
    }

    #[tokio::test]
    async fn test_pending_signal_returns_immediately() {
        let observer = ChangeObserver::new();
        observer.signal(3);
        assert!(observer.wait_for(Duration::from_millis(1)).await);
    }
}
