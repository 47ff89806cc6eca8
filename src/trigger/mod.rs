// src/trigger/mod.rs

//! Per-(node, trigger) state machines (§4.D).
//!
//! `Once` and `After` are evaluated directly by the scheduler against
//! [`NodeState`](crate::types::NodeState) — no clock involved. `Restart` and
//! `Watch` each need their own clock: a pending delay, or a debounce window
//! accumulating filesystem events. Those clocks live here, keyed by
//! `(node, trigger_index)` since a single node may declare more than one
//! trigger.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::NodeId;

/// Tracks the next scheduled fire time for a `Restart` trigger.
#[derive(Debug)]
pub struct RestartTimer {
    pub delay: Duration,
    pub next_fire: Instant,
}

impl RestartTimer {
    pub fn new(delay: Duration, now: Instant) -> Self {
        Self {
            delay,
            next_fire: now + delay,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_fire
    }

    /// Rearm after the node this timer belongs to exits.
    pub fn rearm(&mut self, now: Instant) {
        self.next_fire = now + self.delay;
    }
}

/// Accumulates filesystem change events for a `Watch` trigger until
/// `debounce` has elapsed with no further changes, then fires once with the
/// union of changed paths.
#[derive(Debug)]
pub struct WatchDebouncer {
    pub debounce: Duration,
    pending_since: Option<Instant>,
    pending_paths: Vec<String>,
}

impl WatchDebouncer {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending_since: None,
            pending_paths: Vec::new(),
        }
    }

    /// Record a change; restarts the debounce window.
    pub fn record_change(&mut self, path: String, now: Instant) {
        self.pending_since = Some(now);
        if !self.pending_paths.contains(&path) {
            self.pending_paths.push(path);
        }
    }

    /// If the debounce window has elapsed since the last recorded change,
    /// take the accumulated paths and reset.
    pub fn take_if_due(&mut self, now: Instant) -> Option<Vec<String>> {
        let since = self.pending_since?;
        if now.duration_since(since) >= self.debounce {
            self.pending_since = None;
            Some(std::mem::take(&mut self.pending_paths))
        } else {
            None
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    /// When this debouncer will next be due, if anything is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending_since.map(|since| since + self.debounce)
    }
}

/// Per-node collection of the timer/debounce state for that node's
/// `Restart`/`Watch` triggers.
#[derive(Debug, Default)]
pub struct TriggerClocks {
    restarts: HashMap<(NodeId, usize), RestartTimer>,
    watches: HashMap<(NodeId, usize), WatchDebouncer>,
}

impl TriggerClocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_restart(
        &mut self,
        node: &NodeId,
        idx: usize,
        delay: Duration,
        now: Instant,
    ) -> &mut RestartTimer {
        self.restarts
            .entry((node.clone(), idx))
            .or_insert_with(|| RestartTimer::new(delay, now))
    }

    pub fn restart_timer_mut(&mut self, node: &NodeId, idx: usize) -> Option<&mut RestartTimer> {
        self.restarts.get_mut(&(node.clone(), idx))
    }

    pub fn ensure_watch(&mut self, node: &NodeId, idx: usize, debounce: Duration) -> &mut WatchDebouncer {
        self.watches
            .entry((node.clone(), idx))
            .or_insert_with(|| WatchDebouncer::new(debounce))
    }

    pub fn watch_mut(&mut self, node: &NodeId, idx: usize) -> Option<&mut WatchDebouncer> {
        self.watches.get_mut(&(node.clone(), idx))
    }

    /// Every due restart timer at `now`, as `(node, trigger_index)` pairs.
    pub fn due_restarts(&self, now: Instant) -> Vec<(NodeId, usize)> {
        self.restarts
            .iter()
            .filter(|(_, t)| t.is_due(now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Every watch debouncer whose window has elapsed, draining its paths.
    pub fn due_watches(&mut self, now: Instant) -> Vec<(NodeId, usize, Vec<String>)> {
        let mut out = Vec::new();
        for (key, debouncer) in self.watches.iter_mut() {
            if let Some(paths) = debouncer.take_if_due(now) {
                out.push((key.0.clone(), key.1, paths));
            }
        }
        out
    }

    /// The earliest instant at which either a restart timer or a watch
    /// debounce window will next become due, if any clock is armed. The
    /// engine loop sleeps until this instant rather than polling.
    pub fn earliest_wake(&self) -> Option<Instant> {
        let restart_min = self.restarts.values().map(|t| t.next_fire).min();
        let watch_min = self.watches.values().filter_map(WatchDebouncer::deadline).min();
        [restart_min, watch_min].into_iter().flatten().min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_timer_fires_after_delay() {
        let now = Instant::now();
        let timer = RestartTimer::new(Duration::from_millis(10), now);
        assert!(!timer.is_due(now));
        assert!(timer.is_due(now + Duration::from_millis(11)));
    }

    #[test]
    fn watch_debouncer_waits_for_quiet_window() {
        let now = Instant::now();
        let mut deb = WatchDebouncer::new(Duration::from_millis(50));
        deb.record_change("src/main.rs".into(), now);
        assert!(deb.take_if_due(now + Duration::from_millis(10)).is_none());
        // A second change resets the window.
        deb.record_change("src/lib.rs".into(), now + Duration::from_millis(10));
        assert!(deb.take_if_due(now + Duration::from_millis(40)).is_none());
        let fired = deb.take_if_due(now + Duration::from_millis(70)).unwrap();
        assert_eq!(fired.len(), 2);
        assert!(!deb.has_pending());
    }
}
