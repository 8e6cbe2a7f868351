//! Level Monitor
//!
//! A single cooperative sampling loop. The loop holds at most one pending
//! [`FrameRequest`]; each host frame consumes it, a snapshot is delivered to
//! the callback, and a fresh request is issued. Cancelling simply drops the
//! pending request, so a stopped monitor never ticks again.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::registry::NodeId;
use crate::host::AnalyzerReading;

/// Per-node levels in one snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeLevels {
    /// Frequency bins in dB
    pub bins: Vec<f32>,
    pub peak_db: f32,
    pub rms_db: f32,
}

impl From<AnalyzerReading> for NodeLevels {
    fn from(reading: AnalyzerReading) -> Self {
        Self {
            bins: reading.bins,
            peak_db: reading.peak_db,
            rms_db: reading.rms_db,
        }
    }
}

/// Levels of every active node at one tick
#[derive(Debug, Clone, Serialize)]
pub struct LevelSnapshot {
    /// Monotonically increasing per monitor
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub levels: BTreeMap<NodeId, NodeLevels>,
}

/// Callback receiving each snapshot
pub type LevelCallback = Box<dyn FnMut(&LevelSnapshot) + Send>;

/// Token for the next scheduled tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRequest(u64);

impl fmt::Display for FrameRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame-request#{}", self.0)
    }
}

#[derive(Default)]
pub struct LevelMonitor {
    callback: Option<LevelCallback>,
    pending: Option<FrameRequest>,
    next_request: u64,
    sequence: u64,
}

impl LevelMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.callback.is_some()
    }

    /// Snapshots delivered so far
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Install the callback and schedule a tick
    ///
    /// Returns `true` when a new loop was started. While already running
    /// only the callback is replaced; the pending request stays as is.
    pub fn start(&mut self, callback: LevelCallback) -> bool {
        let fresh = !self.is_running();
        self.callback = Some(callback);
        if fresh {
            self.schedule();
        }
        fresh
    }

    /// Cancel the pending tick; safe when idle
    pub fn stop(&mut self) {
        if let Some(request) = self.pending.take() {
            debug!(%request, "Level monitoring cancelled");
        }
        self.callback = None;
    }

    /// Consume the pending request, if any
    pub(crate) fn take_pending(&mut self) -> Option<FrameRequest> {
        self.pending.take()
    }

    /// Hand a snapshot to the callback and reschedule
    pub(crate) fn deliver(&mut self, levels: BTreeMap<NodeId, NodeLevels>) {
        let Some(callback) = self.callback.as_mut() else {
            return;
        };
        self.sequence += 1;
        let snapshot = LevelSnapshot {
            sequence: self.sequence,
            timestamp: Utc::now(),
            levels,
        };
        callback(&snapshot);
        debug!(sequence = snapshot.sequence, nodes = snapshot.levels.len(), "Level snapshot delivered");
        self.schedule();
    }

    fn schedule(&mut self) {
        self.next_request += 1;
        self.pending = Some(FrameRequest(self.next_request));
    }
}

impl fmt::Debug for LevelMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelMonitor")
            .field("running", &self.is_running())
            .field("pending", &self.pending)
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn counting() -> (LevelCallback, Arc<Mutex<Vec<u64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: LevelCallback = Box::new(move |snapshot: &LevelSnapshot| {
            sink.lock().unwrap().push(snapshot.sequence);
        });
        (callback, seen)
    }

    fn tick(monitor: &mut LevelMonitor) {
        if monitor.take_pending().is_some() {
            monitor.deliver(BTreeMap::new());
        }
    }

    #[test]
    fn test_loop_reschedules_itself() {
        let (callback, seen) = counting();
        let mut monitor = LevelMonitor::new();
        assert!(monitor.start(callback));
        for _ in 0..3 {
            tick(&mut monitor);
        }
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_second_start_keeps_single_loop() {
        let (first, first_seen) = counting();
        let (second, second_seen) = counting();
        let mut monitor = LevelMonitor::new();
        assert!(monitor.start(first));
        assert!(!monitor.start(second));

        tick(&mut monitor);
        tick(&mut monitor);
        assert!(first_seen.lock().unwrap().is_empty());
        assert_eq!(*second_seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_stop_cancels_pending() {
        let (callback, seen) = counting();
        let mut monitor = LevelMonitor::new();
        monitor.stop();
        monitor.start(callback);
        monitor.stop();
        assert!(!monitor.is_running());
        assert!(monitor.take_pending().is_none());
        tick(&mut monitor);
        assert!(seen.lock().unwrap().is_empty());
    }
}
