//! Progress tracking for region requests.

use crate::core::error::NodeId;
use crate::core::rect::Rectangle;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A progress update event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// Evaluation has started.
    Started {
        total_nodes: usize,
    },
    /// A node produced its region.
    NodeProcessed {
        node_id: NodeId,
        node_name: String,
        rect: Rectangle,
        duration_ms: u64,
        index: usize,
        total: usize,
    },
    /// A node's region was answered from the cache.
    NodeCached {
        node_id: NodeId,
    },
    /// The request has completed.
    Completed {
        total_duration_ms: u64,
        nodes_processed: usize,
        nodes_cached: usize,
    },
    /// The request failed.
    Error {
        node_id: Option<NodeId>,
        message: String,
    },
}

/// Callback type for progress updates.
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Counts evaluated nodes and forwards events to a callback.
///
/// Safe to share across the worker threads of a parallel request.
pub struct ProgressTracker {
    total_nodes: usize,
    processed: AtomicU64,
    cached: AtomicU64,
    start_time: Instant,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    /// Create a progress tracker.
    pub fn new(total_nodes: usize) -> Self {
        Self {
            total_nodes,
            processed: AtomicU64::new(0),
            cached: AtomicU64::new(0),
            start_time: Instant::now(),
            callback: None,
        }
    }

    /// Set a callback for progress updates.
    pub fn with_callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Start tracking.
    pub fn start(&mut self) {
        self.start_time = Instant::now();
        self.send_update(ProgressUpdate::Started {
            total_nodes: self.total_nodes,
        });
    }

    /// Report that a node has produced `rect`.
    pub fn node_processed(&self, node_id: NodeId, node_name: String, rect: Rectangle, duration_ms: u64) {
        let index = self.processed.fetch_add(1, Ordering::Relaxed) as usize + 1;
        self.send_update(ProgressUpdate::NodeProcessed {
            node_id,
            node_name,
            rect,
            duration_ms,
            index,
            total: self.total_nodes,
        });
    }

    /// Report a cache hit.
    pub fn node_cached(&self, node_id: NodeId) {
        self.cached.fetch_add(1, Ordering::Relaxed);
        self.send_update(ProgressUpdate::NodeCached { node_id });
    }

    /// Report an error.
    pub fn report_error(&self, node_id: Option<NodeId>, message: String) {
        self.send_update(ProgressUpdate::Error { node_id, message });
    }

    /// Complete tracking.
    pub fn complete(&self) {
        self.send_update(ProgressUpdate::Completed {
            total_duration_ms: self.elapsed_ms(),
            nodes_processed: self.nodes_processed(),
            nodes_cached: self.nodes_cached(),
        });
    }

    /// Nodes evaluated so far.
    pub fn nodes_processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed) as usize
    }

    /// Nodes answered from the cache so far.
    pub fn nodes_cached(&self) -> usize {
        self.cached.load(Ordering::Relaxed) as usize
    }

    /// Get current progress percentage.
    pub fn progress_percent(&self) -> f32 {
        if self.total_nodes == 0 {
            return 100.0;
        }
        let done = self.nodes_processed() + self.nodes_cached();
        (done as f32 / self.total_nodes as f32) * 100.0
    }

    /// Milliseconds since tracking started.
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    fn send_update(&self, update: ProgressUpdate) {
        if let Some(callback) = &self.callback {
            callback(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_progress_counts() {
        let mut tracker = ProgressTracker::new(4);
        tracker.start();
        tracker.node_processed(NodeId(1), "Color".into(), Rectangle::new(0, 0, 1, 1), 3);
        tracker.node_cached(NodeId(2));

        assert_eq!(tracker.nodes_processed(), 1);
        assert_eq!(tracker.nodes_cached(), 1);
        assert_eq!(tracker.progress_percent(), 50.0);
    }

    #[test]
    fn test_callback_receives_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let callback: ProgressCallback = Arc::new(move |update| sink.lock().push(update));

        let mut tracker = ProgressTracker::new(1).with_callback(Some(callback));
        tracker.start();
        tracker.node_processed(NodeId(7), "Invert".into(), Rectangle::new(0, 0, 2, 2), 0);
        tracker.complete();

        let events = events.lock();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], ProgressUpdate::Started { total_nodes: 1 });
        assert!(matches!(
            events[1],
            ProgressUpdate::NodeProcessed { node_id: NodeId(7), index: 1, .. }
        ));
        assert!(matches!(
            events[2],
            ProgressUpdate::Completed { nodes_processed: 1, nodes_cached: 0, .. }
        ));
    }

    #[test]
    fn test_empty_request_is_complete() {
        assert_eq!(ProgressTracker::new(0).progress_percent(), 100.0);
    }
}
